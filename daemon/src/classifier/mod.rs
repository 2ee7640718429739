pub mod handle;
pub mod metadata;
pub mod onnx;
pub mod store;

pub use handle::ClassifierHandle;
pub use metadata::ModelMetadata;
pub use onnx::{OnnxClassifier, OnnxLoader};
pub use store::{ModelFiles, ModelStore};

use crate::config::ModelConfig;
use crate::frame::Frame;
use async_trait::async_trait;
use shared::PredictionSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("failed to load model: {0}")]
    Load(String),

    #[error("invalid model metadata: {0}")]
    Metadata(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("classifier '{0}' is not ready")]
    NotReady(String),

    #[error("classifier reported {actual} classes, expected {expected}")]
    ClassCountMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A loaded, ready-to-use classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Number of classes, fixed for the classifier's lifetime.
    fn class_count(&self) -> usize;

    /// Returns one prediction per class, in the classifier's label order.
    async fn predict(&self, frame: &Frame) -> Result<PredictionSet, ClassifierError>;

    /// Releases the model. Called at most once, by the owning handle.
    fn dispose(&mut self);
}

/// Builds classifiers from model configuration.
#[async_trait]
pub trait ClassifierLoader: Send + Sync {
    async fn load(&self, model: &ModelConfig) -> Result<Box<dyn Classifier>, ClassifierError>;
}
