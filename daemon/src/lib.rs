pub mod classifier;
pub mod config;
pub mod decision;
pub mod frame;
pub mod inference;
pub mod server;
pub mod speech;
pub mod state;

pub use classifier::{Classifier, ClassifierHandle, ClassifierLoader, OnnxClassifier, OnnxLoader};
pub use decision::{Decision, DecisionEngine};
pub use frame::{Frame, FrameSource, SnapshotFrameSource};
pub use inference::{InferenceLoop, LoopSnapshot};
pub use speech::SpeechSink;
