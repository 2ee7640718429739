use super::{Classifier, ClassifierError, ClassifierLoader, ModelMetadata, ModelStore};
use crate::config::ModelConfig;
use crate::frame::Frame;
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use shared::PredictionSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Image classifier backed by an ONNX model and a label list.
pub struct OnnxClassifier {
    name: String,
    labels: Vec<String>,
    input_size: u32,
    channels_last: bool,
    session: Arc<Mutex<Option<Session>>>,
    input_name: String,
    output_name: String,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .field("input_size", &self.input_size)
            .field("channels_last", &self.channels_last)
            .finish()
    }
}

impl OnnxClassifier {
    pub fn from_files(
        model_path: &Path,
        metadata: ModelMetadata,
        input_size: u32,
        channels_last: bool,
    ) -> Result<Self, ClassifierError> {
        let session = Session::builder()
            .map_err(|e| ClassifierError::Load(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ClassifierError::Load(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| ClassifierError::Load(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| ClassifierError::Load(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ClassifierError::Load("model has no inputs".to_string()))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ClassifierError::Load("model has no outputs".to_string()))?;

        let name = metadata.model_name.clone().unwrap_or_else(|| {
            model_path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "onnx".to_string())
        });

        info!(
            "Loaded ONNX model '{}' ({} labels, input {}x{}, {})",
            name,
            metadata.labels.len(),
            input_size,
            input_size,
            if channels_last { "NHWC" } else { "NCHW" }
        );

        Ok(Self {
            name,
            labels: metadata.labels,
            input_size,
            channels_last,
            session: Arc::new(Mutex::new(Some(session))),
            input_name,
            output_name,
        })
    }

    fn input_shape(&self) -> [i64; 4] {
        let size = self.input_size as i64;
        if self.channels_last {
            [1, size, size, 3]
        } else {
            [1, 3, size, size]
        }
    }
}

#[async_trait]
impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_count(&self) -> usize {
        self.labels.len()
    }

    async fn predict(&self, frame: &Frame) -> Result<PredictionSet, ClassifierError> {
        let data = preprocess(&frame.image, self.input_size, self.channels_last);
        let shape = self.input_shape();
        let session = Arc::clone(&self.session);
        let input_name = self.input_name.clone();
        let output_name = self.output_name.clone();

        let scores = tokio::task::spawn_blocking(move || -> Result<Vec<f32>, ClassifierError> {
            let input = Tensor::from_array((shape, data))
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;

            let mut guard = session
                .lock()
                .map_err(|_| ClassifierError::Inference("lock poisoned".to_string()))?;
            let session = guard
                .as_mut()
                .ok_or_else(|| ClassifierError::Inference("session disposed".to_string()))?;

            let outputs = session
                .run(ort::inputs![input_name.as_str() => input])
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;

            let output = outputs
                .get(output_name.as_str())
                .ok_or_else(|| ClassifierError::Inference("missing model output".to_string()))?;

            let (_shape, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;
            Ok(data.to_vec())
        })
        .await
        .map_err(|e| ClassifierError::Inference(e.to_string()))??;

        if scores.len() != self.labels.len() {
            return Err(ClassifierError::ClassCountMismatch {
                expected: self.labels.len(),
                actual: scores.len(),
            });
        }

        Ok(PredictionSet::from_scores(&self.labels, &scores))
    }

    fn dispose(&mut self) {
        if let Ok(mut guard) = self.session.lock() {
            guard.take();
        }
        debug!("ONNX session for '{}' released", self.name);
    }
}

/// Center-crops to a square, resizes to `size`x`size` and scales channels to
/// `[-1, 1]`.
pub fn preprocess(image: &RgbImage, size: u32, channels_last: bool) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let cropped = imageops::crop_imm(image, (width - side) / 2, (height - side) / 2, side, side)
        .to_image();
    let resized = imageops::resize(&cropped, size, size, FilterType::Triangle);

    let pixels = (size * size) as usize;
    let mut data = vec![0.0f32; pixels * 3];

    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 127.5 - 1.0;
            let index = if channels_last { i * 3 + c } else { c * pixels + i };
            data[index] = value;
        }
    }

    data
}

/// Loads [`OnnxClassifier`]s through a [`ModelStore`].
pub struct OnnxLoader {
    store: ModelStore,
}

impl OnnxLoader {
    pub fn new(store: ModelStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ClassifierLoader for OnnxLoader {
    async fn load(&self, model: &ModelConfig) -> Result<Box<dyn Classifier>, ClassifierError> {
        let files = self.store.resolve(model).await?;
        let metadata = ModelMetadata::from_file(&files.metadata)?;
        let input_size = metadata.image_size.unwrap_or(model.input_size);
        let channels_last = model.channels_last;

        let classifier = tokio::task::spawn_blocking(move || {
            OnnxClassifier::from_files(&files.model, metadata, input_size, channels_last)
        })
        .await
        .map_err(|e| ClassifierError::Load(e.to_string()))??;

        Ok(Box::new(classifier))
    }
}
