// Common test helpers for visaidd integration tests
//
// This module provides scripted stand-ins for the camera, the classifiers
// and the speech backend so the inference loop can be driven tick by tick.
#![allow(dead_code)]

use async_trait::async_trait;
use image::RgbImage;
use shared::PredictionSet;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use visaidd::classifier::{Classifier, ClassifierError, ClassifierLoader};
use visaidd::config::ModelConfig;
use visaidd::frame::{Frame, FrameSource};
use visaidd::speech::SpeechSink;

pub const IMAGE_MODEL: &str = "mem://image";
pub const POSE_MODEL: &str = "mem://pose";

/// Frame source that hands out a blank frame while `available` is set.
#[derive(Clone, Default)]
pub struct ToggleFrames {
    pub available: Arc<AtomicBool>,
    pub polls: Arc<AtomicUsize>,
}

impl ToggleFrames {
    pub fn available() -> Self {
        let frames = Self::default();
        frames.available.store(true, Ordering::SeqCst);
        frames
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl FrameSource for ToggleFrames {
    fn current_frame(&mut self) -> Option<Frame> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.available
            .load(Ordering::SeqCst)
            .then(|| Frame::new(RgbImage::new(8, 8)))
    }
}

/// Behaviour of one fake model, shared with the classifier it produces so
/// tests can change scores between ticks.
#[derive(Clone)]
pub struct FakeModel {
    pub labels: Vec<String>,
    pub scores: Arc<Mutex<Vec<f32>>>,
    pub load_delay: Duration,
    pub predict_delay: Duration,
    pub fail_load: bool,
    pub fail_predict: Arc<AtomicBool>,
    pub predictions: Arc<AtomicUsize>,
    pub disposals: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub peak_in_flight: Arc<AtomicUsize>,
}

impl FakeModel {
    pub fn new(labels: &[&str], scores: &[f32]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            scores: Arc::new(Mutex::new(scores.to_vec())),
            load_delay: Duration::ZERO,
            predict_delay: Duration::ZERO,
            fail_load: false,
            fail_predict: Arc::new(AtomicBool::new(false)),
            predictions: Arc::new(AtomicUsize::new(0)),
            disposals: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_scores(&self, scores: &[f32]) {
        *self.scores.lock().unwrap() = scores.to_vec();
    }

    pub fn predictions(&self) -> usize {
        self.predictions.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// Most `predict` calls ever outstanding at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct FakeClassifier {
    model: FakeModel,
}

#[async_trait]
impl Classifier for FakeClassifier {
    fn name(&self) -> &str {
        "fake"
    }

    fn class_count(&self) -> usize {
        self.model.labels.len()
    }

    async fn predict(&self, _frame: &Frame) -> Result<PredictionSet, ClassifierError> {
        self.model.predictions.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.model.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.model.peak_in_flight.fetch_max(outstanding, Ordering::SeqCst);
        if !self.model.predict_delay.is_zero() {
            tokio::time::sleep(self.model.predict_delay).await;
        }
        self.model.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.model.fail_predict.load(Ordering::SeqCst) {
            return Err(ClassifierError::Inference("scripted failure".to_string()));
        }
        let scores = self.model.scores.lock().unwrap().clone();
        Ok(PredictionSet::from_scores(&self.model.labels, &scores))
    }

    fn dispose(&mut self) {
        self.model.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loader keyed by `base_location`.
#[derive(Default)]
pub struct FakeLoader {
    models: HashMap<String, FakeModel>,
}

impl FakeLoader {
    pub fn with(mut self, location: &str, model: FakeModel) -> Self {
        self.models.insert(location.to_string(), model);
        self
    }
}

#[async_trait]
impl ClassifierLoader for FakeLoader {
    async fn load(&self, config: &ModelConfig) -> Result<Box<dyn Classifier>, ClassifierError> {
        let model = self
            .models
            .get(&config.base_location)
            .cloned()
            .ok_or_else(|| ClassifierError::Load(format!("no model at {}", config.base_location)))?;

        if !model.load_delay.is_zero() {
            tokio::time::sleep(model.load_delay).await;
        }
        if model.fail_load {
            return Err(ClassifierError::Load("scripted load failure".to_string()));
        }
        Ok(Box::new(FakeClassifier { model }))
    }
}

/// Records every utterance instead of playing it.
#[derive(Clone, Default)]
pub struct RecordingSpeech {
    pub spoken: Arc<Mutex<Vec<String>>>,
}

impl RecordingSpeech {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechSink for RecordingSpeech {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

pub fn image_model() -> FakeModel {
    FakeModel::new(&["Person", "Nobody"], &[0.95, 0.05])
}

pub fn pose_model() -> FakeModel {
    FakeModel::new(&["Standing", "Waving"], &[0.05, 0.95])
}

/// Gives spawned load tasks a chance to finish under paused time.
pub async fn settle() {
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
