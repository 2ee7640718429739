use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One `(label, probability)` pair reported by a classifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassPrediction {
    pub class_name: String,
    pub probability: f32,
}

impl ClassPrediction {
    pub fn new(class_name: impl Into<String>, probability: f32) -> Self {
        Self {
            class_name: class_name.into(),
            probability,
        }
    }
}

/// All class predictions of one classifier for one tick, in the order the
/// classifier reported them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PredictionSet {
    pub predictions: Vec<ClassPrediction>,
}

impl PredictionSet {
    pub fn new(predictions: Vec<ClassPrediction>) -> Self {
        Self { predictions }
    }

    /// Builds a set from parallel label and probability slices.
    pub fn from_scores(labels: &[String], scores: &[f32]) -> Self {
        Self {
            predictions: labels
                .iter()
                .zip(scores)
                .map(|(label, &p)| ClassPrediction::new(label.clone(), p))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassPrediction> {
        self.predictions.iter()
    }

    /// Last class in scan order whose probability is strictly above `threshold`.
    pub fn last_above(&self, threshold: f32) -> Option<&str> {
        self.predictions
            .iter()
            .filter(|p| p.probability > threshold)
            .last()
            .map(|p| p.class_name.as_str())
    }
}

impl FromIterator<ClassPrediction> for PredictionSet {
    fn from_iter<I: IntoIterator<Item = ClassPrediction>>(iter: I) -> Self {
        Self {
            predictions: iter.into_iter().collect(),
        }
    }
}

/// Which classifiers a session runs and how detections are phrased.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Image/face classifier plus pose classifier: "{who} is {action}".
    #[default]
    Combined,
    /// Image classifier only: "{what} is detected nearby".
    Object,
}

impl DetectionMode {
    pub fn uses_pose(self) -> bool {
        matches!(self, DetectionMode::Combined)
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMode::Combined => write!(f, "combined"),
            DetectionMode::Object => write!(f, "object"),
        }
    }
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "combined" => Ok(DetectionMode::Combined),
            "object" => Ok(DetectionMode::Object),
            other => Err(format!(
                "unknown detection mode '{}', expected 'combined' or 'object'",
                other
            )),
        }
    }
}

/// Lifecycle state of a classifier handle as reported to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClassifierStatus {
    Unloaded,
    Loading,
    Ready { class_count: usize },
    Failed(String),
    Disposed,
}

impl ClassifierStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ClassifierStatus::Ready { .. })
    }
}

impl fmt::Display for ClassifierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierStatus::Unloaded => write!(f, "unloaded"),
            ClassifierStatus::Loading => write!(f, "loading"),
            ClassifierStatus::Ready { class_count } => write!(f, "ready ({} classes)", class_count),
            ClassifierStatus::Failed(reason) => write!(f, "failed: {}", reason),
            ClassifierStatus::Disposed => write!(f, "disposed"),
        }
    }
}
