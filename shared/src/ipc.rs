use crate::prediction::{ClassifierStatus, DetectionMode, PredictionSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Toggle,
    Status,
    Predictions,
    SetMode(DetectionMode),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Error(String),
    Status(StatusInfo),
    Predictions(PredictionsSnapshot),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub is_running: bool,
    pub is_active: bool,
    pub mode: DetectionMode,
    pub image_classifier: ClassifierStatus,
    pub pose_classifier: Option<ClassifierStatus>,
    pub last_utterance: Option<String>,
}

/// Latest raw classifier output, published every tick regardless of whether
/// anything was spoken.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PredictionsSnapshot {
    pub image: Option<PredictionSet>,
    pub pose: Option<PredictionSet>,
    pub last_utterance: Option<String>,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused: is visaidd running?")]
    ConnectionRefused,

    #[error("Connection timeout")]
    Timeout,
}
