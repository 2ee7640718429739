pub mod ipc;
pub mod prediction;

pub use ipc::{Command, IpcError, PredictionsSnapshot, Response, StatusInfo};
pub use prediction::{ClassPrediction, ClassifierStatus, DetectionMode, PredictionSet};
