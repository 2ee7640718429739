use shared::{ClassifierStatus, PredictionSet, PredictionsSnapshot};

/// Published after every tick for status queries and presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSnapshot {
    pub image_status: ClassifierStatus,
    pub pose_status: Option<ClassifierStatus>,
    pub image: Option<PredictionSet>,
    pub pose: Option<PredictionSet>,
    pub last_utterance: Option<String>,
    pub ticks: u64,
    pub inference_passes: u64,
}

impl LoopSnapshot {
    pub fn new(uses_pose: bool) -> Self {
        Self {
            image_status: ClassifierStatus::Unloaded,
            pose_status: uses_pose.then_some(ClassifierStatus::Unloaded),
            image: None,
            pose: None,
            last_utterance: None,
            ticks: 0,
            inference_passes: 0,
        }
    }

    pub fn predictions(&self) -> PredictionsSnapshot {
        PredictionsSnapshot {
            image: self.image.clone(),
            pose: self.pose.clone(),
            last_utterance: self.last_utterance.clone(),
        }
    }
}
