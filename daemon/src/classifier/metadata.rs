use super::ClassifierError;
use serde::Deserialize;
use std::path::Path;

/// The parts of a Teachable Machine style `metadata.json` the daemon uses.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub labels: Vec<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub image_size: Option<u32>,
}

impl ModelMetadata {
    pub fn parse(json: &str) -> Result<Self, ClassifierError> {
        let metadata: ModelMetadata =
            serde_json::from_str(json).map_err(|e| ClassifierError::Metadata(e.to_string()))?;

        if metadata.labels.is_empty() {
            return Err(ClassifierError::Metadata("no labels".to_string()));
        }
        if metadata.image_size == Some(0) {
            return Err(ClassifierError::Metadata("imageSize must be positive".to_string()));
        }

        Ok(metadata)
    }

    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json)
    }

    pub fn class_count(&self) -> usize {
        self.labels.len()
    }
}
