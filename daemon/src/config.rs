use anyhow::Result;
use serde::{Deserialize, Serialize};
use shared::DetectionMode;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default = "Config::default")]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CameraConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_max_frame_age")]
    pub max_frame_age_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            max_frame_age_ms: default_max_frame_age(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("/tmp/visaid-frame.jpg")
}

fn default_max_frame_age() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModelsConfig {
    #[serde(default = "default_image_model")]
    pub image: ModelConfig,
    #[serde(default)]
    pub pose: Option<ModelConfig>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            image: default_image_model(),
            pose: Some(ModelConfig::at("./models/pose")),
        }
    }
}

fn default_image_model() -> ModelConfig {
    ModelConfig::at("./models/image")
}

/// Where a classifier lives. `model.onnx` and `metadata.json` are resolved
/// relative to `base_location`, which is either a local directory or an
/// http(s) URL.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModelConfig {
    pub base_location: String,
    #[serde(default)]
    pub model_checksum: Option<String>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_channels_last")]
    pub channels_last: bool,
}

impl ModelConfig {
    pub fn at(base_location: impl Into<String>) -> Self {
        Self {
            base_location: base_location.into(),
            model_checksum: None,
            input_size: default_input_size(),
            channels_last: default_channels_last(),
        }
    }
}

fn default_input_size() -> u32 {
    224
}

fn default_channels_last() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DetectionConfig {
    #[serde(default)]
    pub mode: DetectionMode,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::default(),
            threshold: default_threshold(),
            cooldown_ms: default_cooldown(),
        }
    }
}

fn default_threshold() -> f32 {
    0.9
}

fn default_cooldown() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_tick_interval() -> u64 {
    16
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechPlayback {
    /// Every accepted utterance starts immediately, possibly over the previous one.
    #[default]
    Overlap,
    /// Utterances play one at a time in acceptance order.
    Queued,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_enabled")]
    pub enabled: bool,
    #[serde(default = "default_speech_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub playback: SpeechPlayback,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: default_speech_enabled(),
            command: default_speech_command(),
            args: Vec::new(),
            playback: SpeechPlayback::default(),
        }
    }
}

fn default_speech_enabled() -> bool {
    true
}

fn default_speech_command() -> String {
    "espeak-ng".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TimeoutsConfig {
    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_ms: u64,
    #[serde(default = "default_model_download_timeout")]
    pub model_download_timeout_seconds: u64,
    #[serde(default = "default_socket_operation_timeout")]
    pub socket_operation_timeout_seconds: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            inference_timeout_ms: default_inference_timeout(),
            model_download_timeout_seconds: default_model_download_timeout(),
            socket_operation_timeout_seconds: default_socket_operation_timeout(),
        }
    }
}

fn default_inference_timeout() -> u64 {
    0
}

fn default_model_download_timeout() -> u64 {
    300
}

fn default_socket_operation_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            models: ModelsConfig::default(),
            detection: DetectionConfig::default(),
            scheduler: SchedulerConfig::default(),
            speech: SpeechConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(Config::default());
    }

    tracing::info!("Loading config from {:?}", config_path);
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

    tracing::info!("Config loaded successfully");
    Ok(config)
}

fn get_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))?;
    Ok(dir.join("visaid").join("config.toml"))
}
