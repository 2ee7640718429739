pub mod command;

pub use command::CommandSpeechSink;

use crate::config::SpeechConfig;
use std::sync::Arc;
use tracing::info;

/// Fire-and-forget text-to-speech. Implementations never fail loudly: a
/// missing or broken speech backend must not affect detection.
pub trait SpeechSink: Send + Sync {
    fn speak(&self, text: &str);
}

/// Logs utterances instead of speaking them.
#[derive(Debug, Default)]
pub struct SilentSpeechSink;

impl SpeechSink for SilentSpeechSink {
    fn speak(&self, text: &str) {
        info!("(speech disabled) {}", text);
    }
}

pub fn from_config(config: &SpeechConfig) -> Arc<dyn SpeechSink> {
    if config.enabled {
        Arc::new(CommandSpeechSink::new(
            config.command.clone(),
            config.args.clone(),
            config.playback,
        ))
    } else {
        Arc::new(SilentSpeechSink)
    }
}
