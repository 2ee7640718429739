pub mod runner;
pub mod snapshot;

pub use runner::InferenceLoop;
pub use snapshot::LoopSnapshot;

use crate::config::Config;
use crate::decision::Decision;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    /// Minimum spacing between tick starts (one display refresh).
    pub tick_interval: Duration,
    /// Upper bound on one round of classifier calls; `None` waits forever.
    pub inference_timeout: Option<Duration>,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        let timeout_ms = config.timeouts.inference_timeout_ms;
        Self {
            tick_interval: Duration::from_millis(config.scheduler.tick_interval_ms.max(1)),
            inference_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A required classifier is not `Ready`.
    NotReady,
    /// The frame source had nothing.
    NoFrame,
    /// Predictions reached the decision engine.
    Processed(Decision),
    /// The classifiers did not answer within the inference timeout.
    TimedOut,
    /// A classifier call returned an error.
    Failed(String),
    /// Results arrived after shutdown began and were dropped.
    Discarded,
}
