use super::SpeechSink;
use crate::config::SpeechPlayback;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Speaks by running an external TTS program with the utterance as its last
/// argument, e.g. `espeak-ng "Person is Waving"`.
pub struct CommandSpeechSink {
    launcher: Arc<Launcher>,
    queue: Option<mpsc::UnboundedSender<String>>,
}

struct Launcher {
    program: String,
    args: Vec<String>,
    warned: AtomicBool,
}

impl Launcher {
    fn spawn(&self, text: &str) -> Option<Child> {
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match result {
            Ok(child) => Some(child),
            Err(e) => {
                // Reported once; a missing TTS program stays missing.
                if !self.warned.swap(true, Ordering::Relaxed) {
                    warn!("Speech unavailable, '{}' failed to start: {}", self.program, e);
                }
                None
            }
        }
    }

    async fn reap(program: &str, mut child: Child) {
        match child.wait().await {
            Ok(status) if status.success() => debug!("{} finished", program),
            Ok(status) => debug!("{} exited with {}", program, status),
            Err(e) => debug!("Failed to wait for {}: {}", program, e),
        }
    }
}

impl CommandSpeechSink {
    /// With [`SpeechPlayback::Queued`] this spawns the playback worker, so it
    /// must be called inside a tokio runtime.
    pub fn new(program: impl Into<String>, args: Vec<String>, playback: SpeechPlayback) -> Self {
        let launcher = Arc::new(Launcher {
            program: program.into(),
            args,
            warned: AtomicBool::new(false),
        });

        info!("Speech via '{}' ({:?} playback)", launcher.program, playback);

        let queue = match playback {
            SpeechPlayback::Overlap => None,
            SpeechPlayback::Queued => {
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                let worker = Arc::clone(&launcher);
                tokio::spawn(async move {
                    while let Some(text) = rx.recv().await {
                        if let Some(child) = worker.spawn(&text) {
                            Launcher::reap(&worker.program, child).await;
                        }
                    }
                    debug!("Speech queue closed");
                });
                Some(tx)
            }
        };

        Self { launcher, queue }
    }
}

impl SpeechSink for CommandSpeechSink {
    fn speak(&self, text: &str) {
        match &self.queue {
            Some(queue) => {
                if queue.send(text.to_string()).is_err() {
                    warn!("Speech queue closed, dropping '{}'", text);
                }
            }
            None => {
                if let Some(child) = self.launcher.spawn(text) {
                    let launcher = Arc::clone(&self.launcher);
                    tokio::spawn(async move {
                        Launcher::reap(&launcher.program, child).await;
                    });
                }
            }
        }
    }
}
