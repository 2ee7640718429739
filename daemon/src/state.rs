use crate::classifier::{ClassifierLoader, ModelStore, OnnxLoader};
use crate::config::Config;
use crate::decision::DecisionEngine;
use crate::frame::SnapshotFrameSource;
use crate::inference::{InferenceLoop, LoopSettings, LoopSnapshot};
use crate::speech::{self, SpeechSink};
use anyhow::{anyhow, Result};
use shared::ipc::StatusInfo;
use shared::{ClassifierStatus, DetectionMode, PredictionsSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running inference loop and the channels used to observe and stop it.
struct Session {
    mode: DetectionMode,
    shutdown_tx: watch::Sender<bool>,
    snapshots: watch::Receiver<LoopSnapshot>,
    task: JoinHandle<()>,
}

pub struct DaemonState {
    pub config: Config,
    mode: DetectionMode,
    loader: Arc<dyn ClassifierLoader>,
    speech: Arc<dyn SpeechSink>,
    session: Option<Session>,
}

impl DaemonState {
    /// Builds the production wiring: ONNX models resolved through the local
    /// cache and speech per the `[speech]` section.
    pub fn new(config: Config) -> Result<Self> {
        let store = ModelStore::new(
            ModelStore::default_cache_dir()?,
            Duration::from_secs(config.timeouts.model_download_timeout_seconds),
        );
        let speech = speech::from_config(&config.speech);
        Ok(Self::with_components(config, Arc::new(OnnxLoader::new(store)), speech))
    }

    pub fn with_components(
        config: Config,
        loader: Arc<dyn ClassifierLoader>,
        speech: Arc<dyn SpeechSink>,
    ) -> Self {
        Self {
            mode: config.detection.mode,
            config,
            loader,
            speech,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Loads the classifiers for the current mode and starts ticking.
    pub fn activate(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(anyhow!("Already active"));
        }

        let mode = self.mode;
        let models = &self.config.models;
        let pose_model = if mode.uses_pose() {
            Some(
                models
                    .pose
                    .clone()
                    .ok_or_else(|| anyhow!("Mode '{}' needs [models.pose] in the config", mode))?,
            )
        } else {
            None
        };

        let engine = DecisionEngine::new(
            mode,
            self.config.detection.threshold,
            Duration::from_millis(self.config.detection.cooldown_ms),
        );
        let frames = SnapshotFrameSource::new(
            self.config.camera.snapshot_path.clone(),
            self.config.camera.max_frame_age_ms,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut inference = InferenceLoop::new(
            Box::new(frames),
            engine,
            Arc::clone(&self.speech),
            LoopSettings::from_config(&self.config),
            mode.uses_pose(),
            shutdown_rx,
        );
        inference.load(Arc::clone(&self.loader), models.image.clone(), pose_model)?;

        let snapshots = inference.snapshots();
        let task = tokio::spawn(inference.run());

        self.session = Some(Session {
            mode,
            shutdown_tx,
            snapshots,
            task,
        });
        info!("Daemon activated ({} mode)", mode);
        Ok(())
    }

    /// Signals the loop to stop and waits for its teardown to finish.
    pub async fn deactivate(&mut self) -> Result<()> {
        let session = self.session.take().ok_or_else(|| anyhow!("Not active"))?;

        let _ = session.shutdown_tx.send(true);
        if let Err(e) = session.task.await {
            warn!("Inference loop ended abnormally: {}", e);
        }

        info!("Daemon deactivated");
        Ok(())
    }

    pub async fn toggle(&mut self) -> Result<()> {
        if self.is_active() {
            self.deactivate().await
        } else {
            self.activate()
        }
    }

    /// Applies to the next activation; a running session keeps its mode.
    pub fn set_mode(&mut self, mode: DetectionMode) {
        if self.mode != mode {
            info!("Detection mode set to {}", mode);
        }
        self.mode = mode;
        if let Some(session) = &self.session {
            if session.mode != mode {
                info!("Mode change takes effect after restart");
            }
        }
    }

    pub fn get_status(&self) -> StatusInfo {
        match &self.session {
            Some(session) => {
                let snapshot = session.snapshots.borrow();
                StatusInfo {
                    is_running: true,
                    is_active: true,
                    mode: session.mode,
                    image_classifier: snapshot.image_status.clone(),
                    pose_classifier: snapshot.pose_status.clone(),
                    last_utterance: snapshot.last_utterance.clone(),
                }
            }
            None => StatusInfo {
                is_running: true,
                is_active: false,
                mode: self.mode,
                image_classifier: ClassifierStatus::Unloaded,
                pose_classifier: self.mode.uses_pose().then_some(ClassifierStatus::Unloaded),
                last_utterance: None,
            },
        }
    }

    pub fn predictions(&self) -> PredictionsSnapshot {
        self.session
            .as_ref()
            .map(|s| s.snapshots.borrow().predictions())
            .unwrap_or_default()
    }

    /// Receiver for the live snapshot of the current session.
    pub fn subscribe(&self) -> Option<watch::Receiver<LoopSnapshot>> {
        self.session.as_ref().map(|s| s.snapshots.clone())
    }
}
