use super::{LoopSettings, LoopSnapshot, TickOutcome};
use crate::classifier::{ClassifierHandle, ClassifierLoader};
use crate::config::ModelConfig;
use crate::decision::{Decision, DecisionEngine};
use crate::frame::FrameSource;
use crate::speech::SpeechSink;
use shared::PredictionSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Drives frame → classifiers → decision → speech, one tick at a time.
///
/// Ticks never overlap: the next one is scheduled only after the current
/// round of classifier calls has settled, so slow inference lowers the tick
/// rate instead of queueing work.
pub struct InferenceLoop {
    image: ClassifierHandle,
    pose: Option<ClassifierHandle>,
    frames: Box<dyn FrameSource>,
    engine: DecisionEngine,
    speech: Arc<dyn SpeechSink>,
    settings: LoopSettings,
    shutdown: watch::Receiver<bool>,
    snapshot_tx: watch::Sender<LoopSnapshot>,
    failing: bool,
}

impl InferenceLoop {
    /// `with_pose` adds a second required classifier whose predictions are
    /// passed to the engine alongside the image ones.
    pub fn new(
        frames: Box<dyn FrameSource>,
        engine: DecisionEngine,
        speech: Arc<dyn SpeechSink>,
        settings: LoopSettings,
        with_pose: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(LoopSnapshot::new(with_pose));

        Self {
            image: ClassifierHandle::new("image"),
            pose: with_pose.then(|| ClassifierHandle::new("pose")),
            frames,
            engine,
            speech,
            settings,
            shutdown,
            snapshot_tx,
            failing: false,
        }
    }

    pub fn snapshots(&self) -> watch::Receiver<LoopSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Starts loading every classifier concurrently. Fails only when the
    /// configuration does not match the handles.
    pub fn load(
        &mut self,
        loader: Arc<dyn ClassifierLoader>,
        image: ModelConfig,
        pose: Option<ModelConfig>,
    ) -> anyhow::Result<()> {
        match (&mut self.pose, pose) {
            (Some(handle), Some(model)) => handle.start_loading(Arc::clone(&loader), model),
            (Some(_), None) => {
                return Err(anyhow::anyhow!("Pose classifier required but no pose model configured"));
            }
            (None, Some(_)) => debug!("Pose model configured but unused in this mode"),
            (None, None) => {}
        }

        self.image.start_loading(loader, image);
        self.publish_status();
        Ok(())
    }

    /// True once every required classifier is `Ready`, as of the last
    /// [`refresh`](Self::refresh).
    pub fn is_ready(&self) -> bool {
        self.image.is_ready() && self.pose.as_ref().map_or(true, |p| p.is_ready())
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Picks up finished loads and publishes the resulting statuses. Never
    /// waits for a load still in flight.
    pub async fn refresh(&mut self) {
        self.image.refresh().await;
        if let Some(pose) = self.pose.as_mut() {
            pose.refresh().await;
        }
        self.publish_status();
    }

    pub async fn tick(&mut self, now: Instant) -> TickOutcome {
        self.refresh().await;
        if !self.is_ready() {
            return TickOutcome::NotReady;
        }

        let Some(frame) = self.frames.current_frame() else {
            return TickOutcome::NoFrame;
        };

        let image_handle = &self.image;
        let pose_handle = self.pose.as_ref();
        let frame_ref = &frame;
        let round = async move {
            tokio::join!(image_handle.predict(frame_ref), async move {
                match pose_handle {
                    Some(handle) => Some(handle.predict(frame_ref).await),
                    None => None,
                }
            })
        };

        let (image_result, pose_result) = match self.settings.inference_timeout {
            Some(limit) => match timeout(limit, round).await {
                Ok(results) => results,
                Err(_) => {
                    warn!("Inference took longer than {:?}, skipping tick", limit);
                    return TickOutcome::TimedOut;
                }
            },
            None => round.await,
        };

        if *self.shutdown.borrow() {
            debug!("Shutdown in progress, discarding inference results");
            return TickOutcome::Discarded;
        }

        let predictions = image_result.and_then(|image| {
            let pose = pose_result.transpose()?;
            Ok((image, pose))
        });

        let (image, pose) = match predictions {
            Ok(sets) => {
                if self.failing {
                    info!("Inference recovered");
                    self.failing = false;
                }
                sets
            }
            Err(e) => {
                if !self.failing {
                    warn!("Inference failed, skipping tick: {}", e);
                    self.failing = true;
                } else {
                    debug!("Inference still failing: {}", e);
                }
                return TickOutcome::Failed(e.to_string());
            }
        };

        let decision = self.engine.evaluate(&image, pose.as_ref(), now);
        if let Decision::Speak(text) = &decision {
            self.speech.speak(text);
        }

        self.publish_predictions(image, pose);
        TickOutcome::Processed(decision)
    }

    /// Ticks until the shutdown flag flips, then tears down.
    pub async fn run(mut self) {
        info!("Inference loop started");

        let mut shutdown = self.shutdown.clone();
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let now = tokio::time::Instant::now().into_std();
                    let outcome = self.tick(now).await;
                    self.snapshot_tx.send_modify(|s| s.ticks += 1);
                    if !matches!(outcome, TickOutcome::NotReady | TickOutcome::NoFrame) {
                        debug!("Tick: {:?}", outcome);
                    }
                }
            }
        }

        self.teardown();
    }

    /// Disposes every classifier. Safe to call more than once.
    pub fn teardown(&mut self) {
        self.image.dispose();
        if let Some(pose) = self.pose.as_mut() {
            pose.dispose();
        }
        self.publish_status();
        info!("Inference loop stopped");
    }

    fn publish_status(&self) {
        let image_status = self.image.status();
        let pose_status = self.pose.as_ref().map(|p| p.status());
        self.snapshot_tx.send_if_modified(|s| {
            let changed = s.image_status != image_status || s.pose_status != pose_status;
            s.image_status = image_status;
            s.pose_status = pose_status;
            changed
        });
    }

    fn publish_predictions(&self, image: PredictionSet, pose: Option<PredictionSet>) {
        let image_status = self.image.status();
        let pose_status = self.pose.as_ref().map(|p| p.status());
        let last_utterance = self.engine.last_utterance().map(str::to_string);
        self.snapshot_tx.send_modify(|s| {
            s.image_status = image_status;
            s.pose_status = pose_status;
            s.image = Some(image);
            s.pose = pose;
            s.last_utterance = last_utterance;
            s.inference_passes += 1;
        });
    }
}
