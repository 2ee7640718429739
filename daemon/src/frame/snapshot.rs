use super::{Frame, FrameSource};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Reads frames from an image file that an external grabber keeps
/// overwriting (e.g. `ffmpeg -f v4l2 -i /dev/video0 -update 1 frame.jpg`).
pub struct SnapshotFrameSource {
    path: PathBuf,
    max_age: Option<Duration>,
    last_modified: Option<SystemTime>,
    cached: Option<Frame>,
}

impl SnapshotFrameSource {
    /// `max_age_ms` of 0 disables the staleness check.
    pub fn new(path: impl Into<PathBuf>, max_age_ms: u64) -> Self {
        let path = path.into();
        info!("Snapshot frame source reading from {:?}", path);

        Self {
            path,
            max_age: (max_age_ms > 0).then(|| Duration::from_millis(max_age_ms)),
            last_modified: None,
            cached: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_stale(&self, modified: SystemTime) -> bool {
        match self.max_age {
            Some(max_age) => modified
                .elapsed()
                .map(|age| age > max_age)
                .unwrap_or(false),
            None => false,
        }
    }
}

impl FrameSource for SnapshotFrameSource {
    fn current_frame(&mut self) -> Option<Frame> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                debug!("No snapshot at {:?}: {}", self.path, e);
                return None;
            }
        };

        if self.is_stale(modified) {
            debug!("Snapshot at {:?} is stale, skipping", self.path);
            return None;
        }

        if self.last_modified == Some(modified) {
            if let Some(frame) = &self.cached {
                return Some(frame.clone());
            }
        }

        match image::open(&self.path) {
            Ok(img) => {
                let frame = Frame::new(img.to_rgb8());
                self.last_modified = Some(modified);
                self.cached = Some(frame.clone());
                Some(frame)
            }
            Err(e) => {
                // Usually a half-written file; the next tick will see the complete one.
                debug!("Failed to decode snapshot {:?}: {}", self.path, e);
                None
            }
        }
    }
}
