pub mod snapshot;

pub use snapshot::SnapshotFrameSource;

use image::RgbImage;
use std::time::Instant;

/// One captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// The camera as seen by the inference loop. `None` means no frame is
/// available right now, which the loop treats as a skipped tick.
pub trait FrameSource: Send {
    fn current_frame(&mut self) -> Option<Frame>;
}
