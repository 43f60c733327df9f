//! Where frames come from.

use sweep_core::{Image, SweepError, SweepResult};

use crate::config::ImageSequenceConfig;

/// Random access to numbered grayscale frames
pub trait FrameSource: Send + Sync {
    fn load(&self, index: usize) -> SweepResult<Image>;

    /// Number of frames, when the source knows it up front
    fn len(&self) -> Option<usize> {
        None
    }
}

/// Numbered image files on disk, decoded and converted to 8-bit grayscale
#[derive(Debug, Clone)]
pub struct ImageSequence {
    config: ImageSequenceConfig,
}

impl ImageSequence {
    pub fn new(config: ImageSequenceConfig) -> Self {
        Self { config }
    }
}

impl FrameSource for ImageSequence {
    fn load(&self, index: usize) -> SweepResult<Image> {
        let path = self.config.path(index);
        log::debug!("loading frame {} from {}", index, path.display());
        image::open(&path)
            .map(|img| img.to_luma8())
            .map_err(|e| SweepError::ImageLoad {
                index,
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

/// Frames held in memory, indexed from zero
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: Vec<Image>,
}

impl MemorySource {
    pub fn new(frames: Vec<Image>) -> Self {
        Self { frames }
    }
}

impl FrameSource for MemorySource {
    fn load(&self, index: usize) -> SweepResult<Image> {
        self.frames.get(index).cloned().ok_or(SweepError::FrameOutOfRange {
            index,
            len: self.frames.len(),
        })
    }

    fn len(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}
