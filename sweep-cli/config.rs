use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sweep_core::{Rect, SweepError, SweepResult};
use sweep_describe::DescriptorType;
use sweep_detect::DetectorKind;
use sweep_match::{MatcherBackend, SelectionKind, SelectionPolicy, DEFAULT_RATIO};

/// Vehicle box in front of the camera on the KITTI sequence
pub const DEFAULT_REGION: Rect = Rect::new(535, 180, 180, 150);

/// Inclusive range of frame indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        if self.start > self.end {
            return 0;
        }
        (self.end - self.start).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indices(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

impl Default for FrameRange {
    fn default() -> Self {
        Self::new(0, 9)
    }
}

/// On-disk naming of a numbered image sequence:
/// `<directory>/<prefix><index padded to fill_width><extension>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSequenceConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub extension: String,
    pub fill_width: usize,
}

impl ImageSequenceConfig {
    pub fn path(&self, index: usize) -> PathBuf {
        let name = format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.extension,
            width = self.fill_width
        );
        self.directory.join(name)
    }
}

impl Default for ImageSequenceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("images"),
            prefix: "KITTI/2011_09_26/image_00/data/000000".to_string(),
            extension: ".png".to_string(),
            fill_width: 4,
        }
    }
}

/// Everything a sweep needs, fixed before it starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub detectors: Vec<String>,
    pub descriptors: Vec<String>,
    pub matcher: MatcherBackend,
    pub selection: SelectionKind,
    /// Best / second-best distance ratio for `knn-ratio` selection
    pub ratio: f32,
    /// Restrict keypoints to `region`
    pub focus_region: bool,
    /// Keep at most this many keypoints per frame, strongest first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_keypoints: Option<usize>,
    pub window_capacity: usize,
    pub threads: usize,
    /// Run combinations on the rayon pool instead of one after another
    pub parallel_combinations: bool,
    pub region: Rect,
    pub frames: FrameRange,
    pub images: ImageSequenceConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            detectors: DetectorKind::ALL.iter().map(|k| k.name().to_string()).collect(),
            descriptors: DescriptorType::ALL.iter().map(|t| t.name().to_string()).collect(),
            matcher: MatcherBackend::ApproximateIndex,
            selection: SelectionKind::KnnRatio,
            ratio: DEFAULT_RATIO,
            focus_region: true,
            max_keypoints: None,
            window_capacity: 2,
            threads: sweep_core::default_threads(),
            parallel_combinations: false,
            region: DEFAULT_REGION,
            frames: FrameRange::default(),
            images: ImageSequenceConfig::default(),
        }
    }
}

impl SweepConfig {
    /// Region filter in effect, if any
    pub fn active_region(&self) -> Option<Rect> {
        self.focus_region.then_some(self.region)
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy::new(self.selection, self.ratio)
    }

    pub fn validate(&self) -> SweepResult<()> {
        let invalid = |msg: String| Err(SweepError::InvalidConfig(msg));
        if self.detectors.is_empty() {
            return invalid("no detectors selected".into());
        }
        if self.descriptors.is_empty() {
            return invalid("no descriptors selected".into());
        }
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return invalid(format!("ratio {} is outside (0, 1]", self.ratio));
        }
        if self.window_capacity < 2 {
            return invalid(format!(
                "window capacity {} cannot hold a frame pair",
                self.window_capacity
            ));
        }
        if self.frames.start > self.frames.end {
            return invalid(format!(
                "frame range {}..={} is empty",
                self.frames.start, self.frames.end
            ));
        }
        if self.frames.end == usize::MAX {
            return invalid("frame range has no upper bound".into());
        }
        if self.focus_region && self.region.is_empty() {
            return invalid(format!("region {} has no area", self.region));
        }
        if self.threads == 0 {
            return invalid("thread count must be at least 1".into());
        }
        if self.max_keypoints == Some(0) {
            return invalid("max_keypoints must be at least 1".into());
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        let region = match self.active_region() {
            Some(r) => r.to_string(),
            None => "full frame".to_string(),
        };
        format!(
            "{} detector(s) x {} descriptor(s), matcher={}, selection={} (ratio {}), region={}, frames={}..={}",
            self.detectors.len(),
            self.descriptors.len(),
            self.matcher,
            self.selection,
            self.ratio,
            region,
            self.frames.start,
            self.frames.end
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid JSON configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(toml_str).context("invalid TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_toml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        std::fs::write(path.as_ref(), self.to_toml()?)
            .with_context(|| format!("cannot write {}", path.as_ref().display()))
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)
            .with_context(|| format!("cannot write {}", path.as_ref().display()))
    }
}
