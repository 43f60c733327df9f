//! Shared types for the keypoint pipeline sweep.
//!
//! Everything that crosses a crate boundary lives here: keypoints, the
//! descriptor matrix, correspondences, the per-image [`Frame`], the bounded
//! [`FrameWindow`], the region filter and the emitted [`MatchRecord`].

use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod frame;
pub mod raster;
pub mod record;
pub mod region;
pub mod window;

pub use error::{SweepError, SweepResult};
pub use frame::Frame;
pub use record::MatchRecord;
pub use region::{filter_keypoints, Rect};
pub use window::FrameWindow;

/// Single-channel 8-bit intensity image
pub type Image = image::GrayImage;

/// Detected image location, not yet described
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the meaningful neighbourhood, in base-image pixels
    pub size: f32,
    /// Orientation in radians, when the detector assigns one
    pub angle: Option<f32>,
    /// Detector response; absent for detectors that only rank their output
    pub response: Option<f32>,
    /// Pyramid level the point was found on
    pub octave: u8,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self {
            x,
            y,
            size,
            angle: None,
            response: None,
            octave: 0,
        }
    }

    pub fn with_response(mut self, response: f32) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = Some(angle);
        self
    }

    pub fn at_octave(mut self, octave: u8) -> Self {
        self.octave = octave;
        self
    }
}

/// Value domain of a descriptor matrix; decides the distance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptorKind {
    /// Bit-packed rows compared with the Hamming distance
    Binary,
    /// Floating-point gradient histograms compared with the L2 distance
    Gradient,
}

impl std::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorKind::Binary => write!(f, "DES_BINARY"),
            DescriptorKind::Gradient => write!(f, "DES_HOG"),
        }
    }
}

/// Descriptor matrix, one row per keypoint in keypoint order
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptors {
    Binary(Array2<u8>),
    Float(Array2<f32>),
}

impl Descriptors {
    /// Zero-row matrix of the given kind and row width
    pub fn empty(kind: DescriptorKind, width: usize) -> Self {
        match kind {
            DescriptorKind::Binary => Descriptors::Binary(Array2::zeros((0, width))),
            DescriptorKind::Gradient => Descriptors::Float(Array2::zeros((0, width))),
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            Descriptors::Binary(m) => m.nrows(),
            Descriptors::Float(m) => m.nrows(),
        }
    }

    /// Row width in bytes (binary) or components (float)
    pub fn width(&self) -> usize {
        match self {
            Descriptors::Binary(m) => m.ncols(),
            Descriptors::Float(m) => m.ncols(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn kind(&self) -> DescriptorKind {
        match self {
            Descriptors::Binary(_) => DescriptorKind::Binary,
            Descriptors::Float(_) => DescriptorKind::Gradient,
        }
    }
}

/// Correspondence between a query row and a train row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl Match {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            distance,
        }
    }
}

/// Default worker count for the global rayon pool
pub fn default_threads() -> usize {
    num_cpus::get().max(1)
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
