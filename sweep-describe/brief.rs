use imageproc::filter::box_filter;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};

use crate::pattern::{gaussian_pairs, pack_bits, rows_to_matrix, TestPair};

const BRIEF_SEED: u64 = 0xB81E_F000;

/// Binary intensity tests on a box-smoothed patch, without rotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BriefParams {
    pub bytes: usize,
    pub patch_size: usize,
    /// Side of the smoothing box
    pub kernel_size: u32,
}

impl Default for BriefParams {
    fn default() -> Self {
        Self {
            bytes: 32,
            patch_size: 48,
            kernel_size: 9,
        }
    }
}

pub struct BriefExtractor {
    params: BriefParams,
    pairs: Vec<TestPair>,
}

impl BriefExtractor {
    pub fn new(params: BriefParams) -> Self {
        let pairs = gaussian_pairs(params.bytes * 8, params.patch_size, BRIEF_SEED);
        Self { params, pairs }
    }

    pub fn describe(&self, img: &Image, kps: &[Keypoint]) -> Array2<u8> {
        let radius = self.params.kernel_size / 2;
        let smoothed = box_filter(img, radius, radius);
        let (w, h) = smoothed.dimensions();
        let sample = |x: f32, y: f32| {
            let px = x.round().clamp(0.0, (w - 1) as f32) as u32;
            let py = y.round().clamp(0.0, (h - 1) as f32) as u32;
            smoothed.get_pixel(px, py)[0]
        };

        let rows: Vec<Vec<u8>> = kps
            .par_iter()
            .map(|kp| {
                let bits = self.pairs.iter().map(|&((x1, y1), (x2, y2))| {
                    sample(kp.x + x1, kp.y + y1) < sample(kp.x + x2, kp.y + y2)
                });
                pack_bits(bits, self.params.bytes)
            })
            .collect();
        rows_to_matrix(&rows, self.params.bytes)
    }
}
