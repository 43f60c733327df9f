//! BRISK descriptor: a 60-point concentric sampling pattern.
//!
//! Long-distance pairs estimate the local gradient direction, the pattern is
//! rotated by it, and short-distance pairs produce the 512 comparison bits.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};

use crate::pattern::{pack_bits, rows_to_matrix, IntegralImage};

const RING_RADII: [f32; 5] = [0.0, 2.9, 4.9, 7.4, 10.8];
const RING_POINTS: [usize; 5] = [1, 10, 14, 15, 20];
const RADIUS_SCALE: f32 = 0.85;
/// Short pairs are closer than this, in pattern units
const SHORT_PAIR_MAX: f32 = 5.85;
/// Long pairs are farther than this, in pattern units
const LONG_PAIR_MIN: f32 = 8.2;
/// Keypoint size that maps onto the unscaled pattern
const UNIT_SIZE: f32 = 12.0 * 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BriskDescriptorParams {
    pub bytes: usize,
    pub pattern_scale: f32,
}

impl Default for BriskDescriptorParams {
    fn default() -> Self {
        Self {
            bytes: 64,
            pattern_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PatternPoint {
    x: f32,
    y: f32,
    sigma: f32,
}

pub struct BriskExtractor {
    params: BriskDescriptorParams,
    points: Vec<PatternPoint>,
    short_pairs: Vec<(usize, usize)>,
    long_pairs: Vec<(usize, usize)>,
}

impl BriskExtractor {
    pub fn new(params: BriskDescriptorParams) -> Self {
        let f = RADIUS_SCALE * params.pattern_scale;
        let mut points = Vec::with_capacity(RING_POINTS.iter().sum());
        for (&radius, &n) in RING_RADII.iter().zip(RING_POINTS.iter()) {
            // Smoothing reaches half-way to the neighbouring point on the ring
            let sigma = if n == 1 {
                0.5 * f
            } else {
                0.5 * f * radius * std::f32::consts::PI / n as f32
            };
            for k in 0..n {
                let alpha = k as f32 * 2.0 * std::f32::consts::PI / n as f32;
                points.push(PatternPoint {
                    x: f * radius * alpha.cos(),
                    y: f * radius * alpha.sin(),
                    sigma,
                });
            }
        }

        let mut short_pairs = Vec::new();
        let mut long_pairs = Vec::new();
        let short_max = SHORT_PAIR_MAX * params.pattern_scale;
        let long_min = LONG_PAIR_MIN * params.pattern_scale;
        for i in 1..points.len() {
            for j in 0..i {
                let d = (points[i].x - points[j].x).hypot(points[i].y - points[j].y);
                if d < short_max {
                    short_pairs.push((i, j));
                } else if d > long_min {
                    long_pairs.push((i, j));
                }
            }
        }

        Self {
            params,
            points,
            short_pairs,
            long_pairs,
        }
    }

    pub fn pattern_len(&self) -> usize {
        self.points.len()
    }

    pub fn short_pair_count(&self) -> usize {
        self.short_pairs.len()
    }

    pub fn long_pair_count(&self) -> usize {
        self.long_pairs.len()
    }

    pub fn describe(&self, img: &Image, kps: &[Keypoint]) -> Array2<u8> {
        let integral = IntegralImage::new(img);
        let rows: Vec<Vec<u8>> = kps
            .par_iter()
            .map(|kp| self.describe_one(&integral, kp))
            .collect();
        rows_to_matrix(&rows, self.params.bytes)
    }

    fn describe_one(&self, integral: &IntegralImage, kp: &Keypoint) -> Vec<u8> {
        let t = (kp.size / UNIT_SIZE).max(1.0);

        // Orientation from the unrotated pattern
        let values: Vec<f32> = self
            .points
            .iter()
            .map(|p| integral.box_mean(kp.x + t * p.x, kp.y + t * p.y, t * p.sigma))
            .collect();
        let (mut gx, mut gy) = (0.0f32, 0.0f32);
        for &(i, j) in &self.long_pairs {
            let (pi, pj) = (&self.points[i], &self.points[j]);
            let (dx, dy) = (pj.x - pi.x, pj.y - pi.y);
            let weight = (values[j] - values[i]) / (dx * dx + dy * dy);
            gx += weight * dx;
            gy += weight * dy;
        }
        let (s, c) = gy.atan2(gx).sin_cos();

        let rotated: Vec<f32> = self
            .points
            .iter()
            .map(|p| {
                let rx = c * p.x - s * p.y;
                let ry = s * p.x + c * p.y;
                integral.box_mean(kp.x + t * rx, kp.y + t * ry, t * p.sigma)
            })
            .collect();
        let bits = self.short_pairs.iter().map(|&(i, j)| rotated[i] > rotated[j]);
        pack_bits(bits, self.params.bytes)
    }
}
