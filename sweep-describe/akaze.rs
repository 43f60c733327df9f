//! Modified-local difference binary (MLDB) descriptor.
//!
//! A rotated square patch is split into 2x2, 3x3 and 4x4 grids. Each cell
//! contributes its mean intensity and mean rotated derivatives, and every
//! pair of cells within a grid is compared on all three channels:
//! 3 * (6 + 36 + 120) = 486 bits.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::raster::{bilinear_sample, central_gradients, gaussian_blur, normalized};
use sweep_core::{Image, Keypoint};
use sweep_detect::akaze::{BASE_SIGMA, SIZE_FACTOR};

use crate::pattern::{pack_bits, rows_to_matrix};

const GRIDS: [usize; 3] = [2, 3, 4];
/// Patch half-side in units of the keypoint scale
const PATTERN_SIZE: f32 = 5.0;
/// Samples per cell side at the finest grid
const SAMPLES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AkazeDescriptorParams {
    /// Number of comparison bits, at most the full 486
    pub bits: usize,
    /// Intensity and both derivatives
    pub channels: usize,
    /// Precomputed smoothing levels the keypoint scale is snapped to
    pub scale_levels: usize,
}

impl Default for AkazeDescriptorParams {
    fn default() -> Self {
        Self {
            bits: full_bits(3),
            channels: 3,
            scale_levels: 4,
        }
    }
}

/// Bit count of the full descriptor for the given channel count
pub fn full_bits(channels: usize) -> usize {
    GRIDS.iter().map(|&g| channels * (g * g) * (g * g - 1) / 2).sum()
}

impl AkazeDescriptorParams {
    pub fn bytes(&self) -> usize {
        self.bits.div_ceil(8)
    }
}

/// Smoothed raster with its derivatives at one scale
struct ScaleLevel {
    sigma: f32,
    image: Array2<f32>,
    dx: Array2<f32>,
    dy: Array2<f32>,
}

pub struct AkazeExtractor {
    params: AkazeDescriptorParams,
}

impl AkazeExtractor {
    pub fn new(params: AkazeDescriptorParams) -> Self {
        Self { params }
    }

    pub fn describe(&self, img: &Image, kps: &[Keypoint]) -> Array2<u8> {
        let bytes = self.params.bytes();
        if kps.is_empty() {
            return Array2::zeros((0, bytes));
        }

        let raster = normalized(img);
        let levels: Vec<ScaleLevel> = (0..self.params.scale_levels.max(1))
            .into_par_iter()
            .map(|i| {
                let sigma = BASE_SIGMA * 2f32.powi(i as i32);
                let image = gaussian_blur(&raster, sigma);
                let (dx, dy) = central_gradients(&image);
                ScaleLevel { sigma, image, dx, dy }
            })
            .collect();

        let rows: Vec<Vec<u8>> = kps
            .par_iter()
            .map(|kp| {
                let sigma = kp.size / SIZE_FACTOR;
                let level = nearest_level(&levels, sigma);
                self.describe_one(level, kp, sigma)
            })
            .collect();
        rows_to_matrix(&rows, bytes)
    }

    fn describe_one(&self, level: &ScaleLevel, kp: &Keypoint, sigma: f32) -> Vec<u8> {
        let (s, c) = kp.angle.unwrap_or(0.0).sin_cos();
        let half = PATTERN_SIZE * sigma.max(1.0);
        let channels = self.params.channels.clamp(1, 3);
        let (img, dx, dy) = (level.image.view(), level.dx.view(), level.dy.view());

        let mut bits = Vec::with_capacity(full_bits(channels));
        for &grid in &GRIDS {
            let cell = 2.0 * half / grid as f32;
            let per_side = (SAMPLES / grid).max(2);
            let step = cell / per_side as f32;

            let mut cells: Vec<[f32; 3]> = Vec::with_capacity(grid * grid);
            for gy in 0..grid {
                for gx in 0..grid {
                    let mut sum = [0.0f32; 3];
                    for sy in 0..per_side {
                        for sx in 0..per_side {
                            // Patch frame, centred on the keypoint
                            let u = -half + gx as f32 * cell + (sx as f32 + 0.5) * step;
                            let v = -half + gy as f32 * cell + (sy as f32 + 0.5) * step;
                            let x = kp.x + c * u - s * v;
                            let y = kp.y + s * u + c * v;
                            let lx = bilinear_sample(&dx, x, y);
                            let ly = bilinear_sample(&dy, x, y);
                            sum[0] += bilinear_sample(&img, x, y);
                            sum[1] += c * lx + s * ly;
                            sum[2] += -s * lx + c * ly;
                        }
                    }
                    let n = (per_side * per_side) as f32;
                    cells.push([sum[0] / n, sum[1] / n, sum[2] / n]);
                }
            }

            for i in 0..cells.len() {
                for j in i + 1..cells.len() {
                    for ch in 0..channels {
                        bits.push(cells[i][ch] > cells[j][ch]);
                    }
                }
            }
        }
        bits.truncate(self.params.bits);
        pack_bits(bits, self.params.bytes())
    }
}

fn nearest_level(levels: &[ScaleLevel], sigma: f32) -> &ScaleLevel {
    let target = sigma.max(f32::MIN_POSITIVE).log2();
    levels
        .iter()
        .min_by(|a, b| {
            let da = (a.sigma.log2() - target).abs();
            let db = (b.sigma.log2() - target).abs();
            da.total_cmp(&db)
        })
        .unwrap_or(&levels[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_full_size_is_61_bytes() {
        assert_eq!(full_bits(3), 486);
        assert_eq!(AkazeDescriptorParams::default().bytes(), 61);
        assert_eq!(full_bits(1), 162);
    }

    #[test]
    fn test_rows_match_keypoints() {
        let extractor = AkazeExtractor::new(AkazeDescriptorParams::default());
        let img = Image::from_fn(64, 64, |x, y| Luma([((x * 9 + y * y) % 256) as u8]));
        let kps = vec![
            Keypoint::new(32.0, 32.0, 4.8).with_angle(1.0),
            Keypoint::new(0.0, 63.0, 30.0).with_angle(-2.0),
            Keypoint::new(10.0, 10.0, 9.6),
        ];
        let d = extractor.describe(&img, &kps);
        assert_eq!(d.dim(), (3, 61));
        // Two padding bits stay clear
        assert!(d.column(60).iter().all(|&b| b & 0b1100_0000 == 0));
        assert_eq!(extractor.describe(&img, &[]).dim(), (0, 61));
    }

    #[test]
    fn test_descriptor_follows_rotation() {
        let extractor = AkazeExtractor::new(AkazeDescriptorParams::default());
        let img = Image::from_fn(81, 81, |x, y| {
            let (dx, dy) = (x as f32 - 40.0, y as f32 - 40.0);
            Luma([(128.0 + 60.0 * (dx / 7.0).sin() + 40.0 * (dy / 5.0).cos()) as u8])
        });
        let rotated = image::imageops::rotate90(&img);
        // rotate90 turns the image clockwise, so orientations advance by 90 degrees
        let a = extractor.describe(&img, &[Keypoint::new(40.0, 40.0, 6.0).with_angle(0.0)]);
        let b = extractor.describe(&rotated, &[Keypoint::new(40.0, 40.0, 6.0).with_angle(std::f32::consts::FRAC_PI_2)]);
        let c = extractor.describe(&rotated, &[Keypoint::new(40.0, 40.0, 6.0).with_angle(0.0)]);
        let dist = |p: &Array2<u8>, q: &Array2<u8>| -> u32 {
            p.iter().zip(q.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
        };
        assert!(dist(&a, &b) < dist(&a, &c));
    }
}
