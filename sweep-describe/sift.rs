//! SIFT gradient-histogram descriptor: 4x4 spatial cells of 8 orientation
//! bins, trilinearly interpolated, clamped and rescaled.

use std::f32::consts::PI;

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};
use sweep_detect::sift::{orientations, ScaleSpace};

use crate::pattern::rows_to_matrix;

const HISTOGRAMS: usize = 4;
const BINS: usize = 8;
/// Cell side in units of the keypoint scale
const CELL_WIDTH: f32 = 3.0;
const MAGNITUDE_CAP: f32 = 0.2;
const L2_NORM: f32 = 512.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiftDescriptorParams {
    pub octave_layers: usize,
    pub sigma: f32,
}

impl Default for SiftDescriptorParams {
    fn default() -> Self {
        Self {
            octave_layers: 3,
            sigma: 1.6,
        }
    }
}

pub const fn descriptor_len() -> usize {
    HISTOGRAMS * HISTOGRAMS * BINS
}

pub struct SiftExtractor {
    params: SiftDescriptorParams,
}

impl SiftExtractor {
    pub fn new(params: SiftDescriptorParams) -> Self {
        Self { params }
    }

    pub fn describe(&self, img: &Image, kps: &[Keypoint]) -> Array2<f32> {
        if kps.is_empty() {
            return Array2::zeros((0, descriptor_len()));
        }
        let space = ScaleSpace::build(img, self.params.octave_layers, self.params.sigma);

        let rows: Vec<Vec<f32>> = kps
            .par_iter()
            .map(|kp| match space.locate(kp.size) {
                Some((octave, layer, scale)) => {
                    let gauss = &space.octaves[octave][layer];
                    let step = ScaleSpace::octave_step(octave);
                    let (x, y) = (kp.x / step, kp.y / step);
                    let angle = kp.angle.unwrap_or_else(|| {
                        let (h, w) = gauss.dim();
                        let px = (x.round().max(0.0) as usize).min(w - 1);
                        let py = (y.round().max(0.0) as usize).min(h - 1);
                        orientations(gauss, px, py, scale).first().copied().unwrap_or(0.0)
                    });
                    compute_descriptor(&gauss.view(), x, y, scale, angle)
                }
                None => vec![0.0; descriptor_len()],
            })
            .collect();
        rows_to_matrix(&rows, descriptor_len())
    }
}

/// Descriptor of the point `(x, y)` of a blurred octave image at blur
/// `scale`, in the frame rotated by `angle`
pub fn compute_descriptor(img: &ArrayView2<f32>, x: f32, y: f32, scale: f32, angle: f32) -> Vec<f32> {
    let (h, w) = img.dim();
    let d = HISTOGRAMS as f32;
    let hist_width = CELL_WIDTH * scale;
    let radius = ((hist_width * std::f32::consts::SQRT_2 * (d + 1.0) * 0.5).round() as i64)
        .min(((w * w + h * h) as f64).sqrt() as i64);
    let (sin_a, cos_a) = angle.sin_cos();
    let (sin_a, cos_a) = (sin_a / hist_width, cos_a / hist_width);
    let exp_scale = -1.0 / (d * d * 0.5);
    let bins_per_rad = BINS as f32 / (2.0 * PI);

    let cx = x.round() as i64;
    let cy = y.round() as i64;

    // Padded by one cell on every side for interpolation spill-over
    let side = HISTOGRAMS + 2;
    let mut hist = vec![0.0f32; side * side * (BINS + 1)];
    let at = |r: usize, c: usize, o: usize| (r * side + c) * (BINS + 1) + o;

    for i in -radius..=radius {
        for j in -radius..=radius {
            // Sample position in the rotated histogram frame, in cell units
            let c_rot = j as f32 * cos_a + i as f32 * sin_a;
            let r_rot = i as f32 * cos_a - j as f32 * sin_a;
            let rbin = r_rot + d / 2.0 - 0.5;
            let cbin = c_rot + d / 2.0 - 0.5;
            if rbin <= -1.0 || rbin >= d || cbin <= -1.0 || cbin >= d {
                continue;
            }
            let py = cy + i;
            let px = cx + j;
            if py <= 0 || py >= h as i64 - 1 || px <= 0 || px >= w as i64 - 1 {
                continue;
            }
            let (py, px) = (py as usize, px as usize);
            let dx = img[(py, px + 1)] - img[(py, px - 1)];
            let dy = img[(py + 1, px)] - img[(py - 1, px)];

            let magnitude = (dx * dx + dy * dy).sqrt();
            let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
            let theta = (dy.atan2(dx) - angle).rem_euclid(2.0 * PI);
            let obin = theta * bins_per_rad;

            let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
            let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
            let o0 = (o0 as i64).rem_euclid(BINS as i64) as usize;
            let (r0, c0) = ((r0 as i64 + 1) as usize, (c0 as i64 + 1) as usize);
            let v = magnitude * weight;

            // Trilinear split over the two nearest rows, columns and bins
            for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
                for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
                    for (dbin, wo) in [(0, 1.0 - fo), (1, fo)] {
                        hist[at(r0 + dr, c0 + dc, o0 + dbin)] += v * wr * wc * wo;
                    }
                }
            }
        }
    }

    let mut out = Vec::with_capacity(descriptor_len());
    for r in 0..HISTOGRAMS {
        for c in 0..HISTOGRAMS {
            let cell = at(r + 1, c + 1, 0);
            // Orientation bins wrap around
            out.push(hist[cell] + hist[cell + BINS]);
            out.extend_from_slice(&hist[cell + 1..cell + BINS]);
        }
    }

    normalize(&mut out);
    out
}

/// Clamp components to a fraction of the norm, then rescale to the fixed norm
fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let cap = norm * MAGNITUDE_CAP;
    v.iter_mut().for_each(|x| *x = x.min(cap));
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(f32::EPSILON);
    let factor = L2_NORM / norm;
    v.iter_mut().for_each(|x| *x = (*x * factor).round().min(255.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blobs() -> Image {
        Image::from_fn(96, 96, |x, y| {
            let v = 128.0 + 60.0 * ((x as f32) / 6.0).sin() * ((y as f32) / 9.0).cos();
            Luma([v as u8])
        })
    }

    #[test]
    fn test_rows_match_keypoints() {
        let extractor = SiftExtractor::new(SiftDescriptorParams::default());
        let kps = vec![
            Keypoint::new(48.0, 48.0, 3.2).with_angle(0.5),
            Keypoint::new(0.0, 95.0, 7.0),
            Keypoint::new(20.0, 20.0, 40.0),
        ];
        let d = extractor.describe(&blobs(), &kps);
        assert_eq!(d.dim(), (3, 128));
        assert!(d.iter().all(|&v| (0.0..=255.0).contains(&v)));
        assert_eq!(extractor.describe(&blobs(), &[]).dim(), (0, 128));
    }

    #[test]
    fn test_descriptor_norm() {
        let img = Array2::from_shape_fn((64, 64), |(y, x)| ((x as f32) / 5.0).sin() + ((y as f32) / 3.0).cos());
        let d = compute_descriptor(&img.view(), 32.0, 32.0, 2.0, 0.0);
        assert_eq!(d.len(), 128);
        let norm = d.iter().map(|x| x * x).sum::<f32>().sqrt();
        // Rounding and the 255 ceiling keep it near the target
        assert!((norm - 512.0).abs() < 20.0, "norm {norm}");
    }

    #[test]
    fn test_flat_patch_is_zero() {
        let img = Array2::from_elem((40, 40), 0.3f32);
        let d = compute_descriptor(&img.view(), 20.0, 20.0, 1.6, 0.0);
        assert!(d.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_ramp_fills_one_orientation() {
        // Gradient along +x lands in orientation bin 0 of every cell
        let img = Array2::from_shape_fn((64, 64), |(_, x)| x as f32 * 0.01);
        let d = compute_descriptor(&img.view(), 32.0, 32.0, 2.0, 0.0);
        for cell in d.chunks(BINS) {
            let total: f32 = cell.iter().sum();
            if total > 0.0 {
                assert!(cell[0] >= 0.9 * total);
            }
        }
    }
}
