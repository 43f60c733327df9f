use imageproc::filter::gaussian_blur_f32;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};
use sweep_detect::refinement::intensity_centroid_angle;

use crate::pattern::{bilinear_sample, gaussian_pairs, pack_bits, rows_to_matrix, TestPair};

const ORB_SEED: u64 = 0x0B_31;

/// Steered BRIEF: the test pattern is rotated by the keypoint orientation
/// and scaled with the keypoint size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbDescriptorParams {
    pub bytes: usize,
    pub patch_size: usize,
    pub smoothing_sigma: f32,
}

impl Default for OrbDescriptorParams {
    fn default() -> Self {
        Self {
            bytes: 32,
            patch_size: 31,
            smoothing_sigma: 2.0,
        }
    }
}

pub struct OrbExtractor {
    params: OrbDescriptorParams,
    pairs: Vec<TestPair>,
}

impl OrbExtractor {
    pub fn new(params: OrbDescriptorParams) -> Self {
        let pairs = gaussian_pairs(params.bytes * 8, params.patch_size, ORB_SEED);
        Self { params, pairs }
    }

    pub fn describe(&self, img: &Image, kps: &[Keypoint]) -> Array2<u8> {
        let smoothed = gaussian_blur_f32(img, self.params.smoothing_sigma);
        let patch = self.params.patch_size as f32;
        let radius = (self.params.patch_size / 2) as i32;

        let rows: Vec<Vec<u8>> = kps
            .par_iter()
            .map(|kp| {
                // Keypoints without an orientation get one from the intensity centroid
                let angle = kp.angle.unwrap_or_else(|| intensity_centroid_angle(img, kp.x, kp.y, radius));
                let (s, c) = angle.sin_cos();
                let scale = (kp.size / patch).max(1.0);
                let (cx, cy) = (kp.x, kp.y);

                let rotate = |dx: f32, dy: f32| {
                    let (dx, dy) = (dx * scale, dy * scale);
                    (cx + c * dx - s * dy, cy + s * dx + c * dy)
                };
                let bits = self.pairs.iter().map(|&((x1, y1), (x2, y2))| {
                    let (rx1, ry1) = rotate(x1, y1);
                    let (rx2, ry2) = rotate(x2, y2);
                    bilinear_sample(&smoothed, rx1, ry1) < bilinear_sample(&smoothed, rx2, ry2)
                });
                pack_bits(bits, self.params.bytes)
            })
            .collect();
        rows_to_matrix(&rows, self.params.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::imageops::rotate90;
    use image::Luma;

    fn disc_pattern() -> Image {
        // Rotationally asymmetric blob pattern around the centre (40, 40)
        Image::from_fn(81, 81, |x, y| {
            let dx = x as f32 - 40.0;
            let dy = y as f32 - 40.0;
            let a = dy.atan2(dx);
            let r = (dx * dx + dy * dy).sqrt();
            Luma([(128.0 + 90.0 * (3.0 * a).sin() * (r / 6.0).cos() + 20.0 * (a).cos()) as u8])
        })
    }

    fn hamming(a: ndarray::ArrayView1<u8>, b: ndarray::ArrayView1<u8>) -> u32 {
        a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
    }

    #[test]
    fn test_rows_match_keypoints() {
        let extractor = OrbExtractor::new(OrbDescriptorParams::default());
        let img = disc_pattern();
        let kps = vec![
            Keypoint::new(40.0, 40.0, 31.0).with_angle(0.3),
            Keypoint::new(2.0, 79.0, 62.0),
        ];
        assert_eq!(extractor.describe(&img, &kps).dim(), (2, 32));
    }

    #[test]
    fn test_rotation_invariance() {
        let extractor = OrbExtractor::new(OrbDescriptorParams::default());
        let img = disc_pattern();
        let rotated = rotate90(&img);

        let kp = Keypoint::new(40.0, 40.0, 31.0);
        let a = extractor.describe(&img, &[kp]);
        let b = extractor.describe(&rotated, &[kp]);
        let unrelated = extractor.describe(&img, &[Keypoint::new(20.0, 55.0, 31.0)]);

        let d_rot = hamming(a.row(0), b.row(0));
        let d_other = hamming(a.row(0), unrelated.row(0));
        assert!(d_rot < d_other, "rotated {d_rot} vs unrelated {d_other}");
    }
}
