//! FREAK descriptor on a 43-point retina-like pattern.
//!
//! Seven rings of six receptive fields around a centre, denser and finer
//! towards the middle. Orientation comes from 45 symmetric pairs, the
//! 512 descriptor tests run coarse to fine.

use std::f32::consts::PI;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};

use crate::pattern::{pack_bits, rows_to_matrix, IntegralImage};

const RINGS: usize = 7;
const POINTS_PER_RING: usize = 6;
const BIG_RADIUS: f32 = 2.0 / 3.0;
const SMALL_RADIUS: f32 = 2.0 / 24.0;
/// Keypoint size mapped onto the unscaled pattern
const SMALLEST_KEYPOINT_SIZE: f32 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreakParams {
    pub bytes: usize,
    pub pattern_scale: f32,
    pub orientation_normalized: bool,
}

impl Default for FreakParams {
    fn default() -> Self {
        Self {
            bytes: 64,
            pattern_scale: 22.0,
            orientation_normalized: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ReceptiveField {
    x: f32,
    y: f32,
    sigma: f32,
    ring: usize,
}

pub struct FreakExtractor {
    params: FreakParams,
    fields: Vec<ReceptiveField>,
    orientation_pairs: Vec<(usize, usize)>,
    test_pairs: Vec<(usize, usize)>,
}

impl FreakExtractor {
    pub fn new(params: FreakParams) -> Self {
        let unit = (BIG_RADIUS - SMALL_RADIUS) / 21.0;
        let radii = [
            BIG_RADIUS,
            BIG_RADIUS - 6.0 * unit,
            BIG_RADIUS - 11.0 * unit,
            BIG_RADIUS - 15.0 * unit,
            BIG_RADIUS - 18.0 * unit,
            BIG_RADIUS - 20.0 * unit,
            SMALL_RADIUS,
        ];

        let mut fields = Vec::with_capacity(RINGS * POINTS_PER_RING + 1);
        for (ring, &radius) in radii.iter().enumerate() {
            // Odd rings are staggered by half the angular spacing
            let offset = if ring % 2 == 1 { PI / POINTS_PER_RING as f32 } else { 0.0 };
            for k in 0..POINTS_PER_RING {
                let alpha = k as f32 * 2.0 * PI / POINTS_PER_RING as f32 + offset;
                fields.push(ReceptiveField {
                    x: radius * params.pattern_scale * alpha.cos(),
                    y: radius * params.pattern_scale * alpha.sin(),
                    sigma: radius * params.pattern_scale / 2.0,
                    ring,
                });
            }
        }
        fields.push(ReceptiveField {
            x: 0.0,
            y: 0.0,
            sigma: SMALL_RADIUS * params.pattern_scale / 2.0,
            ring: RINGS,
        });

        // Opposite points within a ring, then aligned points on neighbouring outer rings
        let mut orientation_pairs = Vec::with_capacity(45);
        for ring in 0..RINGS {
            let base = ring * POINTS_PER_RING;
            for k in 0..POINTS_PER_RING / 2 {
                orientation_pairs.push((base + k, base + k + POINTS_PER_RING / 2));
            }
        }
        for ring in 0..4 {
            let base = ring * POINTS_PER_RING;
            for k in 0..POINTS_PER_RING {
                orientation_pairs.push((base + k, base + POINTS_PER_RING + k));
            }
        }

        let mut test_pairs: Vec<(usize, usize)> = (1..fields.len())
            .flat_map(|i| (0..i).map(move |j| (i, j)))
            .collect();
        test_pairs.sort_by_key(|&(i, j)| (fields[i].ring + fields[j].ring, fields[i].ring.abs_diff(fields[j].ring)));
        test_pairs.truncate(params.bytes * 8);

        Self {
            params,
            fields,
            orientation_pairs,
            test_pairs,
        }
    }

    pub fn pattern_len(&self) -> usize {
        self.fields.len()
    }

    pub fn orientation_pair_count(&self) -> usize {
        self.orientation_pairs.len()
    }

    pub fn describe(&self, img: &Image, kps: &[Keypoint]) -> Array2<u8> {
        let integral = IntegralImage::new(img);
        let rows: Vec<Vec<u8>> = kps
            .par_iter()
            .map(|kp| self.describe_one(&integral, kp))
            .collect();
        rows_to_matrix(&rows, self.params.bytes)
    }

    fn sample(&self, integral: &IntegralImage, kp: &Keypoint, scale: f32, angle: f32) -> Vec<f32> {
        let (s, c) = angle.sin_cos();
        self.fields
            .iter()
            .map(|f| {
                let rx = c * f.x - s * f.y;
                let ry = s * f.x + c * f.y;
                integral.box_mean(kp.x + scale * rx, kp.y + scale * ry, scale * f.sigma)
            })
            .collect()
    }

    fn describe_one(&self, integral: &IntegralImage, kp: &Keypoint) -> Vec<u8> {
        let scale = (kp.size / SMALLEST_KEYPOINT_SIZE).max(1.0);

        let angle = if self.params.orientation_normalized {
            let values = self.sample(integral, kp, scale, 0.0);
            let (mut gx, mut gy) = (0.0f32, 0.0f32);
            for &(i, j) in &self.orientation_pairs {
                let (fi, fj) = (&self.fields[i], &self.fields[j]);
                let (dx, dy) = (fi.x - fj.x, fi.y - fj.y);
                let norm = (dx * dx + dy * dy).sqrt();
                let diff = values[i] - values[j];
                gx += diff * dx / norm;
                gy += diff * dy / norm;
            }
            gy.atan2(gx)
        } else {
            0.0
        };

        let values = self.sample(integral, kp, scale, angle);
        let bits = self.test_pairs.iter().map(|&(i, j)| values[i] > values[j]);
        pack_bits(bits, self.params.bytes)
    }
}
