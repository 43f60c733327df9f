//! Scale-invariant feature detection on a difference-of-Gaussians pyramid.
//!
//! The seed image is upsampled 2x, so octave `o` pixels span `2^(o-1)`
//! base-image pixels. A keypoint's `size` is twice its absolute blur scale
//! in base-image pixels.

use std::f32::consts::PI;

use log::debug;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::raster::{decimate, gaussian_blur, normalized, resample};
use sweep_core::{Image, Keypoint};

use crate::utils::sort_by_strength;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiftParams {
    /// Keep only the strongest `n` keypoints; 0 keeps all
    pub n_features: usize,
    pub octave_layers: usize,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    pub sigma: f32,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            n_features: 0,
            octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
        }
    }
}

/// Blur assumed present in the input image
const INPUT_SIGMA: f32 = 0.5;
/// Points closer than this to an octave border are not interpolated
const IMAGE_BORDER: usize = 5;
const MAX_INTERPOLATION_STEPS: usize = 5;
const ORIENTATION_BINS: usize = 36;
const ORIENTATION_RADIUS: f32 = 3.0 * ORIENTATION_SIGMA;
const ORIENTATION_SIGMA: f32 = 1.5;
const ORIENTATION_PEAK_RATIO: f32 = 0.8;

/// Gaussian scale space: per octave `layers + 3` progressively blurred images
pub struct ScaleSpace {
    pub octaves: Vec<Vec<Array2<f32>>>,
    pub layers: usize,
    pub sigma: f32,
}

impl ScaleSpace {
    pub fn build(img: &Image, layers: usize, sigma: f32) -> Self {
        let layers = layers.max(1);
        let raster = normalized(img);
        let (h, w) = raster.dim();
        let upsampled = resample(&raster, 2 * w, 2 * h);
        let seed_sigma = (sigma * sigma - 4.0 * INPUT_SIGMA * INPUT_SIGMA).max(0.01).sqrt();
        let seed = gaussian_blur(&upsampled, seed_sigma);

        let min_axis = (2 * w).min(2 * h).max(1) as f32;
        let n_octaves = ((min_axis.log2() - 2.0).round() as i64 + 1).max(1) as usize;

        // Incremental blur between consecutive images of an octave
        let k = 2f32.powf(1.0 / layers as f32);
        let increments: Vec<f32> = (1..layers + 3)
            .map(|i| {
                let previous = sigma * k.powi(i as i32 - 1);
                let total = previous * k;
                (total * total - previous * previous).sqrt()
            })
            .collect();

        let mut octaves: Vec<Vec<Array2<f32>>> = Vec::with_capacity(n_octaves);
        let mut first = seed;
        for _ in 0..n_octaves {
            let (oh, ow) = first.dim();
            if ow < 2 * IMAGE_BORDER + 3 || oh < 2 * IMAGE_BORDER + 3 {
                break;
            }
            let mut images = Vec::with_capacity(layers + 3);
            images.push(first);
            for s in &increments {
                let next = gaussian_blur(&images[images.len() - 1], *s);
                images.push(next);
            }
            first = decimate(&images[layers]);
            octaves.push(images);
        }

        Self { octaves, layers, sigma }
    }

    /// Differences of adjacent images, `layers + 2` per octave
    pub fn differences(&self) -> Vec<Vec<Array2<f32>>> {
        self.octaves
            .iter()
            .map(|images| images.windows(2).map(|p| &p[1] - &p[0]).collect())
            .collect()
    }

    /// Base-image pixels per pixel of octave `o`
    pub fn octave_step(octave: usize) -> f32 {
        2f32.powi(octave as i32) * 0.5
    }

    /// Octave, image index and blur scale in octave pixels whose scale best
    /// fits a keypoint diameter given in base-image pixels
    pub fn locate(&self, size: f32) -> Option<(usize, usize, f32)> {
        if self.octaves.is_empty() {
            return None;
        }
        let v = (size.max(f32::MIN_POSITIVE) / self.sigma).log2();
        let octave = (v.floor().max(0.0) as usize).min(self.octaves.len() - 1);
        let layer = ((v - octave as f32) * self.layers as f32)
            .round()
            .clamp(0.0, (self.layers + 2) as f32) as usize;
        let scale = size / 2f32.powi(octave as i32);
        Some((octave, layer, scale))
    }
}

pub fn detect_sift(img: &Image, params: &SiftParams) -> Vec<Keypoint> {
    let space = ScaleSpace::build(img, params.octave_layers, params.sigma);
    let dog = space.differences();

    let per_octave: Vec<Vec<Keypoint>> = (0..space.octaves.len())
        .into_par_iter()
        .map(|o| {
            (1..=space.layers)
                .flat_map(|layer| octave_keypoints(&space, &dog[o], o, layer, params))
                .collect()
        })
        .collect();

    let mut keypoints: Vec<Keypoint> = per_octave.into_iter().flatten().collect();
    if params.n_features > 0 && keypoints.len() > params.n_features {
        sort_by_strength(&mut keypoints, |kp| kp.response.unwrap_or(0.0));
        keypoints.truncate(params.n_features);
    }
    debug!("SIFT: {} keypoints over {} octaves", keypoints.len(), space.octaves.len());
    keypoints
}

fn octave_keypoints(
    space: &ScaleSpace,
    dog: &[Array2<f32>],
    octave: usize,
    layer: usize,
    params: &SiftParams,
) -> Vec<Keypoint> {
    let (h, w) = dog[layer].dim();
    let threshold = (0.5 * params.contrast_threshold / space.layers as f32 * 255.0).floor() / 255.0;
    let mut keypoints = Vec::new();

    for y in IMAGE_BORDER..h - IMAGE_BORDER {
        for x in IMAGE_BORDER..w - IMAGE_BORDER {
            if !is_extremum(dog, layer, x, y, threshold) {
                continue;
            }
            let Some(found) = interpolate(dog, space.layers, layer, x, y) else {
                continue;
            };
            let contrast = found.value.abs();
            if contrast * (space.layers as f32) < params.contrast_threshold {
                continue;
            }
            if on_edge(&dog[found.layer], found.x, found.y, params.edge_threshold) {
                continue;
            }

            let step = ScaleSpace::octave_step(octave);
            let local_scale =
                space.sigma * 2f32.powf((found.layer as f32 + found.offset.2) / space.layers as f32);
            let bx = (found.x as f32 + found.offset.0) * step;
            let by = (found.y as f32 + found.offset.1) * step;
            let size = local_scale * 2f32.powi(octave as i32);

            let gauss = &space.octaves[octave][found.layer];
            for angle in orientations(gauss, found.x, found.y, local_scale) {
                keypoints.push(
                    Keypoint::new(bx, by, size)
                        .with_response(contrast)
                        .with_angle(angle)
                        .at_octave(octave as u8),
                );
            }
        }
    }
    keypoints
}

fn is_extremum(dog: &[Array2<f32>], layer: usize, x: usize, y: usize, threshold: f32) -> bool {
    let v = dog[layer][(y, x)];
    if v.abs() <= threshold {
        return false;
    }
    for image in &dog[layer - 1..=layer + 1] {
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                let n = image[(ny, nx)];
                if (v > 0.0 && n > v) || (v < 0.0 && n < v) {
                    return false;
                }
            }
        }
    }
    true
}

struct Extremum {
    x: usize,
    y: usize,
    layer: usize,
    /// Sub-sample offset `(x, y, layer)`
    offset: (f32, f32, f32),
    /// Interpolated response
    value: f32,
}

/// Fit a 3D quadratic around the sample and move to the neighbouring sample
/// until the offset stays within half a step
fn interpolate(dog: &[Array2<f32>], layers: usize, layer: usize, x: usize, y: usize) -> Option<Extremum> {
    let (h, w) = dog[layer].dim();
    let (mut x, mut y, mut layer) = (x, y, layer);

    for _ in 0..MAX_INTERPOLATION_STEPS {
        let (prev, curr, next) = (&dog[layer - 1], &dog[layer], &dog[layer + 1]);
        let c = curr[(y, x)];

        let gx = (curr[(y, x + 1)] - curr[(y, x - 1)]) / 2.0;
        let gy = (curr[(y + 1, x)] - curr[(y - 1, x)]) / 2.0;
        let gs = (next[(y, x)] - prev[(y, x)]) / 2.0;

        let hxx = curr[(y, x + 1)] + curr[(y, x - 1)] - 2.0 * c;
        let hyy = curr[(y + 1, x)] + curr[(y - 1, x)] - 2.0 * c;
        let hss = next[(y, x)] + prev[(y, x)] - 2.0 * c;
        let hxy = (curr[(y + 1, x + 1)] - curr[(y + 1, x - 1)] - curr[(y - 1, x + 1)] + curr[(y - 1, x - 1)]) / 4.0;
        let hxs = (next[(y, x + 1)] - next[(y, x - 1)] - prev[(y, x + 1)] + prev[(y, x - 1)]) / 4.0;
        let hys = (next[(y + 1, x)] - next[(y - 1, x)] - prev[(y + 1, x)] + prev[(y - 1, x)]) / 4.0;

        let det = hxx * (hyy * hss - hys * hys) - hxy * (hxy * hss - hys * hxs) + hxs * (hxy * hys - hyy * hxs);
        if det.abs() < 1e-12 {
            return None;
        }
        // Cramer's rule on H * offset = -g
        let ox = -(gx * (hyy * hss - hys * hys) - hxy * (gy * hss - hys * gs) + hxs * (gy * hys - hyy * gs)) / det;
        let oy = -(hxx * (gy * hss - hys * gs) - gx * (hxy * hss - hys * hxs) + hxs * (hxy * gs - gy * hxs)) / det;
        let os = -(hxx * (hyy * gs - gy * hys) - hxy * (hxy * gs - gy * hxs) + gx * (hxy * hys - hyy * hxs)) / det;

        if ox.abs() < 0.5 && oy.abs() < 0.5 && os.abs() < 0.5 {
            let value = c + 0.5 * (gx * ox + gy * oy + gs * os);
            return Some(Extremum {
                x,
                y,
                layer,
                offset: (ox, oy, os),
                value,
            });
        }
        if !ox.is_finite() || !oy.is_finite() || !os.is_finite() || ox.abs() > 1e3 || oy.abs() > 1e3 || os.abs() > 1e3 {
            return None;
        }

        let nx = x as i64 + ox.round() as i64;
        let ny = y as i64 + oy.round() as i64;
        let nl = layer as i64 + os.round() as i64;
        if nl < 1
            || nl > layers as i64
            || nx < IMAGE_BORDER as i64
            || nx >= (w - IMAGE_BORDER) as i64
            || ny < IMAGE_BORDER as i64
            || ny >= (h - IMAGE_BORDER) as i64
        {
            return None;
        }
        x = nx as usize;
        y = ny as usize;
        layer = nl as usize;
    }
    None
}

/// Principal curvature ratio test on the 2D Hessian
fn on_edge(dog: &Array2<f32>, x: usize, y: usize, edge_threshold: f32) -> bool {
    let c2 = dog[(y, x)] * 2.0;
    let dxx = dog[(y, x + 1)] + dog[(y, x - 1)] - c2;
    let dyy = dog[(y + 1, x)] + dog[(y - 1, x)] - c2;
    let dxy = (dog[(y + 1, x + 1)] - dog[(y + 1, x - 1)] - dog[(y - 1, x + 1)] + dog[(y - 1, x - 1)]) / 4.0;
    let tr = dxx + dyy;
    let det = dxx * dyy - dxy * dxy;
    det <= 0.0 || tr * tr * edge_threshold >= (edge_threshold + 1.0).powi(2) * det
}

/// Gradient orientation histogram peaks around a point, in radians `[0, 2pi)`
pub fn orientations(gauss: &Array2<f32>, x: usize, y: usize, scale: f32) -> Vec<f32> {
    let hist = orientation_histogram(gauss, x, y, scale);
    let max = hist.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }

    let n = ORIENTATION_BINS;
    let bin_width = 2.0 * PI / n as f32;
    (0..n)
        .filter_map(|k| {
            let left = hist[(k + n - 1) % n];
            let right = hist[(k + 1) % n];
            if hist[k] > left && hist[k] > right && hist[k] >= ORIENTATION_PEAK_RATIO * max {
                let shift = 0.5 * (left - right) / (left - 2.0 * hist[k] + right);
                let bin = (k as f32 + shift).rem_euclid(n as f32);
                Some(bin * bin_width)
            } else {
                None
            }
        })
        .collect()
}

fn orientation_histogram(gauss: &Array2<f32>, x: usize, y: usize, scale: f32) -> [f32; ORIENTATION_BINS] {
    let (h, w) = gauss.dim();
    let radius = (ORIENTATION_RADIUS * scale).round() as i64;
    let weight_sigma = ORIENTATION_SIGMA * scale;
    let exp_scale = -1.0 / (2.0 * weight_sigma * weight_sigma);
    let mut raw = [0.0f32; ORIENTATION_BINS];

    for dy in -radius..=radius {
        let py = y as i64 + dy;
        if py <= 0 || py >= h as i64 - 1 {
            continue;
        }
        for dx in -radius..=radius {
            let px = x as i64 + dx;
            if px <= 0 || px >= w as i64 - 1 {
                continue;
            }
            let (px, py) = (px as usize, py as usize);
            let gx = gauss[(py, px + 1)] - gauss[(py, px - 1)];
            let gy = gauss[(py + 1, px)] - gauss[(py - 1, px)];
            let weight = (((dx * dx + dy * dy) as f32) * exp_scale).exp();
            let angle = gy.atan2(gx).rem_euclid(2.0 * PI);
            let bin = ((angle / (2.0 * PI) * ORIENTATION_BINS as f32).round() as usize) % ORIENTATION_BINS;
            raw[bin] += weight * (gx * gx + gy * gy).sqrt();
        }
    }

    // Circular [1 4 6 4 1] / 16 smoothing
    let n = ORIENTATION_BINS;
    let mut smoothed = [0.0f32; ORIENTATION_BINS];
    for (k, out) in smoothed.iter_mut().enumerate() {
        *out = (raw[(k + n - 2) % n] + raw[(k + 2) % n]) / 16.0
            + (raw[(k + n - 1) % n] + raw[(k + 1) % n]) * 4.0 / 16.0
            + raw[k] * 6.0 / 16.0;
    }
    smoothed
}
