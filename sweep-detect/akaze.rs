//! Accelerated-KAZE style detector over a nonlinear scale space.
//!
//! Each octave is evolved by explicit nonlinear diffusion steps driven by a
//! conductance of the smoothed gradient, and keypoints are maxima of the
//! scale-normalised Hessian determinant.

use std::f32::consts::PI;

use log::debug;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use sweep_core::raster::{central_gradients, gaussian_blur, normalized, resample};
use sweep_core::{Image, Keypoint};

use crate::refinement::{local_maxima, neighbourhood, quadratic_offset, suppress_within_radius};

/// Conductance functions for the diffusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diffusivity {
    /// Perona-Malik, favours high-contrast edges
    PmG1,
    /// Perona-Malik, favours wide regions
    PmG2,
    Weickert,
    Charbonnier,
}

impl Diffusivity {
    fn conductance(self, grad_sq: f32, k_sq: f32) -> f32 {
        let r = grad_sq / k_sq;
        match self {
            Diffusivity::PmG1 => (-r).exp(),
            Diffusivity::PmG2 => 1.0 / (1.0 + r),
            Diffusivity::Weickert => {
                if r <= 0.0 {
                    1.0
                } else {
                    1.0 - (-3.315 / (r * r * r * r)).exp()
                }
            }
            Diffusivity::Charbonnier => 1.0 / (1.0 + r).sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AkazeParams {
    /// Minimum scale-normalised Hessian response
    pub threshold: f32,
    pub octaves: usize,
    pub sublevels: usize,
    pub diffusivity: Diffusivity,
}

impl Default for AkazeParams {
    fn default() -> Self {
        Self {
            threshold: 0.001,
            octaves: 4,
            sublevels: 4,
            diffusivity: Diffusivity::PmG2,
        }
    }
}

/// Base scale of the evolution
pub const BASE_SIGMA: f32 = 1.6;
/// Ratio of keypoint diameter to evolution scale
pub const SIZE_FACTOR: f32 = 3.0;
/// Percentile of the gradient histogram used as contrast factor
const CONTRAST_PERCENTILE: f32 = 0.7;
const CONTRAST_BINS: usize = 300;
/// Largest stable explicit diffusion step
const MAX_STEP: f32 = 0.25;
const MIN_OCTAVE_SIDE: usize = 16;

/// One level of the nonlinear scale space
pub struct Evolution {
    pub octave: usize,
    pub sublevel: usize,
    /// Absolute scale in base-image pixels
    pub sigma: f32,
    pub image: Array2<f32>,
}

impl Evolution {
    /// Scale in this octave's own pixels
    pub fn local_sigma(&self) -> f32 {
        self.sigma / 2f32.powi(self.octave as i32)
    }

    /// Scale-normalised determinant of the Hessian
    pub fn hessian_response(&self) -> Array2<f32> {
        let l = &self.image;
        let (h, w) = l.dim();
        let norm = self.local_sigma().powi(4);
        Array2::from_shape_fn((h, w), |(y, x)| {
            if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
                return 0.0;
            }
            let c = l[(y, x)];
            let lxx = l[(y, x + 1)] - 2.0 * c + l[(y, x - 1)];
            let lyy = l[(y + 1, x)] - 2.0 * c + l[(y - 1, x)];
            let lxy = (l[(y + 1, x + 1)] - l[(y + 1, x - 1)] - l[(y - 1, x + 1)] + l[(y - 1, x - 1)]) / 4.0;
            (lxx * lyy - lxy * lxy) * norm
        })
    }
}

/// Contrast factor: the given percentile of the gradient magnitude of the
/// lightly smoothed image, ignoring flat pixels
pub fn contrast_factor(raster: &Array2<f32>) -> f32 {
    let (gx, gy) = central_gradients(&gaussian_blur(raster, 1.0));
    let magnitudes: Vec<f32> = Zip::from(&gx)
        .and(&gy)
        .map_collect(|&a, &b| (a * a + b * b).sqrt())
        .into_iter()
        .filter(|&m| m > 0.0)
        .collect();
    let max = magnitudes.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return 0.03;
    }

    let mut histogram = [0usize; CONTRAST_BINS];
    for m in &magnitudes {
        let bin = ((m / max) * CONTRAST_BINS as f32) as usize;
        histogram[bin.min(CONTRAST_BINS - 1)] += 1;
    }
    let target = (magnitudes.len() as f32 * CONTRAST_PERCENTILE) as usize;
    let mut seen = 0;
    for (bin, count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= target {
            return max * (bin as f32 + 1.0) / CONTRAST_BINS as f32;
        }
    }
    max
}

/// One explicit diffusion step with zero flux across the border
fn diffusion_step(l: &Array2<f32>, g: &Array2<f32>, tau: f32) -> Array2<f32> {
    let (h, w) = l.dim();
    Array2::from_shape_fn((h, w), |(y, x)| {
        let c = l[(y, x)];
        let gc = g[(y, x)];
        let mut flux = 0.0;
        if x + 1 < w {
            flux += 0.5 * (gc + g[(y, x + 1)]) * (l[(y, x + 1)] - c);
        }
        if x > 0 {
            flux += 0.5 * (gc + g[(y, x - 1)]) * (l[(y, x - 1)] - c);
        }
        if y + 1 < h {
            flux += 0.5 * (gc + g[(y + 1, x)]) * (l[(y + 1, x)] - c);
        }
        if y > 0 {
            flux += 0.5 * (gc + g[(y - 1, x)]) * (l[(y - 1, x)] - c);
        }
        c + tau * flux
    })
}

/// Evolve `l` by diffusion time `dt` in explicit steps
fn diffuse(mut l: Array2<f32>, dt: f32, k: f32, diffusivity: Diffusivity) -> Array2<f32> {
    if dt <= 0.0 {
        return l;
    }
    let (gx, gy) = central_gradients(&gaussian_blur(&l, 1.0));
    let k_sq = (k * k).max(1e-12);
    let g = Zip::from(&gx)
        .and(&gy)
        .map_collect(|&a, &b| diffusivity.conductance(a * a + b * b, k_sq));

    let steps = (dt / MAX_STEP).ceil().max(1.0) as usize;
    let tau = dt / steps as f32;
    for _ in 0..steps {
        l = diffusion_step(&l, &g, tau);
    }
    l
}

/// Build the nonlinear scale space, octave by octave
pub fn build_evolutions(img: &Image, params: &AkazeParams) -> Vec<Evolution> {
    let raster = normalized(img);
    let mut k = contrast_factor(&raster);
    let sublevels = params.sublevels.max(1);
    let mut evolutions: Vec<Evolution> = Vec::new();
    let mut current = gaussian_blur(&raster, BASE_SIGMA);

    for octave in 0..params.octaves {
        if octave > 0 {
            let (h, w) = current.dim();
            if w / 2 < MIN_OCTAVE_SIDE || h / 2 < MIN_OCTAVE_SIDE {
                break;
            }
            current = resample(&current, w / 2, h / 2);
            k *= 0.75;
        }
        let octave_scale = 2f32.powi(octave as i32);

        for sublevel in 0..sublevels {
            let sigma = BASE_SIGMA * 2f32.powf(octave as f32 + sublevel as f32 / sublevels as f32);
            if let Some(prev) = evolutions.last() {
                // Diffusion time in this octave's pixels
                let t_now = 0.5 * (sigma / octave_scale).powi(2);
                let t_prev = 0.5 * (prev.sigma / octave_scale).powi(2);
                current = diffuse(current, t_now - t_prev, k, params.diffusivity);
            }
            evolutions.push(Evolution {
                octave,
                sublevel,
                sigma,
                image: current.clone(),
            });
        }
    }
    evolutions
}

pub fn detect_akaze(img: &Image, params: &AkazeParams) -> Vec<Keypoint> {
    let evolutions = build_evolutions(img, params);
    let responses: Vec<Array2<f32>> = evolutions.iter().map(Evolution::hessian_response).collect();

    let mut candidates = Vec::new();
    for (i, evolution) in evolutions.iter().enumerate() {
        let response = &responses[i];
        let border = evolution.local_sigma().ceil() as usize + 1;
        let same_octave = |j: usize| evolutions[j].octave == evolution.octave;
        let maxima = local_maxima(response, border, params.threshold, true);
        if maxima.is_empty() {
            continue;
        }
        let gradients = central_gradients(&evolution.image);

        for c in maxima {
            let beaten = [i.checked_sub(1), Some(i + 1)]
                .into_iter()
                .flatten()
                .filter(|&j| j < evolutions.len() && same_octave(j))
                .any(|j| {
                    neighbourhood(&responses[j], c.x, c.y)
                        .iter()
                        .flatten()
                        .any(|&v| v > c.score)
                });
            if beaten {
                continue;
            }

            let (dx, dy) = quadratic_offset(&neighbourhood(response, c.x, c.y));
            let scale = 2f32.powi(evolution.octave as i32);
            let angle = dominant_orientation(evolution, &gradients, c.x, c.y);
            candidates.push(
                Keypoint::new((c.x as f32 + dx) * scale, (c.y as f32 + dy) * scale, SIZE_FACTOR * evolution.sigma)
                    .with_response(c.score)
                    .with_angle(angle)
                    .at_octave(evolution.octave as u8),
            );
        }
    }

    // Same structure found on neighbouring levels collapses to the strongest
    let keypoints = suppress_within_radius(candidates, |kp| kp.size / SIZE_FACTOR);
    debug!("AKAZE: {} keypoints over {} evolutions", keypoints.len(), evolutions.len());
    keypoints
}

/// Dominant gradient direction around a point: the longest summed gradient
/// vector over sliding sectors of 60 degrees
fn dominant_orientation(
    evolution: &Evolution,
    (gx, gy): &(Array2<f32>, Array2<f32>),
    x: usize,
    y: usize,
) -> f32 {
    let s = evolution.local_sigma().round().max(1.0) as i32;
    let radius = 6 * s;
    let weight_sigma = 2.5 * s as f32;
    let (h, w) = gx.dim();

    let mut samples: Vec<(f32, f32, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px < 0 || py < 0 || px >= w as i32 || py >= h as i32 {
                continue;
            }
            let weight = (-((dx * dx + dy * dy) as f32) / (2.0 * weight_sigma * weight_sigma)).exp();
            let rx = weight * gx[(py as usize, px as usize)];
            let ry = weight * gy[(py as usize, px as usize)];
            samples.push((ry.atan2(rx), rx, ry));
        }
    }

    let window = PI / 3.0;
    let mut best = (0.0f32, 0.0f32);
    let mut best_norm = 0.0f32;
    let mut start = -PI;
    while start < PI {
        let (mut sx, mut sy) = (0.0, 0.0);
        for &(angle, rx, ry) in &samples {
            let mut offset = angle - start;
            if offset < 0.0 {
                offset += 2.0 * PI;
            }
            if offset < window {
                sx += rx;
                sy += ry;
            }
        }
        let norm = sx * sx + sy * sy;
        if norm > best_norm {
            best_norm = norm;
            best = (sx, sy);
        }
        start += 0.15;
    }
    best.1.atan2(best.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::{blocks, squares};
    use image::Luma;

    #[test]
    fn test_conductance_is_bounded() {
        for d in [Diffusivity::PmG1, Diffusivity::PmG2, Diffusivity::Weickert, Diffusivity::Charbonnier] {
            assert!((d.conductance(0.0, 1.0) - 1.0).abs() < 1e-6);
            let g = d.conductance(4.0, 1.0);
            assert!(g > 0.0 && g < 1.0, "{d:?}");
        }
    }

    #[test]
    fn test_diffusion_preserves_mean() {
        let raster = normalized(&blocks(32, 24, 4, 9));
        let mean = raster.mean().unwrap_or(0.0);
        let k = contrast_factor(&raster);
        let out = diffuse(raster, 2.0, k, Diffusivity::PmG2);
        assert!((out.mean().unwrap_or(0.0) - mean).abs() < 1e-3);
    }

    #[test]
    fn test_evolution_layout() {
        let img = blocks(128, 96, 6, 2);
        let evolutions = build_evolutions(&img, &AkazeParams::default());
        // 96 -> 48 -> 24 -> 12 stops before the fourth octave
        assert_eq!(evolutions.len(), 12);
        assert_eq!(evolutions[4].image.dim(), (48, 64));
        assert!(evolutions.windows(2).all(|w| w[1].sigma > w[0].sigma));
    }

    #[test]
    fn test_akaze_finds_blobs() {
        let img = squares(128, 128, &[(30, 30, 10), (80, 40, 14), (50, 90, 8)]);
        let kps = detect_akaze(&img, &AkazeParams::default());
        assert!(!kps.is_empty());
        assert!(kps.iter().all(|kp| kp.angle.is_some() && kp.response.unwrap_or(0.0) > 0.001));
        assert!(kps
            .iter()
            .any(|kp| (kp.x - 35.0).abs() < 8.0 && (kp.y - 35.0).abs() < 8.0));
    }

    #[test]
    fn test_akaze_blank_image() {
        let img = Image::from_pixel(64, 64, Luma([77]));
        assert!(detect_akaze(&img, &AkazeParams::default()).is_empty());
    }
}
