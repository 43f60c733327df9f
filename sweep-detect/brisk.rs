use image::imageops::{resize, FilterType};
use log::debug;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};

use crate::fast;
use crate::refinement::{local_maxima, neighbourhood, quadratic_offset};

/// Keypoint diameter at unit scale
const BASIC_SIZE: f32 = 12.0;

/// FAST scores over octaves and intra-octaves, maxima in scale space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BriskParams {
    pub threshold: u8,
    pub octaves: usize,
    pub pattern_scale: f32,
}

impl Default for BriskParams {
    fn default() -> Self {
        Self {
            threshold: 30,
            octaves: 3,
            pattern_scale: 1.0,
        }
    }
}

/// One layer of the scale space with its FAST score map
struct Layer {
    scale: f32,
    scores: Array2<f32>,
}

impl Layer {
    /// Strongest score in the 3x3 window around a point given in another
    /// layer's coordinates
    fn max_near(&self, x: f32, y: f32, from_scale: f32) -> f32 {
        let (h, w) = self.scores.dim();
        let lx = (x + 0.5) * from_scale / self.scale - 0.5;
        let ly = (y + 0.5) * from_scale / self.scale - 0.5;
        let cx = lx.round().clamp(0.0, (w - 1) as f32) as usize;
        let cy = ly.round().clamp(0.0, (h - 1) as f32) as usize;
        neighbourhood(&self.scores, cx, cy)
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f32::max)
    }
}

/// Layer scales in ascending order: octaves at `2^i`, intra-octaves at `1.5 * 2^i`
pub fn layer_scales(octaves: usize) -> Vec<f32> {
    if octaves == 0 {
        return vec![1.0];
    }
    (0..octaves)
        .flat_map(|i| {
            let octave = 2f32.powi(i as i32);
            [octave, 1.5 * octave]
        })
        .collect()
}

pub fn detect_brisk(img: &Image, params: &BriskParams) -> Vec<Keypoint> {
    let (width, height) = img.dimensions();
    let layers: Vec<Layer> = layer_scales(params.octaves)
        .into_par_iter()
        .filter_map(|scale| {
            let w = (width as f32 / scale).round() as u32;
            let h = (height as f32 / scale).round() as u32;
            if w < 8 || h < 8 {
                return None;
            }
            let image = if scale == 1.0 {
                img.clone()
            } else {
                resize(img, w, h, FilterType::Triangle)
            };
            Some(Layer {
                scale,
                scores: fast::score_map(&image, params.threshold),
            })
        })
        .collect();

    let mut keypoints = Vec::new();
    for (i, layer) in layers.iter().enumerate() {
        let below = i.checked_sub(1).map(|j| &layers[j]);
        let above = layers.get(i + 1);

        for c in local_maxima(&layer.scores, 3, 0.0, true) {
            let (x, y) = (c.x as f32, c.y as f32);
            let s_below = below.map(|l| l.max_near(x, y, layer.scale));
            let s_above = above.map(|l| l.max_near(x, y, layer.scale));
            // Ties go to the finer layer
            if s_below.is_some_and(|s| s >= c.score) || s_above.is_some_and(|s| s > c.score) {
                continue;
            }

            let (dx, dy) = quadratic_offset(&neighbourhood(&layer.scores, c.x, c.y));
            let scale = refine_scale(
                below.map(|l| l.scale).zip(s_below),
                (layer.scale, c.score),
                above.map(|l| l.scale).zip(s_above),
            );

            let bx = (x + dx + 0.5) * layer.scale - 0.5;
            let by = (y + dy + 0.5) * layer.scale - 0.5;
            keypoints.push(
                Keypoint::new(bx, by, BASIC_SIZE * params.pattern_scale * scale)
                    .with_response(c.score)
                    .at_octave(i as u8),
            );
        }
    }
    debug!("BRISK: {} keypoints over {} layers", keypoints.len(), layers.len());
    keypoints
}

/// Vertex of the parabola through the scores of adjacent layers, in log-scale,
/// kept between the neighbouring scales
fn refine_scale(below: Option<(f32, f32)>, here: (f32, f32), above: Option<(f32, f32)>) -> f32 {
    let (Some((s0, v0)), Some((s2, v2))) = (below, above) else {
        return here.0;
    };
    let (s1, v1) = here;
    let denom = v0 - 2.0 * v1 + v2;
    if denom >= 0.0 {
        return s1;
    }
    // Offset in layer steps, -0.5..0.5
    let t = (0.5 * (v0 - v2) / denom).clamp(-0.5, 0.5);
    let (l0, l1, l2) = (s0.ln(), s1.ln(), s2.ln());
    let log_scale = if t < 0.0 { l1 + t * (l1 - l0) } else { l1 + t * (l2 - l1) };
    log_scale.exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::blocks;
    use image::Luma;

    #[test]
    fn test_layer_scales() {
        assert_eq!(layer_scales(3), vec![1.0, 1.5, 2.0, 3.0, 4.0, 6.0]);
        assert_eq!(layer_scales(0), vec![1.0]);
    }

    #[test]
    fn test_refine_scale_stays_between_layers() {
        let s = refine_scale(Some((1.0, 40.0)), (1.5, 60.0), Some((2.0, 50.0)));
        assert!(s > 1.5 && s < 2.0);
        assert_eq!(refine_scale(None, (1.5, 60.0), Some((2.0, 50.0))), 1.5);
        // Not a peak: no refinement
        assert_eq!(refine_scale(Some((1.0, 10.0)), (1.5, 20.0), Some((2.0, 40.0))), 1.5);
    }

    #[test]
    fn test_brisk_keypoints_inside_image() {
        let img = blocks(200, 160, 9, 21);
        let kps = detect_brisk(&img, &BriskParams::default());
        assert!(!kps.is_empty());
        assert!(kps
            .iter()
            .all(|kp| kp.x >= 0.0 && kp.y >= 0.0 && kp.x < 200.0 && kp.y < 160.0));
        assert!(kps.iter().all(|kp| kp.size >= BASIC_SIZE && kp.response.unwrap_or(0.0) >= 30.0));
    }

    #[test]
    fn test_brisk_blank_image() {
        let img = Image::from_pixel(64, 64, Luma([50]));
        assert!(detect_brisk(&img, &BriskParams::default()).is_empty());
    }
}
