use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};

use crate::corner_detection::harris_score;
use crate::fast;
use crate::pyramid::ImagePyramid;
use crate::refinement::intensity_centroid_angle;
use crate::utils::sort_by_strength;

/// Ranking applied to FAST corners before the per-level quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbScore {
    Harris,
    Fast,
}

/// Oriented FAST over a scale pyramid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbParams {
    pub n_features: usize,
    pub scale_factor: f32,
    pub n_levels: usize,
    pub edge_threshold: usize,
    pub first_level: usize,
    pub wta_k: usize,
    pub score: OrbScore,
    pub patch_size: usize,
    pub fast_threshold: u8,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            edge_threshold: 31,
            first_level: 0,
            wta_k: 2,
            score: OrbScore::Harris,
            patch_size: 31,
            fast_threshold: 20,
        }
    }
}

const HARRIS_BLOCK: usize = 7;
const HARRIS_K: f32 = 0.04;

impl OrbParams {
    /// Feature budget per level, decaying geometrically with the scale;
    /// the last level takes whatever is left
    pub fn level_quotas(&self, levels: usize) -> Vec<usize> {
        if levels == 0 {
            return Vec::new();
        }
        let factor = 1.0 / self.scale_factor;
        let mut per_level = self.n_features as f32 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));
        if !per_level.is_finite() {
            per_level = self.n_features as f32 / levels as f32;
        }

        let mut quotas = Vec::with_capacity(levels);
        let mut assigned = 0usize;
        for _ in 0..levels - 1 {
            let n = (per_level.round() as usize).min(self.n_features - assigned);
            quotas.push(n);
            assigned += n;
            per_level *= factor;
        }
        quotas.push(self.n_features - assigned);
        quotas
    }
}

pub fn detect_orb(img: &Image, params: &OrbParams) -> Vec<Keypoint> {
    let min_side = 2 * params.edge_threshold + 1;
    let levels = ImagePyramid::generate_scale_levels(
        img.width() as usize,
        img.height() as usize,
        params.scale_factor,
        params.first_level + params.n_levels,
        min_side,
    )
    .into_iter()
    .skip(params.first_level)
    .collect();
    let pyramid = ImagePyramid::build(img, levels);
    let quotas = params.level_quotas(pyramid.len());

    let per_level: Vec<Vec<Keypoint>> = (0..pyramid.len())
        .into_par_iter()
        .map(|i| detect_level(&pyramid, i, quotas[i], params))
        .collect();

    let keypoints: Vec<Keypoint> = per_level.into_iter().flatten().collect();
    debug!("ORB: {} keypoints over {} levels", keypoints.len(), pyramid.len());
    keypoints
}

fn detect_level(pyramid: &ImagePyramid, index: usize, quota: usize, params: &OrbParams) -> Vec<Keypoint> {
    let level = &pyramid.levels[index];
    let image = &pyramid.images[index];
    let edge = params.edge_threshold;

    let mut found: Vec<(usize, usize, f32)> = fast::corners(image, params.fast_threshold, true)
        .into_iter()
        .filter(|c| c.x >= edge && c.y >= edge && c.x + edge < level.width && c.y + edge < level.height)
        .map(|c| (c.x, c.y, c.score))
        .collect();

    if params.score == OrbScore::Harris {
        sort_by_strength(&mut found, |c| c.2);
        found.truncate(2 * quota);
        for c in found.iter_mut() {
            c.2 = harris_score(image, c.0, c.1, HARRIS_BLOCK, HARRIS_K);
        }
    }
    sort_by_strength(&mut found, |c| c.2);
    found.truncate(quota);

    let radius = (params.patch_size / 2) as i32;
    found
        .into_iter()
        .map(|(x, y, response)| {
            let angle = intensity_centroid_angle(image, x as f32, y as f32, radius);
            let (bx, by) = level.to_base(x as f32, y as f32);
            Keypoint::new(bx, by, params.patch_size as f32 * level.scale)
                .with_response(response)
                .with_angle(angle)
                .at_octave(level.level as u8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::blocks;
    use image::Luma;

    #[test]
    fn test_quotas_sum_to_budget() {
        let p = OrbParams::default();
        let q = p.level_quotas(8);
        assert_eq!(q.len(), 8);
        assert_eq!(q.iter().sum::<usize>(), 500);
        assert!(q[0] > q[1] && q[1] > q[2]);
        assert_eq!(p.level_quotas(1), vec![500]);
        assert!(p.level_quotas(0).is_empty());
    }

    #[test]
    fn test_orb_respects_budget_and_orients() {
        let img = blocks(320, 240, 7, 5);
        let kps = detect_orb(&img, &OrbParams::default());
        assert!(!kps.is_empty());
        assert!(kps.len() <= 500);
        assert!(kps.iter().all(|kp| kp.angle.is_some() && kp.response.is_some()));
        assert!(kps.iter().all(|kp| kp.x >= 31.0 && kp.y >= 31.0 && kp.x < 289.0 && kp.y < 209.0));
        assert!(kps.iter().any(|kp| kp.octave > 0));
        assert!(kps.iter().all(|kp| kp.size >= 31.0));
    }

    #[test]
    fn test_orb_small_image_is_empty() {
        let img = Image::from_pixel(50, 50, Luma([90]));
        assert!(detect_orb(&img, &OrbParams::default()).is_empty());
    }
}
