use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};

use crate::refinement::local_maxima;
use crate::types::Candidate;
use crate::utils::has_consecutive_bits;

/// Bresenham circle of radius 3, clockwise from twelve o'clock
pub const FAST_OFFSETS: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1),
    (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1),
    (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// Contiguous arc length of the 9/16 segment test
pub const ARC_LENGTH: usize = 9;

/// Pixels too close to the border for the circle
const BORDER: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastParams {
    pub threshold: u8,
    pub nonmax_suppression: bool,
    pub keypoint_size: f32,
}

impl Default for FastParams {
    fn default() -> Self {
        Self {
            threshold: 10,
            nonmax_suppression: true,
            keypoint_size: 7.0,
        }
    }
}

/// FAST-9/16 keypoints with the corner score as response
pub fn detect_fast(img: &Image, params: &FastParams) -> Vec<Keypoint> {
    corners(img, params.threshold, params.nonmax_suppression)
        .into_iter()
        .map(|c| Keypoint::new(c.x as f32, c.y as f32, params.keypoint_size).with_response(c.score))
        .collect()
}

/// Segment-test corners in row-major order
pub fn corners(img: &Image, threshold: u8, nonmax_suppression: bool) -> Vec<Candidate> {
    let scores = score_map(img, threshold);
    if nonmax_suppression {
        local_maxima(&scores, BORDER, 0.0, true)
    } else {
        scores
            .indexed_iter()
            .filter(|(_, &s)| s > 0.0)
            .map(|((y, x), &score)| Candidate { x, y, score })
            .collect()
    }
}

/// Corner score per pixel, zero where the segment test fails.
/// Rows are scored in parallel.
pub fn score_map(img: &Image, threshold: u8) -> Array2<f32> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let mut map = Array2::zeros((height, width));
    if width <= 2 * BORDER || height <= 2 * BORDER {
        return map;
    }

    let raw = img.as_raw();
    let rows: Vec<(usize, Vec<(usize, f32)>)> = (BORDER..height - BORDER)
        .into_par_iter()
        .map(|y| {
            let hits = (BORDER..width - BORDER)
                .filter_map(|x| corner_score(raw, width, x, y, threshold).map(|s| (x, s)))
                .collect();
            (y, hits)
        })
        .collect();

    for (y, hits) in rows {
        for (x, s) in hits {
            map[(y, x)] = s;
        }
    }
    map
}

/// Largest threshold at which `(x, y)` still passes the segment test, or
/// `None` when it fails at `threshold`
pub fn corner_score(raw: &[u8], width: usize, x: usize, y: usize, threshold: u8) -> Option<f32> {
    let center = raw[y * width + x] as i32;
    let t = threshold as i32;

    let mut diffs = [0i32; 16];
    let mut brighter = 0u16;
    let mut darker = 0u16;
    for (i, &(dx, dy)) in FAST_OFFSETS.iter().enumerate() {
        let px = (x as i32 + dx) as usize;
        let py = (y as i32 + dy) as usize;
        let d = raw[py * width + px] as i32 - center;
        diffs[i] = d;
        if d > t {
            brighter |= 1 << i;
        } else if d < -t {
            darker |= 1 << i;
        }
    }

    if !has_consecutive_bits(brighter, ARC_LENGTH) && !has_consecutive_bits(darker, ARC_LENGTH) {
        return None;
    }

    // Best arc: the weakest pixel on it bounds the threshold it survives
    let mut best = 0;
    for start in 0..16 {
        let mut min_bright = i32::MAX;
        let mut min_dark = i32::MAX;
        for k in 0..ARC_LENGTH {
            let d = diffs[(start + k) % 16];
            min_bright = min_bright.min(d);
            min_dark = min_dark.min(-d);
        }
        best = best.max(min_bright).max(min_dark);
    }
    Some((best - 1).max(t) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::{blocks, squares};
    use image::Luma;

    fn single_corner_image() -> Image {
        // Bright square whose top-left corner sits at (10, 10)
        squares(30, 30, &[(10, 10, 12)])
    }

    #[test]
    fn test_fast_detects_square_corner() {
        let kps = detect_fast(&single_corner_image(), &FastParams::default());
        assert!(!kps.is_empty());
        assert!(kps
            .iter()
            .any(|kp| (kp.x - 10.0).abs() <= 1.0 && (kp.y - 10.0).abs() <= 1.0));
        assert!(kps.iter().all(|kp| kp.size == 7.0 && kp.response.unwrap_or(0.0) >= 10.0));
    }

    #[test]
    fn test_uniform_image_has_no_corners() {
        let img = Image::from_pixel(40, 40, Luma([128]));
        assert!(detect_fast(&img, &FastParams::default()).is_empty());
    }

    #[test]
    fn test_tiny_image_is_empty() {
        let img = Image::from_pixel(6, 6, Luma([0]));
        assert!(detect_fast(&img, &FastParams::default()).is_empty());
        assert_eq!(score_map(&img, 10).dim(), (6, 6));
    }

    #[test]
    fn test_score_is_at_least_threshold() {
        let img = blocks(64, 64, 5, 7);
        let map = score_map(&img, 10);
        assert!(map.iter().all(|&s| s == 0.0 || s >= 10.0));
    }

    #[test]
    fn test_nms_reduces_corner_count() {
        let img = blocks(96, 96, 6, 3);
        let all = corners(&img, 10, false);
        let suppressed = corners(&img, 10, true);
        assert!(!suppressed.is_empty());
        assert!(suppressed.len() < all.len());
    }

    #[test]
    fn test_higher_threshold_finds_fewer() {
        let img = blocks(96, 96, 6, 11);
        let low = corners(&img, 10, true).len();
        let high = corners(&img, 60, true).len();
        assert!(high <= low);
    }

    #[test]
    fn test_score_of_isolated_dot() {
        // A single bright pixel: all 16 circle pixels darker by 200
        let mut img = Image::from_pixel(9, 9, Luma([20]));
        img.put_pixel(4, 4, Luma([220]));
        let score = corner_score(img.as_raw(), 9, 4, 4, 10);
        assert_eq!(score, Some(199.0));
        assert_eq!(corner_score(img.as_raw(), 9, 4, 4, 250), None);
    }

    proptest::proptest! {
        #[test]
        fn prop_scores_respect_threshold(
            pixels in proptest::collection::vec(proptest::prelude::any::<u8>(), 24 * 24),
            threshold in 1u8..80,
        ) {
            let img = Image::from_raw(24, 24, pixels).unwrap_or_default();
            let map = score_map(&img, threshold);
            proptest::prop_assert!(map.iter().all(|&s| s == 0.0 || s >= threshold as f32));
            proptest::prop_assert!(map.row(0).iter().all(|&s| s == 0.0));
        }
    }
}
