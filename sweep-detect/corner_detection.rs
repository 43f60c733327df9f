use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint};

use crate::gradient::StructureTensor;
use crate::refinement::{local_maxima, suppress_within_radius};
use crate::utils::sort_by_strength;

/// Minimum-eigenvalue corners ranked by quality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShiTomasiParams {
    pub block_size: usize,
    /// Allowed overlap between neighbouring corners, in `[0, 1)`
    pub max_overlap: f32,
    /// Fraction of the strongest corner a candidate must exceed
    pub quality_level: f32,
}

impl Default for ShiTomasiParams {
    fn default() -> Self {
        Self {
            block_size: 4,
            max_overlap: 0.0,
            quality_level: 0.01,
        }
    }
}

impl ShiTomasiParams {
    pub fn min_distance(&self) -> f32 {
        (1.0 - self.max_overlap) * self.block_size as f32
    }

    /// Corner budget: image area over the minimum corner spacing
    pub fn max_corners(&self, width: u32, height: u32) -> usize {
        let area = width as f32 * height as f32;
        (area / self.min_distance().max(1.0)) as usize
    }
}

/// Shi-Tomasi detection. Keypoints come out strongest first and carry no
/// response; their order is the ranking.
pub fn detect_shi_tomasi(img: &Image, params: &ShiTomasiParams) -> Vec<Keypoint> {
    let (width, height) = img.dimensions();
    let eig = StructureTensor::compute(img, params.block_size).min_eigenvalue();
    let strongest = eig.iter().copied().fold(0.0f32, f32::max);
    if strongest <= 0.0 {
        return Vec::new();
    }

    let threshold = strongest * params.quality_level;
    let mut candidates = local_maxima(&eig, 1, threshold, false);
    sort_by_strength(&mut candidates, |c| c.score);

    let min_dist = params.min_distance();
    let min_dist_sq = min_dist * min_dist;
    let budget = params.max_corners(width, height);
    let mut grid = SpacingGrid::new(width as usize, height as usize, min_dist);
    let mut corners = Vec::new();

    for c in candidates {
        if corners.len() >= budget {
            break;
        }
        let (x, y) = (c.x as f32, c.y as f32);
        if grid.has_neighbour_within(x, y, min_dist_sq) {
            continue;
        }
        grid.insert(x, y);
        corners.push(Keypoint::new(x, y, params.block_size as f32));
    }
    corners
}

/// Bucketed point set for minimum-distance checks
struct SpacingGrid {
    cell: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<(f32, f32)>>,
}

impl SpacingGrid {
    fn new(width: usize, height: usize, min_dist: f32) -> Self {
        let cell = min_dist.max(1.0);
        let cols = (width as f32 / cell).ceil() as usize + 1;
        let rows = (height as f32 / cell).ceil() as usize + 1;
        Self {
            cell,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
        }
    }

    fn cell_of(&self, x: f32, y: f32) -> (usize, usize) {
        let cx = ((x / self.cell) as usize).min(self.cols - 1);
        let cy = ((y / self.cell) as usize).min(self.rows - 1);
        (cx, cy)
    }

    fn has_neighbour_within(&self, x: f32, y: f32, dist_sq: f32) -> bool {
        let (cx, cy) = self.cell_of(x, y);
        for gy in cy.saturating_sub(1)..=(cy + 1).min(self.rows - 1) {
            for gx in cx.saturating_sub(1)..=(cx + 1).min(self.cols - 1) {
                let hit = self.cells[gy * self.cols + gx].iter().any(|&(px, py)| {
                    let dx = px - x;
                    let dy = py - y;
                    dx * dx + dy * dy < dist_sq
                });
                if hit {
                    return true;
                }
            }
        }
        false
    }

    fn insert(&mut self, x: f32, y: f32) {
        let (cx, cy) = self.cell_of(x, y);
        self.cells[cy * self.cols + cx].push((x, y));
    }
}

/// Harris cornerness thresholded on the min-max normalised response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarrisParams {
    pub block_size: usize,
    pub aperture_size: usize,
    pub k: f32,
    /// Threshold on the response rescaled to `[0, 255]`
    pub min_response: f32,
    pub max_overlap: f32,
}

impl Default for HarrisParams {
    fn default() -> Self {
        Self {
            block_size: 2,
            aperture_size: 3,
            k: 0.04,
            min_response: 100.0,
            max_overlap: 0.0,
        }
    }
}

/// Harris detection: 3x3 local maxima of the normalised response above the
/// threshold, then overlapping keypoints resolved in favour of the stronger.
///
/// Only pixels with a positive raw response qualify. Min-max normalisation
/// lifts flat regions and edges to mid-range values once strong edges are
/// present, and those are not corners.
pub fn detect_harris(img: &Image, params: &HarrisParams) -> Vec<Keypoint> {
    let raw = StructureTensor::compute(img, params.block_size).harris(params.k);
    let response = normalize_min_max(&raw);
    let size = 2.0 * params.aperture_size as f32;
    let candidates = local_maxima(&response, 1, params.min_response, false)
        .into_iter()
        .filter(|c| raw[(c.y, c.x)] > 0.0)
        .map(|c| Keypoint::new(c.x as f32, c.y as f32, size).with_response(c.score))
        .collect();

    // Two keypoints of equal size overlap once their centres are closer than one diameter
    let spacing = size * (1.0 - params.max_overlap);
    suppress_within_radius(candidates, |_| spacing)
}

/// Harris response rescaled so its minimum maps to 0 and maximum to 255
pub fn normalized_harris(img: &Image, params: &HarrisParams) -> Array2<f32> {
    normalize_min_max(&StructureTensor::compute(img, params.block_size).harris(params.k))
}

/// A constant raster maps to all zeros
fn normalize_min_max(raw: &Array2<f32>) -> Array2<f32> {
    let (lo, hi) = raw
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    if !span.is_finite() || span <= 0.0 {
        return Array2::zeros(raw.dim());
    }
    raw.mapv(|v| (v - lo) / span * 255.0)
}

/// Harris response at a single pixel from Sobel gradients summed over a
/// `block` x `block` window; zero near the border
pub fn harris_score(img: &Image, x: usize, y: usize, block: usize, k: f32) -> f32 {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let r = block / 2;
    if x < r + 1 || y < r + 1 || x + r + 1 >= width || y + r + 1 >= height {
        return 0.0;
    }

    let px = |x: usize, y: usize| img.get_pixel(x as u32, y as u32)[0] as f32;
    let mut ixx = 0.0f64;
    let mut ixy = 0.0f64;
    let mut iyy = 0.0f64;

    for ny in y - r..=y + r {
        for nx in x - r..=x + r {
            let gx = px(nx + 1, ny - 1) + 2.0 * px(nx + 1, ny) + px(nx + 1, ny + 1)
                - px(nx - 1, ny - 1)
                - 2.0 * px(nx - 1, ny)
                - px(nx - 1, ny + 1);
            let gy = px(nx - 1, ny + 1) + 2.0 * px(nx, ny + 1) + px(nx + 1, ny + 1)
                - px(nx - 1, ny - 1)
                - 2.0 * px(nx, ny - 1)
                - px(nx + 1, ny - 1);
            let (gx, gy) = ((gx / 8.0) as f64, (gy / 8.0) as f64);
            ixx += gx * gx;
            ixy += gx * gy;
            iyy += gy * gy;
        }
    }

    let k = k as f64;
    let det = ixx * iyy - ixy * ixy;
    let trace = ixx + iyy;
    (det - k * trace * trace) as f32
}
