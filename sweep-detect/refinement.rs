use ndarray::Array2;
use sweep_core::{Image, Keypoint};

use crate::types::Candidate;
use crate::utils::sort_by_strength;

/// Local maxima of a score map over the 3x3 neighbourhood.
///
/// Pixels closer than `border` to the edge and scores not above `min_score`
/// are ignored. With `strict` a candidate must exceed all eight neighbours,
/// otherwise ties are kept. Output is in row-major order.
pub fn local_maxima(map: &Array2<f32>, border: usize, min_score: f32, strict: bool) -> Vec<Candidate> {
    let (height, width) = map.dim();
    let border = border.max(1);
    if width <= 2 * border || height <= 2 * border {
        return Vec::new();
    }

    let mut found = Vec::new();
    for y in border..height - border {
        for x in border..width - border {
            let v = map[(y, x)];
            if v <= min_score {
                continue;
            }
            let mut is_max = true;
            'window: for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    if (ny, nx) == (y, x) {
                        continue;
                    }
                    let n = map[(ny, nx)];
                    if n > v || (strict && n == v) {
                        is_max = false;
                        break 'window;
                    }
                }
            }
            if is_max {
                found.push(Candidate { x, y, score: v });
            }
        }
    }
    found
}

/// Greedy suppression by distance, strongest response first.
///
/// A keypoint is dropped when an already accepted keypoint lies closer than
/// `radius_of(candidate)`. Keypoints without a response rank last.
pub fn suppress_within_radius(
    keypoints: Vec<Keypoint>,
    radius_of: impl Fn(&Keypoint) -> f32,
) -> Vec<Keypoint> {
    if keypoints.is_empty() {
        return keypoints;
    }

    let mut sorted = keypoints;
    sort_by_strength(&mut sorted, |kp| kp.response.unwrap_or(f32::NEG_INFINITY));

    let mut kept: Vec<Keypoint> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        let r = radius_of(&candidate);
        let r_sq = r * r;
        let clear = kept.iter().all(|existing| {
            let dx = candidate.x - existing.x;
            let dy = candidate.y - existing.y;
            dx * dx + dy * dy >= r_sq
        });
        if clear {
            kept.push(candidate);
        }
    }
    kept
}

/// Sub-pixel offset of the peak of a 3x3 neighbourhood from a quadratic fit.
///
/// `samples[row][col]` with the centre at `[1][1]`. Offsets are clamped to
/// half a pixel; a degenerate fit yields `(0, 0)`.
pub fn quadratic_offset(samples: &[[f32; 3]; 3]) -> (f32, f32) {
    let dx = (samples[1][2] - samples[1][0]) / 2.0;
    let dy = (samples[2][1] - samples[0][1]) / 2.0;
    let dxx = samples[1][2] - 2.0 * samples[1][1] + samples[1][0];
    let dyy = samples[2][1] - 2.0 * samples[1][1] + samples[0][1];
    let dxy = (samples[2][2] - samples[2][0] - samples[0][2] + samples[0][0]) / 4.0;

    let det = dxx * dyy - dxy * dxy;
    if det.abs() < 1e-9 {
        return (0.0, 0.0);
    }

    let offset_x = -(dyy * dx - dxy * dy) / det;
    let offset_y = -(dxx * dy - dxy * dx) / det;
    (offset_x.clamp(-0.5, 0.5), offset_y.clamp(-0.5, 0.5))
}

/// 3x3 neighbourhood of `map` around `(x, y)`, clamped at the borders
pub fn neighbourhood(map: &Array2<f32>, x: usize, y: usize) -> [[f32; 3]; 3] {
    let (height, width) = map.dim();
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        let ny = (y + r).saturating_sub(1).min(height - 1);
        for (c, v) in row.iter_mut().enumerate() {
            let nx = (x + c).saturating_sub(1).min(width - 1);
            *v = map[(ny, nx)];
        }
    }
    out
}

/// Orientation by the intensity centroid of a circular patch, in radians
pub fn intensity_centroid_angle(img: &Image, x: f32, y: f32, radius: i32) -> f32 {
    let (width, height) = img.dimensions();
    let cx = x.round() as i32;
    let cy = y.round() as i32;
    let r_sq = radius * radius;
    let mut m10 = 0i64;
    let mut m01 = 0i64;

    for dy in -radius..=radius {
        let py = cy + dy;
        if py < 0 || py >= height as i32 {
            continue;
        }
        for dx in -radius..=radius {
            let px = cx + dx;
            if px < 0 || px >= width as i32 || dx * dx + dy * dy > r_sq {
                continue;
            }
            let v = img.get_pixel(px as u32, py as u32)[0] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }

    if m10 == 0 && m01 == 0 {
        0.0
    } else {
        (m01 as f32).atan2(m10 as f32)
    }
}
