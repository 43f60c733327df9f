use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use ndarray::Array2;
use sweep_core::Image;

/// Sobel responses normalised to intensity units in `[0, 1]`
pub fn sobel(img: &Image) -> (Array2<f32>, Array2<f32>) {
    const NORM: f32 = 1.0 / (8.0 * 255.0);
    let gx = horizontal_sobel(img);
    let gy = vertical_sobel(img);
    let (w, h) = img.dimensions();
    let to_array = |g: &image::ImageBuffer<image::Luma<i16>, Vec<i16>>| {
        Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            g.get_pixel(x as u32, y as u32)[0] as f32 * NORM
        })
    };
    (to_array(&gx), to_array(&gy))
}

/// Window sums of a raster over a `block` x `block` box.
///
/// Even blocks are anchored the usual way, reaching `block / 2` pixels back
/// and `block - 1 - block / 2` forward. The window is cut at the borders.
pub fn box_sum(a: &Array2<f32>, block: usize) -> Array2<f32> {
    let (h, w) = a.dim();
    let mut integral = Array2::<f64>::zeros((h + 1, w + 1));
    for y in 0..h {
        let mut row = 0.0f64;
        for x in 0..w {
            row += a[(y, x)] as f64;
            integral[(y + 1, x + 1)] = integral[(y, x + 1)] + row;
        }
    }

    let before = block / 2;
    let after = block.saturating_sub(1 + before);
    Array2::from_shape_fn((h, w), |(y, x)| {
        let y0 = y.saturating_sub(before);
        let y1 = (y + after + 1).min(h);
        let x0 = x.saturating_sub(before);
        let x1 = (x + after + 1).min(w);
        (integral[(y1, x1)] - integral[(y0, x1)] - integral[(y1, x0)] + integral[(y0, x0)]) as f32
    })
}

/// Second-moment matrix entries summed over a block
pub struct StructureTensor {
    pub xx: Array2<f32>,
    pub xy: Array2<f32>,
    pub yy: Array2<f32>,
}

impl StructureTensor {
    pub fn compute(img: &Image, block: usize) -> Self {
        let (gx, gy) = sobel(img);
        Self {
            xx: box_sum(&(&gx * &gx), block),
            xy: box_sum(&(&gx * &gy), block),
            yy: box_sum(&(&gy * &gy), block),
        }
    }

    /// Smaller eigenvalue per pixel
    pub fn min_eigenvalue(&self) -> Array2<f32> {
        ndarray::Zip::from(&self.xx)
            .and(&self.xy)
            .and(&self.yy)
            .map_collect(|&a, &b, &c| {
                let half_trace = (a + c) * 0.5;
                let half_diff = (a - c) * 0.5;
                half_trace - (half_diff * half_diff + b * b).sqrt()
            })
    }

    /// `det(M) - k * trace(M)^2` per pixel
    pub fn harris(&self, k: f32) -> Array2<f32> {
        ndarray::Zip::from(&self.xx)
            .and(&self.xy)
            .and(&self.yy)
            .map_collect(|&a, &b, &c| {
                let trace = a + c;
                a * c - b * b - k * trace * trace
            })
    }
}
