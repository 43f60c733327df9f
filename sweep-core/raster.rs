//! Float raster helpers shared by the detector and descriptor crates.
//!
//! Rasters are `Array2<f32>` indexed `(row, col)` with intensities scaled
//! to `[0, 1]`.

use image::{ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use ndarray::{Array2, ArrayView2};

use crate::Image;

type LumaFImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// 8-bit image as a `[0, 1]` float raster
pub fn normalized(img: &Image) -> Array2<f32> {
    let (w, h) = img.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
    })
}

/// Float raster back to 8 bits, clamping to the valid range
pub fn quantized(raster: &Array2<f32>) -> Image {
    let (h, w) = raster.dim();
    Image::from_fn(w as u32, h as u32, |x, y| {
        Luma([(raster[(y as usize, x as usize)] * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

/// Gaussian blur through imageproc; `sigma <= 0` returns a copy
pub fn gaussian_blur(raster: &Array2<f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 {
        return raster.clone();
    }
    let (h, w) = raster.dim();
    let img: LumaFImage =
        ImageBuffer::from_fn(w as u32, h as u32, |x, y| Luma([raster[(y as usize, x as usize)]]));
    let blurred = gaussian_blur_f32(&img, sigma);
    Array2::from_shape_fn((h, w), |(y, x)| blurred.get_pixel(x as u32, y as u32)[0])
}

/// Bilinear interpolation with coordinates clamped to the raster
pub fn bilinear_sample(raster: &ArrayView2<f32>, x: f32, y: f32) -> f32 {
    let (h, w) = raster.dim();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let top = raster[(y0, x0)] * (1.0 - dx) + raster[(y0, x1)] * dx;
    let bottom = raster[(y1, x0)] * (1.0 - dx) + raster[(y1, x1)] * dx;
    top * (1.0 - dy) + bottom * dy
}

/// Bilinear resampling to an arbitrary size
pub fn resample(raster: &Array2<f32>, width: usize, height: usize) -> Array2<f32> {
    let (src_h, src_w) = raster.dim();
    if width == 0 || height == 0 {
        return Array2::zeros((height, width));
    }
    let x_ratio = src_w as f32 / width as f32;
    let y_ratio = src_h as f32 / height as f32;
    let view = raster.view();
    Array2::from_shape_fn((height, width), |(y, x)| {
        bilinear_sample(&view, x as f32 * x_ratio, y as f32 * y_ratio)
    })
}

/// Keeps every second row and column
pub fn decimate(raster: &Array2<f32>) -> Array2<f32> {
    let (h, w) = raster.dim();
    Array2::from_shape_fn((h / 2, w / 2), |(y, x)| raster[(2 * y, 2 * x)])
}

/// Central-difference gradients `(d/dx, d/dy)`, one-sided at the borders
pub fn central_gradients(raster: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (h, w) = raster.dim();
    let at = |y: usize, x: usize| raster[(y, x)];
    let gx = Array2::from_shape_fn((h, w), |(y, x)| {
        let l = x.saturating_sub(1);
        let r = (x + 1).min(w - 1);
        if r == l {
            0.0
        } else {
            (at(y, r) - at(y, l)) / (r - l) as f32
        }
    });
    let gy = Array2::from_shape_fn((h, w), |(y, x)| {
        let t = y.saturating_sub(1);
        let b = (y + 1).min(h - 1);
        if b == t {
            0.0
        } else {
            (at(b, x) - at(t, x)) / (b - t) as f32
        }
    });
    (gx, gy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(_, x)| x as f32)
    }

    #[test]
    fn test_bilinear_on_ramp() {
        let r = ramp(8, 4);
        let v = r.view();
        assert!((bilinear_sample(&v, 2.5, 1.0) - 2.5).abs() < 1e-6);
        assert!((bilinear_sample(&v, -3.0, 1.0) - 0.0).abs() < 1e-6);
        assert!((bilinear_sample(&v, 20.0, 1.0) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_roundtrip() {
        let img = Image::from_fn(5, 3, |x, y| Luma([(x * 40 + y) as u8]));
        assert_eq!(quantized(&normalized(&img)), img);
    }

    #[test]
    fn test_gradients_of_ramp() {
        let (gx, gy) = central_gradients(&ramp(6, 5));
        assert!(gx.iter().all(|g| (g - 1.0).abs() < 1e-6));
        assert!(gy.iter().all(|g| g.abs() < 1e-6));
    }

    #[test]
    fn test_decimate_and_resample_shapes() {
        let r = ramp(9, 7);
        assert_eq!(decimate(&r).dim(), (3, 4));
        assert_eq!(resample(&r, 4, 3).dim(), (3, 4));
        assert_eq!(gaussian_blur(&r, 0.0), r);
    }
}
