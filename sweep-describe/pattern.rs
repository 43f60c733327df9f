//! Sampling helpers shared by the descriptor variants

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use sweep_core::Image;

/// Pair of sample offsets relative to the keypoint
pub type TestPair = ((f32, f32), (f32, f32));

/// Reproducible isotropic Gaussian test pairs inside a square patch.
///
/// Offsets are drawn with standard deviation `patch_size / 5` and clamped to
/// the patch, the second layout of the original BRIEF study.
pub fn gaussian_pairs(count: usize, patch_size: usize, seed: u64) -> Vec<TestPair> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let sigma = patch_size as f32 / 5.0;
    let half = (patch_size / 2) as f32 - 1.0;
    let mut draw = || {
        let v: f32 = StandardNormal.sample(&mut rng);
        (v * sigma).round().clamp(-half, half)
    };
    (0..count)
        .map(|_| ((draw(), draw()), (draw(), draw())))
        .collect()
}

/// Pack comparison outcomes into `bytes` bytes, bit `i` in byte `i / 8`
/// at position `i % 8`
pub fn pack_bits(bits: impl IntoIterator<Item = bool>, bytes: usize) -> Vec<u8> {
    let mut d = vec![0u8; bytes];
    for (i, bit) in bits.into_iter().take(bytes * 8).enumerate() {
        d[i / 8] |= (bit as u8) << (i % 8);
    }
    d
}

/// Stack per-keypoint rows into a matrix with `width` columns
pub fn rows_to_matrix<T: Copy + Default>(rows: &[Vec<T>], width: usize) -> Array2<T> {
    Array2::from_shape_fn((rows.len(), width), |(i, j)| {
        rows[i].get(j).copied().unwrap_or_default()
    })
}

/// Bilinear interpolation on an 8-bit image, clamped to the image bounds
pub fn bilinear_sample(img: &Image, x: f32, y: f32) -> f32 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let p = |x: u32, y: u32| img.get_pixel(x, y)[0] as f32;
    let top = p(x0, y0) * (1.0 - dx) + p(x1, y0) * dx;
    let bottom = p(x0, y1) * (1.0 - dx) + p(x1, y1) * dx;
    top * (1.0 - dy) + bottom * dy
}

/// Summed-area table for box-smoothed point samples
pub struct IntegralImage {
    sums: Array2<f64>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    pub fn new(img: &Image) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let mut sums = Array2::<f64>::zeros((h + 1, w + 1));
        for y in 0..h {
            let mut row = 0.0;
            for x in 0..w {
                row += img.get_pixel(x as u32, y as u32)[0] as f64;
                sums[(y + 1, x + 1)] = sums[(y, x + 1)] + row;
            }
        }
        Self {
            sums,
            width: w,
            height: h,
        }
    }

    /// Mean over the box of half-width `radius` centred on `(x, y)`, cut at
    /// the image border. Radii under half a pixel fall back to the nearest pixel.
    pub fn box_mean(&self, x: f32, y: f32, radius: f32) -> f32 {
        let r = radius.max(0.5);
        let clamp_x = |v: f32| v.round().clamp(0.0, self.width as f32) as usize;
        let clamp_y = |v: f32| v.round().clamp(0.0, self.height as f32) as usize;
        let (mut x0, mut x1) = (clamp_x(x - r), clamp_x(x + r));
        let (mut y0, mut y1) = (clamp_y(y - r), clamp_y(y + r));
        if x1 <= x0 {
            x0 = x0.min(self.width - 1);
            x1 = x0 + 1;
        }
        if y1 <= y0 {
            y0 = y0.min(self.height - 1);
            y1 = y0 + 1;
        }
        let area = ((x1 - x0) * (y1 - y0)) as f64;
        let s = self.sums[(y1, x1)] - self.sums[(y0, x1)] - self.sums[(y1, x0)] + self.sums[(y0, x0)];
        (s / area) as f32
    }
}
