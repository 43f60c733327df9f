//! Synthetic images for detector tests

use image::Luma;
use sweep_core::Image;

/// Dark canvas with bright squares given as `(x, y, side)`
pub fn squares(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> Image {
    Image::from_fn(width, height, |x, y| {
        let inside = squares
            .iter()
            .any(|&(sx, sy, s)| x >= sx && x < sx + s && y >= sy && y < sy + s);
        Luma([if inside { 210 } else { 30 }])
    })
}

/// Blocks of pseudo-random intensity, `cell` pixels wide
pub fn blocks(width: u32, height: u32, cell: u32, seed: u32) -> Image {
    Image::from_fn(width, height, |x, y| {
        let mut h = (x / cell).wrapping_mul(0x9E37_79B1) ^ (y / cell).wrapping_mul(0x85EB_CA77) ^ seed;
        h ^= h >> 15;
        h = h.wrapping_mul(0x2C1B_3C6D);
        h ^= h >> 12;
        Luma([(h % 200) as u8 + 28])
    })
}
