use image::imageops::{resize, FilterType};
use sweep_core::Image;

use crate::types::ScaleLevel;

/// Geometric image pyramid for multi-scale detection
pub struct ImagePyramid {
    pub levels: Vec<ScaleLevel>,
    pub images: Vec<Image>,
}

impl ImagePyramid {
    /// Generate scale levels, stopping once a level would be smaller than
    /// `min_side` in either dimension
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        scale_factor: f32,
        max_levels: usize,
        min_side: usize,
    ) -> Vec<ScaleLevel> {
        let mut levels = Vec::new();
        let mut current_scale = 1.0f32;

        for level in 0..max_levels {
            let scaled_width = ((width as f32) / current_scale).round() as usize;
            let scaled_height = ((height as f32) / current_scale).round() as usize;

            if scaled_width < min_side || scaled_height < min_side {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale: current_scale,
                width: scaled_width,
                height: scaled_height,
            });

            current_scale *= scale_factor;
        }

        levels
    }

    /// Build image pyramid from base image with bilinear resampling
    pub fn build(img: &Image, levels: Vec<ScaleLevel>) -> Self {
        let images = levels
            .iter()
            .map(|level| {
                if level.level == 0 && level.width == img.width() as usize {
                    img.clone()
                } else {
                    resize(img, level.width as u32, level.height as u32, FilterType::Triangle)
                }
            })
            .collect();
        Self { levels, images }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
