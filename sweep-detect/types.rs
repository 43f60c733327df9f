/// Grid location on a score map with its detector score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x: usize,
    pub y: usize,
    pub score: f32,
}

/// Scale information for pyramid levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    /// Base-image pixels per level pixel
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}

impl ScaleLevel {
    /// Map a level coordinate back onto the base image
    pub fn to_base(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale, y * self.scale)
    }
}
