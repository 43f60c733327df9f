use serde::{Deserialize, Serialize};

use crate::{Image, Keypoint};

/// Axis-aligned pixel rectangle with half-open containment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanning the whole image
    pub fn covering(image: &Image) -> Self {
        let (width, height) = image.dimensions();
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `x <= px < x + width` and `y <= py < y + height`
    pub fn contains(&self, px: f32, py: f32) -> bool {
        let (x0, y0) = (self.x as f32, self.y as f32);
        x0 <= px && px < x0 + self.width as f32 && y0 <= py && py < y0 + self.height as f32
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl std::str::FromStr for Rect {
    type Err = String;

    /// Parses `x,y,width,height`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("expected x,y,width,height, got `{s}`"));
        }
        let x = parts[0].parse::<i32>().map_err(|e| format!("bad x `{}`: {e}", parts[0]))?;
        let y = parts[1].parse::<i32>().map_err(|e| format!("bad y `{}`: {e}", parts[1]))?;
        let w = parts[2].parse::<u32>().map_err(|e| format!("bad width `{}`: {e}", parts[2]))?;
        let h = parts[3].parse::<u32>().map_err(|e| format!("bad height `{}`: {e}", parts[3]))?;
        Ok(Self::new(x, y, w, h))
    }
}

/// Keypoints whose location lies inside `rect`, in their original order
pub fn filter_keypoints(keypoints: &[Keypoint], rect: &Rect) -> Vec<Keypoint> {
    keypoints
        .iter()
        .filter(|kp| rect.contains(kp.x, kp.y))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_containment_is_half_open() {
        let rect = Rect::new(10, 20, 5, 5);
        assert!(rect.contains(10.0, 20.0));
        assert!(rect.contains(14.9, 24.9));
        assert!(!rect.contains(15.0, 22.0));
        assert!(!rect.contains(12.0, 25.0));
        assert!(!rect.contains(9.99, 22.0));
    }

    #[test]
    fn test_filter_preserves_order() {
        let kps = vec![
            Keypoint::new(1.0, 1.0, 4.0),
            Keypoint::new(50.0, 50.0, 4.0),
            Keypoint::new(3.0, 2.0, 4.0),
            Keypoint::new(2.0, 9.0, 4.0),
        ];
        let kept = filter_keypoints(&kps, &Rect::new(0, 0, 5, 5));
        assert_eq!(kept, vec![kps[0], kps[2]]);
    }

    #[test]
    fn test_rect_outside_everything_keeps_nothing() {
        let kps = vec![Keypoint::new(1.0, 1.0, 4.0), Keypoint::new(8.0, 3.0, 4.0)];
        assert!(filter_keypoints(&kps, &Rect::new(100, 100, 10, 10)).is_empty());
        assert!(filter_keypoints(&kps, &Rect::new(0, 0, 0, 10)).is_empty());
    }

    #[test]
    fn test_parse_rect() {
        assert_eq!("535, 180, 180, 150".parse::<Rect>(), Ok(Rect::new(535, 180, 180, 150)));
        assert!("1,2,3".parse::<Rect>().is_err());
        assert!("1,2,-3,4".parse::<Rect>().is_err());
    }

    fn keypoints_strategy() -> impl Strategy<Value = Vec<Keypoint>> {
        prop::collection::vec((0.0f32..200.0, 0.0f32..100.0), 0..64)
            .prop_map(|pts| pts.into_iter().map(|(x, y)| Keypoint::new(x, y, 4.0)).collect())
    }

    proptest! {
        #[test]
        fn prop_filter_is_idempotent(
            kps in keypoints_strategy(),
            x in -20i32..200, y in -20i32..100, w in 0u32..120, h in 0u32..120,
        ) {
            let rect = Rect::new(x, y, w, h);
            let once = filter_keypoints(&kps, &rect);
            let twice = filter_keypoints(&once, &rect);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_full_image_rect_keeps_everything(kps in keypoints_strategy()) {
            let image = Image::new(200, 100);
            prop_assert_eq!(filter_keypoints(&kps, &Rect::covering(&image)), kps);
        }
    }
}
