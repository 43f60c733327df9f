//! Descriptor extraction strategies.
//!
//! [`Extractor`] is built once per sweep combination from a
//! [`DescriptorType`]; each variant precomputes its sampling pattern and
//! fills one descriptor row per keypoint, in keypoint order.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sweep_core::{DescriptorKind, Descriptors, Image, Keypoint, SweepError};

pub mod akaze;
pub mod brief;
pub mod brisk;
pub mod freak;
pub mod orb;
pub mod pattern;
pub mod sift;

pub use akaze::{AkazeDescriptorParams, AkazeExtractor};
pub use brief::{BriefExtractor, BriefParams};
pub use brisk::{BriskDescriptorParams, BriskExtractor};
pub use freak::{FreakExtractor, FreakParams};
pub use orb::{OrbDescriptorParams, OrbExtractor};
pub use sift::{SiftDescriptorParams, SiftExtractor};

/// Descriptor names as they appear in configurations and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DescriptorType {
    Brief,
    Brisk,
    Freak,
    Orb,
    Akaze,
    Sift,
}

impl DescriptorType {
    pub const ALL: [DescriptorType; 6] = [
        DescriptorType::Brief,
        DescriptorType::Brisk,
        DescriptorType::Freak,
        DescriptorType::Orb,
        DescriptorType::Akaze,
        DescriptorType::Sift,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DescriptorType::Brief => "BRIEF",
            DescriptorType::Brisk => "BRISK",
            DescriptorType::Freak => "FREAK",
            DescriptorType::Orb => "ORB",
            DescriptorType::Akaze => "AKAZE",
            DescriptorType::Sift => "SIFT",
        }
    }

    /// Value domain of the rows, which fixes the matching metric
    pub fn kind(&self) -> DescriptorKind {
        match self {
            DescriptorType::Sift => DescriptorKind::Gradient,
            _ => DescriptorKind::Binary,
        }
    }

    /// Row width: bytes for binary descriptors, components for SIFT
    pub fn width(&self) -> usize {
        match self {
            DescriptorType::Brief => BriefParams::default().bytes,
            DescriptorType::Brisk => BriskDescriptorParams::default().bytes,
            DescriptorType::Freak => FreakParams::default().bytes,
            DescriptorType::Orb => OrbDescriptorParams::default().bytes,
            DescriptorType::Akaze => AkazeDescriptorParams::default().bytes(),
            DescriptorType::Sift => sift::descriptor_len(),
        }
    }
}

impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DescriptorType {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['-', '_'], "");
        DescriptorType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| SweepError::UnknownDescriptor(s.to_string()))
    }
}

impl TryFrom<String> for DescriptorType {
    type Error = SweepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DescriptorType> for String {
    fn from(t: DescriptorType) -> Self {
        t.name().to_string()
    }
}

/// A descriptor variant with its parameters and precomputed pattern
pub enum Extractor {
    Brief(BriefExtractor),
    Brisk(BriskExtractor),
    Freak(FreakExtractor),
    Orb(OrbExtractor),
    Akaze(AkazeExtractor),
    Sift(SiftExtractor),
}

impl Extractor {
    /// Variant with its fixed default parameters
    pub fn new(descriptor_type: DescriptorType) -> Self {
        match descriptor_type {
            DescriptorType::Brief => Extractor::Brief(BriefExtractor::new(BriefParams::default())),
            DescriptorType::Brisk => {
                Extractor::Brisk(BriskExtractor::new(BriskDescriptorParams::default()))
            }
            DescriptorType::Freak => Extractor::Freak(FreakExtractor::new(FreakParams::default())),
            DescriptorType::Orb => Extractor::Orb(OrbExtractor::new(OrbDescriptorParams::default())),
            DescriptorType::Akaze => {
                Extractor::Akaze(AkazeExtractor::new(AkazeDescriptorParams::default()))
            }
            DescriptorType::Sift => Extractor::Sift(SiftExtractor::new(SiftDescriptorParams::default())),
        }
    }

    pub fn from_name(name: &str) -> Result<Self, SweepError> {
        name.parse().map(Extractor::new)
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            Extractor::Brief(_) => DescriptorType::Brief,
            Extractor::Brisk(_) => DescriptorType::Brisk,
            Extractor::Freak(_) => DescriptorType::Freak,
            Extractor::Orb(_) => DescriptorType::Orb,
            Extractor::Akaze(_) => DescriptorType::Akaze,
            Extractor::Sift(_) => DescriptorType::Sift,
        }
    }

    /// Row `i` of the result describes `keypoints[i]`
    pub fn describe(&self, img: &Image, keypoints: &[Keypoint]) -> Descriptors {
        let t = self.descriptor_type();
        if keypoints.is_empty() {
            return Descriptors::empty(t.kind(), t.width());
        }
        if img.width() == 0 || img.height() == 0 {
            // Nothing to sample: keep one row per keypoint, all zero
            let shape = (keypoints.len(), t.width());
            return match t.kind() {
                DescriptorKind::Binary => Descriptors::Binary(Array2::zeros(shape)),
                DescriptorKind::Gradient => Descriptors::Float(Array2::zeros(shape)),
            };
        }
        log::trace!("{} describing {} keypoints", t, keypoints.len());
        match self {
            Extractor::Brief(e) => Descriptors::Binary(e.describe(img, keypoints)),
            Extractor::Brisk(e) => Descriptors::Binary(e.describe(img, keypoints)),
            Extractor::Freak(e) => Descriptors::Binary(e.describe(img, keypoints)),
            Extractor::Orb(e) => Descriptors::Binary(e.describe(img, keypoints)),
            Extractor::Akaze(e) => Descriptors::Binary(e.describe(img, keypoints)),
            Extractor::Sift(e) => Descriptors::Float(e.describe(img, keypoints)),
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Extractor").field(&self.descriptor_type()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use proptest::prelude::*;

    fn texture() -> Image {
        Image::from_fn(128, 96, |x, y| {
            let v = ((x * 31 + y * 17) % 97) as f32 + 60.0 * ((x as f32 / 4.0).sin() + (y as f32 / 7.0).cos());
            Luma([v.clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn test_names_parse_case_insensitively() {
        for t in DescriptorType::ALL {
            assert_eq!(t.name().parse::<DescriptorType>(), Ok(t));
            assert_eq!(t.name().to_lowercase().parse::<DescriptorType>(), Ok(t));
            assert_eq!(Extractor::new(t).descriptor_type(), t);
        }
        assert_eq!(
            "SURF".parse::<DescriptorType>(),
            Err(SweepError::UnknownDescriptor("SURF".into()))
        );
        assert_eq!(" a-kaze ".parse::<DescriptorType>(), Ok(DescriptorType::Akaze));
        assert_eq!("Br_ief".parse::<DescriptorType>(), Ok(DescriptorType::Brief));
    }

    #[test]
    fn test_image_without_pixels_gives_zero_rows() {
        let img = Image::new(0, 0);
        let kps = vec![Keypoint::new(0.0, 0.0, 7.0), Keypoint::new(3.0, 2.0, 12.0).with_angle(0.5)];
        for t in DescriptorType::ALL {
            let d = Extractor::new(t).describe(&img, &kps);
            assert_eq!(d.rows(), kps.len(), "{t}");
            assert_eq!(d.width(), t.width(), "{t}");
            match d {
                Descriptors::Binary(m) => assert!(m.iter().all(|&b| b == 0)),
                Descriptors::Float(m) => assert!(m.iter().all(|&v| v == 0.0)),
            }
        }
    }

    #[test]
    fn test_only_sift_is_gradient() {
        for t in DescriptorType::ALL {
            let expected = if t == DescriptorType::Sift {
                DescriptorKind::Gradient
            } else {
                DescriptorKind::Binary
            };
            assert_eq!(t.kind(), expected);
        }
    }

    #[test]
    fn test_empty_keypoints_give_empty_matrix() {
        for t in DescriptorType::ALL {
            let d = Extractor::new(t).describe(&texture(), &[]);
            assert!(d.is_empty());
            assert_eq!(d.width(), t.width());
            assert_eq!(d.kind(), t.kind());
        }
    }

    #[test]
    fn test_rows_align_with_keypoints_for_every_variant() {
        let img = texture();
        let kps: Vec<Keypoint> = (0..9)
            .map(|i| Keypoint::new(8.0 + 13.0 * i as f32, 10.0 + 9.0 * i as f32, 6.0 + 2.0 * i as f32))
            .collect();
        for t in DescriptorType::ALL {
            let d = Extractor::new(t).describe(&img, &kps);
            assert_eq!(d.rows(), kps.len(), "{t}");
            assert_eq!(d.width(), t.width(), "{t}");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn prop_rows_match_keypoint_count(
            pts in prop::collection::vec((0.0f32..128.0, 0.0f32..96.0, 3.0f32..40.0), 0..24),
            which in 0usize..6,
        ) {
            let kps: Vec<Keypoint> = pts.into_iter().map(|(x, y, s)| Keypoint::new(x, y, s)).collect();
            let t = DescriptorType::ALL[which];
            let d = Extractor::new(t).describe(&texture(), &kps);
            prop_assert_eq!(d.rows(), kps.len());
            prop_assert_eq!(d.kind(), t.kind());
        }
    }
}
