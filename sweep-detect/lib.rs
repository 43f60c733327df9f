//! Keypoint detector strategies.
//!
//! [`Detector`] is a closed set of variants, each carrying its fixed
//! parameter block, dispatched from [`Detector::detect`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sweep_core::{Image, Keypoint, SweepError};

pub mod akaze;
pub mod brisk;
pub mod corner_detection;
pub mod fast;
pub mod gradient;
pub mod orb;
pub mod pyramid;
pub mod refinement;
pub mod sift;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_images;

pub use akaze::AkazeParams;
pub use brisk::BriskParams;
pub use corner_detection::{HarrisParams, ShiTomasiParams};
pub use fast::FastParams;
pub use orb::OrbParams;
pub use sift::SiftParams;

/// Detector names as they appear in configurations and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DetectorKind {
    ShiTomasi,
    Harris,
    Fast,
    Brisk,
    Orb,
    Akaze,
    Sift,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 7] = [
        DetectorKind::ShiTomasi,
        DetectorKind::Harris,
        DetectorKind::Fast,
        DetectorKind::Brisk,
        DetectorKind::Orb,
        DetectorKind::Akaze,
        DetectorKind::Sift,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DetectorKind::ShiTomasi => "SHITOMASI",
            DetectorKind::Harris => "HARRIS",
            DetectorKind::Fast => "FAST",
            DetectorKind::Brisk => "BRISK",
            DetectorKind::Orb => "ORB",
            DetectorKind::Akaze => "AKAZE",
            DetectorKind::Sift => "SIFT",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectorKind {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['-', '_'], "");
        DetectorKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| SweepError::UnknownDetector(s.to_string()))
    }
}

impl TryFrom<String> for DetectorKind {
    type Error = SweepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DetectorKind> for String {
    fn from(kind: DetectorKind) -> Self {
        kind.name().to_string()
    }
}

/// A detector variant with its parameter block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Detector {
    ShiTomasi(ShiTomasiParams),
    Harris(HarrisParams),
    Fast(FastParams),
    Brisk(BriskParams),
    Orb(OrbParams),
    Akaze(AkazeParams),
    Sift(SiftParams),
}

impl Detector {
    /// Variant with its fixed default parameters
    pub fn new(kind: DetectorKind) -> Self {
        match kind {
            DetectorKind::ShiTomasi => Detector::ShiTomasi(ShiTomasiParams::default()),
            DetectorKind::Harris => Detector::Harris(HarrisParams::default()),
            DetectorKind::Fast => Detector::Fast(FastParams::default()),
            DetectorKind::Brisk => Detector::Brisk(BriskParams::default()),
            DetectorKind::Orb => Detector::Orb(OrbParams::default()),
            DetectorKind::Akaze => Detector::Akaze(AkazeParams::default()),
            DetectorKind::Sift => Detector::Sift(SiftParams::default()),
        }
    }

    pub fn from_name(name: &str) -> Result<Self, SweepError> {
        name.parse().map(Detector::new)
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            Detector::ShiTomasi(_) => DetectorKind::ShiTomasi,
            Detector::Harris(_) => DetectorKind::Harris,
            Detector::Fast(_) => DetectorKind::Fast,
            Detector::Brisk(_) => DetectorKind::Brisk,
            Detector::Orb(_) => DetectorKind::Orb,
            Detector::Akaze(_) => DetectorKind::Akaze,
            Detector::Sift(_) => DetectorKind::Sift,
        }
    }

    pub fn detect(&self, img: &Image) -> Vec<Keypoint> {
        match self {
            Detector::ShiTomasi(p) => corner_detection::detect_shi_tomasi(img, p),
            Detector::Harris(p) => corner_detection::detect_harris(img, p),
            Detector::Fast(p) => fast::detect_fast(img, p),
            Detector::Brisk(p) => brisk::detect_brisk(img, p),
            Detector::Orb(p) => orb::detect_orb(img, p),
            Detector::Akaze(p) => akaze::detect_akaze(img, p),
            Detector::Sift(p) => sift::detect_sift(img, p),
        }
    }
}

/// Keep at most `n` keypoints.
///
/// When every keypoint carries a response the strongest survive, ties in
/// input order. Otherwise the input order is taken as the ranking.
pub fn retain_best(keypoints: &mut Vec<Keypoint>, n: usize) {
    if keypoints.len() <= n {
        return;
    }
    if keypoints.iter().all(|kp| kp.response.is_some()) {
        utils::sort_by_strength(keypoints, |kp| kp.response.unwrap_or(0.0));
    }
    keypoints.truncate(n);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::blocks;

    #[test]
    fn test_names_round_trip_case_insensitively() {
        for kind in DetectorKind::ALL {
            assert_eq!(kind.name().parse::<DetectorKind>(), Ok(kind));
            assert_eq!(kind.name().to_lowercase().parse::<DetectorKind>(), Ok(kind));
            assert_eq!(Detector::new(kind).kind(), kind);
        }
        assert_eq!("Shi-Tomasi".parse::<DetectorKind>(), Ok(DetectorKind::ShiTomasi));
    }

    #[test]
    fn test_unknown_detector() {
        assert_eq!(
            "SURF".parse::<DetectorKind>(),
            Err(SweepError::UnknownDetector("SURF".to_string()))
        );
        assert!(Detector::from_name("").is_err());
    }

    #[test]
    fn test_every_detector_runs() {
        let img = blocks(160, 120, 8, 13);
        for kind in DetectorKind::ALL {
            let kps = Detector::new(kind).detect(&img);
            assert!(!kps.is_empty(), "{kind} found nothing");
            assert!(
                kps.iter().all(|kp| kp.x >= 0.0 && kp.y >= 0.0 && kp.x < 160.0 && kp.y < 120.0),
                "{kind} left the image"
            );
            assert!(kps.iter().all(|kp| kp.size > 0.0));
            assert_eq!(kps.iter().all(|kp| kp.response.is_none()), kind == DetectorKind::ShiTomasi);
        }
    }

    #[test]
    fn test_retain_best() {
        let mut kps = vec![
            Keypoint::new(0.0, 0.0, 1.0).with_response(1.0),
            Keypoint::new(1.0, 0.0, 1.0).with_response(9.0),
            Keypoint::new(2.0, 0.0, 1.0).with_response(4.0),
        ];
        retain_best(&mut kps, 2);
        assert_eq!(kps.iter().map(|kp| kp.x).collect::<Vec<_>>(), vec![1.0, 2.0]);

        let mut ranked: Vec<Keypoint> = (0..5).map(|i| Keypoint::new(i as f32, 0.0, 4.0)).collect();
        retain_best(&mut ranked, 3);
        assert_eq!(ranked.iter().map(|kp| kp.x).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
    }
}
