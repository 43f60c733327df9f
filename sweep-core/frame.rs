use crate::error::{SweepError, SweepResult};
use crate::{Descriptors, Image, Keypoint, Match};

/// One image moving through the pipeline together with its features.
///
/// Row `i` of the descriptor matrix always describes keypoint `i`; the
/// setters below are the only way to change either side.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Image,
    keypoints: Vec<Keypoint>,
    descriptors: Option<Descriptors>,
    matches_to_previous: Vec<Match>,
}

impl Frame {
    pub fn new(image: Image) -> Self {
        Self {
            image,
            keypoints: Vec::new(),
            descriptors: None,
            matches_to_previous: Vec::new(),
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// `None` until the frame has been described
    pub fn descriptors(&self) -> Option<&Descriptors> {
        self.descriptors.as_ref()
    }

    pub fn matches_to_previous(&self) -> &[Match] {
        &self.matches_to_previous
    }

    /// Replaces the keypoints; any descriptors computed for the old set are dropped
    pub fn set_keypoints(&mut self, keypoints: Vec<Keypoint>) {
        self.keypoints = keypoints;
        self.descriptors = None;
        self.matches_to_previous.clear();
    }

    pub fn set_descriptors(&mut self, descriptors: Descriptors) -> SweepResult<()> {
        if descriptors.rows() != self.keypoints.len() {
            return Err(SweepError::DescriptorRowMismatch {
                keypoints: self.keypoints.len(),
                rows: descriptors.rows(),
            });
        }
        self.descriptors = Some(descriptors);
        Ok(())
    }

    pub fn set_matches(&mut self, matches: Vec<Match>) {
        self.matches_to_previous = matches;
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DescriptorKind;
    use ndarray::Array2;

    fn frame_with_keypoints(n: usize) -> Frame {
        let mut frame = Frame::new(Image::new(16, 16));
        frame.set_keypoints((0..n).map(|i| Keypoint::new(i as f32, 1.0, 4.0)).collect());
        frame
    }

    #[test]
    fn test_descriptor_rows_must_match_keypoints() {
        let mut frame = frame_with_keypoints(3);
        let bad = Descriptors::Binary(Array2::zeros((2, 32)));
        assert_eq!(
            frame.set_descriptors(bad),
            Err(SweepError::DescriptorRowMismatch { keypoints: 3, rows: 2 })
        );
        assert!(frame.descriptors().is_none());

        let good = Descriptors::Binary(Array2::zeros((3, 32)));
        assert!(frame.set_descriptors(good).is_ok());
        assert_eq!(frame.descriptors().map(Descriptors::rows), Some(3));
    }

    #[test]
    fn test_new_keypoints_invalidate_descriptors() {
        let mut frame = frame_with_keypoints(2);
        frame
            .set_descriptors(Descriptors::empty(DescriptorKind::Gradient, 128))
            .unwrap_err();
        frame
            .set_descriptors(Descriptors::Float(Array2::zeros((2, 128))))
            .unwrap();
        frame.set_matches(vec![Match::new(0, 1, 0.5)]);

        frame.set_keypoints(Vec::new());
        assert!(frame.descriptors().is_none());
        assert!(frame.matches_to_previous().is_empty());
    }
}
