use serde::{Deserialize, Serialize};

/// Metrics for one processed frame pair of one combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Index of the newer frame of the pair, relative to the configured start
    pub frame_index: usize,
    pub detector: String,
    pub descriptor: String,
    /// Keypoints kept on the newer frame after region filtering
    pub keypoints: usize,
    pub match_count: usize,
    pub detector_ms: f64,
    pub descriptor_ms: f64,
    pub matcher_ms: f64,
}

impl MatchRecord {
    pub const CSV_HEADER: &'static str =
        "image,detector,descriptor,matches,detector_ms,descriptor_ms,total_ms";

    /// Detection plus extraction time
    pub fn total_ms(&self) -> f64 {
        self.detector_ms + self.descriptor_ms
    }

    /// `IMAGE_<i>,<detector>,<descriptor>,<matches>,<det ms>,<desc ms>,<total ms>`
    pub fn csv_row(&self) -> String {
        format!(
            "IMAGE_{},{},{},{},{:.3},{:.3},{:.3}",
            self.frame_index,
            self.detector,
            self.descriptor,
            self.match_count,
            self.detector_ms,
            self.descriptor_ms,
            self.total_ms()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_row_layout() {
        let record = MatchRecord {
            frame_index: 3,
            detector: "FAST".into(),
            descriptor: "BRIEF".into(),
            keypoints: 120,
            match_count: 97,
            detector_ms: 1.5,
            descriptor_ms: 0.25,
            matcher_ms: 2.0,
        };
        assert_eq!(record.csv_row(), "IMAGE_3,FAST,BRIEF,97,1.500,0.250,1.750");
        assert_eq!(MatchRecord::CSV_HEADER.split(',').count(), record.csv_row().split(',').count());
    }
}
