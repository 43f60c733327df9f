use thiserror::Error;

use crate::DescriptorKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SweepError {
    #[error("unknown detector `{0}`")]
    UnknownDetector(String),

    #[error("unknown descriptor `{0}`")]
    UnknownDescriptor(String),

    #[error("{descriptor} descriptors cannot be extracted from {detector} keypoints")]
    IncompatibleCombination { detector: String, descriptor: String },

    #[error("frame window holds {present} frame(s) but {required} are required")]
    EmptyWindow { required: usize, present: usize },

    #[error("descriptor matrix has {rows} rows for {keypoints} keypoints")]
    DescriptorRowMismatch { keypoints: usize, rows: usize },

    #[error("cannot match {query} descriptors against {train} descriptors")]
    DescriptorKindMismatch {
        query: DescriptorKind,
        train: DescriptorKind,
    },

    #[error("descriptor widths differ: {query} vs {train}")]
    DescriptorWidthMismatch { query: usize, train: usize },

    #[error("frame {index} is out of range for a source of {len} frames")]
    FrameOutOfRange { index: usize, len: usize },

    #[error("failed to load frame {index} from {path}: {message}")]
    ImageLoad {
        index: usize,
        path: String,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SweepError {
    /// Errors that end the current combination but let the sweep continue
    pub fn is_combination_local(&self) -> bool {
        matches!(
            self,
            SweepError::UnknownDetector(_)
                | SweepError::UnknownDescriptor(_)
                | SweepError::IncompatibleCombination { .. }
        )
    }
}

pub type SweepResult<T> = Result<T, SweepError>;
