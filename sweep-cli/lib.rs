//! Detector / descriptor / matcher sweep.
//!
//! [`Sweep`] enumerates the configured combinations and drives each over a
//! frame range, emitting one [`MatchRecord`] per matched frame pair.

pub mod config;
pub mod report;
pub mod source;
pub mod sweep;

pub use config::{FrameRange, ImageSequenceConfig, SweepConfig, DEFAULT_REGION};
pub use report::{render_table, summarize, write_csv, write_json_lines, CombinationSummary};
pub use source::{FrameSource, ImageSequence, MemorySource};
pub use sweep::{plan, Combination, Planned, SkippedCombination, Sweep, SweepObserver, SweepReport};
pub use sweep_core::{MatchRecord, Rect, SweepError, SweepResult};
