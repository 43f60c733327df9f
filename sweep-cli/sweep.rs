//! The sweep orchestrator.
//!
//! Every (detector, descriptor) combination runs the same per-frame
//! pipeline over its own [`FrameWindow`]: load, detect, filter, describe and,
//! once two frames are held, match the previous frame against the newest.

use std::time::Instant;

use itertools::Itertools;
use rayon::prelude::*;
use sweep_core::{
    filter_keypoints, Descriptors, Frame, FrameWindow, MatchRecord, SweepError, SweepResult,
};
use sweep_describe::{DescriptorType, Extractor};
use sweep_detect::{retain_best, Detector, DetectorKind};
use sweep_match::Matcher;

use crate::config::SweepConfig;
use crate::source::FrameSource;

/// One (detector, descriptor) pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Combination {
    pub detector: DetectorKind,
    pub descriptor: DescriptorType,
}

impl Combination {
    pub fn new(detector: DetectorKind, descriptor: DescriptorType) -> Self {
        Self {
            detector,
            descriptor,
        }
    }

    /// AKAZE descriptors need AKAZE keypoints, and ORB descriptors cannot
    /// use the scale range of SIFT keypoints
    pub fn is_compatible(&self) -> bool {
        match (self.detector, self.descriptor) {
            (DetectorKind::Akaze, DescriptorType::Akaze) => true,
            (_, DescriptorType::Akaze) => false,
            (DetectorKind::Sift, DescriptorType::Orb) => false,
            _ => true,
        }
    }

    pub fn check_compatible(&self) -> SweepResult<()> {
        if self.is_compatible() {
            Ok(())
        } else {
            Err(SweepError::IncompatibleCombination {
                detector: self.detector.to_string(),
                descriptor: self.descriptor.to_string(),
            })
        }
    }
}

impl std::fmt::Display for Combination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.detector, self.descriptor)
    }
}

/// Callbacks for collaborators that want to see the pipeline as it runs.
///
/// Calls may come from several threads when combinations run in parallel.
pub trait SweepObserver: Sync {
    fn combination_started(&self, _combination: &Combination) {}

    /// Both frames of a matched pair, after `current` received its matches
    fn frame_pair(&self, _combination: &Combination, _previous: &Frame, _current: &Frame) {}

    fn record(&self, _record: &MatchRecord) {}

    fn combination_skipped(&self, _skipped: &SkippedCombination) {}
}

impl SweepObserver for () {}

/// A configured pairing that did not run, and why
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCombination {
    pub detector: String,
    pub descriptor: String,
    pub reason: SweepError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Grouped by combination in enumeration order, then by frame index
    pub records: Vec<MatchRecord>,
    pub skipped: Vec<SkippedCombination>,
}

/// Enumeration entry: either a runnable combination or the reason it is not
#[derive(Debug, Clone, PartialEq)]
pub enum Planned {
    Run(Combination),
    Skip(SkippedCombination),
}

/// Cartesian product of the configured names in configuration order,
/// resolving names and applying the compatibility rules
pub fn plan(detectors: &[String], descriptors: &[String]) -> Vec<Planned> {
    detectors
        .iter()
        .cartesian_product(descriptors.iter())
        .map(|(det, desc)| {
            let resolved = det
                .parse::<DetectorKind>()
                .and_then(|d| desc.parse::<DescriptorType>().map(|t| Combination::new(d, t)))
                .and_then(|c| c.check_compatible().map(|_| c));
            match resolved {
                Ok(c) => Planned::Run(c),
                Err(reason) => Planned::Skip(SkippedCombination {
                    detector: det.clone(),
                    descriptor: desc.clone(),
                    reason,
                }),
            }
        })
        .collect()
}

pub struct Sweep<S> {
    config: SweepConfig,
    source: S,
    matcher: Matcher,
}

impl<S: FrameSource> Sweep<S> {
    pub fn new(config: SweepConfig, source: S) -> SweepResult<Self> {
        config.validate()?;
        let matcher = Matcher::new(config.matcher, config.selection_policy());
        Ok(Self {
            config,
            source,
            matcher,
        })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn plan(&self) -> Vec<Planned> {
        plan(&self.config.detectors, &self.config.descriptors)
    }

    /// Runs every combination to completion.
    ///
    /// Unknown names and incompatible pairings are skipped and reported;
    /// any other error aborts the whole sweep.
    pub fn run(&self, observer: &dyn SweepObserver) -> SweepResult<SweepReport> {
        log::info!("sweep: {}", self.config.summary());
        let planned = self.plan();

        let mut report = SweepReport::default();
        let mut runnable = Vec::new();
        for entry in planned {
            match entry {
                Planned::Run(c) => runnable.push(c),
                Planned::Skip(skipped) => {
                    log::warn!(
                        "skipping {}/{}: {}",
                        skipped.detector,
                        skipped.descriptor,
                        skipped.reason
                    );
                    observer.combination_skipped(&skipped);
                    report.skipped.push(skipped);
                }
            }
        }

        let per_combination: Vec<Vec<MatchRecord>> = if self.config.parallel_combinations {
            runnable
                .par_iter()
                .map(|c| self.run_combination(*c, observer))
                .collect::<SweepResult<_>>()?
        } else {
            runnable
                .iter()
                .map(|c| self.run_combination(*c, observer))
                .collect::<SweepResult<_>>()?
        };

        report.records = per_combination.into_iter().flatten().collect();
        log::info!(
            "sweep finished: {} combination(s) run, {} skipped, {} record(s)",
            runnable.len(),
            report.skipped.len(),
            report.records.len()
        );
        Ok(report)
    }

    /// One combination over the configured frame range, from a fresh window
    pub fn run_combination(
        &self,
        combination: Combination,
        observer: &dyn SweepObserver,
    ) -> SweepResult<Vec<MatchRecord>> {
        combination.check_compatible()?;
        log::info!("running {combination}");
        observer.combination_started(&combination);

        let detector = Detector::new(combination.detector);
        let extractor = Extractor::new(combination.descriptor);
        let kind = combination.descriptor.kind();
        let no_descriptors = Descriptors::empty(kind, combination.descriptor.width());
        let region = self.config.active_region();

        let mut window = FrameWindow::new(self.config.window_capacity);
        let mut records = Vec::new();

        for (offset, index) in self.config.frames.indices().enumerate() {
            let mut frame = Frame::new(self.source.load(index)?);

            let started = Instant::now();
            let mut keypoints = detector.detect(frame.image());
            let detector_ms = elapsed_ms(started);
            let detected = keypoints.len();

            if let Some(rect) = region {
                keypoints = filter_keypoints(&keypoints, &rect);
            }
            if let Some(n) = self.config.max_keypoints {
                retain_best(&mut keypoints, n);
            }
            log::debug!(
                "{combination} frame {index}: {detected} keypoints detected, {} kept",
                keypoints.len()
            );
            frame.set_keypoints(keypoints);

            let started = Instant::now();
            let descriptors = extractor.describe(frame.image(), frame.keypoints());
            let descriptor_ms = elapsed_ms(started);
            frame.set_descriptors(descriptors)?;

            window.push(frame);
            if window.len() < 2 {
                continue;
            }

            let (previous, current) = window.pair_mut()?;
            let started = Instant::now();
            let matches = self.matcher.match_descriptors(
                previous.descriptors().unwrap_or(&no_descriptors),
                current.descriptors().unwrap_or(&no_descriptors),
                kind,
            )?;
            let matcher_ms = elapsed_ms(started);

            let record = MatchRecord {
                frame_index: offset,
                detector: combination.detector.to_string(),
                descriptor: combination.descriptor.to_string(),
                keypoints: current.keypoints().len(),
                match_count: matches.len(),
                detector_ms,
                descriptor_ms,
                matcher_ms,
            };
            current.set_matches(matches);
            log::debug!(
                "{combination} frame {index}: {} matches in {:.3} ms",
                record.match_count,
                record.matcher_ms
            );
            observer.frame_pair(&combination, previous, current);
            observer.record(&record);
            records.push(record);
        }

        Ok(records)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
