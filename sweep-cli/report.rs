//! Rendering of match records.

use std::io::Write;

use itertools::Itertools;
use serde::Serialize;
use sweep_core::MatchRecord;

/// One `IMAGE_<i>,...` line per record, optionally under a header
pub fn write_csv<W: Write>(records: &[MatchRecord], out: &mut W, header: bool) -> std::io::Result<()> {
    if header {
        writeln!(out, "{}", MatchRecord::CSV_HEADER)?;
    }
    for record in records {
        writeln!(out, "{}", record.csv_row())?;
    }
    Ok(())
}

/// One JSON object per line
pub fn write_json_lines<W: Write>(records: &[MatchRecord], out: &mut W) -> anyhow::Result<()> {
    for record in records {
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Means over all frame pairs of one combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationSummary {
    pub detector: String,
    pub descriptor: String,
    pub pairs: usize,
    pub mean_keypoints: f64,
    pub mean_matches: f64,
    pub mean_detector_ms: f64,
    pub mean_descriptor_ms: f64,
    pub mean_matcher_ms: f64,
}

/// Summaries in the order combinations first appear in `records`
pub fn summarize(records: &[MatchRecord]) -> Vec<CombinationSummary> {
    records
        .iter()
        .chunk_by(|r| (r.detector.clone(), r.descriptor.clone()))
        .into_iter()
        .map(|((detector, descriptor), group)| {
            let group: Vec<&MatchRecord> = group.collect();
            let n = group.len() as f64;
            let mean = |f: fn(&MatchRecord) -> f64| group.iter().map(|r| f(r)).sum::<f64>() / n;
            CombinationSummary {
                detector,
                descriptor,
                pairs: group.len(),
                mean_keypoints: mean(|r| r.keypoints as f64),
                mean_matches: mean(|r| r.match_count as f64),
                mean_detector_ms: mean(|r| r.detector_ms),
                mean_descriptor_ms: mean(|r| r.descriptor_ms),
                mean_matcher_ms: mean(|r| r.matcher_ms),
            }
        })
        .collect()
}

/// Fixed-width text table of summaries
pub fn render_table(summaries: &[CombinationSummary]) -> String {
    let mut out = format!(
        "{:<10} {:<10} {:>5} {:>9} {:>9} {:>10} {:>10} {:>10}\n",
        "detector", "descriptor", "pairs", "keypoints", "matches", "det ms", "desc ms", "match ms"
    );
    for s in summaries {
        out.push_str(&format!(
            "{:<10} {:<10} {:>5} {:>9.1} {:>9.1} {:>10.3} {:>10.3} {:>10.3}\n",
            s.detector,
            s.descriptor,
            s.pairs,
            s.mean_keypoints,
            s.mean_matches,
            s.mean_detector_ms,
            s.mean_descriptor_ms,
            s.mean_matcher_ms
        ));
    }
    out
}
