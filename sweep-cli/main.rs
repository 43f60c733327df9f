use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use sweep_cli::{
    render_table, summarize, write_csv, write_json_lines, FrameRange, ImageSequence, Rect, Sweep,
    SweepConfig,
};
use sweep_match::{MatcherBackend, SelectionKind};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Jsonl,
}

/// Sweep keypoint detectors, descriptors and matchers over an image sequence
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated detector names (SHITOMASI, HARRIS, FAST, BRISK, ORB, AKAZE, SIFT)
    #[arg(long, value_delimiter = ',')]
    detectors: Option<Vec<String>>,

    /// Comma-separated descriptor names (BRIEF, BRISK, FREAK, ORB, AKAZE, SIFT)
    #[arg(long, value_delimiter = ',')]
    descriptors: Option<Vec<String>>,

    /// brute-force | approximate-index (MAT_BF / MAT_FLANN)
    #[arg(long)]
    matcher: Option<MatcherBackend>,

    /// best-match | knn-ratio (SEL_NN / SEL_KNN)
    #[arg(long)]
    selection: Option<SelectionKind>,

    #[arg(long)]
    ratio: Option<f32>,

    /// Region of interest as x,y,width,height
    #[arg(long, conflicts_with = "no_region")]
    region: Option<Rect>,

    /// Keep keypoints from the whole frame
    #[arg(long)]
    no_region: bool,

    #[arg(long)]
    start: Option<usize>,

    /// Last frame index, inclusive
    #[arg(long)]
    end: Option<usize>,

    #[arg(long)]
    max_keypoints: Option<usize>,

    #[arg(long)]
    images_dir: Option<PathBuf>,

    #[arg(long)]
    prefix: Option<String>,

    #[arg(long)]
    extension: Option<String>,

    #[arg(long)]
    fill_width: Option<usize>,

    /// Run combinations in parallel
    #[arg(long)]
    parallel: bool,

    #[arg(long)]
    threads: Option<usize>,

    /// Write records here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Print a CSV header line
    #[arg(long)]
    header: bool,

    /// Print per-combination means to stderr after the sweep
    #[arg(long)]
    summary: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// -v info, -vv debug
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(SweepConfig, Output)> {
        let mut config = match &self.config {
            Some(path) => SweepConfig::load_toml(path)?,
            None => SweepConfig::default(),
        };
        if let Some(d) = self.detectors {
            config.detectors = d;
        }
        if let Some(d) = self.descriptors {
            config.descriptors = d;
        }
        if let Some(m) = self.matcher {
            config.matcher = m;
        }
        if let Some(s) = self.selection {
            config.selection = s;
        }
        if let Some(r) = self.ratio {
            config.ratio = r;
        }
        if let Some(rect) = self.region {
            config.region = rect;
            config.focus_region = true;
        }
        if self.no_region {
            config.focus_region = false;
        }
        config.frames = FrameRange::new(
            self.start.unwrap_or(config.frames.start),
            self.end.unwrap_or(config.frames.end),
        );
        if self.max_keypoints.is_some() {
            config.max_keypoints = self.max_keypoints;
        }
        if let Some(dir) = self.images_dir {
            config.images.directory = dir;
        }
        if let Some(prefix) = self.prefix {
            config.images.prefix = prefix;
        }
        if let Some(ext) = self.extension {
            config.images.extension = ext;
        }
        if let Some(w) = self.fill_width {
            config.images.fill_width = w;
        }
        if self.parallel {
            config.parallel_combinations = true;
        }
        if let Some(t) = self.threads {
            config.threads = t;
        }
        config.validate()?;

        let output = Output {
            path: self.output,
            format: self.format,
            header: self.header,
            summary: self.summary,
            dump_config: self.dump_config,
        };
        Ok((config, output))
    }
}

struct Output {
    path: Option<PathBuf>,
    format: Format,
    header: bool,
    summary: bool,
    dump_config: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let (config, output) = args.into_config()?;

    if output.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if let Err(e) = sweep_core::init_thread_pool(config.threads) {
        log::warn!("keeping existing thread pool: {e}");
    }

    let source = ImageSequence::new(config.images.clone());
    let sweep = Sweep::new(config, source)?;
    let report = sweep.run(&()).context("sweep aborted")?;

    let mut sink: Box<dyn Write> = match &output.path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    match output.format {
        Format::Csv => write_csv(&report.records, &mut sink, output.header)?,
        Format::Jsonl => write_json_lines(&report.records, &mut sink)?,
    }
    sink.flush()?;

    for skipped in &report.skipped {
        log::info!(
            "skipped {}/{}: {}",
            skipped.detector,
            skipped.descriptor,
            skipped.reason
        );
    }
    if output.summary {
        eprint!("{}", render_table(&summarize(&report.records)));
    }
    Ok(())
}
