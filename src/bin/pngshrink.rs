//! pngshrink CLI - lossless PNG colour mode reduction
//!
//! Rewrites PNG files in the smallest colour mode that holds their pixels
//! exactly. Directories are processed recursively.

use std::path::PathBuf;
use std::time::Instant;

use clap::{ArgAction, Parser, ValueEnum};
use log::{info, LevelFilter, Log, Metadata, Record};

use pngshrink::driver::{optimize_paths, DriverOptions, FileReport, Outcome, ReductionStats};
use pngshrink::png::{FilterStrategy, FilterType, ReduceOptions};
use pngshrink::{ChannelLayout, ColorMode};

/// Losslessly shrink PNG files by choosing a smaller colour mode.
#[derive(Parser, Debug)]
#[command(name = "pngshrink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PNG files or directories to process
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// Write reduced files into this directory instead of replacing the originals
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Report what would change without writing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// zlib compression level (0-9, higher = smaller file)
    #[arg(short = 'c', long, default_value = "9", value_parser = clap::value_parser!(u8).range(0..=9))]
    compression: u8,

    /// Scanline filter strategy
    #[arg(long, value_enum, default_value = "zero")]
    filter: FilterArg,

    /// Preset (overrides compression and filter when set)
    #[arg(long, value_enum)]
    preset: Option<PresetArg>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterArg {
    /// Filter None for palette and low-depth output only; skip other images
    Zero,
    /// No filter on every scanline
    None,
    /// Sub filter
    Sub,
    /// Up filter
    Up,
    /// Average filter
    Average,
    /// Paeth filter
    Paeth,
    /// Minimum sum of absolute differences per scanline
    MinSum,
    /// Minimum entropy per scanline
    Entropy,
    /// Smallest compressed scanline (slowest)
    BruteForce,
}

impl From<FilterArg> for FilterStrategy {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::Zero => FilterStrategy::Zero,
            FilterArg::None => FilterStrategy::Fixed(FilterType::None),
            FilterArg::Sub => FilterStrategy::Fixed(FilterType::Sub),
            FilterArg::Up => FilterStrategy::Fixed(FilterType::Up),
            FilterArg::Average => FilterStrategy::Fixed(FilterType::Average),
            FilterArg::Paeth => FilterStrategy::Fixed(FilterType::Paeth),
            FilterArg::MinSum => FilterStrategy::MinSum,
            FilterArg::Entropy => FilterStrategy::Entropy,
            FilterArg::BruteForce => FilterStrategy::BruteForce,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    /// Level 2, fixed filter policy
    Fast,
    /// Level 6, minimum-sum filters
    Balanced,
    /// Level 9, brute-force filters
    Max,
}

/// Minimal stderr logger; the level is set through `log::set_max_level`.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn mode_name(mode: &ColorMode) -> String {
    let layout = match mode.layout {
        ChannelLayout::Grey => "grey",
        ChannelLayout::Rgb => "rgb",
        ChannelLayout::Palette => "palette",
        ChannelLayout::GreyAlpha => "grey+alpha",
        ChannelLayout::Rgba => "rgba",
    };
    let key = if mode.key.is_some() { "+key" } else { "" };
    format!("{}{}/{}", layout, key, mode.bit_depth)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn print_report(report: &FileReport) {
    if report.outcome != Outcome::Reduced {
        return;
    }
    let (Some(from), Some(to)) = (&report.source_mode, &report.target_mode) else {
        return;
    };
    let ratio = if report.source_bytes > 0 {
        report.output_bytes as f64 * 100.0 / report.source_bytes as f64
    } else {
        0.0
    };
    println!(
        "{}: {} -> {}, {} -> {} ({:.1}%)",
        report.path.display(),
        mode_name(from),
        mode_name(to),
        format_size(report.source_bytes),
        format_size(report.output_bytes),
        ratio
    );
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let reduce = match args.preset {
        Some(PresetArg::Fast) => ReduceOptions::fast(),
        Some(PresetArg::Balanced) => ReduceOptions::balanced(),
        Some(PresetArg::Max) => ReduceOptions::max_compression(),
        None => ReduceOptions {
            compression_level: args.compression,
            filter_strategy: args.filter.into(),
        },
    };
    info!("options: {:?}", reduce);

    let options = DriverOptions {
        reduce,
        dry_run: args.dry_run,
        output_dir: args.output_dir,
    };

    let start = Instant::now();
    let mut stats = ReductionStats::default();
    let reports = optimize_paths(&args.paths, &options, &mut stats);
    if reports.is_empty() {
        return Err("no PNG files found".into());
    }

    for report in &reports {
        print_report(report);
    }
    println!("{}", stats);
    if args.dry_run {
        println!("(dry run, nothing written)");
    }
    info!("finished in {:.2?}", start.elapsed());
    Ok(())
}
