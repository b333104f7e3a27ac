//! File and directory optimisation.
//!
//! Each file is decoded, reduced and re-encoded independently. A file is
//! rewritten only when its colour mode changes and the new file is smaller;
//! any failure leaves it untouched and is reported as skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::color::{ChannelLayout, ColorMode};
use crate::error::{Error, Result};
use crate::png::{choose_target, convert_and_filter, decode_png, encode_png, ReduceOptions};

/// Driver configuration.
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Options passed to the reduction pipeline.
    pub reduce: ReduceOptions,
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Write reduced files here (mirroring the walked tree) instead of in place.
    pub output_dir: Option<PathBuf>,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Rewritten in a smaller mode (or would be, in a dry run).
    Reduced,
    /// The chosen mode equals the source mode.
    SameMode,
    /// The reduced file was not smaller than the original.
    NotSmaller,
    /// Reduction failed; the file was left as is.
    Skipped(Error),
}

/// Per-file result.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Input path.
    pub path: PathBuf,
    /// Mode of the input file, when it could be decoded.
    pub source_mode: Option<ColorMode>,
    /// Mode chosen for the output.
    pub target_mode: Option<ColorMode>,
    /// Size of the input file.
    pub source_bytes: u64,
    /// Size of the reduced file (0 if the mode was unchanged and nothing was encoded).
    pub output_bytes: u64,
    /// Outcome.
    pub outcome: Outcome,
}

impl FileReport {
    fn skipped(path: &Path, source_bytes: u64, err: Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source_mode: None,
            target_mode: None,
            source_bytes,
            output_bytes: 0,
            outcome: Outcome::Skipped(err),
        }
    }
}

/// Replace `dest` with `bytes` via a temporary file in the same directory.
fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<()> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| Error::from(e.error))?;
    Ok(())
}

/// Decode `data` and choose its target mode. The file is only re-encoded
/// when the mode changes.
fn reduce_file(data: &[u8], options: &ReduceOptions) -> Result<(ColorMode, ColorMode, Option<Vec<u8>>)> {
    let image = decode_png(data)?;
    let target = choose_target(&image.pixels, image.width, image.height, &image.mode)?;
    if image.mode.equals(&target) {
        return Ok((image.mode, target, None));
    }

    let filtered = convert_and_filter(
        &image.pixels,
        image.width,
        image.height,
        &image.mode,
        &target,
        options,
    )?;
    let png = encode_png(image.width, image.height, &target, &filtered, options.compression_level)?;
    Ok((image.mode, target, Some(png)))
}

fn optimize_to(path: &Path, dest: &Path, options: &DriverOptions) -> FileReport {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => return FileReport::skipped(path, 0, err.into()),
    };
    let source_bytes = data.len() as u64;

    let (source_mode, target_mode, png) = match reduce_file(&data, &options.reduce) {
        Ok(result) => result,
        Err(err) => return FileReport::skipped(path, source_bytes, err),
    };
    let output_bytes = png.as_ref().map_or(0, |png| png.len() as u64);

    let outcome = match &png {
        None => Outcome::SameMode,
        Some(_) if output_bytes >= source_bytes => Outcome::NotSmaller,
        Some(_) => Outcome::Reduced,
    };

    if let (Outcome::Reduced, Some(png), false) = (&outcome, &png, options.dry_run) {
        if let Err(err) = write_atomically(dest, png) {
            return FileReport::skipped(path, source_bytes, err);
        }
    }

    FileReport {
        path: path.to_path_buf(),
        source_mode: Some(source_mode),
        target_mode: Some(target_mode),
        source_bytes,
        output_bytes,
        outcome,
    }
}

fn log_report(report: &FileReport) {
    match &report.outcome {
        Outcome::Skipped(err) => warn!("{}: skipped: {}", report.path.display(), err),
        outcome => debug!(
            "{}: {:?} ({} -> {} bytes)",
            report.path.display(),
            outcome,
            report.source_bytes,
            report.output_bytes
        ),
    }
}

/// Optimise one file, in place or into `options.output_dir`.
pub fn optimize_file(path: &Path, options: &DriverOptions) -> FileReport {
    let dest = match (&options.output_dir, path.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    };
    let report = optimize_to(path, &dest, options);
    log_report(&report);
    report
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

/// Expand `paths` into `(file, destination)` pairs. Directories are walked
/// recursively for `.png` files; explicit files are taken as given.
pub fn collect_files(paths: &[PathBuf], output_dir: Option<&Path>) -> Vec<(PathBuf, PathBuf)> {
    let mut files = Vec::new();
    for root in paths {
        if root.is_dir() {
            for entry in walkdir::WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() || !is_png(entry.path()) {
                    continue;
                }
                let path = entry.path().to_path_buf();
                let dest = match (output_dir, path.strip_prefix(root)) {
                    (Some(dir), Ok(rel)) => dir.join(rel),
                    _ => path.clone(),
                };
                files.push((path, dest));
            }
        } else {
            let dest = match (output_dir, root.file_name()) {
                (Some(dir), Some(name)) => dir.join(name),
                _ => root.clone(),
            };
            files.push((root.clone(), dest));
        }
    }
    files
}

/// Optimise every file under `paths`, adding this batch's totals to `stats`.
pub fn optimize_paths(
    paths: &[PathBuf],
    options: &DriverOptions,
    stats: &mut ReductionStats,
) -> Vec<FileReport> {
    let files = collect_files(paths, options.output_dir.as_deref());

    #[cfg(feature = "parallel")]
    let reports: Vec<FileReport> = files
        .par_iter()
        .map(|(path, dest)| optimize_to(path, dest, options))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let reports: Vec<FileReport> = files
        .iter()
        .map(|(path, dest)| optimize_to(path, dest, options))
        .collect();

    let mut batch = ReductionStats::default();
    for report in &reports {
        log_report(report);
        batch.record(report);
    }
    stats.merge(&batch);
    reports
}

/// Totals for one output mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeTotals {
    /// Files reduced into this mode.
    pub files: u64,
    /// Their combined size before.
    pub source_bytes: u64,
    /// Their combined size after.
    pub output_bytes: u64,
}

/// Running totals over a batch of files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReductionStats {
    /// Files looked at.
    pub files: u64,
    /// Files left alone because the mode did not change or the result was larger.
    pub unchanged: u64,
    /// Files skipped because of an error.
    pub skipped: u64,
    /// Reduced files keyed by output `(layout, bit depth)`.
    pub by_mode: BTreeMap<(u8, u8), ModeTotals>,
}

impl ReductionStats {
    /// Fold one report into the totals.
    pub fn record(&mut self, report: &FileReport) {
        self.files += 1;
        match (&report.outcome, &report.target_mode) {
            (Outcome::Reduced, Some(mode)) => {
                let totals = self
                    .by_mode
                    .entry((mode.layout.png_color_type(), mode.bit_depth))
                    .or_default();
                totals.files += 1;
                totals.source_bytes += report.source_bytes;
                totals.output_bytes += report.output_bytes;
            }
            (Outcome::Skipped(_), _) => self.skipped += 1,
            _ => self.unchanged += 1,
        }
    }

    /// Combine totals from another batch.
    pub fn merge(&mut self, other: &ReductionStats) {
        self.files += other.files;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        for (key, totals) in &other.by_mode {
            let mine = self.by_mode.entry(*key).or_default();
            mine.files += totals.files;
            mine.source_bytes += totals.source_bytes;
            mine.output_bytes += totals.output_bytes;
        }
    }

    /// Number of files rewritten.
    pub fn reduced(&self) -> u64 {
        self.by_mode.values().map(|t| t.files).sum()
    }

    /// Bytes saved across all rewritten files.
    pub fn bytes_saved(&self) -> u64 {
        self.by_mode
            .values()
            .map(|t| t.source_bytes.saturating_sub(t.output_bytes))
            .sum()
    }
}

fn layout_name(color_type: u8) -> &'static str {
    match ChannelLayout::try_from(color_type) {
        Ok(ChannelLayout::Grey) => "grey",
        Ok(ChannelLayout::Rgb) => "rgb",
        Ok(ChannelLayout::Palette) => "palette",
        Ok(ChannelLayout::GreyAlpha) => "grey+alpha",
        Ok(ChannelLayout::Rgba) => "rgba",
        Err(_) => "unknown",
    }
}

impl fmt::Display for ReductionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (&(layout, depth), totals) in &self.by_mode {
            let ratio = if totals.source_bytes == 0 {
                0.0
            } else {
                totals.output_bytes as f64 * 100.0 / totals.source_bytes as f64
            };
            writeln!(
                f,
                "  {:>10} {:>2}-bit: {:>5} files, {:>10} -> {:>10} bytes ({:.1}%)",
                layout_name(layout),
                depth,
                totals.files,
                totals.source_bytes,
                totals.output_bytes,
                ratio
            )?;
        }
        write!(
            f,
            "{} files: {} reduced, {} unchanged, {} skipped, {} bytes saved",
            self.files,
            self.reduced(),
            self.unchanged,
            self.skipped,
            self.bytes_saved()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: Outcome, mode: Option<ColorMode>, before: u64, after: u64) -> FileReport {
        FileReport {
            path: PathBuf::from("x.png"),
            source_mode: Some(ColorMode::rgba8()),
            target_mode: mode,
            source_bytes: before,
            output_bytes: after,
            outcome,
        }
    }

    #[test]
    fn test_stats_buckets() {
        let grey1 = ColorMode::new(ChannelLayout::Grey, 1);
        let mut stats = ReductionStats::default();
        stats.record(&report(Outcome::Reduced, Some(grey1.clone()), 1000, 100));
        stats.record(&report(Outcome::Reduced, Some(grey1), 500, 50));
        stats.record(&report(Outcome::SameMode, Some(ColorMode::rgba8()), 10, 10));
        stats.record(&report(Outcome::Skipped(Error::Io("gone".into())), None, 0, 0));

        assert_eq!(stats.files, 4);
        assert_eq!(stats.reduced(), 2);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.bytes_saved(), 1350);
        assert_eq!(
            stats.by_mode[&(0, 1)],
            ModeTotals {
                files: 2,
                source_bytes: 1500,
                output_bytes: 150
            }
        );
        let summary = stats.to_string();
        assert!(summary.contains("grey"));
        assert!(summary.contains("(10.0%)"));
        assert!(summary.ends_with("4 files: 2 reduced, 1 unchanged, 1 skipped, 1350 bytes saved"));
    }

    #[test]
    fn test_stats_merge() {
        let mut a = ReductionStats::default();
        a.record(&report(Outcome::Reduced, Some(ColorMode::palette(4, vec![])), 300, 200));
        let mut b = ReductionStats::default();
        b.record(&report(Outcome::Reduced, Some(ColorMode::palette(4, vec![])), 100, 50));
        b.record(&report(Outcome::NotSmaller, Some(ColorMode::rgb8()), 10, 12));
        a.merge(&b);
        assert_eq!(a.files, 3);
        assert_eq!(a.by_mode[&(3, 4)].files, 2);
        assert_eq!(a.bytes_saved(), 150);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let report = optimize_file(Path::new("/nonexistent/dir/img.png"), &DriverOptions::default());
        assert!(matches!(report.outcome, Outcome::Skipped(Error::Io(_))));
    }

    #[test]
    fn test_collect_files_walks_directories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("a.png"), b"").unwrap();
        fs::write(tmp.path().join("nested/b.PNG"), b"").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"").unwrap();

        let out = PathBuf::from("/out");
        let mut files = collect_files(&[tmp.path().to_path_buf()], Some(&out));
        files.sort();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].1, out.join("a.png"));
        assert_eq!(files[1].1, out.join("nested").join("b.PNG"));
    }
}
