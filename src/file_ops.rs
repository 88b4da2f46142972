/**
 * File operations module for scanning directories and renaming media files
 *
 * Two passes:
 * 1. Analysis (parallel): classify each file and extract its date-time stamp
 * 2. Rename (sequential, path order): name checks, collision checks, rename
 */

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::exif::ExifProcessor;
use crate::hashing::ContentHasher;
use crate::media::MediaKind;
use crate::mov::{MovAtomReader, MovReaderConfig};
use crate::naming::FilenameGenerator;

#[derive(Debug, Clone)]
pub struct RenameOptions {
    /// Replace the whole file name (extension kept) instead of prefixing it
    pub erase: bool,
    /// Skip names that already contain any date-time string, before reading metadata
    pub fast: bool,
    pub dry_run: bool,
    /// Rename even if the name already contains a date-time string
    pub force: bool,
    /// Sub-directory levels to descend into; 0 processes the top directory only
    pub max_depth: usize,
    /// Analysis threads (default: CPU count / 2)
    pub workers: Option<usize>,
    pub show_progress: bool,
    pub mov: MovReaderConfig,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            erase: false,
            fast: false,
            dry_run: false,
            force: false,
            max_depth: 0,
            workers: None,
            show_progress: false,
            mov: MovReaderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Renamed { from: PathBuf, to: PathBuf },
    WouldRename { from: PathBuf, to: PathBuf },
    Skipped { path: PathBuf, reason: String },
    Failed { path: PathBuf, error: String },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Renamed { from, .. } | FileOutcome::WouldRename { from, .. } => from,
            FileOutcome::Skipped { path, .. } | FileOutcome::Failed { path, .. } => path,
        }
    }
}

/// Running totals for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub files: usize,
    /// JPEG images and videos
    pub media_files: usize,
    /// Renamed, or would be renamed in dry-run
    pub renamed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl BatchStats {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Renamed { .. } | FileOutcome::WouldRename { .. } => self.renamed += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Failed { .. } => self.errors += 1,
        }
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Files total: {}, image/video: {}, renamed: {}, skipped: {}, errors: {}",
            self.files, self.media_files, self.renamed, self.skipped, self.errors
        )
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub stats: BatchStats,
    pub outcomes: Vec<FileOutcome>,
}

/// Result of the analysis pass for one file
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub file_path: PathBuf,
    pub kind: MediaKind,
    pub is_media: bool,
    /// Date-time stamp, or the outcome that ends processing of this file
    pub stamp: Result<String, FileOutcome>,
}

pub struct FileProcessor {
    options: RenameOptions,
    exif_processor: ExifProcessor,
    mov_reader: MovAtomReader,
    filename_generator: FilenameGenerator,
    content_hasher: ContentHasher,
}

impl FileProcessor {
    pub fn new(options: RenameOptions) -> Self {
        Self {
            mov_reader: MovAtomReader::new(options.mov.clone()),
            options,
            exif_processor: ExifProcessor::new(),
            filename_generator: FilenameGenerator::new(),
            content_hasher: ContentHasher::new(),
        }
    }

    /// Scan `root` and rename every media file found, as far as options allow
    pub fn process_directory(&self, root: &Path) -> Result<BatchReport> {
        if !root.is_dir() {
            anyhow::bail!("Not a valid directory: {}", root.display());
        }
        let root = root.canonicalize()
            .with_context(|| format!("Failed to resolve directory: {}", root.display()))?;

        if self.options.max_depth > 0 {
            info!("Processing directory \"{}\" recursively, max depth {}", root.display(), self.options.max_depth);
        } else {
            info!("Processing directory \"{}\" non-recursively", root.display());
        }

        let files = self.collect_files(&root);
        let analysis_results = self.analyze_files_parallel(&files)?;

        let mut stats = BatchStats::default();
        let mut outcomes = Vec::with_capacity(analysis_results.len());
        let mut claimed = HashMap::new();

        for analysis in analysis_results {
            stats.files += 1;
            if analysis.is_media {
                stats.media_files += 1;
            }
            let outcome = match analysis.stamp {
                Ok(stamp) => self.rename_single_file(&analysis.file_path, analysis.kind, &stamp, &mut claimed),
                Err(outcome) => {
                    log_outcome(&outcome);
                    outcome
                }
            };
            stats.record(&outcome);
            outcomes.push(outcome);
        }

        Ok(BatchReport { stats, outcomes })
    }

    fn collect_files(&self, root: &Path) -> Vec<PathBuf> {
        let max_depth = self.options.max_depth;
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth + 1)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read directory entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if entry.depth() > max_depth {
                    warn!(
                        "Not processing sub-directory \"{}\", maximum depth of {} reached",
                        entry.path().display(),
                        max_depth
                    );
                } else {
                    info!("Processing directory \"{}\" at depth {}", entry.path().display(), entry.depth());
                }
            } else if entry.file_type().is_file() {
                files.push(entry.into_path());
            } else {
                info!("Path \"{}\" is not a file, skipping", entry.path().display());
            }
        }

        debug!("Found {} files under {}", files.len(), root.display());
        files
    }

    fn analyze_files_parallel(&self, files: &[PathBuf]) -> Result<Vec<AnalysisResult>> {
        let threads = worker_threads(self.options.workers);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mediastamp-worker-{}", i))
            .build()
            .context("Failed to build analysis thread pool")?;
        debug!("Analyzing {} files on {} threads", files.len(), threads);

        let pb = if self.options.show_progress {
            ProgressBar::new(files.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1} files/s) {msg}")?
                .progress_chars("#>-"),
        );
        pb.set_message("Reading metadata");

        // par_iter over a slice keeps input order in the collected Vec
        let results: Vec<AnalysisResult> = pool.install(|| {
            files
                .par_iter()
                .map(|file_path| {
                    let result = self.analyze_single_file(file_path);
                    pb.inc(1);
                    result
                })
                .collect()
        });

        pb.finish_and_clear();
        Ok(results)
    }

    /// Classify a file and extract its stamp. Read-only, safe to run in parallel.
    pub fn analyze_single_file(&self, file_path: &Path) -> AnalysisResult {
        let kind = MediaKind::from_path(file_path);
        let (is_media, stamp) = self.classify_and_extract(file_path, kind);

        AnalysisResult {
            file_path: file_path.to_path_buf(),
            kind,
            is_media,
            stamp,
        }
    }

    fn classify_and_extract(&self, file_path: &Path, kind: MediaKind) -> (bool, Result<String, FileOutcome>) {
        let Some(file_name) = file_path.file_name().and_then(|name| name.to_str()) else {
            return (false, Err(skipped(file_path, "file name is not valid UTF-8")));
        };

        match kind {
            MediaKind::Unknown => return (false, Err(skipped(file_path, "cannot guess mime-type"))),
            MediaKind::Other => {
                return (false, Err(skipped(file_path, "guessed mime-type is neither image nor video")));
            }
            MediaKind::Image => match self.exif_processor.is_jpeg(file_path) {
                Ok(true) => {}
                Ok(false) => return (false, Err(skipped(file_path, "image does not contain a JPEG header"))),
                Err(e) => return (false, Err(failed(file_path, format!("{:#}", e)))),
            },
            MediaKind::Video => {}
        }

        if self.options.fast {
            if let Some(found) = self.filename_generator.find_stamp(file_name) {
                let position = if found.at_start() { "starts with" } else { "contains" };
                let reason = format!(
                    "fast mode, {} name {} date-time string \"{}\"",
                    kind.label(), position, found.stamp
                );
                return (true, Err(skipped(file_path, reason)));
            }
        }

        (true, self.extract_stamp(file_path, kind))
    }

    fn extract_stamp(&self, file_path: &Path, kind: MediaKind) -> Result<String, FileOutcome> {
        let date_time = match kind {
            MediaKind::Image => match self.exif_processor.read_date_time_original(file_path) {
                Ok(Some(dt)) => dt,
                Ok(None) => {
                    return Err(skipped(file_path, "image is missing the EXIF DateTimeOriginal tag"));
                }
                Err(e) => return Err(failed(file_path, format!("{:#}", e))),
            },
            _ => match self.mov_reader.read_file_timestamps(file_path) {
                Ok(timestamps) => match timestamps.creation_time {
                    Some(dt) => dt,
                    None => return Err(skipped(file_path, "video is missing a creation date-time")),
                },
                Err(e) => {
                    return Err(failed(file_path, format!("cannot extract video creation date-time: {}", e)));
                }
            },
        };

        let stamp = self.filename_generator.format_stamp(&date_time);
        if !self.filename_generator.is_valid_stamp(&stamp) {
            return Err(failed(file_path, format!("unexpected date-time string \"{}\"", stamp)));
        }
        Ok(stamp)
    }

    fn rename_single_file(
        &self,
        file_path: &Path,
        kind: MediaKind,
        stamp: &str,
        claimed: &mut HashMap<PathBuf, PathBuf>,
    ) -> FileOutcome {
        // analysis only yields a stamp for UTF-8 names
        let file_name = file_path.file_name().and_then(|name| name.to_str()).unwrap_or_default();

        if let Some(found) = self.filename_generator.find_stamp(file_name) {
            let position = if found.at_start() { "starts with" } else { "contains" };
            let which = if found.stamp == stamp { "its creation" } else { "some other" };
            let reason = format!(
                "{} name \"{}\" {} {} date-time string \"{}\"",
                kind.label(), file_name, position, which, found.stamp
            );
            if self.options.force {
                warn!("{}, forcing rename", reason);
            } else {
                return log_outcome_owned(skipped(file_path, reason));
            }
        }

        let new_file_name = self.filename_generator.new_file_name(file_name, stamp, self.options.erase);
        if new_file_name == file_name {
            return log_outcome_owned(skipped(file_path, format!("keeping original file name \"{}\"", file_name)));
        }

        let target_path = file_path.with_file_name(&new_file_name);

        // On disk the earlier rename already sits at the target; in dry-run
        // only its source exists, so compare against that instead.
        let claimed_by = claimed.get(&target_path).cloned();
        let existing = if target_path.exists() {
            Some(target_path.clone())
        } else {
            claimed_by.clone()
        };

        if let Some(existing) = existing {
            let outcome = match (self.content_hasher.same_content(file_path, &existing), &claimed_by) {
                (Ok(true), _) => skipped(
                    file_path,
                    format!("\"{}\" already exists with identical content; consider removing the duplicate", new_file_name),
                ),
                (Ok(false), Some(_)) => failed(
                    file_path,
                    format!("another file in this batch is renamed to \"{}\"; rename manually", new_file_name),
                ),
                (Ok(false), None) => failed(
                    file_path,
                    format!("\"{}\" already exists and differs; consider renaming manually", new_file_name),
                ),
                (Err(e), _) => failed(file_path, format!("{:#}", e)),
            };
            return log_outcome_owned(outcome);
        }

        claimed.insert(target_path.clone(), file_path.to_path_buf());

        if self.options.dry_run {
            info!("Dry-run: would rename \"{}\" to \"{}\"", file_name, new_file_name);
            return FileOutcome::WouldRename {
                from: file_path.to_path_buf(),
                to: target_path,
            };
        }

        match fs::rename(file_path, &target_path) {
            Ok(()) => {
                info!("Renamed \"{}\" to \"{}\"", file_name, new_file_name);
                FileOutcome::Renamed {
                    from: file_path.to_path_buf(),
                    to: target_path,
                }
            }
            Err(e) => log_outcome_owned(failed(file_path, format!("Failed to rename to \"{}\": {}", new_file_name, e))),
        }
    }
}

fn worker_threads(workers: Option<usize>) -> usize {
    match workers {
        Some(n) => n.max(1),
        // I/O bound: half the cores
        None => (num_cpus::get() / 2).max(1),
    }
}

fn skipped(path: &Path, reason: impl Into<String>) -> FileOutcome {
    FileOutcome::Skipped {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn failed(path: &Path, error: impl Into<String>) -> FileOutcome {
    FileOutcome::Failed {
        path: path.to_path_buf(),
        error: error.into(),
    }
}

fn log_outcome(outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Skipped { path, reason } => warn!("\"{}\": {}, skipping", path.display(), reason),
        FileOutcome::Failed { path, error } => error!("\"{}\": {}, skipping", path.display(), error),
        FileOutcome::Renamed { from, to } | FileOutcome::WouldRename { from, to } => {
            debug!("\"{}\" -> \"{}\"", from.display(), to.display())
        }
    }
}

fn log_outcome_owned(outcome: FileOutcome) -> FileOutcome {
    log_outcome(&outcome);
    outcome
}
