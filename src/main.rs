use anyhow::Result;
use clap::Parser;
use log::{debug, error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use mediastamp::{ChildLookup, FileOutcome, FileProcessor, MovReaderConfig, RenameOptions, TimeBasis};

#[derive(Parser)]
#[command(name = "mediastamp")]
#[command(version)]
#[command(about = "Rename JPEG images and MOV/MP4 videos to start with their creation date-time")]
#[command(long_about = "Batch renames media files so their name starts with the creation date-time.

JPEG images: EXIF DateTimeOriginal
MOV/MP4 videos: creation time from the movie header (moov/mvhd)

Output format: YYYYMMDD_HHMMSS_<original name>, or YYYYMMDD_HHMMSS<ext> with --erase")]
struct Cli {
    /// Working directory containing the files to rename
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// Process sub-directories too, see --max-depth
    #[arg(short, long)]
    recursive: bool,

    /// Maximum sub-directory depth when --recursive is given
    #[arg(short, long, default_value = "1")]
    max_depth: usize,

    /// Replace the original file name (extension is kept) instead of prefixing it
    #[arg(short, long)]
    erase: bool,

    /// Skip file names already containing any date-time string without reading metadata
    #[arg(short = 's', long)]
    fast: bool,

    /// Only report what would be renamed
    #[arg(short, long)]
    dry_run: bool,

    /// Rename even if the file name already contains a date-time string
    #[arg(short, long)]
    force: bool,

    /// Number of parallel metadata readers (default: CPU count / 2)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Interpret video timestamps as UTC instead of local time
    #[arg(long)]
    utc: bool,

    /// Search the whole moov atom for mvhd instead of expecting it first
    #[arg(long)]
    by_tag: bool,

    /// Stop looking for the moov atom past this many bytes
    #[arg(long)]
    max_scan_bytes: Option<u64>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Increase verbosity (-v=DEBUG, -vv=TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only show warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => log::LevelFilter::Warn,
        (false, 0) => log::LevelFilter::Info,
        (false, 1) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    debug!("working path \"{}\"", cli.path.display());
    if !cli.path.is_dir() {
        error!("\"{}\" is not a valid directory", cli.path.display());
        return Ok(ExitCode::FAILURE);
    }

    let options = RenameOptions {
        erase: cli.erase,
        fast: cli.fast,
        dry_run: cli.dry_run,
        force: cli.force,
        max_depth: if cli.recursive { cli.max_depth } else { 0 },
        workers: cli.workers,
        show_progress: !cli.no_progress && !cli.quiet,
        mov: MovReaderConfig {
            time_basis: if cli.utc { TimeBasis::Utc } else { TimeBasis::Local },
            child_lookup: if cli.by_tag { ChildLookup::ByTag } else { ChildLookup::FirstChild },
            max_scan_bytes: cli.max_scan_bytes,
            ..MovReaderConfig::default()
        },
    };

    let processor = FileProcessor::new(options);
    let report = processor.process_directory(&cli.path)?;

    let stats = &report.stats;
    if cli.dry_run {
        println!(
            "Files total: {}, image/video: {}, dry-run - would be renamed: {}",
            stats.files, stats.media_files, stats.renamed
        );
    } else {
        println!(
            "Files total: {}, image/video: {}, renamed: {}",
            stats.files, stats.media_files, stats.renamed
        );
    }

    if stats.errors > 0 {
        println!("\nErrors: {}", stats.errors);
        for outcome in &report.outcomes {
            if let FileOutcome::Failed { path, error } = outcome {
                println!("  {}: {}", path.display(), error);
            }
        }
    }
    info!("{}", stats);

    Ok(ExitCode::SUCCESS)
}
