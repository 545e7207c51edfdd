//! Sunder CLI
//!
//! Split large files into numbered segments and join them back.

mod config;
mod progress;
mod size;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use sunder_files::{CancellationToken, Joiner, Splitter, SunderError};

use config::Config;
use progress::{SegmentProgress, format_bytes, format_duration};
use size::{parse_buffer_size, parse_size};

/// Terminal outcome of a command that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    NotFound,
    Cancelled,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => ExitCode::SUCCESS,
            Outcome::NotFound => ExitCode::FAILURE,
            // Conventional code for termination by SIGINT
            Outcome::Cancelled => ExitCode::from(130),
        }
    }
}

/// Sunder - split files into segments and join them back
#[derive(Parser)]
#[command(name = "sunder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into numbered segment files
    Split {
        /// File to split
        #[arg(required = true)]
        file: PathBuf,

        /// Output directory (defaults to the file's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Segment size, e.g. 650m, 4g, 1048576
        #[arg(short, long, value_parser = parse_size)]
        size: Option<u64>,

        /// Copy buffer size, e.g. 4k, 64k
        #[arg(short, long, value_parser = parse_buffer_size)]
        buffer: Option<usize>,

        /// Do not draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Join a segment set back into one file
    Join {
        /// Any segment of the set, e.g. archive.bin.1
        #[arg(required = true)]
        segment: PathBuf,

        /// Copy buffer size, e.g. 4k, 64k
        #[arg(short, long, value_parser = parse_buffer_size)]
        buffer: Option<usize>,

        /// Do not draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show how a file would be split without writing anything
    Check {
        /// File to check
        #[arg(required = true)]
        file: PathBuf,

        /// Output directory (defaults to the file's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Segment size, e.g. 650m, 4g, 1048576
        #[arg(short, long, value_parser = parse_size)]
        size: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            print_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default()?,
    };

    config.validate()?;

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            watcher.cancel();
        }
    });

    match cli.command {
        Commands::Split {
            file,
            output,
            size,
            buffer,
            no_progress,
        } => {
            let opts = SplitArgs::resolve(file, output, size, buffer, &config)?;
            if cli.verbose {
                opts.print("split");
            }
            split_file(&opts, !no_progress && config.io.progress, &cancel).await
        }
        Commands::Join {
            segment,
            buffer,
            no_progress,
        } => {
            let buffer_size = buffer.unwrap_or(config.io.buffer_size);
            if cli.verbose {
                println!("Operation: join");
                println!("Segment: {}", segment.display());
                println!("Buffer size: {}", buffer_size);
                println!();
            }
            join_file(
                &segment,
                buffer_size,
                !no_progress && config.io.progress,
                &cancel,
            )
            .await
        }
        Commands::Check { file, output, size } => {
            let opts = SplitArgs::resolve(file, output, size, None, &config)?;
            if cli.verbose {
                opts.print("check");
            }
            check_file(&opts).await
        }
    }
}

/// Effective split options after merging flags over config
struct SplitArgs {
    file: PathBuf,
    output: Option<PathBuf>,
    segment_size: u64,
    buffer_size: usize,
}

impl SplitArgs {
    fn resolve(
        file: PathBuf,
        output: Option<PathBuf>,
        size: Option<u64>,
        buffer: Option<usize>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let segment_size = match size {
            Some(size) => size,
            None => config.segment_size()?,
        };

        Ok(Self {
            file,
            output: output.or_else(|| config.split.output_dir.clone()),
            segment_size,
            buffer_size: buffer.unwrap_or(config.io.buffer_size),
        })
    }

    fn splitter(&self) -> Splitter {
        let splitter = Splitter::new(self.segment_size).buffer_size(self.buffer_size);
        match &self.output {
            Some(dir) => splitter.output_dir(dir),
            None => splitter,
        }
    }

    /// Print effective options for debugging
    fn print(&self, operation: &str) {
        println!("Operation: {operation}");
        println!("Input: {}", self.file.display());
        match &self.output {
            Some(dir) => println!("Output directory: {}", dir.display()),
            None => println!("Output directory: (input directory)"),
        }
        println!("Segment size: {}", self.segment_size);
        println!("Buffer size: {}", self.buffer_size);
        println!();
    }
}

/// Split a file into segments
async fn split_file(
    opts: &SplitArgs,
    show_progress: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<Outcome> {
    let file = &opts.file;
    if !file.is_file() {
        println!("File '{}' not found.", file.display());
        return Ok(Outcome::NotFound);
    }

    let splitter = opts.splitter();
    let prepared = splitter.prepare(file).await?;
    let plan = &prepared.plan;

    if plan.is_degenerate() {
        println!(
            "Split '{}' skipped: fits in one segment of {}.",
            file.display(),
            format_bytes(plan.segment_size())
        );
        return Ok(Outcome::Completed);
    }

    tracing::info!(
        "Splitting {:?} into {} segments of {}",
        file,
        plan.count(),
        format_bytes(plan.segment_size())
    );

    let progress = Arc::new(segment_progress(
        show_progress,
        plan.total_length(),
        plan.segments().len(),
        &format!("Splitting: {}", display_name(file)),
    ));

    let started = Instant::now();
    let result = splitter.progress(progress.clone()).split(file, cancel).await;

    match result {
        Ok(paths) => {
            progress.finish_with_message(format!(
                "{} segments written in {}",
                paths.len(),
                format_duration(started.elapsed())
            ));
            println!("Split '{}' file completed.", file.display());
            if let (Some(first), Some(last)) = (paths.first(), paths.last()) {
                println!("Segments: {} .. {}", first.display(), last.display());
            }
            Ok(Outcome::Completed)
        }
        Err(SunderError::Cancelled) => {
            progress.abandon();
            println!("Split '{}' cancelled.", file.display());
            Ok(Outcome::Cancelled)
        }
        Err(e) => {
            progress.abandon();
            Err(e).with_context(|| format!("Failed to split '{}'", file.display()))
        }
    }
}

/// Join a segment set into one file
async fn join_file(
    segment: &Path,
    buffer_size: usize,
    show_progress: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<Outcome> {
    let joiner = Joiner::new().buffer_size(buffer_size);
    let discovered = joiner
        .discover(segment)
        .await
        .with_context(|| format!("Failed to join '{}'", segment.display()))?;

    tracing::info!(
        "Joining {} segments ({}) into {:?}",
        discovered.segments.len(),
        format_bytes(discovered.total_length()),
        discovered.output
    );

    let progress = Arc::new(segment_progress(
        show_progress,
        discovered.total_length(),
        discovered.segments.len(),
        &format!("Joining: {}", display_name(&discovered.output)),
    ));

    let started = Instant::now();
    let result = joiner.progress(progress.clone()).join(segment, cancel).await;

    match result {
        Ok(output) => {
            progress.finish_with_message(format!(
                "{} joined in {}",
                format_bytes(discovered.total_length()),
                format_duration(started.elapsed())
            ));
            println!("Join '{}' file completed.", segment.display());
            println!("Output: {}", output.display());
            Ok(Outcome::Completed)
        }
        Err(SunderError::Cancelled) => {
            progress.abandon();
            println!("Join '{}' cancelled.", segment.display());
            Ok(Outcome::Cancelled)
        }
        Err(e) => {
            progress.abandon();
            Err(e).with_context(|| format!("Failed to join '{}'", segment.display()))
        }
    }
}

/// Print the split plan without writing anything
async fn check_file(opts: &SplitArgs) -> anyhow::Result<Outcome> {
    let file = &opts.file;
    if !file.is_file() {
        println!("File '{}' not found.", file.display());
        return Ok(Outcome::NotFound);
    }

    let prepared = opts.splitter().prepare(file).await?;
    let plan = &prepared.plan;

    println!("File: {}", file.display());
    println!("Size: {}", format_bytes(plan.total_length()));
    println!("Segment size: {}", format_bytes(plan.segment_size()));

    if plan.is_degenerate() {
        println!("Fits in one segment; split would write nothing.");
    } else {
        println!("Segments: {} (suffix width {})", plan.count(), plan.width());
        for (segment, path) in plan.segments().iter().zip(&prepared.paths) {
            println!(
                "  {}  offset {}  length {}",
                path.display(),
                segment.offset,
                segment.length
            );
        }
    }

    println!("Check '{}' file completed.", file.display());
    Ok(Outcome::Completed)
}

fn segment_progress(show: bool, total: u64, segments: usize, label: &str) -> SegmentProgress {
    if show {
        SegmentProgress::new(total, segments, label)
    } else {
        SegmentProgress::hidden(segments)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Print an error with its full cause chain
fn print_error_chain(err: &anyhow::Error) {
    eprintln!("{} {}", style("Error:").red().bold(), err);

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        eprintln!("{}", style("Caused by:").yellow());
        for (depth, cause) in causes.enumerate() {
            eprintln!("{}{}", "    ".repeat(depth + 1), cause);
        }
    }
}
