//! Concurrent file splitting.
//!
//! One worker per segment reads its byte range from its own handle on the
//! input and writes a fresh segment file. The split either produces the
//! complete segment set or leaves none of it behind.

use crate::copier::copy_segment;
use crate::error::{Result, SunderError};
use crate::planner::{self, OperationPlan, SegmentDescriptor, segment_file_name};
use crate::workers::{self, SegmentTasks};
use crate::{DEFAULT_BUFFER_SIZE, DEFAULT_SEGMENT_SIZE, ProgressSink};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;

/// Splits a file into numbered segment files
#[derive(Clone)]
pub struct Splitter {
    segment_size: u64,
    buffer_size: usize,
    output_dir: Option<PathBuf>,
    progress: Option<Arc<dyn ProgressSink>>,
}

/// A validated split: the plan and where every segment goes
#[derive(Debug, Clone)]
pub struct SplitPlan {
    /// Input file
    pub input: PathBuf,
    /// Segment layout
    pub plan: OperationPlan,
    /// Output path per segment, in index order
    pub paths: Vec<PathBuf>,
}

impl Splitter {
    /// Create a splitter producing segments of `segment_size` bytes
    #[must_use]
    pub fn new(segment_size: u64) -> Self {
        Self {
            segment_size,
            buffer_size: DEFAULT_BUFFER_SIZE,
            output_dir: None,
            progress: None,
        }
    }

    /// Set the copy buffer size
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Write segments into `dir` instead of the input's directory
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Receive per-segment progress
    #[must_use]
    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Validate the request and compute the segment layout without writing.
    ///
    /// # Errors
    ///
    /// - [`SunderError::Validation`] if the input is missing, the output
    ///   directory does not exist, or a size is zero
    /// - [`SunderError::Io`] if the input's metadata cannot be read
    pub async fn prepare(&self, input: &Path) -> Result<SplitPlan> {
        if self.segment_size == 0 {
            return Err(SunderError::validation(
                "segment size must be greater than zero",
            ));
        }
        if self.buffer_size == 0 {
            return Err(SunderError::validation(
                "buffer size must be greater than zero",
            ));
        }

        let metadata = match tokio::fs::metadata(input).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                return Err(SunderError::validation(format!(
                    "input not found: {}",
                    input.display()
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SunderError::validation(format!(
                    "input not found: {}",
                    input.display()
                )));
            }
            Err(e) => return Err(SunderError::io(input, e)),
        };

        let file_name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SunderError::validation("input file name is not valid UTF-8"))?;

        let output_dir = match &self.output_dir {
            Some(dir) => dir.clone(),
            None => match input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };
        let dir_exists = tokio::fs::metadata(&output_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !dir_exists {
            return Err(SunderError::validation(format!(
                "output directory not found: {}",
                output_dir.display()
            )));
        }

        let plan =
            planner::plan(metadata.len(), self.segment_size)?.with_buffer_size(self.buffer_size);
        let width = plan.width();
        let paths = plan
            .segments()
            .iter()
            .map(|s| output_dir.join(segment_file_name(file_name, s.index, width)))
            .collect();

        Ok(SplitPlan {
            input: input.to_path_buf(),
            plan,
            paths,
        })
    }

    /// Split `input` into segment files.
    ///
    /// Returns the segment paths in index order, or an empty list when the
    /// input fits in a single segment (nothing is written then).
    ///
    /// # Errors
    ///
    /// - [`SunderError::Validation`] before any file is touched
    /// - [`SunderError::Cancelled`] if `cancel` was set; no file at any
    ///   planned segment path remains
    /// - [`SunderError::Io`] or [`SunderError::Task`] for the first worker
    ///   failure; no file at any planned segment path remains
    pub async fn split(&self, input: &Path, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
        let SplitPlan { input, plan, paths } = self.prepare(input).await?;

        if plan.is_degenerate() {
            tracing::info!(
                "{} fits in one segment of {} bytes, nothing to split",
                input.display(),
                plan.segment_size()
            );
            return Ok(Vec::new());
        }

        tracing::info!(
            "Splitting {} ({} bytes) into {} segments of {} bytes",
            input.display(),
            plan.total_length(),
            plan.count(),
            plan.segment_size()
        );

        let input = Arc::new(input);
        let abort = cancel.child_token();
        let mut tasks = SegmentTasks::new();
        let mut launched = Vec::with_capacity(paths.len());

        for (segment, output) in plan.segments().iter().copied().zip(&paths) {
            if cancel.is_cancelled() {
                break;
            }

            tracing::debug!(
                "Segment {}: offset={} length={} -> {}",
                segment.index + 1,
                segment.offset,
                segment.length,
                output.display()
            );

            launched.push(output.clone());
            let output = output.clone();
            let input = Arc::clone(&input);
            let progress = self.progress.clone();
            let abort = abort.clone();
            let buffer_size = plan.buffer_size();

            tasks.spawn(async move {
                split_segment(
                    &input,
                    &output,
                    segment,
                    buffer_size,
                    progress.as_deref(),
                    &abort,
                )
                .await
            });
        }

        let failure = workers::await_all(tasks, &abort).await;

        if cancel.is_cancelled() {
            tracing::info!("Split of {} cancelled, removing segments", input.display());
            workers::remove_outputs(&paths).await;
            return Err(SunderError::Cancelled);
        }
        if let Some(err) = failure {
            workers::remove_outputs(&paths).await;
            return Err(err);
        }

        tracing::info!("Split {} into {} segments", input.display(), launched.len());
        Ok(launched)
    }
}

impl Default for Splitter {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_SIZE)
    }
}

impl std::fmt::Debug for Splitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Splitter")
            .field("segment_size", &self.segment_size)
            .field("buffer_size", &self.buffer_size)
            .field("output_dir", &self.output_dir)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Copy one segment of `input` into its own file at `output`
async fn split_segment(
    input: &Path,
    output: &Path,
    segment: SegmentDescriptor,
    buffer_size: usize,
    progress: Option<&dyn ProgressSink>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut reader = File::open(input)
        .await
        .map_err(|e| workers::io_error(input, &segment, e))?;
    reader
        .seek(SeekFrom::Start(segment.offset))
        .await
        .map_err(|e| workers::io_error(input, &segment, e))?;

    let mut writer = File::create(output)
        .await
        .map_err(|e| workers::io_error(output, &segment, e))?;

    let report = workers::segment_progress(progress, segment);
    let report = report.as_ref().map(|r| r as &(dyn Fn(f64) + Send + Sync));

    let copied = copy_segment(
        &mut reader,
        &mut writer,
        None,
        segment.length,
        buffer_size,
        report,
        cancel,
    )
    .await
    .map_err(|e| workers::segment_error(output, &segment, e))?;

    tracing::debug!("Segment {} done: {} bytes", segment.index + 1, copied);
    Ok(copied)
}
