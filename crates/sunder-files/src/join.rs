//! Concurrent reassembly of segment files.
//!
//! Segments are discovered next to a base path such as `archive.bin.1`:
//! every sibling named `archive.bin.<n>` with a suffix of the same width
//! and a non-zero numeric value takes part, in file-name order. The output
//! is `archive.bin.0` (zeros of the same width).

use crate::copier::copy_segment;
use crate::error::{Result, SunderError};
use crate::planner::{SegmentDescriptor, joined_file_name, parse_segment_name, segment_number};
use crate::workers::{self, SegmentTasks};
use crate::{DEFAULT_BUFFER_SIZE, ProgressSink};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio_util::sync::CancellationToken;

/// Joins numbered segment files back into one file
#[derive(Clone, Default)]
pub struct Joiner {
    buffer_size: Option<usize>,
    progress: Option<Arc<dyn ProgressSink>>,
}

/// Discovered segments and the output they reassemble into
#[derive(Debug, Clone)]
pub struct JoinPlan {
    /// Reassembled output path
    pub output: PathBuf,
    /// Segment files in order, each with its region of the output
    pub segments: Vec<(PathBuf, SegmentDescriptor)>,
}

impl JoinPlan {
    /// Size of the reassembled file
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.segments.last().map_or(0, |(_, s)| s.end())
    }
}

impl Joiner {
    /// Create a joiner with the default buffer size
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the copy buffer size
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Receive per-segment progress
    #[must_use]
    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    fn effective_buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    /// Find the segment set that `base` belongs to.
    ///
    /// Offsets come from the actual sizes of the discovered files, so
    /// segments need not share a common size.
    ///
    /// # Errors
    ///
    /// - [`SunderError::Validation`] if `base` has no suffix, its directory
    ///   is missing, or no segment is found
    /// - [`SunderError::Io`] if the directory cannot be listed
    pub async fn discover(&self, base: &Path) -> Result<JoinPlan> {
        let (stem, suffix) = parse_segment_name(base).ok_or_else(|| {
            SunderError::validation(format!("not a segment path: {}", base.display()))
        })?;
        let width = suffix.len();

        let dir = match base.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SunderError::validation(format!(
                    "segment directory not found: {}",
                    dir.display()
                )));
            }
            Err(e) => return Err(SunderError::io(&dir, e)),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SunderError::io(&dir, e))?
        {
            let path = entry.path();
            let Some((entry_stem, entry_suffix)) = parse_segment_name(&path) else {
                continue;
            };
            if entry_stem != stem
                || entry_suffix.len() != width
                || segment_number(entry_suffix).is_none()
            {
                continue;
            }

            let metadata = entry
                .metadata()
                .await
                .map_err(|e| SunderError::io(&path, e))?;
            if metadata.is_file() {
                found.push((path, metadata.len()));
            }
        }

        if found.is_empty() {
            return Err(SunderError::validation(format!(
                "no segments found for {}",
                base.display()
            )));
        }

        // Fixed-width suffixes make name order equal segment order
        found.sort_by(|(a, _), (b, _)| a.file_name().cmp(&b.file_name()));

        let mut offset = 0u64;
        let segments = found
            .into_iter()
            .enumerate()
            .map(|(index, (path, length))| {
                let segment = SegmentDescriptor {
                    index: index as u64,
                    offset,
                    length,
                };
                offset += length;
                (path, segment)
            })
            .collect();

        Ok(JoinPlan {
            output: dir.join(joined_file_name(stem, width)),
            segments,
        })
    }

    /// Join the segment set containing `base` and return the output path.
    ///
    /// # Errors
    ///
    /// - [`SunderError::Validation`] before any file is touched
    /// - [`SunderError::Cancelled`] if `cancel` was set; the output file
    ///   has been removed
    /// - [`SunderError::Io`] or [`SunderError::Task`] for the first failure;
    ///   the output file has been removed
    pub async fn join(&self, base: &Path, cancel: &CancellationToken) -> Result<PathBuf> {
        let buffer_size = self.effective_buffer_size();
        if buffer_size == 0 {
            return Err(SunderError::validation(
                "buffer size must be greater than zero",
            ));
        }

        let JoinPlan { output, segments } = self.discover(base).await?;
        let total: u64 = segments.iter().map(|(_, s)| s.length).sum();

        tracing::info!(
            "Joining {} segments ({} bytes) into {}",
            segments.len(),
            total,
            output.display()
        );

        if cancel.is_cancelled() {
            return Err(SunderError::Cancelled);
        }

        // Size the output up front so a stale longer file leaves no tail
        if let Err(e) = presize(&output, total).await {
            workers::remove_outputs(std::slice::from_ref(&output)).await;
            return Err(SunderError::io(&output, e));
        }

        let output = Arc::new(output);
        let abort = cancel.child_token();
        let mut tasks = SegmentTasks::new();

        for (path, segment) in segments {
            if cancel.is_cancelled() {
                break;
            }

            tracing::debug!(
                "Segment {}: {} -> offset={} length={}",
                segment.index + 1,
                path.display(),
                segment.offset,
                segment.length
            );

            let output = Arc::clone(&output);
            let progress = self.progress.clone();
            let abort = abort.clone();

            tasks.spawn(async move {
                join_segment(
                    &path,
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
        let output = Arc::unwrap_or_clone(output);

        if cancel.is_cancelled() {
            tracing::info!("Join into {} cancelled, removing output", output.display());
            workers::remove_outputs(std::slice::from_ref(&output)).await;
            return Err(SunderError::Cancelled);
        }
        if let Some(err) = failure {
            workers::remove_outputs(std::slice::from_ref(&output)).await;
            return Err(err);
        }

        tracing::info!("Joined {} bytes into {}", total, output.display());
        Ok(output)
    }
}

impl std::fmt::Debug for Joiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joiner")
            .field("buffer_size", &self.effective_buffer_size())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

async fn presize(output: &Path, total: u64) -> io::Result<()> {
    let file = File::create(output).await?;
    file.set_len(total).await?;
    Ok(())
}

/// Copy one whole segment file into its region of `output`
async fn join_segment(
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

    let mut writer = OpenOptions::new()
        .write(true)
        .create(true)
        .open(output)
        .await
        .map_err(|e| workers::io_error(output, &segment, e))?;

    let report = workers::segment_progress(progress, segment);
    let report = report.as_ref().map(|r| r as &(dyn Fn(f64) + Send + Sync));

    let copied = copy_segment(
        &mut reader,
        &mut writer,
        Some(segment.offset),
        segment.length,
        buffer_size,
        report,
        cancel,
    )
    .await
    .map_err(|e| workers::segment_error(input, &segment, e))?;

    tracing::debug!("Segment {} joined: {} bytes", segment.index + 1, copied);
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn test_join_three_segments() {
        let dir = TempDir::new().unwrap();
        let base = write(dir.path(), "archive.bin.1", b"Hello, ");
        write(dir.path(), "archive.bin.2", b"segmented ");
        write(dir.path(), "archive.bin.3", b"world!");

        let output = Joiner::new()
            .buffer_size(4)
            .join(&base, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("archive.bin.0"));
        assert_eq!(std::fs::read(&output).unwrap(), b"Hello, segmented world!");
    }

    #[tokio::test]
    async fn test_join_from_any_member() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "x.01", b"ab");
        let member = write(dir.path(), "x.02", b"cd");

        let output = Joiner::new()
            .join(&member, &CancellationToken::new())
            .await
            .unwrap();

        assert!(output.ends_with("x.00"));
        assert_eq!(std::fs::read(&output).unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_discover_filters_candidates() {
        let dir = TempDir::new().unwrap();
        let base = write(dir.path(), "f.bin.01", b"1");
        write(dir.path(), "f.bin.02", b"22");
        write(dir.path(), "f.bin.10", b"333");
        write(dir.path(), "f.bin.00", b"stale output");
        write(dir.path(), "f.bin.3", b"wrong width");
        write(dir.path(), "f.bin.ab", b"not numeric");
        write(dir.path(), "g.bin.04", b"other stem");
        std::fs::create_dir(dir.path().join("f.bin.05")).unwrap();

        let plan = Joiner::new().discover(&base).await.unwrap();

        let names: Vec<_> = plan
            .segments
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["f.bin.01", "f.bin.02", "f.bin.10"]);

        let layout: Vec<_> = plan.segments.iter().map(|(_, s)| (s.offset, s.length)).collect();
        assert_eq!(layout, [(0, 1), (1, 2), (3, 3)]);
        assert_eq!(plan.total_length(), 6);
        assert_eq!(plan.output, dir.path().join("f.bin.00"));
    }

    #[tokio::test]
    async fn test_join_overwrites_stale_longer_output() {
        let dir = TempDir::new().unwrap();
        let base = write(dir.path(), "a.1", b"new");
        write(dir.path(), "a.2", b"data");
        write(dir.path(), "a.0", b"a much longer stale output file");

        let output = Joiner::new()
            .join(&base, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"newdata");
    }

    #[tokio::test]
    async fn test_join_handles_empty_segment() {
        let dir = TempDir::new().unwrap();
        let base = write(dir.path(), "e.1", b"abc");
        write(dir.path(), "e.2", b"");
        write(dir.path(), "e.3", b"def");

        let output = Joiner::new()
            .join(&base, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_join_no_segments() {
        let dir = TempDir::new().unwrap();
        let err = Joiner::new()
            .join(&dir.path().join("ghost.1"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SunderError::Validation(msg) => assert!(msg.contains("no segments found")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_requires_suffix() {
        let dir = TempDir::new().unwrap();
        let err = Joiner::new()
            .join(&dir.path().join("nosuffix"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SunderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_join_rejects_zero_buffer() {
        let dir = TempDir::new().unwrap();
        let base = write(dir.path(), "z.1", b"x");

        let err = Joiner::new()
            .buffer_size(0)
            .join(&base, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SunderError::Validation(_)));
        assert!(!dir.path().join("z.0").exists());
    }

    #[tokio::test]
    async fn test_join_cancelled_removes_output() {
        let dir = TempDir::new().unwrap();
        let chunk = vec![7u8; 8 * 1024];
        let base = write(dir.path(), "c.1", &chunk);
        write(dir.path(), "c.2", &chunk);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let sink = move |_: &SegmentDescriptor, fraction: f64| {
            if fraction > 0.25 {
                trigger.cancel();
            }
        };

        let err = Joiner::new()
            .buffer_size(128)
            .progress(Arc::new(sink))
            .join(&base, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!dir.path().join("c.0").exists());
        assert!(dir.path().join("c.1").exists());
        assert!(dir.path().join("c.2").exists());
    }

    #[tokio::test]
    async fn test_join_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let base = write(dir.path(), "k.1", b"12");
        write(dir.path(), "k.2", b"34");

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Joiner::new().join(&base, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dir.path().join("k.0").exists());
    }
}
