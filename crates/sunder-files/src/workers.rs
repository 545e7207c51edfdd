//! Per-segment worker plumbing shared by split and join.

use crate::copier::CopyError;
use crate::error::SunderError;
use crate::{ProgressSink, SegmentDescriptor};
use std::io;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Workers spawned for one operation
pub(crate) type SegmentTasks = JoinSet<Result<u64, SunderError>>;

/// Map a copy failure to the engine error for `segment`
pub(crate) fn segment_error(path: &Path, segment: &SegmentDescriptor, err: CopyError) -> SunderError {
    match err {
        CopyError::Cancelled => SunderError::Cancelled,
        CopyError::Io(source) => io_error(path, segment, source),
    }
}

pub(crate) fn io_error(path: &Path, segment: &SegmentDescriptor, source: io::Error) -> SunderError {
    SunderError::Io {
        path: path.to_path_buf(),
        segment: Some(segment.index),
        source,
    }
}

/// Bind a sink to one segment, in the shape the copier expects
pub(crate) fn segment_progress<'a>(
    sink: Option<&'a dyn ProgressSink>,
    segment: SegmentDescriptor,
) -> Option<impl Fn(f64) + Send + Sync + 'a> {
    sink.map(|sink| move |fraction: f64| sink.report(&segment, fraction))
}

/// Join barrier: wait for every worker and return the first real failure.
///
/// The first failure cancels `abort` so that siblings stop at their next
/// block boundary. Worker cancellations are not failures on their own.
pub(crate) async fn await_all(mut tasks: SegmentTasks, abort: &CancellationToken) -> Option<SunderError> {
    let mut first_error = None;

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(SunderError::Task(e.to_string())));

        match outcome {
            Ok(_) | Err(SunderError::Cancelled) => {}
            Err(err) => {
                if first_error.is_none() {
                    tracing::error!("Segment worker failed: {}", err);
                    abort.cancel();
                    first_error = Some(err);
                } else {
                    tracing::debug!("Further segment failure: {}", err);
                }
            }
        }
    }

    first_error
}

/// Delete every path that exists; problems are logged, not returned
pub(crate) async fn remove_outputs(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}
