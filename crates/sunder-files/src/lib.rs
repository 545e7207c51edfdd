//! # Sunder Files
//!
//! Segment engine for Sunder.
//!
//! This crate provides:
//! - Chunk planning with integer-only boundary math
//! - Offset-addressed segment copying with a bounded reusable buffer
//! - Concurrent split (one worker per segment) with all-or-nothing cleanup
//! - Concurrent join of numbered segment files into a single output
//!
//! Every operation takes a [`CancellationToken`]. Workers poll it between
//! blocks; once it is set, the engine waits for all workers to stop and
//! removes whatever output the operation produced.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod copier;
pub mod error;
pub mod join;
pub mod planner;
pub mod split;
mod workers;

pub use copier::{CopyError, copy_segment};
pub use error::{Result, SunderError};
pub use join::Joiner;
pub use planner::{OperationPlan, SegmentDescriptor, plan};
pub use split::Splitter;
pub use tokio_util::sync::CancellationToken;

/// Default segment size (1 GiB)
pub const DEFAULT_SEGMENT_SIZE: u64 = 1024 * 1024 * 1024;

/// Default copy buffer size (4 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

/// Receives per-segment progress from running workers.
///
/// Fractions are `completed_blocks / total_blocks`, reported before each
/// block, so they lie in `[0, 1)`. A segment is complete only when its
/// worker exits successfully.
pub trait ProgressSink: Send + Sync {
    /// Report progress for one segment
    fn report(&self, segment: &SegmentDescriptor, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(&SegmentDescriptor, f64) + Send + Sync,
{
    fn report(&self, segment: &SegmentDescriptor, fraction: f64) {
        self(segment, fraction)
    }
}
