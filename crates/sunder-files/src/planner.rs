//! Segment planning and segment-file naming.
//!
//! A plan covers `[0, total_length)` with contiguous descriptors of
//! `segment_size` bytes, the last one possibly shorter. Segment files are
//! named `<name>.<n>` with `n` starting at 1 and zero-padded to the digit
//! count of the segment count, so lexical order equals segment order.

use crate::DEFAULT_BUFFER_SIZE;
use crate::error::{Result, SunderError};
use std::path::Path;

/// One contiguous byte range of the original file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentDescriptor {
    /// Zero-based segment index
    pub index: u64,
    /// Byte offset in the original file
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
}

impl SegmentDescriptor {
    /// Offset one past the last byte of this segment
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Ordered segment layout for one split operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationPlan {
    total_length: u64,
    segment_size: u64,
    buffer_size: usize,
    segments: Vec<SegmentDescriptor>,
}

/// Compute the segment layout for a file of `total_length` bytes.
///
/// # Errors
///
/// Returns [`SunderError::Validation`] if `segment_size` is zero.
///
/// # Example
///
/// ```
/// use sunder_files::plan;
///
/// let plan = plan(10_000_000, 4_000_000).unwrap();
/// let lengths: Vec<u64> = plan.segments().iter().map(|s| s.length).collect();
/// assert_eq!(lengths, [4_000_000, 4_000_000, 2_000_000]);
/// assert_eq!(plan.width(), 1);
/// ```
pub fn plan(total_length: u64, segment_size: u64) -> Result<OperationPlan> {
    if segment_size == 0 {
        return Err(SunderError::validation(
            "segment size must be greater than zero",
        ));
    }

    let count = total_length.div_ceil(segment_size);
    let segments = (0..count)
        .map(|index| {
            let offset = index * segment_size;
            SegmentDescriptor {
                index,
                offset,
                length: segment_size.min(total_length - offset),
            }
        })
        .collect();

    Ok(OperationPlan {
        total_length,
        segment_size,
        buffer_size: DEFAULT_BUFFER_SIZE,
        segments,
    })
}

impl OperationPlan {
    /// Set the copy buffer size carried by this plan
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Total bytes covered by the plan
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Nominal segment size
    #[must_use]
    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    /// Copy buffer size
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Segments in index order
    #[must_use]
    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    /// Number of segments
    #[must_use]
    pub fn count(&self) -> u64 {
        self.segments.len() as u64
    }

    /// Digits needed for segment suffixes
    #[must_use]
    pub fn width(&self) -> usize {
        digit_count(self.count())
    }

    /// True when the input already fits in one segment
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.segments.len() < 2
    }
}

/// Number of decimal digits in `n` (1 for zero)
#[must_use]
pub fn digit_count(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

/// File name for segment `index` of `base_name`.
///
/// ```
/// use sunder_files::planner::segment_file_name;
///
/// assert_eq!(segment_file_name("archive.bin", 0, 1), "archive.bin.1");
/// assert_eq!(segment_file_name("archive.bin", 11, 3), "archive.bin.012");
/// ```
#[must_use]
pub fn segment_file_name(base_name: &str, index: u64, width: usize) -> String {
    format!("{base_name}.{:0width$}", index + 1)
}

/// File name of the reassembled output: the stem followed by `width` zeros
#[must_use]
pub fn joined_file_name(stem: &str, width: usize) -> String {
    format!("{stem}.{}", "0".repeat(width))
}

/// Split a segment path's file name into `(stem, suffix)` at its last dot.
///
/// Returns `None` when the name has no dot or an empty suffix.
#[must_use]
pub fn parse_segment_name(path: &Path) -> Option<(&str, &str)> {
    let name = path.file_name()?.to_str()?;
    let (stem, suffix) = name.rsplit_once('.')?;
    if suffix.is_empty() {
        return None;
    }
    Some((stem, suffix))
}

/// Segment number encoded by `suffix`.
///
/// All-digit suffixes parse; zero is reserved for the joined output and
/// never names a segment.
#[must_use]
pub fn segment_number(suffix: &str) -> Option<u64> {
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse::<u64>().ok().filter(|&n| n != 0)
}
