//! Error types for split and join operations.

use std::borrow::Cow;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, SunderError>;

/// Terminal outcomes of a split or join other than success
#[derive(Debug, Error)]
pub enum SunderError {
    /// Caller mistake detected before any work started
    #[error("validation failed: {0}")]
    Validation(Cow<'static, str>),

    /// Underlying read, write or seek failure
    #[error("I/O error on {}{}: {source}", .path.display(), segment_label(.segment))]
    Io {
        /// File the failing operation touched
        path: PathBuf,
        /// Zero-based segment index, when a worker failed
        segment: Option<u64>,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A worker task panicked or was torn down by the runtime
    #[error("segment task failed: {0}")]
    Task(String),

    /// The operation was cancelled and its output removed
    #[error("operation cancelled")]
    Cancelled,
}

impl SunderError {
    /// Create a validation error
    pub fn validation(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an I/O error that is not tied to a segment
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            segment: None,
            source,
        }
    }

    /// Check whether this outcome is a cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn segment_label(segment: &Option<u64>) -> String {
    match segment {
        Some(index) => format!(" (segment {})", index + 1),
        None => String::new(),
    }
}
