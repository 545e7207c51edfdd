//! Split/join progress display with progress bars.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use sunder_files::{ProgressSink, SegmentDescriptor};

/// Aggregates per-segment fractions into one byte-based bar
pub struct SegmentProgress {
    bar: ProgressBar,
    done: Vec<AtomicU64>,
    total_done: AtomicU64,
}

impl SegmentProgress {
    /// Create a progress tracker over `segment_count` segments
    #[must_use]
    pub fn new(total_bytes: u64, segment_count: usize, label: &str) -> Self {
        let bar = ProgressBar::new(total_bytes);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());

        Self {
            bar,
            done: (0..segment_count).map(|_| AtomicU64::new(0)).collect(),
            total_done: AtomicU64::new(0),
        }
    }

    /// Create a tracker that draws nothing
    #[must_use]
    pub fn hidden(segment_count: usize) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            done: (0..segment_count).map(|_| AtomicU64::new(0)).collect(),
            total_done: AtomicU64::new(0),
        }
    }

    /// Bytes accounted so far
    #[allow(dead_code)]
    #[must_use]
    pub fn position(&self) -> u64 {
        self.total_done.load(Ordering::Relaxed)
    }

    /// Finish with custom message
    pub fn finish_with_message(&self, msg: String) {
        if let Some(len) = self.bar.length() {
            self.bar.set_position(len);
        }
        self.bar.finish_with_message(msg);
    }

    /// Abandon the progress bar (for errors and cancellation)
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

impl ProgressSink for SegmentProgress {
    fn report(&self, segment: &SegmentDescriptor, fraction: f64) {
        let Some(slot) = usize::try_from(segment.index)
            .ok()
            .and_then(|i| self.done.get(i))
        else {
            return;
        };

        let bytes = (segment.length as f64 * fraction.clamp(0.0, 1.0)) as u64;
        let previous = slot.fetch_max(bytes, Ordering::Relaxed);
        if bytes > previous {
            let total = self.total_done.fetch_add(bytes - previous, Ordering::Relaxed)
                + (bytes - previous);
            self.bar.set_position(total);
        }
    }
}

/// Format bytes in human-readable format
///
/// # Example
///
/// ```ignore
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}

/// Format duration in human-readable format
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
