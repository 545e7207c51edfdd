//! Integration tests for split and join.
//!
//! Exercises the engines end to end against real files: round trips,
//! naming, no-op splits, cancellation cleanup and failure cleanup.

use std::sync::Arc;
use sunder_files::{CancellationToken, Joiner, SegmentDescriptor, Splitter, SunderError, plan};
use sunder_integration_tests::{RecordingSink, file_names, random_file, random_len};
use tempfile::TempDir;

// ============================================================================
// Round Trips
// ============================================================================

/// 10,000,000 bytes in 4,000,000-byte segments with a 64 KiB buffer
#[tokio::test]
async fn test_ten_megabytes_three_segments() {
    let dir = TempDir::new().unwrap();
    let (input, data) = random_file(dir.path(), "archive.bin", 10_000_000, 1);

    let layout = plan(10_000_000, 4_000_000).unwrap();
    let offsets: Vec<u64> = layout.segments().iter().map(|s| s.offset).collect();
    let lengths: Vec<u64> = layout.segments().iter().map(|s| s.length).collect();
    assert_eq!(offsets, [0, 4_000_000, 8_000_000]);
    assert_eq!(lengths, [4_000_000, 4_000_000, 2_000_000]);

    let cancel = CancellationToken::new();
    let paths = Splitter::new(4_000_000)
        .buffer_size(65536)
        .split(&input, &cancel)
        .await
        .unwrap();

    assert_eq!(
        file_names(dir.path()),
        ["archive.bin", "archive.bin.1", "archive.bin.2", "archive.bin.3"]
    );
    let sizes: Vec<u64> = paths
        .iter()
        .map(|p| std::fs::metadata(p).unwrap().len())
        .collect();
    assert_eq!(sizes, [4_000_000, 4_000_000, 2_000_000]);

    let output = Joiner::new()
        .buffer_size(65536)
        .join(&paths[0], &cancel)
        .await
        .unwrap();

    assert_eq!(output, dir.path().join("archive.bin.0"));
    let joined = std::fs::read(&output).unwrap();
    assert_eq!(joined.len(), 10_000_000);
    assert!(joined == data, "joined file differs from original");
}

#[tokio::test]
async fn test_roundtrip_two_digit_suffixes() {
    let dir = TempDir::new().unwrap();
    let len = random_len(7, 50_000..60_000);
    let (input, data) = random_file(dir.path(), "photo.raw", len, 7);
    let cancel = CancellationToken::new();

    let paths = Splitter::new(5_000)
        .buffer_size(333)
        .split(&input, &cancel)
        .await
        .unwrap();

    assert!(paths.len() >= 10);
    assert!(paths[0].ends_with("photo.raw.01"));

    // Join from a member in the middle of the set
    let output = Joiner::new()
        .buffer_size(1000)
        .join(&paths[4], &cancel)
        .await
        .unwrap();

    assert!(output.ends_with("photo.raw.00"));
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

#[tokio::test]
async fn test_roundtrip_many_segments() {
    let dir = TempDir::new().unwrap();
    let (input, data) = random_file(dir.path(), "many.bin", 250 * 64 + 17, 3);
    let cancel = CancellationToken::new();

    let paths = Splitter::new(64).split(&input, &cancel).await.unwrap();

    assert_eq!(paths.len(), 251);
    assert!(paths[0].ends_with("many.bin.001"));
    assert!(paths[250].ends_with("many.bin.251"));
    assert_eq!(std::fs::metadata(&paths[250]).unwrap().len(), 17);

    let output = Joiner::new().join(&paths[0], &cancel).await.unwrap();
    assert_eq!(std::fs::read(output).unwrap(), data);
}

#[tokio::test]
async fn test_split_to_other_directory_then_join_there() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let (input, data) = random_file(src.path(), "disk.img", 30_000, 11);
    let cancel = CancellationToken::new();

    let paths = Splitter::new(12_000)
        .output_dir(out.path())
        .split(&input, &cancel)
        .await
        .unwrap();

    assert_eq!(file_names(src.path()), ["disk.img"]);
    assert_eq!(file_names(out.path()), ["disk.img.1", "disk.img.2", "disk.img.3"]);

    let output = Joiner::new().join(&paths[2], &cancel).await.unwrap();
    assert_eq!(output, out.path().join("disk.img.0"));
    assert_eq!(std::fs::read(output).unwrap(), data);
}

#[tokio::test]
async fn test_join_ignores_previous_output() {
    let dir = TempDir::new().unwrap();
    let (input, data) = random_file(dir.path(), "log.txt", 9_000, 5);
    let cancel = CancellationToken::new();

    let paths = Splitter::new(4_000).split(&input, &cancel).await.unwrap();

    let first = Joiner::new().join(&paths[0], &cancel).await.unwrap();
    let second = Joiner::new().join(&paths[1], &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(std::fs::read(second).unwrap(), data);
}

// ============================================================================
// No-op Splits
// ============================================================================

#[tokio::test]
async fn test_exact_fit_is_noop() {
    let dir = TempDir::new().unwrap();
    let (input, data) = random_file(dir.path(), "fits.bin", 4_000_000, 2);

    let paths = Splitter::new(4_000_000)
        .split(&input, &CancellationToken::new())
        .await
        .unwrap();

    assert!(paths.is_empty());
    assert_eq!(file_names(dir.path()), ["fits.bin"]);
    assert_eq!(std::fs::read(&input).unwrap(), data);
}

#[tokio::test]
async fn test_empty_file_is_noop() {
    let dir = TempDir::new().unwrap();
    let (input, _) = random_file(dir.path(), "empty", 0, 0);

    let paths = Splitter::new(1)
        .split(&input, &CancellationToken::new())
        .await
        .unwrap();

    assert!(paths.is_empty());
    assert_eq!(file_names(dir.path()), ["empty"]);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_split_cancel_during_copy_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let (input, _) = random_file(dir.path(), "big.bin", 512 * 1024, 9);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sink = move |segment: &SegmentDescriptor, fraction: f64| {
        if segment.index == 3 && fraction > 0.1 {
            trigger.cancel();
        }
    };

    let err = Splitter::new(64 * 1024)
        .buffer_size(512)
        .progress(Arc::new(sink))
        .split(&input, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(file_names(dir.path()), ["big.bin"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_join_cancel_from_another_thread() {
    let dir = TempDir::new().unwrap();
    let (input, _) = random_file(dir.path(), "vid.mp4", 256 * 1024, 4);
    let paths = Splitter::new(64 * 1024)
        .split(&input, &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
    let started_tx = std::sync::Mutex::new(Some(started_tx));
    let (resume_tx, resume_rx) = std::sync::mpsc::channel::<()>();
    let resume_rx = std::sync::Mutex::new(resume_rx);

    // The first report pauses its worker until the canceller has run
    let sink = move |_: &SegmentDescriptor, _: f64| {
        if let Some(tx) = started_tx.lock().unwrap().take() {
            let _ = tx.send(());
            let _ = resume_rx.lock().unwrap().recv();
        }
    };

    let canceller = {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            let _ = started_rx.recv();
            cancel.cancel();
            let _ = resume_tx.send(());
        })
    };

    let err = Joiner::new()
        .buffer_size(256)
        .progress(Arc::new(sink))
        .join(&paths[0], &cancel)
        .await
        .unwrap_err();
    canceller.join().unwrap();

    assert!(err.is_cancelled());
    assert!(!dir.path().join("vid.mp4.0").exists());
    assert!(paths.iter().all(|p| p.exists()));
}

// ============================================================================
// Failure Cleanup
// ============================================================================

#[tokio::test]
async fn test_split_failure_removes_written_segments() {
    let dir = TempDir::new().unwrap();
    let (input, _) = random_file(dir.path(), "a.bin", 3_000, 6);

    // A directory where segment 2 should go makes its create fail
    std::fs::create_dir(dir.path().join("a.bin.2")).unwrap();

    let err = Splitter::new(1_000)
        .split(&input, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SunderError::Io { path, segment, .. } => {
            assert_eq!(path, dir.path().join("a.bin.2"));
            assert_eq!(segment, Some(1));
        }
        other => panic!("expected I/O error, got {other:?}"),
    }
    assert!(!dir.path().join("a.bin.1").exists());
    assert!(!dir.path().join("a.bin.3").exists());
    assert!(input.exists());
}

#[tokio::test]
async fn test_join_failure_reports_output() {
    let dir = TempDir::new().unwrap();
    let (input, _) = random_file(dir.path(), "b.bin", 3_000, 8);
    let paths = Splitter::new(1_000)
        .split(&input, &CancellationToken::new())
        .await
        .unwrap();

    std::fs::create_dir(dir.path().join("b.bin.0")).unwrap();

    let err = Joiner::new()
        .join(&paths[0], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SunderError::Io { .. }));
    assert!(paths.iter().all(|p| p.exists()));
}

#[tokio::test]
async fn test_join_worker_failure_removes_output() {
    let dir = TempDir::new().unwrap();
    let (input, _) = random_file(dir.path(), "c.bin", 30_000, 10);
    let paths = Splitter::new(10_000)
        .split(&input, &CancellationToken::new())
        .await
        .unwrap();

    // Segment 2 shrinks after discovery, so its first read comes up short
    let victim = paths[1].clone();
    let sink = move |segment: &SegmentDescriptor, fraction: f64| {
        if segment.index == 1 && fraction == 0.0 {
            std::fs::OpenOptions::new()
                .write(true)
                .open(&victim)
                .and_then(|f| f.set_len(0))
                .unwrap();
        }
    };

    let err = Joiner::new()
        .buffer_size(1_000)
        .progress(Arc::new(sink))
        .join(&paths[0], &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SunderError::Io {
            path,
            segment,
            source,
        } => {
            assert_eq!(path, paths[1]);
            assert_eq!(segment, Some(1));
            assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof);
        }
        other => panic!("expected I/O error, got {other:?}"),
    }
    assert!(!dir.path().join("c.bin.0").exists());
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test]
async fn test_progress_fractions_per_segment() {
    let dir = TempDir::new().unwrap();
    let (input, _) = random_file(dir.path(), "p.bin", 10_000, 12);
    let sink = Arc::new(RecordingSink::default());

    Splitter::new(4_000)
        .buffer_size(1_000)
        .progress(sink.clone())
        .split(&input, &CancellationToken::new())
        .await
        .unwrap();

    let reports = sink.reports();
    for index in 0..3u64 {
        let fractions: Vec<f64> = reports
            .iter()
            .filter(|(i, _)| *i == index)
            .map(|(_, f)| *f)
            .collect();

        let expected_blocks = if index == 2 { 2 } else { 4 };
        assert_eq!(fractions.len(), expected_blocks, "segment {index}");
        assert_eq!(fractions[0], 0.0);
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert!(fractions.iter().all(|f| (0.0..1.0).contains(f)));
    }
}
