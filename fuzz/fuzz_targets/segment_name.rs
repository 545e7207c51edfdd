//! Fuzz target for segment file name parsing
//!
//! Arbitrary file names must never panic the parser, and any name it
//! accepts must round-trip through the formatter.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::ffi::OsStr;
use std::path::Path;
use sunder_files::planner::{parse_segment_name, segment_file_name, segment_number};

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };
    let path = Path::new(name);

    let Some((stem, suffix)) = parse_segment_name(path) else {
        return;
    };

    // Zero padding to the suffix width reproduces the original name
    if let Some(number) = segment_number(suffix) {
        let rebuilt = segment_file_name(stem, number - 1, suffix.len());
        assert_eq!(Some(OsStr::new(&rebuilt)), path.file_name());
    }
});
