//! Fuzz target for the block copier
//!
//! Any length and buffer size must copy exactly the requested prefix, or
//! fail cleanly when the source is too short.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use sunder_files::{CancellationToken, CopyError, copy_segment};

#[derive(Debug, Arbitrary)]
struct CopyInput {
    data: Vec<u8>,
    length: u16,
    buffer_size: u16,
    offset: Option<u8>,
}

fuzz_target!(|input: CopyInput| {
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(rt) => rt,
        Err(_) => return,
    };

    let length = u64::from(input.length);
    let buffer_size = usize::from(input.buffer_size);
    let offset = input.offset.map(u64::from);

    let mut source = Cursor::new(input.data.clone());
    let mut destination = Cursor::new(Vec::new());

    let result = runtime.block_on(copy_segment(
        &mut source,
        &mut destination,
        offset,
        length,
        buffer_size,
        None,
        &CancellationToken::new(),
    ));

    match result {
        Ok(copied) => {
            assert_eq!(copied, length);
            let written = destination.into_inner();
            let start = offset.unwrap_or(0) as usize;
            let end = start + length as usize;
            if length > 0 {
                assert_eq!(&written[start..end], &input.data[..length as usize]);
            }
        }
        Err(CopyError::Io(_)) => {
            assert!(buffer_size == 0 || (input.data.len() as u64) < length);
        }
        Err(CopyError::Cancelled) => unreachable!("token is never cancelled"),
    }
});
