//! Fuzz target for segment planning
//!
//! Checks that any (length, segment size) pair either fails validation or
//! yields contiguous segments that cover the input exactly.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sunder_files::plan;

#[derive(Debug, Arbitrary)]
struct PlanInput {
    total_length: u64,
    segment_size: u64,
}

fuzz_target!(|input: PlanInput| {
    // Keep the descriptor list small enough to allocate
    if input.segment_size != 0 && input.total_length / input.segment_size > 1 << 16 {
        return;
    }

    let Ok(layout) = plan(input.total_length, input.segment_size) else {
        assert_eq!(input.segment_size, 0);
        return;
    };

    let mut offset = 0u64;
    for segment in layout.segments() {
        assert_eq!(segment.offset, offset);
        assert!(segment.length > 0 && segment.length <= input.segment_size);
        offset = segment.end();
    }
    assert_eq!(offset, input.total_length);
    assert_eq!(layout.is_degenerate(), input.total_length <= input.segment_size);
});
