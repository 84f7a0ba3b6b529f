//! Fuzz target for the Hough accumulator peak search.
//!
//! The first byte picks the grid width and the second the vote threshold;
//! the remaining bytes are per-cell votes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rowmark::detect::hough::fuzz_peak_search;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 || data.len() > 1024 * 1024 {
        return;
    }

    let width = usize::from(data[0]) + 1;
    let threshold = u32::from(data[1]);
    let votes = &data[2..];
    let peaks = fuzz_peak_search(votes, width, threshold);

    for pair in peaks.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
    assert!(peaks.iter().all(|&(idx, value)| idx < votes.len() && value > threshold));
});
