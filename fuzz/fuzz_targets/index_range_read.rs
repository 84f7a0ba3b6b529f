//! Fuzz target for reading a task's slice of an index.
//!
//! The first four bytes pick the task layout; the rest is the index text.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rowmark::partition::{read_range, WorkRange};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 || data.len() > 1024 * 1024 {
        return;
    }

    let task_count = usize::from(data[0]) + 1;
    let task_index = usize::from(data[1]) % task_count;
    let total = usize::from(u16::from_le_bytes([data[2], data[3]]));
    let Ok(range) = WorkRange::for_task(task_index, task_count, total) else {
        return;
    };

    if let Ok(entries) = read_range(&data[4..], range) {
        assert!(entries.len() <= range.len());
    }
});
