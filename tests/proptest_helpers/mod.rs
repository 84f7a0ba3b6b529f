#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// `(total, task_count)` pairs covering empty, small, and uneven indexes.
pub fn arb_partition_shape() -> impl Strategy<Value = (usize, usize)> {
    (0usize..2_000, 1usize..64)
}

/// Crop dimensions for mosaic layout properties.
pub fn arb_crop_dims(max_count: usize) -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0u32..300, 0u32..300), 1..=max_count)
}
