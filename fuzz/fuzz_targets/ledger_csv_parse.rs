//! Fuzz target for ledger CSV parsing.
//!
//! Feeds arbitrary bytes to the ledger reader, checking for panics.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rowmark::job::JobLedger;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = JobLedger::records_from_csv(data, "fuzz");
});
