//! Summaries of completed runs and the remaining-work diff.
//!
//! Every worker leaves a ledger in the output bucket. Reading them all back
//! gives a run-wide view, and comparing the settled objects against the
//! index yields the list of objects that still need to be processed.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::error::RowmarkError;
use crate::job::{ledger_prefix, JobLedger, ObjectRecord, ObjectStatus};
use crate::storage::ObjectStore;

/// Run-wide totals across all task ledgers.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub job_name: String,
    /// Number of ledgers found.
    pub ledgers: usize,
    pub objects: usize,
    pub pages: usize,
    pub circles: usize,
    /// Object count per status name.
    pub by_status: BTreeMap<String, usize>,
    /// Objects that failed, with their messages.
    pub failures: Vec<FailedObject>,
    #[serde(skip)]
    records: Vec<ObjectRecord>,
}

/// A failed object and why.
#[derive(Clone, Debug, Serialize)]
pub struct FailedObject {
    pub object: String,
    pub message: String,
}

impl RunSummary {
    /// Builds a summary from records of any number of ledgers.
    pub fn from_records(job_name: impl Into<String>, ledgers: usize, records: Vec<ObjectRecord>) -> Self {
        let mut summary = Self {
            job_name: job_name.into(),
            ledgers,
            ..Default::default()
        };
        for record in &records {
            summary.objects += 1;
            summary.pages += record.pages;
            summary.circles += record.circles;
            *summary
                .by_status
                .entry(record.status.as_str().to_string())
                .or_insert(0) += 1;
            if record.status == ObjectStatus::Failed {
                summary.failures.push(FailedObject {
                    object: record.object.clone(),
                    message: record.message.clone(),
                });
            }
        }
        summary.records = records;
        summary
    }

    /// Objects that do not need to be processed again.
    ///
    /// An object retried after a failure counts as settled once any ledger
    /// records a non-failed outcome for it.
    pub fn settled_objects(&self) -> HashSet<&str> {
        self.records
            .iter()
            .filter(|r| r.status.is_settled())
            .map(|r| r.object.as_str())
            .collect()
    }
}

/// Reads every ledger of `job_name` from `store` and summarizes them.
pub fn summarize_run(store: &dyn ObjectStore, job_name: &str) -> Result<RunSummary, RowmarkError> {
    let keys: Vec<String> = store
        .list(&ledger_prefix(job_name))?
        .into_iter()
        .filter(|k| k.ends_with(".csv"))
        .collect();
    let mut records = Vec::new();
    for key in &keys {
        let bytes = store.get(key)?;
        records.extend(JobLedger::records_from_csv(&bytes, key)?);
    }
    Ok(RunSummary::from_records(job_name, keys.len(), records))
}

/// Index entries not yet settled, in index order.
pub fn remaining_objects(index: &[String], summary: &RunSummary) -> Vec<String> {
    let settled = summary.settled_objects();
    index
        .iter()
        .filter(|entry| !entry.trim().is_empty() && !settled.contains(entry.as_str()))
        .cloned()
        .collect()
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} ({} ledger(s))", self.job_name, self.ledgers)?;
        writeln!(
            f,
            "  {} objects, {} pages, {} circles",
            self.objects, self.pages, self.circles
        )?;
        for (status, count) in &self.by_status {
            writeln!(f, "  {}: {}", status, count)?;
        }
        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures ({}):", self.failures.len())?;
            for failure in &self.failures {
                writeln!(f, "  - {}: {}", failure.object, failure.message)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ObjectKind;
    use crate::storage::LocalStore;

    fn record(object: &str, status: ObjectStatus, circles: usize) -> ObjectRecord {
        let mut r = ObjectRecord::new(object, ObjectKind::from_name(object), status);
        r.circles = circles;
        r.pages = 1;
        r
    }

    #[test]
    fn summarizes_ledgers_from_store() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = LocalStore::new(temp.path());

        let mut first = JobLedger::new("run", 0);
        first.push(record("a.pdf", ObjectStatus::Mosaic, 4));
        first.push(record("b.png", ObjectStatus::Failed, 0).with_message("decode"));
        let mut second = JobLedger::new("run", 1);
        second.push(record("c.png", ObjectStatus::NoCircles, 0));

        for ledger in [&first, &second] {
            store
                .put(&ledger.storage_key(), &ledger.to_csv().expect("csv"))
                .expect("put ledger");
        }
        store.put("run/mosaics/a.pdf.png", b"png").expect("put mosaic");

        let summary = summarize_run(&store, "run").expect("summarize");
        assert_eq!(summary.ledgers, 2);
        assert_eq!(summary.objects, 3);
        assert_eq!(summary.circles, 4);
        assert_eq!(summary.by_status.get("failed"), Some(&1));
        assert_eq!(summary.failures[0].object, "b.png");

        let text = summary.to_string();
        assert!(text.contains("3 objects, 3 pages, 4 circles"));
        assert!(text.contains("Failures (1):"));
    }

    #[test]
    fn remaining_keeps_index_order_and_failed_objects() {
        let summary = RunSummary::from_records(
            "run",
            1,
            vec![
                record("b.pdf", ObjectStatus::Mosaic, 2),
                record("d.pdf", ObjectStatus::Failed, 0),
                record("e.txt", ObjectStatus::Skipped, 0),
            ],
        );
        let index: Vec<String> = ["a.pdf", "b.pdf", "", "d.pdf", "e.txt", " ", "f.png", "b.pdf "]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            remaining_objects(&index, &summary),
            vec!["a.pdf", "d.pdf", "f.png", "b.pdf "]
        );
    }

    #[test]
    fn retried_failure_is_settled() {
        let summary = RunSummary::from_records(
            "run",
            2,
            vec![
                record("d.pdf", ObjectStatus::Failed, 0),
                record("d.pdf", ObjectStatus::Mosaic, 3),
            ],
        );
        assert!(remaining_objects(&["d.pdf".to_string()], &summary).is_empty());
    }

    #[test]
    fn empty_output_bucket_summarizes_to_zero() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = LocalStore::new(temp.path());
        let summary = summarize_run(&store, "run").expect("summarize");
        assert_eq!(summary.objects, 0);
        assert_eq!(summary.ledgers, 0);
    }
}
