//! Job ledger: the per-worker record of what happened to each object.
//!
//! The ledger is the accumulator threaded through the orchestrator loop. It
//! is persisted as CSV so a completed run can be summarized and so the
//! objects still needing work can be derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RowmarkError;
use crate::raster::ObjectKind;

/// Final state of one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    /// A mosaic was written.
    Mosaic,
    /// Processed, but no usable circles were found.
    NoCircles,
    /// The mosaic would have exceeded the pixel cap and was dropped.
    Oversized,
    /// Not a PDF or supported image.
    Skipped,
    /// Download, decode, rasterization, or upload failed.
    Failed,
}

impl ObjectStatus {
    /// True if the object does not need to be processed again.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ObjectStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::Mosaic => "mosaic",
            ObjectStatus::NoCircles => "no_circles",
            ObjectStatus::Oversized => "oversized",
            ObjectStatus::Skipped => "skipped",
            ObjectStatus::Failed => "failed",
        }
    }
}

/// One ledger row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub object: String,
    pub kind: ObjectKind,
    pub pages: usize,
    pub circles: usize,
    pub output_key: Option<String>,
    pub status: ObjectStatus,
    pub message: String,
}

impl ObjectRecord {
    pub fn new(object: impl Into<String>, kind: ObjectKind, status: ObjectStatus) -> Self {
        Self {
            object: object.into(),
            kind,
            pages: 0,
            circles: 0,
            output_key: None,
            status,
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Records for one worker task.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobLedger {
    pub job_name: String,
    pub task_index: usize,
    pub records: Vec<ObjectRecord>,
}

impl JobLedger {
    pub fn new(job_name: impl Into<String>, task_index: usize) -> Self {
        Self {
            job_name: job_name.into(),
            task_index,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: ObjectRecord) {
        self.records.push(record);
    }

    pub fn count(&self, status: ObjectStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn total_circles(&self) -> usize {
        self.records.iter().map(|r| r.circles).sum()
    }

    /// Storage key of this task's ledger within the output bucket.
    pub fn storage_key(&self) -> String {
        ledger_key(&self.job_name, self.task_index)
    }

    /// Serializes the records as CSV with a header row.
    pub fn to_csv(&self) -> Result<Vec<u8>, RowmarkError> {
        let context = self.storage_key();
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &self.records {
            writer
                .serialize(record)
                .map_err(|source| RowmarkError::LedgerCsv {
                    context: context.clone(),
                    source,
                })?;
        }
        writer.into_inner().map_err(|err| RowmarkError::LedgerCsv {
            context,
            source: err.into_error().into(),
        })
    }

    /// Parses records previously written by [`JobLedger::to_csv`].
    pub fn records_from_csv(bytes: &[u8], context: &str) -> Result<Vec<ObjectRecord>, RowmarkError> {
        let mut reader = csv::Reader::from_reader(bytes);
        reader
            .deserialize()
            .collect::<Result<Vec<ObjectRecord>, _>>()
            .map_err(|source| RowmarkError::LedgerCsv {
                context: context.to_string(),
                source,
            })
    }
}

/// Prefix under which all ledgers of a job live.
pub fn ledger_prefix(job_name: &str) -> String {
    format!("{}/ledgers/", job_name)
}

/// Storage key of the ledger for `task_index`.
pub fn ledger_key(job_name: &str, task_index: usize) -> String {
    format!("{}task_{}.csv", ledger_prefix(job_name), task_index)
}

impl fmt::Display for JobLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Job {} task {}: {} object(s), {} circle(s)",
            self.job_name,
            self.task_index,
            self.records.len(),
            self.total_circles()
        )?;
        for status in [
            ObjectStatus::Mosaic,
            ObjectStatus::NoCircles,
            ObjectStatus::Oversized,
            ObjectStatus::Skipped,
            ObjectStatus::Failed,
        ] {
            let n = self.count(status);
            if n > 0 {
                writeln!(f, "  {}: {}", status.as_str(), n)?;
            }
        }
        for record in self
            .records
            .iter()
            .filter(|r| r.status == ObjectStatus::Failed)
        {
            writeln!(f, "  - {}: {}", record.object, record.message)?;
        }
        Ok(())
    }
}
