//! Deterministic work partitioning over a shared index of object names.
//!
//! Every worker computes its own [`WorkRange`] from nothing but its task
//! index, the task count, and the index size, so independently started
//! workers cover the whole index without coordinating. The range formula is
//! the exclusive variant: the final worker is not special-cased and its upper
//! bound may run past the end of the index. Reading tolerates that by
//! returning whatever entries remain.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Cursor, ErrorKind, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::RowmarkError;
use crate::storage::ObjectStore;

/// The half-open interval `[first, last)` of index positions owned by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WorkRange {
    pub first: usize,
    pub last: usize,
}

impl WorkRange {
    /// Computes the range for `task_index` out of `task_count` workers.
    ///
    /// `job_size = ceil(total_size / task_count)`, `first = task_index * job_size`,
    /// `last = first + job_size`.
    ///
    /// # Errors
    /// Returns [`RowmarkError::InvalidPartition`] if `task_count` is zero or
    /// `task_index` is not below `task_count`.
    pub fn for_task(
        task_index: usize,
        task_count: usize,
        total_size: usize,
    ) -> Result<Self, RowmarkError> {
        if task_count == 0 {
            return Err(RowmarkError::InvalidPartition {
                message: "task count must be at least 1".to_string(),
            });
        }
        if task_index >= task_count {
            return Err(RowmarkError::InvalidPartition {
                message: format!(
                    "task index {} is out of range for {} task(s)",
                    task_index, task_count
                ),
            });
        }

        let job_size = total_size.div_ceil(task_count);
        let first = task_index * job_size;
        Ok(Self {
            first,
            last: first + job_size,
        })
    }

    /// Number of positions in the range (the job size).
    #[inline]
    pub fn len(&self) -> usize {
        self.last - self.first
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(&self, position: usize) -> bool {
        self.first <= position && position < self.last
    }
}

/// Reads the entries of `range` from a line-oriented index.
///
/// Skips `range.first` lines and takes at most `range.len()` more, reading
/// sequentially. A source with fewer lines yields a shorter list.
pub fn read_range<R: BufRead>(reader: R, range: WorkRange) -> Result<Vec<String>, RowmarkError> {
    let mut entries = Vec::with_capacity(range.len().min(4096));
    for line in reader.lines().skip(range.first).take(range.len()) {
        let mut line = line?;
        if line.ends_with('\r') {
            line.pop();
        }
        entries.push(line);
    }
    Ok(entries)
}

/// Reads the entries of `range` from an index file on disk.
///
/// # Errors
/// Returns [`RowmarkError::IndexNotFound`] if the file does not exist.
pub fn read_index_range(path: &Path, range: WorkRange) -> Result<Vec<String>, RowmarkError> {
    let file = open_index(path)?;
    read_range(BufReader::new(file), range)
}

/// Reads the entries of `range` from an index stored as an object.
///
/// The object is downloaded whole and then read sequentially.
pub fn read_index_range_from_store(
    store: &dyn ObjectStore,
    key: &str,
    range: WorkRange,
) -> Result<Vec<String>, RowmarkError> {
    read_range(Cursor::new(fetch_index(store, key)?), range)
}

/// Counts the entries in an index file.
pub fn count_entries(path: &Path) -> Result<usize, RowmarkError> {
    count_lines(BufReader::new(open_index(path)?))
}

/// Counts the entries in an index stored as an object.
pub fn count_entries_in_store(store: &dyn ObjectStore, key: &str) -> Result<usize, RowmarkError> {
    count_lines(Cursor::new(fetch_index(store, key)?))
}

fn count_lines<R: BufRead>(reader: R) -> Result<usize, RowmarkError> {
    let mut count = 0;
    for line in reader.lines() {
        line?;
        count += 1;
    }
    Ok(count)
}

/// Lists every object under `prefix` in a store, in sorted key order.
pub fn generate_index(store: &dyn ObjectStore, prefix: &str) -> Result<Vec<String>, RowmarkError> {
    store.list(prefix)
}

/// Writes index entries one per line.
pub fn write_index(path: &Path, entries: &[String]) -> Result<(), RowmarkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for entry in entries {
        writeln!(writer, "{}", entry)?;
    }
    writer.flush()?;
    Ok(())
}

fn fetch_index(store: &dyn ObjectStore, key: &str) -> Result<Vec<u8>, RowmarkError> {
    match store.get(key) {
        Err(RowmarkError::ObjectNotFound { .. }) => Err(RowmarkError::IndexNotFound {
            location: key.to_string(),
        }),
        other => other,
    }
}

fn open_index(path: &Path) -> Result<File, RowmarkError> {
    File::open(path).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            RowmarkError::IndexNotFound {
                location: path.display().to_string(),
            }
        } else {
            RowmarkError::Io(err)
        }
    })
}
