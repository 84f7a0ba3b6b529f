//! Object storage collaborator.
//!
//! The pipeline only ever needs four operations from a bucket: fetch an
//! object, write an object, list keys under a prefix, and check existence.
//! [`LocalStore`] maps a bucket identifier onto a directory so a run can be
//! reproduced on a workstation; [`Retrying`] wraps any store with a bounded
//! retry loop for transient upstream failures.
//!
//! Keys always use `/` as the separator regardless of platform.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use walkdir::WalkDir;

use crate::error::RowmarkError;

/// Minimal object storage interface used by the job orchestrator.
pub trait ObjectStore {
    /// Reads the full contents of an object.
    fn get(&self, key: &str) -> Result<Vec<u8>, RowmarkError>;

    /// Writes (or replaces) an object.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), RowmarkError>;

    /// Lists every key under `prefix`, sorted lexicographically.
    fn list(&self, prefix: &str) -> Result<Vec<String>, RowmarkError>;

    /// Returns true if the object exists.
    fn exists(&self, key: &str) -> Result<bool, RowmarkError>;
}

/// A directory acting as a bucket.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

fn storage_error(key: &str, source: std::io::Error) -> RowmarkError {
    if source.kind() == ErrorKind::NotFound {
        RowmarkError::ObjectNotFound {
            key: key.to_string(),
        }
    } else {
        RowmarkError::Storage {
            key: key.to_string(),
            source,
        }
    }
}

impl ObjectStore for LocalStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, RowmarkError> {
        fs::read(self.path_for(key)).map_err(|source| storage_error(key, source))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), RowmarkError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| storage_error(key, source))?;
        }
        fs::write(&path, bytes).map_err(|source| storage_error(key, source))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, RowmarkError> {
        if !self.root.is_dir() {
            return Err(RowmarkError::ObjectNotFound {
                key: self.root.display().to_string(),
            });
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|err| {
                let key = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| prefix.to_string());
                storage_error(&key, err.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn exists(&self, key: &str) -> Result<bool, RowmarkError> {
        Ok(self.path_for(key).is_file())
    }
}

/// Retry policy for [`Retrying`].
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay before the second attempt; grows linearly afterwards.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Wraps a store and retries operations that fail with a transient error.
#[derive(Clone, Debug)]
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: ObjectStore> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn with_retry<T>(
        &self,
        op: &str,
        key: &str,
        mut f: impl FnMut(&S) -> Result<T, RowmarkError>,
    ) -> Result<T, RowmarkError> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match f(&self.inner) {
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        "{} {} failed (attempt {}/{}): {}",
                        op,
                        key,
                        attempt,
                        attempts,
                        err
                    );
                    thread::sleep(self.policy.backoff * attempt);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl<S: ObjectStore> ObjectStore for Retrying<S> {
    fn get(&self, key: &str) -> Result<Vec<u8>, RowmarkError> {
        self.with_retry("get", key, |s| s.get(key))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), RowmarkError> {
        self.with_retry("put", key, |s| s.put(key, bytes))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, RowmarkError> {
        self.with_retry("list", prefix, |s| s.list(prefix))
    }

    fn exists(&self, key: &str) -> Result<bool, RowmarkError> {
        self.with_retry("exists", key, |s| s.exists(key))
    }
}
