//! The caller-owned raw-input pool.
//!
//! A [`RawPool`] accumulates fetched signals between resolve calls. Each entry
//! is either a value or a captured fetch failure; a failure still counts as
//! "present" for resolution (the fetch was attempted), but reading it through
//! [`RawPool::value`] reports [`PoolError::Failed`].
//!
//! The engine only ever borrows the pool immutably.

use crate::key::RequirementKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A fetch that was attempted and failed at the transport or source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub message: String,
}

impl FetchFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of fetching one requirement.
pub type Fetched = Result<Value, FetchFailure>;

/// Errors raised when a callable reads the pool.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("requirement not in pool: {0}")]
    Missing(RequirementKey),

    #[error("requirement {key} was fetched as a failure: {message}")]
    Failed { key: RequirementKey, message: String },
}

impl PoolError {
    pub fn key(&self) -> &RequirementKey {
        match self {
            PoolError::Missing(key) => key,
            PoolError::Failed { key, .. } => key,
        }
    }
}

/// Mapping from requirement key to fetched value or failure.
#[derive(Debug, Clone, Default)]
pub struct RawPool {
    entries: HashMap<RequirementKey, Fetched>,
}

impl RawPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a fetch for `key` has been recorded (value or failure).
    pub fn contains(&self, key: &RequirementKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &RequirementKey) -> Option<&Fetched> {
        self.entries.get(key)
    }

    /// Read a successfully fetched value.
    pub fn value(&self, key: &RequirementKey) -> Result<&Value, PoolError> {
        match self.entries.get(key) {
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(PoolError::Failed {
                key: key.clone(),
                message: failure.message.clone(),
            }),
            None => Err(PoolError::Missing(key.clone())),
        }
    }

    /// Insert or replace an entry. Returns the previous entry if present.
    pub fn insert(&mut self, key: RequirementKey, fetched: Fetched) -> Option<Fetched> {
        self.entries.insert(key, fetched)
    }

    pub fn insert_value(&mut self, key: RequirementKey, value: Value) -> Option<Fetched> {
        self.insert(key, Ok(value))
    }

    pub fn insert_failure(
        &mut self,
        key: RequirementKey,
        message: impl Into<String>,
    ) -> Option<Fetched> {
        self.insert(key, Err(FetchFailure::new(message)))
    }

    /// Merge a batch of fetch results, last write wins.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = (RequirementKey, Fetched)>) {
        self.entries.extend(batch);
    }

    pub fn keys(&self) -> impl Iterator<Item = &RequirementKey> {
        self.entries.keys()
    }

    /// Number of entries recorded as fetch failures.
    pub fn failure_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_err()).count()
    }
}

impl FromIterator<(RequirementKey, Fetched)> for RawPool {
    fn from_iter<T: IntoIterator<Item = (RequirementKey, Fetched)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
