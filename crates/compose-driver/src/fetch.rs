//! The fetch seam between the driver and a data source.
//!
//! The engine never performs I/O. A [`Fetcher`] receives the outstanding
//! requirement list from one resolve round and returns one entry per key:
//! either the value or the failure the source reported. Transports typically
//! batch by source and context, see [`group_by_source`].

use compose_kernel::{ContextId, FetchFailure, Fetched, RequirementKey};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub type FetchBatch = Vec<(RequirementKey, Fetched)>;

pub trait Fetcher {
    fn fetch(&mut self, requirements: &[RequirementKey]) -> FetchBatch;
}

impl<F> Fetcher for F
where
    F: FnMut(&[RequirementKey]) -> FetchBatch,
{
    fn fetch(&mut self, requirements: &[RequirementKey]) -> FetchBatch {
        self(requirements)
    }
}

/// Requirements that one source can serve for one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceGroup {
    pub source: String,
    pub context: ContextId,
    pub locators: Vec<String>,
}

/// Group requirements by `(source, context)`.
///
/// Groups are ordered by source then context; locators keep their input
/// order and are not deduplicated.
pub fn group_by_source(requirements: &[RequirementKey]) -> Vec<SourceGroup> {
    let mut groups: BTreeMap<(&str, &ContextId), Vec<String>> = BTreeMap::new();
    for key in requirements {
        groups
            .entry((key.source.as_str(), &key.context))
            .or_default()
            .push(key.locator.clone());
    }
    groups
        .into_iter()
        .map(|((source, context), locators)| SourceGroup {
            source: source.to_string(),
            context: context.clone(),
            locators,
        })
        .collect()
}

/// Fixed-table fetcher. Keys absent from the table come back as failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    table: HashMap<RequirementKey, Value>,
    requests: Vec<Vec<RequirementKey>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RequirementKey, value: Value) -> Option<Value> {
        self.table.insert(key, value)
    }

    pub fn with(mut self, key: RequirementKey, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Every requirement list received, in call order.
    pub fn requests(&self) -> &[Vec<RequirementKey>] {
        &self.requests
    }

    /// Total keys requested across all calls.
    pub fn requested_keys(&self) -> usize {
        self.requests.iter().map(Vec::len).sum()
    }
}

impl FromIterator<(RequirementKey, Value)> for MemoryFetcher {
    fn from_iter<I: IntoIterator<Item = (RequirementKey, Value)>>(iter: I) -> Self {
        Self {
            table: iter.into_iter().collect(),
            requests: Vec::new(),
        }
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&mut self, requirements: &[RequirementKey]) -> FetchBatch {
        self.requests.push(requirements.to_vec());
        let mut batch = Vec::with_capacity(requirements.len());
        for group in group_by_source(requirements) {
            for locator in group.locators {
                let key =
                    RequirementKey::new(locator, group.context.clone(), group.source.as_str());
                let fetched = match self.table.get(&key) {
                    Some(value) => Ok(value.clone()),
                    None => Err(FetchFailure::new(format!("no data for {key}"))),
                };
                batch.push((key, fetched));
            }
        }
        tracing::trace!(requested = requirements.len(), "memory fetch");
        batch
    }
}
