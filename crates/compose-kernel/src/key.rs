//! Requirement keys: the atomic units of external input.
//!
//! A [`RequirementKey`] names one raw signal as the triple
//! `(locator, context, source)`, e.g. a tree path read for one shot from one
//! named tree. Keys are plain values: structurally equal, hashable, ordered,
//! and never mutated after construction.
//!
//! Static requirements are written without a context ([`SignalRef`]) and are
//! re-keyed with the caller's context at resolve time.

use serde::{Deserialize, Serialize};

/// Opaque identifier for the instance a resolution runs against.
///
/// In practice this is a shot or run number; the engine only threads it
/// through to derive/produce callables and into requirement keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContextId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ContextId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for ContextId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// One atomic external input: `(locator, context, source)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementKey {
    /// Where the signal lives inside its source (e.g. a tree node path).
    pub locator: String,
    /// Which instance the signal is read for.
    pub context: ContextId,
    /// Named source group the locator is relative to (e.g. a tree name).
    pub source: String,
}

impl RequirementKey {
    pub fn new(
        locator: impl Into<String>,
        context: impl Into<ContextId>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            locator: locator.into(),
            context: context.into(),
            source: source.into(),
        }
    }

    /// Canonical borrowed form, usable as a lookup key or sort key.
    pub fn as_tuple(&self) -> (&str, &str, &str) {
        (&self.locator, self.context.as_str(), &self.source)
    }

    /// The same signal read for a different context.
    pub fn rekey(&self, context: &ContextId) -> Self {
        Self {
            locator: self.locator.clone(),
            context: context.clone(),
            source: self.source.clone(),
        }
    }
}

impl std::fmt::Display for RequirementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.source, self.locator, self.context)
    }
}

/// A context-free requirement template `(locator, source)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRef {
    pub locator: String,
    pub source: String,
}

impl SignalRef {
    pub fn new(locator: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            source: source.into(),
        }
    }

    /// Bind this signal to a context.
    pub fn at(&self, context: &ContextId) -> RequirementKey {
        RequirementKey {
            locator: self.locator.clone(),
            context: context.clone(),
            source: self.source.clone(),
        }
    }
}
