//! Field specifications.
//!
//! A [`FieldSpec`] says how one named field is produced. The stage is a
//! closed enum with payload ([`FieldKind`]), so the resolver and composer
//! switch on it explicitly:
//!
//! ```text
//! Direct   { requirements }   fixed inputs, known without any data
//! Derived  { derive }         inputs computed from already-fetched data
//! Computed { produce }        final value computed from resolved inputs
//! ```
//!
//! Specs are built once at registry construction and never mutated. The
//! callables they carry read the pool handed to them at call time.

use crate::compose::ComposeScope;
use crate::error::EngineError;
use crate::key::{ContextId, RequirementKey, SignalRef};
use crate::pool::{PoolError, RawPool};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Field category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Direct,
    Derived,
    Computed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Direct => "direct",
            Stage::Derived => "derived",
            Stage::Computed => "computed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a derivation could not produce its requirement list.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeriveError {
    /// An input has not been fetched yet; retry after the next fetch round.
    #[error("derivation input not yet available: {missing}")]
    NotReady { missing: RequirementKey },

    /// The derivation can never succeed against this pool.
    #[error("derivation unavailable: {reason}")]
    Unavailable { reason: String },
}

impl DeriveError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

impl From<PoolError> for DeriveError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Missing(missing) => DeriveError::NotReady { missing },
            failed @ PoolError::Failed { .. } => DeriveError::Unavailable {
                reason: failed.to_string(),
            },
        }
    }
}

/// Failure reported by a producer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProduceError {
    #[error("input not in pool: {0}")]
    Missing(RequirementKey),

    #[error("input {key} was fetched as a failure: {message}")]
    FetchFailed { key: RequirementKey, message: String },

    #[error("{0}")]
    Invalid(String),

    /// Raised by a nested producer invoked through [`ComposeScope::produce`].
    #[error(transparent)]
    Engine(Box<EngineError>),
}

impl ProduceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

impl From<PoolError> for ProduceError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Missing(key) => ProduceError::Missing(key),
            PoolError::Failed { key, message } => ProduceError::FetchFailed { key, message },
        }
    }
}

impl From<EngineError> for ProduceError {
    fn from(err: EngineError) -> Self {
        ProduceError::Engine(Box::new(err))
    }
}

pub type DeriveFn =
    Arc<dyn Fn(&ContextId, &RawPool) -> Result<Vec<RequirementKey>, DeriveError> + Send + Sync>;

pub type ProduceFn = Arc<dyn Fn(&ComposeScope<'_>) -> Result<Value, ProduceError> + Send + Sync>;

/// Stage payload.
#[derive(Clone)]
pub enum FieldKind {
    Direct { requirements: Vec<SignalRef> },
    Derived { derive: DeriveFn },
    /// `produce` is `None` for a field that is declared on the public
    /// surface but has no producer wired yet.
    Computed { produce: Option<ProduceFn> },
}

impl FieldKind {
    pub fn stage(&self) -> Stage {
        match self {
            FieldKind::Direct { .. } => Stage::Direct,
            FieldKind::Derived { .. } => Stage::Derived,
            FieldKind::Computed { .. } => Stage::Computed,
        }
    }
}

impl std::fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Direct { requirements } => f
                .debug_struct("Direct")
                .field("requirements", requirements)
                .finish(),
            FieldKind::Derived { .. } => f.debug_struct("Derived").finish_non_exhaustive(),
            FieldKind::Computed { produce } => f
                .debug_struct("Computed")
                .field("has_producer", &produce.is_some())
                .finish(),
        }
    }
}

/// How one named field is produced.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    depends_on: Vec<String>,
}

impl FieldSpec {
    /// A field read straight from fixed signals.
    pub fn direct(
        name: impl Into<String>,
        requirements: impl IntoIterator<Item = SignalRef>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Direct {
                requirements: requirements.into_iter().collect(),
            },
            depends_on: Vec::new(),
        }
    }

    /// A field whose requirements are computed from other fields' data.
    pub fn derived<F>(name: impl Into<String>, depends_on: &[&str], derive: F) -> Self
    where
        F: Fn(&ContextId, &RawPool) -> Result<Vec<RequirementKey>, DeriveError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            kind: FieldKind::Derived {
                derive: Arc::new(derive),
            },
            depends_on: owned_names(depends_on),
        }
    }

    /// A public field with a producer.
    pub fn computed<F>(name: impl Into<String>, depends_on: &[&str], produce: F) -> Self
    where
        F: Fn(&ComposeScope<'_>) -> Result<Value, ProduceError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: FieldKind::Computed {
                produce: Some(Arc::new(produce)),
            },
            depends_on: owned_names(depends_on),
        }
    }

    /// A public field with no producer wired yet.
    pub fn declared(name: impl Into<String>, depends_on: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Computed { produce: None },
            depends_on: owned_names(depends_on),
        }
    }

    /// Append dependency edges.
    ///
    /// Edges on a Direct spec are accepted here and rejected by
    /// [`FieldSpec::validate`] when the spec is registered.
    pub fn with_depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on.extend(owned_names(names));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Stage {
        self.kind.stage()
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Static requirements (only Direct fields have any).
    pub fn static_requirements(&self) -> &[SignalRef] {
        match &self.kind {
            FieldKind::Direct { requirements } => requirements,
            _ => &[],
        }
    }

    pub fn producer(&self) -> Option<&ProduceFn> {
        match &self.kind {
            FieldKind::Computed { produce } => produce.as_ref(),
            _ => None,
        }
    }

    /// Check the stage/field combination.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidSpec {
                field: self.name.clone(),
                reason: "field name is empty".to_string(),
            });
        }
        if self.stage() == Stage::Direct && !self.depends_on.is_empty() {
            return Err(EngineError::InvalidSpec {
                field: self.name.clone(),
                reason: "direct fields cannot depend on other fields".to_string(),
            });
        }
        if self.depends_on.iter().any(|dep| dep == &self.name) {
            return Err(EngineError::InvalidSpec {
                field: self.name.clone(),
                reason: "field depends on itself".to_string(),
            });
        }
        Ok(())
    }
}

fn owned_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}
