//! Error types for kernel operations.

use crate::key::RequirementKey;
use crate::spec::Stage;

/// Errors raised by registry construction, resolution, and composition.
///
/// Every variant is fatal for the call that raised it. Transient derive
/// failures never surface here; they only keep a field's status `false`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// A requested or depended-on field is not registered.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Two specs were registered under the same name.
    #[error("duplicate field: {0}")]
    DuplicateField(String),

    /// A spec's stage/field combination is malformed.
    #[error("invalid field spec {field}: {reason}")]
    InvalidSpec { field: String, reason: String },

    /// The dependency graph is cyclic or deeper than the configured bound.
    #[error(
        "dependency depth exceeded at {field} (requested {requested}, depth {depth}, max {max_depth})"
    )]
    DependencyDepthExceeded {
        field: String,
        requested: String,
        depth: usize,
        max_depth: usize,
    },

    /// Only Computed fields can be composed.
    #[error("cannot compose {field}: stage is {stage}, not computed")]
    NotComputedStage { field: String, stage: Stage },

    #[error("cannot compose {field}: no producer defined")]
    MissingProducer { field: String },

    /// The producer read an input that is not in the pool: resolution was
    /// not driven to completion before compose.
    #[error("cannot compose {field}: missing input {key}; resolve and fetch before composing")]
    CompositionPrecondition { field: String, key: RequirementKey },

    /// The producer ran but could not build a value.
    #[error("producer for {field} failed: {reason}")]
    ProducerFailed { field: String, reason: String },
}

impl EngineError {
    /// Whether the error points at a misconfigured registry rather than at
    /// caller misuse.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownField(_)
                | EngineError::DuplicateField(_)
                | EngineError::InvalidSpec { .. }
                | EngineError::DependencyDepthExceeded { .. }
        )
    }
}
