//! # Compose Kernel
//!
//! Staged dependency resolution and composition of named schema fields from
//! raw signals.
//!
//! Many output fields share raw inputs, and some can only be planned once
//! other fields' data has been fetched. The kernel decides *when* a field
//! can legally be computed and *which inputs* are still missing; it never
//! fetches anything itself.
//!
//! ## Architecture
//!
//! ```text
//! RequirementKey        ← (locator, context, source): one raw signal
//!     │
//! RawPool               ← caller-owned fetched values / captured failures
//!     │
//! FieldSpec             ← Direct | Derived | Computed + depends_on edges
//!     │
//! SpecRegistry          ← one entity's name → spec table (SpecLookup)
//!     │
//! resolve               ← batch walk: status per name + missing keys
//!     │
//! compose               ← run producers once resolution is complete
//! ```
//!
//! The engine is synchronous and keeps no state between calls. Registries
//! are read-only after construction and can be shared; pools cannot.

pub mod compose;
pub mod error;
pub mod key;
pub mod pool;
pub mod registry;
pub mod resolve;
pub mod spec;

pub use compose::{ComposeScope, compose, compose_one, compose_one_with, compose_with};
pub use error::EngineError;
pub use key::{ContextId, RequirementKey, SignalRef};
pub use pool::{FetchFailure, Fetched, PoolError, RawPool};
pub use registry::{SpecLookup, SpecRegistry, SpecRegistryBuilder};
pub use resolve::{
    DEFAULT_MAX_DEPTH, EngineOptions, Resolution, UnavailableField, resolve, resolve_with,
};
pub use spec::{DeriveError, DeriveFn, FieldKind, FieldSpec, ProduceError, ProduceFn, Stage};
