//! Static entity registration table.
//!
//! Entities are listed here explicitly; nothing is discovered at runtime.
//! Adding an entity means adding a constructor and one row below.

use crate::entities;
use crate::options::EntityOptions;
use compose_kernel::{EngineError, SpecRegistry};

pub type EntityConstructor = fn(&EntityOptions) -> Result<SpecRegistry, EngineError>;

/// Entity name → constructor, sorted by name.
pub const ENTITY_TABLE: &[(&str, EntityConstructor)] = &[
    ("ece", entities::ece),
    ("equilibrium", entities::equilibrium),
    ("wall", entities::wall),
];

/// Look up a registered constructor by entity name.
pub fn entity_constructor(name: &str) -> Option<EntityConstructor> {
    ENTITY_TABLE
        .iter()
        .find(|(entity, _)| *entity == name)
        .map(|(_, constructor)| *constructor)
}

/// Names of every registered entity.
pub fn entity_names() -> Vec<&'static str> {
    ENTITY_TABLE.iter().map(|(entity, _)| *entity).collect()
}
