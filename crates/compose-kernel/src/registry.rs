//! Spec registries: one name → [`FieldSpec`] table per entity.
//!
//! A registry is assembled once by [`SpecRegistryBuilder`] and is read-only
//! afterwards, so one registry can be shared by any number of callers that
//! each own their own pool.

use crate::error::EngineError;
use crate::spec::{FieldSpec, Stage};
use std::collections::BTreeMap;

/// Flat name → spec view the resolver and composer operate over.
///
/// Implemented by [`SpecRegistry`] for one entity and by multi-entity
/// catalogs that route names to the owning registry.
pub trait SpecLookup {
    fn lookup(&self, name: &str) -> Result<&FieldSpec, EngineError>;
}

/// Specs for one entity, in registration order.
#[derive(Debug, Clone, Default)]
pub struct SpecRegistry {
    entity: String,
    specs: Vec<FieldSpec>,
    index: BTreeMap<String, usize>,
}

impl SpecRegistry {
    pub fn builder(entity: impl Into<String>) -> SpecRegistryBuilder {
        SpecRegistryBuilder {
            registry: SpecRegistry {
                entity: entity.into(),
                ..SpecRegistry::default()
            },
        }
    }

    /// Build a registry from fully-constructed specs.
    pub fn from_specs(
        entity: impl Into<String>,
        specs: impl IntoIterator<Item = FieldSpec>,
    ) -> Result<Self, EngineError> {
        let mut builder = Self::builder(entity);
        for spec in specs {
            builder.add(spec)?;
        }
        Ok(builder.build())
    }

    /// Root name shared by every field of this registry.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&slot| &self.specs[slot])
    }

    pub fn stage_of(&self, name: &str) -> Result<Stage, EngineError> {
        self.lookup(name).map(FieldSpec::stage)
    }

    /// Iterate every spec in registration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.specs.iter()
    }

    /// Computed field names in registration order: the entity's public surface.
    pub fn public_fields(&self) -> Vec<String> {
        self.specs
            .iter()
            .filter(|spec| spec.stage() == Stage::Computed)
            .map(|spec| spec.name().to_string())
            .collect()
    }
}

impl SpecLookup for SpecRegistry {
    fn lookup(&self, name: &str) -> Result<&FieldSpec, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownField(name.to_string()))
    }
}

/// One-shot builder for [`SpecRegistry`].
#[derive(Debug)]
pub struct SpecRegistryBuilder {
    registry: SpecRegistry,
}

impl SpecRegistryBuilder {
    /// Register one spec.
    ///
    /// Rejects malformed specs, duplicate names, and names outside the
    /// entity's namespace (when the registry has one).
    pub fn add(&mut self, spec: FieldSpec) -> Result<&mut Self, EngineError> {
        spec.validate()?;

        let entity = &self.registry.entity;
        if !entity.is_empty() && !in_namespace(entity, spec.name()) {
            return Err(EngineError::InvalidSpec {
                field: spec.name().to_string(),
                reason: format!("field is outside entity namespace `{entity}`"),
            });
        }
        if self.registry.index.contains_key(spec.name()) {
            return Err(EngineError::DuplicateField(spec.name().to_string()));
        }

        let slot = self.registry.specs.len();
        self.registry.index.insert(spec.name().to_string(), slot);
        self.registry.specs.push(spec);
        Ok(self)
    }

    pub fn build(self) -> SpecRegistry {
        self.registry
    }
}

fn in_namespace(entity: &str, name: &str) -> bool {
    name.strip_prefix(entity)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|rest| !rest.is_empty())
}
