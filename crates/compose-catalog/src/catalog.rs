//! Multi-entity lookup.
//!
//! A [`Catalog`] holds one [`SpecRegistry`] per entity and routes each field
//! name to the registry named by its first path segment. Routing never
//! crosses entities, so batching fields from several entities cannot merge
//! their requirements.

use crate::error::CatalogError;
use crate::naming::{entity_of, is_internal, validate_field_name};
use crate::options::EntityOptions;
use crate::table::{ENTITY_TABLE, EntityConstructor, entity_constructor, entity_names};
use compose_kernel::{EngineError, FieldSpec, SpecLookup, SpecRegistry};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    registries: BTreeMap<String, SpecRegistry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate every entity in [`ENTITY_TABLE`].
    pub fn standard(options: &EntityOptions) -> Result<Self, CatalogError> {
        Self::from_table(ENTITY_TABLE, options)
    }

    /// Instantiate only the named entities from [`ENTITY_TABLE`].
    pub fn with_entities<S: AsRef<str>>(
        names: &[S],
        options: &EntityOptions,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for name in names {
            let name = name.as_ref();
            let constructor = entity_constructor(name)
                .ok_or_else(|| unknown_entity(name, entity_names().into_iter()))?;
            catalog.instantiate(name, constructor, options)?;
        }
        Ok(catalog)
    }

    pub fn from_table(
        table: &[(&str, EntityConstructor)],
        options: &EntityOptions,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for (name, constructor) in table {
            catalog.instantiate(name, *constructor, options)?;
        }
        tracing::debug!(entities = catalog.registries.len(), "catalog assembled");
        Ok(catalog)
    }

    fn instantiate(
        &mut self,
        name: &str,
        constructor: EntityConstructor,
        options: &EntityOptions,
    ) -> Result<(), CatalogError> {
        let registry = constructor(options)?;
        if registry.entity() != name {
            return Err(CatalogError::EntityMismatch {
                expected: name.to_string(),
                actual: registry.entity().to_string(),
            });
        }
        self.insert(registry)
    }

    /// Add an already-built registry. Every field name must be well formed.
    pub fn insert(&mut self, registry: SpecRegistry) -> Result<(), CatalogError> {
        for spec in registry.fields() {
            validate_field_name(spec.name())?;
        }
        let entity = registry.entity().to_string();
        if self.registries.contains_key(&entity) {
            return Err(CatalogError::DuplicateEntity(entity));
        }
        self.registries.insert(entity, registry);
        Ok(())
    }

    /// Entity names in sorted order.
    pub fn entities(&self) -> Vec<&str> {
        self.registries.keys().map(String::as_str).collect()
    }

    pub fn registry(&self, entity: &str) -> Result<&SpecRegistry, CatalogError> {
        self.registries
            .get(entity)
            .ok_or_else(|| unknown_entity(entity, self.registries.keys().map(String::as_str)))
    }

    /// Computed, non-internal fields of one entity, in registration order.
    ///
    /// A Computed `entity._name` is still composable by name; it is left off
    /// the listing only.
    pub fn public_fields(&self, entity: &str) -> Result<Vec<String>, CatalogError> {
        let registry = self.registry(entity)?;
        Ok(registry
            .public_fields()
            .into_iter()
            .filter(|name| !is_internal(name))
            .collect())
    }

    /// Registry that owns `field`, if its entity is loaded.
    pub fn owner_of(&self, field: &str) -> Option<&SpecRegistry> {
        self.registries.get(entity_of(field))
    }

    /// Total number of specs across every entity.
    pub fn len(&self) -> usize {
        self.registries.values().map(SpecRegistry::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}

impl SpecLookup for Catalog {
    fn lookup(&self, name: &str) -> Result<&FieldSpec, EngineError> {
        self.owner_of(name)
            .ok_or_else(|| EngineError::UnknownField(name.to_string()))?
            .lookup(name)
    }
}

fn unknown_entity<'a>(name: &str, registered: impl Iterator<Item = &'a str>) -> CatalogError {
    CatalogError::UnknownEntity {
        name: name.to_string(),
        registered: registered.collect::<Vec<_>>().join(", "),
    }
}
