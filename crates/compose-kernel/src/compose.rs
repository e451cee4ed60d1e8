//! Composition: turning a fully-resolved pool into field values.
//!
//! Only Computed fields can be composed. A producer sees the call through a
//! [`ComposeScope`], which gives it the context, read access to the pool, and
//! [`ComposeScope::produce`] for building on another Computed field's value
//! instead of repeating that field's extraction logic.

use crate::error::EngineError;
use crate::key::{ContextId, SignalRef};
use crate::pool::{PoolError, RawPool};
use crate::registry::SpecLookup;
use crate::resolve::EngineOptions;
use crate::spec::{FieldKind, ProduceError};
use serde_json::Value;
use std::collections::BTreeMap;

/// What a producer can see while it runs.
pub struct ComposeScope<'a> {
    lookup: &'a dyn SpecLookup,
    context: &'a ContextId,
    pool: &'a RawPool,
    field: &'a str,
    requested: &'a str,
    depth: usize,
    max_depth: usize,
}

impl<'a> ComposeScope<'a> {
    pub fn context(&self) -> &'a ContextId {
        self.context
    }

    pub fn pool(&self) -> &'a RawPool {
        self.pool
    }

    /// Name of the field being produced.
    pub fn field(&self) -> &'a str {
        self.field
    }

    /// Read a static signal at this scope's context.
    pub fn signal(&self, signal: &SignalRef) -> Result<&'a Value, PoolError> {
        self.pool.value(&signal.at(self.context))
    }

    /// Produce another Computed field's value under the same context and pool.
    pub fn produce(&self, name: &str) -> Result<Value, ProduceError> {
        produce_field(
            self.lookup,
            name,
            self.requested,
            self.context,
            self.pool,
            self.depth + 1,
            self.max_depth,
        )
        .map_err(ProduceError::from)
    }
}

/// Compose every name in `names` with default options.
pub fn compose<L: SpecLookup, S: AsRef<str>>(
    lookup: &L,
    names: &[S],
    context: &ContextId,
    pool: &RawPool,
) -> Result<BTreeMap<String, Value>, EngineError> {
    compose_with(lookup, names, context, pool, EngineOptions::default())
}

/// Compose every name in `names`.
///
/// The caller is expected to have driven [`crate::resolve`] to a complete
/// status first. A producer that reads an absent input fails with
/// [`EngineError::CompositionPrecondition`] naming the field and the key.
pub fn compose_with<L: SpecLookup, S: AsRef<str>>(
    lookup: &L,
    names: &[S],
    context: &ContextId,
    pool: &RawPool,
    options: EngineOptions,
) -> Result<BTreeMap<String, Value>, EngineError> {
    let mut composed = BTreeMap::new();
    for name in names {
        let name = name.as_ref();
        if composed.contains_key(name) {
            continue;
        }
        let value = produce_field(lookup, name, name, context, pool, 0, options.max_depth)?;
        composed.insert(name.to_string(), value);
    }
    tracing::debug!(context = %context, composed = composed.len(), "composed batch");
    Ok(composed)
}

/// Compose a single field with default options.
pub fn compose_one<L: SpecLookup>(
    lookup: &L,
    name: &str,
    context: &ContextId,
    pool: &RawPool,
) -> Result<Value, EngineError> {
    compose_one_with(lookup, name, context, pool, EngineOptions::default())
}

/// Compose a single field; nested producers share `options.max_depth`.
pub fn compose_one_with<L: SpecLookup>(
    lookup: &L,
    name: &str,
    context: &ContextId,
    pool: &RawPool,
    options: EngineOptions,
) -> Result<Value, EngineError> {
    produce_field(lookup, name, name, context, pool, 0, options.max_depth)
}

fn produce_field(
    lookup: &dyn SpecLookup,
    name: &str,
    requested: &str,
    context: &ContextId,
    pool: &RawPool,
    depth: usize,
    max_depth: usize,
) -> Result<Value, EngineError> {
    if depth > max_depth {
        return Err(EngineError::DependencyDepthExceeded {
            field: name.to_string(),
            requested: requested.to_string(),
            depth,
            max_depth,
        });
    }

    let spec = lookup.lookup(name)?;
    let produce = match spec.kind() {
        FieldKind::Computed {
            produce: Some(produce),
        } => produce,
        FieldKind::Computed { produce: None } => {
            return Err(EngineError::MissingProducer {
                field: name.to_string(),
            });
        }
        other => {
            return Err(EngineError::NotComputedStage {
                field: name.to_string(),
                stage: other.stage(),
            });
        }
    };

    let scope = ComposeScope {
        lookup,
        context,
        pool,
        field: name,
        requested,
        depth,
        max_depth,
    };
    produce(&scope).map_err(|err| match err {
        ProduceError::Missing(key) => EngineError::CompositionPrecondition {
            field: name.to_string(),
            key,
        },
        failed @ ProduceError::FetchFailed { .. } => EngineError::ProducerFailed {
            field: name.to_string(),
            reason: failed.to_string(),
        },
        ProduceError::Invalid(reason) => EngineError::ProducerFailed {
            field: name.to_string(),
            reason,
        },
        ProduceError::Engine(inner) => *inner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RequirementKey;
    use crate::registry::SpecRegistry;
    use crate::spec::FieldSpec;
    use serde_json::json;

    fn limiter() -> SignalRef {
        SignalRef::new(r"\TOP.RESULTS.GEQDSK.LIM", "EFIT01")
    }

    fn column(scope: &ComposeScope<'_>, index: usize) -> Result<Value, ProduceError> {
        let rows = scope
            .signal(&limiter())?
            .as_array()
            .ok_or_else(|| ProduceError::invalid("limiter is not an array"))?;
        Ok(rows.iter().map(|row| row[index].clone()).collect())
    }

    fn wall() -> SpecRegistry {
        SpecRegistry::from_specs(
            "wall",
            [
                FieldSpec::direct("wall._limiter", [limiter()]),
                FieldSpec::computed("wall.outline.r", &["wall._limiter"], |scope| {
                    column(scope, 0)
                }),
                FieldSpec::computed("wall.outline.z", &["wall._limiter"], |scope| {
                    column(scope, 1)
                }),
                FieldSpec::computed("wall.outline.count", &["wall.outline.r"], |scope| {
                    let r = scope.produce("wall.outline.r")?;
                    Ok(json!(r.as_array().map_or(0, Vec::len)))
                }),
                FieldSpec::declared("wall.outline.area", &["wall._limiter"]),
                FieldSpec::computed("wall.loop", &[], |scope| scope.produce("wall.loop")),
            ],
        )
        .expect("registry should build")
    }

    fn full_pool(ctx: &ContextId) -> RawPool {
        let mut pool = RawPool::new();
        pool.insert_value(limiter().at(ctx), json!([[1.0, -1.0], [2.0, 0.5]]));
        pool
    }

    #[test]
    fn composes_computed_fields() {
        let ctx = ContextId::from(1u64);
        let names = ["wall.outline.r", "wall.outline.z"];
        let values = compose(&wall(), &names, &ctx, &full_pool(&ctx)).expect("compose");
        assert_eq!(values["wall.outline.r"], json!([1.0, 2.0]));
        assert_eq!(values["wall.outline.z"], json!([-1.0, 0.5]));
    }

    #[test]
    fn producer_can_reuse_another_producer() {
        let ctx = ContextId::from(1u64);
        let value = compose_one(&wall(), "wall.outline.count", &ctx, &full_pool(&ctx))
            .expect("compose");
        assert_eq!(value, json!(2));
    }

    #[test]
    fn single_field_composition_honours_max_depth() {
        let ctx = ContextId::from(1u64);
        let pool = full_pool(&ctx);
        let flat = EngineOptions { max_depth: 0 };

        let err = compose_one_with(&wall(), "wall.outline.count", &ctx, &pool, flat)
            .expect_err("nested producer exceeds depth zero");
        assert!(matches!(
            &err,
            EngineError::DependencyDepthExceeded { field, max_depth: 0, .. }
                if field == "wall.outline.r"
        ));

        let batch = compose_with(&wall(), &["wall.outline.count"], &ctx, &pool, flat)
            .expect_err("batch uses the same bound");
        assert_eq!(batch, err);

        let value = compose_one_with(&wall(), "wall.outline.r", &ctx, &pool, flat)
            .expect("top-level producer fits depth zero");
        assert_eq!(value, json!([1.0, 2.0]));
    }

    #[test]
    fn direct_field_is_not_composable() {
        let ctx = ContextId::from(1u64);
        let err = compose_one(&wall(), "wall._limiter", &ctx, &full_pool(&ctx))
            .expect_err("direct must fail");
        assert!(matches!(
            err,
            EngineError::NotComputedStage { stage: crate::spec::Stage::Direct, .. }
        ));
    }

    #[test]
    fn declared_field_has_no_producer() {
        let ctx = ContextId::from(1u64);
        let err = compose_one(&wall(), "wall.outline.area", &ctx, &full_pool(&ctx))
            .expect_err("declared must fail");
        assert_eq!(
            err,
            EngineError::MissingProducer {
                field: "wall.outline.area".to_string()
            }
        );
    }

    #[test]
    fn missing_input_is_a_precondition_failure() {
        let ctx = ContextId::from(1u64);
        let err = compose_one(&wall(), "wall.outline.count", &ctx, &RawPool::new())
            .expect_err("empty pool must fail");
        assert_eq!(
            err,
            EngineError::CompositionPrecondition {
                field: "wall.outline.r".to_string(),
                key: RequirementKey::new(r"\TOP.RESULTS.GEQDSK.LIM", 1u64, "EFIT01"),
            }
        );
    }

    #[test]
    fn failed_fetch_surfaces_as_producer_failure() {
        let ctx = ContextId::from(1u64);
        let mut pool = RawPool::new();
        pool.insert_failure(limiter().at(&ctx), "tree not found");
        let err = compose_one(&wall(), "wall.outline.r", &ctx, &pool).expect_err("must fail");
        assert!(matches!(
            err,
            EngineError::ProducerFailed { field, reason }
                if field == "wall.outline.r" && reason.contains("tree not found")
        ));
    }

    #[test]
    fn self_reentrant_producer_hits_depth_bound() {
        let ctx = ContextId::from(1u64);
        let err = compose_one(&wall(), "wall.loop", &ctx, &RawPool::new()).expect_err("must fail");
        assert!(matches!(err, EngineError::DependencyDepthExceeded { .. }));
    }
}
