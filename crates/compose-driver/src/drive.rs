//! The resolve → fetch → merge loop.
//!
//! Each round resolves the requested names against the pool, hands the
//! outstanding requirements to the fetcher, and merges what comes back. The
//! loop ends when every name is resolved (then the names are composed), when
//! a derivation reports it can never succeed, when a derivation keeps waiting
//! although nothing is left to fetch, or when the iteration budget runs out.

use crate::config::EngineConfig;
use crate::error::DriveError;
use crate::fetch::Fetcher;
use compose_catalog::{Catalog, entity_of};
use compose_kernel::{ContextId, RawPool, SpecLookup, compose_with, resolve_with};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveReport {
    pub values: BTreeMap<String, Value>,
    /// Rounds that needed a fetch.
    pub iterations: usize,
    /// Entries returned by the fetcher across all rounds.
    pub fetched: usize,
    /// Captured fetch failures left in the pool.
    pub failures: usize,
}

/// Drive `names` to completion against a caller-owned pool.
///
/// The pool may already hold data from earlier calls; only what is still
/// missing is fetched.
pub fn drive<L, S, F>(
    lookup: &L,
    names: &[S],
    context: &ContextId,
    pool: &mut RawPool,
    fetcher: &mut F,
    config: &EngineConfig,
) -> Result<DriveReport, DriveError>
where
    L: SpecLookup,
    S: AsRef<str>,
    F: Fetcher + ?Sized,
{
    let options = config.engine_options();
    let mut iterations = 0;
    let mut fetched = 0;

    loop {
        let resolution = resolve_with(lookup, names, context, pool, options)?;
        if !resolution.unavailable.is_empty() {
            return Err(DriveError::Unavailable {
                fields: resolution.unavailable,
            });
        }
        if resolution.is_complete() {
            if !resolution.deferred.is_empty() {
                return Err(DriveError::Stalled {
                    fields: resolution.deferred,
                });
            }
            break;
        }
        if iterations >= config.iteration_budget {
            return Err(DriveError::BudgetExhausted {
                iterations,
                pending: resolution
                    .pending_fields()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            });
        }

        iterations += 1;
        let batch = fetcher.fetch(&resolution.requirements);
        tracing::debug!(
            context = %context,
            iteration = iterations,
            requested = resolution.requirements.len(),
            received = batch.len(),
            "fetched requirements"
        );
        fetched += batch.len();
        pool.merge(batch);
    }

    let values = compose_with(lookup, names, context, pool, options)?;
    Ok(DriveReport {
        values,
        iterations,
        fetched,
        failures: pool.failure_count(),
    })
}

/// Build a catalog holding only the entities `names` belong to, then drive
/// `names` from an empty pool.
pub fn compose_fields<S, F>(
    names: &[S],
    context: &ContextId,
    fetcher: &mut F,
    config: &EngineConfig,
) -> Result<DriveReport, DriveError>
where
    S: AsRef<str>,
    F: Fetcher + ?Sized,
{
    let mut entities: Vec<&str> = names.iter().map(|name| entity_of(name.as_ref())).collect();
    entities.sort_unstable();
    entities.dedup();

    let catalog = Catalog::with_entities(&entities, &config.entities)?;
    let mut pool = RawPool::new();
    drive(&catalog, names, context, &mut pool, fetcher, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchBatch, MemoryFetcher};
    use compose_kernel::{
        DeriveError, EngineError, FieldSpec, RequirementKey, SignalRef, SpecRegistry,
    };
    use serde_json::json;

    fn ctx() -> ContextId {
        ContextId::from(7u64)
    }

    /// `flat.out` ← `flat._list` (derived from `flat._count`) ← `flat._count`.
    fn chain() -> SpecRegistry {
        let count = SignalRef::new("COUNT", "S");
        let read_count = count.clone();
        SpecRegistry::from_specs(
            "flat",
            [
                FieldSpec::direct("flat._count", [count]),
                FieldSpec::derived("flat._list", &["flat._count"], move |ctx, pool| {
                    let n = pool.value(&read_count.at(ctx))?.as_u64().unwrap_or(0);
                    Ok((0..n)
                        .map(|i| RequirementKey::new(format!("ITEM{i}"), ctx.clone(), "S"))
                        .collect())
                }),
                FieldSpec::computed("flat.out", &["flat._list"], |scope| {
                    Ok(json!(scope.pool().len()))
                }),
                FieldSpec::derived("flat._broken", &[], |_, _| {
                    Err(DeriveError::unavailable("source retired"))
                }),
                FieldSpec::computed("flat.never", &["flat._broken"], |_| Ok(json!(null))),
                FieldSpec::derived("flat._hidden", &[], |ctx, pool| {
                    let n = pool
                        .value(&RequirementKey::new("COUNT", ctx.clone(), "S"))?
                        .as_u64()
                        .unwrap_or(0);
                    Ok((0..n)
                        .map(|i| RequirementKey::new(format!("ITEM{i}"), ctx.clone(), "S"))
                        .collect())
                }),
                FieldSpec::computed("flat.hidden", &["flat._hidden"], |scope| {
                    Ok(json!(scope.pool().len()))
                }),
                FieldSpec::derived("flat._stuck", &[], |ctx, _| {
                    Err(DeriveError::NotReady {
                        missing: RequirementKey::new("COUNT", ctx.clone(), "S"),
                    })
                }),
                FieldSpec::computed("flat.stuck", &["flat._stuck"], |_| Ok(json!(null))),
            ],
        )
        .expect("registry")
    }

    fn full_fetcher() -> MemoryFetcher {
        let ctx = ctx();
        [
            (RequirementKey::new("COUNT", ctx.clone(), "S"), json!(2)),
            (RequirementKey::new("ITEM0", ctx.clone(), "S"), json!("a")),
            (RequirementKey::new("ITEM1", ctx, "S"), json!("b")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn drives_derived_chain_to_completion() {
        let mut pool = RawPool::new();
        let mut fetcher = full_fetcher();
        let report = drive(
            &chain(),
            &["flat.out"],
            &ctx(),
            &mut pool,
            &mut fetcher,
            &EngineConfig::default(),
        )
        .expect("drive");

        assert_eq!(report.iterations, 2);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.failures, 0);
        assert_eq!(report.values["flat.out"], json!(3));
        assert_eq!(fetcher.requests()[1].len(), 2);
    }

    #[test]
    fn warm_pool_skips_fetching() {
        let mut pool = RawPool::new();
        let mut fetcher = full_fetcher();
        let config = EngineConfig::default();
        drive(&chain(), &["flat.out"], &ctx(), &mut pool, &mut fetcher, &config).expect("drive");

        let report = drive(&chain(), &["flat.out"], &ctx(), &mut pool, &mut fetcher, &config)
            .expect("second drive");
        assert_eq!(report.iterations, 0);
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[test]
    fn empty_source_exhausts_budget() {
        let mut pool = RawPool::new();
        let mut silent = |_: &[RequirementKey]| -> FetchBatch { Vec::new() };
        let config = EngineConfig {
            iteration_budget: 3,
            ..EngineConfig::default()
        };
        let err = drive(&chain(), &["flat.out"], &ctx(), &mut pool, &mut silent, &config)
            .expect_err("must exhaust");
        assert!(matches!(
            err,
            DriveError::BudgetExhausted { iterations: 3, pending } if pending == vec!["flat.out"]
        ));
    }

    #[test]
    fn unavailable_derivation_stops_the_loop() {
        let mut pool = RawPool::new();
        let mut fetcher = full_fetcher();
        let err = drive(
            &chain(),
            &["flat.never"],
            &ctx(),
            &mut pool,
            &mut fetcher,
            &EngineConfig::default(),
        )
        .expect_err("must stop");
        assert!(matches!(
            err,
            DriveError::Unavailable { ref fields } if fields[0].field == "flat._broken"
        ));
        assert!(err.to_string().contains("source retired"));
        assert!(fetcher.requests().is_empty());
    }

    #[test]
    fn undeclared_derivation_input_is_fetched_before_composing() {
        let mut pool = RawPool::new();
        let mut fetcher = full_fetcher();
        let report = drive(
            &chain(),
            &["flat.hidden"],
            &ctx(),
            &mut pool,
            &mut fetcher,
            &EngineConfig::default(),
        )
        .expect("drive");

        assert_eq!(report.iterations, 2);
        assert_eq!(report.values["flat.hidden"], json!(3));
        assert_eq!(fetcher.requests()[0][0].locator, "COUNT");
    }

    #[test]
    fn derivation_waiting_on_present_input_stalls() {
        let mut pool = RawPool::new();
        let mut fetcher = full_fetcher();
        let err = drive(
            &chain(),
            &["flat.stuck"],
            &ctx(),
            &mut pool,
            &mut fetcher,
            &EngineConfig::default(),
        )
        .expect_err("must stall");
        assert!(matches!(
            err,
            DriveError::Stalled { ref fields } if fields == &vec!["flat._stuck".to_string()]
        ));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn engine_errors_pass_through() {
        let mut pool = RawPool::new();
        let mut fetcher = full_fetcher();
        let err = drive(
            &chain(),
            &["flat.nope"],
            &ctx(),
            &mut pool,
            &mut fetcher,
            &EngineConfig::default(),
        )
        .expect_err("unknown");
        assert!(matches!(
            err,
            DriveError::Engine(EngineError::UnknownField(name)) if name == "flat.nope"
        ));
    }

    #[test]
    fn compose_fields_rejects_unknown_entity() {
        let mut fetcher = MemoryFetcher::new();
        let err = compose_fields(
            &["pf_active.coil.0.name"],
            &ctx(),
            &mut fetcher,
            &EngineConfig::default(),
        )
        .expect_err("unknown entity");
        assert!(matches!(err, DriveError::Catalog(_)));
    }
}
