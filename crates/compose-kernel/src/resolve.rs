//! Batch requirement resolution.
//!
//! [`resolve`] walks the dependency graph of every requested field at once
//! and reports which raw inputs are still missing. Callers loop:
//!
//! ```text
//! resolve(names, ctx, pool) -> (status, requirements)
//!     fetch(requirements) -> merge into pool
//! ...until every status is true, then compose(names, ctx, pool)
//! ```
//!
//! One visited-set is shared across the whole batch, so a dependency that is
//! reachable from several requested names is expanded (and derived) once.
//! What each expanded field contributes is recorded per field and then
//! attributed to every requested name that reaches it, so a shared
//! dependency keeps all of its dependents pending until it is fetched.

use crate::error::EngineError;
use crate::key::{ContextId, RequirementKey};
use crate::pool::RawPool;
use crate::registry::SpecLookup;
use crate::spec::{DeriveError, FieldKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Default bound on dependency chain length.
pub const DEFAULT_MAX_DEPTH: usize = 10;

const RESOLUTION_DIGEST_PREFIX: &str = "rq1_";

/// Tunables shared by resolve and compose calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub max_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A derived field whose derivation reported it can never succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableField {
    pub field: String,
    pub reason: String,
}

/// Result of one resolve call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Per requested name: true iff none of its reachable requirements are
    /// missing from the pool.
    pub status: BTreeMap<String, bool>,
    /// Missing requirements across the batch, deduplicated, first-seen order.
    pub requirements: Vec<RequirementKey>,
    /// Derived fields whose inputs have not been fetched yet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deferred: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<UnavailableField>,
}

impl Resolution {
    /// Whether every requested name is fully resolved.
    ///
    /// Unavailable derivations contribute no requirements, so this can be
    /// true while [`Resolution::unavailable`] is not empty. Use
    /// [`Resolution::is_composable`] before composing.
    pub fn is_complete(&self) -> bool {
        self.status.values().all(|resolved| *resolved)
    }

    /// Complete, with no derivation waiting and none unavailable.
    pub fn is_composable(&self) -> bool {
        self.is_complete() && self.deferred.is_empty() && self.unavailable.is_empty()
    }

    /// Requested names that still have missing requirements.
    pub fn pending_fields(&self) -> Vec<&str> {
        self.status
            .iter()
            .filter(|(_, resolved)| !**resolved)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Deterministic digest of the outstanding requirement list.
    pub fn digest(&self) -> String {
        let canonical: Vec<(&str, &str, &str)> =
            self.requirements.iter().map(RequirementKey::as_tuple).collect();
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        let mut digest = Sha256::new();
        digest.update(&bytes);
        let output = digest.finalize();
        let mut rendered = String::from(RESOLUTION_DIGEST_PREFIX);
        for byte in output {
            rendered.push_str(format!("{byte:02x}").as_str());
        }
        rendered
    }
}

/// Resolve `names` with default options.
pub fn resolve<L, S>(
    lookup: &L,
    names: &[S],
    context: &ContextId,
    pool: &RawPool,
) -> Result<Resolution, EngineError>
where
    L: SpecLookup + ?Sized,
    S: AsRef<str>,
{
    resolve_with(lookup, names, context, pool, EngineOptions::default())
}

/// Resolve `names` against `pool`.
///
/// Fatal errors: unknown field names and dependency graphs that are cyclic
/// or deeper than `options.max_depth`. Derivations that are not ready are
/// recorded in [`Resolution::deferred`] and retried on the next call.
pub fn resolve_with<L, S>(
    lookup: &L,
    names: &[S],
    context: &ContextId,
    pool: &RawPool,
    options: EngineOptions,
) -> Result<Resolution, EngineError>
where
    L: SpecLookup + ?Sized,
    S: AsRef<str>,
{
    let max_depth = options.max_depth;
    let requested = unique_names(names);

    let mut queue: VecDeque<(&str, String, usize)> = requested
        .iter()
        .map(|name| (*name, (*name).to_string(), 0))
        .collect();
    let mut visited: HashSet<String> = HashSet::new();
    let mut contributions: HashMap<String, Vec<RequirementKey>> = HashMap::new();
    let mut deferred = Vec::new();
    let mut unavailable = Vec::new();

    while let Some((origin, field, depth)) = queue.pop_front() {
        if depth > max_depth {
            return Err(EngineError::DependencyDepthExceeded {
                field,
                requested: origin.to_string(),
                depth,
                max_depth,
            });
        }
        if visited.contains(&field) {
            continue;
        }
        visited.insert(field.clone());

        let spec = lookup.lookup(&field)?;
        for dep in spec.depends_on() {
            queue.push_back((origin, dep.clone(), depth + 1));
        }

        let contributed = match spec.kind() {
            FieldKind::Direct { requirements } => {
                requirements.iter().map(|signal| signal.at(context)).collect()
            }
            FieldKind::Derived { derive } => match derive(context, pool) {
                Ok(keys) => keys,
                Err(DeriveError::NotReady { missing }) => {
                    // The input the derivation is waiting on is owed by this
                    // field, whether or not a dependency also declares it.
                    tracing::trace!(field = %field, missing = %missing, "derivation deferred");
                    deferred.push(field.clone());
                    vec![missing]
                }
                Err(DeriveError::Unavailable { reason }) => {
                    tracing::debug!(field = %field, reason = %reason, "derivation unavailable");
                    unavailable.push(UnavailableField {
                        field: field.clone(),
                        reason,
                    });
                    Vec::new()
                }
            },
            FieldKind::Computed { .. } => Vec::new(),
        };
        contributions.insert(field, contributed);
    }

    let mut heights = HashMap::new();
    for origin in &requested {
        let mut path = Vec::new();
        let height = chain_height(lookup, origin, origin, max_depth, &mut heights, &mut path)?;
        if height > max_depth {
            return Err(EngineError::DependencyDepthExceeded {
                field: (*origin).to_string(),
                requested: (*origin).to_string(),
                depth: height,
                max_depth,
            });
        }
    }

    let mut status = BTreeMap::new();
    let mut requirements = Vec::new();
    let mut seen: HashSet<&RequirementKey> = HashSet::new();
    for origin in &requested {
        let mut resolved = true;
        for field in reachable(lookup, origin)? {
            let Some(keys) = contributions.get(&field) else {
                continue;
            };
            for key in keys.iter().filter(|key| !pool.contains(key)) {
                resolved = false;
                if seen.insert(key) {
                    requirements.push(key.clone());
                }
            }
        }
        status.insert((*origin).to_string(), resolved);
    }

    tracing::debug!(
        context = %context,
        requested = requested.len(),
        expanded = visited.len(),
        missing = requirements.len(),
        deferred = deferred.len(),
        "resolved batch"
    );

    Ok(Resolution {
        status,
        requirements,
        deferred,
        unavailable,
    })
}

/// Requested names with duplicates removed, first occurrence kept.
fn unique_names<S: AsRef<str>>(names: &[S]) -> Vec<&str> {
    let mut seen: HashSet<&str> = HashSet::new();
    names
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| seen.insert(*name))
        .collect()
}

/// Fields reachable from `origin` over `depends_on`, breadth-first,
/// `origin` included.
fn reachable<L>(lookup: &L, origin: &str) -> Result<Vec<String>, EngineError>
where
    L: SpecLookup + ?Sized,
{
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([origin.to_string()]);
    while let Some(field) = queue.pop_front() {
        if !seen.insert(field.clone()) {
            continue;
        }
        queue.extend(lookup.lookup(&field)?.depends_on().iter().cloned());
        order.push(field);
    }
    Ok(order)
}

/// Length of the longest dependency chain below `field`.
///
/// A field seen again on the current path is a cycle, and a path longer
/// than `max_depth` is too deep; both fail.
fn chain_height<L>(
    lookup: &L,
    field: &str,
    requested: &str,
    max_depth: usize,
    heights: &mut HashMap<String, usize>,
    path: &mut Vec<String>,
) -> Result<usize, EngineError>
where
    L: SpecLookup + ?Sized,
{
    if let Some(&height) = heights.get(field) {
        return Ok(height);
    }
    if path.len() > max_depth || path.iter().any(|seen| seen == field) {
        return Err(EngineError::DependencyDepthExceeded {
            field: field.to_string(),
            requested: requested.to_string(),
            depth: path.len(),
            max_depth,
        });
    }

    let spec = lookup.lookup(field)?;
    path.push(field.to_string());
    let mut height = 0;
    for dep in spec.depends_on() {
        let below = chain_height(lookup, dep, requested, max_depth, heights, path)?;
        height = height.max(below + 1);
    }
    path.pop();
    heights.insert(field.to_string(), height);
    Ok(height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SignalRef;
    use crate::registry::SpecRegistry;
    use crate::spec::FieldSpec;
    use serde_json::json;

    fn ctx() -> ContextId {
        ContextId::from(200000u64)
    }

    fn k1() -> RequirementKey {
        SignalRef::new("K1", "TREE").at(&ctx())
    }

    /// A (derived, depends on B), B (direct, K1), C (direct, K1).
    fn abc_registry() -> SpecRegistry {
        SpecRegistry::from_specs(
            "",
            [
                FieldSpec::derived("A", &["B"], |ctx, pool| {
                    let count = pool
                        .value(&SignalRef::new("K1", "TREE").at(ctx))?
                        .as_u64()
                        .ok_or_else(|| DeriveError::unavailable("K1 is not a count"))?;
                    Ok((0..count)
                        .map(|i| SignalRef::new(format!("CH{i:02}"), "TREE").at(ctx))
                        .collect())
                }),
                FieldSpec::direct("B", [SignalRef::new("K1", "TREE")]),
                FieldSpec::direct("C", [SignalRef::new("K1", "TREE")]),
            ],
        )
        .expect("registry should build")
    }

    #[test]
    fn shared_key_is_requested_once() {
        let registry = abc_registry();
        let resolution =
            resolve(&registry, &["A", "C"], &ctx(), &RawPool::new()).expect("resolve");

        assert_eq!(resolution.requirements, vec![k1()]);
        assert_eq!(resolution.status.get("A"), Some(&false));
        assert_eq!(resolution.status.get("C"), Some(&false));
        assert_eq!(resolution.deferred, vec!["A".to_string()]);
    }

    #[test]
    fn derivation_runs_once_inputs_land() {
        let registry = abc_registry();
        let mut pool = RawPool::new();
        pool.insert_value(k1(), json!(2));

        let resolution = resolve(&registry, &["A", "C"], &ctx(), &pool).expect("resolve");
        assert_eq!(resolution.status.get("C"), Some(&true));
        assert_eq!(resolution.status.get("A"), Some(&false));
        assert_eq!(
            resolution.requirements,
            vec![
                SignalRef::new("CH00", "TREE").at(&ctx()),
                SignalRef::new("CH01", "TREE").at(&ctx()),
            ]
        );
        assert!(resolution.deferred.is_empty());
    }

    #[test]
    fn derivation_that_can_never_succeed_is_reported() {
        let registry = abc_registry();
        let mut pool = RawPool::new();
        pool.insert_failure(k1(), "node not found");

        let resolution = resolve(&registry, &["A"], &ctx(), &pool).expect("resolve");
        assert_eq!(resolution.status.get("A"), Some(&true));
        assert_eq!(resolution.unavailable.len(), 1);
        assert_eq!(resolution.unavailable[0].field, "A");
        assert!(resolution.is_complete());
        assert!(!resolution.is_composable());
    }

    #[test]
    fn undeclared_derivation_input_is_still_requested() {
        // D reads K without declaring a dependency that fetches it.
        let registry = SpecRegistry::from_specs(
            "",
            [
                FieldSpec::derived("D", &[], |ctx, pool| {
                    pool.value(&SignalRef::new("K", "TREE").at(ctx))?;
                    Ok(vec![SignalRef::new("CH", "TREE").at(ctx)])
                }),
                FieldSpec::computed("X", &["D"], |_| Ok(json!(null))),
            ],
        )
        .expect("registry should build");
        let undeclared = SignalRef::new("K", "TREE").at(&ctx());

        let first = resolve(&registry, &["X"], &ctx(), &RawPool::new()).expect("resolve");
        assert_eq!(first.status.get("X"), Some(&false));
        assert_eq!(first.requirements, vec![undeclared.clone()]);
        assert_eq!(first.deferred, vec!["D".to_string()]);
        assert!(!first.is_composable());

        let mut pool = RawPool::new();
        pool.insert_value(undeclared, json!(1));
        let second = resolve(&registry, &["X"], &ctx(), &pool).expect("resolve");
        assert_eq!(second.status.get("X"), Some(&false));
        assert_eq!(second.requirements, vec![SignalRef::new("CH", "TREE").at(&ctx())]);
        assert!(second.deferred.is_empty());
    }

    #[test]
    fn shared_dependency_is_attributed_to_every_requester() {
        let registry = SpecRegistry::from_specs(
            "",
            [
                FieldSpec::direct("B", [SignalRef::new("K1", "TREE")]),
                FieldSpec::computed("X", &["B"], |_| Ok(json!(1))),
                FieldSpec::computed("Y", &["B"], |_| Ok(json!(2))),
            ],
        )
        .expect("registry should build");

        let resolution =
            resolve(&registry, &["X", "Y"], &ctx(), &RawPool::new()).expect("resolve");
        assert_eq!(resolution.requirements, vec![k1()]);
        assert_eq!(resolution.pending_fields(), vec!["X", "Y"]);
    }

    #[test]
    fn duplicate_requested_names_collapse() {
        let registry = abc_registry();
        let resolution =
            resolve(&registry, &["C", "C"], &ctx(), &RawPool::new()).expect("resolve");
        assert_eq!(resolution.status.len(), 1);
        assert_eq!(resolution.requirements.len(), 1);
    }

    #[test]
    fn unknown_dependency_is_fatal() {
        let registry = SpecRegistry::from_specs("", [FieldSpec::declared("X", &["missing"])])
            .expect("registry should build");
        let err = resolve(&registry, &["X"], &ctx(), &RawPool::new()).expect_err("must fail");
        assert_eq!(err, EngineError::UnknownField("missing".to_string()));
    }

    #[test]
    fn cycle_raises_depth_exceeded() {
        let registry = SpecRegistry::from_specs(
            "",
            [
                FieldSpec::declared("P", &["Q"]),
                FieldSpec::declared("Q", &["P"]),
            ],
        )
        .expect("registry should build");
        let err = resolve(&registry, &["P"], &ctx(), &RawPool::new()).expect_err("must fail");
        assert!(matches!(
            err,
            EngineError::DependencyDepthExceeded { requested, .. } if requested == "P"
        ));
    }

    #[test]
    fn long_chain_raises_depth_exceeded() {
        let names: Vec<String> = (0..5).map(|i| format!("F{i}")).collect();
        let mut specs = Vec::new();
        for (i, name) in names.iter().enumerate() {
            if let Some(next) = names.get(i + 1) {
                specs.push(FieldSpec::declared(name.clone(), &[next.as_str()]));
            } else {
                specs.push(FieldSpec::direct(name.clone(), [SignalRef::new("LEAF", "T")]));
            }
        }
        let registry = SpecRegistry::from_specs("", specs).expect("registry should build");

        let shallow = EngineOptions { max_depth: 3 };
        let err = resolve_with(&registry, &["F0"], &ctx(), &RawPool::new(), shallow)
            .expect_err("chain of four edges exceeds depth three");
        assert!(matches!(err, EngineError::DependencyDepthExceeded { max_depth: 3, .. }));

        let deep_enough = EngineOptions { max_depth: 4 };
        let resolution = resolve_with(&registry, &["F0"], &ctx(), &RawPool::new(), deep_enough)
            .expect("chain of four edges fits depth four");
        assert_eq!(resolution.requirements.len(), 1);
    }

    #[test]
    fn digest_tracks_requirement_list() {
        let registry = abc_registry();
        let first = resolve(&registry, &["C"], &ctx(), &RawPool::new()).expect("resolve");
        let second = resolve(&registry, &["C"], &ctx(), &RawPool::new()).expect("resolve");
        assert_eq!(first.digest(), second.digest());
        assert!(first.digest().starts_with("rq1_"));

        let mut pool = RawPool::new();
        pool.insert_value(k1(), json!(0));
        let done = resolve(&registry, &["C"], &ctx(), &pool).expect("resolve");
        assert_ne!(first.digest(), done.digest());
        assert!(done.is_complete());
    }
}
