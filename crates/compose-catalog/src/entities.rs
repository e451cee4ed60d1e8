//! Built-in entities.
//!
//! Each constructor wires fields to their raw signals and leaves values
//! untouched beyond reshaping (column extraction, per-channel stacking).
//! Unit conversion and physics belong to downstream consumers.

use crate::options::EntityOptions;
use compose_kernel::{
    ComposeScope, ContextId, DeriveError, EngineError, FieldSpec, ProduceError, RawPool,
    SignalRef, SpecRegistry,
};
use serde_json::{Value, json};

/// IMAS convention: 0 heterogeneous, 1 homogeneous, 2 time-independent.
const HOMOGENEOUS_TIME: u64 = 1;
const TIME_INDEPENDENT: u64 = 2;

const ECE_SOURCE: &str = "ELECTRONS";

fn read(scope: &ComposeScope<'_>, signal: &SignalRef) -> Result<Value, ProduceError> {
    Ok(scope.signal(signal)?.clone())
}

fn rows<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, ProduceError> {
    value
        .as_array()
        .ok_or_else(|| ProduceError::invalid(format!("{what} is not an array")))
}

fn column(
    scope: &ComposeScope<'_>,
    signal: &SignalRef,
    index: usize,
) -> Result<Value, ProduceError> {
    let table = rows(scope.signal(signal)?, &signal.locator)?;
    table
        .iter()
        .map(|row| {
            row.get(index).cloned().ok_or_else(|| {
                ProduceError::invalid(format!("{} row has no column {index}", signal.locator))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Limiter outline from the equilibrium tree.
pub fn wall(options: &EntityOptions) -> Result<SpecRegistry, EngineError> {
    let limiter = SignalRef::new(r"\TOP.RESULTS.GEQDSK.LIM", options.efit_tree.as_str());
    let (r_limiter, z_limiter) = (limiter.clone(), limiter.clone());

    let mut builder = SpecRegistry::builder("wall");
    builder
        .add(FieldSpec::direct("wall._limiter_data", [limiter]))?
        .add(FieldSpec::computed(
            "wall.description_2d.0.limiter.unit.0.outline.r",
            &["wall._limiter_data"],
            move |scope| column(scope, &r_limiter, 0),
        ))?
        .add(FieldSpec::computed(
            "wall.description_2d.0.limiter.unit.0.outline.z",
            &["wall._limiter_data"],
            move |scope| column(scope, &z_limiter, 1),
        ))?
        .add(FieldSpec::computed(
            "wall.description_2d.0.limiter.type.index",
            &[],
            |_| Ok(json!(0)),
        ))?
        .add(FieldSpec::computed("wall.time", &[], |_| Ok(json!([0.0]))))?
        .add(FieldSpec::computed(
            "wall.ids_properties.homogeneous_time",
            &[],
            |_| Ok(json!(TIME_INDEPENDENT)),
        ))?;
    Ok(builder.build())
}

#[derive(Debug, Clone)]
struct EceNodes {
    numch: SignalRef,
    freq: SignalRef,
    time_base: SignalRef,
    channel_prefix: String,
}

impl EceNodes {
    fn new(fast: bool) -> Self {
        let suffix = if fast { "F" } else { "" };
        let channel_prefix = format!(r"\ECE::TOP.TECE.TECE{suffix}");
        Self {
            numch: SignalRef::new(format!(r"\ECE::TOP.CAL{suffix}.NUMCH{suffix}"), ECE_SOURCE),
            freq: SignalRef::new(r"\ECE::TOP.SETUP.FREQ", ECE_SOURCE),
            time_base: SignalRef::new(format!("dim_of({channel_prefix}01)"), ECE_SOURCE),
            channel_prefix,
        }
    }

    fn channel(&self, index: u64) -> SignalRef {
        SignalRef::new(format!("{}{index:02}", self.channel_prefix), ECE_SOURCE)
    }
}

fn ece_channel_count(
    nodes: &EceNodes,
    context: &ContextId,
    pool: &RawPool,
) -> Result<u64, DeriveError> {
    pool.value(&nodes.numch.at(context))?
        .as_u64()
        .ok_or_else(|| DeriveError::unavailable("NUMCH is not a channel count"))
}

fn ece_channels(scope: &ComposeScope<'_>, nodes: &EceNodes) -> Result<u64, ProduceError> {
    scope
        .signal(&nodes.numch)?
        .as_u64()
        .ok_or_else(|| ProduceError::invalid("NUMCH is not a channel count"))
}

/// Electron cyclotron emission channels.
///
/// The per-channel temperature signals can only be named once the channel
/// count is known, so `ece._temperature_data` is Derived from `ece._numch`.
pub fn ece(options: &EntityOptions) -> Result<SpecRegistry, EngineError> {
    let nodes = EceNodes::new(options.fast_ece);

    let mut builder = SpecRegistry::builder("ece");
    builder
        .add(FieldSpec::direct("ece._numch", [nodes.numch.clone()]))?
        .add(FieldSpec::direct("ece._freq", [nodes.freq.clone()]))?
        .add(FieldSpec::direct("ece._time_base", [nodes.time_base.clone()]))?;

    let derive_nodes = nodes.clone();
    builder.add(FieldSpec::derived(
        "ece._temperature_data",
        &["ece._numch"],
        move |context, pool| {
            let count = ece_channel_count(&derive_nodes, context, pool)?;
            Ok((1..=count)
                .map(|index| derive_nodes.channel(index).at(context))
                .collect())
        },
    ))?;

    let name_nodes = nodes.clone();
    builder.add(FieldSpec::computed("ece.channel.name", &["ece._numch"], move |scope| {
        let count = ece_channels(scope, &name_nodes)?;
        Ok((1..=count).map(|index| json!(format!("ECE{index:02}"))).collect())
    }))?;

    let identifier_nodes = nodes.clone();
    builder.add(FieldSpec::computed(
        "ece.channel.identifier",
        &["ece._numch"],
        move |scope| {
            let count = ece_channels(scope, &identifier_nodes)?;
            Ok((1..=count)
                .map(|index| json!(identifier_nodes.channel(index).locator))
                .collect())
        },
    ))?;

    let freq_nodes = nodes.clone();
    builder.add(FieldSpec::computed(
        "ece.channel.frequency.data",
        &["ece._freq", "ece._numch"],
        move |scope| {
            let count = ece_channels(scope, &freq_nodes)?;
            let freq = scope.signal(&freq_nodes.freq)?;
            let freq = rows(freq, &freq_nodes.freq.locator)?;
            let wanted = usize::try_from(count).unwrap_or(usize::MAX);
            if freq.len() < wanted {
                return Err(ProduceError::invalid(format!(
                    "FREQ has {} entries for {count} channels",
                    freq.len()
                )));
            }
            Ok(Value::Array(freq[..wanted].to_vec()))
        },
    ))?;

    let time_nodes = nodes.clone();
    builder.add(FieldSpec::computed(
        "ece.channel.time",
        &["ece._time_base"],
        move |scope| read(scope, &time_nodes.time_base),
    ))?;

    builder.add(FieldSpec::computed("ece.time", &["ece.channel.time"], |scope| {
        scope.produce("ece.channel.time")
    }))?;

    let data_nodes = nodes;
    builder.add(FieldSpec::computed(
        "ece.channel.t_e.data",
        &["ece._temperature_data", "ece._numch"],
        move |scope| {
            let count = ece_channels(scope, &data_nodes)?;
            (1..=count)
                .map(|index| read(scope, &data_nodes.channel(index)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        },
    ))?;

    builder.add(FieldSpec::computed(
        "ece.ids_properties.homogeneous_time",
        &[],
        |_| Ok(json!(HOMOGENEOUS_TIME)),
    ))?;

    Ok(builder.build())
}

/// (internal field, GEQDSK node, public field)
const SLICE_SCALARS: [(&str, &str, &str); 4] = [
    (
        "equilibrium._ssimag",
        "SSIMAG",
        "equilibrium.time_slice.global_quantities.psi_axis",
    ),
    (
        "equilibrium._ssibry",
        "SSIBRY",
        "equilibrium.time_slice.global_quantities.psi_boundary",
    ),
    (
        "equilibrium._rmaxis",
        "RMAXIS",
        "equilibrium.time_slice.global_quantities.magnetic_axis.r",
    ),
    (
        "equilibrium._zmaxis",
        "ZMAXIS",
        "equilibrium.time_slice.global_quantities.magnetic_axis.z",
    ),
];

/// Time-sliced equilibrium scalars.
///
/// Every slice quantity checks its length against `equilibrium.time`, so all
/// of them share the `_gtime` input.
pub fn equilibrium(options: &EntityOptions) -> Result<SpecRegistry, EngineError> {
    let tree = options.efit_tree.as_str();
    let geqdsk =
        |node: &str| SignalRef::new(format!(r"\{tree}::TOP.RESULTS.GEQDSK.{node}"), tree);
    let gtime = geqdsk("GTIME");

    let mut builder = SpecRegistry::builder("equilibrium");
    builder.add(FieldSpec::direct("equilibrium._gtime", [gtime.clone()]))?;
    builder.add(FieldSpec::computed(
        "equilibrium.time",
        &["equilibrium._gtime"],
        move |scope| read(scope, &gtime),
    ))?;
    builder.add(FieldSpec::computed(
        "equilibrium.ids_properties.homogeneous_time",
        &[],
        |_| Ok(json!(HOMOGENEOUS_TIME)),
    ))?;

    for (internal, node, public) in SLICE_SCALARS {
        let signal = geqdsk(node);
        builder.add(FieldSpec::direct(internal, [signal.clone()]))?;
        builder.add(FieldSpec::computed(
            public,
            &[internal, "equilibrium.time"],
            move |scope| per_slice(scope, &signal),
        ))?;
    }

    Ok(builder.build())
}

fn per_slice(scope: &ComposeScope<'_>, signal: &SignalRef) -> Result<Value, ProduceError> {
    let time = scope.produce("equilibrium.time")?;
    let slices = rows(&time, "equilibrium.time")?.len();
    let value = read(scope, signal)?;
    let found = rows(&value, &signal.locator)?.len();
    if found != slices {
        return Err(ProduceError::invalid(format!(
            "{} has {found} slices, time base has {slices}",
            signal.locator
        )));
    }
    Ok(value)
}
