//! Fixed-step Euler/RK4 integration for `Continuous` nodes, plus the
//! zero-order-hold bookkeeping the hybrid variant needs across ticks
//! (spec.md §4.7).
//!
//! Grounded on `regelum/core/continuous.py`'s `ContinuousNode.step`, which
//! owns its own state vector and last-seen inputs between calls; `max_step`
//! and derivative-key validation are enforced the same way, as a hard error
//! rather than a silent clamp/reshape, per spec.md §4.7 and §7.

use std::collections::{BTreeMap, VecDeque};

use tickflow_ir::graph::{ContinuousSpec, Integrator, NodeId};
use tickflow_ir::value::Value;

use crate::context::ContinuousDynamics;
use crate::errors::IntegratorError;

/// One recorded `(t, y)` pair from a completed step, kept in a capped ring
/// buffer per node (Design Notes: "keep a capped ring buffer per node
/// rather than an unbounded list; specify the cap at construction").
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub t: f64,
    pub y: BTreeMap<String, f64>,
}

/// Converts a discrete-port `Value` into the flat `f64` record the
/// continuous runtime operates on: a bare number is promoted to `{"u": v}`
/// (spec.md §4.3: "a record of control values or a scalar promoted to
/// `{u: v}`"), a `Record` is converted field-by-field, and `Absent` carries
/// no fresh reading at all.
pub fn value_to_record(v: &Value) -> Option<BTreeMap<String, f64>> {
    match v {
        Value::Absent => None,
        Value::Number(n) => Some(BTreeMap::from([("u".to_string(), *n)])),
        Value::Record(fields) => {
            Some(fields.iter().map(|(k, v)| (k.clone(), v.as_number().unwrap_or(0.0))).collect())
        }
        _ => None,
    }
}

/// The inverse of `value_to_record`, for writing a state/output record back
/// onto a discrete port.
pub fn record_to_value(record: &BTreeMap<String, f64>) -> Value {
    Value::Record(record.iter().map(|(k, v)| (k.clone(), Value::num(*v))).collect())
}

#[derive(Debug, Clone, Default)]
struct NodeState {
    held_u: Option<BTreeMap<String, f64>>,
    trace: VecDeque<TraceEntry>,
}

/// Owns every `Continuous` node's zero-order-hold memory and output trace.
/// Stateless with respect to the integration state vector itself `x`: that
/// lives in the ordinary IR variable store (`Runtime::vars`) like any other
/// state cell, so a continuous node's `x` persists and commits through the
/// exact same mechanism as a discrete one (spec.md §3: "state-variable
/// values persist across ticks").
#[derive(Debug, Clone)]
pub struct ContinuousRuntime {
    trace_cap: usize,
    nodes: std::collections::HashMap<NodeId, NodeState>,
}

impl ContinuousRuntime {
    pub fn new(trace_cap: usize) -> Self {
        Self { trace_cap, nodes: std::collections::HashMap::new() }
    }

    pub fn trace(&self, node: NodeId) -> impl Iterator<Item = &TraceEntry> {
        self.nodes.get(&node).into_iter().flat_map(|n| n.trace.iter())
    }

    /// Resolves this tick's `u` for `node`: a fresh reading always wins and
    /// (for the hybrid variant) becomes the new held value; absent a fresh
    /// reading, the hybrid variant falls back to its last-held value
    /// (seeded from `hybrid_held_u` before the first tick) while the
    /// non-hybrid variant reads nothing at all, per spec.md §4.3.
    pub fn resolve_u(
        &mut self,
        node: NodeId,
        fresh: Option<BTreeMap<String, f64>>,
        hybrid_held_u: &Option<Value>,
    ) -> BTreeMap<String, f64> {
        let Some(initial) = hybrid_held_u else {
            return fresh.unwrap_or_default();
        };
        let entry = self.nodes.entry(node).or_default();
        if let Some(fresh) = fresh {
            entry.held_u = Some(fresh.clone());
            return fresh;
        }
        entry
            .held_u
            .get_or_insert_with(|| value_to_record(initial).unwrap_or_default())
            .clone()
    }

    /// Advances `node`'s continuous state from `x` by one fixed step of
    /// `dt`, returning the new state and the recorded output record.
    /// `dt == 0.0` means "update last-inputs only, no integration" (spec.md
    /// §4.7): `outputs` is still recomputed and traced, but no derivative
    /// call happens and `x` is returned unchanged.
    pub fn step(
        &mut self,
        node: NodeId,
        spec: &ContinuousSpec,
        dynamics: &dyn ContinuousDynamics,
        t: f64,
        x: &BTreeMap<String, f64>,
        u: &BTreeMap<String, f64>,
        dt: f64,
    ) -> Result<(BTreeMap<String, f64>, BTreeMap<String, f64>), IntegratorError> {
        if dt == 0.0 {
            let y = dynamics.output(t, x, u);
            self.push_trace(node, t, y.clone());
            return Ok((x.clone(), y));
        }
        if dt > spec.max_step {
            return Err(IntegratorError::StepTooLarge { node, dt, max_step: spec.max_step });
        }

        let new_x = match spec.integrator {
            Integrator::Euler => {
                let k1 = checked_derivative(node, spec, dynamics, t, x, u)?;
                add_scaled(x, &k1, dt)
            }
            Integrator::Rk4 => {
                let k1 = checked_derivative(node, spec, dynamics, t, x, u)?;
                let x2 = add_scaled(x, &k1, dt / 2.0);
                let k2 = checked_derivative(node, spec, dynamics, t + dt / 2.0, &x2, u)?;
                let x3 = add_scaled(x, &k2, dt / 2.0);
                let k3 = checked_derivative(node, spec, dynamics, t + dt / 2.0, &x3, u)?;
                let x4 = add_scaled(x, &k3, dt);
                let k4 = checked_derivative(node, spec, dynamics, t + dt, &x4, u)?;
                let mut out = x.clone();
                for (key, value) in out.iter_mut() {
                    let sum = k1[key] + 2.0 * k2[key] + 2.0 * k3[key] + k4[key];
                    *value += dt / 6.0 * sum;
                }
                out
            }
        };

        let y = dynamics.output(t + dt, &new_x, u);
        self.push_trace(node, t + dt, y.clone());
        Ok((new_x, y))
    }

    fn push_trace(&mut self, node: NodeId, t: f64, y: BTreeMap<String, f64>) {
        let entry = self.nodes.entry(node).or_default();
        if entry.trace.len() == self.trace_cap {
            entry.trace.pop_front();
        }
        entry.trace.push_back(TraceEntry { t, y });
    }
}

fn checked_derivative(
    node: NodeId,
    spec: &ContinuousSpec,
    dynamics: &dyn ContinuousDynamics,
    t: f64,
    x: &BTreeMap<String, f64>,
    u: &BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>, IntegratorError> {
    let deriv = dynamics.derivative(t, x, u);
    let mut expected: Vec<&String> = spec.derivative_keys.iter().collect();
    let mut got: Vec<&String> = deriv.keys().collect();
    expected.sort();
    got.sort();
    if expected != got {
        return Err(IntegratorError::DerivativeKeyMismatch {
            node,
            expected: spec.derivative_keys.clone(),
            got: deriv.keys().cloned().collect(),
        });
    }
    Ok(deriv)
}

fn add_scaled(x: &BTreeMap<String, f64>, k: &BTreeMap<String, f64>, factor: f64) -> BTreeMap<String, f64> {
    x.iter().map(|(key, value)| (key.clone(), value + factor * k[key])).collect()
}
