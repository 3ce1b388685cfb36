//! The context API a node's step sees during `propose` (spec.md §4.6), and
//! the two traits a caller implements to drive `External`/`Continuous`
//! nodes — the Rust-native replacement for the source's reflective
//! `@external_node`/`@continuous_node` decorators (SPEC_FULL.md §4.12).

use tickflow_ir::graph::{PortId, VarId};
use tickflow_ir::value::Value;

/// What a node's step sees while the scheduler drives `propose`. `Core`
/// reactions are evaluated directly against an internal implementation of
/// this trait by `runtime::Runtime`; `External` nodes see the same trait
/// through their registered `ExternalStep::step`.
pub trait Context {
    /// In order of preference: the snapshotted producer value for a
    /// delay-polarity edge, the producer's current port-state entry, this
    /// port's own default, or `Absent` (spec.md §4.6).
    fn read(&self, input_port: PortId) -> Value;

    /// Stores `v` as this tick's value for `output_port`.
    fn write(&mut self, output_port: PortId, v: Value);

    /// The working variable copy's current entry for `state`, or its initial
    /// value if nothing has committed yet.
    fn read_var(&self, state: VarId) -> Value;

    /// Appends an intent tagged with the calling node's identity, priority 0
    /// (ignored by every policy but `Lww`, where it ties with every other
    /// zero-priority writer).
    fn write_var(&mut self, state: VarId, v: Value);

    /// Like `write_var`, with an explicit `Lww` priority (spec.md §4.2).
    fn write_var_with_priority(&mut self, state: VarId, v: Value, priority: i64);
}

/// A user-supplied step routine for an `External` node (spec.md §4.3): the
/// compiler treats its body as opaque and trusts only the node's declared
/// `Contract`.
pub trait ExternalStep {
    fn step(&mut self, ctx: &mut dyn Context);
}

/// A continuous node's differential system `{ẋ = f(t, x, u), y = h(t, x, u)}`
/// (spec.md §4.3, §4.7). State and control are both flat records keyed by
/// name; `derivative` must return exactly the declared state-name keys
/// (checked by `continuous::ContinuousRuntime::step`, not here).
pub trait ContinuousDynamics {
    fn derivative(
        &self,
        t: f64,
        x: &std::collections::BTreeMap<String, f64>,
        u: &std::collections::BTreeMap<String, f64>,
    ) -> std::collections::BTreeMap<String, f64>;

    fn output(
        &self,
        t: f64,
        x: &std::collections::BTreeMap<String, f64>,
        u: &std::collections::BTreeMap<String, f64>,
    ) -> std::collections::BTreeMap<String, f64>;
}
