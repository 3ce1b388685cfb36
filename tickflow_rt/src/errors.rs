//! Runtime error kinds (spec.md §7). Manual `Display`/`Error` impls, matching
//! `tickflow_ir::policy::PolicyError`/`tickflow_ir::graph::GraphError`'s own
//! style rather than pulling in a derive macro crate for the runtime's own
//! error types.

use tickflow_ir::graph::NodeId;
use tickflow_ir::policy::PolicyError;

/// An SCC's microstep fixed-point did not converge within its iteration
/// limit (spec.md §4.6, §7). Fatal to the current tick; no partial commit
/// happens (spec.md §5: "either commits all intents or raises").
#[derive(Debug, Clone, PartialEq)]
pub struct ZenoRuntimeError {
    pub scc_members: Vec<NodeId>,
    pub limit: usize,
}
impl std::fmt::Display for ZenoRuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SCC of {} node(s) did not reach a fixed point within {} microsteps",
            self.scc_members.len(),
            self.limit
        )
    }
}
impl std::error::Error for ZenoRuntimeError {}

/// A continuous node's derivative function returned the wrong key set for
/// its declared state, or a step was requested with `dt` exceeding the
/// node's `max_step` (spec.md §4.7, §7).
#[derive(Debug, Clone, PartialEq)]
pub enum IntegratorError {
    DerivativeKeyMismatch { node: NodeId, expected: Vec<String>, got: Vec<String> },
    StepTooLarge { node: NodeId, dt: f64, max_step: f64 },
}
impl std::fmt::Display for IntegratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DerivativeKeyMismatch { node, expected, got } => write!(
                f,
                "node {node:?}: derivative dict keys {got:?} do not match declared state {expected:?}"
            ),
            Self::StepTooLarge { node, dt, max_step } => {
                write!(f, "node {node:?}: dt {dt} exceeds max_step {max_step}")
            }
        }
    }
}
impl std::error::Error for IntegratorError {}

/// Registration-time conflict: the same external identifier was registered
/// to the facade twice (spec.md §7).
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    DoubleRegisteredNode { name: String },
}
impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DoubleRegisteredNode { name } => write!(f, "node `{name}` is already registered"),
        }
    }
}
impl std::error::Error for GraphError {}

/// The union of everything that can fail during `run_tick` (spec.md §7).
/// None of these are retried internally — the caller sees the committed
/// state is unchanged (spec.md §8 property 5) and may retry at its own
/// discretion.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    Zeno(ZenoRuntimeError),
    Policy(PolicyError),
    Integrator(IntegratorError),
    Graph(GraphError),
}
impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zeno(e) => write!(f, "{e}"),
            Self::Policy(e) => write!(f, "{e}"),
            Self::Integrator(e) => write!(f, "{e}"),
            Self::Graph(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for RuntimeError {}
impl From<ZenoRuntimeError> for RuntimeError {
    fn from(e: ZenoRuntimeError) -> Self {
        Self::Zeno(e)
    }
}
impl From<PolicyError> for RuntimeError {
    fn from(e: PolicyError) -> Self {
        Self::Policy(e)
    }
}
impl From<IntegratorError> for RuntimeError {
    fn from(e: IntegratorError) -> Self {
        Self::Integrator(e)
    }
}
impl From<GraphError> for RuntimeError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}
