//! External entry points (spec.md §6): graph construction, `compile`, and
//! `run_tick`. This is the only module an out-of-scope collaborator —
//! pipeline façade sugar, a visual dashboard, a domain node library — should
//! ever import; everything else in `tickflow_ir`/`tickflow_rt` is reachable
//! through it.
//!
//! Grounded on the original `rg_compiler` top-level package `__init__.py`,
//! which re-exports a small curated surface over the much larger internal
//! module tree for exactly this reason.

use tickflow_ir::config::CompileConfig;
use tickflow_ir::diagnostic::Diagnostic;
use tickflow_ir::graph::{Contract, ContinuousSpec, GraphBuilder, NodeId, PortId, Reaction};
use tickflow_ir::ir::Ir;

use crate::errors::GraphError;
use crate::runtime::Runtime;

/// Accumulates a graph under construction. Wraps `GraphBuilder` with the
/// name-uniqueness check spec.md §6 calls "register node (unique
/// identifier)" — `GraphBuilder` itself tracks names only for diagnostic
/// display and happily accepts duplicates, since uniqueness is a façade-level
/// contract, not an IR invariant.
#[derive(Debug, Default)]
pub struct Graph {
    builder: GraphBuilder,
    names: std::collections::HashMap<String, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self { builder: GraphBuilder::new(), names: std::collections::HashMap::new() }
    }

    fn check_unique(&self, name: &str) -> Result<(), GraphError> {
        if self.names.contains_key(name) {
            return Err(GraphError::DoubleRegisteredNode { name: name.to_string() });
        }
        Ok(())
    }

    /// Registers a reactive-core node under a unique name.
    pub fn register_core_node(&mut self, name: impl Into<String>) -> Result<NodeId, GraphError> {
        let name = name.into();
        self.check_unique(&name)?;
        let id = self.builder.add_core_node(name.clone());
        self.names.insert(name, id);
        Ok(id)
    }

    /// Registers an external black-box node under a unique name, carrying
    /// the contract the causality and scheduling passes will trust it for.
    pub fn register_external_node(
        &mut self,
        name: impl Into<String>,
        contract: Contract,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        self.check_unique(&name)?;
        let id = self.builder.add_external_node(name.clone(), contract);
        self.names.insert(name, id);
        Ok(id)
    }

    /// Registers a continuous node under a unique name.
    pub fn register_continuous_node(
        &mut self,
        name: impl Into<String>,
        spec: ContinuousSpec,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        self.check_unique(&name)?;
        let id = self.builder.add_continuous_node(name.clone(), spec);
        self.names.insert(name, id);
        Ok(id)
    }

    /// Fan-out is always permitted (spec.md §6); fan-in is only checked at
    /// compile time by `StructuralPass`.
    pub fn add_edge(&mut self, from: PortId, to: PortId) -> tickflow_ir::graph::EdgeId {
        self.builder.add_edge(from, to)
    }

    pub fn add_reaction(&mut self, reaction: Reaction) -> Result<tickflow_ir::graph::ReactionId, tickflow_ir::graph::GraphError> {
        self.builder.add_reaction(reaction)
    }

    /// Direct access to the underlying builder for port/state declarations,
    /// which carry no name-uniqueness contract of their own (spec.md §6 only
    /// names nodes as uniquely identified).
    pub fn builder_mut(&mut self) -> &mut GraphBuilder {
        &mut self.builder
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }
}

/// The result of `compile`: the frozen `Ir` (consumed by `Runtime::new` on
/// success), every diagnostic collected, and whether compilation succeeded
/// (spec.md §6).
pub struct CompileOutcome {
    pub ir: Ir,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
}

/// `compile(runtime) -> { success, diagnostics }` (spec.md §6). Always
/// returns the `Ir` it built, even on failure, so a caller can inspect what
/// went wrong; only a `success` outcome should be handed to `Runtime::new`.
pub fn compile(graph: Graph, config: CompileConfig) -> CompileOutcome {
    let result = tickflow_ir::compile(graph.builder, config);
    CompileOutcome { ir: result.ir, diagnostics: result.diagnostics, success: result.success }
}

/// Builds a `Runtime` from a successful `CompileOutcome`. Panics if
/// `outcome.success` is false — compiling a rejected graph is a caller bug,
/// not a runtime condition (spec.md §7: compile-time diagnostics and runtime
/// errors are reported through different channels).
pub fn into_runtime(outcome: CompileOutcome) -> Runtime {
    assert!(outcome.success, "cannot build a Runtime from a failed compile: {:?}", outcome.diagnostics);
    Runtime::new(outcome.ir)
}

/// `run_tick(overrides?, dt?)` (spec.md §6), a thin re-export of
/// `Runtime::run_tick` so callers touching only this module never need to
/// import `crate::runtime` directly.
pub fn run_tick(
    runtime: &mut Runtime,
    overrides: Option<std::collections::HashMap<PortId, tickflow_ir::value::Value>>,
    dt: Option<f64>,
) -> Result<(), crate::errors::RuntimeError> {
    runtime.run_tick(overrides, dt)
}
