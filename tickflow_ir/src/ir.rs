//! The frozen compiled IR: a `GraphBuilder` with every node given a
//! reaction (synthesizing one for `External`/`Continuous` nodes), ready for
//! the static passes and then the runtime scheduler.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::config::CompileConfig;
use crate::graph::{
    lower_delays, Direction, EdgeDef, GraphBuilder, NodeId, NodeKind, PortDef, PortId, Reaction,
    ReactionId, VarId, VariableDef,
};
use crate::value::Value;

/// A frozen, pass-ready snapshot of a compiled graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ir {
    pub nodes: SlotMap<NodeId, NodeKind>,
    pub node_names: BTreeMap<NodeId, String>,
    pub ports: SlotMap<PortId, PortDef>,
    pub edges: SlotMap<EdgeId, EdgeDef>,
    pub variables: SlotMap<VarId, VariableDef>,
    pub reactions: SlotMap<ReactionId, Reaction>,
    pub config: CompileConfig,
    /// SDF static firing counts per node within one balanced schedule period,
    /// populated by `passes::sdf::SdfPass`. Empty until that pass has run.
    pub firing_counts: HashMap<NodeId, u64>,
    /// Which reactions were synthesized by `build_ir` rather than authored
    /// by the caller, so diagnostics can avoid naming an invented reaction
    /// as if the user wrote it.
    pub synthetic_reactions: Vec<ReactionId>,
}

impl Ir {
    pub fn ports_of(&self, node: NodeId, direction: Direction) -> Vec<PortId> {
        self.ports
            .iter()
            .filter(|(_, p)| p.node == node && p.direction == direction)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn reactions_of(&self, node: NodeId) -> Vec<ReactionId> {
        self.reactions.iter().filter(|(_, r)| r.node == node).map(|(id, _)| id).collect()
    }

    pub fn variables_of(&self, node: NodeId) -> Vec<VarId> {
        self.variables.iter().filter(|(_, v)| v.node == node).map(|(id, _)| id).collect()
    }

    /// `Value::Absent` if the port has no default, else the declared default.
    pub fn port_default(&self, port: PortId) -> Value {
        self.ports[port].default.clone().unwrap_or(Value::Absent)
    }
}

/// Freezes a `GraphBuilder` into an `Ir`, synthesizing an implicit read-only
/// reaction for every `External`/`Continuous` node (see `graph::Reaction::synthetic`)
/// so the causality pass can treat every node kind uniformly: a node's
/// outputs become `Present` once its synthetic reaction's read set is all
/// `Present` (see DESIGN.md for the grounding of this choice).
pub fn build_ir(mut builder: GraphBuilder, config: CompileConfig) -> Ir {
    lower_delays(&mut builder);

    let mut synthetic_reactions = Vec::new();

    let node_ids: Vec<NodeId> = builder.nodes.iter().map(|(id, _)| id).collect();
    for node in node_ids {
        let is_core = matches!(builder.nodes[node], NodeKind::Core);
        if is_core {
            continue;
        }
        let inputs = builder
            .ports
            .iter()
            .filter(|(_, p)| p.node == node && p.direction == Direction::Input)
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        let name = format!("{}::__synthetic", builder.node_name(node));
        let reaction = Reaction::synthetic(node, name, inputs);
        let id = builder.reactions.insert(reaction);
        synthetic_reactions.push(id);
    }

    Ir {
        nodes: builder.nodes,
        node_names: builder.node_names,
        ports: builder.ports,
        edges: builder.edges,
        variables: builder.variables,
        reactions: builder.reactions,
        config,
        firing_counts: HashMap::new(),
        synthetic_reactions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Contract;

    #[test]
    fn build_ir_synthesizes_reaction_for_external_node() {
        let mut g = GraphBuilder::new();
        let ext = g.add_external_node("sensor", Contract::trusted());
        g.add_output(ext, "reading", None);
        let ir = build_ir(g, CompileConfig::default());
        assert_eq!(ir.synthetic_reactions.len(), 1);
        assert_eq!(ir.reactions_of(ext).len(), 1);
    }

    #[test]
    fn build_ir_does_not_synthesize_for_core_nodes() {
        let mut g = GraphBuilder::new();
        let core = g.add_core_node("n");
        g.add_output(core, "out", None);
        let ir = build_ir(g, CompileConfig::default());
        assert!(ir.synthetic_reactions.is_empty());
        assert!(ir.reactions_of(core).is_empty());
    }
}
