//! Schedule build: SCC decomposition with delay-aware edge polarity, and a
//! deterministic topological ordering of the resulting condensation
//! (spec.md §4.6).
//!
//! Grounded on `original_source/src/rg_compiler/core/runtime.py`'s
//! `GraphRuntime.build_schedule` (Tarjan + reverse-topo), reimplemented over
//! `tickflow_ir::algorithms::{tarjan_scc, kahn_topo_sort}` — the same shared
//! algorithms `tickflow_ir::passes::causality` uses for its own SCC pass, so
//! the two decompositions stay textually close even though they run over
//! different graphs (same-tick dependency graph vs. node-level schedule).

use std::collections::{BTreeMap, HashMap, HashSet};

use smallvec::SmallVec;
use tickflow_ir::algorithms::{kahn_topo_sort, tarjan_scc};
use tickflow_ir::graph::NodeId;
use tickflow_ir::graph::NodeKind;
use tickflow_ir::ir::Ir;

/// One block of the execution schedule: either a single node with no
/// self-edge (runs once per tick) or a strongly connected group that must be
/// driven to a fixed point by the microstep loop. Inlined up to 4 members
/// without spilling to the heap — SCCs in a well-formed reactive graph are
/// almost always a singleton or a small delay-bounded cycle, so this avoids
/// an allocation per block on the hot per-tick path (same rationale as
/// `dfir_rs`'s own use of `SmallVec` in its join-state hot loops).
#[derive(Debug, Clone)]
pub struct ScheduleBlock {
    pub members: SmallVec<[NodeId; 4]>,
    pub has_self_edge: bool,
}
impl ScheduleBlock {
    /// Spec.md §4.6: "A singleton block without a self-edge runs its node
    /// once. Any other block enters the microstep loop."
    pub fn needs_microstep_loop(&self) -> bool {
        self.members.len() > 1 || self.has_self_edge
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub blocks: Vec<ScheduleBlock>,
}

/// Builds the node-level execution schedule for `ir`. Two adjacency
/// structures are built over the same dense node index:
/// - `adj_full`, used only for the final topological ordering: `u -> v` for
///   a normal edge, flipped to `v -> u` when the producer is a delay output
///   (the consumer must run before the producer's buffer updates this tick).
/// - `adj_scc`, used for Tarjan: a delay-output edge carries no same-tick
///   dependency at all (mirroring `passes::causality::DepGraph`, which
///   excludes the identical edge shape) and is omitted outright, in either
///   direction; a normal edge is included unless its consumer node declares
///   `Contract::no_instant_loop`, so such a node can never be grouped into a
///   same-tick cycle.
///
/// When `ir.config.tickwise_mode` is set, every edge is treated as if it
/// were a delay output: the consumer always runs before the producer and
/// never joins the producer's SCC, since it only ever observes the
/// producer's previous-tick value (SPEC_FULL.md §6).
pub fn build_schedule(ir: &Ir) -> Schedule {
    let mut node_ids: Vec<NodeId> = ir.nodes.iter().map(|(id, _)| id).collect();
    node_ids.sort();
    let n = node_ids.len();
    let index_of: HashMap<NodeId, usize> =
        node_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut adj_full: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut adj_scc: Vec<Vec<usize>> = vec![Vec::new(); n];

    for edge in ir.edges.values() {
        let from_port = &ir.ports[edge.from];
        let to_port = &ir.ports[edge.to];
        let u = index_of[&from_port.node];
        let v = index_of[&to_port.node];

        if from_port.is_delay_output.is_some() || ir.config.tickwise_mode {
            adj_full[v].push(u);
            continue;
        }

        adj_full[u].push(v);
        let omit_from_scc = matches!(
            &ir.nodes[to_port.node],
            NodeKind::External(contract) if contract.no_instant_loop
        );
        if !omit_from_scc {
            adj_scc[u].push(v);
        }
    }

    let scc_of = tarjan_scc(n, &adj_scc);
    let scc_count = scc_of.iter().copied().max().map(|m| m + 1).unwrap_or(0);

    let mut condensation_edges: Vec<HashSet<usize>> = vec![HashSet::new(); scc_count];
    for u in 0..n {
        for &v in &adj_full[u] {
            if scc_of[u] != scc_of[v] {
                condensation_edges[scc_of[u]].insert(scc_of[v]);
            }
        }
    }
    let condensation_adj: Vec<Vec<usize>> =
        condensation_edges.into_iter().map(|set| set.into_iter().collect()).collect();

    let scc_order =
        kahn_topo_sort(scc_count, &condensation_adj).expect("condensation of an SCC decomposition is always a DAG");

    let mut members_by_scc: BTreeMap<usize, SmallVec<[NodeId; 4]>> = BTreeMap::new();
    for (idx, &scc) in scc_of.iter().enumerate() {
        members_by_scc.entry(scc).or_default().push(node_ids[idx]);
    }
    for members in members_by_scc.values_mut() {
        members.sort();
    }

    let blocks = scc_order
        .into_iter()
        .map(|scc_id| {
            let members = members_by_scc.remove(&scc_id).unwrap_or_default();
            let has_self_edge = members.iter().any(|&node| {
                let idx = index_of[&node];
                adj_scc[idx].contains(&idx)
            });
            ScheduleBlock { members, has_self_edge }
        })
        .collect();

    Schedule { blocks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickflow_ir::config::CompileConfig;
    use tickflow_ir::expr::{Expr, Ref};
    use tickflow_ir::graph::{Contract, GraphBuilder, Reaction};
    use tickflow_ir::ir::build_ir;
    use tickflow_ir::value::Value;

    #[test]
    fn linear_chain_schedules_in_dependency_order() {
        let mut g = GraphBuilder::new();
        let a = g.add_core_node("a");
        let out_a = g.add_output(a, "out", None);
        g.add_reaction(Reaction::new(a, "ra").emit(out_a, Expr::Const(Value::num(1.0)))).unwrap();

        let b = g.add_core_node("b");
        let in_b = g.add_input(b, "in", None);
        let out_b = g.add_output(b, "out", None);
        g.add_edge(out_a, in_b);
        g.add_reaction(Reaction::new(b, "rb").emit(out_b, Expr::Var(Ref::Port(in_b)))).unwrap();

        let ir = build_ir(g, CompileConfig::default());
        let schedule = build_schedule(&ir);
        let flat: Vec<NodeId> = schedule.blocks.iter().flat_map(|b| b.members.clone()).collect();
        let pos_a = flat.iter().position(|&n| n == a).unwrap();
        let pos_b = flat.iter().position(|&n| n == b).unwrap();
        assert!(pos_a < pos_b);
        assert!(schedule.blocks.iter().all(|b| !b.needs_microstep_loop()));
    }

    #[test]
    fn delay_output_flips_schedule_order() {
        // Two distinct nodes: `producer`'s delay output feeds `consumer`'s
        // input. Without the flip, `producer` would run first and `consumer`
        // would observe this tick's write instead of last tick's committed
        // value; the reversed edge orders `consumer` before `producer`.
        let mut g = GraphBuilder::new();
        let producer = g.add_core_node("producer");
        let src = g.add_input(producer, "src", Some(Value::num(0.0)));
        let buf = g.add_delay_buffer(producer, "buf", Value::num(-1.0));
        let out = g.add_delay_output(producer, "out", buf);
        g.add_reaction(Reaction::new(producer, "rp").write(buf, Expr::Var(Ref::Port(src)))).unwrap();

        let consumer = g.add_core_node("consumer");
        let inp = g.add_input(consumer, "in", None);
        let result = g.add_output(consumer, "result", None);
        g.add_reaction(Reaction::new(consumer, "rc").emit(result, Expr::Var(Ref::Port(inp)))).unwrap();

        g.add_edge(out, inp);

        let ir = build_ir(g, CompileConfig::default());
        let schedule = build_schedule(&ir);
        let flat: Vec<NodeId> = schedule.blocks.iter().flat_map(|b| b.members.clone()).collect();
        let pos_consumer = flat.iter().position(|&n| n == consumer).unwrap();
        let pos_producer = flat.iter().position(|&n| n == producer).unwrap();
        assert!(pos_consumer < pos_producer);
        assert!(schedule.blocks.iter().all(|b| !b.needs_microstep_loop()));
    }

    #[test]
    fn a_delay_self_loop_does_not_force_a_microstep_block() {
        // A node whose delay output feeds back into its own input (spec.md
        // §8's "Delay self-loop" scenario) carries no same-tick dependency at
        // all, unlike a genuine same-tick self-edge below.
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let inp = g.add_input(n, "x", None);
        let buf = g.add_delay_buffer(n, "buf", Value::num(-1.0));
        let out = g.add_delay_output(n, "out", buf);
        g.add_reaction(Reaction::new(n, "r").write(buf, Expr::Var(Ref::Port(inp)))).unwrap();
        g.add_edge(out, inp);

        let ir = build_ir(g, CompileConfig::default());
        let schedule = build_schedule(&ir);
        assert_eq!(schedule.blocks.len(), 1);
        assert!(!schedule.blocks[0].has_self_edge);
        assert!(!schedule.blocks[0].needs_microstep_loop());
    }

    #[test]
    fn a_genuine_same_tick_self_edge_forces_a_microstep_block() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let inp = g.add_input(n, "in", Some(Value::num(0.0)));
        let out = g.add_output(n, "out", None);
        g.add_reaction(Reaction::new(n, "r").emit(out, Expr::Var(Ref::Port(inp)))).unwrap();
        g.add_edge(out, inp);

        let ir = build_ir(g, CompileConfig::default());
        let schedule = build_schedule(&ir);
        assert_eq!(schedule.blocks.len(), 1);
        assert!(schedule.blocks[0].has_self_edge);
        assert!(schedule.blocks[0].needs_microstep_loop());
    }

    #[test]
    fn no_instant_loop_contract_prevents_scc_grouping() {
        let mut g = GraphBuilder::new();
        let ext = g.add_external_node(
            "ext",
            Contract { no_instant_loop: true, ..Contract::unsafe_opaque() },
        );
        let ext_in = g.add_input(ext, "in", None);
        let ext_out = g.add_output(ext, "out", None);

        let core = g.add_core_node("core");
        let core_in = g.add_input(core, "in", None);
        let core_out = g.add_output(core, "out", None);
        g.add_reaction(Reaction::new(core, "r").emit(core_out, Expr::Var(Ref::Port(core_in)))).unwrap();

        g.add_edge(ext_out, core_in);
        g.add_edge(core_out, ext_in);

        let ir = build_ir(g, CompileConfig::default());
        let schedule = build_schedule(&ir);
        assert!(schedule.blocks.iter().all(|b| b.members.len() == 1 && !b.has_self_edge));
    }

    #[test]
    fn tickwise_mode_treats_a_same_tick_self_edge_like_a_delay() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let inp = g.add_input(n, "in", Some(Value::num(0.0)));
        let out = g.add_output(n, "out", None);
        g.add_reaction(Reaction::new(n, "r").emit(out, Expr::Var(Ref::Port(inp)))).unwrap();
        g.add_edge(out, inp);

        let mut config = CompileConfig::default();
        config.tickwise_mode = true;
        let ir = build_ir(g, config);
        let schedule = build_schedule(&ir);
        assert_eq!(schedule.blocks.len(), 1);
        assert!(!schedule.blocks[0].has_self_edge);
        assert!(!schedule.blocks[0].needs_microstep_loop());
    }
}
