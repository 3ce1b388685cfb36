//! CAUS: same-tick causal well-formedness, the core static guarantee of the
//! language (spec.md §4.5).
//!
//! Grounded on `rg_compiler/compiler/passes.py`'s `CausalityPass`
//! (`_tarjan`/`_check_constructive`/`_collect_vars`), generalized from
//! stringly-typed node ids to a typed `DepNode` over this IR's own key
//! types, and reusing the shared `algorithms::{tarjan_scc, kahn_topo_sort}`
//! instead of a bespoke Tarjan implementation.

use std::collections::HashMap;

use crate::algorithms::tarjan_scc;
use crate::diagnostic::{DiagnosticSink, Location};
use crate::expr::Ref;
use crate::graph::{Direction, Effect, NodeId, PortId, ReactionId, VarId};
use crate::interp::{eval_abstract, AbstractEnv};
use crate::ir::Ir;
use crate::value::V3;

/// A node in the same-tick dependency graph: every reaction, port, and
/// variable participates, so delay-free dependencies between node kinds
/// (including the synthetic reactions attached to `External`/`Continuous`
/// nodes) are represented uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepNode {
    Reaction(ReactionId),
    Port(PortId),
    Var(VarId),
}

struct DepGraph {
    nodes: Vec<DepNode>,
    index_of: HashMap<DepNode, usize>,
    edges: Vec<Vec<usize>>,
}

impl DepGraph {
    fn build(ir: &Ir) -> Self {
        let mut nodes = Vec::new();
        let mut index_of = HashMap::new();
        let mut push = |n: DepNode, nodes: &mut Vec<DepNode>, index_of: &mut HashMap<DepNode, usize>| {
            *index_of.entry(n).or_insert_with(|| {
                nodes.push(n);
                nodes.len() - 1
            })
        };

        for (id, _) in ir.reactions.iter() {
            push(DepNode::Reaction(id), &mut nodes, &mut index_of);
        }
        for (id, _) in ir.ports.iter() {
            push(DepNode::Port(id), &mut nodes, &mut index_of);
        }
        for (id, _) in ir.variables.iter() {
            push(DepNode::Var(id), &mut nodes, &mut index_of);
        }

        let mut edges = vec![Vec::new(); nodes.len()];
        let mut add_edge = |from: DepNode, to: DepNode, index_of: &HashMap<DepNode, usize>, edges: &mut Vec<Vec<usize>>| {
            let (fi, ti) = (index_of[&from], index_of[&to]);
            edges[fi].push(ti);
        };

        // Reaction reads -> Reaction, except a read of a delay-buffer
        // variable: by the time `lower_delays` has run, such a read is a
        // plain `Var`, not a surviving `Delay` node, but it is still
        // satisfied from the previous tick's commit and so is not a
        // same-tick dependency edge.
        for (reaction_id, reaction) in ir.reactions.iter() {
            let mut reads: Vec<Ref> = reaction.extra_reads.clone();
            for effect in &reaction.effects {
                let expr = match effect {
                    Effect::Emit { value, .. } => value,
                    Effect::Write { value, .. } => value,
                };
                expr.free_vars_same_tick(&mut reads);
            }
            for r in reads {
                if let Ref::Var(v) = r {
                    if ir.variables[v].is_delay_buffer {
                        continue;
                    }
                }
                let dep = match r {
                    Ref::Port(p) => DepNode::Port(p),
                    Ref::Var(v) => DepNode::Var(v),
                };
                add_edge(dep, DepNode::Reaction(reaction_id), &index_of, &mut edges);
            }
            for effect in &reaction.effects {
                match effect {
                    Effect::Emit { port, .. } => {
                        add_edge(DepNode::Reaction(reaction_id), DepNode::Port(*port), &index_of, &mut edges)
                    }
                    Effect::Write { var, .. } => {
                        add_edge(DepNode::Reaction(reaction_id), DepNode::Var(*var), &index_of, &mut edges)
                    }
                }
            }
            // A synthetic reaction's node outputs are produced once its read
            // set settles; wire Reaction -> each output port of its node.
            if reaction.extra_reads.is_empty() {
                continue;
            }
            for port in ir.ports_of(reaction.node, Direction::Output) {
                add_edge(DepNode::Reaction(reaction_id), DepNode::Port(port), &index_of, &mut edges);
            }
        }

        // Dataflow edges: Port(from) -> Port(to), unless `from` is a
        // delay-backed output, whose value is available before the tick
        // begins and so creates no same-tick dependency (spec.md §4.6). In
        // `tickwise_mode` every edge behaves this way (SPEC_FULL.md §6,
        // resolved Open Question): the consumer only ever observes the
        // producer's previous-tick value, so no edge can anchor a same-tick
        // cycle either.
        for edge in ir.edges.values() {
            let from_port = &ir.ports[edge.from];
            if from_port.is_delay_output.is_some() || ir.config.tickwise_mode {
                continue;
            }
            add_edge(DepNode::Port(edge.from), DepNode::Port(edge.to), &index_of, &mut edges);
        }

        Self { nodes, index_of, edges }
    }
}

/// Abstract environment used by the constructive check: every `DepNode`'s
/// current abstract value within one SCC's fixed-point iteration.
struct SccEnv {
    state: HashMap<DepNode, V3>,
}
impl AbstractEnv for SccEnv {
    fn read_abstract(&self, r: Ref) -> V3 {
        let node = match r {
            Ref::Port(p) => DepNode::Port(p),
            Ref::Var(v) => DepNode::Var(v),
        };
        self.state.get(&node).cloned().unwrap_or(V3::Bottom)
    }
}

/// `CAUS001`: a same-tick dependency cycle involves an opaque `External`
/// node; the compiler cannot prove termination of algebraic loops through
/// foreign code (spec.md §4.5 bullet 1).
/// `CAUS002`: a same-tick self-loop on a non-`Core` node (only `Core`
/// reactions are eligible for the constructive check at all).
/// `CAUS003`: a same-tick cycle is not constructive: the three-valued
/// fixed-point does not reach a single `Present` for every member within the
/// SCC's `1 + Σheight_bound` iteration budget (spec.md Testable Property 4),
/// or two members conflict on distinct `Present` values. This is the failure
/// spec.md §4.5 calls out as unsound and must reject.
/// `CAUS004`: a same-tick cycle touches a state variable whose write policy
/// is not monotone, which breaks the constructive check's soundness outright
/// (spec.md §4.5 bullet 2).
pub fn run(ir: &Ir, sink: &mut DiagnosticSink) {
    let graph = DepGraph::build(ir);
    let n = graph.nodes.len();
    let scc_of = tarjan_scc(n, &graph.edges);

    let mut members_by_scc: HashMap<usize, Vec<usize>> = HashMap::new();
    for (idx, &scc) in scc_of.iter().enumerate() {
        members_by_scc.entry(scc).or_default().push(idx);
    }

    /// Fallback budget for an SCC touching an unbounded-height policy
    /// (`Policy::Sum`), which has no finite `height_bound`.
    const UNBOUNDED_SCC_BUDGET: usize = 20;

    let mut scc_ids: Vec<usize> = members_by_scc.keys().copied().collect();
    scc_ids.sort_unstable();

    for scc_id in scc_ids {
        let members = &members_by_scc[&scc_id];
        let has_self_edge = members.iter().any(|&m| graph.edges[m].contains(&m));
        let is_real_cycle = members.len() > 1 || has_self_edge;
        if !is_real_cycle {
            continue;
        }

        let reaction_members: Vec<ReactionId> = members
            .iter()
            .filter_map(|&m| match graph.nodes[m] {
                DepNode::Reaction(r) => Some(r),
                _ => None,
            })
            .collect();

        // Bullet 1: any reaction belonging to an `External` node makes the
        // cycle's termination unprovable (the compiler cannot see inside its
        // step). CAUS001.
        let involves_external = reaction_members
            .iter()
            .any(|&r| matches!(ir.nodes[ir.reactions[r].node], crate::graph::NodeKind::External(_)));
        if involves_external {
            sink.error(
                "CAUS001",
                "same-tick dependency cycle involves an opaque External node; termination cannot be proven",
                Location::Scc(scc_id),
            );
            continue;
        }

        // A same-tick self-loop on a non-`Core` node (a `Continuous` node's
        // synthetic reaction looping on itself) is a flat error regardless
        // of monotonicity or declared rank: only `Core` reactions are
        // eligible for the constructive check at all.
        if members.len() == 1 && has_self_edge {
            let non_core = reaction_members
                .iter()
                .any(|&r| !matches!(ir.nodes[ir.reactions[r].node], crate::graph::NodeKind::Core));
            if non_core {
                sink.error(
                    "CAUS002",
                    "a non-Core node cannot participate in a same-tick self-loop",
                    Location::Scc(scc_id),
                );
                continue;
            }
        }

        // Bullet 2: touching a non-monotone state variable breaks the
        // constructive check's soundness regardless of iteration budget.
        // CAUS004.
        let touches_non_monotone_var = members.iter().any(|&m| match graph.nodes[m] {
            DepNode::Var(v) => !ir.variables[v].policy.is_monotone(),
            _ => false,
        });
        if touches_non_monotone_var {
            sink.error(
                "CAUS004",
                "same-tick dependency cycle touches a state variable whose write policy is not monotone",
                Location::Scc(scc_id),
            );
            continue;
        }

        // Bullet 3: a declared non-Zeno rank on any member reaction is the
        // author's certificate that repeated firing terminates; accept
        // without running the constructive check.
        let has_declared_rank = reaction_members.iter().any(|&r| ir.reactions[r].nonzeno_rank.is_some());
        if has_declared_rank {
            continue;
        }

        // Bullet 4: the constructive check. Every SCC member starts at
        // `Bottom` and must reach `Present` within the iteration budget; a
        // genuine value conflict is as much a failure as non-termination.
        // The budget is `1 + Σheight_bound` over every state variable
        // written within this SCC (spec.md Testable Property 4), or
        // `UNBOUNDED_SCC_BUDGET` if any participating policy's height is
        // unbounded (`Policy::Sum`) — a fixed per-tick cap, independent of
        // the user-configurable `max_microsteps` runtime budget.
        let budget = 1 + members
            .iter()
            .filter_map(|&m| match graph.nodes[m] {
                DepNode::Var(v) => Some(ir.variables[v].policy.height_bound()),
                _ => None,
            })
            .try_fold(0usize, |acc, bound| bound.map(|b| acc + b))
            .unwrap_or(UNBOUNDED_SCC_BUDGET - 1);

        let mut env = SccEnv {
            state: members.iter().map(|&m| (graph.nodes[m], V3::Bottom)).collect(),
        };

        let mut converged = false;
        let mut conflict = false;
        for _ in 0..budget {
            let mut changed = false;
            for &m in members {
                let new_value = match graph.nodes[m] {
                    DepNode::Reaction(r) => eval_reaction_abstract(ir, r, &env),
                    DepNode::Port(_) | DepNode::Var(_) => {
                        // Ports/vars take the join of every in-edge source
                        // that is itself an SCC member; non-member producers
                        // have already been resolved outside this SCC.
                        join_incoming(&graph, m, &env)
                    }
                };
                let node = graph.nodes[m];
                let current = env.state.get(&node).cloned().unwrap_or(V3::Bottom);
                match current.join(&new_value) {
                    Ok(joined) => {
                        if joined != current {
                            changed = true;
                        }
                        env.state.insert(node, joined);
                    }
                    Err(_) => {
                        conflict = true;
                    }
                }
            }
            if conflict {
                break;
            }
            if !changed {
                converged = members.iter().all(|&m| {
                    env.state.get(&graph.nodes[m]).map(V3::is_present).unwrap_or(false)
                });
                break;
            }
        }

        if conflict || !converged {
            sink.error(
                "CAUS003",
                format!(
                    "same-tick dependency cycle is not constructive: values did not all settle to a single Present within {budget} iterations"
                ),
                Location::Scc(scc_id),
            );
        }
    }
}

fn join_incoming(graph: &DepGraph, idx: usize, env: &SccEnv) -> V3 {
    let node = graph.nodes[idx];
    let mut acc = V3::Bottom;
    for (src_idx, succs) in graph.edges.iter().enumerate() {
        if succs.contains(&idx) {
            let src = graph.nodes[src_idx];
            let v = env.state.get(&src).cloned().unwrap_or(V3::Bottom);
            acc = acc.join(&v).unwrap_or(acc);
        }
    }
    let _ = node;
    acc
}

fn eval_reaction_abstract(ir: &Ir, reaction_id: ReactionId, env: &SccEnv) -> V3 {
    let reaction = &ir.reactions[reaction_id];
    if !reaction.extra_reads.is_empty() {
        // Synthetic reaction: Present once every read is Present.
        return reaction
            .extra_reads
            .iter()
            .map(|r| env.read_abstract(*r))
            .try_fold(V3::Present(crate::value::Value::Absent), |acc, v| acc.join(&v))
            .unwrap_or(V3::Bottom);
    }
    // A user reaction is Present as a whole once every effect's expression
    // is Present; fold with join (any Bottom/conflict keeps it unsettled).
    reaction
        .effects
        .iter()
        .map(|effect| {
            let expr = match effect {
                Effect::Emit { value, .. } => value,
                Effect::Write { value, .. } => value,
            };
            eval_abstract(expr, env)
        })
        .try_fold(V3::Present(crate::value::Value::Absent), |acc, v| acc.join(&v))
        .unwrap_or(V3::Bottom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::expr::{Expr, Ref};
    use crate::graph::{GraphBuilder, Reaction};
    use crate::ir::build_ir;
    use crate::value::Value;

    #[test]
    fn acyclic_linear_chain_has_no_cycle_diagnostics() {
        let mut g = GraphBuilder::new();
        let a = g.add_core_node("a");
        let out_a = g.add_output(a, "out", None);
        g.add_reaction(Reaction::new(a, "ra").emit(out_a, Expr::Const(Value::num(1.0)))).unwrap();

        let b = g.add_core_node("b");
        let in_b = g.add_input(b, "in", None);
        let out_b = g.add_output(b, "out", None);
        g.add_edge(out_a, in_b);
        g.add_reaction(
            Reaction::new(b, "rb").emit(out_b, Expr::Var(Ref::Port(in_b))),
        )
        .unwrap();

        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.iter().any(|d| d.code.starts_with("CAUS")));
    }

    #[test]
    fn instantaneous_self_loop_is_flagged_non_constructive() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let inp = g.add_input(n, "in", None);
        let out = g.add_output(n, "out", None);
        g.add_edge(out, inp);
        g.add_reaction(Reaction::new(n, "r").emit(out, Expr::Var(Ref::Port(inp)))).unwrap();

        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.has_error());
        assert!(sink.iter().any(|d| d.code == "CAUS003"));
    }

    #[test]
    fn delay_guarded_accumulator_has_no_same_tick_cycle() {
        use crate::expr::BinOp;
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let inp = g.add_input(n, "in", Some(Value::num(0.0)));
        let v = g.add_state(n, "count", Value::num(0.0), crate::policy::Policy::Error);
        g.add_reaction(Reaction::new(n, "r").write(
            v,
            Expr::BinOp(
                BinOp::Add,
                Box::new(Expr::Delay(
                    Box::new(Expr::Var(Ref::Port(inp))),
                    Box::new(Expr::Const(Value::num(0.0))),
                )),
                Box::new(Expr::Const(Value::num(1.0))),
            ),
        ))
        .unwrap();

        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.iter().any(|d| d.code == "CAUS003"));
        assert!(!sink.iter().any(|d| d.code == "CAUS002"));
    }
}
