//! SDF: synchronous dataflow rate-balance checking and firing-count
//! computation for multi-rate edges (spec.md §4.7; export per SPEC_FULL.md
//! §4.14).
//!
//! Grounded on the original `rg_compiler/compiler/passes_sdf.py`'s balance
//! equation solver: every edge with both endpoints rate-annotated imposes
//! `firings(producer) * rate(from) == firings(consumer) * rate(to)`; this
//! pass propagates a consistent integer firing count to every node reachable
//! from a rate-annotated edge, or reports `SDF001` if no consistent integer
//! solution exists.

use std::collections::HashMap;

use crate::diagnostic::{DiagnosticSink, Location};
use crate::graph::NodeId;
use crate::ir::Ir;

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        0
    } else {
        (a / gcd(a, b)).abs() * b.abs()
    }
}

/// A rational multiplier relative to an arbitrary root node's firing count,
/// kept reduced to lowest terms.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rational {
    num: i64,
    den: i64,
}
impl Rational {
    fn new(num: i64, den: i64) -> Self {
        let g = gcd(num, den).max(1);
        let sign = if den < 0 { -1 } else { 1 };
        Rational { num: sign * num / g, den: sign * den / g }
    }
    fn one() -> Self {
        Rational { num: 1, den: 1 }
    }
    fn mul(self, other: Rational) -> Self {
        Rational::new(self.num * other.num, self.den * other.den)
    }
}

/// `SDF001`: a rate-annotated dataflow subgraph has no consistent integer
/// firing-count assignment (e.g. an edge chain with rates 2 and 3 forming a
/// cycle that would require a non-integer ratio to balance, or two edges
/// into the same node disagreeing on its relative firing count).
/// `SDF002`: the balanced firing counts are not all `1`; the runtime's
/// single-clock scheduler ticks every node exactly once per tick, so a
/// multi-rate schedule here requires an execution strategy this compiler
/// does not provide.
pub fn run(ir: &mut Ir, sink: &mut DiagnosticSink) {
    let mut ratio: HashMap<NodeId, Rational> = HashMap::new();
    let mut conflicted = std::collections::HashSet::new();

    // Build an undirected multigraph of rate constraints and propagate a
    // ratio to every connected node via BFS, starting each unvisited
    // component at ratio 1.
    let mut adjacency: HashMap<NodeId, Vec<(NodeId, Rational)>> = HashMap::new();
    for edge in ir.edges.values() {
        let from_port = &ir.ports[edge.from];
        let to_port = &ir.ports[edge.to];
        let (Some(r_from), Some(r_to)) = (from_port.rate, to_port.rate) else { continue };
        if r_from == 0 || r_to == 0 {
            continue;
        }
        // firings(from_node) * r_from == firings(to_node) * r_to
        // => firings(to_node) = firings(from_node) * r_from / r_to
        let fwd = Rational::new(r_from, r_to);
        let bwd = Rational::new(r_to, r_from);
        adjacency.entry(from_port.node).or_default().push((to_port.node, fwd));
        adjacency.entry(to_port.node).or_default().push((from_port.node, bwd));
    }

    for &start in adjacency.keys().collect::<Vec<_>>() {
        if ratio.contains_key(&start) {
            continue;
        }
        ratio.insert(start, Rational::one());
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(start);
        while let Some(u) = queue.pop_front() {
            let u_ratio = ratio[&u];
            for &(v, factor) in adjacency.get(&u).into_iter().flatten() {
                let expected = u_ratio.mul(factor);
                match ratio.get(&v) {
                    None => {
                        ratio.insert(v, expected);
                        queue.push_back(v);
                    }
                    Some(&existing) => {
                        if existing != expected {
                            conflicted.insert(start);
                        }
                    }
                }
            }
        }
    }

    if !conflicted.is_empty() {
        sink.error(
            "SDF001",
            "rate-annotated edges have no consistent integer firing-count assignment",
            Location::Global,
        );
        return;
    }

    if ratio.is_empty() {
        return;
    }

    // Scale every ratio's denominator to a common multiple so every firing
    // count is a positive integer.
    let common_den = ratio.values().fold(1i64, |acc, r| lcm(acc, r.den));
    for (&node, r) in &ratio {
        let count = (r.num * (common_den / r.den)).unsigned_abs();
        ir.firing_counts.insert(node, count);
    }

    if ir.firing_counts.values().any(|&count| count != 1) {
        sink.warning(
            "SDF002",
            "balanced firing counts are not all 1; a multi-rate schedule is required but the single-clock runtime assumes one firing per tick",
            Location::Global,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::graph::GraphBuilder;
    use crate::ir::build_ir;

    #[test]
    fn balances_simple_rate_chain() {
        let mut g = GraphBuilder::new();
        let a = g.add_core_node("a");
        let out = g.add_output(a, "out", None);
        let b = g.add_core_node("b");
        let inp = g.add_input(b, "in", None);
        g.add_edge(out, inp);
        g.set_port_rate(out, 2);
        g.set_port_rate(inp, 1);
        let mut ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&mut ir, &mut sink);
        assert!(!sink.has_error());
        assert_eq!(ir.firing_counts[&a] * 2, ir.firing_counts[&b] * 1);
        assert!(sink.iter().any(|d| d.code == "SDF002"));
    }

    #[test]
    fn inconsistent_two_cycle_rates_emit_sdf001() {
        // spec.md §8 "SDF inconsistency": A (in:1, out:2) and B (in:1, out:1)
        // wired in a 2-cycle admit no consistent integer firing-count
        // assignment — walking one way around the cycle demands a different
        // ratio than walking the other.
        let mut g = GraphBuilder::new();
        let a = g.add_core_node("a");
        let a_in = g.add_input(a, "in", None);
        let a_out = g.add_output(a, "out", None);
        let b = g.add_core_node("b");
        let b_in = g.add_input(b, "in", None);
        let b_out = g.add_output(b, "out", None);

        g.add_edge(a_out, b_in);
        g.add_edge(b_out, a_in);
        g.set_port_rate(a_in, 1);
        g.set_port_rate(a_out, 2);
        g.set_port_rate(b_in, 1);
        g.set_port_rate(b_out, 1);

        let mut ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&mut ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "SDF001" && d.level == crate::diagnostic::Level::Error));
    }

    #[test]
    fn unrated_graph_is_quiet() {
        let mut g = GraphBuilder::new();
        let a = g.add_core_node("a");
        let out = g.add_output(a, "out", None);
        let b = g.add_core_node("b");
        let inp = g.add_input(b, "in", None);
        g.add_edge(out, inp);
        let mut ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&mut ir, &mut sink);
        assert!(sink.iter().next().is_none());
    }
}
