//! STRUCT: basic well-formedness of ports and edges — the cheapest checks in
//! the pipeline, so they run first, before anything type- or
//! causality-related is attempted.

use std::collections::HashMap;

use crate::diagnostic::{DiagnosticSink, Location};
use crate::graph::{Direction, PortId};
use crate::ir::Ir;

/// `STRUCT001`: an `Input` port has neither a producer edge nor a default —
/// it would be permanently `Absent`, which is a hard compile error, not a
/// warning.
/// `STRUCT002`: an `Input` port has more than one producer edge (fan-in),
/// rejected unconditionally, in every mode.
/// `STRUCT003`: an edge's source port is not an `Output`, or its destination
/// port is not an `Input` — a `GraphBuilder` misuse that cannot arise from
/// `add_edge`'s own signature unless a `PortId` from a different graph was
/// passed in, but checked regardless since `PortId` carries no such
/// guarantee at the type level.
pub fn run(ir: &Ir, sink: &mut DiagnosticSink) {
    let mut producers: HashMap<PortId, usize> = HashMap::new();

    for edge in ir.edges.values() {
        let from = &ir.ports[edge.from];
        let to = &ir.ports[edge.to];
        if from.direction != Direction::Output {
            sink.error(
                "STRUCT003",
                format!("edge source port `{}` is not an Output port", from.name),
                Location::Port(edge.from),
            );
        }
        if to.direction != Direction::Input {
            sink.error(
                "STRUCT003",
                format!("edge destination port `{}` is not an Input port", to.name),
                Location::Port(edge.to),
            );
        }
        *producers.entry(edge.to).or_insert(0) += 1;
    }

    for (port_id, port) in ir.ports.iter() {
        if port.direction != Direction::Input {
            continue;
        }
        let count = producers.get(&port_id).copied().unwrap_or(0);
        if count == 0 && port.default.is_none() {
            sink.error(
                "STRUCT001",
                format!("input port `{}` has neither a producer edge nor a default", port.name),
                Location::Port(port_id),
            );
        } else if count > 1 {
            sink.error(
                "STRUCT002",
                format!("input port `{}` has {count} producer edges; fan-in is not allowed", port.name),
                Location::Port(port_id),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::graph::GraphBuilder;
    use crate::ir::build_ir;

    #[test]
    fn flags_unconnected_input_without_default() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        g.add_input(n, "in", None);
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "STRUCT001"));
        assert!(sink.has_error());
    }

    #[test]
    fn quiet_when_input_has_default() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        g.add_input(n, "in", Some(crate::value::Value::num(0.0)));
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.has_error());
        assert!(sink.iter().next().is_none());
    }

    #[test]
    fn flags_fan_in_on_an_input_port() {
        let mut g = GraphBuilder::new();
        let a = g.add_core_node("a");
        let out1 = g.add_output(a, "out1", None);
        let out2 = g.add_output(a, "out2", None);
        let b = g.add_core_node("b");
        let inp = g.add_input(b, "in", None);
        g.add_edge(out1, inp);
        g.add_edge(out2, inp);
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "STRUCT002"));
        assert!(sink.has_error());
    }

    #[test]
    fn single_producer_is_fine() {
        let mut g = GraphBuilder::new();
        let a = g.add_core_node("a");
        let out = g.add_output(a, "out", None);
        let b = g.add_core_node("b");
        let inp = g.add_input(b, "in", None);
        g.add_edge(out, inp);
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.has_error());
    }
}
