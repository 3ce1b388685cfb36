//! CT: static sanity checks for `Continuous` nodes' port surface, run before
//! any integration is attempted at runtime.
//!
//! Grounded on `regelum/core/hybrid_adapters.py`'s `ContinuousWrapper`, which
//! always exposes a `dt` input with a positive default and `state`/`y`
//! outputs — the fixed interface the runtime's integrator relies on. The
//! derivative-key and `max_step` checks `regelum/core/continuous.py` makes
//! are runtime concerns (they depend on values observed during a step, not
//! on the static port shape) and live in the runtime crate instead.

use crate::diagnostic::{DiagnosticSink, Location};
use crate::graph::{Direction, NodeKind};
use crate::ir::Ir;
use crate::value::Value;

/// `CT001`: a `Continuous` node has no `dt` input port.
/// `CT002`: a `Continuous` node's `dt` input port has no default, or its
/// default is not a positive number.
/// `CT003`: a `Continuous` node is missing its `state` or `y` output port.
pub fn run(ir: &Ir, sink: &mut DiagnosticSink) {
    for (node_id, node) in ir.nodes.iter() {
        if !matches!(node, NodeKind::Continuous(_)) {
            continue;
        }

        let ports: Vec<_> = ir
            .ports
            .iter()
            .filter(|(_, p)| p.node == node_id)
            .collect();

        let dt_port = ports.iter().find(|(_, p)| p.direction == Direction::Input && p.name == "dt");
        match dt_port {
            None => {
                sink.error("CT001", "continuous node has no `dt` input port", Location::Node(node_id));
            }
            Some((_, port)) => match &port.default {
                Some(Value::Number(n)) if *n > 0.0 => {}
                _ => {
                    sink.error(
                        "CT002",
                        "continuous node's `dt` input must default to a positive number",
                        Location::Node(node_id),
                    );
                }
            },
        }

        let has_state_output =
            ports.iter().any(|(_, p)| p.direction == Direction::Output && p.name == "state");
        let has_y_output = ports.iter().any(|(_, p)| p.direction == Direction::Output && p.name == "y");
        if !has_state_output || !has_y_output {
            sink.error(
                "CT003",
                "continuous node must expose `state` and `y` output ports",
                Location::Node(node_id),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::graph::{ContinuousSpec, GraphBuilder, Integrator};
    use crate::ir::build_ir;

    #[test]
    fn flags_missing_dt_port() {
        let mut g = GraphBuilder::new();
        let c = g.add_continuous_node(
            "c",
            ContinuousSpec { integrator: Integrator::Euler, max_step: 0.01, derivative_keys: vec!["x".into()], hybrid_held_u: None },
        );
        g.add_output(c, "state", None);
        g.add_output(c, "y", None);
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "CT001"));
    }

    #[test]
    fn flags_non_positive_dt_default() {
        let mut g = GraphBuilder::new();
        let c = g.add_continuous_node(
            "c",
            ContinuousSpec { integrator: Integrator::Euler, max_step: 0.01, derivative_keys: vec!["x".into()], hybrid_held_u: None },
        );
        g.add_input(c, "dt", Some(Value::num(0.0)));
        g.add_output(c, "state", None);
        g.add_output(c, "y", None);
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "CT002"));
    }

    #[test]
    fn flags_missing_state_or_y_output() {
        let mut g = GraphBuilder::new();
        let c = g.add_continuous_node(
            "c",
            ContinuousSpec { integrator: Integrator::Rk4, max_step: 0.01, derivative_keys: vec!["x".into()], hybrid_held_u: None },
        );
        g.add_input(c, "dt", Some(Value::num(0.01)));
        g.add_output(c, "state", None);
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "CT003"));
    }

    #[test]
    fn well_formed_continuous_node_is_quiet() {
        let mut g = GraphBuilder::new();
        let c = g.add_continuous_node(
            "c",
            ContinuousSpec { integrator: Integrator::Rk4, max_step: 0.01, derivative_keys: vec!["x".into()], hybrid_held_u: None },
        );
        g.add_input(c, "dt", Some(Value::num(0.01)));
        g.add_output(c, "state", None);
        g.add_output(c, "y", None);
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.has_error());
    }
}
