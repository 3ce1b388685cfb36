//! INIT: every state variable must have a usable value before the first
//! tick runs.
//!
//! Grounded on `rg_compiler/compiler/passes.py`'s `InitPass`. Spec.md §4.5:
//! in `Mode::Strict`, a variable with no initial value is an error; delay
//! buffers lacking an explicit default are held to the same rule, since a
//! delay buffer's `init` field *is* its default. `Mode::Pragmatic` leaves
//! this unchecked — an absent-init variable is then only a problem once
//! something actually reads it, which is the runtime's concern.

use crate::config::Mode;
use crate::diagnostic::{DiagnosticSink, Location};
use crate::ir::Ir;
use crate::value::Value;

/// `INIT001`: in `Mode::Strict`, a state variable's `init` is `Value::Absent`.
/// `INIT002`: in `Mode::Strict`, a delay buffer's `init` (its default) is
/// `Value::Absent`. Reported separately from `INIT001` so the message can
/// name the delay-buffer role explicitly, even though both check the same
/// field.
pub fn run(ir: &Ir, sink: &mut DiagnosticSink) {
    if ir.config.mode != Mode::Strict {
        return;
    }

    for (var_id, var) in ir.variables.iter() {
        if !matches!(var.init, Value::Absent) {
            continue;
        }
        if var.is_delay_buffer {
            sink.error(
                "INIT002",
                format!("delay buffer `{}` has no explicit default", var.name),
                Location::Variable(var_id),
            );
        } else {
            sink.error(
                "INIT001",
                format!("variable `{}` has no initial value", var.name),
                Location::Variable(var_id),
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
    use crate::policy::Policy;

    #[test]
    fn flags_absent_init_in_strict_mode() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        g.add_state(n, "v", Value::Absent, Policy::Error);
        let config = CompileConfig { mode: Mode::Strict, ..CompileConfig::default() };
        let ir = build_ir(g, config);
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "INIT001"));
    }

    #[test]
    fn quiet_on_absent_init_in_pragmatic_mode() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        g.add_state(n, "v", Value::Absent, Policy::Error);
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.has_error());
    }

    #[test]
    fn flags_delay_buffer_without_default_in_strict_mode() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        g.add_delay_buffer(n, "buf", Value::Absent);
        let config = CompileConfig { mode: Mode::Strict, ..CompileConfig::default() };
        let ir = build_ir(g, config);
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "INIT002"));
    }

    #[test]
    fn quiet_when_init_is_concrete() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        g.add_state(n, "v", Value::num(0.0), Policy::Error);
        let config = CompileConfig { mode: Mode::Strict, ..CompileConfig::default() };
        let ir = build_ir(g, config);
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.has_error());
    }
}
