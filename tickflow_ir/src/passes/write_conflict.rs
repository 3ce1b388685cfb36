//! WRITE: static detection of write-policy violations that are visible
//! without running the program.
//!
//! This is necessarily conservative: whether two reactions that both write a
//! `Policy::Error` variable are ever simultaneously live in the same tick is
//! an SCC-scheduling question the static pass cannot decide in general — the
//! actual conflict is only certain, and raised, at runtime. The static pass
//! instead flags the *possibility*.

use std::collections::HashMap;

use crate::config::Mode;
use crate::diagnostic::{DiagnosticSink, Location};
use crate::graph::{Effect, VarId};
use crate::ir::Ir;
use crate::policy::Policy;

/// `WRITE001`: more than one reaction may write a `Policy::Error` variable.
/// Unconditionally an error, not gated by `mode`, unlike `WRITE002`.
/// `WRITE002`: more than one reaction may write a `Policy::Lww` variable: an
/// error in `Mode::Strict`, a warning in `Mode::Pragmatic`.
pub fn run(ir: &Ir, sink: &mut DiagnosticSink) {
    let mut writers: HashMap<VarId, Vec<crate::graph::ReactionId>> = HashMap::new();
    for (reaction_id, reaction) in ir.reactions.iter() {
        for effect in &reaction.effects {
            if let Effect::Write { var, .. } = effect {
                writers.entry(*var).or_default().push(reaction_id);
            }
        }
    }

    for (var_id, reaction_ids) in writers {
        if reaction_ids.len() < 2 {
            continue;
        }
        let var = &ir.variables[var_id];
        match var.policy {
            Policy::Error => {
                sink.error(
                    "WRITE001",
                    format!(
                        "variable `{}` has an ErrorPolicy but {} reactions may write it; at most one may be live per tick",
                        var.name,
                        reaction_ids.len()
                    ),
                    Location::Variable(var_id),
                );
            }
            Policy::Lww => {
                let message = format!(
                    "variable `{}` has an LwwPolicy with {} potential writers; ensure distinct priorities are supplied at each write site",
                    var.name,
                    reaction_ids.len()
                );
                if ir.config.mode == Mode::Strict {
                    sink.error("WRITE002", message, Location::Variable(var_id));
                } else {
                    sink.warning("WRITE002", message, Location::Variable(var_id));
                }
            }
            Policy::Sum => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::expr::Expr;
    use crate::graph::{GraphBuilder, Reaction};
    use crate::ir::build_ir;
    use crate::value::Value;

    #[test]
    fn flags_two_writers_of_error_policy_variable() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let v = g.add_state(n, "v", Value::num(0.0), Policy::Error);
        g.add_reaction(Reaction::new(n, "a").write(v, Expr::Const(Value::num(1.0)))).unwrap();
        g.add_reaction(Reaction::new(n, "b").write(v, Expr::Const(Value::num(2.0)))).unwrap();
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.iter().any(|d| d.code == "WRITE001"));
    }

    #[test]
    fn sum_policy_multiple_writers_is_fine() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let v = g.add_state(n, "v", Value::num(0.0), Policy::Sum);
        g.add_reaction(Reaction::new(n, "a").write(v, Expr::Const(Value::num(1.0)))).unwrap();
        g.add_reaction(Reaction::new(n, "b").write(v, Expr::Const(Value::num(2.0)))).unwrap();
        let ir = build_ir(g, CompileConfig::default());
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.iter().any(|d| d.code == "WRITE001"));
    }

    #[test]
    fn error_policy_multiwriter_is_an_error_even_in_pragmatic_mode() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let v = g.add_state(n, "v", Value::num(0.0), Policy::Error);
        g.add_reaction(Reaction::new(n, "a").write(v, Expr::Const(Value::num(1.0)))).unwrap();
        g.add_reaction(Reaction::new(n, "b").write(v, Expr::Const(Value::num(2.0)))).unwrap();
        let config = CompileConfig { mode: crate::config::Mode::Pragmatic, ..CompileConfig::default() };
        let ir = build_ir(g, config);
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.has_error());
    }

    #[test]
    fn lww_multiwriter_is_only_a_warning_in_pragmatic_mode() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let v = g.add_state(n, "v", Value::num(0.0), Policy::Lww);
        g.add_reaction(Reaction::new(n, "a").write(v, Expr::Const(Value::num(1.0)))).unwrap();
        g.add_reaction(Reaction::new(n, "b").write(v, Expr::Const(Value::num(2.0)))).unwrap();
        let config = CompileConfig { mode: crate::config::Mode::Pragmatic, ..CompileConfig::default() };
        let ir = build_ir(g, config);
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(!sink.has_error());
        assert!(sink.iter().any(|d| d.code == "WRITE002"));
    }

    #[test]
    fn lww_multiwriter_is_an_error_in_strict_mode() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let v = g.add_state(n, "v", Value::num(0.0), Policy::Lww);
        g.add_reaction(Reaction::new(n, "a").write(v, Expr::Const(Value::num(1.0)))).unwrap();
        g.add_reaction(Reaction::new(n, "b").write(v, Expr::Const(Value::num(2.0)))).unwrap();
        let config = CompileConfig { mode: crate::config::Mode::Strict, ..CompileConfig::default() };
        let ir = build_ir(g, config);
        let mut sink = DiagnosticSink::new();
        run(&ir, &mut sink);
        assert!(sink.has_error());
    }
}
