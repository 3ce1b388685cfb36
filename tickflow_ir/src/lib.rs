//! Intermediate representation, expression DSL, interpreter, and static
//! analysis passes for the tickflow synchronous reactive dataflow compiler.
//!
//! A program is assembled with `graph::GraphBuilder`, frozen into an `ir::Ir`
//! by `ir::build_ir`, and checked by `compile`, which runs every pass in
//! `passes` and reports whether the graph is admissible. `tickflow_rt`
//! consumes the resulting `ir::Ir` to actually run it.

pub mod algorithms;
pub mod config;
pub mod diagnostic;
pub mod expr;
pub mod graph;
pub mod interp;
pub mod ir;
pub mod passes;
pub mod policy;
pub mod value;

use diagnostic::{Diagnostic, DiagnosticSink};
use ir::Ir;

/// The outcome of compiling a `GraphBuilder`: the frozen `Ir` (always
/// returned, even on failure, so a caller can inspect what was built) plus
/// every diagnostic collected and whether any of them was an `Error`. Passes
/// that behave differently under `config.mode` (`write_conflict`, `init`)
/// decide their own `Error`-vs-`Warning` level internally; `compile` does not
/// apply any blanket escalation on top of that.
#[derive(Debug)]
pub struct CompileResult {
    pub ir: Ir,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
}

/// Freezes `builder` and runs every static pass against it. Grounded on the
/// original `rg_compiler` top-level `compile()` entry point, which always
/// runs every pass and returns an aggregate result rather than
/// short-circuiting on the first failing pass — callers see every problem in
/// one report instead of a single error at a time.
pub fn compile(builder: graph::GraphBuilder, config: config::CompileConfig) -> CompileResult {
    let mut ir = ir::build_ir(builder, config);
    let mut sink = DiagnosticSink::new();
    passes::run_all(&mut ir, &mut sink);

    let diagnostics = sink.into_vec();
    let success = !diagnostics.iter().any(|d| d.level == diagnostic::Level::Error);

    CompileResult { ir, diagnostics, success }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::expr::{Expr, Ref};
    use crate::graph::{GraphBuilder, Reaction};
    use crate::value::Value;

    #[test]
    fn compiles_a_linear_chain_successfully() {
        let mut g = GraphBuilder::new();
        let a = g.add_core_node("a");
        let out_a = g.add_output(a, "out", None);
        g.add_reaction(Reaction::new(a, "ra").emit(out_a, Expr::Const(Value::num(1.0)))).unwrap();

        let b = g.add_core_node("b");
        let in_b = g.add_input(b, "in", None);
        g.add_edge(out_a, in_b);

        let result = compile(g, CompileConfig::default());
        assert!(result.success, "{:?}", result.diagnostics);
    }

    #[test]
    fn strict_mode_rejects_a_variable_with_no_initial_value() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        g.add_state(n, "v", Value::Absent, crate::policy::Policy::Error);
        let config = CompileConfig { mode: config::Mode::Strict, ..CompileConfig::default() };
        let result = compile(g, config);
        assert!(!result.success);
        assert!(result.diagnostics.iter().any(|d| d.code == "INIT001" && d.level == diagnostic::Level::Error));
    }

    #[test]
    fn pragmatic_mode_allows_a_variable_with_no_initial_value() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        g.add_state(n, "v", Value::Absent, crate::policy::Policy::Error);
        let result = compile(g, CompileConfig::default());
        assert!(result.success, "{:?}", result.diagnostics);
    }

    #[test]
    fn non_constructive_cycle_fails_compilation() {
        let mut g = GraphBuilder::new();
        let n = g.add_core_node("n");
        let inp = g.add_input(n, "in", None);
        let out = g.add_output(n, "out", None);
        g.add_edge(out, inp);
        g.add_reaction(Reaction::new(n, "r").emit(out, Expr::Var(Ref::Port(inp)))).unwrap();

        let result = compile(g, CompileConfig::default());
        assert!(!result.success);
        assert!(result.diagnostics.iter().any(|d| d.code == "CAUS003"));
    }
}
