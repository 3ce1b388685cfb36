//! Static analysis passes, run in a fixed order against a frozen `Ir`:
//! structural well-formedness first, then typing, then write-policy
//! conflicts, then the expensive causality/SCC analysis, then the narrower
//! init/non-Zeno/continuous/SDF checks. Each pass only reads diagnostics
//! emitted by earlier passes through the `DiagnosticSink`'s accumulated
//! state, never through shared mutable pass-private state.

pub mod causality;
pub mod continuous;
pub mod init;
pub mod nonzeno;
pub mod sdf;
pub mod structural;
pub mod typecheck;
pub mod write_conflict;

use crate::diagnostic::DiagnosticSink;
use crate::ir::Ir;

/// Runs every static pass against `ir` in pipeline order, accumulating all
/// diagnostics into one sink. `ir` is taken mutably only because
/// `passes::sdf` populates `Ir::firing_counts`; every other pass is
/// read-only.
pub fn run_all(ir: &mut Ir, sink: &mut DiagnosticSink) {
    structural::run(ir, sink);
    typecheck::run(ir, sink);
    write_conflict::run(ir, sink);
    causality::run(ir, sink);
    init::run(ir, sink);
    nonzeno::run(ir, sink);
    continuous::run(ir, sink);
    sdf::run(ir, sink);
}
