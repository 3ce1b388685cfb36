//! TYPE: best-effort static type checking over dataflow edges.
//!
//! Ports may declare a concrete type name; an edge between two ports that
//! both declare one is checked for a name mismatch. A port with no declared
//! type, or the literal type name `"Any"`, opts out of the check. Because
//! `Value` carries its own runtime tag rather than the graph carrying a
//! static type system, this is a name-equality check over an opt-in
//! annotation, not a type inference pass.

use crate::diagnostic::{DiagnosticSink, Location};
use crate::ir::Ir;

const ANY: &str = "Any";

/// `TYPE001`: an edge's source and destination ports both declare a concrete
/// type name, and the two names differ. Always a warning — it never fails
/// compilation.
pub fn run(ir: &Ir, sink: &mut DiagnosticSink) {
    for edge in ir.edges.values() {
        let from = &ir.ports[edge.from];
        let to = &ir.ports[edge.to];
        let (Some(from_ty), Some(to_ty)) = (from.type_name.as_deref(), to.type_name.as_deref())
        else {
            continue;
        };
        if from_ty == ANY || to_ty == ANY {
            continue;
        }
        if from_ty != to_ty {
            sink.warning(
                "TYPE001",
                format!(
                    "edge from `{}` (type `{from_ty}`) to `{}` (type `{to_ty}`) has mismatched port types",
                    from.name, to.name
                ),
                Location::Port(edge.to),
            );
        }
    }
}
