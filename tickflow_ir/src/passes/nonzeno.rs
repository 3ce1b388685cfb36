//! ZEN: compile-time rejection of the one instantaneous-self-dependency
//! shape the causality pass cannot phrase as a graph cycle on its own: a
//! reaction writing a variable from an expression that reads that same
//! variable within the same tick, unprotected by `Delay`.
//!
//! This is in fact already caught by `passes::causality` as a same-tick
//! cycle through `DepNode::Var`/`DepNode::Reaction`, so `ZEN001` here is
//! reported at `Warning` (a more specific, friendlier diagnosis of the same
//! underlying non-constructive shape) rather than duplicating the hard
//! error. Grounded on the original `rg_compiler`'s `NonZenoPass`, which in
//! the original is a stub (`# TODO: implement full non-Zeno analysis`); this
//! completes it for the one concrete shape the spec calls out, per §8.1:
//! cross-tick accumulation through a `Delay`-guarded read-back must NOT trip
//! this pass.

use crate::diagnostic::{DiagnosticSink, Location};
use crate::expr::Ref;
use crate::graph::Effect;
use crate::ir::Ir;

/// `ZEN001`: a `Write { var, value }` effect whose `value` reads `var`
/// itself through a same-tick (non-`Delay`) path.
pub fn run(ir: &Ir, sink: &mut DiagnosticSink) {
    for (reaction_id, reaction) in ir.reactions.iter() {
        if reaction.nonzeno_rank.is_some() {
            continue;
        }
        for effect in &reaction.effects {
            if let Effect::Write { var, value, .. } = effect {
                let mut reads = Vec::new();
                value.free_vars_same_tick(&mut reads);
                if reads.contains(&Ref::Var(*var)) {
                    sink.warning(
                        "ZEN001",
                        format!(
                            "variable `{}` is written from an expression that reads it in the same tick without a Delay guard",
                            ir.variables[*var].name
                        ),
                        Location::Reaction(reaction_id),
                    );
                }
            }
        }
    }
}
