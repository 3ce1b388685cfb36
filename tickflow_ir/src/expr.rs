//! The reaction expression DSL: a small inert tree evaluated by `interp`.
//!
//! `Delay` is the only clock-breaking primitive: it reads the *previous*
//! tick's value of its operand, falling back to a default the first time it
//! is evaluated. Everything else is a pure, same-tick function of its
//! operands.

use serde::{Deserialize, Serialize};

use crate::graph::{PortId, VarId};
use crate::value::Value;

/// A typed reference to a readable graph location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ref {
    Port(PortId),
    Var(VarId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

/// An expression tree. Strict by default: any `Const`/`Cmp`/`BinOp`/`If`
/// subtree whose operand is `Value::Absent` evaluates to `Absent` as a whole,
/// except `Delay`, which is the sole primitive permitted to read across a
/// tick boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Value),
    Var(Ref),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `Delay(e, default)`: the value of `e` from the *previous* tick, or
    /// `default` on the first tick. `e` may be an arbitrary expression.
    /// `graph::lower_delays` eliminates every occurrence of this variant
    /// before an `Ir` is built: it allocates an anonymous delay-buffer
    /// state, adds a write of that state from `e`, and replaces the
    /// occurrence with a read of the state. `default` must be a closed
    /// `Const` (enforced by `graph::lint_reaction`), since there is no
    /// "previous tick" default to fall back to recursively.
    Delay(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn free_vars(&self, out: &mut Vec<Ref>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(r) => out.push(*r),
            Expr::Cmp(_, a, b) | Expr::BinOp(_, a, b) => {
                a.free_vars(out);
                b.free_vars(out);
            }
            Expr::Not(a) => a.free_vars(out),
            Expr::If(c, t, e) => {
                c.free_vars(out);
                t.free_vars(out);
                e.free_vars(out);
            }
            Expr::Delay(inner, default) => {
                inner.free_vars(out);
                default.free_vars(out);
            }
        }
    }

    /// Like `free_vars`, but does not descend into a `Delay` at all: both its
    /// operand and its default are satisfied from the previous tick's commit
    /// (once `graph::lower_delays` has run) or are a closed `Const`, so
    /// neither contributes a same-tick dependency edge. Used by the
    /// causality and non-Zeno passes.
    pub fn free_vars_same_tick(&self, out: &mut Vec<Ref>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(r) => out.push(*r),
            Expr::Cmp(_, a, b) | Expr::BinOp(_, a, b) => {
                a.free_vars_same_tick(out);
                b.free_vars_same_tick(out);
            }
            Expr::Not(a) => a.free_vars_same_tick(out),
            Expr::If(c, t, e) => {
                c.free_vars_same_tick(out);
                t.free_vars_same_tick(out);
                e.free_vars_same_tick(out);
            }
            Expr::Delay(..) => {}
        }
    }

    /// True for a closed expression containing neither `Ref`s nor nested
    /// `Delay`s — the shape required of every `Delay` default.
    pub fn is_closed_const(&self) -> bool {
        match self {
            Expr::Const(_) => true,
            Expr::Var(_) | Expr::Delay(..) => false,
            Expr::Cmp(_, a, b) | Expr::BinOp(_, a, b) => a.is_closed_const() && b.is_closed_const(),
            Expr::Not(a) => a.is_closed_const(),
            Expr::If(c, t, e) => c.is_closed_const() && t.is_closed_const() && e.is_closed_const(),
        }
    }

    /// Visits every `Delay` default subexpression reachable from this tree,
    /// for use by `graph::lint_reaction`.
    pub fn for_each_delay<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        match self {
            Expr::Const(_) | Expr::Var(_) => {}
            Expr::Cmp(_, a, b) | Expr::BinOp(_, a, b) => {
                a.for_each_delay(f);
                b.for_each_delay(f);
            }
            Expr::Not(a) => a.for_each_delay(f),
            Expr::If(c, t, e) => {
                c.for_each_delay(f);
                t.for_each_delay(f);
                e.for_each_delay(f);
            }
            Expr::Delay(inner, default) => {
                f(default);
                inner.for_each_delay(f);
                default.for_each_delay(f);
            }
        }
    }

    /// True if this subtree contains a `Delay` — used by the causality pass
    /// to flip edge polarity and by the SCC detector to know which edges
    /// break an instantaneous cycle.
    pub fn contains_delay(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Var(_) => false,
            Expr::Delay(..) => true,
            Expr::Cmp(_, a, b) | Expr::BinOp(_, a, b) => a.contains_delay() || b.contains_delay(),
            Expr::Not(a) => a.contains_delay(),
            Expr::If(c, t, e) => c.contains_delay() || t.contains_delay() || e.contains_delay(),
        }
    }
}
