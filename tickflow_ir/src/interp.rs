//! Expression evaluation: a concrete evaluator used by the runtime, and a
//! three-valued abstract evaluator used by the causality pass. The two share
//! shape (same recursion over `Expr`) but operate on `Value`/`V3`
//! respectively, so are kept as separate functions rather than one generic
//! evaluator. Neither ever sees an `Expr::Delay`: `graph::lower_delays` runs
//! before an `Ir` is built and rewrites every occurrence into a read of a
//! synthesized buffer, so its survival into either evaluator is a compiler
//! bug, not a runtime condition.

use crate::expr::{BinOp, CmpOp, Expr, Ref};
use crate::value::{Value, V3};

/// Read access the concrete evaluator needs: current-tick port/variable
/// values, plus the previous tick's committed value for `Delay`.
pub trait Env {
    fn read(&self, r: Ref) -> Value;
    fn read_prev(&self, r: Ref) -> Value;
}

/// Applies a comparison to two known (non-`Absent`) values. Shared by the
/// concrete evaluator and the abstract evaluator, so both compute the exact
/// same result once their operands are both known (two Presents join to a
/// Present of the computed result).
fn apply_cmp(op: CmpOp, a: &Value, b: &Value) -> Value {
    let result = match op {
        CmpOp::Eq => a.value_eq(b),
        CmpOp::Ne => !a.value_eq(b),
        CmpOp::Lt => a.as_number().zip(b.as_number()).map(|(x, y)| x < y).unwrap_or(false),
        CmpOp::Le => a.as_number().zip(b.as_number()).map(|(x, y)| x <= y).unwrap_or(false),
        CmpOp::Gt => a.as_number().zip(b.as_number()).map(|(x, y)| x > y).unwrap_or(false),
        CmpOp::Ge => a.as_number().zip(b.as_number()).map(|(x, y)| x >= y).unwrap_or(false),
    };
    Value::boolean(result)
}

/// Applies a binary operator to two known (non-`Absent`) values; see
/// `apply_cmp`.
fn apply_binop(op: BinOp, a: &Value, b: &Value) -> Value {
    match op {
        BinOp::And => Value::boolean(a.as_bool().unwrap_or(false) && b.as_bool().unwrap_or(false)),
        BinOp::Or => Value::boolean(a.as_bool().unwrap_or(false) || b.as_bool().unwrap_or(false)),
        _ => {
            let (x, y) = match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Value::Absent,
            };
            let result = match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div => x / y,
                BinOp::And | BinOp::Or => unreachable!(),
            };
            Value::num(result)
        }
    }
}

/// Applies logical negation to a known (non-`Absent`) value; see `apply_cmp`.
fn apply_not(a: &Value) -> Value {
    Value::boolean(!a.as_bool().unwrap_or(false))
}

/// Evaluates `expr` against `env`, committed-values semantics: strict
/// propagation of `Absent` through every operator except `Delay`.
pub fn eval(expr: &Expr, env: &impl Env) -> Value {
    match expr {
        Expr::Const(v) => v.clone(),
        Expr::Var(r) => env.read(*r),
        Expr::Cmp(op, a, b) => {
            let (a, b) = (eval(a, env), eval(b, env));
            if a.is_absent() || b.is_absent() {
                return Value::Absent;
            }
            apply_cmp(*op, &a, &b)
        }
        Expr::BinOp(op, a, b) => {
            let (a, b) = (eval(a, env), eval(b, env));
            if a.is_absent() || b.is_absent() {
                return Value::Absent;
            }
            apply_binop(*op, &a, &b)
        }
        Expr::Not(a) => {
            let a = eval(a, env);
            if a.is_absent() {
                return Value::Absent;
            }
            apply_not(&a)
        }
        Expr::If(c, t, e) => {
            let c = eval(c, env);
            if c.is_absent() {
                return Value::Absent;
            }
            if c.as_bool().unwrap_or(false) {
                eval(t, env)
            } else {
                eval(e, env)
            }
        }
        Expr::Delay(..) => {
            unreachable!("Delay must be lowered before interpretation")
        }
    }
}

/// Abstract read access for the three-valued causality evaluator: the
/// current abstract state of a port/variable within the SCC fixed-point.
pub trait AbstractEnv {
    fn read_abstract(&self, r: Ref) -> V3;
}

/// Evaluates `expr` in the three-valued presence lattice, for the
/// constructive-cycle-termination proof. Runs only on lowered `Ir`, so (like
/// `eval`) never sees an `Expr::Delay`.
pub fn eval_abstract(expr: &Expr, env: &impl AbstractEnv) -> V3 {
    match expr {
        Expr::Const(v) => V3::Present(v.clone()),
        Expr::Var(r) => env.read_abstract(*r),
        Expr::Cmp(op, a, b) => {
            let (a, b) = (eval_abstract(a, env), eval_abstract(b, env));
            strict2(&a, &b, |x, y| apply_cmp(*op, x, y))
        }
        Expr::BinOp(op, a, b) => {
            let (a, b) = (eval_abstract(a, env), eval_abstract(b, env));
            strict2(&a, &b, |x, y| apply_binop(*op, x, y))
        }
        Expr::Not(a) => {
            let a = eval_abstract(a, env);
            strict1(&a, apply_not)
        }
        Expr::If(c, t, e) => {
            let c = eval_abstract(c, env);
            match c {
                // The sole exception to "any operand ⊥ ⇒ result ⊥": the
                // condition being unresolved joins both branches
                // rather than blocking outright, since a branch that is
                // already known not to depend on the condition's resolution
                // can still let the whole `If` settle (e.g. both arms
                // agreeing on the same Present, or both Absent).
                V3::Bottom => {
                    let (t, e) = (eval_abstract(t, env), eval_abstract(e, env));
                    match (&t, &e) {
                        (V3::Present(a), V3::Present(b)) if a == b => V3::Present(a.clone()),
                        (V3::Absent, V3::Absent) => V3::Absent,
                        _ => V3::Bottom,
                    }
                }
                V3::Absent => V3::Absent,
                V3::Present(cond_value) => match cond_value.as_bool() {
                    Some(true) => eval_abstract(t, env),
                    Some(false) => eval_abstract(e, env),
                    // A non-boolean condition is a type error the concrete
                    // evaluator would also misbehave on; report as unresolved
                    // rather than panicking inside a static analysis pass.
                    None => V3::Bottom,
                },
            }
        }
        Expr::Delay(..) => {
            unreachable!("Delay must be lowered before interpretation")
        }
    }
}

/// Strict abstract application of a binary operator: any
/// operand `Bottom` makes the result `Bottom`; otherwise any operand
/// `Absent` makes the result `Absent`; otherwise both operands are `Present`
/// and `f` computes the result.
fn strict2(a: &V3, b: &V3, f: impl FnOnce(&Value, &Value) -> Value) -> V3 {
    match (a, b) {
        (V3::Bottom, _) | (_, V3::Bottom) => V3::Bottom,
        (V3::Absent, _) | (_, V3::Absent) => V3::Absent,
        (V3::Present(x), V3::Present(y)) => V3::Present(f(x, y)),
    }
}

/// Strict abstract application of a unary operator; see `strict2`.
fn strict1(a: &V3, f: impl FnOnce(&Value) -> Value) -> V3 {
    match a {
        V3::Bottom => V3::Bottom,
        V3::Absent => V3::Absent,
        V3::Present(x) => V3::Present(f(x)),
    }
}
