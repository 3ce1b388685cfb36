//! Universal value carrier and the three-valued presence lattice.
//!
//! A genuine conflict between two distinct present values propagates as an
//! `Err` instead of silently picking a winner, which is required for
//! soundness of the constructive causality check (see DESIGN.md).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An opaque carrier of domain data. `Absent` is the distinguished sentinel
/// propagated by strict operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Absent,
    Bool(bool),
    Number(f64),
    Tuple(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    pub fn num(v: f64) -> Self {
        Value::Number(v)
    }

    pub fn boolean(v: bool) -> Self {
        Value::Bool(v)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Equality used by the `=` comparison operator: equality of `Absent` with
    /// any other value is false. In practice `Cmp` never
    /// reaches this for an `Absent` operand because strict propagation
    /// intercepts it first (see `interp::eval`), but this keeps the invariant
    /// true even if called directly.
    pub fn value_eq(&self, other: &Value) -> bool {
        if self.is_absent() || other.is_absent() {
            return false;
        }
        self == other
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// A conflict between two distinct `Present` values during a monotone join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinConflict {
    pub a: Value,
    pub b: Value,
}
impl std::fmt::Display for JoinConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conflicting present values: {:?} vs {:?}", self.a, self.b)
    }
}
impl std::error::Error for JoinConflict {}

/// The presence lattice `V3`: `Bottom` (not yet determined) ⊑ `Absent`,
/// `Present(v)`; two distinct `Present`s are incomparable.
#[derive(Debug, Clone, PartialEq)]
pub enum V3 {
    Bottom,
    Absent,
    Present(Value),
}

impl V3 {
    pub fn is_bottom(&self) -> bool {
        matches!(self, V3::Bottom)
    }

    /// Known means "not bottom" — the constructive check requires every SCC
    /// member to reach `Present` specifically, but intermediate
    /// monotone steps only need to track "did this change".
    pub fn is_known(&self) -> bool {
        !self.is_bottom()
    }

    pub fn is_present(&self) -> bool {
        matches!(self, V3::Present(_))
    }

    pub fn present(&self) -> Option<&Value> {
        match self {
            V3::Present(v) => Some(v),
            _ => None,
        }
    }

    /// Monotone join used by the causality pass. Associative, commutative.
    /// `Present(a)` joined with `Present(b)`, `a != b`, is a genuine conflict
    /// and returns `Err` rather than silently falling back to `Bottom` — per
    /// Design Notes, falling back would make the constructive check unsound.
    pub fn join(&self, other: &V3) -> Result<V3, JoinConflict> {
        match (self, other) {
            (V3::Bottom, x) | (x, V3::Bottom) => Ok(x.clone()),
            (V3::Absent, V3::Absent) => Ok(V3::Absent),
            (V3::Present(a), V3::Present(b)) => {
                if a == b {
                    Ok(V3::Present(a.clone()))
                } else {
                    Err(JoinConflict { a: a.clone(), b: b.clone() })
                }
            }
            (V3::Absent, V3::Present(_)) | (V3::Present(_), V3::Absent) => {
                // Absent and Present are incomparable in the lattice order and
                // neither dominates the other; treat as a conflict rather than
                // silently picking one, for the same soundness reason as above.
                let (a, b) = match (self, other) {
                    (V3::Present(a), _) => (a.clone(), Value::Absent),
                    (_, V3::Present(b)) => (Value::Absent, b.clone()),
                    _ => unreachable!(),
                };
                Err(JoinConflict { a, b })
            }
        }
    }

    /// Mutates in place, returning whether the value changed. Used by the
    /// microstep fixed-point loop.
    pub fn merge(&mut self, other: V3) -> Result<bool, JoinConflict> {
        let joined = self.join(&other)?;
        let changed = joined != *self;
        *self = joined;
        Ok(changed)
    }
}
