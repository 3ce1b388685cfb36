//! Write-merge policies for state variables.
//!
//! A closed set of three policies — `Error`, `Sum`, `Lww` — is known and
//! fixed, so they are represented as a plain `enum` rather than an open
//! trait-object hierarchy.

use serde::{Deserialize, Serialize};

use crate::value::{JoinConflict, Value};

/// Declares how a variable behaves when more than one reaction proposes a
/// write to it in the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// At most one writer per tick; two live writers is a runtime error.
    /// Height bound 1: a single microstep settles it.
    Error,
    /// Commutative, associative sum across every writer live this tick.
    /// Multi-writer safe, monotone, unbounded height (accumulation can chain
    /// across microsteps within an SCC).
    Sum,
    /// Last-writer-wins by a fixed priority order supplied at the write site
    /// (`Intent::priority`). Not multi-writer-safe in the monotone sense —
    /// two writers of equal priority is still a conflict.
    Lww,
}

/// What a single reaction proposes to do to a variable in one microstep.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub value: Value,
    /// Used only by `Policy::Lww`; higher wins. Ignored by `Error`/`Sum`.
    pub priority: i64,
}
impl Intent {
    pub fn new(value: Value) -> Self {
        Self { value, priority: 0 }
    }

    pub fn with_priority(value: Value, priority: i64) -> Self {
        Self { value, priority }
    }
}

/// Error raised when a policy's invariant is violated by the set of intents
/// live in a tick (`ErrorPolicy` raises at runtime).
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    MultipleWriters { count: usize },
    TiedPriority { priority: i64 },
    Conflict(JoinConflict),
}
impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultipleWriters { count } => {
                write!(f, "ErrorPolicy variable has {count} live writers this tick, expected at most 1")
            }
            Self::TiedPriority { priority } => {
                write!(f, "LwwPolicy has two writers tied at priority {priority}")
            }
            Self::Conflict(c) => write!(f, "{c}"),
        }
    }
}
impl std::error::Error for PolicyError {}
impl From<JoinConflict> for PolicyError {
    fn from(c: JoinConflict) -> Self {
        PolicyError::Conflict(c)
    }
}

impl Policy {
    /// Resolves the set of intents live this tick into the variable's new
    /// value. `intents` being empty means no writer fired; callers keep the
    /// prior value in that case and never call `merge`.
    pub fn merge(&self, intents: &[Intent]) -> Result<Value, PolicyError> {
        match self {
            Policy::Error => {
                if intents.len() > 1 {
                    return Err(PolicyError::MultipleWriters { count: intents.len() });
                }
                Ok(intents[0].value.clone())
            }
            Policy::Sum => {
                let mut total = 0.0f64;
                for intent in intents {
                    total += intent.value.as_number().unwrap_or(0.0);
                }
                Ok(Value::num(total))
            }
            Policy::Lww => {
                let mut best: Option<&Intent> = None;
                for intent in intents {
                    best = match best {
                        None => Some(intent),
                        Some(b) if intent.priority > b.priority => Some(intent),
                        Some(b) if intent.priority == b.priority && intent.value != b.value => {
                            return Err(PolicyError::TiedPriority { priority: intent.priority });
                        }
                        Some(b) => Some(b),
                    };
                }
                Ok(best.expect("merge called with empty intents").value.clone())
            }
        }
    }

    /// Whether repeated application of `merge` within a single SCC's
    /// microstep loop is a monotone operation in the presence lattice —
    /// required for the constructive causality check.
    pub fn is_monotone(&self) -> bool {
        matches!(self, Policy::Error | Policy::Sum)
    }

    pub fn allows_multiwriter(&self) -> bool {
        matches!(self, Policy::Sum)
    }

    /// Upper bound on the number of microsteps a variable under this policy
    /// may need within one SCC before it stabilizes, used to size the
    /// `1 + Σheight_bound` fixed-point budget.
    pub fn height_bound(&self) -> Option<usize> {
        match self {
            Policy::Error => Some(1),
            Policy::Lww => Some(1),
            Policy::Sum => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_policy_rejects_two_writers() {
        let intents = vec![Intent::new(Value::num(1.0)), Intent::new(Value::num(2.0))];
        assert!(matches!(
            Policy::Error.merge(&intents),
            Err(PolicyError::MultipleWriters { count: 2 })
        ));
    }

    #[test]
    fn sum_policy_adds_all_writers() {
        let intents = vec![Intent::new(Value::num(1.0)), Intent::new(Value::num(2.0)), Intent::new(Value::num(3.0))];
        assert_eq!(Policy::Sum.merge(&intents).unwrap(), Value::num(6.0));
    }

    #[test]
    fn lww_policy_picks_highest_priority() {
        let intents = vec![
            Intent::with_priority(Value::num(1.0), 0),
            Intent::with_priority(Value::num(2.0), 5),
        ];
        assert_eq!(Policy::Lww.merge(&intents).unwrap(), Value::num(2.0));
    }

    #[test]
    fn lww_policy_rejects_tie() {
        let intents = vec![
            Intent::with_priority(Value::num(1.0), 5),
            Intent::with_priority(Value::num(2.0), 5),
        ];
        assert!(matches!(Policy::Lww.merge(&intents), Err(PolicyError::TiedPriority { priority: 5 })));
    }
}
