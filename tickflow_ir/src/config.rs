//! Compile-time configuration options recognized by the compiler and runtime.

use serde::{Deserialize, Serialize};

/// Whether a questionable-but-not-unsound construct is rejected outright or
/// admitted with a warning. Only the passes that document mode-sensitivity
/// (`write_conflict`, `init`) actually vary their behavior; this is not a
/// blanket warning-to-error escalation applied after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Strict,
    Pragmatic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    pub mode: Mode,
    /// Upper bound on microstep fixed-point iterations per SCC when the
    /// policy mix does not yield a finite `height_bound` sum.
    pub max_microsteps: usize,
    /// When true, every edge is treated as if its producer were a delay
    /// output: consumers observe only the previous tick's snapshot of a
    /// producer's value, never this tick's same-tick write. Affects both
    /// `CausalityPass`'s instant-dependency graph and the scheduler's
    /// edge-polarity computation. Fan-in is still single-writer-only in
    /// this mode (see DESIGN.md).
    pub tickwise_mode: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self { mode: Mode::Pragmatic, max_microsteps: 20, tickwise_mode: false }
    }
}
