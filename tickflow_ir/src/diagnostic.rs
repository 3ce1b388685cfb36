//! Compile-time diagnostics: severities, stable diagnostic codes, and locations.
//!
//! A `Location` over stable graph identifiers stands in for a source `Span` —
//! there is no source text here, only a graph.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::graph::{NodeId, PortId, ReactionId, VarId};

/// Diagnostic reporting level.
#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// An error. Prevents compilation from succeeding.
    Error,
    /// A warning. Never fails the build.
    Warning,
    /// A note, for additional context.
    Note,
    /// A help message, the least severe.
    Help,
}
impl Level {
    /// Iterator of all levels from most to least severe.
    pub fn iter() -> std::array::IntoIter<Self, 4> {
        [Self::Error, Self::Warning, Self::Note, Self::Help].into_iter()
    }
}

/// Where in the graph a diagnostic applies. Stands in for a source `Span`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// Not tied to any particular graph entity.
    Global,
    Node(NodeId),
    Port(PortId),
    Variable(VarId),
    Reaction(ReactionId),
    /// An SCC found during `CausalityPass`, identified by its representative member.
    Scc(usize),
}
impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "<graph>"),
            Self::Node(id) => write!(f, "node {id:?}"),
            Self::Port(id) => write!(f, "port {id:?}"),
            Self::Variable(id) => write!(f, "variable {id:?}"),
            Self::Reaction(id) => write!(f, "reaction {id:?}"),
            Self::Scc(idx) => write!(f, "scc#{idx}"),
        }
    }
}

/// A diagnostic: a severity, a stable code (`STRUCT001`, `CAUS003`, ...), a
/// human-readable message, and a location. Every code emitted by a pass is
/// documented at its emission site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code, e.g. `"STRUCT001"`. Prefixes: STRUCT, TYPE,
    /// WRITE, CAUS, INIT, ZEN, SDF, CT.
    pub code: &'static str,
    pub level: Level,
    pub message: String,
    pub location: Location,
}
impl Diagnostic {
    pub fn new(
        code: &'static str,
        level: Level,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        let message = message.into();
        tracing::debug!(code, ?level, %message, "diagnostic recorded");
        Self {
            code,
            level,
            message,
            location,
        }
    }

    pub fn error(code: &'static str, message: impl Into<String>, location: Location) -> Self {
        Self::new(code, Level::Error, message, location)
    }

    pub fn warning(code: &'static str, message: impl Into<String>, location: Location) -> Self {
        Self::new(code, Level::Warning, message, location)
    }
}
impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} [{}]: {} --> {}", self.level, self.code, self.message, self.location)
    }
}

/// Accumulates diagnostics across a pass pipeline, carrying a `Location`
/// rather than a file/line pair.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}
impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, code: &'static str, message: impl Into<String>, location: Location) {
        self.diagnostics.push(Diagnostic::error(code, message, location));
    }

    pub fn warning(&mut self, code: &'static str, message: impl Into<String>, location: Location) {
        self.diagnostics.push(Diagnostic::warning(code, message, location));
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_error(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == Level::Error)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }
}
impl Extend<Diagnostic> for DiagnosticSink {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.diagnostics.extend(iter);
    }
}
impl std::fmt::Display for DiagnosticSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.diagnostics.is_empty() {
            return write!(f, "Diagnostics (empty)");
        }
        let groups = self.diagnostics.iter().into_group_map_by(|d| d.level);
        write!(f, "Diagnostics (")?;
        for (level, count) in
            Level::iter().filter_map(|level| groups.get(&level).map(|vec| (level, vec.len())))
        {
            write!(f, "{level:?}: {count}, ")?;
        }
        writeln!(f, "):")?;
        for diagnostic in Level::iter().filter_map(|level| groups.get(&level)).flatten() {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_fails_only_on_error() {
        let mut sink = DiagnosticSink::new();
        sink.warning("TYPE001", "mismatch", Location::Global);
        assert!(!sink.has_error());
        sink.error("STRUCT001", "unconnected", Location::Global);
        assert!(sink.has_error());
    }
}
