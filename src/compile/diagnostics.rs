use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a recoverable defect found during compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// An edge's recorded source port did not match any declared port and was
    /// rebound to the producer's first output channel.
    AmbiguousPort,
    /// An edge's source port could not be resolved at all; the edge was dropped.
    UnresolvedPort,
    /// An edge references a node that is not present in the graph.
    DanglingEdge,
    /// A node id appeared more than once; later occurrences were skipped.
    DuplicateNode,
    /// Two distinct ports derived the same channel name; a numeric suffix was
    /// appended to keep producing statements unique.
    DuplicateChannel,
    /// An invocation participates in a data-dependency cycle and was omitted
    /// from the script.
    DependencyCycle,
    /// A stage kind the emitter does not understand; a failing placeholder
    /// process was emitted in its place.
    UnsupportedStage,
    /// A stage input port has no incoming edge, so no invocation could be formed.
    UnboundInput,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticKind::AmbiguousPort => "ambiguous port",
            DiagnosticKind::UnresolvedPort => "unresolved port",
            DiagnosticKind::DanglingEdge => "dangling edge",
            DiagnosticKind::DuplicateNode => "duplicate node",
            DiagnosticKind::DuplicateChannel => "duplicate channel",
            DiagnosticKind::DependencyCycle => "dependency cycle",
            DiagnosticKind::UnsupportedStage => "unsupported stage",
            DiagnosticKind::UnboundInput => "unbound input",
        };
        write!(f, "{}", label)
    }
}

/// One recoverable defect, recorded instead of aborting compilation.
///
/// Diagnostics are soft failures: the compiler keeps going and produces a
/// best-effort script, and the caller decides how loudly to surface the
/// collected entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The node the defect is attributed to.
    pub node_id: String,
    /// The port involved, when the defect concerns one.
    pub port: Option<String>,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, node_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            node_id: node_id.into(),
            port: None,
            detail: detail.into(),
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port {
            Some(port) => write!(
                f,
                "{} on node '{}' port '{}': {}",
                self.kind, self.node_id, port, self.detail
            ),
            None => write!(f, "{} on node '{}': {}", self.kind, self.node_id, self.detail),
        }
    }
}
