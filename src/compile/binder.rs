use ahash::{AHashMap, AHashSet};
use tracing::debug;

use super::diagnostics::{Diagnostic, DiagnosticKind};
use crate::graph::{PipelineGraph, StageKind};

/// One resolved producer channel: a stable script-level name for a
/// `(node, output port)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundChannel {
    /// Script identifier, e.g. `ch_filter_node_42_out`.
    pub channel: String,
    pub node_id: String,
    pub port: String,
}

/// Lookup table assigning every producer port a unique channel identifier.
///
/// Editors are sloppier than compilers: an edge's recorded source port often
/// carries a stale handle id or a renamed port, so exact lookup is only the
/// first step of [`ChannelTable::resolve`]. Misses degrade through alias and
/// fallback resolution to keep compilation going.
pub(super) struct ChannelTable {
    by_key: AHashMap<String, usize>,
    by_node: AHashMap<String, Vec<usize>>,
    channels: Vec<BoundChannel>,
}

impl ChannelTable {
    /// Registers a channel for every declared output port of every node.
    ///
    /// Source nodes without declared outputs get an implicit `out` port so
    /// their files are always reachable. The first output of each node is
    /// additionally reachable through the `<id>.out`, `<id>_out` and
    /// `<id>.output` convenience aliases.
    pub(super) fn build(graph: &PipelineGraph, diagnostics: &mut Vec<Diagnostic>) -> Self {
        let mut table = Self {
            by_key: AHashMap::new(),
            by_node: AHashMap::new(),
            channels: Vec::new(),
        };
        let mut taken: AHashSet<String> = AHashSet::new();

        for node in &graph.nodes {
            let mut ports: Vec<String> = node.outputs.iter().map(|p| p.name.clone()).collect();
            if ports.is_empty() && node.kind() == StageKind::Source {
                ports.push("out".to_string());
            }

            for (index, port) in ports.iter().enumerate() {
                let mut name = format!(
                    "ch_{}_{}",
                    sanitize_identifier(&node.id),
                    sanitize_identifier(port)
                );
                if !taken.insert(name.clone()) {
                    let mut suffix = 2u32;
                    let base = name.clone();
                    loop {
                        name = format!("{}_{}", base, suffix);
                        if taken.insert(name.clone()) {
                            break;
                        }
                        suffix += 1;
                    }
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::DuplicateChannel,
                            &node.id,
                            format!("channel name '{}' already taken, renamed to '{}'", base, name),
                        )
                        .with_port(port.clone()),
                    );
                }

                let idx = table.channels.len();
                table.channels.push(BoundChannel {
                    channel: name,
                    node_id: node.id.clone(),
                    port: port.clone(),
                });
                table.by_key.insert(format!("{}.{}", node.id, port), idx);
                table.by_node.entry(node.id.clone()).or_default().push(idx);

                if index == 0 {
                    for alias in [
                        format!("{}.out", node.id),
                        format!("{}_out", node.id),
                        format!("{}.output", node.id),
                    ] {
                        table.by_key.entry(alias).or_insert(idx);
                    }
                }
            }
        }

        table
    }

    /// Resolves an edge's recorded `(source node, source port)` to a channel.
    ///
    /// Resolution cascade: exact key, the raw recorded handle, the port name
    /// with its trailing separator-suffix stripped, and finally the first
    /// channel registered for the node (recorded as an ambiguity). `None`
    /// means the edge cannot be bound at all and should be dropped.
    pub(super) fn resolve(
        &self,
        node_id: &str,
        recorded_port: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<&BoundChannel> {
        if let Some(idx) = self.by_key.get(&format!("{}.{}", node_id, recorded_port)) {
            return Some(&self.channels[*idx]);
        }

        // Some editors store the fully-qualified handle in the port field.
        if let Some(idx) = self.by_key.get(recorded_port) {
            debug!(node_id, recorded_port, "resolved channel via raw handle key");
            return Some(&self.channels[*idx]);
        }

        if let Some(stripped) = strip_suffix_segment(recorded_port) {
            if let Some(idx) = self.by_key.get(&format!("{}.{}", node_id, stripped)) {
                debug!(
                    node_id,
                    recorded_port, stripped, "resolved channel via stripped port name"
                );
                return Some(&self.channels[*idx]);
            }
        }

        if let Some(first) = self.first_for(node_id) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::AmbiguousPort,
                    node_id,
                    format!(
                        "recorded port '{}' does not match a declared output, using '{}'",
                        recorded_port, first.channel
                    ),
                )
                .with_port(recorded_port.to_string()),
            );
            return Some(first);
        }

        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::UnresolvedPort,
                node_id,
                format!("no channel could be resolved for port '{}'", recorded_port),
            )
            .with_port(recorded_port.to_string()),
        );
        None
    }

    /// All channels registered for a node, in declaration order.
    pub(super) fn channels_for(&self, node_id: &str) -> &[usize] {
        self.by_node.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(super) fn channel(&self, idx: usize) -> &BoundChannel {
        &self.channels[idx]
    }

    fn first_for(&self, node_id: &str) -> Option<&BoundChannel> {
        self.by_node
            .get(node_id)
            .and_then(|v| v.first())
            .map(|idx| &self.channels[*idx])
    }
}

/// Drops the segment after the last separator, so `out-1` and `result_main`
/// retry as `out` and `result`.
pub(super) fn strip_suffix_segment(port: &str) -> Option<&str> {
    port.rfind(['-', '_', '.'])
        .map(|pos| &port[..pos])
        .filter(|s| !s.is_empty())
}

/// Maps arbitrary editor identifiers into safe script identifiers: alphanumerics
/// and underscores survive, everything else becomes an underscore, and a
/// leading digit gains an underscore prefix.
pub(crate) fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
