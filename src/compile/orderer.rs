use ahash::AHashMap;

use super::diagnostics::{Diagnostic, DiagnosticKind};

/// One workflow statement awaiting its place in the execution section.
#[derive(Debug, Clone)]
pub(super) struct Invocation {
    pub node_id: String,
    /// The rendered statement, e.g. `ch_x = filter_x(ch_src)`.
    pub text: String,
    /// Channel names the statement consumes.
    pub reads: Vec<String>,
    /// Channel names the statement defines.
    pub writes: Vec<String>,
    /// Publish statements sort into a trailing group regardless of position.
    pub publish: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    Visiting,
    Emitted,
    Dropped,
}

/// Orders invocations so every statement appears after the statements that
/// define the channels it reads.
///
/// Channels without a defining statement are declared in the channel section
/// and impose no ordering constraint. Statements participating in a reference
/// cycle are dropped together with everything that depends on them; each drop
/// is flagged so the script stays runnable instead of deadlocking.
pub(super) struct InvocationOrderer {
    invocations: Vec<Invocation>,
    writer_of: AHashMap<String, usize>,
    state: Vec<VisitState>,
    order: Vec<usize>,
}

impl InvocationOrderer {
    pub fn new(invocations: Vec<Invocation>) -> Self {
        let mut writer_of = AHashMap::new();
        for (index, invocation) in invocations.iter().enumerate() {
            for channel in &invocation.writes {
                // Binder output is collision-free; first writer wins if not.
                writer_of.entry(channel.clone()).or_insert(index);
            }
        }
        let state = vec![VisitState::Unvisited; invocations.len()];
        Self {
            invocations,
            writer_of,
            state,
            order: Vec::new(),
        }
    }

    /// Consumes the orderer and returns the dependency-sorted statements.
    /// Ties keep the discovery order of the input.
    pub fn into_ordered(mut self, diagnostics: &mut Vec<Diagnostic>) -> Vec<Invocation> {
        for index in 0..self.invocations.len() {
            if !self.invocations[index].publish {
                self.visit(index, diagnostics);
            }
        }
        for index in 0..self.invocations.len() {
            if self.invocations[index].publish {
                self.visit(index, diagnostics);
            }
        }

        let order = std::mem::take(&mut self.order);
        let mut slots: Vec<Option<Invocation>> =
            self.invocations.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect()
    }

    fn visit(&mut self, index: usize, diagnostics: &mut Vec<Diagnostic>) -> bool {
        match self.state[index] {
            VisitState::Emitted => return true,
            VisitState::Dropped => return false,
            VisitState::Visiting => {
                // Back edge; the caller drops itself and the cycle unwinds.
                return false;
            }
            VisitState::Unvisited => {}
        }

        self.state[index] = VisitState::Visiting;
        let reads = self.invocations[index].reads.clone();
        for channel in reads {
            let Some(&writer) = self.writer_of.get(&channel) else {
                continue;
            };
            if writer == index {
                // A statement reading its own write is a cycle of length one.
                self.drop_invocation(index, &channel, diagnostics);
                return false;
            }
            if !self.visit(writer, diagnostics) {
                self.drop_invocation(index, &channel, diagnostics);
                return false;
            }
        }

        self.state[index] = VisitState::Emitted;
        self.order.push(index);
        true
    }

    fn drop_invocation(&mut self, index: usize, channel: &str, diagnostics: &mut Vec<Diagnostic>) {
        self.state[index] = VisitState::Dropped;
        let invocation = &self.invocations[index];
        tracing::warn!(
            node_id = %invocation.node_id,
            channel,
            "dropping workflow statement caught in a dependency cycle"
        );
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::DependencyCycle,
                &invocation.node_id,
                format!(
                    "statement dropped from the workflow: channel '{}' cannot be produced without a dependency cycle",
                    channel
                ),
            )
            .with_port(channel),
        );
    }
}
