use super::params::{StageKind, StageParams};

/// The complete, canonical definition of a pipeline graph, ready for compilation.
/// This is the target structure for any custom editor-document conversion.
///
/// The graph is supplied wholesale by an external editor and treated as an
/// immutable fact for one compilation pass; the compiler never mutates it.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    pub nodes: Vec<StageNode>,
    pub edges: Vec<ChannelEdge>,
}

/// One processing step in the pipeline graph.
#[derive(Debug, Clone)]
pub struct StageNode {
    /// Editor-assigned identity, unique within one graph.
    pub id: String,
    /// Human-readable label shown in the editor.
    pub name: String,
    /// Kind-specific configuration; the tag doubles as the stage kind.
    pub params: StageParams,
    /// Declared input ports, in editor order.
    pub inputs: Vec<InputPort>,
    /// Declared output ports, in editor order.
    pub outputs: Vec<OutputPort>,
}

/// A named input slot on a stage node.
#[derive(Debug, Clone)]
pub struct InputPort {
    pub name: String,
}

/// A named output slot on a stage node.
#[derive(Debug, Clone)]
pub struct OutputPort {
    pub name: String,
    /// Display label for the port (e.g. "report"); falls back to `name`.
    pub label: String,
    /// Whether the port carries a collection of files rather than one.
    pub multiple: bool,
}

/// A directed connection between a producer port and a consumer port.
#[derive(Debug, Clone)]
pub struct ChannelEdge {
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
}

impl ChannelEdge {
    pub fn new(
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_port: source_port.into(),
            target: target.into(),
            target_port: target_port.into(),
        }
    }
}

impl StageNode {
    /// Convenience constructor for nodes whose ports follow the kind defaults.
    pub fn new(id: impl Into<String>, name: impl Into<String>, params: StageParams) -> Self {
        let inputs = params.default_inputs();
        let outputs = params.default_outputs();
        Self {
            id: id.into(),
            name: name.into(),
            params,
            inputs,
            outputs,
        }
    }

    /// The broad role this node plays, derived from its parameter variant.
    pub fn kind(&self) -> StageKind {
        self.params.kind()
    }
}

impl InputPort {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl OutputPort {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            multiple: false,
        }
    }

    pub fn labeled(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            multiple: false,
        }
    }

    /// Marks the port as carrying one file per input rather than a single file.
    pub fn multi(mut self) -> Self {
        self.multiple = true;
        self
    }
}
