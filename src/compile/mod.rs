use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod artifact;
pub mod diagnostics;

mod assembler;
mod binder;
mod emitter;
mod orderer;

use assembler::{ScriptSections, assemble};
use binder::{ChannelTable, strip_suffix_segment};
use emitter::{StageBlock, emit_stage};
use orderer::{Invocation, InvocationOrderer};

pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use emitter::DEFAULT_CONTAINER;

use crate::error::CompileError;
use crate::graph::{ChannelEdge, PipelineGraph, ResourceSpec, StageKind, StageNode, StageParams};

/// Compile-wide settings; every field has a working default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Default run label, overridable at launch via `--run_name`.
    pub run_name: String,
    /// Root directory published files land under.
    pub output_dir: String,
    /// Output-naming pattern below the root; supports the `{run}`, `{stage}`,
    /// `{timestamp}` and `{date}` tokens.
    pub publish_pattern: String,
    /// Fallback resources for stages that pin none of their own.
    pub defaults: ResourceSpec,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            run_name: "run".to_string(),
            output_dir: "results".to_string(),
            publish_pattern: "{run}/{stage}".to_string(),
            defaults: ResourceSpec::default(),
        }
    }
}

/// One stage that made it into the workflow, in execution-section order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub node_id: String,
    /// The process name as it appears in the script and in engine output.
    pub process_name: String,
    /// Friendly label for status displays.
    pub display_label: String,
    pub kind_word: String,
    pub publish: bool,
}

/// The result of one compilation: the script plus everything a caller needs
/// to launch it and follow its progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledPipeline {
    /// The complete script text. Identical graphs compile to identical bytes.
    pub script: String,
    /// Stages present in the workflow section, execution order.
    pub stages: Vec<StageSummary>,
    /// Soft failures collected along the way; empty means a clean graph.
    pub diagnostics: Vec<Diagnostic>,
    pub options: CompileOptions,
}

impl CompiledPipeline {
    /// True when compilation recorded at least one defect.
    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Compiles a [`PipelineGraph`] into a runnable workflow script.
///
/// The compiler is deliberately forgiving: apart from an entirely empty
/// graph, every defect degrades into a [`Diagnostic`] and a best-effort
/// script rather than an error.
///
/// # Example
///
/// ```no_run
/// use nagare::compile::ScriptCompiler;
/// use nagare::graph::{PipelineGraph, SourceParams, StageNode, StageParams};
///
/// let graph = PipelineGraph {
///     nodes: vec![StageNode::new(
///         "reads",
///         "Input files",
///         StageParams::Source(SourceParams { files: vec!["a.txt".into()] }),
///     )],
///     edges: vec![],
/// };
/// let pipeline = ScriptCompiler::builder(graph)
///     .with_run_name("demo")
///     .build()
///     .compile()?;
/// println!("{}", pipeline.script);
/// # Ok::<(), nagare::error::CompileError>(())
/// ```
pub struct ScriptCompiler {
    graph: PipelineGraph,
    options: CompileOptions,
}

pub struct CompilerBuilder {
    graph: PipelineGraph,
    options: CompileOptions,
}

impl CompilerBuilder {
    pub fn new(graph: PipelineGraph) -> Self {
        Self {
            graph,
            options: CompileOptions::default(),
        }
    }

    /// Replaces all options at once.
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.options.run_name = run_name.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<String>) -> Self {
        self.options.output_dir = output_dir.into();
        self
    }

    pub fn with_publish_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.options.publish_pattern = pattern.into();
        self
    }

    /// Fallback resources applied to stages without their own limits.
    pub fn with_defaults(mut self, defaults: ResourceSpec) -> Self {
        self.options.defaults = defaults;
        self
    }

    pub fn build(self) -> ScriptCompiler {
        ScriptCompiler {
            graph: self.graph,
            options: self.options,
        }
    }
}

impl ScriptCompiler {
    pub fn builder(graph: PipelineGraph) -> CompilerBuilder {
        CompilerBuilder::new(graph)
    }

    /// Runs the full pipeline: bind channels, emit stage blocks, order the
    /// workflow statements, assemble the script.
    pub fn compile(self) -> Result<CompiledPipeline, CompileError> {
        let ScriptCompiler { graph, options } = self;
        if graph.nodes.is_empty() {
            return Err(CompileError::EmptyGraph);
        }

        let mut diagnostics = Vec::new();
        let graph = clean_graph(graph, &mut diagnostics);
        let table = ChannelTable::build(&graph, &mut diagnostics);

        let mut blocks: Vec<StageBlock> = Vec::new();
        let mut block_index: AHashMap<String, usize> = AHashMap::new();
        for node in &graph.nodes {
            if node.kind() == StageKind::Source {
                continue;
            }
            block_index.insert(node.id.clone(), blocks.len());
            blocks.push(emit_stage(node, &options, &mut diagnostics));
        }

        let declarations = source_declarations(&graph, &table);

        let mut invocations: Vec<Invocation> = Vec::new();
        for node in &graph.nodes {
            let Some(&index) = block_index.get(&node.id) else {
                continue;
            };
            let incoming: Vec<&ChannelEdge> = graph
                .edges
                .iter()
                .filter(|e| e.target == node.id)
                .collect();
            if let Some(invocation) =
                build_invocation(node, &blocks[index], &incoming, &table, &mut diagnostics)
            {
                invocations.push(invocation);
            }
        }

        drop_unproducible(&mut invocations, &declarations, &mut diagnostics);
        let ordered = InvocationOrderer::new(invocations).into_ordered(&mut diagnostics);

        let stages: Vec<StageSummary> = ordered
            .iter()
            .filter_map(|invocation| block_index.get(invocation.node_id.as_str()))
            .map(|&index| {
                let block = &blocks[index];
                StageSummary {
                    node_id: block.node_id.clone(),
                    process_name: block.process_name.clone(),
                    display_label: block.display_label.clone(),
                    kind_word: block.kind_word.to_string(),
                    publish: block.publish,
                }
            })
            .collect();

        let sections = ScriptSections {
            run_name: options.run_name.clone(),
            output_dir: options.output_dir.clone(),
            channel_declarations: declarations.into_iter().map(|d| d.statement).collect(),
            process_blocks: blocks.iter().map(|b| b.text.clone()).collect(),
            workflow_statements: ordered.iter().map(|i| i.text.clone()).collect(),
        };
        let script = assemble(&sections);

        info!(
            stages = stages.len(),
            diagnostics = diagnostics.len(),
            bytes = script.len(),
            "pipeline compiled"
        );

        let pipeline = CompiledPipeline {
            script,
            stages,
            diagnostics,
            options,
        };

        #[cfg(feature = "debug-tools")]
        pipeline.write_debug_files();

        Ok(pipeline)
    }
}

#[cfg(feature = "debug-tools")]
impl CompiledPipeline {
    /// Dumps the assembled script and the diagnostics list under `tmp/` for
    /// inspection. Failures only warn; debugging output never fails a compile.
    fn write_debug_files(&self) {
        use std::fs;
        if let Err(e) = fs::create_dir_all("tmp") {
            tracing::warn!("could not create debug directory: {}", e);
            return;
        }
        if let Err(e) = fs::write("tmp/pipeline_script.nf", &self.script) {
            tracing::warn!("could not write debug script: {}", e);
        }
        let report = self
            .diagnostics
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        if let Err(e) = fs::write("tmp/pipeline_diagnostics.txt", report) {
            tracing::warn!("could not write debug diagnostics: {}", e);
        }
    }
}

/// Removes duplicate node ids (first definition wins) and edges whose ends
/// reference nodes that do not exist.
fn clean_graph(graph: PipelineGraph, diagnostics: &mut Vec<Diagnostic>) -> PipelineGraph {
    let mut seen: AHashSet<String> = AHashSet::new();
    let mut nodes: Vec<StageNode> = Vec::new();
    for node in graph.nodes {
        if seen.insert(node.id.clone()) {
            nodes.push(node);
        } else {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::DuplicateNode,
                &node.id,
                "node id appears more than once, keeping the first definition",
            ));
        }
    }

    let ids: AHashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut edges: Vec<ChannelEdge> = Vec::new();
    for edge in graph.edges {
        let missing = if !ids.contains(edge.source.as_str()) {
            Some(&edge.source)
        } else if !ids.contains(edge.target.as_str()) {
            Some(&edge.target)
        } else {
            None
        };
        match missing {
            Some(node_id) => diagnostics.push(Diagnostic::new(
                DiagnosticKind::DanglingEdge,
                node_id,
                format!(
                    "edge '{}' -> '{}' references a node that is not in the graph",
                    edge.source, edge.target
                ),
            )),
            None => edges.push(edge),
        }
    }

    PipelineGraph { nodes, edges }
}

struct SourceDeclaration {
    channel: String,
    statement: String,
}

/// Renders one channel declaration per source output. The first output
/// carries the file list; any further declared outputs start empty.
fn source_declarations(graph: &PipelineGraph, table: &ChannelTable) -> Vec<SourceDeclaration> {
    let mut declarations = Vec::new();
    for node in &graph.nodes {
        let StageParams::Source(params) = &node.params else {
            continue;
        };
        for (index, &channel_index) in table.channels_for(&node.id).iter().enumerate() {
            let bound = table.channel(channel_index);
            let statement = if index == 0 && !params.files.is_empty() {
                let list = params
                    .files
                    .iter()
                    .map(|f| emitter::groovy_single_quote(f))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} = Channel.fromPath([{}])", bound.channel, list)
            } else {
                format!("{} = Channel.empty()", bound.channel)
            };
            declarations.push(SourceDeclaration {
                channel: bound.channel.clone(),
                statement,
            });
        }
    }
    declarations
}

/// Builds the workflow statement for one non-source node, or `None` when an
/// input cannot be satisfied and the stage has to be left out.
fn build_invocation(
    node: &StageNode,
    block: &StageBlock,
    incoming: &[&ChannelEdge],
    table: &ChannelTable,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Invocation> {
    let mut reads: Vec<String> = Vec::new();
    let mut args: Vec<String> = Vec::new();

    if matches!(node.params, StageParams::Merge(_)) {
        // A merge consumes every inbound channel regardless of recorded port.
        let mut channels = Vec::new();
        for edge in incoming {
            if let Some(bound) = table.resolve(&edge.source, &edge.source_port, diagnostics) {
                channels.push(bound.channel.clone());
            }
        }
        if channels.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnboundInput,
                &node.id,
                "merge stage has no inbound files and was left out of the workflow",
            ));
            return None;
        }
        reads.extend(channels.iter().cloned());
        args.push(format!("{}.collect()", mix_expression(&channels)));
    } else {
        let mut per_port: Vec<Vec<&ChannelEdge>> = vec![Vec::new(); block.input_ports.len()];
        let mut unmatched: Vec<&ChannelEdge> = Vec::new();

        for edge in incoming {
            if let Some(position) = block
                .input_ports
                .iter()
                .position(|port| port == &edge.target_port)
            {
                per_port[position].push(edge);
                continue;
            }
            if let Some(stripped) = strip_suffix_segment(&edge.target_port) {
                if let Some(position) =
                    block.input_ports.iter().position(|port| port == stripped)
                {
                    per_port[position].push(edge);
                    continue;
                }
            }
            unmatched.push(edge);
        }

        if block.input_ports.len() == 1 {
            for edge in unmatched.drain(..) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::AmbiguousPort,
                        &node.id,
                        format!(
                            "recorded input port '{}' does not match a declared input, binding to '{}'",
                            edge.target_port, block.input_ports[0]
                        ),
                    )
                    .with_port(edge.target_port.clone()),
                );
                per_port[0].push(edge);
            }
        }
        for edge in unmatched {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnresolvedPort,
                    &node.id,
                    format!(
                        "recorded input port '{}' does not match any declared input, edge dropped",
                        edge.target_port
                    ),
                )
                .with_port(edge.target_port.clone()),
            );
        }

        for (position, edges) in per_port.iter().enumerate() {
            let port = &block.input_ports[position];
            if edges.is_empty() {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UnboundInput,
                        &node.id,
                        format!(
                            "input '{}' has no inbound edge, stage left out of the workflow",
                            port
                        ),
                    )
                    .with_port(port.clone()),
                );
                return None;
            }
            let mut channels = Vec::new();
            for edge in edges {
                if let Some(bound) = table.resolve(&edge.source, &edge.source_port, diagnostics) {
                    channels.push(bound.channel.clone());
                }
            }
            if channels.is_empty() {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UnboundInput,
                        &node.id,
                        format!(
                            "no inbound edge of input '{}' could be resolved, stage left out of the workflow",
                            port
                        ),
                    )
                    .with_port(port.clone()),
                );
                return None;
            }
            reads.extend(channels.iter().cloned());
            args.push(mix_expression(&channels));
        }
    }

    let writes: Vec<String> = table
        .channels_for(&node.id)
        .iter()
        .map(|&index| table.channel(index).channel.clone())
        .collect();
    let call = format!("{}({})", block.process_name, args.join(", "));
    let text = match writes.len() {
        0 => call,
        1 => format!("{} = {}", writes[0], call),
        _ => format!("({}) = {}", writes.join(", "), call),
    };

    Some(Invocation {
        node_id: node.id.clone(),
        text,
        reads,
        writes,
        publish: block.publish,
    })
}

/// Combines producer channels feeding one input into a single expression.
fn mix_expression(channels: &[String]) -> String {
    let mut iter = channels.iter();
    let mut expr = iter.next().cloned().unwrap_or_default();
    for channel in iter {
        expr = format!("{}.mix({})", expr, channel);
    }
    expr
}

/// Drops statements reading channels that nothing produces, repeating until
/// the remaining set is closed. This happens when an upstream stage was left
/// out; keeping the reader would put an undefined name into the script.
fn drop_unproducible(
    invocations: &mut Vec<Invocation>,
    declarations: &[SourceDeclaration],
    diagnostics: &mut Vec<Diagnostic>,
) {
    loop {
        let mut defined: AHashSet<&str> =
            declarations.iter().map(|d| d.channel.as_str()).collect();
        for invocation in invocations.iter() {
            for write in &invocation.writes {
                defined.insert(write);
            }
        }

        let Some(position) = invocations.iter().position(|invocation| {
            invocation
                .reads
                .iter()
                .any(|read| !defined.contains(read.as_str()))
        }) else {
            return;
        };

        let missing = invocations[position]
            .reads
            .iter()
            .find(|read| !defined.contains(read.as_str()))
            .cloned()
            .unwrap_or_default();
        let dropped = invocations.remove(position);
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::UnboundInput,
                &dropped.node_id,
                format!(
                    "channel '{}' is never produced, statement dropped from the workflow",
                    missing
                ),
            )
            .with_port(missing.clone()),
        );
    }
}
