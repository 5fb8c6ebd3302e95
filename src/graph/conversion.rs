use super::definition::PipelineGraph;
use crate::error::GraphConversionError;

/// A trait for custom editor documents that can be converted into a [`PipelineGraph`].
///
/// This is the primary extension point for keeping the compiler format-agnostic.
/// Visual editors persist their canvases in all sorts of shapes; implementing
/// this trait on your own document structs provides the translation layer the
/// compiler needs, without the compiler knowing anything about the editor.
///
/// # Example
///
/// ```rust,no_run
/// use nagare::graph::{IntoPipeline, PipelineGraph, StageNode, StageParams, SourceParams};
/// use nagare::error::GraphConversionError;
///
/// struct MyCanvasNode { id: String, kind: String }
/// struct MyCanvas { nodes: Vec<MyCanvasNode> }
///
/// impl IntoPipeline for MyCanvas {
///     fn into_pipeline(self) -> Result<PipelineGraph, GraphConversionError> {
///         let nodes = self
///             .nodes
///             .into_iter()
///             .map(|n| {
///                 let params = match n.kind.as_str() {
///                     "file-source" => StageParams::Source(SourceParams::default()),
///                     other => StageParams::Opaque { kind: other.to_string() },
///                 };
///                 StageNode::new(n.id.clone(), n.id, params)
///             })
///             .collect();
///
///         Ok(PipelineGraph { nodes, edges: vec![] })
///     }
/// }
/// ```
pub trait IntoPipeline {
    /// Consumes the document and converts it into a compilable pipeline graph.
    fn into_pipeline(self) -> Result<PipelineGraph, GraphConversionError>;
}

impl IntoPipeline for PipelineGraph {
    fn into_pipeline(self) -> Result<PipelineGraph, GraphConversionError> {
        Ok(self)
    }
}
