//! Common test utilities for building pipeline graphs and engine transcripts.
use nagare::graph::{
    ChannelEdge, DigestParams, FilterCondition, FilterParams, MergeParams, PipelineGraph,
    ResourceSpec, SinkParams, SourceParams, StageNode, StageParams,
};

/// Creates the canonical three-node graph for basic tests.
///
/// Topology: source (one file) -> filter (contains "PASS") -> sink.
#[allow(dead_code)]
pub fn source_filter_sink_graph() -> PipelineGraph {
    PipelineGraph {
        nodes: vec![
            StageNode::new(
                "reads",
                "Input files",
                StageParams::Source(SourceParams {
                    files: vec!["a.txt".to_string()],
                }),
            ),
            StageNode::new(
                "node_42",
                "Keep PASS lines",
                StageParams::Filter(FilterParams {
                    condition: FilterCondition::Contains("PASS".to_string()),
                    negate: false,
                    select: None,
                    resources: ResourceSpec::default(),
                }),
            ),
            StageNode::new("out7", "Results", StageParams::Sink(SinkParams::default())),
        ],
        edges: vec![
            ChannelEdge::new("reads", "out", "node_42", "in"),
            ChannelEdge::new("node_42", "out", "out7", "in"),
        ],
    }
}

/// Two sources fanning into a merge, then a digest, then a sink.
#[allow(dead_code)]
pub fn fan_in_graph() -> PipelineGraph {
    PipelineGraph {
        nodes: vec![
            StageNode::new(
                "left",
                "Left files",
                StageParams::Source(SourceParams {
                    files: vec!["l.txt".to_string()],
                }),
            ),
            StageNode::new(
                "right",
                "Right files",
                StageParams::Source(SourceParams {
                    files: vec!["r.txt".to_string()],
                }),
            ),
            StageNode::new(
                "join",
                "Join",
                StageParams::Merge(MergeParams {
                    separator: Some("---".to_string()),
                    resources: ResourceSpec::default(),
                }),
            ),
            StageNode::new("sums", "Checksums", StageParams::Digest(DigestParams::default())),
            StageNode::new("out", "Results", StageParams::Sink(SinkParams::default())),
        ],
        edges: vec![
            ChannelEdge::new("left", "out", "join", "in"),
            ChannelEdge::new("right", "out", "join", "in"),
            ChannelEdge::new("join", "out", "sums", "in"),
            ChannelEdge::new("sums", "pass", "out", "in"),
        ],
    }
}

/// A transcript of a clean run of the three-node graph, the way the engine
/// prints it to a terminal.
#[allow(dead_code)]
pub fn success_transcript() -> Vec<&'static str> {
    vec![
        "N E X T F L O W  ~  version 24.04.2",
        "Launching `pipeline.nf` [demo] DSL2",
        "executor >  local (2)",
        "[a1/b2c3] filter_node_42 | 0 of 1",
        "[a1/b2c3] filter_node_42 | 1 of 1 \u{2714}",
        "[d4/e5f6] publish_out7 | 1 of 1 \u{2714}",
        "Completed at: 24-Aug-2026 10:00:01",
        "Duration    : 12.3s",
    ]
}

/// A transcript where the filter stage dies and the engine aborts.
#[allow(dead_code)]
pub fn failure_transcript() -> Vec<&'static str> {
    vec![
        "N E X T F L O W  ~  version 24.04.2",
        "Launching `pipeline.nf` [demo] DSL2",
        "executor >  local (2)",
        "[a1/b2c3] filter_node_42 | 1 of 2, failed: 1 \u{274c}",
        "ERROR ~ Error executing process > 'filter_node_42 (1)'",
    ]
}
