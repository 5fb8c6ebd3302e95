//! Tests for graph compilation: script layout, port binding, and diagnostics.
mod common;
use common::*;
use nagare::graph::{
    ChannelEdge, DigestAlgorithm, FilterCondition, FilterParams, InputPort, LineCheckParams,
    MapParams, MapTransform, OutputPort, PipelineGraph, ResourceSpec, ScriptParams, SinkParams,
    SourceParams, StageNode, StageParams,
};
use nagare::prelude::*;

#[test]
fn test_compiler_builds_simple_graph() {
    let pipeline = ScriptCompiler::builder(source_filter_sink_graph())
        .with_run_name("demo")
        .build()
        .compile()
        .expect("Failed to compile");

    assert!(!pipeline.has_diagnostics());
    assert!(pipeline.script.starts_with("#!/usr/bin/env nextflow"));
    assert!(pipeline.script.contains("nextflow.enable.dsl = 2"));
    assert!(pipeline.script.contains("params.run_name = 'demo'"));
    assert!(
        pipeline
            .script
            .contains("ch_reads_out = Channel.fromPath(['a.txt'])")
    );
    assert!(pipeline.script.contains("process filter_node_42 {"));
    assert!(
        pipeline
            .script
            .contains("ch_node_42_out = filter_node_42(ch_reads_out)")
    );
    assert!(pipeline.script.contains("publish_out7(ch_node_42_out)"));

    // Sources declare channels but never become stages.
    assert_eq!(pipeline.stages.len(), 2);
    assert_eq!(pipeline.stages[0].process_name, "filter_node_42");
    assert_eq!(pipeline.stages[0].display_label, "Keep PASS lines");
    assert!(!pipeline.stages[0].publish);
    assert_eq!(pipeline.stages[1].process_name, "publish_out7");
    assert!(pipeline.stages[1].publish);
}

#[test]
fn test_compilation_is_byte_deterministic() {
    let first = ScriptCompiler::builder(source_filter_sink_graph())
        .build()
        .compile()
        .expect("Failed to compile");
    let second = ScriptCompiler::builder(source_filter_sink_graph())
        .build()
        .compile()
        .expect("Failed to compile");

    assert_eq!(first.script, second.script);
    assert!(!first.script.contains("params.stamp = '"));
    assert!(
        first
            .script
            .contains("params.stamp = new Date().format('yyyyMMdd_HHmmss')")
    );
}

#[test]
fn test_workflow_orders_filter_before_publish() {
    let pipeline = ScriptCompiler::builder(source_filter_sink_graph())
        .build()
        .compile()
        .expect("Failed to compile");

    let filter = pipeline
        .script
        .find("ch_node_42_out = filter_node_42(")
        .expect("filter statement missing");
    let publish = pipeline
        .script
        .find("publish_out7(")
        .expect("publish statement missing");
    assert!(filter < publish);
}

#[test]
fn test_empty_graph_is_rejected() {
    let result = ScriptCompiler::builder(PipelineGraph::default())
        .build()
        .compile();
    assert!(matches!(result, Err(CompileError::EmptyGraph)));
}

#[test]
fn test_source_without_files_declares_empty_channel() {
    let mut graph = source_filter_sink_graph();
    graph.nodes[0] = StageNode::new(
        "reads",
        "Input files",
        StageParams::Source(SourceParams { files: vec![] }),
    );

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(pipeline.script.contains("ch_reads_out = Channel.empty()"));
}

#[test]
fn test_filter_body_quotes_the_literal() {
    let pipeline = ScriptCompiler::builder(source_filter_sink_graph())
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(
        pipeline
            .script
            .contains(r#"grep -F -- 'PASS' "\$f" > "kept_\$f" || test \$? -eq 1"#)
    );
}

#[test]
fn test_duplicate_node_keeps_first_definition() {
    let mut graph = source_filter_sink_graph();
    graph.nodes.push(StageNode::new(
        "node_42",
        "Impostor",
        StageParams::Sink(SinkParams::default()),
    ));

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(
        pipeline
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::DuplicateNode && d.node_id == "node_42")
    );
    assert!(pipeline.script.contains("process filter_node_42 {"));
    assert!(!pipeline.script.contains("process publish_node_42"));
}

#[test]
fn test_dangling_edge_is_dropped() {
    let mut graph = source_filter_sink_graph();
    graph
        .edges
        .push(ChannelEdge::new("ghost", "out", "node_42", "in"));

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(
        pipeline
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::DanglingEdge)
    );
    assert!(pipeline.script.contains("publish_out7(ch_node_42_out)"));
}

#[test]
fn test_unknown_stage_kind_emits_failing_placeholder() {
    let graph = PipelineGraph {
        nodes: vec![
            StageNode::new(
                "reads",
                "Input files",
                StageParams::Source(SourceParams {
                    files: vec!["a.txt".to_string()],
                }),
            ),
            StageNode::new(
                "mystery",
                "Mystery",
                StageParams::Opaque {
                    kind: "quantum".to_string(),
                },
            ),
            StageNode::new("out", "Results", StageParams::Sink(SinkParams::default())),
        ],
        edges: vec![
            ChannelEdge::new("reads", "out", "mystery", "in"),
            ChannelEdge::new("mystery", "out", "out", "in"),
        ],
    };

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(
        pipeline
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnsupportedStage && d.node_id == "mystery")
    );
    assert!(pipeline.script.contains("process unknown_mystery {"));
    assert!(pipeline.script.contains("exit 64"));
    assert!(
        pipeline
            .script
            .contains("// unsupported stage kind 'quantum' on node 'mystery'")
    );
}

#[test]
fn test_stale_port_suffix_resolves_silently() {
    let mut graph = source_filter_sink_graph();
    // Editors keep old handle ids around after a port rename.
    graph.edges[1] = ChannelEdge::new("node_42", "out-1", "out7", "in-1");

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(!pipeline.has_diagnostics());
    assert!(pipeline.script.contains("publish_out7(ch_node_42_out)"));
}

#[test]
fn test_unmatched_source_port_falls_back_with_diagnostic() {
    let mut graph = source_filter_sink_graph();
    graph.edges[1] = ChannelEdge::new("node_42", "nonsense", "out7", "in");

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(
        pipeline
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::AmbiguousPort
                && d.port.as_deref() == Some("nonsense"))
    );
    assert!(pipeline.script.contains("publish_out7(ch_node_42_out)"));
}

#[test]
fn test_cycle_drops_participants_and_dependents() {
    let mut graph = source_filter_sink_graph();
    // node_42 additionally reads its own downstream neighbour.
    graph.nodes.insert(
        2,
        StageNode::new(
            "echo",
            "Echo",
            StageParams::Filter(FilterParams {
                condition: FilterCondition::Contains("x".to_string()),
                negate: false,
                select: None,
                resources: ResourceSpec::default(),
            }),
        ),
    );
    graph.edges = vec![
        ChannelEdge::new("reads", "out", "node_42", "in"),
        ChannelEdge::new("echo", "out", "node_42", "in"),
        ChannelEdge::new("node_42", "out", "echo", "in"),
        ChannelEdge::new("echo", "out", "out7", "in"),
    ];

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    let cycle_drops: Vec<_> = pipeline
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::DependencyCycle)
        .collect();
    assert_eq!(cycle_drops.len(), 3);
    assert!(pipeline.stages.is_empty());
    assert!(!pipeline.script.contains("filter_node_42(ch_"));
}

#[test]
fn test_self_edge_drops_statement_and_dependents() {
    let mut graph = source_filter_sink_graph();
    // node_42 feeds its own input.
    graph
        .edges
        .push(ChannelEdge::new("node_42", "out", "node_42", "in"));

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    let cycle_drops: Vec<_> = pipeline
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::DependencyCycle)
        .collect();
    assert_eq!(cycle_drops.len(), 2);
    assert!(pipeline.stages.is_empty());
    // The self-read would be an undefined name in the workflow section.
    assert!(!pipeline.script.contains(".mix(ch_node_42_out)"));
    assert!(!pipeline.script.contains("filter_node_42(ch_"));
    assert!(!pipeline.script.contains("publish_out7(ch_"));
}

#[test]
fn test_merge_collects_all_inbound_channels() {
    let pipeline = ScriptCompiler::builder(fan_in_graph())
        .build()
        .compile()
        .expect("Failed to compile");

    assert!(
        pipeline
            .script
            .contains("ch_join_out = merge_join(ch_left_out.mix(ch_right_out).collect())")
    );
    assert!(
        pipeline
            .script
            .contains(r"for f in \$(printf '%s\\n' $srcs | sort); do")
    );
    assert!(
        pipeline
            .script
            .contains(r"printf '%s\\n' '---' >> merged.txt")
    );
}

#[test]
fn test_multi_output_stage_destructures_its_channels() {
    let pipeline = ScriptCompiler::builder(fan_in_graph())
        .build()
        .compile()
        .expect("Failed to compile");

    assert!(
        pipeline
            .script
            .contains("(ch_sums_pass, ch_sums_sums) = digest_sums(ch_join_out)")
    );
    assert!(pipeline.script.contains("publish_out(ch_sums_pass)"));
    assert_eq!(DigestAlgorithm::default().command(), "sha256sum");
    assert!(pipeline.script.contains("sha256sum"));
}

#[test]
fn test_stage_resources_render_as_directives() {
    let mut graph = source_filter_sink_graph();
    graph.nodes[1] = StageNode::new(
        "node_42",
        "Keep PASS lines",
        StageParams::Filter(FilterParams {
            condition: FilterCondition::Contains("PASS".to_string()),
            negate: false,
            select: None,
            resources: ResourceSpec {
                cpus: Some(4),
                memory_gb: Some(8),
                time_hours: Some(2),
                container: Some("docker.io/library/alpine:3".to_string()),
            },
        }),
    );

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(pipeline.script.contains("    cpus 4\n"));
    assert!(pipeline.script.contains("    memory '8 GB'\n"));
    assert!(pipeline.script.contains("    time '2h'\n"));
    assert!(
        pipeline
            .script
            .contains("    container 'docker.io/library/alpine:3'\n")
    );
}

#[test]
fn test_publish_pattern_tokens_resolve() {
    let pipeline = ScriptCompiler::builder(source_filter_sink_graph())
        .with_output_dir("archive")
        .with_publish_pattern("{run}/{date}/{stage}")
        .build()
        .compile()
        .expect("Failed to compile");

    assert!(pipeline.script.contains("params.outdir = 'archive'"));
    assert!(pipeline.script.contains(
        "publishDir \"${params.outdir}/${params.run_name}/${params.day}/publish_out7\", mode: 'copy'"
    ));
}

#[test]
fn test_select_glob_routes_non_matching_files_around() {
    let mut graph = source_filter_sink_graph();
    graph.nodes[1] = StageNode::new(
        "node_42",
        "Keep PASS lines",
        StageParams::Filter(FilterParams {
            condition: FilterCondition::Contains("PASS".to_string()),
            negate: false,
            select: Some("*.txt".to_string()),
            resources: ResourceSpec::default(),
        }),
    );

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(pipeline.script.contains(r#"case "\$f" in"#));
    assert!(pipeline.script.contains(r#"cp "\$f" "kept_\$f""#));
}

#[test]
fn test_select_glob_escapes_interpolation_characters() {
    let mut graph = source_filter_sink_graph();
    graph.nodes[1] = StageNode::new(
        "node_42",
        "Keep PASS lines",
        StageParams::Filter(FilterParams {
            condition: FilterCondition::Contains("PASS".to_string()),
            negate: false,
            select: Some("$tmp*".to_string()),
            resources: ResourceSpec::default(),
        }),
    );

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    // The dollar reaches the shell as a case pattern, not Groovy interpolation.
    assert!(pipeline.script.contains(r#"\$tmp*)"#));
}

#[test]
fn test_negated_filter_inverts_the_match() {
    let mut graph = source_filter_sink_graph();
    graph.nodes[1] = StageNode::new(
        "node_42",
        "Drop PASS lines",
        StageParams::Filter(FilterParams {
            condition: FilterCondition::Contains("PASS".to_string()),
            negate: true,
            select: None,
            resources: ResourceSpec::default(),
        }),
    );

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(
        pipeline
            .script
            .contains(r#"grep -v -F -- 'PASS' "\$f" > "kept_\$f" || test \$? -eq 1"#)
    );
}

#[test]
fn test_map_uppercase_renders_tr_pipeline() {
    let mut graph = source_filter_sink_graph();
    graph.nodes[1] = StageNode::new(
        "node_42",
        "Shout",
        StageParams::Map(MapParams {
            transform: MapTransform::Uppercase,
            select: None,
            resources: ResourceSpec::default(),
        }),
    );

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(!pipeline.has_diagnostics());
    assert!(pipeline.script.contains("process map_node_42 {"));
    assert!(pipeline.script.contains("path 'mapped_*', emit: out"));
    assert!(
        pipeline
            .script
            .contains(r#"tr '[:lower:]' '[:upper:]' < "\$f" > "mapped_\$f""#)
    );
    assert!(pipeline.script.contains("publish_out7(ch_node_42_out)"));
}

#[test]
fn test_map_replace_escapes_sed_metacharacters() {
    let mut graph = source_filter_sink_graph();
    graph.nodes[1] = StageNode::new(
        "node_42",
        "Rewrite paths",
        StageParams::Map(MapParams {
            transform: MapTransform::Replace {
                from: "a/b.c".to_string(),
                to: "x&y".to_string(),
            },
            select: None,
            resources: ResourceSpec::default(),
        }),
    );

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(
        pipeline
            .script
            .contains(r#"sed -e 's/a\\/b\\.c/x\\&y/g' "\$f" > "mapped_\$f""#)
    );
}

#[test]
fn test_line_check_validates_and_reports() {
    let mut graph = source_filter_sink_graph();
    graph.nodes[1] = StageNode::new(
        "node_42",
        "Check lines",
        StageParams::LineCheck(LineCheckParams {
            max_line_length: Some(80),
            resources: ResourceSpec::default(),
        }),
    );

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");

    // Binary input fails the run instead of passing through silently.
    assert!(
        pipeline
            .script
            .contains(r#"if [ -s "\$f" ] && ! grep -Iq . "\$f"; then"#)
    );
    assert!(pipeline.script.contains("exit 1"));
    assert!(pipeline.script.contains("awk -v max=80"));
    assert!(pipeline.script.contains("path 'report_*.txt', emit: report"));
    assert!(pipeline.script.contains("path 'issues_*.txt', emit: issues"));
    assert!(pipeline.script.contains(
        "(ch_node_42_pass, ch_node_42_report, ch_node_42_issues) = check_node_42(ch_reads_out)"
    ));
    assert!(pipeline.script.contains("publish_out7(ch_node_42_pass)"));
}

#[test]
fn test_script_stage_keeps_body_and_declared_ports() {
    let graph = PipelineGraph {
        nodes: vec![
            StageNode::new(
                "reads",
                "Input files",
                StageParams::Source(SourceParams {
                    files: vec!["a.txt".to_string()],
                }),
            ),
            StageNode {
                id: "summarize".to_string(),
                name: "Summarize".to_string(),
                params: StageParams::Script(ScriptParams {
                    body: "sort $staged > table\nsplit -l 100 table out_part_".to_string(),
                    resources: ResourceSpec::default(),
                }),
                inputs: vec![InputPort::named("staged")],
                outputs: vec![
                    OutputPort::named("table"),
                    OutputPort::labeled("out", "split parts").multi(),
                ],
            },
            StageNode::new("archive", "Results", StageParams::Sink(SinkParams::default())),
        ],
        edges: vec![
            ChannelEdge::new("reads", "out", "summarize", "staged"),
            ChannelEdge::new("summarize", "table", "archive", "in"),
        ],
    };

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");

    assert!(!pipeline.has_diagnostics());
    assert!(pipeline.script.contains("process stage_summarize {"));
    assert!(pipeline.script.contains("tag 'Summarize'"));
    assert!(pipeline.script.contains("path staged"));
    // Single-file ports bind exactly; multi-file ports collect by prefix.
    assert!(pipeline.script.contains("path 'table', emit: table"));
    assert!(pipeline.script.contains("path 'out_*', emit: out"));
    assert!(pipeline.script.contains("sort $staged > table"));
    assert!(pipeline.script.contains("split -l 100 table out_part_"));
    assert!(
        pipeline
            .script
            .contains("(ch_summarize_table, ch_summarize_out) = stage_summarize(ch_reads_out)")
    );
    assert!(pipeline.script.contains("publish_archive(ch_summarize_table)"));
}

#[test]
fn test_script_output_directive_escapes_quotes() {
    let graph = PipelineGraph {
        nodes: vec![
            StageNode::new(
                "reads",
                "Input files",
                StageParams::Source(SourceParams {
                    files: vec!["a.txt".to_string()],
                }),
            ),
            StageNode {
                id: "tally".to_string(),
                name: "Tally".to_string(),
                params: StageParams::Script(ScriptParams {
                    body: "wc -l $staged > \"day's count\"".to_string(),
                    resources: ResourceSpec::default(),
                }),
                inputs: vec![InputPort::named("staged")],
                outputs: vec![
                    OutputPort::named("day's count"),
                    OutputPort::named("part's").multi(),
                ],
            },
        ],
        edges: vec![ChannelEdge::new("reads", "out", "tally", "staged")],
    };

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    assert!(!pipeline.has_diagnostics());
    assert!(
        pipeline
            .script
            .contains(r#"path 'day\'s count', emit: day_s_count"#)
    );
    assert!(pipeline.script.contains(r#"path 'part\'s_*', emit: part_s"#));
}

#[test]
fn test_unbound_input_drops_downstream_statements() {
    let graph = PipelineGraph {
        nodes: vec![
            StageNode::new(
                "lonely",
                "No inputs",
                StageParams::Filter(FilterParams {
                    condition: FilterCondition::Contains("x".to_string()),
                    negate: false,
                    select: None,
                    resources: ResourceSpec::default(),
                }),
            ),
            StageNode::new("out", "Results", StageParams::Sink(SinkParams::default())),
        ],
        edges: vec![ChannelEdge::new("lonely", "out", "out", "in")],
    };

    let pipeline = ScriptCompiler::builder(graph)
        .build()
        .compile()
        .expect("Failed to compile");
    let unbound: Vec<_> = pipeline
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::UnboundInput)
        .collect();
    // One for the filter itself, one for the publish statement it starves.
    assert_eq!(unbound.len(), 2);
    assert!(pipeline.stages.is_empty());
    assert!(!pipeline.script.contains("filter_lonely(ch_"));
    assert!(!pipeline.script.contains("publish_out(ch_"));
}

#[test]
fn test_artifact_round_trip_preserves_the_pipeline() {
    let pipeline = ScriptCompiler::builder(fan_in_graph())
        .with_run_name("roundtrip")
        .build()
        .compile()
        .expect("Failed to compile");

    let bytes = pipeline.to_bytes().expect("Failed to serialize");
    let restored = CompiledPipeline::from_bytes(&bytes).expect("Failed to deserialize");

    assert_eq!(restored.script, pipeline.script);
    assert_eq!(restored.stages.len(), pipeline.stages.len());
    assert_eq!(restored.options.run_name, "roundtrip");
}

#[test]
fn test_artifact_rejects_garbage_bytes() {
    let result = CompiledPipeline::from_bytes(&[0xde, 0xad, 0xbe, 0xef]);
    assert!(matches!(result, Err(ArtifactError::Decode(_))));
}
