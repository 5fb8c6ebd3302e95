//! # Nagare - Pipeline Graph Compilation and Run Tracking Engine
//!
//! **Nagare** turns node-based pipeline graphs from a visual editor into
//! deterministic workflow scripts for a Nextflow-compatible engine, and
//! reconstructs live per-stage progress from the engine's console output.
//! Built with Rust's type safety in mind, Nagare compiles graphs ahead of
//! time so the same graph always launches the same script.
//!
//! ## Core Workflow
//!
//! The engine is format-agnostic. It operates on a canonical internal model
//! of a "pipeline graph." The primary workflow is:
//!
//! 1.  **Load Your Data**: Parse your editor's document format (e.g., from JSON) into your own Rust structs.
//! 2.  **Convert to Nagare's Model**: Implement the `IntoPipeline` trait for your structs to provide a translation layer into Nagare's `PipelineGraph`.
//! 3.  **Compile**: Use `ScriptCompiler::builder` to create a compiler instance with the `PipelineGraph`. The compiler binds channels, emits stage blocks, orders the workflow statements and assembles one script.
//! 4.  **Run and Track**: Launch the script through an `EngineLauncher` and feed the output stream into an `ExecutionTracker` to get a live `WorkflowExecutionStatus` snapshot.
//!
//! ## Quick Start
//!
//! The following example demonstrates the end-to-end process.
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//! use nagare::graph::{
//!     ChannelEdge, FilterCondition, FilterParams, PipelineGraph, ResourceSpec, SinkParams,
//!     SourceParams, StageNode, StageParams,
//! };
//! use chrono::Utc;
//!
//! fn main() -> Result<()> {
//!     // 1. Assemble (or convert, via `IntoPipeline`) the canonical graph.
//!     let graph = PipelineGraph {
//!         nodes: vec![
//!             StageNode::new(
//!                 "reads",
//!                 "Input files",
//!                 StageParams::Source(SourceParams {
//!                     files: vec!["data/a.txt".to_string(), "data/b.txt".to_string()],
//!                 }),
//!             ),
//!             StageNode::new(
//!                 "keep_pass",
//!                 "Keep PASS lines",
//!                 StageParams::Filter(FilterParams {
//!                     condition: FilterCondition::Contains("PASS".to_string()),
//!                     negate: false,
//!                     select: None,
//!                     resources: ResourceSpec::default(),
//!                 }),
//!             ),
//!             StageNode::new("out", "Results", StageParams::Sink(SinkParams::default())),
//!         ],
//!         edges: vec![
//!             ChannelEdge::new("reads", "out", "keep_pass", "in"),
//!             ChannelEdge::new("keep_pass", "out", "out", "in"),
//!         ],
//!     };
//!
//!     // 2. Compile the graph into one deterministic script.
//!     let pipeline = ScriptCompiler::builder(graph)
//!         .with_run_name("demo")
//!         .with_output_dir("results")
//!         .build()
//!         .compile()?;
//!     println!("{}", pipeline.script);
//!
//!     // 3. Track a run from the engine's output lines.
//!     let mut tracker = ExecutionTracker::new().with_expected_stages(&pipeline);
//!     tracker.start_run(Utc::now());
//!     tracker.process_line("[a1/b2c3] filter_keep_pass | 1 of 1 \u{2714}", Utc::now());
//!     tracker.process_line("Completed at: 24-Aug-2026 10:00:01", Utc::now());
//!
//!     let status = tracker.snapshot();
//!     println!("run state: {:?}, progress: {}%", status.state, status.progress);
//!     Ok(())
//! }
//! ```

pub mod compile;
pub mod error;
pub mod graph;
pub mod prelude;
pub mod run;
pub mod track;
