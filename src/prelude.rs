//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the nagare crate.
//! Import this module to get access to the core functionality without having to import
//! each type individually.
//!
//! # Example
//!
//! ```rust,no_run
//! // Use the prelude to get easy access to all the core types.
//! use nagare::prelude::*;
//! use chrono::Utc;
//!
//! # fn run_example(graph: nagare::graph::PipelineGraph) -> Result<()> {
//! // Compile a pipeline graph into one deterministic script
//! let pipeline = ScriptCompiler::builder(graph)
//!     .with_run_name("demo")
//!     .build()
//!     .compile()?;
//! pipeline.save("pipeline.nbin")?;
//!
//! // Reconstruct run progress from captured engine output
//! let mut tracker = ExecutionTracker::new().with_expected_stages(&pipeline);
//! tracker.start_run(Utc::now());
//! let log = std::fs::read_to_string("run.log")?;
//! tracker.process_lines(log.lines(), Utc::now());
//!
//! println!("Run status: {:?}", tracker.snapshot().state);
//! # Ok(())
//! # }
//! ```

// Core compilation and tracking
pub use crate::compile::{
    CompileOptions, CompiledPipeline, Diagnostic, DiagnosticKind, ScriptCompiler, StageSummary,
};
pub use crate::track::{ExecutionTracker, StatusObserver};

// Graph model
pub use crate::graph::{ChannelEdge, IntoPipeline, PipelineGraph, StageNode, StageParams};

// Status snapshot types
pub use crate::track::{NodeExecutionStatus, RunState, StageState, WorkflowExecutionStatus};

// Run collaborators
pub use crate::run::{
    EngineLauncher, EngineRun, LaunchRequest, NoCancel, RunCanceller, RunController, RunId,
};

// Error types
pub use crate::error::{ArtifactError, CompileError, GraphConversionError, LaunchError};

// Standard library re-exports commonly used with this crate
pub use std::path::Path;

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
