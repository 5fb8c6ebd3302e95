use thiserror::Error;

/// Hard failures of the compilation phase.
///
/// Almost every graph defect degrades to a [`Diagnostic`](crate::compile::Diagnostic)
/// so a best-effort script can still be produced; these variants are reserved for
/// input that cannot yield a meaningful script at all.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("The pipeline graph contains no nodes")]
    EmptyGraph,
}

/// Errors that can occur when converting a custom editor format into a
/// [`PipelineGraph`](crate::graph::PipelineGraph).
#[derive(Error, Debug, Clone)]
pub enum GraphConversionError {
    #[error("Invalid pipeline document: {0}")]
    ValidationError(String),
}

/// Errors around saving and loading compiled pipeline artifacts.
#[derive(Error, Debug, Clone)]
pub enum ArtifactError {
    #[error("Artifact serialization failed: {0}")]
    Encode(String),

    #[error("Artifact deserialization failed: {0}")]
    Decode(String),

    #[error("Artifact I/O failed for '{path}': {message}")]
    Io { path: String, message: String },
}

/// Errors raised by an engine launcher collaborator when a run cannot be started.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to start engine process: {0}")]
    Spawn(String),

    #[error("A run is already active for this workflow (run id '{0}')")]
    RunInProgress(String),
}
