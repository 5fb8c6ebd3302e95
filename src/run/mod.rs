//! Collaborator seams for actually executing a compiled pipeline.
//!
//! The engine lives out of process. The library only defines the seams: a
//! launcher that turns a [`LaunchRequest`] into a running engine with an
//! ordered output stream, a canceller keyed by run id, and a controller that
//! pumps the stream through an [`ExecutionTracker`]. Hosts plug in real
//! process spawning (the CLI does) or fakes (the tests do).

use std::fmt;
use std::io;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compile::CompiledPipeline;
use crate::error::LaunchError;
use crate::track::{ExecutionTracker, WorkflowExecutionStatus};

/// Opaque identifier of one engine run, assigned by the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a launcher needs to start the engine for one compiled script.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// The assembled script text.
    pub script: String,
    pub run_name: String,
    /// Directory the launcher materializes the script into and runs from.
    pub workdir: PathBuf,
}

impl LaunchRequest {
    pub fn from_pipeline(pipeline: &CompiledPipeline, workdir: impl Into<PathBuf>) -> Self {
        Self {
            script: pipeline.script.clone(),
            run_name: pipeline.options.run_name.clone(),
            workdir: workdir.into(),
        }
    }
}

/// A launched engine: its id plus the combined, ordered stdout/stderr stream.
pub struct EngineRun {
    pub id: RunId,
    /// Lines in arrival order; the stream ends when the engine exits.
    pub lines: Box<dyn Iterator<Item = io::Result<String>> + Send>,
    wait: Box<dyn FnOnce() -> i32 + Send>,
}

impl EngineRun {
    pub fn new(
        id: RunId,
        lines: Box<dyn Iterator<Item = io::Result<String>> + Send>,
        wait: impl FnOnce() -> i32 + Send + 'static,
    ) -> Self {
        Self {
            id,
            lines,
            wait: Box::new(wait),
        }
    }
}

/// Starts the external engine for a request.
pub trait EngineLauncher: Send {
    fn launch(&self, request: &LaunchRequest) -> Result<EngineRun, LaunchError>;
}

/// Best-effort cancellation keyed by run id.
///
/// Returning `true` only means the signal was delivered; the process may
/// still be unwinding afterwards. The tracker is marked cancelled either way.
pub trait RunCanceller: Send {
    fn cancel(&self, id: &RunId) -> bool;
}

/// A canceller for hosts without one; every request is reported undelivered.
pub struct NoCancel;

impl RunCanceller for NoCancel {
    fn cancel(&self, _id: &RunId) -> bool {
        false
    }
}

/// Drives one workflow instance: at most one active run, whose output stream
/// is folded into the owned tracker.
///
/// The controller reads the wall clock; the tracker itself never does.
pub struct RunController<L: EngineLauncher, C: RunCanceller> {
    launcher: L,
    canceller: C,
    tracker: ExecutionTracker,
    active: Option<RunId>,
}

impl<L: EngineLauncher, C: RunCanceller> RunController<L, C> {
    pub fn new(launcher: L, canceller: C) -> Self {
        Self {
            launcher,
            canceller,
            tracker: ExecutionTracker::new(),
            active: None,
        }
    }

    /// Replaces the default tracker, e.g. with one seeded from the compiled
    /// pipeline and carrying subscribers.
    pub fn with_tracker(mut self, tracker: ExecutionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ExecutionTracker {
        &mut self.tracker
    }

    /// Launches the engine and resets the tracker for the new run. Fails when
    /// a run is still active; the previous run must be pumped to completion
    /// or cancelled first.
    pub fn start(&mut self, request: &LaunchRequest) -> Result<EngineRun, LaunchError> {
        if let Some(active) = &self.active {
            return Err(LaunchError::RunInProgress(active.0.clone()));
        }
        let run = self.launcher.launch(request)?;
        info!(run_id = %run.id, run_name = %request.run_name, "engine launched");
        self.active = Some(run.id.clone());
        self.tracker.start_run(Utc::now());
        Ok(run)
    }

    /// Drains the run's output stream synchronously, feeding every line to
    /// the tracker, then folds the exit code in. Returns the final snapshot.
    pub fn pump(&mut self, run: EngineRun) -> WorkflowExecutionStatus {
        let EngineRun { id, lines, wait } = run;
        for line in lines {
            match line {
                Ok(line) => self.tracker.process_line(&line, Utc::now()),
                Err(e) => {
                    warn!(run_id = %id, "engine stream read failed: {}", e);
                    break;
                }
            }
        }
        let exit_code = wait();
        info!(run_id = %id, exit_code, "engine exited");
        self.tracker.finish(exit_code, Utc::now());
        if self.active.as_ref() == Some(&id) {
            self.active = None;
        }
        self.tracker.snapshot().clone()
    }

    /// Launches and pumps in one call; the synchronous path hosts without
    /// their own event loop use.
    pub fn run_to_completion(
        &mut self,
        request: &LaunchRequest,
    ) -> Result<WorkflowExecutionStatus, LaunchError> {
        let run = self.start(request)?;
        Ok(self.pump(run))
    }

    /// Signals the active run to stop and marks the tracker cancelled
    /// immediately, without waiting for the process to die.
    pub fn cancel(&mut self) -> bool {
        let Some(id) = self.active.take() else {
            return false;
        };
        let delivered = self.canceller.cancel(&id);
        if !delivered {
            warn!(run_id = %id, "cancellation signal could not be delivered");
        }
        self.tracker.cancel(Utc::now());
        delivered
    }
}
