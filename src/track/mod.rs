//! Streaming reconstruction of run progress from engine console output.
//!
//! The engine reports progress as unstructured text. The tracker consumes
//! that stream one line at a time, classifies each line through the
//! [`recognizer`] set, and folds the resulting events into a
//! [`WorkflowExecutionStatus`] snapshot. Per-stage progress is monotonic
//! within a run and terminal stage states never revert; feeding the same
//! terminal line twice is a no-op.
//!
//! The tracker never reads the wall clock itself. Callers pass `now` into
//! every mutating call, which keeps replay deterministic and tests exact.

pub mod recognizer;
mod status;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::compile::CompiledPipeline;
pub use recognizer::{ExecutionEvent, classify, display_name_for, normalize_line};
pub use status::{NodeExecutionStatus, RunState, StageState, WorkflowExecutionStatus};

/// How long a finished run stays visible before the snapshot resets to idle.
const DISPLAY_WINDOW_SECS: i64 = 10;

/// Receives the refreshed snapshot after every processed line or transition.
pub trait StatusObserver: Send {
    fn status_changed(&mut self, status: &WorkflowExecutionStatus);
}

/// Expected stage identity, seeded from a compiled pipeline so display names
/// and the total count are known before the engine mentions any stage.
#[derive(Debug, Clone)]
struct ExpectedStage {
    process_name: String,
    display_label: String,
}

/// Stateful line-to-status folder for one workflow instance.
///
/// Runs move `idle -> running -> {completed | failed | cancelled} -> idle`.
/// Starting a new run replaces the snapshot wholesale; stage entries from an
/// earlier run never leak into the next one.
pub struct ExecutionTracker {
    status: WorkflowExecutionStatus,
    expected: Vec<ExpectedStage>,
    observers: Vec<Box<dyn StatusObserver>>,
    reset_at: Option<DateTime<Utc>>,
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self {
            status: WorkflowExecutionStatus::default(),
            expected: Vec::new(),
            observers: Vec::new(),
            reset_at: None,
        }
    }

    /// Seeds expected stages from a compiled pipeline. Entries are still
    /// created lazily as the engine first mentions each stage; the seed only
    /// fixes the denominator and the display names.
    pub fn with_expected_stages(mut self, pipeline: &CompiledPipeline) -> Self {
        self.expected = pipeline
            .stages
            .iter()
            .map(|stage| ExpectedStage {
                process_name: stage.process_name.clone(),
                display_label: stage.display_label.clone(),
            })
            .collect();
        self
    }

    pub fn subscribe(&mut self, observer: Box<dyn StatusObserver>) {
        self.observers.push(observer);
    }

    /// Read access to the current snapshot.
    pub fn snapshot(&self) -> &WorkflowExecutionStatus {
        &self.status
    }

    /// Begins a new run, discarding whatever the previous run left behind.
    pub fn start_run(&mut self, now: DateTime<Utc>) {
        self.status = WorkflowExecutionStatus {
            state: RunState::Running,
            running: true,
            started_at: Some(now),
            current_stage: Some("Starting".to_string()),
            ..WorkflowExecutionStatus::default()
        };
        self.status.recount(self.expected.len());
        self.reset_at = None;
        self.notify();
    }

    /// Feeds one raw output line. Lines arriving while no run is active, or
    /// after the run reached a terminal state, are ignored.
    pub fn process_line(&mut self, raw: &str, now: DateTime<Utc>) {
        if self.status.state != RunState::Running {
            return;
        }
        let line = normalize_line(raw);
        match classify(&line) {
            ExecutionEvent::Launch { label } | ExecutionEvent::Executor { label } => {
                self.status.current_stage = Some(label);
            }
            ExecutionEvent::StagePending { key } => self.discover_stage(&key),
            ExecutionEvent::StageProgress {
                key,
                completed,
                total,
                failed,
            } => self.apply_stage_progress(&key, completed, total, failed, now),
            ExecutionEvent::StageFailed { key, message } => {
                self.mark_stage_failed(&key, &message, now);
                self.fail_run(message, now);
            }
            ExecutionEvent::WorkflowCompleted => self.complete_run(now),
            ExecutionEvent::WorkflowFailed { message } => self.fail_run(message, now),
            ExecutionEvent::WorkflowCancelled => self.cancel_run(now),
            ExecutionEvent::Unclassified => return,
        }
        self.status.recount(self.expected.len());
        self.notify();
    }

    /// Feeds a batch of lines in order, e.g. a captured log read after the fact.
    pub fn process_lines<'a>(
        &mut self,
        lines: impl IntoIterator<Item = &'a str>,
        now: DateTime<Utc>,
    ) {
        for line in lines {
            self.process_line(line, now);
        }
    }

    /// Signals end-of-stream with the engine's exit code. When no explicit
    /// completion or failure marker arrived beforehand, the exit code decides.
    pub fn finish(&mut self, exit_code: i32, now: DateTime<Utc>) {
        if self.status.state != RunState::Running {
            return;
        }
        if exit_code == 0 {
            self.complete_run(now);
        } else {
            self.fail_run(format!("engine exited with status {}", exit_code), now);
        }
        self.status.recount(self.expected.len());
        self.notify();
    }

    /// Marks the run cancelled immediately. Best-effort by contract: the
    /// engine process may still be unwinding while the snapshot already says
    /// cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        if self.status.state != RunState::Running {
            return;
        }
        self.cancel_run(now);
        self.status.recount(self.expected.len());
        self.notify();
    }

    /// Clears the snapshot back to idle once the display window has elapsed
    /// after a terminal state. Callers poll this from their event loop.
    pub fn maybe_reset(&mut self, now: DateTime<Utc>) {
        if !self.status.state.is_terminal() {
            return;
        }
        let Some(reset_at) = self.reset_at else {
            return;
        };
        if now >= reset_at {
            self.status = WorkflowExecutionStatus::default();
            self.reset_at = None;
            self.notify();
        }
    }

    /// The display label for an engine-assigned key: the seeded pipeline label
    /// when known, the built-in kind table otherwise.
    fn display_for(&self, key: &str) -> String {
        self.expected
            .iter()
            .find(|e| e.process_name == key)
            .map(|e| e.display_label.clone())
            .unwrap_or_else(|| display_name_for(key))
    }

    /// Registers a stage as waiting without touching existing entries.
    fn discover_stage(&mut self, key: &str) {
        if self.status.stages.iter().any(|s| s.key == key) {
            return;
        }
        let display = self.display_for(key);
        self.status.stages.push(NodeExecutionStatus::new(key, display));
    }

    fn mark_stage_failed(&mut self, key: &str, message: &str, now: DateTime<Utc>) {
        let display = self.display_for(key);
        let index = match self.status.stages.iter().position(|s| s.key == key) {
            Some(index) => index,
            None => {
                self.status
                    .stages
                    .push(NodeExecutionStatus::new(key, display));
                self.status.stages.len() - 1
            }
        };
        let stage = &mut self.status.stages[index];
        if stage.state.is_terminal() {
            return;
        }
        stage.state = StageState::Error;
        stage.ended_at = Some(now);
        stage.error = Some(message.to_string());
    }

    fn apply_stage_progress(
        &mut self,
        key: &str,
        completed: u32,
        total: u32,
        failed: bool,
        now: DateTime<Utc>,
    ) {
        let display = self.display_for(key);

        let index = match self.status.stages.iter().position(|s| s.key == key) {
            Some(index) => index,
            None => {
                let mut stage = NodeExecutionStatus::new(key, display.clone());
                stage.started_at = Some(now);
                self.status.stages.push(stage);
                self.status.stages.len() - 1
            }
        };
        let stage = &mut self.status.stages[index];

        // A terminal stage holds its state; later lines for it are echoes.
        if stage.state.is_terminal() {
            return;
        }
        if stage.started_at.is_none() {
            stage.started_at = Some(now);
        }

        let percent = if total == 0 {
            0
        } else {
            ((u64::from(completed) * 100) / u64::from(total)).min(100) as u8
        };
        stage.progress = Some(stage.progress.unwrap_or(0).max(percent));
        stage.completed = Some(stage.completed.unwrap_or(0).max(completed));
        stage.total = Some(stage.total.unwrap_or(0).max(total));

        if failed {
            stage.state = StageState::Error;
            stage.ended_at = Some(now);
            stage.error = Some("task failed".to_string());
        } else if total > 0 && completed >= total {
            stage.state = StageState::Success;
            stage.progress = Some(100);
            stage.ended_at = Some(now);
        } else {
            stage.state = StageState::Running;
        }
        self.status.current_stage = Some(display);
    }

    fn complete_run(&mut self, now: DateTime<Utc>) {
        self.status.state = RunState::Completed;
        self.status.running = false;
        self.status.ended_at = Some(now);
        self.status.current_stage = Some("Completed".to_string());
        // Stages the engine never got around to reporting as done finished
        // with the run.
        for stage in &mut self.status.stages {
            if !stage.state.is_terminal() {
                stage.state = StageState::Success;
                stage.progress = Some(100);
                stage.ended_at = Some(now);
            }
        }
        self.status.progress = 100;
        self.schedule_reset(now);
    }

    fn cancel_run(&mut self, now: DateTime<Utc>) {
        debug!("run cancelled");
        self.status.state = RunState::Cancelled;
        self.status.running = false;
        self.status.ended_at = Some(now);
        self.status.current_stage = Some("Cancelled".to_string());
        self.schedule_reset(now);
    }

    fn fail_run(&mut self, message: String, now: DateTime<Utc>) {
        debug!(message = %message, "run failed");
        self.status.state = RunState::Failed;
        self.status.running = false;
        self.status.ended_at = Some(now);
        self.status.current_stage = Some("Failed".to_string());
        self.status.error = Some(message);
        self.schedule_reset(now);
    }

    fn schedule_reset(&mut self, now: DateTime<Utc>) {
        self.reset_at = Some(now + Duration::seconds(DISPLAY_WINDOW_SECS));
    }

    fn notify(&mut self) {
        let status = &self.status;
        for observer in &mut self.observers {
            observer.status_changed(status);
        }
    }
}
