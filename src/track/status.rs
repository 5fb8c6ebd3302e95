use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one run: `idle -> running -> {completed | failed | cancelled}`,
/// then back to `idle` after the display window elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }
}

/// Per-stage status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Waiting,
    Running,
    Success,
    Error,
    Skipped,
}

impl StageState {
    /// Terminal stage states never revert within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Success | StageState::Error | StageState::Skipped
        )
    }
}

/// Live status of one tracked stage.
///
/// The `key` is the engine-assigned stage name as it appears in the output
/// stream. It is discovered at run time and is not the editor's node id,
/// although the compiled process names are built to make the two correlatable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionStatus {
    pub key: String,
    pub display_name: String,
    pub state: StageState,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Percentage in `0..=100`; non-decreasing within a run.
    pub progress: Option<u8>,
    pub completed: Option<u32>,
    pub total: Option<u32>,
    pub error: Option<String>,
}

impl NodeExecutionStatus {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            state: StageState::Waiting,
            started_at: None,
            ended_at: None,
            progress: None,
            completed: None,
            total: None,
            error: None,
        }
    }
}

/// Aggregate snapshot of one run, replaced wholesale when a new run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionStatus {
    pub state: RunState,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Expected stage count when seeded from a compiled pipeline, otherwise
    /// the number of stages discovered so far.
    pub stages_total: usize,
    pub stages_completed: usize,
    pub stages_failed: usize,
    pub stages_running: usize,
    /// Tracked stages in discovery order; entries are created lazily and
    /// never deleted during a run.
    pub stages: Vec<NodeExecutionStatus>,
    /// Free-text label of whatever the engine reported last.
    pub current_stage: Option<String>,
    /// Overall percentage in `0..=100`.
    pub progress: u8,
    /// Last known diagnostic text when the run failed.
    pub error: Option<String>,
}

impl Default for WorkflowExecutionStatus {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            running: false,
            started_at: None,
            ended_at: None,
            stages_total: 0,
            stages_completed: 0,
            stages_failed: 0,
            stages_running: 0,
            stages: Vec::new(),
            current_stage: None,
            progress: 0,
            error: None,
        }
    }
}

impl WorkflowExecutionStatus {
    /// Recomputes the aggregate counters and the overall percentage from the
    /// tracked stages. `expected_total` widens the denominator when the run
    /// was seeded from a compiled pipeline.
    pub(super) fn recount(&mut self, expected_total: usize) {
        self.stages_total = expected_total.max(self.stages.len());
        self.stages_completed = self
            .stages
            .iter()
            .filter(|s| matches!(s.state, StageState::Success | StageState::Skipped))
            .count();
        self.stages_failed = self
            .stages
            .iter()
            .filter(|s| s.state == StageState::Error)
            .count();
        self.stages_running = self
            .stages
            .iter()
            .filter(|s| s.state == StageState::Running)
            .count();

        if self.state == RunState::Completed {
            self.progress = 100;
        } else if self.stages_total > 0 {
            let sum: u32 = self
                .stages
                .iter()
                .map(|s| u32::from(s.progress.unwrap_or(0)))
                .sum();
            let average = sum / self.stages_total as u32;
            // Progress never moves backwards within a run.
            self.progress = self.progress.max(average.min(100) as u8);
        }
    }

    /// The tracked stage for an engine-assigned key, if discovered already.
    pub fn stage(&self, key: &str) -> Option<&NodeExecutionStatus> {
        self.stages.iter().find(|s| s.key == key)
    }
}
