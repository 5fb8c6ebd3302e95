use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// A classified unit derived from one raw engine output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// Workflow-launch banner; carries a label for the current-stage display.
    Launch { label: String },
    /// Executor/aggregate banner; informational, label only.
    Executor { label: String },
    /// A stage listed as pending, before any task of it was submitted.
    StagePending { key: String },
    /// The primary per-stage progress line.
    StageProgress {
        /// Engine-assigned stage name, prefix and instance suffix stripped.
        key: String,
        completed: u32,
        total: u32,
        /// True when the line carries a failure marker.
        failed: bool,
    },
    /// A process-level error report; fails the stage and the run.
    StageFailed { key: String, message: String },
    WorkflowCompleted,
    WorkflowFailed { message: String },
    WorkflowCancelled,
    /// Anything else; ignored by the tracker.
    Unclassified,
}

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[@-~]").expect("valid ansi regex"));

static BANNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^N E X T F L O W\b").expect("valid banner regex"));

static LAUNCHING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Launching\s+\S+\s+\[([^\]]+)\]").expect("valid launch regex"));

static EXECUTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^executor\s*>\s*(.+)$").expect("valid executor regex"));

static EXECUTOR_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\)").expect("valid executor count regex"));

static PENDING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[-\s*\]\s+(?:process\s*>\s*)?((?:[A-Za-z_][A-Za-z0-9_]*:)*[A-Za-z_][A-Za-z0-9_]*)(?:\s+-)?\s*$",
    )
    .expect("valid pending regex")
});

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[([0-9A-Za-z]+/[0-9A-Za-z]+)\]\s+(?:process\s*>\s*)?(?:[A-Za-z_][A-Za-z0-9_]*:)*([A-Za-z_][A-Za-z0-9_]*)(?:\s+\(\d+\))?(?:\s+\[\s*\d+%\s*\])?\s*(?:\|\s*)?(\d+)\s+of\s+(\d+)\b(.*)$",
    )
    .expect("valid progress regex")
});

static STAGE_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*ERROR\s*~\s*(Error\s+executing\s+process\s*>\s*'((?:[A-Za-z_][A-Za-z0-9_]*:)*[A-Za-z_][A-Za-z0-9_]*)(?:\s+\(\d+\))?'.*)$",
    )
    .expect("valid stage error regex")
});

static COMPLETED_ERRORS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)completed\s+with\s+errors").expect("valid completed-with-errors regex")
});

static COMPLETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:pipeline\s+)?completed\s+at\s*:|pipeline\s+completed\s+successfully|workflow\s+(?:execution\s+)?completed\b|execution\s+complete\s*--)",
    )
    .expect("valid completion regex")
});

static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*ERROR\s*~\s*(.+)$").expect("valid error regex"));

static ABORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*execution\s+(?:aborted|failed)\b").expect("valid abort regex")
});

static CANCEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)execution\s+cancelled").expect("valid cancel regex"));

/// Strips terminal escape sequences and carriage-return redraws, leaving the
/// text the user would actually see for that line.
pub fn normalize_line(raw: &str) -> String {
    let stripped: Cow<'_, str> = ANSI_RE.replace_all(raw, "");
    let visible = match stripped.rfind('\r') {
        Some(pos) => &stripped[pos + 1..],
        None => stripped.as_ref(),
    };
    visible.trim_end().to_string()
}

/// Drops a workflow-path prefix (`flow:sub:name` becomes `name`); compiled
/// scripts are flat, but engines qualify names when users nest workflows.
fn stage_key(raw: &str) -> String {
    match raw.rsplit(':').next() {
        Some(key) => key.to_string(),
        None => raw.to_string(),
    }
}

/// Classifies one normalized line. Recognizers run in a fixed priority order
/// and the first match wins; lines matching none are unclassified and ignored.
pub fn classify(line: &str) -> ExecutionEvent {
    if BANNER_RE.is_match(line) {
        return ExecutionEvent::Launch {
            label: "Starting workflow".to_string(),
        };
    }
    if let Some(captures) = LAUNCHING_RE.captures(line) {
        return ExecutionEvent::Launch {
            label: format!("Launching run '{}'", &captures[1]),
        };
    }
    if let Some(captures) = EXECUTOR_RE.captures(line) {
        let detail = captures[1].trim();
        let label = match EXECUTOR_COUNT_RE.captures(detail) {
            Some(count) => format!("running ({})", &count[1]),
            None => format!("running ({})", detail),
        };
        return ExecutionEvent::Executor { label };
    }
    if let Some(captures) = PENDING_RE.captures(line) {
        return ExecutionEvent::StagePending {
            key: stage_key(&captures[1]),
        };
    }
    if let Some(captures) = PROGRESS_RE.captures(line) {
        let completed = captures[3].parse().unwrap_or(0);
        let total = captures[4].parse().unwrap_or(0);
        let trailer = &captures[5];
        return ExecutionEvent::StageProgress {
            key: captures[2].to_string(),
            completed,
            total,
            failed: trailer.contains('\u{274c}') || trailer.contains("failed"),
        };
    }
    if let Some(captures) = STAGE_ERROR_RE.captures(line) {
        return ExecutionEvent::StageFailed {
            key: stage_key(&captures[2]),
            message: captures[1].trim().to_string(),
        };
    }
    // "completed with errors" contains a completion phrase, so the failure
    // variant has to be tested before the completion markers.
    if COMPLETED_ERRORS_RE.is_match(line) {
        return ExecutionEvent::WorkflowFailed {
            message: line.trim().to_string(),
        };
    }
    if COMPLETED_RE.is_match(line) {
        return ExecutionEvent::WorkflowCompleted;
    }
    // Cancellation appears as a WARN variant of the abort notices, so it has
    // to be tested before the generic failure markers.
    if CANCEL_RE.is_match(line) {
        return ExecutionEvent::WorkflowCancelled;
    }
    if let Some(captures) = ERROR_RE.captures(line) {
        return ExecutionEvent::WorkflowFailed {
            message: captures[1].trim().to_string(),
        };
    }
    if ABORT_RE.is_match(line) {
        return ExecutionEvent::WorkflowFailed {
            message: line.trim().to_string(),
        };
    }
    ExecutionEvent::Unclassified
}

/// Maps an engine-assigned stage name to a short display label. Compiled
/// process names start with a kind word, so a prefix match is tried first and
/// a plain substring match mops up renamed or truncated variants.
pub fn display_name_for(key: &str) -> String {
    const LABELS: [(&str, &str); 9] = [
        ("publish", "Publish"),
        ("merge", "Merge"),
        ("digest", "Digest"),
        ("check", "Line check"),
        ("filter", "Filter"),
        ("map", "Map"),
        ("stage", "Stage"),
        ("source", "Source"),
        ("unknown", "Unknown stage"),
    ];
    for (pattern, label) in LABELS {
        if key == pattern || key.starts_with(&format!("{}_", pattern)) {
            return label.to_string();
        }
    }
    for (pattern, label) in LABELS {
        if key.contains(pattern) {
            return label.to_string();
        }
    }
    key.to_string()
}
