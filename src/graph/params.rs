use std::fmt;

use serde::{Deserialize, Serialize};

use super::definition::{InputPort, OutputPort};

/// The coarse stage taxonomy used by the editor and the compiler alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    Source,
    Operator,
    Stage,
    Sink,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Source => write!(f, "source"),
            StageKind::Operator => write!(f, "operator"),
            StageKind::Stage => write!(f, "stage"),
            StageKind::Sink => write!(f, "sink"),
        }
    }
}

/// Kind-specific stage configuration.
///
/// Each variant carries only its own strongly-typed parameter record; the
/// stage emitter dispatches on the tag. Editor nodes with an unrecognized
/// kind survive conversion as [`StageParams::Opaque`] so the compiler can
/// surface them as clearly labeled placeholders instead of failing.
#[derive(Debug, Clone)]
pub enum StageParams {
    Source(SourceParams),
    Filter(FilterParams),
    Map(MapParams),
    Merge(MergeParams),
    LineCheck(LineCheckParams),
    Digest(DigestParams),
    Script(ScriptParams),
    Sink(SinkParams),
    Opaque { kind: String },
}

/// A file source: the list of input paths staged into the run.
#[derive(Debug, Clone, Default)]
pub struct SourceParams {
    pub files: Vec<String>,
}

/// Line filter operator: keep (or drop, when negated) matching lines.
#[derive(Debug, Clone)]
pub struct FilterParams {
    pub condition: FilterCondition,
    pub negate: bool,
    /// Optional shell glob restricting the operator to matching input files;
    /// non-matching files pass through untouched.
    pub select: Option<String>,
    pub resources: ResourceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCondition {
    Contains(String),
    Prefix(String),
    Suffix(String),
    Pattern(String),
}

/// Line map operator: rewrite every line of every input file.
#[derive(Debug, Clone)]
pub struct MapParams {
    pub transform: MapTransform,
    pub select: Option<String>,
    pub resources: ResourceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapTransform {
    Uppercase,
    Lowercase,
    Replace { from: String, to: String },
}

/// Merge operator: concatenate all collected producer files into one.
#[derive(Debug, Clone, Default)]
pub struct MergeParams {
    /// Literal line written between consecutive files; absent means none.
    pub separator: Option<String>,
    pub resources: ResourceSpec,
}

/// Preset stage: audit text inputs, producing the files unchanged plus a
/// counts report and an issue listing. Rejects binary input at run time.
#[derive(Debug, Clone, Default)]
pub struct LineCheckParams {
    /// Lines longer than this are flagged in the issue report.
    pub max_line_length: Option<u32>,
    pub resources: ResourceSpec,
}

/// Preset stage: pass files through and emit a checksum listing beside them.
#[derive(Debug, Clone, Default)]
pub struct DigestParams {
    pub algorithm: DigestAlgorithm,
    pub resources: ResourceSpec,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
}

impl DigestAlgorithm {
    /// The coreutils command implementing this algorithm.
    pub fn command(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5sum",
            DigestAlgorithm::Sha1 => "sha1sum",
            DigestAlgorithm::Sha256 => "sha256sum",
        }
    }
}

/// Generic stage: the user-supplied script body is emitted verbatim.
#[derive(Debug, Clone, Default)]
pub struct ScriptParams {
    pub body: String,
    pub resources: ResourceSpec,
}

/// Output sink: publish incoming files into the configured output directory.
#[derive(Debug, Clone, Default)]
pub struct SinkParams {
    pub resources: ResourceSpec,
}

/// Per-stage resource limits and execution environment.
///
/// `None` fields fall back to the compile-wide defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpus: Option<u32>,
    pub memory_gb: Option<u32>,
    pub time_hours: Option<u32>,
    pub container: Option<String>,
}

impl StageParams {
    /// The coarse kind this parameter record belongs to.
    pub fn kind(&self) -> StageKind {
        match self {
            StageParams::Source(_) => StageKind::Source,
            StageParams::Filter(_) | StageParams::Map(_) | StageParams::Merge(_) => {
                StageKind::Operator
            }
            StageParams::LineCheck(_)
            | StageParams::Digest(_)
            | StageParams::Script(_)
            | StageParams::Opaque { .. } => StageKind::Stage,
            StageParams::Sink(_) => StageKind::Sink,
        }
    }

    /// Short lowercase word used to build process names; the status tracker
    /// maps these back to display labels by substring.
    pub fn kind_word(&self) -> &'static str {
        match self {
            StageParams::Source(_) => "source",
            StageParams::Filter(_) => "filter",
            StageParams::Map(_) => "map",
            StageParams::Merge(_) => "merge",
            StageParams::LineCheck(_) => "check",
            StageParams::Digest(_) => "digest",
            StageParams::Script(_) => "stage",
            StageParams::Sink(_) => "publish",
            StageParams::Opaque { .. } => "unknown",
        }
    }

    /// Per-stage resource overrides, when the kind carries any.
    pub fn resources(&self) -> Option<&ResourceSpec> {
        match self {
            StageParams::Filter(p) => Some(&p.resources),
            StageParams::Map(p) => Some(&p.resources),
            StageParams::Merge(p) => Some(&p.resources),
            StageParams::LineCheck(p) => Some(&p.resources),
            StageParams::Digest(p) => Some(&p.resources),
            StageParams::Script(p) => Some(&p.resources),
            StageParams::Sink(p) => Some(&p.resources),
            StageParams::Source(_) | StageParams::Opaque { .. } => None,
        }
    }

    /// The input ports a node of this kind declares when the editor omits them.
    pub(crate) fn default_inputs(&self) -> Vec<InputPort> {
        match self.kind() {
            StageKind::Source => Vec::new(),
            _ => vec![InputPort::named("in")],
        }
    }

    /// The output ports a node of this kind declares when the editor omits them.
    pub(crate) fn default_outputs(&self) -> Vec<OutputPort> {
        match self {
            StageParams::Sink(_) => Vec::new(),
            // Merging is the one stage that collapses its inputs to one file.
            StageParams::Merge(_) => vec![OutputPort::named("out")],
            StageParams::LineCheck(_) => vec![
                OutputPort::named("pass").multi(),
                OutputPort::labeled("report", "counts report").multi(),
                OutputPort::labeled("issues", "issue listing").multi(),
            ],
            StageParams::Digest(_) => vec![
                OutputPort::named("pass").multi(),
                OutputPort::labeled("sums", "checksum listing").multi(),
            ],
            _ => vec![OutputPort::named("out").multi()],
        }
    }
}
