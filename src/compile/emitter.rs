use itertools::Itertools;

use super::CompileOptions;
use super::binder::sanitize_identifier;
use super::diagnostics::{Diagnostic, DiagnosticKind};
use crate::graph::{
    DigestParams, FilterCondition, FilterParams, LineCheckParams, MapParams, MapTransform,
    MergeParams, ResourceSpec, ScriptParams, StageNode, StageParams,
};

/// Fallback execution environment for stages that pin no container.
pub const DEFAULT_CONTAINER: &str = "docker.io/library/debian:bookworm-slim";
const DEFAULT_CPUS: u32 = 1;
const DEFAULT_MEMORY_GB: u32 = 2;

/// Issue-report threshold used when a line-check stage sets no limit.
const DEFAULT_MAX_LINE_LENGTH: u32 = 1024;

/// The emitted definition block for one stage node.
#[derive(Debug, Clone)]
pub(super) struct StageBlock {
    pub node_id: String,
    pub process_name: String,
    /// Friendly label for status displays; the editor's node name when set,
    /// otherwise the kind label.
    pub display_label: String,
    pub kind_word: &'static str,
    pub publish: bool,
    /// Declared input port names in editor order; invocation binding follows it.
    pub input_ports: Vec<String>,
    pub text: String,
}

/// Emits the template-specialized process block for one stage node.
///
/// Dispatch is by the params tag. Unknown configurations emit a clearly
/// labeled placeholder process that fails at run time, so a human can
/// diagnose the problem from the script text itself, plus a diagnostic.
pub(super) fn emit_stage(
    node: &StageNode,
    options: &CompileOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> StageBlock {
    let process_name = process_name_for(node);
    let kind_word = node.params.kind_word();
    let resources = effective_resources(node.params.resources(), &options.defaults);

    let (inputs, outputs, body, header_comment) = match &node.params {
        StageParams::Filter(p) => (
            vec!["path src".to_string()],
            vec!["path 'kept_*', emit: out".to_string()],
            filter_body(p),
            None,
        ),
        StageParams::Map(p) => (
            vec!["path src".to_string()],
            vec!["path 'mapped_*', emit: out".to_string()],
            map_body(p),
            None,
        ),
        StageParams::Merge(p) => (
            vec!["path srcs".to_string()],
            vec!["path 'merged.txt', emit: out".to_string()],
            merge_body(p),
            None,
        ),
        StageParams::LineCheck(p) => (
            vec!["path src".to_string()],
            vec![
                "path 'pass_*', emit: pass".to_string(),
                "path 'report_*.txt', emit: report".to_string(),
                "path 'issues_*.txt', emit: issues".to_string(),
            ],
            line_check_body(p),
            None,
        ),
        StageParams::Digest(p) => (
            vec!["path src".to_string()],
            vec![
                "path 'pass_*', emit: pass".to_string(),
                "path 'sums_*.txt', emit: sums".to_string(),
            ],
            digest_body(p),
            None,
        ),
        StageParams::Script(p) => (
            script_inputs(node),
            script_outputs(node),
            script_body(p),
            None,
        ),
        StageParams::Sink(_) => (
            vec!["path staged".to_string()],
            vec!["path '*', includeInputs: true".to_string()],
            "true\n".to_string(),
            None,
        ),
        StageParams::Opaque { kind } => {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnsupportedStage,
                &node.id,
                format!("stage kind '{}' is not supported", kind),
            ));
            (
                script_inputs(node),
                script_outputs(node),
                format!(
                    "echo \"unsupported stage kind '{}' (node '{}')\" >&2\nexit 64\n",
                    kind, node.id
                ),
                Some(format!(
                    "// unsupported stage kind '{}' on node '{}'; placeholder fails at run time",
                    kind, node.id
                )),
            )
        }
        // Sources have no definition block; the caller never asks for one.
        StageParams::Source(_) => (Vec::new(), Vec::new(), String::new(), None),
    };

    let publish_dir = matches!(node.params, StageParams::Sink(_))
        .then(|| resolve_publish_dir(&options.publish_pattern, &process_name));

    let text = render_process(
        &process_name,
        header_comment.as_deref(),
        display_tag(node).as_deref(),
        publish_dir.as_deref(),
        &resources,
        &inputs,
        &outputs,
        &body,
    );

    StageBlock {
        node_id: node.id.clone(),
        process_name,
        display_label: display_label_for(node),
        kind_word,
        publish: matches!(node.params, StageParams::Sink(_)),
        input_ports: node.inputs.iter().map(|p| p.name.clone()).collect(),
        text,
    }
}

/// `<kindword>_<sanitized-node-id>`; the tracker's substring table relies on
/// the kind word staying a prefix.
pub(super) fn process_name_for(node: &StageNode) -> String {
    format!("{}_{}", node.params.kind_word(), sanitize_identifier(&node.id))
}

fn display_label_for(node: &StageNode) -> String {
    if !node.name.trim().is_empty() && node.name != node.id {
        return node.name.clone();
    }
    match node.params.kind_word() {
        "filter" => "Filter".to_string(),
        "map" => "Map".to_string(),
        "merge" => "Merge".to_string(),
        "check" => "Line check".to_string(),
        "digest" => "Digest".to_string(),
        "publish" => "Publish".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

fn display_tag(node: &StageNode) -> Option<String> {
    let name = node.name.trim();
    if name.is_empty() || name == node.id {
        return None;
    }
    Some(groovy_single_quote(name))
}

fn effective_resources(spec: Option<&ResourceSpec>, defaults: &ResourceSpec) -> ResourceSpec {
    let spec = spec.cloned().unwrap_or_default();
    ResourceSpec {
        cpus: spec.cpus.or(defaults.cpus),
        memory_gb: spec.memory_gb.or(defaults.memory_gb),
        time_hours: spec.time_hours.or(defaults.time_hours),
        container: spec.container.clone().or_else(|| defaults.container.clone()),
    }
}

/// Rewrites the `{run}` / `{timestamp}` / `{date}` / `{stage}` tokens of the
/// output-naming pattern into script expressions. Everything except the stage
/// name resolves at engine launch, keeping the script text deterministic.
fn resolve_publish_dir(pattern: &str, stage_name: &str) -> String {
    let resolved = pattern
        .replace("{run}", "${params.run_name}")
        .replace("{timestamp}", "${params.stamp}")
        .replace("{date}", "${params.day}")
        .replace("{stage}", stage_name);
    format!("${{params.outdir}}/{}", resolved)
}

#[allow(clippy::too_many_arguments)]
fn render_process(
    name: &str,
    header_comment: Option<&str>,
    tag: Option<&str>,
    publish_dir: Option<&str>,
    resources: &ResourceSpec,
    inputs: &[String],
    outputs: &[String],
    body: &str,
) -> String {
    let mut text = String::new();
    if let Some(comment) = header_comment {
        text.push_str(comment);
        text.push('\n');
    }
    text.push_str(&format!("process {} {{\n", name));
    if let Some(tag) = tag {
        text.push_str(&format!("    tag {}\n", tag));
    }
    if let Some(dir) = publish_dir {
        text.push_str(&format!("    publishDir \"{}\", mode: 'copy'\n", dir));
    }
    text.push_str(&format!(
        "    cpus {}\n",
        resources.cpus.unwrap_or(DEFAULT_CPUS)
    ));
    text.push_str(&format!(
        "    memory '{} GB'\n",
        resources.memory_gb.unwrap_or(DEFAULT_MEMORY_GB)
    ));
    if let Some(hours) = resources.time_hours {
        text.push_str(&format!("    time '{}h'\n", hours));
    }
    text.push_str(&format!(
        "    container {}\n",
        groovy_single_quote(resources.container.as_deref().unwrap_or(DEFAULT_CONTAINER))
    ));

    if !inputs.is_empty() {
        text.push_str("\n    input:\n");
        for line in inputs {
            text.push_str(&format!("    {}\n", line));
        }
    }
    if !outputs.is_empty() {
        text.push_str("\n    output:\n");
        for line in outputs {
            text.push_str(&format!("    {}\n", line));
        }
    }

    text.push_str("\n    script:\n    \"\"\"\n");
    for line in body.lines() {
        if line.is_empty() {
            text.push('\n');
        } else {
            text.push_str(&format!("    {}\n", line));
        }
    }
    text.push_str("    \"\"\"\n}\n");
    text
}

fn filter_body(params: &FilterParams) -> String {
    let grep = grep_invocation(&params.condition, params.negate);
    let transform = format!("{} \"\\$f\" > \"kept_\\$f\" || test \\$? -eq 1", grep);
    per_file_body(&transform, "kept", params.select.as_deref())
}

fn map_body(params: &MapParams) -> String {
    let transform = match &params.transform {
        MapTransform::Uppercase => {
            "tr '[:lower:]' '[:upper:]' < \"\\$f\" > \"mapped_\\$f\"".to_string()
        }
        MapTransform::Lowercase => {
            "tr '[:upper:]' '[:lower:]' < \"\\$f\" > \"mapped_\\$f\"".to_string()
        }
        MapTransform::Replace { from, to } => format!(
            "sed -e {} \"\\$f\" > \"mapped_\\$f\"",
            groovy_escape(&shell_single_quote(&format!(
                "s/{}/{}/g",
                sed_pattern_escape(from),
                sed_replacement_escape(to)
            )))
        ),
    };
    per_file_body(&transform, "mapped", params.select.as_deref())
}

/// Wraps a single-file transform into the per-file loop shared by filter and
/// map stages. A `select` glob routes non-matching files around the transform
/// so they pass through untouched. The glob is escaped for the triple-quoted
/// block but stays unquoted; a quoted case pattern stops matching.
fn per_file_body(transform: &str, prefix: &str, select: Option<&str>) -> String {
    match select {
        Some(glob) => format!(
            "for f in $src; do\n  case \"\\$f\" in\n  {})\n    {}\n    ;;\n  *)\n    cp \"\\$f\" \"{}_\\$f\"\n    ;;\n  esac\ndone\n",
            groovy_escape(glob),
            transform,
            prefix
        ),
        None => format!("for f in $src; do\n  {}\ndone\n", transform),
    }
}

fn grep_invocation(condition: &FilterCondition, negate: bool) -> String {
    let flag = if negate { " -v" } else { "" };
    match condition {
        FilterCondition::Contains(literal) => {
            format!("grep{} -F -- {}", flag, quoted_literal(literal))
        }
        FilterCondition::Prefix(literal) => format!(
            "grep{} -- {}",
            flag,
            groovy_escape(&shell_single_quote(&format!(
                "^{}",
                regex_literal_escape(literal)
            )))
        ),
        FilterCondition::Suffix(literal) => format!(
            "grep{} -- {}",
            flag,
            groovy_escape(&shell_single_quote(&format!(
                "{}$",
                regex_literal_escape(literal)
            )))
        ),
        FilterCondition::Pattern(pattern) => {
            format!("grep{} -E -- {}", flag, quoted_literal(pattern))
        }
    }
}

fn merge_body(params: &MergeParams) -> String {
    let mut body = String::from(": > merged.txt\n");
    match params.separator.as_deref().filter(|s| !s.is_empty()) {
        Some(separator) => {
            body.push_str("first=1\n");
            body.push_str("for f in \\$(printf '%s\\\\n' $srcs | sort); do\n");
            body.push_str(&format!(
                "  if [ \"\\$first\" -eq 0 ]; then printf '%s\\\\n' {} >> merged.txt; fi\n",
                quoted_literal(separator)
            ));
            body.push_str("  cat \"\\$f\" >> merged.txt\n");
            body.push_str("  first=0\n");
            body.push_str("done\n");
        }
        None => {
            body.push_str("for f in \\$(printf '%s\\\\n' $srcs | sort); do\n");
            body.push_str("  cat \"\\$f\" >> merged.txt\n");
            body.push_str("done\n");
        }
    }
    body
}

fn line_check_body(params: &LineCheckParams) -> String {
    let max = params.max_line_length.unwrap_or(DEFAULT_MAX_LINE_LENGTH);
    let mut body = String::from("for f in $src; do\n");
    // Reject binary input loudly; a zero-byte file still counts as text.
    body.push_str("  if [ -s \"\\$f\" ] && ! grep -Iq . \"\\$f\"; then\n");
    body.push_str("    echo \"line check failed: '\\$f' is not a text file\" >&2\n");
    body.push_str("    exit 1\n");
    body.push_str("  fi\n");
    body.push_str(
        "  printf 'file\\\\t%s\\\\nlines\\\\t%s\\\\nwords\\\\t%s\\\\nbytes\\\\t%s\\\\n' \\\\\n",
    );
    body.push_str(
        "    \"\\$f\" \"\\$(wc -l < \"\\$f\")\" \"\\$(wc -w < \"\\$f\")\" \"\\$(wc -c < \"\\$f\")\" > \"report_\\$f.txt\"\n",
    );
    body.push_str(&format!(
        "  awk -v max={} 'length(\\$0) > max {{ printf \"%s: line %d exceeds %d characters\\\\n\", FILENAME, NR, max }}' \"\\$f\" > \"issues_\\$f.txt\"\n",
        max
    ));
    body.push_str("  cp \"\\$f\" \"pass_\\$f\"\n");
    body.push_str("done\n");
    body
}

fn digest_body(params: &DigestParams) -> String {
    format!(
        "for f in $src; do\n  {} \"\\$f\" > \"sums_\\$f.txt\"\n  cp \"\\$f\" \"pass_\\$f\"\ndone\n",
        params.algorithm.command()
    )
}

fn script_body(params: &ScriptParams) -> String {
    let mut body = params.body.clone();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body
}

/// Generic stages bind one `path` variable per declared input port; port names
/// that collide with script keywords gain a suffix.
fn script_inputs(node: &StageNode) -> Vec<String> {
    node.inputs
        .iter()
        .map(|p| format!("path {}", input_var(&p.name)))
        .collect()
}

/// Generic stages declare one directive per output port. Ports marked
/// `multiple` collect every file prefixed with the port name; the rest expect
/// the body to write exactly one file named after the port.
fn script_outputs(node: &StageNode) -> Vec<String> {
    node.outputs
        .iter()
        .map(|p| {
            let pattern = if p.multiple {
                groovy_single_quote(&format!("{}_*", p.name))
            } else {
                groovy_single_quote(&p.name)
            };
            format!("path {}, emit: {}", pattern, sanitize_identifier(&p.name))
        })
        .collect()
}

pub(super) fn input_var(port: &str) -> String {
    let sanitized = sanitize_identifier(port);
    match sanitized.as_str() {
        "in" | "input" | "output" | "val" | "path" | "env" | "tuple" => {
            format!("{}_ch", sanitized)
        }
        _ => sanitized,
    }
}

/// Shell-quotes a user literal and escapes it for embedding in the script's
/// triple-quoted block.
fn quoted_literal(literal: &str) -> String {
    groovy_escape(&shell_single_quote(literal))
}

/// POSIX single-quoting: wrap in quotes, splice embedded quotes as `'\''`.
fn shell_single_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "'\\''"))
}

/// Escapes a string for a Groovy triple-double-quoted block: backslashes and
/// dollar signs must survive interpolation literally.
fn groovy_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('$', "\\$")
}

/// Groovy single-quoted string literal (used for directives, not bodies).
pub(super) fn groovy_single_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Escapes regex metacharacters so a literal can anchor a basic grep pattern.
fn regex_literal_escape(literal: &str) -> String {
    literal
        .chars()
        .map(|c| match c {
            '.' | '*' | '[' | ']' | '^' | '$' | '\\' => format!("\\{}", c),
            _ => c.to_string(),
        })
        .join("")
}

fn sed_pattern_escape(literal: &str) -> String {
    literal
        .chars()
        .map(|c| match c {
            '.' | '*' | '[' | ']' | '^' | '$' | '\\' | '/' => format!("\\{}", c),
            _ => c.to_string(),
        })
        .join("")
}

fn sed_replacement_escape(literal: &str) -> String {
    literal
        .chars()
        .map(|c| match c {
            '\\' | '/' | '&' => format!("\\{}", c),
            _ => c.to_string(),
        })
        .join("")
}
