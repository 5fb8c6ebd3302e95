use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use chrono::Utc;
use clap::{Parser, Subcommand};
use nagare::graph::{
    ChannelEdge, DigestAlgorithm, DigestParams, FilterCondition, FilterParams, LineCheckParams,
    MapParams, MapTransform, MergeParams, PipelineGraph, ResourceSpec, ScriptParams, SinkParams,
    SourceParams, StageNode, StageParams,
};
use nagare::prelude::*;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

// --- JSON Deserialization Structs (Editor Format Specific) ---
// These structs match the editor's document export and are only used here
// for conversion into the canonical graph.

#[derive(Deserialize)]
struct RawDocument {
    nodes: Vec<RawNode>,
    edges: Vec<RawEdge>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(alias = "type")]
    kind: String,
    #[serde(default)]
    data: RawNodeData,
}

#[derive(Deserialize, Default)]
struct RawNodeData {
    #[serde(default)]
    files: Option<Vec<String>>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    negate: Option<bool>,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default, alias = "replaceFrom")]
    replace_from: Option<String>,
    #[serde(default, alias = "replaceTo")]
    replace_to: Option<String>,
    #[serde(default)]
    separator: Option<String>,
    #[serde(default, alias = "maxLineLength")]
    max_line_length: Option<u32>,
    #[serde(default)]
    algorithm: Option<String>,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    select: Option<String>,
    #[serde(default)]
    cpus: Option<u32>,
    #[serde(default, alias = "memoryGb")]
    memory_gb: Option<u32>,
    #[serde(default, alias = "timeHours")]
    time_hours: Option<u32>,
    #[serde(default)]
    container: Option<String>,
}

#[derive(Deserialize)]
struct RawEdge {
    source: String,
    #[serde(alias = "sourceHandle")]
    source_handle: String,
    target: String,
    #[serde(alias = "targetHandle")]
    target_handle: String,
}

// --- Converter Implementation ---
// Conversion from the raw editor document to Nagare's canonical PipelineGraph.

impl IntoPipeline for RawDocument {
    fn into_pipeline(self) -> std::result::Result<PipelineGraph, GraphConversionError> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for raw in self.nodes {
            let params = convert_params(&raw)?;
            let name = raw.name.unwrap_or_else(|| raw.id.clone());
            nodes.push(StageNode::new(raw.id, name, params));
        }

        let edges = self
            .edges
            .into_iter()
            .map(|raw| ChannelEdge::new(raw.source, raw.source_handle, raw.target, raw.target_handle))
            .collect();

        Ok(PipelineGraph { nodes, edges })
    }
}

fn convert_params(raw: &RawNode) -> std::result::Result<StageParams, GraphConversionError> {
    let data = &raw.data;
    let resources = ResourceSpec {
        cpus: data.cpus,
        memory_gb: data.memory_gb,
        time_hours: data.time_hours,
        container: data.container.clone(),
    };

    let params = match raw.kind.as_str() {
        "source" | "fileSource" => StageParams::Source(SourceParams {
            files: data.files.clone().unwrap_or_default(),
        }),
        "filter" => {
            let literal = data.pattern.clone().ok_or_else(|| {
                GraphConversionError::ValidationError(format!(
                    "filter node '{}' has no pattern",
                    raw.id
                ))
            })?;
            let condition = match data.condition.as_deref() {
                Some("prefix") => FilterCondition::Prefix(literal),
                Some("suffix") => FilterCondition::Suffix(literal),
                Some("pattern") | Some("regex") => FilterCondition::Pattern(literal),
                _ => FilterCondition::Contains(literal),
            };
            StageParams::Filter(FilterParams {
                condition,
                negate: data.negate.unwrap_or(false),
                select: data.select.clone(),
                resources,
            })
        }
        "map" => {
            let transform = match data.transform.as_deref() {
                Some("lowercase") => MapTransform::Lowercase,
                Some("replace") => MapTransform::Replace {
                    from: data.replace_from.clone().ok_or_else(|| {
                        GraphConversionError::ValidationError(format!(
                            "map node '{}' replaces without a 'replaceFrom' value",
                            raw.id
                        ))
                    })?,
                    to: data.replace_to.clone().unwrap_or_default(),
                },
                _ => MapTransform::Uppercase,
            };
            StageParams::Map(MapParams {
                transform,
                select: data.select.clone(),
                resources,
            })
        }
        "merge" => StageParams::Merge(MergeParams {
            separator: data.separator.clone(),
            resources,
        }),
        "check" | "lineCheck" => StageParams::LineCheck(LineCheckParams {
            max_line_length: data.max_line_length,
            resources,
        }),
        "digest" | "checksum" => StageParams::Digest(DigestParams {
            algorithm: match data.algorithm.as_deref() {
                Some("md5") => DigestAlgorithm::Md5,
                Some("sha1") => DigestAlgorithm::Sha1,
                _ => DigestAlgorithm::Sha256,
            },
            resources,
        }),
        "stage" | "script" => StageParams::Script(ScriptParams {
            body: data.script.clone().ok_or_else(|| {
                GraphConversionError::ValidationError(format!(
                    "script node '{}' has no script body",
                    raw.id
                ))
            })?,
            resources,
        }),
        "sink" | "output" => StageParams::Sink(SinkParams { resources }),
        other => StageParams::Opaque {
            kind: other.to_string(),
        },
    };
    Ok(params)
}

// --- Engine Launcher ---

/// Runs the engine command through a shell, with stderr folded into stdout so
/// line order matches what a terminal would show.
struct ShellLauncher {
    engine: String,
}

impl EngineLauncher for ShellLauncher {
    fn launch(&self, request: &LaunchRequest) -> std::result::Result<EngineRun, LaunchError> {
        fs::create_dir_all(&request.workdir)
            .map_err(|e| LaunchError::Spawn(format!("could not create workdir: {}", e)))?;
        let script_path = request.workdir.join("pipeline.nf");
        fs::write(&script_path, &request.script)
            .map_err(|e| LaunchError::Spawn(format!("could not write script: {}", e)))?;

        let command = format!("{} {} 2>&1", self.engine, script_path.display());
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| LaunchError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::Spawn("engine stdout unavailable".to_string()))?;
        let lines = BufReader::new(stdout).lines();
        let id = RunId(format!("{}-{}", request.run_name, std::process::id()));

        Ok(EngineRun::new(id, Box::new(lines), move || {
            child
                .wait()
                .map(|status| status.code().unwrap_or(-1))
                .unwrap_or(-1)
        }))
    }
}

// --- Status Printing ---

struct PrintObserver;

impl StatusObserver for PrintObserver {
    fn status_changed(&mut self, status: &WorkflowExecutionStatus) {
        println!("{}", render_status(status));
    }
}

fn render_status(status: &WorkflowExecutionStatus) -> String {
    let current = status.current_stage.as_deref().unwrap_or("-");
    format!(
        "[{:>3}%] {:?} | {} | done {}/{} failed {}",
        status.progress,
        status.state,
        current,
        status.stages_completed,
        status.stages_total,
        status.stages_failed,
    )
}

// --- CLI ---

/// A pipeline-graph compiler and run tracker for workflow engines
#[derive(Parser, Debug)]
#[command(name = "nagare", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile an editor graph document into a workflow script
    Compile {
        /// Path to the graph JSON document
        graph: PathBuf,
        /// Run name baked into the script's parameter defaults
        #[arg(long, default_value = "run")]
        run_name: String,
        /// Output directory baked into the script's parameter defaults
        #[arg(long, default_value = "results")]
        output_dir: String,
        /// Output-naming pattern ({run}, {stage}, {timestamp}, {date})
        #[arg(long, default_value = "{run}/{stage}")]
        pattern: String,
        /// Write the script here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also save the compiled artifact (script + stage summaries)
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// Replay a captured engine log against a compiled pipeline
    Trace {
        /// Graph JSON document or compiled artifact (.nbin)
        pipeline: PathBuf,
        /// Captured engine output
        log: PathBuf,
        /// Exit code the engine finished with
        #[arg(long, default_value_t = 0)]
        exit_code: i32,
        /// Print the full snapshot as JSON instead of a summary line
        #[arg(long)]
        json: bool,
    },
    /// Compile a graph and run it through an engine command
    Run {
        /// Path to the graph JSON document
        graph: PathBuf,
        /// Engine command the script is passed to, e.g. "nextflow run"
        #[arg(long, default_value = "nextflow run")]
        engine: String,
        /// Run name for this launch
        #[arg(long, default_value = "run")]
        run_name: String,
        /// Directory the script is materialized into and run from
        #[arg(long, default_value = ".nagare")]
        workdir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Compile {
            graph,
            run_name,
            output_dir,
            pattern,
            out,
            artifact,
        } => run_compile(&graph, run_name, output_dir, pattern, out, artifact),
        Commands::Trace {
            pipeline,
            log,
            exit_code,
            json,
        } => run_trace(&pipeline, &log, exit_code, json),
        Commands::Run {
            graph,
            engine,
            run_name,
            workdir,
        } => run_engine(&graph, engine, run_name, workdir),
    }
}

fn init_logging(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn run_compile(
    graph_path: &Path,
    run_name: String,
    output_dir: String,
    pattern: String,
    out: Option<PathBuf>,
    artifact: Option<PathBuf>,
) {
    let total_start = Instant::now();
    let pipeline = compile_document(graph_path, &run_name, &output_dir, &pattern);

    for diagnostic in &pipeline.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }

    match &out {
        Some(path) => {
            fs::write(path, &pipeline.script).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to write script to '{}': {}", path.display(), e))
            });
            println!("Script written to {}", path.display());
        }
        None => print!("{}", pipeline.script),
    }

    if let Some(path) = &artifact {
        pipeline.save(path).unwrap_or_else(|e| {
            exit_with_error(&format!(
                "Failed to save artifact to '{}': {}",
                path.display(),
                e
            ))
        });
        println!("Artifact saved to {}", path.display());
    }

    eprintln!(
        "Compiled {} stages ({} diagnostics) in {:?}",
        pipeline.stages.len(),
        pipeline.diagnostics.len(),
        total_start.elapsed()
    );
}

fn run_trace(pipeline_path: &Path, log_path: &Path, exit_code: i32, json: bool) {
    let pipeline = load_pipeline(pipeline_path);
    let log = fs::read_to_string(log_path).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to read log file '{}': {}",
            log_path.display(),
            e
        ))
    });

    let mut tracker = ExecutionTracker::new().with_expected_stages(&pipeline);
    tracker.start_run(Utc::now());
    tracker.process_lines(log.lines(), Utc::now());
    tracker.finish(exit_code, Utc::now());

    let status = tracker.snapshot();
    if json {
        let rendered = serde_json::to_string_pretty(status).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to render snapshot as JSON: {}", e))
        });
        println!("{}", rendered);
    } else {
        println!("{}", render_status(status));
        for stage in &status.stages {
            println!(
                "  {:<24} {:?} {}%",
                stage.display_name,
                stage.state,
                stage.progress.unwrap_or(0)
            );
        }
    }
}

fn run_engine(graph_path: &Path, engine: String, run_name: String, workdir: PathBuf) {
    let pipeline = compile_document(graph_path, &run_name, "results", "{run}/{stage}");
    for diagnostic in &pipeline.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }

    let request = LaunchRequest::from_pipeline(&pipeline, workdir);
    let launcher = ShellLauncher { engine };
    let mut controller = RunController::new(launcher, NoCancel)
        .with_tracker(ExecutionTracker::new().with_expected_stages(&pipeline));
    controller.tracker_mut().subscribe(Box::new(PrintObserver));

    let status = controller
        .run_to_completion(&request)
        .unwrap_or_else(|e| exit_with_error(&format!("Run failed to start: {}", e)));

    println!("\nFinal: {}", render_status(&status));
    if let Some(error) = &status.error {
        exit_with_error(error);
    }
}

fn compile_document(
    graph_path: &Path,
    run_name: &str,
    output_dir: &str,
    pattern: &str,
) -> CompiledPipeline {
    let document = fs::read_to_string(graph_path).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to read graph file '{}': {}",
            graph_path.display(),
            e
        ))
    });
    let raw: RawDocument = serde_json::from_str(&document)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse graph JSON: {}", e)));
    let graph = raw
        .into_pipeline()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to convert graph: {}", e)));

    ScriptCompiler::builder(graph)
        .with_run_name(run_name)
        .with_output_dir(output_dir)
        .with_publish_pattern(pattern)
        .build()
        .compile()
        .unwrap_or_else(|e| exit_with_error(&format!("Compilation failed: {}", e)))
}

fn load_pipeline(path: &Path) -> CompiledPipeline {
    if path.extension().is_some_and(|ext| ext == "nbin") {
        CompiledPipeline::from_file(path).unwrap_or_else(|e| {
            exit_with_error(&format!(
                "Failed to load artifact '{}': {}",
                path.display(),
                e
            ))
        })
    } else {
        compile_document(path, "run", "results", "{run}/{stage}")
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
