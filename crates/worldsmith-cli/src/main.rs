//! CLI binary for generating Worldsmith learning worlds and checking them offline.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use worldsmith_assembly::{assemble_and_check, CheckOutcome, LintWarning};
use worldsmith_pipeline::{CancelSignal, PipelineConfig, PipelineEvent, WorldPipeline};
use worldsmith_types::{
    ContentPlan, PipelineArtifact, RequestDescriptor, Validate, ViolationReport, WorldDocument,
};

#[derive(Parser)]
#[command(name = "worldsmith", version, about = "Generate interactive learning worlds from a topic")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full generation pipeline for a topic
    Generate {
        /// Lesson topic, e.g. "Photosynthese"
        topic: String,

        /// Target grade level (1-13)
        #[arg(short, long)]
        grade: Option<u8>,

        /// School subject; inferred from the topic when omitted
        #[arg(short, long)]
        subject: Option<String>,

        /// Visual style hint for the creative director
        #[arg(long)]
        style: Option<String>,

        /// Pipeline config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Model id, overrides the config file
        #[arg(short, long)]
        model: Option<String>,

        /// Output directory for the program and the artifact
        #[arg(short, long, default_value = "worldsmith-out")]
        out: PathBuf,
    },

    /// Assemble a world document and run the structural gate (no network)
    Check {
        /// Path to a world document fixture (JSON)
        fixture: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Also write the assembled program to this file
        #[arg(short, long)]
        emit: Option<PathBuf>,
    },

    /// Run the structural gate over an existing program file
    Gate {
        /// Path to the program source
        program: PathBuf,
    },

    /// Run the advisory content lint over a content plan (JSON)
    Lint {
        /// Path to the content plan
        content: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let passed = match cli.command {
        Commands::Generate {
            topic,
            grade,
            subject,
            style,
            config,
            model,
            out,
        } => {
            let mut request = RequestDescriptor::new(topic);
            request.grade_level = grade;
            request.subject = subject;
            request.style_hint = style;
            cmd_generate(request, config.as_deref(), model, &out).await?
        }
        Commands::Check {
            fixture,
            json,
            emit,
        } => cmd_check(&fixture, json, emit.as_deref())?,
        Commands::Gate { program } => cmd_gate(&program)?,
        Commands::Lint { content } => cmd_lint(&content)?,
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a valid document", path.display()))
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

async fn cmd_generate(
    request: RequestDescriptor,
    config_path: Option<&Path>,
    model: Option<String>,
    out: &Path,
) -> anyhow::Result<bool> {
    let mut config = match config_path {
        Some(path) => PipelineConfig::load(path).await?,
        None => PipelineConfig::default(),
    };
    if model.is_some() {
        config.model = model;
    }

    let pipeline = WorldPipeline::from_env(config)?;
    let mut events = pipeline.events().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            report_progress(&event);
        }
    });

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    println!("Generating world: {}", request.topic);
    let result = pipeline.run(&request, &cancel).await;
    drop(pipeline);
    let _ = progress.await;

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("Run failed: {e}");
            return Ok(false);
        }
    };

    let (program_path, artifact_path) = write_artifact(&artifact, out)?;
    println!("{}", summarize(&artifact));
    println!("Program: {}", program_path.display());
    println!("Artifact: {}", artifact_path.display());
    Ok(true)
}

fn report_progress(event: &PipelineEvent) {
    match event {
        PipelineEvent::StageCompleted {
            stage,
            duration_ms,
            attempts,
        } => println!("  {stage} done in {duration_ms}ms ({attempts} call(s))"),
        PipelineEvent::StageRetrying { stage, attempt, .. } => {
            println!("  {stage} retrying (attempt {attempt})")
        }
        PipelineEvent::AssetFailed {
            asset_id, critical, ..
        } => println!("  asset {asset_id} failed{}", if *critical { " (critical)" } else { "" }),
        PipelineEvent::AutoFixAttempted { attempt } => println!("  auto-fix attempt {attempt}"),
        _ => {}
    }
}

/// Write `world.jsx` and `artifact.json` into `out`.
fn write_artifact(artifact: &PipelineArtifact, out: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(out).with_context(|| format!("cannot create {}", out.display()))?;
    let program_path = out.join("world.jsx");
    let artifact_path = out.join("artifact.json");
    std::fs::write(&program_path, &artifact.program.document.source)?;
    std::fs::write(&artifact_path, serde_json::to_string_pretty(artifact)?)?;
    Ok((program_path, artifact_path))
}

fn summarize(artifact: &PipelineArtifact) -> String {
    let meta = &artifact.metadata;
    let mut lines = vec![
        format!("World completed in {}ms (run {})", meta.duration_ms, meta.run_id),
        format!(
            "  {} modules, {} challenges, {} assets",
            artifact.program.document.manifest.module_count,
            artifact.program.document.manifest.challenge_count,
            artifact.assets.len()
        ),
        format!(
            "  tokens: {} in / {} out, auto-fix attempts: {}",
            meta.token_usage.input_tokens, meta.token_usage.output_tokens, meta.auto_fix_attempts
        ),
    ];
    if !meta.failed_assets.is_empty() {
        lines.push(format!("  missing assets: {}", meta.failed_assets.join(", ")));
    }
    for error in &meta.unresolved_quality_errors {
        lines.push(format!("  quality: {error}"));
    }
    for warning in &meta.lint_warnings {
        lines.push(format!("  lint: {warning}"));
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// check / gate / lint
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckSummary<'a> {
    passed: bool,
    codes: Vec<&'static str>,
    warnings: &'a [LintWarning],
    module_count: usize,
    challenge_count: usize,
    widgets: &'a [String],
}

fn check_fixture(path: &Path) -> anyhow::Result<CheckOutcome> {
    let document: WorldDocument = read_json(path)?;
    document.validate()?;
    Ok(assemble_and_check(&document)?)
}

fn render_check(outcome: &CheckOutcome, json: bool) -> anyhow::Result<String> {
    if json {
        let manifest = &outcome.program.manifest;
        let summary = CheckSummary {
            passed: outcome.passed(),
            codes: outcome.report.code_strings(),
            warnings: &outcome.warnings,
            module_count: manifest.module_count,
            challenge_count: manifest.challenge_count,
            widgets: &manifest.widgets,
        };
        return Ok(serde_json::to_string_pretty(&summary)?);
    }

    let mut lines = vec![outcome.report.to_string()];
    lines.extend(describe_violations(&outcome.report));
    for warning in &outcome.warnings {
        lines.push(format!("WARN {warning}"));
    }
    Ok(lines.join("\n"))
}

fn describe_violations(report: &ViolationReport) -> Vec<String> {
    report
        .codes
        .iter()
        .map(|code| format!("  {}: {}", code.as_str(), code.description()))
        .collect()
}

fn cmd_check(path: &Path, json: bool, emit: Option<&Path>) -> anyhow::Result<bool> {
    let outcome = check_fixture(path)?;
    if let Some(target) = emit {
        std::fs::write(target, &outcome.program.source)
            .with_context(|| format!("cannot write {}", target.display()))?;
    }
    println!("{}", render_check(&outcome, json)?);
    Ok(outcome.passed())
}

fn cmd_gate(path: &Path) -> anyhow::Result<bool> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let report = worldsmith_assembly::check(&source);
    println!("{report}");
    for line in describe_violations(&report) {
        println!("{line}");
    }
    Ok(report.passed())
}

/// Lint findings are advisory; only an unreadable plan fails.
fn cmd_lint(path: &Path) -> anyhow::Result<bool> {
    let plan: ContentPlan = read_json(path)?;
    let warnings = worldsmith_assembly::lint_content(&plan);
    if warnings.is_empty() {
        println!("No content warnings");
    }
    for warning in &warnings {
        println!("WARN {warning}");
    }
    Ok(true)
}
