//! Pipeline orchestrator: sequences the stages of one run and returns either
//! a gate-passed [`PipelineArtifact`] or a typed terminal failure.
//!
//! ```text
//! Interpreter -> CreativeDirector -> GameDesigner
//!     -> [AssetPlanner -> AssetGenerator] || [ContentArchitect]
//!     -> QualityGate (corrections) -> CodeGenerator
//!     -> Assembler -> StructuralGate -> AutoFix (bounded)
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;
use worldsmith_assembly::{assemble, check_program, lint_world};
use worldsmith_llm::{ImageProvider, LlmClient, OpenAiImageAdapter, UsageTrackingMiddleware};
use worldsmith_types::{
    FailureCategory, GenerationMetadata, PipelineArtifact, QualityReport, RequestDescriptor,
    Result, StageName, TokenUsage, Validate, VersionOrigin, Versioned, WorldDocument,
    WorldsmithError,
};

use crate::assets::{AssetGenerator, AssetSettings};
use crate::autofix;
use crate::config::{PipelineConfig, QualityPolicy};
use crate::corrections::{apply_corrections, CorrectionOutcome};
use crate::events::{EventEmitter, PipelineEvent};
use crate::stage::{RunLog, StageRunner};
use crate::stages;

// ---------------------------------------------------------------------------
// CancelSignal
// ---------------------------------------------------------------------------

/// Cooperative cancellation for a run. Clones observe the same signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // The sender lives in `self`, so this only happens on shutdown.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// WorldPipeline
// ---------------------------------------------------------------------------

pub struct WorldPipeline {
    client: LlmClient,
    images: Arc<dyn ImageProvider>,
    config: PipelineConfig,
    events: EventEmitter,
    usage: UsageTrackingMiddleware,
}

impl WorldPipeline {
    /// Wraps `client` with token accounting and the configured call timeout.
    pub fn new(client: LlmClient, images: Arc<dyn ImageProvider>, config: PipelineConfig) -> Self {
        let config = config.sanitized();
        let usage = UsageTrackingMiddleware::new();
        let client = client
            .with_middleware(usage.clone())
            .with_call_timeout(config.call_timeout);
        Self {
            client,
            images,
            config,
            events: EventEmitter::default(),
            usage,
        }
    }

    /// Anthropic for text, OpenAI for images; keys from the environment.
    pub fn from_env(config: PipelineConfig) -> Result<Self> {
        let client = LlmClient::from_env()?;
        let images = OpenAiImageAdapter::from_env()?;
        Ok(Self::new(client, Arc::new(images), config))
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline for `request`.
    ///
    /// Raising `cancel` drops every in-flight call and yields
    /// [`WorldsmithError::Cancelled`]. Token usage in the metadata is the
    /// difference over this run, so concurrent runs on one pipeline share
    /// their counts.
    pub async fn run(
        &self,
        request: &RequestDescriptor,
        cancel: &CancelSignal,
    ) -> Result<PipelineArtifact> {
        let run_id = Uuid::new_v4();
        self.events.emit(PipelineEvent::RunStarted {
            run_id,
            topic: request.topic.clone(),
        });
        let span = tracing::info_span!("run", run_id = %run_id, topic = %request.topic);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WorldsmithError::Cancelled),
            result = self.execute(run_id, request).instrument(span) => result,
        };

        match &result {
            Ok(artifact) => {
                tracing::info!(
                    run_id = %run_id,
                    duration_ms = artifact.metadata.duration_ms,
                    auto_fix_attempts = artifact.metadata.auto_fix_attempts,
                    "run completed"
                );
                self.events.emit(PipelineEvent::RunCompleted {
                    run_id,
                    duration_ms: artifact.metadata.duration_ms,
                });
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "run failed");
                self.events.emit(PipelineEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn execute(&self, run_id: Uuid, request: &RequestDescriptor) -> Result<PipelineArtifact> {
        let started_at = Utc::now();
        let started = Instant::now();
        let usage_before = self.usage.snapshot();

        request
            .validate()
            .map_err(|e| e.into_stage_failure(StageName::Interpreter, FailureCategory::Schema))?;

        let log = RunLog::new();
        let runner = StageRunner::new(&self.client, &self.config, &self.events, &log);

        let brief = stages::interpret(&runner, request).await?;
        let concept = stages::create_concept(&runner, request, &brief).await?;
        let plan = stages::design_modules(&runner, &brief, &concept).await?;

        let generator = AssetGenerator::new(
            Arc::clone(&self.images),
            self.asset_settings(),
            self.events.clone(),
        );
        let asset_branch = async {
            let asset_plan = stages::plan_assets(&runner, &concept, &plan).await?;
            generator
                .generate(&asset_plan, &log)
                .await
                .map_err(|e| e.into_stage_failure(StageName::AssetGenerator, FailureCategory::Asset))
        };
        let (assets, content) = tokio::try_join!(
            asset_branch,
            stages::write_content(&runner, &brief, &concept, &plan),
        )?;

        let content = Versioned::initial(content);
        let report = stages::review_content(&runner, &concept, &plan, &content).await?;
        let corrected = apply_corrections(&content, &report, &plan)?;
        if corrected.revised() {
            self.events.emit(PipelineEvent::DocumentRevised {
                stage: StageName::QualityGate,
                version: corrected.content.version,
                origin: VersionOrigin::QualityGate,
            });
        }
        let unresolved = self.enforce_quality_policy(&report, &corrected)?;
        let content = corrected.content;

        let script =
            stages::write_script(&runner, &concept, &plan, &content.document, &assets).await?;

        let assembly_started = Instant::now();
        self.events.emit(PipelineEvent::StageStarted {
            stage: StageName::Assembler,
        });
        let assembled = WorldDocument::compose(&concept, &plan, &content.document, &script, &assets)
            .and_then(|mut document| {
                document.passing_score = self.config.passing_score;
                let program = assemble(&document)?;
                Ok((document, program))
            })
            .map_err(|e| e.into_stage_failure(StageName::Assembler, FailureCategory::Structural));
        let (document, program) = assembled?;
        self.finish_step(&log, StageName::Assembler, assembly_started);

        let lint_warnings = lint_world(&document);

        let gate_started = Instant::now();
        self.events.emit(PipelineEvent::StageStarted {
            stage: StageName::StructuralGate,
        });
        let violations = check_program(&program);
        self.events.emit(PipelineEvent::GateChecked {
            passed: violations.passed(),
            codes: violations.code_strings().into_iter().map(String::from).collect(),
        });
        self.finish_step(&log, StageName::StructuralGate, gate_started);

        let repaired = autofix::repair(&runner, Versioned::initial(program), violations).await?;

        let usage_after = self.usage.snapshot();
        let metadata = GenerationMetadata {
            run_id,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            model: runner.model().to_string(),
            stages: log.timings(),
            auto_fix_attempts: repaired.attempts,
            token_usage: TokenUsage {
                input_tokens: usage_after
                    .input_tokens
                    .saturating_sub(usage_before.input_tokens),
                output_tokens: usage_after
                    .output_tokens
                    .saturating_sub(usage_before.output_tokens),
            },
            lint_warnings: lint_warnings.iter().map(ToString::to_string).collect(),
            unresolved_quality_errors: unresolved,
            failed_assets: assets.failed.clone(),
        };

        Ok(PipelineArtifact {
            program: repaired.program,
            concept,
            content,
            assets,
            metadata,
        })
    }

    fn asset_settings(&self) -> AssetSettings {
        AssetSettings {
            concurrency: self.config.asset_concurrency,
            timeout: self.config.asset_timeout,
            retries: self.config.transport_retries,
            backoff: self.config.backoff_policy(),
        }
    }

    /// Critical errors left without a working correction, as
    /// `"<path>: <description>"`. Fails the run under [`QualityPolicy::Block`].
    fn enforce_quality_policy(
        &self,
        report: &QualityReport,
        corrected: &CorrectionOutcome,
    ) -> Result<Vec<String>> {
        // Only overrides that actually landed count as coverage.
        let mut effective = report.clone();
        if corrected.rejected.is_some() {
            effective.corrected_content.clear();
        } else {
            effective
                .corrected_content
                .retain(|path, _| corrected.applied.contains(path));
        }

        let unresolved: Vec<String> = effective
            .uncovered_errors()
            .into_iter()
            .map(|e| format!("{}: {}", e.path, e.description))
            .collect();
        if unresolved.is_empty() {
            return Ok(unresolved);
        }

        match self.config.quality_policy {
            QualityPolicy::Warn => {
                for error in &unresolved {
                    tracing::warn!(error = %error, "quality error left uncorrected");
                }
                Ok(unresolved)
            }
            QualityPolicy::Block => Err(WorldsmithError::StageFailed {
                stage: StageName::QualityGate,
                category: FailureCategory::ContentQuality,
                message: format!(
                    "{} critical error(s) without a correction",
                    unresolved.len()
                ),
                diagnostics: Some(serde_json::json!(unresolved)),
            }),
        }
    }

    /// Record a model-free step in the log and the event stream.
    fn finish_step(&self, log: &RunLog, stage: StageName, started: Instant) {
        let elapsed = started.elapsed();
        log.record(stage, elapsed, 1);
        self.events.emit(PipelineEvent::StageCompleted {
            stage,
            duration_ms: elapsed.as_millis() as u64,
            attempts: 1,
        });
    }
}

impl std::fmt::Debug for WorldPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldPipeline")
            .field("client", &self.client)
            .field("images", &self.images.name())
            .field("config", &self.config)
            .finish()
    }
}
