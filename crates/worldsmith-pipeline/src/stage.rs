//! The contract every model-driven stage shares.
//!
//! A stage renders its prompt, calls the model (transport retries handled by
//! [`execute_with_retry`]), strips code fences, parses and validates the
//! document, and on a rejected document repeats the call up to
//! `schema_retries` times before failing with category `schema`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::Instrument;
use worldsmith_llm::{FinishReason, LlmClient, Request};
use worldsmith_types::{
    FailureCategory, Result, StageName, StageTiming, Validate, WorldsmithError,
};

use crate::config::PipelineConfig;
use crate::events::{EventEmitter, PipelineEvent};
use crate::prompts::Prompt;
use crate::retry::execute_with_retry;

// ---------------------------------------------------------------------------
// Response unwrapping
// ---------------------------------------------------------------------------

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?[ \t]*```\s*$").unwrap()
});

/// Remove one wrapping ```` ```json ... ``` ```` (or bare ```` ``` ````) fence.
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Parse a model response into a typed document. Missing required fields
/// fail here; nothing is filled in.
pub fn parse_document<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(strip_code_fences(text))?)
}

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

/// Per-stage timing and call counts for one run. Shared by the concurrent
/// branches, so it sits behind a mutex.
#[derive(Debug, Default)]
pub struct RunLog {
    timings: Mutex<Vec<StageTiming>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `elapsed` and `attempts` to the entry for `stage`.
    pub fn record(&self, stage: StageName, elapsed: Duration, attempts: u32) {
        let mut timings = self.timings.lock().unwrap_or_else(PoisonError::into_inner);
        let ms = elapsed.as_millis() as u64;
        match timings.iter_mut().find(|t| t.stage == stage) {
            Some(t) => {
                t.duration_ms += ms;
                t.attempts += attempts;
            }
            None => timings.push(StageTiming {
                stage,
                duration_ms: ms,
                attempts,
            }),
        }
    }

    /// Entries in pipeline order.
    pub fn timings(&self) -> Vec<StageTiming> {
        let mut timings = self
            .timings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        timings.sort_by_key(|t| t.stage);
        timings
    }
}

// ---------------------------------------------------------------------------
// StageRunner
// ---------------------------------------------------------------------------

/// Borrowed view of everything a stage needs for one run.
#[derive(Clone, Copy)]
pub struct StageRunner<'a> {
    client: &'a LlmClient,
    config: &'a PipelineConfig,
    events: &'a EventEmitter,
    log: &'a RunLog,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        client: &'a LlmClient,
        config: &'a PipelineConfig,
        events: &'a EventEmitter,
        log: &'a RunLog,
    ) -> Self {
        Self {
            client,
            config,
            events,
            log,
        }
    }

    pub fn config(&self) -> &'a PipelineConfig {
        self.config
    }

    pub fn events(&self) -> &'a EventEmitter {
        self.events
    }

    pub fn log(&self) -> &'a RunLog {
        self.log
    }

    pub fn model(&self) -> &'a str {
        self.config
            .model
            .as_deref()
            .unwrap_or_else(|| self.client.default_model())
    }

    /// One model call with transport retries; counts every call in `calls`.
    async fn call(&self, stage: StageName, prompt: &Prompt, calls: &AtomicU32) -> Result<String> {
        let request = Request::new(self.model(), &prompt.system, &prompt.user)
            .with_max_tokens(self.config.max_tokens_for(stage));
        let response = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::Relaxed);
                self.client.complete(&request)
            },
            self.config.transport_retries,
            &self.config.backoff_policy(),
            stage.as_str(),
        )
        .await?;

        if response.finish_reason == FinishReason::MaxTokens {
            tracing::warn!(
                stage = %stage,
                max_tokens = self.config.max_tokens_for(stage),
                "response hit the token budget"
            );
        }
        Ok(response.text)
    }

    /// Run a document-producing stage.
    ///
    /// `finish` runs after parsing and before [`Validate::validate`]; stages
    /// use it for cross-document checks. Its errors count as a rejected
    /// document.
    pub async fn run<T, F>(&self, stage: StageName, prompt: Prompt, finish: F) -> Result<T>
    where
        T: DeserializeOwned + Validate,
        F: Fn(T) -> Result<T>,
    {
        let started = Instant::now();
        let calls = AtomicU32::new(0);
        self.events.emit(PipelineEvent::StageStarted { stage });

        let result = async {
            let mut retries = 0;
            loop {
                let text = self
                    .call(stage, &prompt, &calls)
                    .await
                    .map_err(|e| e.into_stage_failure(stage, FailureCategory::Transport))?;

                let document = parse_document::<T>(&text).and_then(&finish).and_then(|doc| {
                    doc.validate()?;
                    Ok(doc)
                });

                match document {
                    Ok(doc) => return Ok(doc),
                    Err(e) if retries < self.config.schema_retries => {
                        retries += 1;
                        tracing::warn!(attempt = retries, error = %e, "document rejected, retrying");
                        self.events.emit(PipelineEvent::StageRetrying {
                            stage,
                            attempt: retries as u32,
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => {
                        return Err(WorldsmithError::StageFailed {
                            stage,
                            category: FailureCategory::Schema,
                            message: e.to_string(),
                            diagnostics: None,
                        })
                    }
                }
            }
        }
        .instrument(tracing::info_span!("stage", stage = %stage))
        .await;

        self.finish_stage(stage, started, &calls, result.is_ok());
        result
    }

    /// Run a text-producing call (auto-fix). Fences are stripped; no parsing.
    pub async fn complete_text(&self, stage: StageName, prompt: Prompt) -> Result<String> {
        let started = Instant::now();
        let calls = AtomicU32::new(0);
        self.events.emit(PipelineEvent::StageStarted { stage });

        let result = self
            .call(stage, &prompt, &calls)
            .instrument(tracing::info_span!("stage", stage = %stage))
            .await
            .map(|text| strip_code_fences(&text).to_string())
            .map_err(|e| e.into_stage_failure(stage, FailureCategory::Transport));

        self.finish_stage(stage, started, &calls, result.is_ok());
        result
    }

    fn finish_stage(&self, stage: StageName, started: Instant, calls: &AtomicU32, ok: bool) {
        let elapsed = started.elapsed();
        let attempts = calls.load(Ordering::Relaxed);
        self.log.record(stage, elapsed, attempts);
        if ok {
            tracing::info!(
                stage = %stage,
                attempts,
                duration_ms = elapsed.as_millis() as u64,
                "stage completed"
            );
            self.events.emit(PipelineEvent::StageCompleted {
                stage,
                duration_ms: elapsed.as_millis() as u64,
                attempts,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use worldsmith_llm::{ProviderAdapter, Response, Usage};
    use worldsmith_types::SchemaErrors;

    #[derive(Debug, Deserialize)]
    struct Note {
        text: String,
    }

    impl Validate for Note {
        const DOCUMENT: &'static str = "Note";

        fn check(&self, errors: &mut SchemaErrors) {
            errors.non_blank(&self.text, "$.text");
        }
    }

    /// Replays queued results in order.
    struct QueueProvider {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl QueueProvider {
        fn new(replies: Vec<Result<String>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    replies: Mutex::new(replies.into()),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl ProviderAdapter for QueueProvider {
        async fn complete(&self, _request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(WorldsmithError::Other("script exhausted".into())))?;
            Ok(Response {
                id: "r".into(),
                text: reply,
                usage: Usage::default(),
                model: "queue-model".into(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            "queue"
        }

        fn default_model(&self) -> &str {
            "queue-model"
        }

        fn context_window_size(&self) -> usize {
            100_000
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "Return a note.".into(),
            user: "## input\n\n{}".into(),
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            backoff: crate::config::BackoffConfig {
                base: Duration::from_millis(1),
                max: Duration::from_millis(1),
            },
            ..PipelineConfig::default()
        }
    }

    async fn run_note(
        replies: Vec<Result<String>>,
    ) -> (Result<Note>, usize, Vec<StageTiming>, Vec<PipelineEvent>) {
        let (provider, calls) = QueueProvider::new(replies);
        let client = LlmClient::new(provider);
        let config = fast_config();
        let events = EventEmitter::new(64);
        let mut rx = events.subscribe();
        let log = RunLog::new();
        let runner = StageRunner::new(&client, &config, &events, &log);

        let result = runner.run(StageName::Interpreter, prompt(), Ok).await;

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        (result, calls.load(Ordering::SeqCst), log.timings(), seen)
    }

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  ```\n{}\n```  \n"), "{}");
        assert_eq!(strip_code_fences("\n{\"a\": 1}\n"), "{\"a\": 1}");
        assert_eq!(
            strip_code_fences("```javascript\nfunction World() {}\nexport default World;\n```"),
            "function World() {}\nexport default World;"
        );
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(parse_document::<Note>("{}").is_err());
        assert_eq!(parse_document::<Note>("```json\n{\"text\":\"hi\"}\n```").unwrap().text, "hi");
    }

    #[tokio::test]
    async fn valid_document_first_try() {
        let (result, calls, timings, events) = run_note(vec![Ok(r#"{"text":"hallo"}"#.into())]).await;
        assert_eq!(result.unwrap().text, "hallo");
        assert_eq!(calls, 1);
        assert_eq!(timings[0].attempts, 1);
        assert!(matches!(events.last(), Some(PipelineEvent::StageCompleted { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn rejected_document_is_retried_once() {
        let (result, calls, timings, events) = run_note(vec![
            Ok(r#"{"text":"  "}"#.into()),
            Ok("```json\n{\"text\":\"hallo\"}\n```".into()),
        ])
        .await;
        assert_eq!(result.unwrap().text, "hallo");
        assert_eq!(calls, 2);
        assert_eq!(timings[0].attempts, 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::StageRetrying { attempt: 1, .. })));
    }

    #[tokio::test]
    async fn second_rejection_is_schema_failure() {
        let (result, calls, _, _) = run_note(vec![
            Ok("not json".into()),
            Ok(r#"{"other":1}"#.into()),
            Ok(r#"{"text":"never reached"}"#.into()),
        ])
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.category(), Some(FailureCategory::Schema));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn transient_transport_error_is_retried() {
        let (result, calls, _, _) = run_note(vec![
            Err(WorldsmithError::RateLimited {
                provider: "queue".into(),
                retry_after_ms: 0,
            }),
            Ok(r#"{"text":"ok"}"#.into()),
        ])
        .await;
        assert_eq!(result.unwrap().text, "ok");
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn permanent_transport_error_fails_stage() {
        let (result, calls, _, _) = run_note(vec![Err(WorldsmithError::AuthError {
            provider: "queue".into(),
        })])
        .await;
        match result.unwrap_err() {
            WorldsmithError::StageFailed {
                stage, category, ..
            } => {
                assert_eq!(stage, StageName::Interpreter);
                assert_eq!(category, FailureCategory::Transport);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn finish_hook_rejections_count_as_schema_errors() {
        let (provider, calls) = QueueProvider::new(vec![
            Ok(r#"{"text":"erste"}"#.into()),
            Ok(r#"{"text":"zweite"}"#.into()),
        ]);
        let client = LlmClient::new(provider);
        let config = fast_config();
        let events = EventEmitter::default();
        let log = RunLog::new();
        let runner = StageRunner::new(&client, &config, &events, &log);

        let note: Note = runner
            .run(StageName::GameDesigner, prompt(), |doc: Note| {
                if doc.text == "erste" {
                    Err(WorldsmithError::SchemaViolation {
                        document: "Note".into(),
                        message: "first draft".into(),
                    })
                } else {
                    Ok(doc)
                }
            })
            .await
            .unwrap();
        assert_eq!(note.text, "zweite");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn complete_text_strips_fences() {
        let (provider, _) = QueueProvider::new(vec![Ok("```js\nconst a = 1;\n```".into())]);
        let client = LlmClient::new(provider);
        let config = fast_config();
        let events = EventEmitter::default();
        let log = RunLog::new();
        let runner = StageRunner::new(&client, &config, &events, &log);

        let text = runner.complete_text(StageName::AutoFix, prompt()).await.unwrap();
        assert_eq!(text, "const a = 1;");
        assert_eq!(runner.model(), "queue-model");
    }

    #[test]
    fn run_log_merges_and_orders() {
        let log = RunLog::new();
        log.record(StageName::AutoFix, Duration::from_millis(5), 1);
        log.record(StageName::Interpreter, Duration::from_millis(3), 1);
        log.record(StageName::AutoFix, Duration::from_millis(7), 1);
        let timings = log.timings();
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].stage, StageName::Interpreter);
        assert_eq!(timings[1].duration_ms, 12);
        assert_eq!(timings[1].attempts, 2);
    }
}
