//! Parallel image generation for an [`AssetPlan`].
//!
//! One request per asset, at most `concurrency` in flight. Every task owns
//! its result; the collector builds the manifest. A missing non-critical
//! asset degrades the world, a missing critical asset ends the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use worldsmith_llm::{GeneratedImage, ImageProvider, ImageRequest};
use worldsmith_types::{
    AssetManifest, AssetPlan, AssetRef, FailureCategory, Result, StageName,
    Validate, WorldsmithError,
};

use crate::events::{EventEmitter, PipelineEvent};
use crate::retry::{execute_with_retry, BackoffPolicy};
use crate::stage::RunLog;

/// Settings for one generator; usually derived from the pipeline config.
#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub concurrency: usize,
    pub timeout: Duration,
    pub retries: usize,
    pub backoff: BackoffPolicy,
}

pub struct AssetGenerator {
    provider: Arc<dyn ImageProvider>,
    settings: AssetSettings,
    events: EventEmitter,
}

impl AssetGenerator {
    pub fn new(provider: Arc<dyn ImageProvider>, settings: AssetSettings, events: EventEmitter) -> Self {
        Self {
            provider,
            settings,
            events,
        }
    }

    /// Generate every asset in `plan`.
    ///
    /// The plan is validated first; an invalid plan fails with
    /// `AssetPlanRejected` before any image call. A failed critical asset
    /// aborts the remaining tasks.
    pub async fn generate(&self, plan: &AssetPlan, log: &RunLog) -> Result<AssetManifest> {
        if let Err(e) = plan.validate() {
            let reason = match e {
                WorldsmithError::SchemaViolation { message, .. } => message,
                other => other.to_string(),
            };
            tracing::warn!(reason = %reason, "asset plan rejected");
            return Err(WorldsmithError::AssetPlanRejected(reason));
        }

        let started = Instant::now();
        self.events.emit(PipelineEvent::StageStarted {
            stage: StageName::AssetGenerator,
        });

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (position, asset) in plan.assets.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let settings = self.settings.clone();
            let asset = asset.clone();
            let request = ImageRequest {
                prompt: asset.full_prompt(&plan.style_suffix),
                size: asset.aspect_ratio.image_size().to_string(),
            };

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = generate_one(provider.as_ref(), &request, &settings, &asset.id).await;
                (position, asset, result)
            });
        }

        let mut resolved: Vec<(usize, AssetRef)> = Vec::new();
        let mut failed: Vec<(usize, String)> = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            let (position, asset, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    join_set.abort_all();
                    return Err(WorldsmithError::StageFailed {
                        stage: StageName::AssetGenerator,
                        category: FailureCategory::Asset,
                        message: format!("asset task panicked: {e}"),
                        diagnostics: None,
                    });
                }
            };

            match result {
                Ok(image) => {
                    tracing::debug!(asset_id = %asset.id, "asset resolved");
                    self.events.emit(PipelineEvent::AssetResolved {
                        asset_id: asset.id.clone(),
                    });
                    resolved.push((
                        position,
                        AssetRef {
                            id: asset.id,
                            category: asset.category,
                            url: image.url,
                        },
                    ));
                }
                Err(e) => {
                    let critical = asset.is_critical();
                    tracing::warn!(asset_id = %asset.id, critical, error = %e, "asset failed");
                    self.events.emit(PipelineEvent::AssetFailed {
                        asset_id: asset.id.clone(),
                        critical,
                        error: e.to_string(),
                    });
                    if critical {
                        join_set.abort_all();
                        log.record(StageName::AssetGenerator, started.elapsed(), plan.assets.len() as u32);
                        return Err(WorldsmithError::StageFailed {
                            stage: StageName::AssetGenerator,
                            category: FailureCategory::Asset,
                            message: format!("critical asset '{}' failed: {e}", asset.id),
                            diagnostics: Some(serde_json::json!({ "assetId": asset.id })),
                        });
                    }
                    failed.push((position, asset.id));
                }
            }
        }

        failed.sort_by_key(|(position, _)| *position);
        let manifest = AssetManifest {
            assets: resolved
                .into_iter()
                .map(|(_, r)| (r.id.clone(), r))
                .collect(),
            failed: failed.into_iter().map(|(_, id)| id).collect(),
        };

        let elapsed = started.elapsed();
        log.record(StageName::AssetGenerator, elapsed, plan.assets.len() as u32);
        tracing::info!(
            resolved = manifest.len(),
            failed = manifest.failed.len(),
            duration_ms = elapsed.as_millis() as u64,
            "assets generated"
        );
        self.events.emit(PipelineEvent::StageCompleted {
            stage: StageName::AssetGenerator,
            duration_ms: elapsed.as_millis() as u64,
            attempts: plan.assets.len() as u32,
        });
        Ok(manifest)
    }
}

/// One image with per-call timeout and transport retries.
async fn generate_one(
    provider: &dyn ImageProvider,
    request: &ImageRequest,
    settings: &AssetSettings,
    asset_id: &str,
) -> Result<GeneratedImage> {
    execute_with_retry(
        || async move {
            match tokio::time::timeout(settings.timeout, provider.generate(request)).await {
                Ok(result) => result,
                Err(_) => Err(WorldsmithError::RequestTimeout {
                    provider: provider.name().to_string(),
                    timeout_ms: settings.timeout.as_millis() as u64,
                }),
            }
        },
        settings.retries,
        &settings.backoff,
        asset_id,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails prompts containing a marker; counts calls and peak concurrency.
    #[derive(Default)]
    struct FakeImages {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_marker: Option<&'static str>,
        hang_marker: Option<&'static str>,
        attempts: Mutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl ImageProvider for FakeImages {
        async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(request.prompt.clone())
                .or_default() += 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.hang_marker.is_some_and(|m| request.prompt.contains(m)) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_marker.is_some_and(|m| request.prompt.contains(m)) {
                return Err(WorldsmithError::ProviderError {
                    provider: "fake".into(),
                    status: 500,
                    message: "boom".into(),
                    retryable: true,
                });
            }
            let slug = request.prompt.split(',').next().unwrap_or_default().replace(' ', "_");
            Ok(GeneratedImage {
                url: format!("https://img.test/{slug}.png"),
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn plan(extra: usize) -> AssetPlan {
        let mut assets = vec![json!({
            "id": "hub_bg",
            "category": "background",
            "prompt": "hub",
            "aspectRatio": "16:9",
            "priority": "critical"
        })];
        for i in 0..extra {
            assets.push(json!({
                "id": format!("item_{i}"),
                "category": "item",
                "prompt": format!("item {i}"),
                "aspectRatio": "1:1",
                "priority": "normal"
            }));
        }
        serde_json::from_value(json!({ "assets": assets, "styleSuffix": "watercolor" })).unwrap()
    }

    fn generator(images: Arc<FakeImages>, concurrency: usize) -> AssetGenerator {
        AssetGenerator::new(
            images,
            AssetSettings {
                concurrency,
                timeout: Duration::from_secs(5),
                retries: 1,
                backoff: BackoffPolicy::None,
            },
            EventEmitter::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn generates_every_asset() {
        let images = Arc::new(FakeImages::default());
        let manifest = generator(images.clone(), 4)
            .generate(&plan(5), &RunLog::new())
            .await
            .unwrap();
        assert_eq!(manifest.len(), 6);
        assert!(manifest.failed.is_empty());
        assert_eq!(manifest.url("hub_bg"), Some("https://img.test/hub.png"));
        assert_eq!(images.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn respects_concurrency_cap() {
        let images = Arc::new(FakeImages::default());
        generator(images.clone(), 2)
            .generate(&plan(7), &RunLog::new())
            .await
            .unwrap();
        assert!(images.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_critical_failure_degrades() {
        let images = Arc::new(FakeImages {
            fail_marker: Some("item 1"),
            ..FakeImages::default()
        });
        let log = RunLog::new();
        let manifest = generator(images.clone(), 4)
            .generate(&plan(3), &log)
            .await
            .unwrap();
        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.failed, vec!["item_1"]);
        assert!(!manifest.contains("item_1"));
        // First attempt plus one retry.
        assert_eq!(images.attempts.lock().unwrap()["item 1, watercolor"], 2);
        assert_eq!(log.timings()[0].stage, StageName::AssetGenerator);
    }

    #[tokio::test(start_paused = true)]
    async fn critical_failure_is_terminal() {
        let images = Arc::new(FakeImages {
            fail_marker: Some("hub"),
            ..FakeImages::default()
        });
        let err = generator(images, 4)
            .generate(&plan(2), &RunLog::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), Some(FailureCategory::Asset));
        assert!(err.to_string().contains("hub_bg"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_times_out() {
        let images = Arc::new(FakeImages {
            hang_marker: Some("item 0"),
            ..FakeImages::default()
        });
        let manifest = generator(images, 4)
            .generate(&plan(1), &RunLog::new())
            .await
            .unwrap();
        assert_eq!(manifest.failed, vec!["item_0"]);
    }

    #[tokio::test]
    async fn plan_over_budget_rejected_before_any_call() {
        let images = Arc::new(FakeImages::default());
        let err = generator(images.clone(), 4)
            .generate(&plan(12), &RunLog::new())
            .await
            .unwrap_err();
        match err {
            WorldsmithError::AssetPlanRejected(reason) => assert!(reason.contains("13 assets")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(images.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn plan_without_hub_rejected() {
        let images = Arc::new(FakeImages::default());
        let mut bad = plan(2);
        bad.assets.remove(0);
        let err = generator(images.clone(), 4)
            .generate(&bad, &RunLog::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorldsmithError::AssetPlanRejected(_)));
        assert_eq!(images.calls.load(Ordering::SeqCst), 0);
    }
}
