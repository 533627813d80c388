//! Run configuration. Every field has a default, so an empty JSON object is a
//! valid config file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use worldsmith_types::{Result, StageName, DEFAULT_PASSING_SCORE};

use crate::retry::BackoffPolicy;

/// What to do with QualityGate critical errors no correction addressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPolicy {
    /// Log them and record them in the run metadata.
    #[default]
    Warn,
    /// Fail the run with a `content_quality` failure.
    Block,
}

/// Exponential backoff between transport retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(with = "duration_serde")]
    pub base: Duration,
    #[serde(with = "duration_serde")]
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        BackoffPolicy::Exponential {
            base: config.base,
            max: config.max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model id; the provider default when unset.
    pub model: Option<String>,
    /// Per-stage token budget overrides.
    pub max_tokens: BTreeMap<StageName, u32>,
    pub schema_retries: usize,
    pub transport_retries: usize,
    pub backoff: BackoffConfig,
    #[serde(with = "duration_serde")]
    pub call_timeout: Duration,
    #[serde(with = "duration_serde")]
    pub asset_timeout: Duration,
    pub asset_concurrency: usize,
    pub auto_fix_attempts: u32,
    pub quality_policy: QualityPolicy,
    pub passing_score: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: BTreeMap::new(),
            schema_retries: 1,
            transport_retries: 2,
            backoff: BackoffConfig::default(),
            call_timeout: Duration::from_secs(120),
            asset_timeout: Duration::from_secs(90),
            asset_concurrency: 4,
            auto_fix_attempts: 1,
            quality_policy: QualityPolicy::Warn,
            passing_score: DEFAULT_PASSING_SCORE,
        }
    }
}

impl PipelineConfig {
    /// Token budget for one call of `stage`.
    pub fn max_tokens_for(&self, stage: StageName) -> u32 {
        if let Some(tokens) = self.max_tokens.get(&stage) {
            return *tokens;
        }
        match stage {
            StageName::Interpreter | StageName::GameDesigner => 2048,
            StageName::CreativeDirector | StageName::AssetPlanner => 3072,
            StageName::QualityGate | StageName::CodeGenerator => 6144,
            StageName::ContentArchitect | StageName::AutoFix => 16384,
            _ => 4096,
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::from(&self.backoff)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Read a JSON config file.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), "pipeline config loaded");
        Ok(config)
    }

    /// Pull out-of-range values back into range. A concurrency cap of zero
    /// would stall the asset fan-out, and the assembler only accepts a
    /// passing score in `1..=100`.
    pub(crate) fn sanitized(mut self) -> Self {
        if self.asset_concurrency == 0 {
            tracing::warn!("asset_concurrency of 0 raised to 1");
            self.asset_concurrency = 1;
        }
        let score = self.passing_score.clamp(1, 100);
        if score != self.passing_score {
            tracing::warn!(passing_score = self.passing_score, clamped = score, "passing_score outside 1..=100");
            self.passing_score = score;
        }
        self
    }
}

/// `"<n>ms"`, `"<n>s"`, `"<n>m"`, `"<n>h"` or `"<n>d"` strings.
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Largest whole unit that represents `duration` exactly.
    pub fn format_duration(duration: Duration) -> String {
        let ms = duration.as_millis() as u64;
        for (unit, size) in [("d", 86_400_000), ("h", 3_600_000), ("m", 60_000), ("s", 1000)] {
            if ms > 0 && ms % size == 0 {
                return format!("{}{unit}", ms / size);
            }
        }
        format!("{ms}ms")
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (digits, scale) = if let Some(val) = s.strip_suffix("ms") {
            (val, 1)
        } else if let Some(val) = s.strip_suffix('s') {
            (val, 1000)
        } else if let Some(val) = s.strip_suffix('m') {
            (val, 60_000)
        } else if let Some(val) = s.strip_suffix('h') {
            (val, 3_600_000)
        } else if let Some(val) = s.strip_suffix('d') {
            (val, 86_400_000)
        } else {
            return Err(format!("unknown duration format: {s}"));
        };
        let n: u64 = digits
            .parse()
            .map_err(|e| format!("invalid duration '{s}': {e}"))?;
        Ok(Duration::from_millis(n.saturating_mul(scale)))
    }
}
