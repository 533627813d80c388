use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::assets::AssetManifest;
use super::concept::WorldConcept;
use super::content::ContentPlan;
use crate::{StageName, Versioned};

/// Configuration the program is rendered with, kept next to its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramManifest {
    /// Asset ids referenced by the program, mapped to their URLs.
    pub assets: BTreeMap<String, String>,
    pub module_count: usize,
    pub challenge_count: usize,
    pub passing_score: u8,
    /// Widget functions emitted into the source, in emission order.
    pub widgets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedProgram {
    pub source: String,
    pub manifest: ProgramManifest,
}

impl GeneratedProgram {
    /// Same manifest, different source. Used by the auto-fix path.
    pub fn with_source(&self, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            manifest: self.manifest.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Structural violations
// ---------------------------------------------------------------------------

/// Closed set of structural gate codes, declared in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationCode {
    #[serde(rename = "E_STRUCT_001")]
    MissingEntryPoint,
    #[serde(rename = "E_STRUCT_002")]
    MissingDefaultExport,
    #[serde(rename = "E_NAV_001")]
    MissingModuleCompletion,
    #[serde(rename = "E_NAV_002")]
    MissingWorldCompletion,
    #[serde(rename = "E_CODE_003")]
    DoctypePresent,
    #[serde(rename = "E_CODE_004")]
    HtmlTagPresent,
    #[serde(rename = "E_CODE_005")]
    HeadOrBodyPresent,
    #[serde(rename = "E_CODE_006")]
    ScriptTagPresent,
    #[serde(rename = "E_CODE_007")]
    ForbiddenApi,
    #[serde(rename = "E_CODE_008")]
    DuplicateFunction,
    #[serde(rename = "E_CODE_009")]
    MarkdownInString,
    #[serde(rename = "E_CODE_010")]
    EmptyProgram,
    #[serde(rename = "E_CODE_011")]
    ProgramTooShort,
}

impl ViolationCode {
    pub const ALL: [ViolationCode; 13] = [
        ViolationCode::MissingEntryPoint,
        ViolationCode::MissingDefaultExport,
        ViolationCode::MissingModuleCompletion,
        ViolationCode::MissingWorldCompletion,
        ViolationCode::DoctypePresent,
        ViolationCode::HtmlTagPresent,
        ViolationCode::HeadOrBodyPresent,
        ViolationCode::ScriptTagPresent,
        ViolationCode::ForbiddenApi,
        ViolationCode::DuplicateFunction,
        ViolationCode::MarkdownInString,
        ViolationCode::EmptyProgram,
        ViolationCode::ProgramTooShort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCode::MissingEntryPoint => "E_STRUCT_001",
            ViolationCode::MissingDefaultExport => "E_STRUCT_002",
            ViolationCode::MissingModuleCompletion => "E_NAV_001",
            ViolationCode::MissingWorldCompletion => "E_NAV_002",
            ViolationCode::DoctypePresent => "E_CODE_003",
            ViolationCode::HtmlTagPresent => "E_CODE_004",
            ViolationCode::HeadOrBodyPresent => "E_CODE_005",
            ViolationCode::ScriptTagPresent => "E_CODE_006",
            ViolationCode::ForbiddenApi => "E_CODE_007",
            ViolationCode::DuplicateFunction => "E_CODE_008",
            ViolationCode::MarkdownInString => "E_CODE_009",
            ViolationCode::EmptyProgram => "E_CODE_010",
            ViolationCode::ProgramTooShort => "E_CODE_011",
        }
    }

    /// One-line description, also fed to the auto-fix prompt.
    pub fn description(&self) -> &'static str {
        match self {
            ViolationCode::MissingEntryPoint => "missing entry point `function World(`",
            ViolationCode::MissingDefaultExport => "missing `export default`",
            ViolationCode::MissingModuleCompletion => "never calls `runtime.completeModule(`",
            ViolationCode::MissingWorldCompletion => "never calls `runtime.completeWorld(`",
            ViolationCode::DoctypePresent => "contains a `<!DOCTYPE` declaration",
            ViolationCode::HtmlTagPresent => "contains an `<html` tag",
            ViolationCode::HeadOrBodyPresent => "contains a `<head` or `<body` tag",
            ViolationCode::ScriptTagPresent => "contains a `<script` tag",
            ViolationCode::ForbiddenApi => {
                "uses a forbidden API (document.write, innerHTML =, window.location =, location.href =, eval)"
            }
            ViolationCode::DuplicateFunction => "declares the same top-level function twice",
            ViolationCode::MarkdownInString => "contains markdown emphasis inside a string literal",
            ViolationCode::EmptyProgram => "program is empty",
            ViolationCode::ProgramTooShort => "program has fewer than 40 non-empty lines",
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered violation codes; empty means the program passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub codes: Vec<ViolationCode>,
}

impl ViolationReport {
    pub fn passed(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn contains(&self, code: ViolationCode) -> bool {
        self.codes.contains(&code)
    }

    pub fn code_strings(&self) -> Vec<&'static str> {
        self.codes.iter().map(|c| c.as_str()).collect()
    }
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            f.write_str("PASS")
        } else {
            write!(f, "FAIL [{}]", self.code_strings().join(", "))
        }
    }
}

// ---------------------------------------------------------------------------
// Run metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub stage: StageName,
    pub duration_ms: u64,
    /// Calls made, including schema retries.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub model: String,
    pub stages: Vec<StageTiming>,
    pub auto_fix_attempts: u32,
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub lint_warnings: Vec<String>,
    /// QualityGate critical errors no correction addressed.
    #[serde(default)]
    pub unresolved_quality_errors: Vec<String>,
    #[serde(default)]
    pub failed_assets: Vec<String>,
}

impl GenerationMetadata {
    pub fn stage_retries(&self, stage: StageName) -> u32 {
        self.stages
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| t.attempts.saturating_sub(1))
            .unwrap_or(0)
    }
}

/// Everything a successful run returns. Never partially populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineArtifact {
    pub program: Versioned<GeneratedProgram>,
    pub concept: WorldConcept,
    pub content: Versioned<ContentPlan>,
    pub assets: AssetManifest,
    pub metadata: GenerationMetadata,
}
