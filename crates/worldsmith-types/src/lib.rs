//! Shared documents, errors and validation for the Worldsmith generation pipeline.
//!
//! This crate provides the foundational types used across all other Worldsmith crates:
//! - `WorldsmithError`: unified error taxonomy
//! - the stage documents passed between pipeline stages (`documents`)
//! - `Validate`: schema checks applied at every stage boundary
//! - `Versioned`: immutable document versions produced by corrections

pub mod documents;
pub mod validate;

pub use documents::*;
pub use validate::{SchemaErrors, Validate};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error type for all Worldsmith subsystems.
#[derive(Debug, thiserror::Error)]
pub enum WorldsmithError {
    // === Model Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout {
        provider: String,
        timeout_ms: u64,
    },

    #[error("Context length exceeded for {provider}: {message}")]
    ContextLengthExceeded { provider: String, message: String },

    // === Document Errors ===
    #[error("Schema violation in {document}: {message}")]
    SchemaViolation { document: String, message: String },

    #[error("Asset plan rejected: {0}")]
    AssetPlanRejected(String),

    // === Pipeline Errors ===
    #[error("Stage '{stage}' failed ({category}): {message}")]
    StageFailed {
        stage: StageName,
        category: FailureCategory,
        message: String,
        diagnostics: Option<serde_json::Value>,
    },

    #[error("Pipeline run cancelled")]
    Cancelled,

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl WorldsmithError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorldsmithError::RateLimited { .. }
                | WorldsmithError::RequestTimeout { .. }
                | WorldsmithError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorldsmithError::AuthError { .. }
                | WorldsmithError::ContextLengthExceeded { .. }
                | WorldsmithError::AssetPlanRejected(_)
                | WorldsmithError::StageFailed { .. }
                | WorldsmithError::Cancelled
        )
    }

    /// Returns `true` for errors raised by a model or image backend call.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WorldsmithError::ProviderError { .. }
                | WorldsmithError::RateLimited { .. }
                | WorldsmithError::AuthError { .. }
                | WorldsmithError::RequestTimeout { .. }
                | WorldsmithError::ContextLengthExceeded { .. }
        )
    }

    /// The failure category of a terminal stage failure, if this is one.
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            WorldsmithError::StageFailed { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// Wrap this error as a terminal failure of `stage`.
    ///
    /// Transport errors keep the `Transport` category, schema errors map to
    /// `Schema`; anything else takes the supplied fallback category. Errors
    /// that are already stage failures or cancellations pass through.
    pub fn into_stage_failure(self, stage: StageName, fallback: FailureCategory) -> Self {
        match self {
            WorldsmithError::StageFailed { .. } | WorldsmithError::Cancelled => self,
            other => {
                let category = if other.is_transport() {
                    FailureCategory::Transport
                } else if matches!(
                    other,
                    WorldsmithError::SchemaViolation { .. } | WorldsmithError::Json(_)
                ) {
                    FailureCategory::Schema
                } else {
                    fallback
                };
                WorldsmithError::StageFailed {
                    stage,
                    category,
                    message: other.to_string(),
                    diagnostics: None,
                }
            }
        }
    }
}

/// A convenience alias for `Result<T, WorldsmithError>`.
pub type Result<T> = std::result::Result<T, WorldsmithError>;

// ---------------------------------------------------------------------------
// StageName: every step of a pipeline run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Interpreter,
    CreativeDirector,
    GameDesigner,
    AssetPlanner,
    AssetGenerator,
    ContentArchitect,
    QualityGate,
    CodeGenerator,
    Assembler,
    StructuralGate,
    AutoFix,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Interpreter => "interpreter",
            StageName::CreativeDirector => "creative_director",
            StageName::GameDesigner => "game_designer",
            StageName::AssetPlanner => "asset_planner",
            StageName::AssetGenerator => "asset_generator",
            StageName::ContentArchitect => "content_architect",
            StageName::QualityGate => "quality_gate",
            StageName::CodeGenerator => "code_generator",
            StageName::Assembler => "assembler",
            StageName::StructuralGate => "structural_gate",
            StageName::AutoFix => "auto_fix",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FailureCategory: why a run terminated
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Transport,
    Schema,
    ContentQuality,
    Structural,
    Asset,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCategory::Transport => "transport",
            FailureCategory::Schema => "schema",
            FailureCategory::ContentQuality => "content_quality",
            FailureCategory::Structural => "structural",
            FailureCategory::Asset => "asset",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Versioned: immutable document versions
// ---------------------------------------------------------------------------

/// Where a document version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrigin {
    Generated,
    QualityGate,
    AutoFix,
}

/// A document together with its version number and origin.
///
/// Corrections never edit a document in place: [`Versioned::revise`] builds a
/// successor and leaves `self` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u32,
    pub origin: VersionOrigin,
    pub document: T,
}

impl<T> Versioned<T> {
    /// First version of a freshly generated document.
    pub fn initial(document: T) -> Self {
        Self {
            version: 1,
            origin: VersionOrigin::Generated,
            document,
        }
    }

    /// A successor version carrying `document`.
    pub fn revise(&self, document: T, origin: VersionOrigin) -> Self {
        Self {
            version: self.version + 1,
            origin,
            document,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = WorldsmithError::ProviderError {
            provider: "anthropic".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider anthropic returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_stage_failed() {
        let err = WorldsmithError::StageFailed {
            stage: StageName::ContentArchitect,
            category: FailureCategory::Schema,
            message: "missing field `hints`".into(),
            diagnostics: None,
        };
        assert_eq!(
            err.to_string(),
            "Stage 'content_architect' failed (schema): missing field `hints`"
        );
    }

    #[test]
    fn error_display_schema_violation() {
        let err = WorldsmithError::SchemaViolation {
            document: "AssetPlan".into(),
            message: "first asset must be hub_bg".into(),
        };
        assert_eq!(
            err.to_string(),
            "Schema violation in AssetPlan: first asset must be hub_bg"
        );
    }

    #[test]
    fn retryable_errors() {
        assert!(WorldsmithError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 10,
        }
        .is_retryable());
        assert!(WorldsmithError::RequestTimeout {
            provider: "x".into(),
            timeout_ms: 10,
        }
        .is_retryable());
        assert!(!WorldsmithError::ProviderError {
            provider: "x".into(),
            status: 400,
            message: "bad".into(),
            retryable: false,
        }
        .is_retryable());
        assert!(!WorldsmithError::AuthError { provider: "x".into() }.is_retryable());
    }

    #[test]
    fn terminal_errors() {
        assert!(WorldsmithError::AuthError { provider: "x".into() }.is_terminal());
        assert!(WorldsmithError::Cancelled.is_terminal());
        assert!(WorldsmithError::AssetPlanRejected("too many".into()).is_terminal());
        assert!(!WorldsmithError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 0,
        }
        .is_terminal());
    }

    #[test]
    fn into_stage_failure_keeps_transport_category() {
        let err = WorldsmithError::RequestTimeout {
            provider: "anthropic".into(),
            timeout_ms: 1000,
        }
        .into_stage_failure(StageName::Interpreter, FailureCategory::Schema);
        assert_eq!(err.category(), Some(FailureCategory::Transport));
    }

    #[test]
    fn into_stage_failure_maps_schema_violation() {
        let err = WorldsmithError::SchemaViolation {
            document: "ContentPlan".into(),
            message: "too few challenges".into(),
        }
        .into_stage_failure(StageName::ContentArchitect, FailureCategory::Transport);
        match err {
            WorldsmithError::StageFailed { stage, category, .. } => {
                assert_eq!(stage, StageName::ContentArchitect);
                assert_eq!(category, FailureCategory::Schema);
            }
            other => panic!("expected StageFailed, got {other:?}"),
        }
    }

    #[test]
    fn into_stage_failure_passes_through_existing_failure() {
        let err = WorldsmithError::StageFailed {
            stage: StageName::AutoFix,
            category: FailureCategory::Structural,
            message: "still failing".into(),
            diagnostics: None,
        }
        .into_stage_failure(StageName::CodeGenerator, FailureCategory::Schema);
        match err {
            WorldsmithError::StageFailed { stage, .. } => assert_eq!(stage, StageName::AutoFix),
            other => panic!("expected StageFailed, got {other:?}"),
        }
    }

    #[test]
    fn stage_name_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&StageName::CreativeDirector).unwrap(),
            "\"creative_director\""
        );
        assert_eq!(StageName::AutoFix.to_string(), "auto_fix");
    }

    #[test]
    fn versioned_revise_increments_and_keeps_original() {
        let v1 = Versioned::initial(vec![1, 2, 3]);
        let v2 = v1.revise(vec![1, 2, 4], VersionOrigin::QualityGate);
        assert_eq!(v1.version, 1);
        assert_eq!(v1.document, vec![1, 2, 3]);
        assert_eq!(v2.version, 2);
        assert_eq!(v2.origin, VersionOrigin::QualityGate);
        assert_eq!(v2.document, vec![1, 2, 4]);
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: WorldsmithError = json_err.into();
        assert!(matches!(err, WorldsmithError::Json(_)));
    }
}
