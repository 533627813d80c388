//! Stage executors, asset generation, auto-fix and the run orchestrator.
//!
//! This crate drives one Worldsmith run: the model-driven stages share the
//! contract in [`stage`], the asset branch fans out image calls, QualityGate
//! corrections produce new content versions, and a failed structural gate
//! gets one bounded repair before the run gives up.

pub mod assets;
pub mod autofix;
pub mod config;
pub mod corrections;
pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod stage;
pub mod stages;

pub use assets::{AssetGenerator, AssetSettings};
pub use autofix::{repair, RepairOutcome};
pub use config::{BackoffConfig, PipelineConfig, QualityPolicy};
pub use corrections::{apply_corrections, apply_override, parse_path, CorrectionOutcome, PathSegment};
pub use events::{EventEmitter, PipelineEvent};
pub use orchestrator::{CancelSignal, WorldPipeline};
pub use prompts::{expand_variables, Prompt, PromptBuilder, Template};
pub use retry::{execute_with_retry, BackoffPolicy};
pub use stage::{parse_document, strip_code_fences, RunLog, StageRunner};
