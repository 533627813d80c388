//! Stage documents passed forward through a pipeline run.
//!
//! Every document is created by exactly one stage and never mutated after
//! hand-off. JSON field names are camelCase on the wire.

mod assets;
mod brief;
mod concept;
mod content;
mod modules;
mod program;
mod quality;
mod request;
mod world;

pub use assets::{
    AspectRatio, AssetCategory, AssetManifest, AssetPlan, AssetPriority, AssetRef, AssetRequest,
    HUB_BACKGROUND_ID, MAX_ASSETS,
};
pub use brief::{Difficulty, GradeRange, InterpretedBrief};
pub use concept::{
    GuideCharacter, Narrative, Navigation, RewardSystem, Universe, VisualIdentity, WorldConcept,
};
pub use content::{
    Challenge, ChallengeKind, ChallengeType, ContentPlan, Feedback, MatchPair, ModuleContent,
};
pub use modules::{ModuleDescriptor, ModulePlan};
pub use program::{
    GeneratedProgram, GenerationMetadata, PipelineArtifact, ProgramManifest, StageTiming,
    TokenUsage, ViolationCode, ViolationReport,
};
pub use quality::{normalize_path, CriticalError, ErrorCategory, QualityReport, RiskFallback};
pub use request::RequestDescriptor;
pub use world::{
    SceneScript, WorldDocument, WorldModule, WorldScript, WorldTheme, DEFAULT_PASSING_SCORE,
};
