//! The model-driven stages, in pipeline order. Each one renders its
//! template, runs it through [`StageRunner::run`](crate::stage::StageRunner::run)
//! and returns a validated document.

mod asset_planner;
mod code_generator;
mod content_architect;
mod creative_director;
mod game_designer;
mod interpreter;
mod quality_gate;

pub use asset_planner::plan_assets;
pub use code_generator::write_script;
pub use content_architect::write_content;
pub use creative_director::create_concept;
pub use game_designer::design_modules;
pub use interpreter::{infer_subject, interpret};
pub use quality_gate::review_content;
