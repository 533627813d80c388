//! Deterministic back half of the pipeline: world assembly, the structural
//! gate, and the advisory content lint.
//!
//! Nothing in this crate calls a model. [`assemble_and_check`] is the offline
//! entry point used by the `worldsmith check` command and the fixture tests.

pub mod content_lint;
pub mod gate;
pub mod skeleton;
pub mod widgets;

pub use content_lint::{lint_content, lint_world, LintWarning};
pub use gate::{check, check_program};
pub use skeleton::assemble;

use serde::Serialize;
use worldsmith_types::{GeneratedProgram, Result, ViolationReport, WorldDocument};

/// Result of assembling a document and gating the program.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub program: GeneratedProgram,
    pub report: ViolationReport,
    pub warnings: Vec<LintWarning>,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.report.passed()
    }
}

/// Assemble `doc`, run the structural gate and the content lint.
///
/// Fails only when the document itself is invalid; gate violations are
/// reported in the outcome.
pub fn assemble_and_check(doc: &WorldDocument) -> Result<CheckOutcome> {
    let program = assemble(doc)?;
    let report = check_program(&program);
    let warnings = lint_world(doc);
    Ok(CheckOutcome {
        program,
        report,
        warnings,
    })
}
