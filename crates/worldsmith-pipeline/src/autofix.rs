//! Bounded repair of a program that failed the structural gate.

use worldsmith_assembly::check_program;
use worldsmith_types::{
    FailureCategory, GeneratedProgram, Result, StageName, VersionOrigin, Versioned,
    ViolationReport, WorldsmithError,
};

use crate::events::PipelineEvent;
use crate::prompts::{PromptBuilder, Template};
use crate::stage::StageRunner;

/// The program that passed the gate and how many repair calls it took.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub program: Versioned<GeneratedProgram>,
    pub attempts: u32,
}

/// One bullet per violation: code and what it means.
fn violation_list(report: &ViolationReport) -> String {
    report
        .codes
        .iter()
        .map(|code| format!("- {}: {}", code.as_str(), code.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn still_failing(stage: StageName, message: String, report: &ViolationReport) -> WorldsmithError {
    WorldsmithError::StageFailed {
        stage,
        category: FailureCategory::Structural,
        message,
        diagnostics: Some(serde_json::json!(report.code_strings())),
    }
}

/// Ask the model to fix `report`'s violations, at most
/// `auto_fix_attempts` times, re-gating after each call.
///
/// A program that already passes is returned untouched.
pub async fn repair(
    runner: &StageRunner<'_>,
    program: Versioned<GeneratedProgram>,
    report: ViolationReport,
) -> Result<RepairOutcome> {
    if report.passed() {
        return Ok(RepairOutcome {
            program,
            attempts: 0,
        });
    }

    let max_attempts = runner.config().auto_fix_attempts;
    if max_attempts == 0 {
        return Err(still_failing(
            StageName::StructuralGate,
            format!("program failed the structural gate: {report}"),
            &report,
        ));
    }

    let events = runner.events();
    let mut current = program;
    let mut report = report;
    let mut attempts = 0;

    while attempts < max_attempts {
        attempts += 1;
        tracing::info!(attempt = attempts, codes = %report, "auto-fix attempt");
        events.emit(PipelineEvent::AutoFixAttempted { attempt: attempts });

        let prompt = PromptBuilder::new(Template::AutoFix)
            .var("violations", violation_list(&report))
            .raw_input("program", current.document.source.as_str())
            .build();
        let source = runner.complete_text(StageName::AutoFix, prompt).await?;

        current = current.revise(current.document.with_source(source), VersionOrigin::AutoFix);
        events.emit(PipelineEvent::DocumentRevised {
            stage: StageName::AutoFix,
            version: current.version,
            origin: VersionOrigin::AutoFix,
        });

        report = check_program(&current.document);
        events.emit(PipelineEvent::GateChecked {
            passed: report.passed(),
            codes: report.code_strings().into_iter().map(String::from).collect(),
        });
        if report.passed() {
            tracing::info!(attempt = attempts, version = current.version, "auto-fix repaired program");
            return Ok(RepairOutcome {
                program: current,
                attempts,
            });
        }
    }

    tracing::warn!(attempts, codes = %report, "auto-fix exhausted");
    Err(still_failing(
        StageName::AutoFix,
        format!("program still fails the structural gate after {attempts} auto-fix attempt(s): {report}"),
        &report,
    ))
}
