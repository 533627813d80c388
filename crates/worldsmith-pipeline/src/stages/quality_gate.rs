use worldsmith_types::{
    ContentPlan, ModulePlan, QualityReport, Result, StageName, Versioned, WorldConcept,
};

use crate::prompts::{PromptBuilder, Template};
use crate::stage::StageRunner;

pub async fn review_content(
    runner: &StageRunner<'_>,
    concept: &WorldConcept,
    plan: &ModulePlan,
    content: &Versioned<ContentPlan>,
) -> Result<QualityReport> {
    let prompt = PromptBuilder::new(Template::QualityGate)
        .var("content_version", content.version)
        .input("concept", concept)?
        .input("modules", plan)?
        .input("content", &content.document)?
        .build();

    runner.run(StageName::QualityGate, prompt, Ok).await
}
