use worldsmith_types::{InterpretedBrief, RequestDescriptor, Result, StageName, WorldConcept};

use crate::prompts::{PromptBuilder, Template};
use crate::stage::StageRunner;

pub async fn create_concept(
    runner: &StageRunner<'_>,
    request: &RequestDescriptor,
    brief: &InterpretedBrief,
) -> Result<WorldConcept> {
    let prompt = PromptBuilder::new(Template::CreativeDirector)
        .var(
            "style_hint",
            request.style_hint.as_deref().unwrap_or("none, choose freely"),
        )
        .var("grade_min", brief.grade_range.min)
        .var("grade_max", brief.grade_range.max)
        .input("brief", brief)?
        .build();

    runner.run(StageName::CreativeDirector, prompt, Ok).await
}
