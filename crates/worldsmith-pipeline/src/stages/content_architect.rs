use worldsmith_types::{
    ContentPlan, InterpretedBrief, ModulePlan, Result, SchemaErrors, StageName, Validate,
    WorldConcept,
};

use crate::prompts::{PromptBuilder, Template};
use crate::stage::StageRunner;

/// Writes the challenges for every planned module and the boss.
pub async fn write_content(
    runner: &StageRunner<'_>,
    brief: &InterpretedBrief,
    concept: &WorldConcept,
    plan: &ModulePlan,
) -> Result<ContentPlan> {
    let prompt = PromptBuilder::new(Template::ContentArchitect)
        .var("module_count", plan.modules.len() + 1)
        .var("min_challenges", ContentPlan::MIN_CHALLENGES_PER_MODULE)
        .var("max_same_type", ContentPlan::MAX_CONSECUTIVE_SAME_TYPE)
        .var("grade_min", brief.grade_range.min)
        .var("grade_max", brief.grade_range.max)
        .input("brief", brief)?
        .input("concept", concept)?
        .input("modules", plan)?
        .build();

    runner
        .run(StageName::ContentArchitect, prompt, |content: ContentPlan| {
            let mut errors = SchemaErrors::default();
            content.check_against(plan, &mut errors);
            errors.into_result(ContentPlan::DOCUMENT)?;
            Ok(content)
        })
        .await
}
