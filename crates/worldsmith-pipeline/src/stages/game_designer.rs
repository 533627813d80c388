use worldsmith_types::{InterpretedBrief, ModulePlan, Result, StageName, WorldConcept};

use crate::prompts::{PromptBuilder, Template};
use crate::stage::StageRunner;

pub async fn design_modules(
    runner: &StageRunner<'_>,
    brief: &InterpretedBrief,
    concept: &WorldConcept,
) -> Result<ModulePlan> {
    let prompt = PromptBuilder::new(Template::GameDesigner)
        .var("min_modules", ModulePlan::MIN_MODULES)
        .var("max_modules", ModulePlan::MAX_MODULES)
        .input("brief", brief)?
        .input("concept", concept)?
        .build();

    runner.run(StageName::GameDesigner, prompt, Ok).await
}
