use worldsmith_types::{
    AssetPlan, ModulePlan, Result, StageName, WorldConcept, HUB_BACKGROUND_ID, MAX_ASSETS,
};

use crate::prompts::{PromptBuilder, Template};
use crate::stage::StageRunner;

/// Plans the image set. A plan over budget or without the hub background is
/// rejected like any other invalid document.
pub async fn plan_assets(
    runner: &StageRunner<'_>,
    concept: &WorldConcept,
    plan: &ModulePlan,
) -> Result<AssetPlan> {
    let prompt = PromptBuilder::new(Template::AssetPlanner)
        .var("max_assets", MAX_ASSETS)
        .var("hub_id", HUB_BACKGROUND_ID)
        .input("concept", concept)?
        .input("modules", plan)?
        .build();

    runner.run(StageName::AssetPlanner, prompt, Ok).await
}
