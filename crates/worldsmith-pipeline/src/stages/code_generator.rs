use worldsmith_types::{
    AssetManifest, ContentPlan, ModulePlan, Result, SchemaErrors, StageName, Validate,
    WorldConcept, WorldScript,
};

use crate::prompts::{PromptBuilder, Template};
use crate::stage::StageRunner;

/// Writes the narrative layer the assembler renders around the content.
pub async fn write_script(
    runner: &StageRunner<'_>,
    concept: &WorldConcept,
    plan: &ModulePlan,
    content: &ContentPlan,
    assets: &AssetManifest,
) -> Result<WorldScript> {
    let asset_ids = if assets.is_empty() {
        "none".to_string()
    } else {
        assets.assets.keys().cloned().collect::<Vec<_>>().join(", ")
    };

    let prompt = PromptBuilder::new(Template::CodeGenerator)
        .var("module_count", plan.modules.len() + 1)
        .var("asset_ids", asset_ids)
        .input("concept", concept)?
        .input("modules", plan)?
        .input("content", content)?
        .build();

    runner
        .run(StageName::CodeGenerator, prompt, |script: WorldScript| {
            let mut errors = SchemaErrors::default();
            script.check_against(plan, &mut errors);
            for scene in &script.scenes {
                if let Some(id) = scene.background_asset.as_deref() {
                    if !assets.contains(id) {
                        tracing::warn!(
                            module = scene.module_index,
                            asset_id = %id,
                            "scene references an asset that was not generated"
                        );
                    }
                }
            }
            errors.into_result(WorldScript::DOCUMENT)?;
            Ok(script)
        })
        .await
}
