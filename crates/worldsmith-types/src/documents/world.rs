use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::assets::{AssetManifest, HUB_BACKGROUND_ID};
use super::concept::WorldConcept;
use super::content::{Challenge, ContentPlan};
use super::modules::ModulePlan;
use crate::validate::{SchemaErrors, Validate};
use crate::Result;

/// Share of the maximum score needed to finish the world, in percent.
pub const DEFAULT_PASSING_SCORE: u8 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneScript {
    pub module_index: usize,
    pub intro: String,
    pub guide_line: String,
    #[serde(default)]
    pub background_asset: Option<String>,
}

/// CodeGenerator output: the narrative layer the assembler renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldScript {
    pub title: String,
    pub intro: String,
    pub scenes: Vec<SceneScript>,
    pub boss_intro: String,
    pub outro: String,
    pub victory_text: String,
}

impl WorldScript {
    pub fn scene(&self, module_index: usize) -> Option<&SceneScript> {
        self.scenes.iter().find(|s| s.module_index == module_index)
    }

    /// Every planned module plus the boss needs exactly one scene.
    pub fn check_against(&self, plan: &ModulePlan, errors: &mut SchemaErrors) {
        for index in 0..=plan.modules.len() {
            errors.ensure(
                self.scene(index).is_some(),
                "$.scenes",
                format!("missing scene for module {index}"),
            );
        }
    }
}

impl Validate for WorldScript {
    const DOCUMENT: &'static str = "WorldScript";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.non_blank(&self.title, "$.title");
        errors.non_blank(&self.intro, "$.intro");
        errors.non_blank(&self.victory_text, "$.victoryText");
        let mut seen = HashSet::new();
        for (i, scene) in self.scenes.iter().enumerate() {
            errors.ensure(
                seen.insert(scene.module_index),
                format!("$.scenes[{i}].moduleIndex"),
                format!("duplicate scene for module {}", scene.module_index),
            );
            errors.non_blank(&scene.intro, format!("$.scenes[{i}].intro"));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldTheme {
    pub setting: String,
    pub mood: String,
    pub palette: Vec<String>,
    pub guide_name: String,
    pub catchphrases: Vec<String>,
    pub currency_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldModule {
    pub index: usize,
    pub title: String,
    pub learning_focus: String,
    #[serde(default)]
    pub is_final: bool,
    pub intro: String,
    pub guide_line: String,
    /// Resolved image URL for the module scene, if any.
    #[serde(default)]
    pub background: Option<String>,
    pub challenges: Vec<Challenge>,
}

/// The final structured content the assembler turns into a program.
///
/// The orchestrator composes it from the stage documents; offline fixtures
/// are stored in the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDocument {
    pub title: String,
    pub intro: String,
    pub boss_intro: String,
    pub outro: String,
    pub victory_text: String,
    pub theme: WorldTheme,
    #[serde(default)]
    pub hub_background: Option<String>,
    pub modules: Vec<WorldModule>,
    /// Asset id to URL for every image that resolved.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
    #[serde(default = "default_passing_score")]
    pub passing_score: u8,
}

fn default_passing_score() -> u8 {
    DEFAULT_PASSING_SCORE
}

impl WorldDocument {
    pub fn compose(
        concept: &WorldConcept,
        plan: &ModulePlan,
        content: &ContentPlan,
        script: &WorldScript,
        manifest: &AssetManifest,
    ) -> Result<Self> {
        let mut errors = SchemaErrors::default();
        content.check_against(plan, &mut errors);
        script.check_against(plan, &mut errors);
        errors.into_result(Self::DOCUMENT)?;

        let descriptors = plan.modules.iter().chain(std::iter::once(&plan.boss));
        let modules = content
            .modules
            .iter()
            .zip(descriptors)
            .enumerate()
            .map(|(index, (module, descriptor))| {
                let scene = script.scene(index);
                let background = scene
                    .and_then(|s| s.background_asset.as_deref())
                    .and_then(|id| manifest.url(id))
                    .map(str::to_string);
                WorldModule {
                    index,
                    title: module.title.clone(),
                    learning_focus: descriptor.learning_focus.clone(),
                    is_final: index == plan.modules.len(),
                    intro: scene.map(|s| s.intro.clone()).unwrap_or_default(),
                    guide_line: scene.map(|s| s.guide_line.clone()).unwrap_or_default(),
                    background,
                    challenges: module.challenges.clone(),
                }
            })
            .collect();

        Ok(WorldDocument {
            title: script.title.clone(),
            intro: script.intro.clone(),
            boss_intro: script.boss_intro.clone(),
            outro: script.outro.clone(),
            victory_text: script.victory_text.clone(),
            theme: WorldTheme {
                setting: concept.universe.setting.clone(),
                mood: concept.visual_identity.mood.clone(),
                palette: concept.visual_identity.color_palette.clone(),
                guide_name: concept.guide.name.clone(),
                catchphrases: concept.guide.catchphrases.clone(),
                currency_name: concept.reward_system.currency_name.clone(),
            },
            hub_background: manifest.url(HUB_BACKGROUND_ID).map(str::to_string),
            modules,
            assets: manifest
                .assets
                .iter()
                .map(|(id, r)| (id.clone(), r.url.clone()))
                .collect(),
            passing_score: DEFAULT_PASSING_SCORE,
        })
    }

    pub fn challenge_count(&self) -> usize {
        self.modules.iter().map(|m| m.challenges.len()).sum()
    }
}

impl Validate for WorldDocument {
    const DOCUMENT: &'static str = "WorldDocument";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.non_blank(&self.title, "$.title");
        errors.ensure(!self.modules.is_empty(), "$.modules", "no modules");
        errors.ensure(
            (1..=100).contains(&self.passing_score),
            "$.passingScore",
            format!("{} outside 1..=100", self.passing_score),
        );
        let last = self.modules.len().saturating_sub(1);
        let mut ids = HashSet::new();
        for (i, module) in self.modules.iter().enumerate() {
            let mpath = format!("$.modules[{i}]");
            errors.ensure(
                module.index == i,
                format!("{mpath}.index"),
                format!("expected {i}, got {}", module.index),
            );
            errors.ensure(
                module.is_final == (i == last),
                format!("{mpath}.isFinal"),
                "exactly the last module must be final",
            );
            errors.non_blank(&module.title, format!("{mpath}.title"));
            errors.ensure(
                !module.challenges.is_empty(),
                format!("{mpath}.challenges"),
                "no challenges",
            );
            for (c, challenge) in module.challenges.iter().enumerate() {
                let cpath = format!("{mpath}.challenges[{c}]");
                errors.ensure(
                    ids.insert(challenge.id.as_str()),
                    format!("{cpath}.id"),
                    format!("duplicate challenge id '{}'", challenge.id),
                );
                challenge.kind.check(&cpath, errors);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::assets::{AssetCategory, AssetRef};
    use serde_json::json;

    fn descriptor(title: &str) -> serde_json::Value {
        json!({
            "title": title, "learningFocus": format!("Fokus {title}"), "gameplay": "g",
            "interaction": "click", "difficulty": "easy", "uniqueElement": "u"
        })
    }

    fn challenges(prefix: &str) -> serde_json::Value {
        let feedback = json!({ "success": "Ja", "failure": "Nein" });
        let hints = json!(["1", "2", "3"]);
        json!([
            { "id": format!("{prefix}-1"), "type": "true-false", "question": "q", "correct": true, "hints": hints, "feedback": feedback },
            { "id": format!("{prefix}-2"), "type": "multiple-choice", "question": "q", "options": ["a", "b"], "correct": 0, "hints": hints, "feedback": feedback },
            { "id": format!("{prefix}-3"), "type": "true-false", "question": "q", "correct": false, "hints": hints, "feedback": feedback }
        ])
    }

    fn fixtures() -> (WorldConcept, ModulePlan, ContentPlan, WorldScript, AssetManifest) {
        let concept: WorldConcept = serde_json::from_value(json!({
            "universe": { "setting": "Dschungel", "metaphor": "Fabrik" },
            "narrative": { "hook": "h", "mission": "m", "climax": "c" },
            "visualIdentity": { "stylePrompt": "s", "colorPalette": ["#00ff00"], "mood": "froh" },
            "navigation": { "concept": "Pfade", "hubDescription": "Baumhaus" },
            "guide": { "name": "Flora", "appearance": "a", "personality": "p", "catchphrases": ["Los!"] },
            "rewardSystem": { "description": "d", "currencyName": "Sonnen" }
        }))
        .unwrap();
        let plan: ModulePlan = serde_json::from_value(json!({
            "modules": [descriptor("A"), descriptor("B"), descriptor("C")],
            "boss": descriptor("Boss"),
            "progressionRationale": "r"
        }))
        .unwrap();
        let content: ContentPlan = serde_json::from_value(json!({
            "modules": (0..4).map(|i| json!({
                "moduleIndex": i, "title": format!("M{i}"), "challenges": challenges(&format!("m{i}"))
            })).collect::<Vec<_>>()
        }))
        .unwrap();
        let script: WorldScript = serde_json::from_value(json!({
            "title": "Die Blattfabrik",
            "intro": "Willkommen",
            "scenes": (0..4).map(|i| {
                let background = (i == 0).then_some("scene_1");
                json!({
                    "moduleIndex": i, "intro": format!("Szene {i}"), "guideLine": "Los!",
                    "backgroundAsset": background
                })
            }).collect::<Vec<_>>(),
            "bossIntro": "Der Schatten kommt",
            "outro": "Geschafft",
            "victoryText": "Sieg!"
        }))
        .unwrap();
        let mut manifest = AssetManifest::default();
        for id in ["hub_bg", "scene_1"] {
            manifest.assets.insert(
                id.to_string(),
                AssetRef {
                    id: id.to_string(),
                    category: AssetCategory::Background,
                    url: format!("https://img.test/{id}.png"),
                },
            );
        }
        (concept, plan, content, script, manifest)
    }

    #[test]
    fn compose_merges_documents() {
        let (concept, plan, content, script, manifest) = fixtures();
        let doc = WorldDocument::compose(&concept, &plan, &content, &script, &manifest).unwrap();
        assert_eq!(doc.modules.len(), 4);
        assert!(doc.modules[3].is_final);
        assert_eq!(doc.modules[1].learning_focus, "Fokus B");
        assert_eq!(doc.modules[0].background.as_deref(), Some("https://img.test/scene_1.png"));
        assert_eq!(doc.modules[1].background, None);
        assert_eq!(doc.hub_background.as_deref(), Some("https://img.test/hub_bg.png"));
        assert_eq!(doc.theme.guide_name, "Flora");
        assert_eq!(doc.challenge_count(), 12);
        assert!(doc.validate().is_ok(), "{:?}", doc.validate());
    }

    #[test]
    fn compose_rejects_missing_boss_content() {
        let (concept, plan, mut content, script, manifest) = fixtures();
        content.modules.pop();
        let err = WorldDocument::compose(&concept, &plan, &content, &script, &manifest).unwrap_err();
        assert!(err.to_string().contains("including boss"));
    }

    #[test]
    fn compose_rejects_missing_scene() {
        let (concept, plan, content, mut script, manifest) = fixtures();
        script.scenes.retain(|s| s.module_index != 2);
        let err = WorldDocument::compose(&concept, &plan, &content, &script, &manifest).unwrap_err();
        assert!(err.to_string().contains("missing scene for module 2"));
    }

    #[test]
    fn final_flag_must_be_on_last_module() {
        let (concept, plan, content, script, manifest) = fixtures();
        let mut doc = WorldDocument::compose(&concept, &plan, &content, &script, &manifest).unwrap();
        doc.modules[0].is_final = true;
        assert!(doc.validate().is_err());
    }

    #[test]
    fn passing_score_defaults_when_absent() {
        let (concept, plan, content, script, manifest) = fixtures();
        let doc = WorldDocument::compose(&concept, &plan, &content, &script, &manifest).unwrap();
        let mut json = serde_json::to_value(&doc).unwrap();
        json.as_object_mut().unwrap().remove("passingScore");
        let back: WorldDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back.passing_score, DEFAULT_PASSING_SCORE);
    }
}
