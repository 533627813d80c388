use serde::{Deserialize, Serialize};

use crate::validate::{SchemaErrors, Validate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Universe {
    pub setting: String,
    pub metaphor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Narrative {
    pub hook: String,
    pub mission: String,
    pub climax: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualIdentity {
    pub style_prompt: String,
    pub color_palette: Vec<String>,
    pub mood: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub concept: String,
    pub hub_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideCharacter {
    pub name: String,
    pub appearance: String,
    pub personality: String,
    pub catchphrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSystem {
    pub description: String,
    pub currency_name: String,
}

/// CreativeDirector output: the themed world the lesson lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldConcept {
    pub universe: Universe,
    pub narrative: Narrative,
    pub visual_identity: VisualIdentity,
    pub navigation: Navigation,
    pub guide: GuideCharacter,
    pub reward_system: RewardSystem,
}

fn is_hex_color(value: &str) -> bool {
    let Some(hex) = value.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

impl Validate for WorldConcept {
    const DOCUMENT: &'static str = "WorldConcept";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.non_blank(&self.universe.setting, "$.universe.setting");
        errors.non_blank(&self.narrative.mission, "$.narrative.mission");
        errors.non_blank(&self.visual_identity.style_prompt, "$.visualIdentity.stylePrompt");
        errors.non_blank(&self.guide.name, "$.guide.name");
        errors.ensure(
            !self.guide.catchphrases.is_empty(),
            "$.guide.catchphrases",
            "at least one catchphrase required",
        );
        errors.ensure(
            !self.visual_identity.color_palette.is_empty(),
            "$.visualIdentity.colorPalette",
            "palette must not be empty",
        );
        for (i, color) in self.visual_identity.color_palette.iter().enumerate() {
            errors.ensure(
                is_hex_color(color),
                format!("$.visualIdentity.colorPalette[{i}]"),
                format!("'{color}' is not a hex colour"),
            );
        }
    }
}
