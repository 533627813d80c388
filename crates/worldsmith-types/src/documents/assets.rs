use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::validate::{SchemaErrors, Validate};

/// Id of the hub background every world needs.
pub const HUB_BACKGROUND_ID: &str = "hub_bg";

/// Image budget per world.
pub const MAX_ASSETS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Background,
    Character,
    Item,
    Icon,
    Scene,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetPriority {
    Critical,
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "9:16")]
    Tall,
}

impl AspectRatio {
    /// Pixel size requested from the image backend.
    pub fn image_size(&self) -> &'static str {
        match self {
            AspectRatio::Wide | AspectRatio::Standard => "1536x1024",
            AspectRatio::Square => "1024x1024",
            AspectRatio::Portrait | AspectRatio::Tall => "1024x1536",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRequest {
    pub id: String,
    pub category: AssetCategory,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub priority: AssetPriority,
}

impl AssetRequest {
    pub fn is_critical(&self) -> bool {
        self.priority == AssetPriority::Critical
    }

    /// The image prompt with the plan's shared style suffix appended.
    pub fn full_prompt(&self, style_suffix: &str) -> String {
        let suffix = style_suffix.trim();
        if suffix.is_empty() {
            self.prompt.clone()
        } else {
            format!("{}, {}", self.prompt.trim_end(), suffix)
        }
    }
}

/// AssetPlanner output: the images the world needs, hub background first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPlan {
    pub assets: Vec<AssetRequest>,
    pub style_suffix: String,
}

impl AssetPlan {
    pub fn hub_background(&self) -> Option<&AssetRequest> {
        self.assets.first().filter(|a| {
            a.id == HUB_BACKGROUND_ID
                && a.category == AssetCategory::Background
                && a.priority == AssetPriority::Critical
        })
    }
}

impl Validate for AssetPlan {
    const DOCUMENT: &'static str = "AssetPlan";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.ensure(
            self.assets.len() <= MAX_ASSETS,
            "$.assets",
            format!(
                "{} assets exceed the budget of {MAX_ASSETS}",
                self.assets.len()
            ),
        );
        errors.ensure(
            self.hub_background().is_some(),
            "$.assets[0]",
            format!("first asset must be '{HUB_BACKGROUND_ID}' with category background and priority critical"),
        );

        let hub_count = self
            .assets
            .iter()
            .filter(|a| a.id == HUB_BACKGROUND_ID && a.category == AssetCategory::Background)
            .count();
        errors.ensure(
            hub_count <= 1,
            "$.assets",
            format!("'{HUB_BACKGROUND_ID}' appears {hub_count} times"),
        );

        let mut seen = HashSet::new();
        for (i, asset) in self.assets.iter().enumerate() {
            errors.non_blank(&asset.id, format!("$.assets[{i}].id"));
            errors.non_blank(&asset.prompt, format!("$.assets[{i}].prompt"));
            errors.ensure(
                seen.insert(asset.id.as_str()),
                format!("$.assets[{i}].id"),
                format!("duplicate asset id '{}'", asset.id),
            );
            if i > 0 {
                errors.ensure(
                    !asset.is_critical(),
                    format!("$.assets[{i}].priority"),
                    format!("only '{HUB_BACKGROUND_ID}' may be critical"),
                );
            }
        }
    }
}

/// A resolved image reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub id: String,
    pub category: AssetCategory,
    pub url: String,
}

/// Assets that resolved, keyed by id, plus the ids that did not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    pub assets: BTreeMap<String, AssetRef>,
    #[serde(default)]
    pub failed: Vec<String>,
}

impl AssetManifest {
    pub fn url(&self, id: &str) -> Option<&str> {
        self.assets.get(id).map(|a| a.url.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
