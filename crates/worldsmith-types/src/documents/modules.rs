use serde::{Deserialize, Serialize};

use super::brief::Difficulty;
use crate::validate::{SchemaErrors, Validate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub title: String,
    pub learning_focus: String,
    pub gameplay: String,
    pub interaction: String,
    pub difficulty: Difficulty,
    pub unique_element: String,
    /// Set on the boss descriptor only.
    #[serde(default)]
    pub is_final: bool,
}

/// GameDesigner output: the ordered module structure of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulePlan {
    pub modules: Vec<ModuleDescriptor>,
    pub boss: ModuleDescriptor,
    pub progression_rationale: String,
}

impl ModulePlan {
    pub const MIN_MODULES: usize = 3;
    pub const MAX_MODULES: usize = 6;
}

impl Validate for ModulePlan {
    const DOCUMENT: &'static str = "ModulePlan";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.ensure(
            (Self::MIN_MODULES..=Self::MAX_MODULES).contains(&self.modules.len()),
            "$.modules",
            format!(
                "expected {}..={} modules, got {}",
                Self::MIN_MODULES,
                Self::MAX_MODULES,
                self.modules.len()
            ),
        );
        for (i, module) in self.modules.iter().enumerate() {
            errors.non_blank(&module.title, format!("$.modules[{i}].title"));
            errors.non_blank(&module.learning_focus, format!("$.modules[{i}].learningFocus"));
        }
        errors.non_blank(&self.boss.title, "$.boss.title");
        errors.ensure(
            self.modules.iter().all(|m| !m.is_final),
            "$.modules",
            "only the boss may be final",
        );
    }
}
