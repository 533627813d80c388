//! Static instruction templates and `${var}` rendering.
//!
//! A rendered [`Prompt`] carries the instructions as the system message and
//! the upstream documents, as pretty JSON, as the user message.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use worldsmith_types::{Result, StageName};

/// One instruction template per model-driven step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Interpreter,
    CreativeDirector,
    GameDesigner,
    AssetPlanner,
    ContentArchitect,
    QualityGate,
    CodeGenerator,
    AutoFix,
}

impl Template {
    pub fn text(&self) -> &'static str {
        match self {
            Template::Interpreter => include_str!("../prompts/interpreter.md"),
            Template::CreativeDirector => include_str!("../prompts/creative_director.md"),
            Template::GameDesigner => include_str!("../prompts/game_designer.md"),
            Template::AssetPlanner => include_str!("../prompts/asset_planner.md"),
            Template::ContentArchitect => include_str!("../prompts/content_architect.md"),
            Template::QualityGate => include_str!("../prompts/quality_gate.md"),
            Template::CodeGenerator => include_str!("../prompts/code_generator.md"),
            Template::AutoFix => include_str!("../prompts/auto_fix.md"),
        }
    }

    pub fn stage(&self) -> StageName {
        match self {
            Template::Interpreter => StageName::Interpreter,
            Template::CreativeDirector => StageName::CreativeDirector,
            Template::GameDesigner => StageName::GameDesigner,
            Template::AssetPlanner => StageName::AssetPlanner,
            Template::ContentArchitect => StageName::ContentArchitect,
            Template::QualityGate => StageName::QualityGate,
            Template::CodeGenerator => StageName::CodeGenerator,
            Template::AutoFix => StageName::AutoFix,
        }
    }
}

/// A rendered model request body.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Collects variables and upstream inputs for one template.
#[derive(Debug)]
pub struct PromptBuilder {
    template: Template,
    vars: HashMap<String, String>,
    inputs: Vec<(String, String)>,
}

impl PromptBuilder {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            vars: HashMap::new(),
            inputs: Vec::new(),
        }
    }

    pub fn var(mut self, key: &str, value: impl ToString) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Attach an upstream document, rendered as pretty JSON.
    pub fn input<T: Serialize>(mut self, name: &str, document: &T) -> Result<Self> {
        let json = serde_json::to_string_pretty(document)?;
        self.inputs.push((name.to_string(), json));
        Ok(self)
    }

    /// Attach upstream text verbatim.
    pub fn raw_input(mut self, name: &str, text: impl Into<String>) -> Self {
        self.inputs.push((name.to_string(), text.into()));
        self
    }

    pub fn build(self) -> Prompt {
        let system = expand_variables(self.template.text(), &self.vars);
        let leftover = unresolved_placeholders(&system);
        if !leftover.is_empty() {
            tracing::warn!(
                stage = %self.template.stage(),
                placeholders = ?leftover,
                "template rendered with unresolved placeholders"
            );
        }

        let user = self
            .inputs
            .iter()
            .map(|(name, body)| format!("## {name}\n\n{body}\n"))
            .collect::<Vec<_>>()
            .join("\n");

        Prompt { system, user }
    }
}

/// Expand `${variable}` patterns in a string.
///
/// Replaces each occurrence of `${key}` with the corresponding value from `vars`.
/// Variables that do not appear in `vars` are left as-is.
pub fn expand_variables(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let pattern = format!("${{{}}}", key);
        result = result.replace(&pattern, value);
    }
    result
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Names of `${var}` placeholders still present in `text`.
pub fn unresolved_placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = PLACEHOLDER
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL: [Template; 8] = [
        Template::Interpreter,
        Template::CreativeDirector,
        Template::GameDesigner,
        Template::AssetPlanner,
        Template::ContentArchitect,
        Template::QualityGate,
        Template::CodeGenerator,
        Template::AutoFix,
    ];

    #[test]
    fn expand_single_variable() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "world".to_string());
        assert_eq!(expand_variables("Hello ${name}!", &vars), "Hello world!");
    }

    #[test]
    fn expand_same_variable_multiple_times() {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), "42".to_string());
        assert_eq!(expand_variables("${x} + ${x} = ?", &vars), "42 + 42 = ?");
    }

    #[test]
    fn unknown_variables_left_in_place() {
        let template = "No variables here, just ${unknown} text.";
        assert_eq!(expand_variables(template, &HashMap::new()), template);
        assert_eq!(unresolved_placeholders(template), vec!["unknown"]);
    }

    #[test]
    fn every_template_asks_for_bare_output() {
        for template in ALL {
            let text = template.text();
            assert!(text.contains("# Output"), "{:?}", template);
            assert!(text.contains("no code fences"), "{:?}", template);
        }
    }

    #[test]
    fn builder_renders_vars_and_inputs() {
        let prompt = PromptBuilder::new(Template::Interpreter)
            .var("topic", "Photosynthese")
            .var("grade_level", 6)
            .var("subject_hint", "Biologie")
            .input("request", &json!({ "topic": "Photosynthese" }))
            .unwrap()
            .build();

        assert!(prompt.system.contains("- Topic: Photosynthese"));
        assert!(prompt.system.contains("- Grade level: 6"));
        assert!(unresolved_placeholders(&prompt.system).is_empty());
        assert!(prompt.user.starts_with("## request\n\n{\n  \"topic\": \"Photosynthese\"\n}"));
    }

    #[test]
    fn inputs_keep_their_order() {
        let prompt = PromptBuilder::new(Template::AutoFix)
            .var("violations", "- E_STRUCT_002")
            .raw_input("program", "function World() {}")
            .raw_input("notes", "none")
            .build();
        let program = prompt.user.find("## program").unwrap();
        let notes = prompt.user.find("## notes").unwrap();
        assert!(program < notes);
        assert!(prompt.system.contains("- E_STRUCT_002"));
    }

    #[test]
    fn template_stage_mapping() {
        assert_eq!(Template::AutoFix.stage(), StageName::AutoFix);
        assert_eq!(Template::QualityGate.stage(), StageName::QualityGate);
    }

    #[test]
    fn content_template_describes_game_items() {
        let text = Template::ContentArchitect.text();
        assert!(text.contains(r#"{ "items": [{ "label": "...", "good": true }, ...] }"#));
        assert!(text.contains("At least one item must be good"));
    }
}
