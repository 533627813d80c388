//! Advisory content-quality lint.
//!
//! These rules never block a run. They flag content that assembles and
//! passes the structural gate but plays badly: an already-sorted sorting
//! task, markdown that renders as literal asterisks, a hint that gives the
//! answer away.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use worldsmith_types::{Challenge, ChallengeKind, ContentPlan, WorldDocument};

// ---------------------------------------------------------------------------
// Warning type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintWarning {
    pub rule: &'static str,
    pub path: String,
    pub message: String,
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.path, self.message)
    }
}

/// One module's challenges, as seen by the rules.
pub struct ModuleView<'a> {
    pub index: usize,
    pub challenges: &'a [Challenge],
}

// ---------------------------------------------------------------------------
// ContentRule trait
// ---------------------------------------------------------------------------

pub trait ContentRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, module: &ModuleView<'_>) -> Vec<LintWarning>;
}

fn challenge_path(module: usize, challenge: usize) -> String {
    format!("modules[{module}].challenges[{challenge}]")
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct SortingUnshuffledRule;
impl ContentRule for SortingUnshuffledRule {
    fn name(&self) -> &'static str {
        "sorting_unshuffled"
    }
    fn apply(&self, module: &ModuleView<'_>) -> Vec<LintWarning> {
        module
            .challenges
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match &c.kind {
                ChallengeKind::Sorting { items, correct } if items == correct => Some(LintWarning {
                    rule: self.name(),
                    path: challenge_path(module.index, i),
                    message: "items are already in the target order".into(),
                }),
                _ => None,
            })
            .collect()
    }
}

static MARKDOWN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*[^*\s](?:[^*\n]*[^*\s])?\*\*|__[^_\s](?:[^_\n]*[^_\s])?__|^#{1,6}\s|`[^`\n]+`")
        .unwrap()
});

/// All learner-visible text of a challenge with a path suffix.
fn visible_text(challenge: &Challenge) -> Vec<(String, &str)> {
    let mut text = vec![
        ("question".to_string(), challenge.question.as_str()),
        ("feedback.success".to_string(), challenge.feedback.success.as_str()),
        ("feedback.failure".to_string(), challenge.feedback.failure.as_str()),
    ];
    for (h, hint) in challenge.hints.iter().enumerate() {
        text.push((format!("hints[{h}]"), hint.as_str()));
    }
    if let ChallengeKind::MultipleChoice { options, .. } = &challenge.kind {
        for (o, option) in options.iter().enumerate() {
            text.push((format!("options[{o}]"), option.as_str()));
        }
    }
    text
}

struct MarkdownRule;
impl ContentRule for MarkdownRule {
    fn name(&self) -> &'static str {
        "markdown_in_text"
    }
    fn apply(&self, module: &ModuleView<'_>) -> Vec<LintWarning> {
        let mut warnings = Vec::new();
        for (i, challenge) in module.challenges.iter().enumerate() {
            for (field, text) in visible_text(challenge) {
                if MARKDOWN.is_match(text) {
                    warnings.push(LintWarning {
                        rule: self.name(),
                        path: format!("{}.{field}", challenge_path(module.index, i)),
                        message: "markdown is shown verbatim to the learner".into(),
                    });
                }
            }
        }
        warnings
    }
}

struct DuplicateOptionsRule;
impl ContentRule for DuplicateOptionsRule {
    fn name(&self) -> &'static str {
        "duplicate_options"
    }
    fn apply(&self, module: &ModuleView<'_>) -> Vec<LintWarning> {
        let mut warnings = Vec::new();
        for (i, challenge) in module.challenges.iter().enumerate() {
            if let ChallengeKind::MultipleChoice { options, .. } = &challenge.kind {
                let mut seen = HashSet::new();
                if !options.iter().all(|o| seen.insert(o.trim().to_lowercase())) {
                    warnings.push(LintWarning {
                        rule: self.name(),
                        path: format!("{}.options", challenge_path(module.index, i)),
                        message: "two options read the same".into(),
                    });
                }
            }
        }
        warnings
    }
}

struct HintRevealsAnswerRule;
impl ContentRule for HintRevealsAnswerRule {
    fn name(&self) -> &'static str {
        "hint_reveals_answer"
    }
    fn apply(&self, module: &ModuleView<'_>) -> Vec<LintWarning> {
        let mut warnings = Vec::new();
        for (i, challenge) in module.challenges.iter().enumerate() {
            let ChallengeKind::FillBlank { correct, .. } = &challenge.kind else {
                continue;
            };
            let answer = correct.trim().to_lowercase();
            if answer.is_empty() {
                continue;
            }
            // The last hint may give the answer; earlier ones should not.
            for (h, hint) in challenge.hints.iter().enumerate().take(2) {
                if hint.to_lowercase().contains(&answer) {
                    warnings.push(LintWarning {
                        rule: self.name(),
                        path: format!("{}.hints[{h}]", challenge_path(module.index, i)),
                        message: format!("hint contains the answer '{correct}'"),
                    });
                }
            }
        }
        warnings
    }
}

struct SimulationStartsOnTargetRule;
impl ContentRule for SimulationStartsOnTargetRule {
    fn name(&self) -> &'static str {
        "simulation_starts_on_target"
    }
    fn apply(&self, module: &ModuleView<'_>) -> Vec<LintWarning> {
        module
            .challenges
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match &c.kind {
                ChallengeKind::Simulation {
                    min,
                    target,
                    tolerance,
                    ..
                } if (target - min).abs() <= *tolerance => Some(LintWarning {
                    rule: self.name(),
                    path: challenge_path(module.index, i),
                    message: "slider starts within tolerance of the target".into(),
                }),
                _ => None,
            })
            .collect()
    }
}

struct AnswerPositionBiasRule;
impl ContentRule for AnswerPositionBiasRule {
    fn name(&self) -> &'static str {
        "answer_position_bias"
    }
    fn apply(&self, module: &ModuleView<'_>) -> Vec<LintWarning> {
        let positions: Vec<usize> = module
            .challenges
            .iter()
            .filter_map(|c| match &c.kind {
                ChallengeKind::MultipleChoice { correct, .. } => Some(*correct),
                _ => None,
            })
            .collect();
        if positions.len() >= 3 && positions.iter().all(|p| *p == positions[0]) {
            vec![LintWarning {
                rule: self.name(),
                path: format!("modules[{}]", module.index),
                message: format!(
                    "all {} multiple-choice answers are option {}",
                    positions.len(),
                    positions[0]
                ),
            }]
        } else {
            vec![]
        }
    }
}

fn rules() -> Vec<Box<dyn ContentRule>> {
    vec![
        Box::new(SortingUnshuffledRule),
        Box::new(MarkdownRule),
        Box::new(DuplicateOptionsRule),
        Box::new(HintRevealsAnswerRule),
        Box::new(SimulationStartsOnTargetRule),
        Box::new(AnswerPositionBiasRule),
    ]
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn lint_modules(modules: &[ModuleView<'_>]) -> Vec<LintWarning> {
    let rules = rules();
    let mut warnings = Vec::new();
    for module in modules {
        for rule in &rules {
            warnings.extend(rule.apply(module));
        }
    }
    for w in &warnings {
        tracing::warn!(rule = w.rule, path = %w.path, "{}", w.message);
    }
    warnings
}

pub fn lint_content(plan: &ContentPlan) -> Vec<LintWarning> {
    let views: Vec<ModuleView<'_>> = plan
        .modules
        .iter()
        .map(|m| ModuleView {
            index: m.module_index,
            challenges: &m.challenges,
        })
        .collect();
    lint_modules(&views)
}

pub fn lint_world(doc: &WorldDocument) -> Vec<LintWarning> {
    let views: Vec<ModuleView<'_>> = doc
        .modules
        .iter()
        .map(|m| ModuleView {
            index: m.index,
            challenges: &m.challenges,
        })
        .collect();
    lint_modules(&views)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn challenge(id: &str, payload: serde_json::Value) -> serde_json::Value {
        let mut v = json!({
            "id": id,
            "question": "Was passiert?",
            "hints": ["Denk an Licht", "Schau auf das Blatt", "Es ist Chlorophyll"],
            "feedback": { "success": "Richtig!", "failure": "Noch nicht." }
        });
        for (k, val) in payload.as_object().unwrap() {
            v[k] = val.clone();
        }
        v
    }

    fn plan(challenges: Vec<serde_json::Value>) -> ContentPlan {
        serde_json::from_value(json!({
            "modules": [{ "moduleIndex": 0, "title": "M", "challenges": challenges }]
        }))
        .unwrap()
    }

    fn rules_hit(plan: &ContentPlan) -> Vec<&'static str> {
        lint_content(plan).iter().map(|w| w.rule).collect()
    }

    #[test]
    fn clean_content_has_no_warnings() {
        let p = plan(vec![
            challenge("a", json!({ "type": "multiple-choice", "options": ["Licht", "Erde"], "correct": 0 })),
            challenge("b", json!({ "type": "sorting", "items": ["Zucker", "Licht"], "correct": ["Licht", "Zucker"] })),
            challenge("c", json!({ "type": "true-false", "correct": true })),
        ]);
        assert!(lint_content(&p).is_empty());
    }

    #[test]
    fn unshuffled_sorting_warns() {
        let p = plan(vec![challenge(
            "s",
            json!({ "type": "sorting", "items": ["Licht", "Wasser", "Zucker"], "correct": ["Licht", "Wasser", "Zucker"] }),
        )]);
        let warnings = lint_content(&p);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].rule, "sorting_unshuffled");
        assert_eq!(warnings[0].path, "modules[0].challenges[0]");
    }

    #[test]
    fn markdown_in_question_warns() {
        let mut c = challenge("m", json!({ "type": "true-false", "correct": true }));
        c["question"] = json!("Ist **Licht** wichtig?");
        let warnings = lint_content(&plan(vec![c]));
        assert_eq!(warnings[0].rule, "markdown_in_text");
        assert_eq!(warnings[0].path, "modules[0].challenges[0].question");
    }

    #[test]
    fn fill_blank_gaps_do_not_warn() {
        let mut c = challenge(
            "f",
            json!({ "type": "fill-blank", "correct": "Kohlendioxid", "alternatives": ["CO2"] }),
        );
        c["question"] = json!("Pflanzen nehmen ____ auf und geben ____ ab.");
        assert!(rules_hit(&plan(vec![c])).is_empty());
    }

    #[test]
    fn duplicate_options_warn() {
        let p = plan(vec![challenge(
            "d",
            json!({ "type": "multiple-choice", "options": ["Licht", " licht "], "correct": 0 }),
        )]);
        assert_eq!(rules_hit(&p), vec!["duplicate_options"]);
    }

    #[test]
    fn early_hint_with_answer_warns() {
        let mut c = challenge("f", json!({ "type": "fill-blank", "correct": "Licht" }));
        c["hints"] = json!(["Es beginnt mit Licht", "Sonne", "Licht"]);
        let warnings = lint_content(&plan(vec![c]));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "modules[0].challenges[0].hints[0]");
    }

    #[test]
    fn simulation_starting_on_target_warns() {
        let p = plan(vec![challenge(
            "sim",
            json!({ "type": "simulation", "parameter": "Licht", "min": 0.0, "max": 100.0, "step": 5.0, "target": 3.0, "tolerance": 5.0 }),
        )]);
        assert_eq!(rules_hit(&p), vec!["simulation_starts_on_target"]);
    }

    #[test]
    fn same_answer_position_warns() {
        let mc = |id: &str| challenge(id, json!({ "type": "multiple-choice", "options": ["a", "b"], "correct": 1 }));
        let p = plan(vec![mc("1"), mc("2"), mc("3")]);
        assert_eq!(rules_hit(&p), vec!["answer_position_bias"]);
    }

    #[test]
    fn warning_display() {
        let w = LintWarning {
            rule: "sorting_unshuffled",
            path: "modules[1].challenges[0]".into(),
            message: "items are already in the target order".into(),
        };
        assert_eq!(
            w.to_string(),
            "[sorting_unshuffled] modules[1].challenges[0]: items are already in the target order"
        );
    }
}
