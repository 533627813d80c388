use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::modules::ModulePlan;
use crate::validate::{SchemaErrors, Validate};

/// Fieldless mirror of [`ChallengeKind`], used for ordering and widget lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeType {
    MultipleChoice,
    TrueFalse,
    FillBlank,
    Number,
    Sorting,
    Matching,
    Simulation,
    Game,
}

impl ChallengeType {
    pub const ALL: [ChallengeType; 8] = [
        ChallengeType::MultipleChoice,
        ChallengeType::TrueFalse,
        ChallengeType::FillBlank,
        ChallengeType::Number,
        ChallengeType::Sorting,
        ChallengeType::Matching,
        ChallengeType::Simulation,
        ChallengeType::Game,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::MultipleChoice => "multiple-choice",
            ChallengeType::TrueFalse => "true-false",
            ChallengeType::FillBlank => "fill-blank",
            ChallengeType::Number => "number",
            ChallengeType::Sorting => "sorting",
            ChallengeType::Matching => "matching",
            ChallengeType::Simulation => "simulation",
            ChallengeType::Game => "game",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

/// The type-specific answer payload of a challenge, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChallengeKind {
    MultipleChoice {
        options: Vec<String>,
        correct: usize,
    },
    TrueFalse {
        correct: bool,
    },
    FillBlank {
        correct: String,
        #[serde(default)]
        alternatives: Vec<String>,
    },
    Number {
        correct: f64,
        tolerance: f64,
        #[serde(default)]
        unit: Option<String>,
    },
    Sorting {
        items: Vec<String>,
        correct: Vec<String>,
    },
    Matching {
        pairs: Vec<MatchPair>,
    },
    Simulation {
        parameter: String,
        min: f64,
        max: f64,
        step: f64,
        target: f64,
        tolerance: f64,
        #[serde(default)]
        unit: Option<String>,
    },
    Game {
        mechanic: String,
        data: serde_json::Value,
        win_condition: String,
    },
}

impl ChallengeKind {
    pub fn challenge_type(&self) -> ChallengeType {
        match self {
            ChallengeKind::MultipleChoice { .. } => ChallengeType::MultipleChoice,
            ChallengeKind::TrueFalse { .. } => ChallengeType::TrueFalse,
            ChallengeKind::FillBlank { .. } => ChallengeType::FillBlank,
            ChallengeKind::Number { .. } => ChallengeType::Number,
            ChallengeKind::Sorting { .. } => ChallengeType::Sorting,
            ChallengeKind::Matching { .. } => ChallengeType::Matching,
            ChallengeKind::Simulation { .. } => ChallengeType::Simulation,
            ChallengeKind::Game { .. } => ChallengeType::Game,
        }
    }

    pub(crate) fn check(&self, path: &str, errors: &mut SchemaErrors) {
        match self {
            ChallengeKind::MultipleChoice { options, correct } => {
                errors.ensure(
                    (2..=6).contains(&options.len()),
                    format!("{path}.options"),
                    format!("expected 2..=6 options, got {}", options.len()),
                );
                errors.ensure(
                    *correct < options.len(),
                    format!("{path}.correct"),
                    format!("index {correct} out of range for {} options", options.len()),
                );
            }
            ChallengeKind::TrueFalse { .. } => {}
            ChallengeKind::FillBlank { correct, .. } => {
                errors.non_blank(correct, format!("{path}.correct"));
            }
            ChallengeKind::Number {
                correct, tolerance, ..
            } => {
                errors.ensure(correct.is_finite(), format!("{path}.correct"), "must be finite");
                errors.ensure(
                    tolerance.is_finite() && *tolerance >= 0.0,
                    format!("{path}.tolerance"),
                    "must be a non-negative number",
                );
            }
            ChallengeKind::Sorting { items, correct } => {
                errors.ensure(
                    items.len() >= 2,
                    format!("{path}.items"),
                    "at least two items required",
                );
                let mut a: Vec<&String> = items.iter().collect();
                let mut b: Vec<&String> = correct.iter().collect();
                a.sort();
                b.sort();
                errors.ensure(
                    a == b,
                    format!("{path}.correct"),
                    "must be a permutation of items",
                );
            }
            ChallengeKind::Matching { pairs } => {
                errors.ensure(
                    pairs.len() >= 2,
                    format!("{path}.pairs"),
                    "at least two pairs required",
                );
            }
            ChallengeKind::Simulation {
                parameter,
                min,
                max,
                step,
                target,
                tolerance,
                ..
            } => {
                errors.non_blank(parameter, format!("{path}.parameter"));
                errors.ensure(min < max, format!("{path}.min"), "min must be below max");
                errors.ensure(
                    *target >= *min && *target <= *max,
                    format!("{path}.target"),
                    format!("target {target} outside [{min}, {max}]"),
                );
                errors.ensure(*step > 0.0, format!("{path}.step"), "must be positive");
                errors.ensure(
                    tolerance.is_finite() && *tolerance >= 0.0,
                    format!("{path}.tolerance"),
                    "must be a non-negative number",
                );
            }
            ChallengeKind::Game {
                mechanic,
                data,
                win_condition,
            } => {
                errors.non_blank(mechanic, format!("{path}.mechanic"));
                errors.non_blank(win_condition, format!("{path}.winCondition"));
                check_game_items(data, path, errors);
            }
        }
    }
}

/// The game widget plays `data.items`: a non-empty list of
/// `{ "label": string, "good": bool }` with at least one good item.
fn check_game_items(data: &serde_json::Value, path: &str, errors: &mut SchemaErrors) {
    let items_path = format!("{path}.data.items");
    let Some(items) = data.get("items").and_then(|v| v.as_array()) else {
        errors.push(items_path, "expected an array of { label, good } items");
        return;
    };
    errors.ensure(!items.is_empty(), items_path.clone(), "at least one item required");
    let mut good = 0;
    for (i, item) in items.iter().enumerate() {
        let label = item.get("label").and_then(|v| v.as_str());
        errors.ensure(
            label.is_some_and(|l| !l.trim().is_empty()),
            format!("{items_path}[{i}].label"),
            "must be a non-empty string",
        );
        match item.get("good").and_then(|v| v.as_bool()) {
            Some(true) => good += 1,
            Some(false) => {}
            None => errors.push(format!("{items_path}[{i}].good"), "must be a boolean"),
        }
    }
    errors.ensure(
        items.is_empty() || good > 0,
        items_path,
        "at least one item must be good",
    );
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub success: String,
    pub failure: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub question: String,
    #[serde(flatten)]
    pub kind: ChallengeKind,
    /// Three-tier hint ladder, gentlest first.
    pub hints: [String; 3],
    pub feedback: Feedback,
}

impl Challenge {
    pub fn challenge_type(&self) -> ChallengeType {
        self.kind.challenge_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleContent {
    pub module_index: usize,
    pub title: String,
    pub challenges: Vec<Challenge>,
}

/// ContentArchitect output: the challenges of every module, boss last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPlan {
    pub modules: Vec<ModuleContent>,
}

impl ContentPlan {
    pub const MIN_CHALLENGES_PER_MODULE: usize = 3;
    pub const MAX_CONSECUTIVE_SAME_TYPE: usize = 2;

    pub fn challenges(&self) -> impl Iterator<Item = &Challenge> {
        self.modules.iter().flat_map(|m| m.challenges.iter())
    }

    pub fn challenge_count(&self) -> usize {
        self.modules.iter().map(|m| m.challenges.len()).sum()
    }

    /// Cross-check against the module structure it was generated for: one
    /// content module per planned module plus one for the boss.
    pub fn check_against(&self, plan: &ModulePlan, errors: &mut SchemaErrors) {
        let expected = plan.modules.len() + 1;
        errors.ensure(
            self.modules.len() == expected,
            "$.modules",
            format!(
                "expected {expected} modules (including boss), got {}",
                self.modules.len()
            ),
        );
    }
}

/// Length of the longest run of identical challenge types.
fn longest_type_run(challenges: &[Challenge]) -> (usize, Option<ChallengeType>) {
    let mut best = (0, None);
    let mut run = 0;
    let mut prev: Option<ChallengeType> = None;
    for c in challenges {
        let t = c.challenge_type();
        run = if prev == Some(t) { run + 1 } else { 1 };
        prev = Some(t);
        if run > best.0 {
            best = (run, Some(t));
        }
    }
    best
}

impl Validate for ContentPlan {
    const DOCUMENT: &'static str = "ContentPlan";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.ensure(!self.modules.is_empty(), "$.modules", "no modules");
        let mut ids = HashSet::new();

        for (m, module) in self.modules.iter().enumerate() {
            let mpath = format!("$.modules[{m}]");
            errors.ensure(
                module.module_index == m,
                format!("{mpath}.moduleIndex"),
                format!("expected {m}, got {}", module.module_index),
            );
            errors.ensure(
                module.challenges.len() >= Self::MIN_CHALLENGES_PER_MODULE,
                format!("{mpath}.challenges"),
                format!(
                    "at least {} challenges required, got {}",
                    Self::MIN_CHALLENGES_PER_MODULE,
                    module.challenges.len()
                ),
            );
            let (run, ty) = longest_type_run(&module.challenges);
            if run > Self::MAX_CONSECUTIVE_SAME_TYPE {
                errors.push(
                    format!("{mpath}.challenges"),
                    format!(
                        "type '{}' repeats {run} times in a row",
                        ty.map(|t| t.as_str()).unwrap_or_default()
                    ),
                );
            }

            for (c, challenge) in module.challenges.iter().enumerate() {
                let cpath = format!("{mpath}.challenges[{c}]");
                errors.non_blank(&challenge.id, format!("{cpath}.id"));
                errors.ensure(
                    ids.insert(challenge.id.as_str()),
                    format!("{cpath}.id"),
                    format!("duplicate challenge id '{}'", challenge.id),
                );
                errors.non_blank(&challenge.question, format!("{cpath}.question"));
                for (h, hint) in challenge.hints.iter().enumerate() {
                    errors.non_blank(hint, format!("{cpath}.hints[{h}]"));
                }
                challenge.kind.check(&cpath, errors);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "question": "Frage?",
            "hints": ["Tipp 1", "Tipp 2", "Tipp 3"],
            "feedback": { "success": "Super!", "failure": "Versuch es nochmal." }
        })
    }

    fn challenge(id: &str, payload: serde_json::Value) -> serde_json::Value {
        let mut v = base(id);
        for (k, val) in payload.as_object().unwrap() {
            v[k] = val.clone();
        }
        v
    }

    fn mc(id: &str) -> serde_json::Value {
        challenge(id, json!({ "type": "multiple-choice", "options": ["a", "b", "c"], "correct": 1 }))
    }

    fn tf(id: &str) -> serde_json::Value {
        challenge(id, json!({ "type": "true-false", "correct": true }))
    }

    fn sim(id: &str, target: f64) -> serde_json::Value {
        challenge(
            id,
            json!({
                "type": "simulation", "parameter": "Licht", "min": 0.0, "max": 100.0,
                "step": 5.0, "target": target, "tolerance": 5.0, "unit": "%"
            }),
        )
    }

    fn plan(challenges: Vec<serde_json::Value>) -> ContentPlan {
        serde_json::from_value(json!({
            "modules": [{ "moduleIndex": 0, "title": "Licht", "challenges": challenges }]
        }))
        .unwrap()
    }

    #[test]
    fn every_type_parses() {
        let plan = plan(vec![
            mc("c1"),
            tf("c2"),
            challenge("c3", json!({ "type": "fill-blank", "correct": "Chlorophyll", "alternatives": ["Blattgrün"] })),
            challenge("c4", json!({ "type": "number", "correct": 6.0, "tolerance": 0.0 })),
            challenge("c5", json!({ "type": "sorting", "items": ["b", "a"], "correct": ["a", "b"] })),
            challenge("c6", json!({ "type": "matching", "pairs": [{"left": "CO2", "right": "Gas"}, {"left": "H2O", "right": "Wasser"}] })),
            sim("c7", 50.0),
            challenge("c8", json!({ "type": "game", "mechanic": "catch", "data": {"items": [{"label": "Tropfen", "good": true}, {"label": "Stein", "good": false}]}, "winCondition": "5 Tropfen" })),
        ]);
        let types: Vec<_> = plan.challenges().map(|c| c.challenge_type()).collect();
        assert_eq!(types, ChallengeType::ALL.to_vec());
        assert!(plan.validate().is_ok(), "{:?}", plan.validate());
    }

    #[test]
    fn serializes_type_tag_flat() {
        let plan = plan(vec![mc("c1"), tf("c2"), mc("c3")]);
        let json = serde_json::to_value(&plan.modules[0].challenges[0]).unwrap();
        assert_eq!(json["type"], "multiple-choice");
        assert_eq!(json["correct"], 1);
        assert_eq!(json["hints"][2], "Tipp 3");
    }

    #[test]
    fn unknown_type_is_parse_error() {
        let bad = json!({
            "modules": [{ "moduleIndex": 0, "title": "x",
                "challenges": [challenge("c1", json!({ "type": "essay", "correct": "x" }))] }]
        });
        assert!(serde_json::from_value::<ContentPlan>(bad).is_err());
    }

    #[test]
    fn missing_answer_field_is_parse_error() {
        let bad = json!({
            "modules": [{ "moduleIndex": 0, "title": "x",
                "challenges": [challenge("c1", json!({ "type": "multiple-choice", "options": ["a", "b"] }))] }]
        });
        assert!(serde_json::from_value::<ContentPlan>(bad).is_err());
    }

    #[test]
    fn two_hints_is_parse_error() {
        let mut c = mc("c1");
        c["hints"] = json!(["a", "b"]);
        let bad = json!({ "modules": [{ "moduleIndex": 0, "title": "x", "challenges": [c] }] });
        assert!(serde_json::from_value::<ContentPlan>(bad).is_err());
    }

    #[test]
    fn fewer_than_three_challenges_rejected() {
        let err = plan(vec![mc("c1"), tf("c2")]).validate().unwrap_err();
        assert!(err.to_string().contains("at least 3 challenges"));
    }

    #[test]
    fn three_consecutive_same_type_rejected() {
        let err = plan(vec![mc("c1"), mc("c2"), mc("c3")]).validate().unwrap_err();
        assert!(err.to_string().contains("repeats 3 times"));
    }

    #[test]
    fn two_consecutive_same_type_allowed() {
        assert!(plan(vec![mc("c1"), mc("c2"), tf("c3"), mc("c4")]).validate().is_ok());
    }

    #[test]
    fn simulation_target_outside_range_rejected() {
        let err = plan(vec![mc("c1"), tf("c2"), sim("c3", 120.0)]).validate().unwrap_err();
        assert!(err.to_string().contains("target 120 outside [0, 100]"));
    }

    #[test]
    fn simulation_target_on_bounds_allowed() {
        assert!(plan(vec![sim("c1", 0.0), tf("c2"), sim("c3", 100.0)]).validate().is_ok());
    }

    #[test]
    fn multiple_choice_index_out_of_range_rejected() {
        let bad = challenge("c1", json!({ "type": "multiple-choice", "options": ["a", "b"], "correct": 2 }));
        assert!(plan(vec![bad, tf("c2"), mc("c3")]).validate().is_err());
    }

    #[test]
    fn sorting_must_be_permutation() {
        let bad = challenge("c1", json!({ "type": "sorting", "items": ["a", "b"], "correct": ["a", "c"] }));
        assert!(plan(vec![bad, tf("c2"), mc("c3")]).validate().is_err());
    }

    fn game(data: serde_json::Value) -> serde_json::Value {
        challenge(
            "c1",
            json!({ "type": "game", "mechanic": "catch", "data": data, "winCondition": "Alles fangen" }),
        )
    }

    #[test]
    fn game_without_items_rejected() {
        let err = plan(vec![game(json!({"speed": 2, "targets": 5})), tf("c2"), mc("c3")])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("data.items"), "{err}");
    }

    #[test]
    fn game_with_empty_items_rejected() {
        let err = plan(vec![game(json!({"items": []})), tf("c2"), mc("c3")])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("at least one item required"), "{err}");
    }

    #[test]
    fn game_items_need_label_and_good() {
        let data = json!({"items": [{"label": "Wasser"}, {"good": true}]});
        let err = plan(vec![game(data), tf("c2"), mc("c3")]).validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("items[0].good"), "{text}");
        assert!(text.contains("items[1].label"), "{text}");
    }

    #[test]
    fn game_needs_a_good_item() {
        let data = json!({"items": [{"label": "Sand", "good": false}]});
        let err = plan(vec![game(data), tf("c2"), mc("c3")]).validate().unwrap_err();
        assert!(err.to_string().contains("at least one item must be good"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        assert!(plan(vec![mc("c1"), tf("c1"), mc("c3")]).validate().is_err());
    }

    #[test]
    fn wrong_module_index_rejected() {
        let mut p = plan(vec![mc("c1"), tf("c2"), mc("c3")]);
        p.modules[0].module_index = 3;
        assert!(p.validate().is_err());
    }

    #[test]
    fn longest_run_counts() {
        let p = plan(vec![mc("c1"), tf("c2"), tf("c3"), mc("c4")]);
        assert_eq!(
            longest_type_run(&p.modules[0].challenges),
            (2, Some(ChallengeType::TrueFalse))
        );
    }
}
