use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::validate::{SchemaErrors, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Factual,
    Answer,
    Pedagogical,
    Narrative,
    Technical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalError {
    /// Path into the ContentPlan, e.g. `modules[0].challenges[2].correct`.
    pub path: String,
    pub category: ErrorCategory,
    pub description: String,
    pub suggested_fix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFallback {
    pub risk: String,
    pub fallback: String,
}

/// QualityGate output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub overall_score: u8,
    pub critical_errors: Vec<CriticalError>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Path to replacement value, applied onto the ContentPlan.
    #[serde(default)]
    pub corrected_content: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub risks: Vec<RiskFallback>,
}

impl QualityReport {
    /// Critical errors whose path no entry of `corrected_content` addresses.
    pub fn uncovered_errors(&self) -> Vec<&CriticalError> {
        self.critical_errors
            .iter()
            .filter(|e| {
                let target = normalize_path(&e.path);
                !self
                    .corrected_content
                    .keys()
                    .any(|k| covers(normalize_path(k), target))
            })
            .collect()
    }
}

/// Strip the optional `$.` / `content.` prefixes a model may put on a path.
pub fn normalize_path(path: &str) -> &str {
    let path = path.trim();
    let path = path.strip_prefix("$.").unwrap_or(path);
    path.strip_prefix("content.").unwrap_or(path)
}

/// Whether an override at `fix` replaces the value at `error` or one of its
/// ancestors.
fn covers(fix: &str, error: &str) -> bool {
    error == fix
        || error
            .strip_prefix(fix)
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
}

impl Validate for QualityReport {
    const DOCUMENT: &'static str = "QualityReport";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.ensure(
            self.overall_score <= 100,
            "$.overallScore",
            format!("{} outside 0..=100", self.overall_score),
        );
        for (i, e) in self.critical_errors.iter().enumerate() {
            errors.non_blank(&e.path, format!("$.criticalErrors[{i}].path"));
            errors.non_blank(&e.description, format!("$.criticalErrors[{i}].description"));
        }
        for key in self.corrected_content.keys() {
            errors.non_blank(key, "$.correctedContent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(errors: serde_json::Value, corrected: serde_json::Value) -> QualityReport {
        serde_json::from_value(json!({
            "overallScore": 82,
            "criticalErrors": errors,
            "warnings": ["Modul 2 ist lang"],
            "correctedContent": corrected,
            "risks": [{ "risk": "Begriff zu schwer", "fallback": "Glossar zeigen" }]
        }))
        .unwrap()
    }

    fn error(path: &str) -> serde_json::Value {
        json!({
            "path": path,
            "category": "answer",
            "description": "Falsche Antwort markiert",
            "suggestedFix": "Index 2 statt 1"
        })
    }

    #[test]
    fn parses_and_validates() {
        let r = report(json!([error("modules[0].challenges[1].correct")]), json!({}));
        assert_eq!(r.critical_errors[0].category, ErrorCategory::Answer);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn score_above_hundred_rejected() {
        let mut r = report(json!([]), json!({}));
        r.overall_score = 101;
        assert!(r.validate().is_err());
    }

    #[test]
    fn normalize_strips_prefixes() {
        assert_eq!(normalize_path("$.modules[0]"), "modules[0]");
        assert_eq!(normalize_path("content.modules[0]"), "modules[0]");
        assert_eq!(normalize_path("$.content.modules[0]"), "modules[0]");
    }

    #[test]
    fn exact_and_ancestor_overrides_cover_errors() {
        let r = report(
            json!([
                error("modules[0].challenges[1].correct"),
                error("modules[1].challenges[0].question"),
                error("modules[2].challenges[0].hints[0]")
            ]),
            json!({
                "$.modules[0].challenges[1].correct": 2,
                "content.modules[1].challenges[0]": { "id": "x" }
            }),
        );
        let uncovered = r.uncovered_errors();
        assert_eq!(uncovered.len(), 1);
        assert_eq!(uncovered[0].path, "modules[2].challenges[0].hints[0]");
    }

    #[test]
    fn sibling_index_does_not_cover() {
        assert!(!covers("modules[1]", "modules[10].title"));
        assert!(covers("modules[1]", "modules[1].title"));
    }
}
