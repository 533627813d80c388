//! Applying QualityGate `correctedContent` overrides to a content plan.
//!
//! Paths look like `modules[0].challenges[2].correct`, optionally prefixed
//! with `$.` or `content.`. The plan is never edited in place: a successful
//! merge yields the next [`Versioned`] revision.

use serde_json::Value;
use worldsmith_types::{
    normalize_path, ContentPlan, ModulePlan, QualityReport, Result, SchemaErrors, Validate,
    VersionOrigin, Versioned, WorldsmithError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Split a correction path into object keys and array indices.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let invalid = |why: &str| WorldsmithError::Other(format!("invalid path '{path}': {why}"));
    let body = normalize_path(path);
    if body.is_empty() {
        return Err(invalid("empty"));
    }

    let mut segments = Vec::new();
    for part in body.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(i) => part.split_at(i),
            None => (part, ""),
        };
        if key.is_empty() && segments.is_empty() {
            return Err(invalid("missing leading key"));
        }
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(|| invalid("unclosed '['"))?;
            let index = rest[1..close]
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid("index is not a number"))?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid("unexpected text after ']'"));
            }
        }
    }
    Ok(segments)
}

/// Replace the value at `path` inside `root`.
///
/// Every array index and every parent object must already exist; the last
/// key may be new. Returns `false` when the path does not resolve.
pub fn apply_override(root: &mut Value, path: &[PathSegment], value: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };
    let mut node = root;
    for segment in parents {
        node = match (segment, node) {
            (PathSegment::Key(k), Value::Object(map)) => match map.get_mut(k) {
                Some(child) => child,
                None => return false,
            },
            (PathSegment::Index(i), Value::Array(items)) => match items.get_mut(*i) {
                Some(child) => child,
                None => return false,
            },
            _ => return false,
        };
    }
    match (last, node) {
        (PathSegment::Key(k), Value::Object(map)) => {
            map.insert(k.clone(), value);
            true
        }
        (PathSegment::Index(i), Value::Array(items)) => match items.get_mut(*i) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// Result of merging a quality report into the content plan.
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    /// The current content: a new version when corrections applied cleanly,
    /// otherwise the input version unchanged.
    pub content: Versioned<ContentPlan>,
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    /// Why a patched plan was discarded, if it was.
    pub rejected: Option<String>,
}

impl CorrectionOutcome {
    pub fn revised(&self) -> bool {
        !self.applied.is_empty() && self.rejected.is_none()
    }
}

/// Apply every override in `report` onto `content` and re-validate.
pub fn apply_corrections(
    content: &Versioned<ContentPlan>,
    report: &QualityReport,
    plan: &ModulePlan,
) -> Result<CorrectionOutcome> {
    let unchanged = |applied, skipped, rejected| CorrectionOutcome {
        content: content.clone(),
        applied,
        skipped,
        rejected,
    };

    if report.corrected_content.is_empty() {
        return Ok(unchanged(Vec::new(), Vec::new(), None));
    }

    let mut doc = serde_json::to_value(&content.document)?;
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for (path, value) in &report.corrected_content {
        let resolved = parse_path(path)
            .map(|segments| apply_override(&mut doc, &segments, value.clone()))
            .unwrap_or(false);
        if resolved {
            applied.push(path.clone());
        } else {
            tracing::warn!(path = %path, "correction path does not resolve, skipped");
            skipped.push(path.clone());
        }
    }

    if applied.is_empty() {
        return Ok(unchanged(applied, skipped, None));
    }

    let patched = serde_json::from_value::<ContentPlan>(doc)
        .map_err(WorldsmithError::from)
        .and_then(|patched| {
            let mut errors = SchemaErrors::default();
            patched.check(&mut errors);
            patched.check_against(plan, &mut errors);
            errors.into_result(ContentPlan::DOCUMENT)?;
            Ok(patched)
        });

    match patched {
        Ok(patched) => {
            let revised = content.revise(patched, VersionOrigin::QualityGate);
            tracing::info!(
                version = revised.version,
                applied = applied.len(),
                skipped = skipped.len(),
                "content corrected"
            );
            Ok(CorrectionOutcome {
                content: revised,
                applied,
                skipped,
                rejected: None,
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "corrected content is invalid, keeping previous version");
            Ok(unchanged(applied, skipped, Some(e.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use worldsmith_types::ChallengeKind;

    fn challenge(id: &str, ty: &str) -> Value {
        let mut c = json!({
            "id": id,
            "question": "Frage?",
            "hints": ["a", "b", "c"],
            "feedback": { "success": "Gut", "failure": "Nochmal" }
        });
        let payload = match ty {
            "true-false" => json!({ "type": "true-false", "correct": true }),
            _ => json!({
                "type": "multiple-choice",
                "options": ["Licht", "Erde", "Wind"],
                "correct": 0
            }),
        };
        for (k, v) in payload.as_object().unwrap() {
            c[k] = v.clone();
        }
        c
    }

    fn content() -> Versioned<ContentPlan> {
        let modules: Vec<Value> = (0..4)
            .map(|m| {
                json!({
                    "moduleIndex": m,
                    "title": format!("Modul {m}"),
                    "challenges": [
                        challenge(&format!("m{m}-a"), "multiple-choice"),
                        challenge(&format!("m{m}-b"), "true-false"),
                        challenge(&format!("m{m}-c"), "multiple-choice"),
                    ]
                })
            })
            .collect();
        Versioned::initial(serde_json::from_value(json!({ "modules": modules })).unwrap())
    }

    fn plan() -> ModulePlan {
        let module = |title: &str| {
            json!({
                "title": title,
                "learningFocus": "Fokus",
                "gameplay": "Spiel",
                "interaction": "click",
                "difficulty": "easy",
                "uniqueElement": "Nichts"
            })
        };
        serde_json::from_value(json!({
            "modules": [module("A"), module("B"), module("C")],
            "boss": module("Boss"),
            "progressionRationale": "aufsteigend"
        }))
        .unwrap()
    }

    fn report(corrections: Value) -> QualityReport {
        serde_json::from_value(json!({
            "overallScore": 70,
            "criticalErrors": [],
            "correctedContent": corrections
        }))
        .unwrap()
    }

    #[test]
    fn parses_paths() {
        use PathSegment::*;
        assert_eq!(
            parse_path("modules[0].challenges[2].correct").unwrap(),
            vec![
                Key("modules".into()),
                Index(0),
                Key("challenges".into()),
                Index(2),
                Key("correct".into())
            ]
        );
        assert_eq!(
            parse_path("$.content.modules[1].title").unwrap(),
            vec![Key("modules".into()), Index(1), Key("title".into())]
        );
        assert_eq!(
            parse_path("modules[0].challenges[1].options[2]").unwrap().last(),
            Some(&Index(2))
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(parse_path("").is_err());
        assert!(parse_path("$.").is_err());
        assert!(parse_path("modules[x]").is_err());
        assert!(parse_path("modules[0").is_err());
        assert!(parse_path("modules[0]x.title").is_err());
        assert!(parse_path("[0].title").is_err());
    }

    #[test]
    fn override_requires_existing_parents() {
        let mut doc = json!({ "modules": [{ "title": "A" }] });
        let path = parse_path("modules[0].title").unwrap();
        assert!(apply_override(&mut doc, &path, json!("B")));
        assert_eq!(doc["modules"][0]["title"], "B");

        let missing = parse_path("modules[3].title").unwrap();
        assert!(!apply_override(&mut doc, &missing, json!("C")));
        let wrong_shape = parse_path("modules.title").unwrap();
        assert!(!apply_override(&mut doc, &wrong_shape, json!("C")));
    }

    #[test]
    fn applies_corrections_as_new_version() {
        let original = content();
        let outcome = apply_corrections(
            &original,
            &report(json!({
                "modules[0].challenges[2].correct": 2,
                "$.modules[1].title": "Neuer Titel"
            })),
            &plan(),
        )
        .unwrap();

        assert!(outcome.revised());
        assert_eq!(outcome.content.version, 2);
        assert_eq!(outcome.content.origin, VersionOrigin::QualityGate);
        assert_eq!(outcome.content.document.modules[1].title, "Neuer Titel");
        match &outcome.content.document.modules[0].challenges[2].kind {
            ChallengeKind::MultipleChoice { correct, .. } => assert_eq!(*correct, 2),
            other => panic!("unexpected {other:?}"),
        }
        // Input version is untouched.
        assert_eq!(original.version, 1);
        assert_eq!(original.document.modules[1].title, "Modul 1");
    }

    #[test]
    fn unresolved_paths_are_skipped() {
        let outcome = apply_corrections(
            &content(),
            &report(json!({
                "modules[9].challenges[0].correct": 1,
                "modules[0].title": "Start"
            })),
            &plan(),
        )
        .unwrap();
        assert_eq!(outcome.applied, vec!["modules[0].title"]);
        assert_eq!(outcome.skipped, vec!["modules[9].challenges[0].correct"]);
        assert_eq!(outcome.content.version, 2);
    }

    #[test]
    fn invalid_patch_keeps_previous_version() {
        let outcome = apply_corrections(
            &content(),
            &report(json!({ "modules[0].challenges[0].correct": 7 })),
            &plan(),
        )
        .unwrap();
        assert!(!outcome.revised());
        assert!(outcome.rejected.is_some());
        assert_eq!(outcome.content.version, 1);
    }

    #[test]
    fn no_corrections_keeps_version() {
        let outcome = apply_corrections(&content(), &report(json!({})), &plan()).unwrap();
        assert!(!outcome.revised());
        assert_eq!(outcome.content.version, 1);
        assert!(outcome.applied.is_empty());
    }
}
