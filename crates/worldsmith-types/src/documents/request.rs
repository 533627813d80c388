use serde::{Deserialize, Serialize};

use crate::validate::{SchemaErrors, Validate};

/// What the caller asked for. Created once at pipeline start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub topic: String,
    #[serde(default)]
    pub grade_level: Option<u8>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub style_hint: Option<String>,
}

impl RequestDescriptor {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            grade_level: None,
            subject: None,
            style_hint: None,
        }
    }

    pub fn with_grade_level(mut self, grade: u8) -> Self {
        self.grade_level = Some(grade);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_style_hint(mut self, hint: impl Into<String>) -> Self {
        self.style_hint = Some(hint.into());
        self
    }

    /// The explicitly requested subject, ignoring blank strings.
    pub fn explicit_subject(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl Validate for RequestDescriptor {
    const DOCUMENT: &'static str = "RequestDescriptor";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.non_blank(&self.topic, "$.topic");
        if let Some(grade) = self.grade_level {
            errors.ensure((1..=13).contains(&grade), "$.gradeLevel", "must be between 1 and 13");
        }
    }
}
