use serde::{Deserialize, Serialize};

use crate::validate::{SchemaErrors, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRange {
    pub min: u8,
    pub max: u8,
}

/// Interpreter output: what the lesson should teach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpretedBrief {
    pub topic_summary: String,
    pub subject: String,
    pub grade_range: GradeRange,
    pub learning_goals: Vec<String>,
    pub key_vocabulary: Vec<String>,
    pub difficulty: Difficulty,
    pub common_mistakes: Vec<String>,
}

impl InterpretedBrief {
    pub const MIN_GOALS: usize = 3;
    pub const MAX_GOALS: usize = 8;
}

impl Validate for InterpretedBrief {
    const DOCUMENT: &'static str = "InterpretedBrief";

    fn check(&self, errors: &mut SchemaErrors) {
        errors.non_blank(&self.topic_summary, "$.topicSummary");
        errors.non_blank(&self.subject, "$.subject");
        errors.ensure(
            (Self::MIN_GOALS..=Self::MAX_GOALS).contains(&self.learning_goals.len()),
            "$.learningGoals",
            format!(
                "expected {}..={} goals, got {}",
                Self::MIN_GOALS,
                Self::MAX_GOALS,
                self.learning_goals.len()
            ),
        );
        for (i, goal) in self.learning_goals.iter().enumerate() {
            errors.non_blank(goal, format!("$.learningGoals[{i}]"));
        }
        let GradeRange { min, max } = self.grade_range;
        errors.ensure(
            (1..=13).contains(&min) && (1..=13).contains(&max) && min <= max,
            "$.gradeRange",
            format!("invalid grade range {min}..{max}"),
        );
    }
}
