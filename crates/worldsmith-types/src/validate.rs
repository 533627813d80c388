//! Contract checks applied to every document crossing a stage boundary.
//!
//! Serde already rejects documents with missing or mistyped fields; the
//! [`Validate`] implementations cover the invariants serde cannot express
//! (counts, ranges, ordering, cross-field consistency).

use crate::{Result, WorldsmithError};

/// A document with invariants beyond its serde shape.
pub trait Validate {
    /// Name used in error messages (e.g. `"ContentPlan"`).
    const DOCUMENT: &'static str;

    /// Push every violated invariant into `errors`.
    fn check(&self, errors: &mut SchemaErrors);

    /// Run [`check`](Validate::check) and fail with a `SchemaViolation`
    /// listing every problem found.
    fn validate(&self) -> Result<()> {
        let mut errors = SchemaErrors::default();
        self.check(&mut errors);
        errors.into_result(Self::DOCUMENT)
    }
}

/// Accumulates invariant violations with the JSON path they occurred at.
#[derive(Debug, Default, Clone)]
pub struct SchemaErrors {
    entries: Vec<(String, String)>,
}

impl SchemaErrors {
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.entries.push((path.into(), message.into()));
    }

    /// Record a violation when `condition` is false.
    pub fn ensure(&mut self, condition: bool, path: impl Into<String>, message: impl Into<String>) {
        if !condition {
            self.push(path, message);
        }
    }

    /// Record a violation when `value` is empty or whitespace only.
    pub fn non_blank(&mut self, value: &str, path: impl Into<String>) {
        if value.trim().is_empty() {
            self.push(path, "must not be blank");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn into_result(self, document: &str) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let message = self
            .entries
            .iter()
            .map(|(path, msg)| format!("{path}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(WorldsmithError::SchemaViolation {
            document: document.to_string(),
            message,
        })
    }
}
