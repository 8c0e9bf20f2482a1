//! Request-body validation.
//!
//! Handlers collect every problem with a [`Validator`] and turn the result
//! into either a single-issue response (`{error, field}`) or a full issue
//! list (`{message, errors}`), depending on the endpoint.

use serde::Serialize;

/// One failed check on one request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// Dotted field path, e.g. `span.startOffset`.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed: {} issue(s)", issues.len())]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// The first issue ordered by field path, so the reported field does not
    /// depend on check order.
    #[must_use]
    pub fn first(&self) -> Option<&FieldIssue> {
        self.issues
            .iter()
            .min_by(|a, b| a.path.to_lowercase().cmp(&b.path.to_lowercase()))
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    issues: Vec<FieldIssue>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` against `path` unless `ok`.
    pub fn check(&mut self, ok: bool, path: &str, message: &str) -> &mut Self {
        if !ok {
            self.issues.push(FieldIssue { path: path.to_owned(), message: message.to_owned() });
        }
        self
    }

    /// Require at least `min` characters. A missing value fails.
    pub fn min_chars(&mut self, path: &str, value: Option<&str>, min: usize, message: &str) -> &mut Self {
        let ok = value.is_some_and(|v| v.chars().count() >= min);
        self.check(ok, path, message)
    }

    /// Require a present, non-blank value.
    pub fn required(&mut self, path: &str, value: Option<&str>, message: &str) -> &mut Self {
        let ok = value.is_some_and(|v| !v.trim().is_empty());
        self.check(ok, path, message)
    }

    /// Reject values longer than `max` characters. A missing value passes.
    pub fn max_chars(&mut self, path: &str, value: Option<&str>, max: usize, message: &str) -> &mut Self {
        let ok = value.is_none_or(|v| v.chars().count() <= max);
        self.check(ok, path, message)
    }

    /// # Errors
    ///
    /// Returns every recorded issue when at least one check failed.
    pub fn finish(&mut self) -> Result<(), ValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues: std::mem::take(&mut self.issues) })
        }
    }
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
