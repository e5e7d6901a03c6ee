//! Shared error vocabulary.
//!
//! Each downstream crate layers its own `thiserror` enum on top of these
//! (store I/O faults, broker faults, simulator faults); this module only
//! holds the pieces every layer needs to agree on: input validation errors
//! and the error-category prefix convention used on `FAILED` tasks.

use std::collections::HashMap;

use thiserror::Error;

/// A request failed input validation before it ever reached the store.
///
/// `fields` mirrors the `details: {field: msg}` shape of the HTTP 400
/// response (spec §6) so the HTTP layer can serialize it directly.
#[derive(Debug, Error)]
#[error("validation failed: {fields:?}")]
pub struct ValidationError {
    pub fields: HashMap<String, String>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = HashMap::new();
        fields.insert(field.into(), message.into());
        Self { fields }
    }
}

/// The category prefixed onto a classified worker failure (spec §4.3).
///
/// Rendered as `"{category}: {detail}"` via [`ErrorCategory::classify`],
/// matching the original implementation's
/// `"{category}: {exception_type}: {message}"` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input syntactically invalid.
    CircuitParse,
    /// Simulator backend reported a runtime fault (including OOM).
    Execution,
    /// Any other exception escaping the executor.
    Unexpected,
}

impl ErrorCategory {
    pub fn label(self) -> &'static str {
        match self {
            ErrorCategory::CircuitParse => "Circuit parse error",
            ErrorCategory::Execution => "Execution error",
            ErrorCategory::Unexpected => "Unexpected error",
        }
    }

    /// Build the classified error message stored on a `FAILED` task.
    pub fn classify(self, detail: impl std::fmt::Display) -> String {
        format!("{}: {}", self.label(), detail)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefixes_the_category() {
        assert_eq!(
            ErrorCategory::CircuitParse.classify("undefined gate `cx2`"),
            "Circuit parse error: undefined gate `cx2`"
        );
    }
}
