//! Submission input validation (spec §4.4 step 1).

use crate::error::ValidationError;
use crate::task::{Counts, DEFAULT_SHOTS, MAX_SHOTS, MIN_SHOTS};

/// Validate and normalize a submission's `circuit` and optional `shots`.
///
/// Returns `(circuit, shots)` on success, or a [`ValidationError`] whose
/// `fields` map names every field that failed — the HTTP layer serializes
/// this verbatim into the `400` response's `details` object.
pub fn validate_submission(circuit: &str, shots: Option<i32>) -> Result<(String, i32), ValidationError> {
    let mut fields = std::collections::HashMap::new();

    if circuit.trim().is_empty() {
        fields.insert("circuit".to_string(), "field required, must be nonempty".to_string());
    }

    let shots = shots.unwrap_or(DEFAULT_SHOTS);
    if !(MIN_SHOTS..=MAX_SHOTS).contains(&shots) {
        fields.insert(
            "shots".to_string(),
            format!("must be between {MIN_SHOTS} and {MAX_SHOTS}, got {shots}"),
        );
    }

    if fields.is_empty() {
        Ok((circuit.to_string(), shots))
    } else {
        Err(ValidationError { fields })
    }
}

/// Validate a simulator's measurement counts before it is committed to a
/// task (spec §4.5 "Counts validation"): keys must be nonempty bitstrings
/// over `{'0','1'}`; an empty map is permitted.
pub fn validate_counts(counts: &Counts) -> Result<(), String> {
    for key in counts.keys() {
        if key.is_empty() || !key.chars().all(|c| c == '0' || c == '1') {
            return Err(format!("count key must be a nonempty bitstring, got {key:?}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_circuit() {
        let err = validate_submission("", None).unwrap_err();
        assert!(err.fields.contains_key("circuit"));
    }

    #[test]
    fn rejects_whitespace_only_circuit() {
        let err = validate_submission("   ", None).unwrap_err();
        assert!(err.fields.contains_key("circuit"));
    }

    #[test]
    fn defaults_shots_to_1024() {
        let (_, shots) = validate_submission("OPENQASM 3; qubit q;", None).unwrap();
        assert_eq!(shots, 1024);
    }

    #[test]
    fn rejects_shots_out_of_bounds() {
        assert!(validate_submission("x", Some(0)).is_err());
        assert!(validate_submission("x", Some(100_001)).is_err());
        assert!(validate_submission("x", Some(1)).is_ok());
        assert!(validate_submission("x", Some(100_000)).is_ok());
    }

    #[test]
    fn reports_both_invalid_fields_at_once() {
        let err = validate_submission("", Some(-1)).unwrap_err();
        assert_eq!(err.fields.len(), 2);
    }

    #[test]
    fn counts_validation_accepts_empty_map() {
        assert!(validate_counts(&Counts::new()).is_ok());
    }

    #[test]
    fn counts_validation_rejects_non_bitstring_key() {
        let mut c = Counts::new();
        c.insert("0x1".to_string(), 5);
        assert!(validate_counts(&c).is_err());
    }
}
