//! Pure per-domain scoring functions and the engines that assemble them into verdicts.
//!
//! Every extractor returns a [`Signal`]: the raw contribution plus the factor describing it
//! when the signal fired. Nothing in here performs I/O, so the rule path always fits inside
//! the synchronous latency budget.

pub mod fraud;
pub mod matching;
pub mod profile;
pub mod scope;
pub mod verification;

use serde_json::Value;

use super::domain::Factor;

/// Contribution of one extractor and the factor explaining it, if any.
pub type Signal = (f64, Option<Factor>);

pub(crate) fn silent() -> Signal {
    (0.0, None)
}

pub(crate) fn fired(factor: Factor) -> Signal {
    (factor.contribution, Some(factor))
}

/// Request rejected before it reaches the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field, "must not be empty"))
    } else {
        Ok(())
    }
}

/// Evidence counts as present when it is truthy: `true`, a non-empty string or collection, or
/// a non-zero number.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().map_or(false, |n| n != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}

/// Reads an `f64` out of an analyzer payload.
pub(crate) fn number_field(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(Value::as_f64)
}

/// Parses factor entries (`{factor, contribution, description}`) out of an analyzer payload,
/// skipping entries that do not carry a name.
pub(crate) fn factors_field(payload: &Value, key: &str) -> Vec<Factor> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let name = entry.get("factor").and_then(Value::as_str)?;
                    let contribution = entry
                        .get("contribution")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    let description = entry
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    Some(Factor::new(name, contribution, description))
                })
                .collect()
        })
        .unwrap_or_default()
}
