//! Condition evaluation over decoded JSON payloads.
//!
//! A tiny evaluator for numeric predicates on dotted paths; enough for IoT
//! telemetry without growing an expression language.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionError {
    /// A non-terminal segment resolved to something other than an object.
    NotAnObject(String),
    /// A segment is absent.
    NotFound(String),
    /// The terminal value is not a JSON number.
    NotANumber(String),
}

impl std::fmt::Display for ConditionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionError::NotAnObject(segment) => {
                write!(f, "field '{}' is not an object", segment)
            }
            ConditionError::NotFound(segment) => write!(f, "field '{}' not found", segment),
            ConditionError::NotANumber(path) => write!(f, "field '{}' is not a number", path),
        }
    }
}

impl std::error::Error for ConditionError {}

/// Resolves a dotted path like `result.temperature` against a JSON object
/// and coerces the terminal value to a number.
pub fn get_field(data: &Map<String, Value>, field: &str) -> Result<f64, ConditionError> {
    let mut current: Option<&Value> = None;

    for segment in field.split('.') {
        let object = match current {
            None => data,
            Some(value) => value
                .as_object()
                .ok_or_else(|| ConditionError::NotAnObject(segment.to_string()))?,
        };
        current = Some(
            object
                .get(segment)
                .ok_or_else(|| ConditionError::NotFound(segment.to_string()))?,
        );
    }

    match current {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ConditionError::NotANumber(field.to_string())),
        _ => Err(ConditionError::NotANumber(field.to_string())),
    }
}

/// The six comparison operators. Anything else is false; validation rejects
/// unknown operators before a definition is ever stored.
pub fn apply_operator(value: f64, operator: &str, threshold: f64) -> bool {
    match operator {
        ">" => value > threshold,
        "<" => value < threshold,
        ">=" => value >= threshold,
        "<=" => value <= threshold,
        "==" => value == threshold,
        "!=" => value != threshold,
        _ => false,
    }
}

/// Combines per-trigger results. No triggers means nothing to disprove.
pub fn combine(results: &[bool], logic: &str) -> bool {
    if results.is_empty() {
        return true;
    }

    if logic == "or" {
        return results.iter().any(|r| *r);
    }

    results.iter().all(|r| *r)
}
