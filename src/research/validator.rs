//! Pure predicates over pipeline artifacts.

use serde_json::Value;

use super::types::{AspectResult, AspectStatus};

/// Partition of a batch of analysis results.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsValidation {
    /// Completed results with confidence above 0.5, in input order.
    pub valid_results: Vec<AspectResult>,
    pub has_errors: bool,
    pub is_valid: bool,
}

/// A plan is usable iff it has at least one aspect.
pub fn validate_subagents(subagents: Option<&[String]>) -> bool {
    subagents.is_some_and(|s| !s.is_empty())
}

pub fn validate_results(results: &[AspectResult]) -> ResultsValidation {
    let valid_results: Vec<AspectResult> =
        results.iter().filter(|r| r.is_usable()).cloned().collect();
    let has_errors = results.iter().any(|r| r.status == AspectStatus::Error);
    ResultsValidation {
        is_valid: !valid_results.is_empty(),
        valid_results,
        has_errors,
    }
}

/// A synthesis needs a truthy `summary` and a non-empty
/// `clinicalRecommendations` array.
pub fn validate_synthesis(synthesis: &Value) -> bool {
    let summary_ok = synthesis.get("summary").is_some_and(is_truthy);
    let recommendations_ok = synthesis
        .get("clinicalRecommendations")
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty());
    summary_ok && recommendations_ok
}

/// JSON truthiness: null, false, 0 and "" are falsy; containers are truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Run the three checks in order; the first failure is returned as a
/// human-readable reason.
pub fn can_generate_report(
    subagents: Option<&[String]>,
    results: &[AspectResult],
    synthesis: &Value,
) -> Result<(), String> {
    if !validate_subagents(subagents) {
        return Err("no aspects produced".to_string());
    }
    if !validate_results(results).is_valid {
        return Err("no valid results to synthesize".to_string());
    }
    if !validate_synthesis(synthesis) {
        return Err("synthesis is missing a summary or clinical recommendations".to_string());
    }
    Ok(())
}
