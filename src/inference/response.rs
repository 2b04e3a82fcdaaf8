//! Model output handling: fence stripping, JSON-or-text parsing and the
//! heuristic confidence score.
//!
//! Model text is either a JSON document (planning, synthesis) or free-text
//! Markdown (analysis). [`parse_model_text`] is the single place that decides
//! which, producing a [`ParsedOutput`] instead of try/catch-style control flow
//! at every call site.

use serde::Serialize;
use serde_json::Value;

// ─── ParsedOutput ───────────────────────────────────────────────────────────

/// A model response after one parse attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParsedOutput {
    /// The cleaned text parsed as JSON (array or object).
    Structured(Value),
    /// Free text (Markdown), kept verbatim after fence stripping.
    Text(String),
}

impl ParsedOutput {
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ParsedOutput::Structured(v) => Some(v),
            ParsedOutput::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParsedOutput::Text(s) => Some(s),
            ParsedOutput::Structured(_) => None,
        }
    }

    /// Convert into a JSON value (text becomes a JSON string).
    pub fn to_value(&self) -> Value {
        match self {
            ParsedOutput::Structured(v) => v.clone(),
            ParsedOutput::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Strip a wrapping Markdown code fence (```json … ``` or ``` … ```).
///
/// Text without a surrounding fence is returned trimmed and otherwise intact.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    match body.find('\n') {
        Some(idx) if !body[..idx].trim().contains(' ') => body[idx + 1..].trim(),
        _ => body.trim(),
    }
}

/// Strip fences and attempt a JSON parse. Only arrays and objects count as
/// structured; a bare JSON scalar is treated as text.
pub fn parse_model_text(raw: &str) -> ParsedOutput {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => ParsedOutput::Structured(value),
        _ => ParsedOutput::Text(cleaned.to_string()),
    }
}

// ─── Confidence ─────────────────────────────────────────────────────────────

const BASE_CONFIDENCE: f64 = 0.5;
const SIGNAL_BONUS: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Minimum response length (chars) counted as substantive.
const SUBSTANTIVE_LENGTH: usize = 800;

/// Keyword signals; each group that matches adds one bonus.
const KEYWORD_SIGNALS: &[(&str, &[&str])] = &[
    ("genes", &["gen ", "genes", "polimorfismo", "snp", "alelo", "variante"]),
    ("evidence", &["estudio", "evidencia", "ensayo", "meta-análisis", "study"]),
    ("references", &["referencia", "pmid", "doi", "et al"]),
    ("mechanism", &["mecanismo", "vía metabólica", "expresión", "metilación", "enzima"]),
    ("recommendations", &["recomend", "suplement", "dieta", "nutrient"]),
];

/// Heuristic confidence of a response text, in `[0.5, 0.95]`.
///
/// Base 0.5, plus 0.1 for substantive length and 0.1 per matching keyword
/// group, capped at 0.95.
pub fn score_confidence(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let mut score = BASE_CONFIDENCE;

    if text.chars().count() >= SUBSTANTIVE_LENGTH {
        score += SIGNAL_BONUS;
    }
    for (_, keywords) in KEYWORD_SIGNALS {
        if keywords.iter().any(|k| lower.contains(k)) {
            score += SIGNAL_BONUS;
        }
    }

    score.min(MAX_CONFIDENCE)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n[\"a\", \"b\"]\n```";
        assert_eq!(strip_code_fences(raw), "[\"a\", \"b\"]");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_code_fences("```\n{\"x\":1}\n```"), "{\"x\":1}");
    }

    #[test]
    fn leaves_unfenced_text() {
        assert_eq!(strip_code_fences("  ## Título\ntexto  "), "## Título\ntexto");
    }

    #[test]
    fn parses_array_and_object() {
        assert!(matches!(
            parse_model_text("```json\n[\"Genética\"]\n```"),
            ParsedOutput::Structured(Value::Array(_))
        ));
        assert!(matches!(
            parse_model_text("{\"summary\": []}"),
            ParsedOutput::Structured(Value::Object(_))
        ));
    }

    #[test]
    fn markdown_is_text() {
        let parsed = parse_model_text("## Análisis Genético Completo\n\nTexto.");
        assert_eq!(
            parsed.as_text(),
            Some("## Análisis Genético Completo\n\nTexto.")
        );
    }

    #[test]
    fn json_scalar_is_text() {
        assert_eq!(parse_model_text("42"), ParsedOutput::Text("42".into()));
    }

    #[test]
    fn confidence_base_for_plain_text() {
        assert_eq!(score_confidence("hola"), 0.5);
    }

    #[test]
    fn confidence_caps_at_max() {
        let rich = format!(
            "{} genes polimorfismo estudio evidencia referencia PMID mecanismo metilación recomendación dieta",
            "x".repeat(1000)
        );
        assert_eq!(score_confidence(&rich), MAX_CONFIDENCE);
    }

    #[test]
    fn confidence_counts_each_group_once() {
        // Two gene keywords, one evidence keyword.
        let score = score_confidence("genes y polimorfismo según un estudio");
        assert!((score - 0.7).abs() < 1e-9);
    }
}
