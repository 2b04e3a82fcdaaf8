//! Content formatter: turns heterogeneous model output into display text.
//!
//! Model output arrives as Markdown, a JSON object or a JSON array. Every
//! entry point here is total; unrecognized shapes fall back to their plain
//! string rendering instead of failing.

use serde_json::{Map, Value};

use super::types::ResearchSynthesis;
use crate::inference::response::ParsedOutput;

/// Narrative fields emitted verbatim, before any labelled field. Keys ending
/// in `Profile` (`geneticProfile`, `metabolicProfile`) follow these.
const PRIORITY_FIELDS: &[&str] = &["content", "summary", "report", "profile"];

const PROFILE_SUFFIX: &str = "Profile";

/// Internal call metadata merged in by the invoker; never displayed.
const META_FIELD: &str = "_meta";

const FIELD_LABELS: &[(&str, &str)] = &[
    ("aspect", "Aspecto"),
    ("biomarkers", "Biomarcadores"),
    ("clinicalImplications", "Implicaciones Clínicas"),
    ("clinicalRecommendations", "Recomendaciones Clínicas"),
    ("confidence", "Confianza"),
    ("confidenceScore", "Puntuación de Confianza"),
    ("epigeneticFactors", "Factores Epigenéticos"),
    ("evidenceLevel", "Nivel de Evidencia"),
    ("findings", "Hallazgos"),
    ("genes", "Genes"),
    ("geneticProfile", "Perfil Genético"),
    ("mechanisms", "Mecanismos"),
    ("metabolicAnalysis", "Análisis Metabólico"),
    ("metabolicPathways", "Vías Metabólicas"),
    ("nutrients", "Nutrientes"),
    ("polymorphisms", "Polimorfismos"),
    ("recommendations", "Recomendaciones"),
    ("references", "Referencias"),
];

/// Sub-lists appended after an aspect's main content, in display order.
const ASPECT_SECTIONS: &[(&str, &str)] = &[
    ("genes", "Genes Relevantes"),
    ("metabolicPathways", "Vías Metabólicas"),
    ("epigeneticFactors", "Factores Epigenéticos"),
    ("clinicalImplications", "Implicaciones Clínicas"),
    ("references", "Referencias"),
];

/// Extra synthesis sections appended after the summary body.
const SYNTHESIS_SECTIONS: &[(&str, &str)] = &[
    ("geneticProfile", "Perfil Genético"),
    ("metabolicAnalysis", "Análisis Metabólico"),
    ("epigeneticFactors", "Factores Epigenéticos"),
];

// ─── format ─────────────────────────────────────────────────────────────────

/// Render any model output value as display text.
pub fn format(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format_str(s),
        Value::Array(items) => format_array(items),
        Value::Object(map) => format_object(map),
    }
}

/// Render a string, parsing it first if it looks like a JSON document.
pub fn format_str(text: &str) -> String {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str(trimmed) {
            return format(&value);
        }
    }
    text.to_string()
}

fn format_array(items: &[Value]) -> String {
    if items.iter().all(Value::is_string) {
        return items
            .iter()
            .filter_map(Value::as_str)
            .map(format_str)
            .collect::<Vec<_>>()
            .join("\n\n");
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, format(item)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_object(map: &Map<String, Value>) -> String {
    let mut blocks: Vec<String> = Vec::new();

    let profiles = map
        .iter()
        .filter(|(key, _)| is_profile_field(key))
        .map(|(_, value)| value);
    let narrative = PRIORITY_FIELDS
        .iter()
        .filter_map(|field| map.get(*field))
        .chain(profiles);
    for value in narrative {
        let text = format(value);
        if !text.trim().is_empty() {
            blocks.push(text);
        }
    }

    for (key, value) in map {
        if key == META_FIELD || value.is_null() || is_priority_field(key) {
            continue;
        }
        let label = field_label(key);
        let line = match value {
            Value::Array(items) if items.iter().all(Value::is_string) => {
                let joined = items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("**{label}:** {joined}")
            }
            Value::Array(_) | Value::Object(_) => format!("**{label}:**\n{}", format(value)),
            scalar => format!("**{label}:** {}", format(scalar)),
        };
        blocks.push(line);
    }

    blocks.join("\n\n")
}

fn is_profile_field(key: &str) -> bool {
    key.len() > PROFILE_SUFFIX.len() && key.ends_with(PROFILE_SUFFIX)
}

fn is_priority_field(key: &str) -> bool {
    PRIORITY_FIELDS.contains(&key) || is_profile_field(key)
}

/// Display label for a field name; unknown names are humanized.
fn field_label(key: &str) -> String {
    if let Some((_, label)) = FIELD_LABELS.iter().find(|(k, _)| *k == key) {
        return (*label).to_string();
    }
    humanize(key)
}

/// `geneVariants` / `gene_variants` → `Gene variants`.
fn humanize(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch == '_' || ch == '-' {
            out.push(' ');
        } else if ch.is_uppercase() && i > 0 {
            out.push(' ');
            out.extend(ch.to_lowercase());
        } else if i == 0 {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

// ─── Aspect results ─────────────────────────────────────────────────────────

/// Assemble one aspect's analysis into a Markdown block.
///
/// Free text is already display-ready and passes through trimmed. Structured
/// output gets a heading, its narrative content, then any known sub-lists.
pub fn format_aspect_result(aspect_name: &str, output: &ParsedOutput) -> String {
    let map = match output {
        ParsedOutput::Text(text) => return format_str(text.trim()),
        ParsedOutput::Structured(Value::Object(map)) => map,
        ParsedOutput::Structured(other) => return format(other),
    };

    let mut main = map.clone();
    main.remove(META_FIELD);
    for (field, _) in ASPECT_SECTIONS {
        main.remove(*field);
    }

    let mut blocks = vec![format!("## {aspect_name}")];
    let body = format_object(&main);
    if !body.trim().is_empty() {
        blocks.push(body);
    }

    for (field, title) in ASPECT_SECTIONS {
        if let Some(list) = bullet_list(map.get(*field)) {
            blocks.push(format!("### {title}\n\n{list}"));
        }
    }

    blocks.join("\n\n")
}

/// `- item` lines for a non-empty array (or a single non-empty value).
fn bullet_list(value: Option<&Value>) -> Option<String> {
    let items: Vec<String> = match value? {
        Value::Array(items) => items.iter().map(format).collect(),
        Value::Null => return None,
        other => vec![format(other)],
    };
    let lines: Vec<String> = items
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("- {s}"))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

// ─── Synthesis ──────────────────────────────────────────────────────────────

/// Build the final synthesis from the model's synthesis object.
///
/// The `report` field is preferred as the body; otherwise `summary` is used.
/// Genetic, metabolic and epigenetic sections are appended when present.
pub fn format_synthesis(raw: &Value) -> ResearchSynthesis {
    let Some(map) = raw.as_object() else {
        return ResearchSynthesis {
            summary_text: format(raw),
            recommendations: Vec::new(),
            evidence_level: evidence_level_for(None),
        };
    };

    let report = map.get("report").map(format).unwrap_or_default();
    let mut summary_text = if report.trim().is_empty() {
        map.get("summary").map(format).unwrap_or_default()
    } else {
        report
    };

    for (field, title) in SYNTHESIS_SECTIONS {
        let section = map.get(*field).map(format).unwrap_or_default();
        if !section.trim().is_empty() {
            summary_text.push_str(&format!("\n\n## {title}\n\n{section}"));
        }
    }

    let recommendations = match map.get("clinicalRecommendations") {
        Some(Value::Array(items)) => items
            .iter()
            .map(format)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        _ => Vec::new(),
    };

    let evidence_level = match map.get("evidenceLevel").and_then(Value::as_str) {
        Some(level) if !level.trim().is_empty() => level.trim().to_string(),
        _ => evidence_level_for(map.get("confidenceScore").and_then(Value::as_f64)),
    };

    ResearchSynthesis {
        summary_text: summary_text.trim().to_string(),
        recommendations,
        evidence_level,
    }
}

/// Qualitative evidence level from a confidence score.
pub fn evidence_level_for(confidence: Option<f64>) -> String {
    let level = match confidence.unwrap_or(0.0) {
        c if c >= 0.8 => "Alta",
        c if c >= 0.6 => "Moderada",
        _ => "Limitada",
    };
    level.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_is_idempotent() {
        let x = "## Análisis\n\nEl gen MTHFR **codifica** una enzima.";
        let once = format(&json!(x));
        assert_eq!(once, x);
        assert_eq!(format(&json!(once)), once);
    }

    #[test]
    fn nested_json_strings_format_in_one_pass() {
        let x = json!("[\"[2]\"]");
        let once = format(&x);
        assert_eq!(once, "1. 2");
        assert_eq!(format(&json!(once)), once);
    }

    #[test]
    fn profile_fields_are_narrative() {
        let out = format(&json!({
            "confidenceScore": 0.7,
            "geneticProfile": "Portador heterocigoto de MTHFR C677T.",
            "summary": "Resumen.",
        }));
        assert_eq!(
            out,
            "Resumen.\n\nPortador heterocigoto de MTHFR C677T.\n\n**Puntuación de Confianza:** 0.7"
        );
    }

    #[test]
    fn json_looking_string_is_parsed() {
        assert_eq!(format(&json!("[\"a\", \"b\"]")), "a\n\nb");
        // Broken JSON stays verbatim.
        assert_eq!(format(&json!("[not json")), "[not json");
    }

    #[test]
    fn object_array_is_numbered() {
        let out = format(&json!([{ "content": "uno" }, { "content": "dos" }]));
        assert_eq!(out, "1. uno\n\n2. dos");
    }

    #[test]
    fn object_priority_fields_then_labels() {
        let out = format(&json!({
            "genes": ["MTHFR", "MTR"],
            "summary": "Resumen.",
            "confidenceScore": 0.8,
            "_meta": { "modelId": "x" },
            "notes": null,
            "geneVariants": "C677T"
        }));
        assert!(out.starts_with("Resumen."));
        assert!(out.contains("**Genes:** MTHFR, MTR"));
        assert!(out.contains("**Puntuación de Confianza:** 0.8"));
        assert!(out.contains("**Gene variants:** C677T"));
        assert!(!out.contains("modelId"));
        assert!(!out.contains("Notes"));
    }

    #[test]
    fn scalars_and_null_never_fail() {
        assert_eq!(format(&Value::Null), "");
        assert_eq!(format(&json!(true)), "true");
        assert_eq!(format(&json!(3)), "3");
    }

    #[test]
    fn aspect_text_passes_through() {
        let out = format_aspect_result(
            "Genética",
            &ParsedOutput::Text("  ## Análisis Genético Completo\n\ntexto ".into()),
        );
        assert_eq!(out, "## Análisis Genético Completo\n\ntexto");
    }

    #[test]
    fn aspect_structured_gets_sub_lists() {
        let out = format_aspect_result(
            "Metabolismo del folato",
            &ParsedOutput::Structured(json!({
                "content": "Hallazgo principal.",
                "genes": ["MTHFR"],
                "metabolicPathways": ["Ciclo del folato"],
                "references": [],
                "_meta": { "modelId": "m" }
            })),
        );
        assert!(out.starts_with("## Metabolismo del folato\n\nHallazgo principal."));
        assert!(out.contains("### Genes Relevantes\n\n- MTHFR"));
        assert!(out.contains("### Vías Metabólicas\n\n- Ciclo del folato"));
        assert!(!out.contains("### Referencias"));
        assert!(!out.contains("_meta"));
    }

    #[test]
    fn synthesis_prefers_report_and_appends_sections() {
        let s = format_synthesis(&json!({
            "summary": ["punto"],
            "report": "Informe completo.",
            "geneticProfile": "Heterocigoto C677T.",
            "clinicalRecommendations": ["Folato activo", ""],
            "confidenceScore": 0.85
        }));
        assert!(s.summary_text.starts_with("Informe completo."));
        assert!(s.summary_text.contains("## Perfil Genético\n\nHeterocigoto C677T."));
        assert!(!s.summary_text.contains("punto"));
        assert_eq!(s.recommendations, vec!["Folato activo"]);
        assert_eq!(s.evidence_level, "Alta");
    }

    #[test]
    fn synthesis_falls_back_to_summary() {
        let s = format_synthesis(&json!({
            "summary": ["uno", "dos"],
            "clinicalRecommendations": ["r"],
            "evidenceLevel": "Moderada-Alta"
        }));
        assert_eq!(s.summary_text, "uno\n\ndos");
        assert_eq!(s.evidence_level, "Moderada-Alta");
    }

    #[test]
    fn evidence_level_thresholds() {
        assert_eq!(evidence_level_for(Some(0.8)), "Alta");
        assert_eq!(evidence_level_for(Some(0.6)), "Moderada");
        assert_eq!(evidence_level_for(Some(0.59)), "Limitada");
        assert_eq!(evidence_level_for(None), "Limitada");
    }
}
