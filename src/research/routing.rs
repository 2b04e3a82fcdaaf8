//! Per-aspect model routing.
//!
//! Aspect names come from the planning model, so this is a best-effort
//! keyword match, not a classification. Misrouting is not an error.

use super::types::TaskCategory;

/// Keywords per category, checked in order. Matching is case-sensitive
/// against the aspect's display name.
const ROUTING_TABLE: &[(TaskCategory, &[&str])] = &[
    (
        TaskCategory::GeneticAnalysis,
        &["Genética", "Molecular", "Polimorfismo"],
    ),
    (TaskCategory::MetabolicResearch, &["Metabolismo", "Metabólico"]),
    (TaskCategory::EpigeneticStudy, &["Epigenética", "Epigenético"]),
    (TaskCategory::LiteratureReview, &["Literatura", "Revisión"]),
];

/// Category used when no keyword matches.
pub const DEFAULT_ROUTE: TaskCategory = TaskCategory::GeneticAnalysis;

/// Pick the analysis category for an aspect name.
pub fn route_aspect(aspect_name: &str) -> TaskCategory {
    let category = ROUTING_TABLE
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| aspect_name.contains(k)))
        .map(|(category, _)| *category);

    match category {
        Some(c) => c,
        None => {
            tracing::debug!(aspect = aspect_name, "no routing keyword — using default category");
            DEFAULT_ROUTE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_keyword() {
        assert_eq!(
            route_aspect("Genética Molecular del MTHFR"),
            TaskCategory::GeneticAnalysis
        );
        assert_eq!(
            route_aspect("Metabolismo del folato"),
            TaskCategory::MetabolicResearch
        );
        assert_eq!(
            route_aspect("Regulación Epigenética"),
            TaskCategory::EpigeneticStudy
        );
        assert_eq!(
            route_aspect("Revisión de Literatura Científica"),
            TaskCategory::LiteratureReview
        );
    }

    #[test]
    fn epigenetic_is_not_swallowed_by_genetic() {
        // Case-sensitive: "Epigenética" does not contain "Genética".
        assert_eq!(
            route_aspect("Factores Epigenéticos"),
            TaskCategory::EpigeneticStudy
        );
        assert_eq!(route_aspect("Epigenética"), TaskCategory::EpigeneticStudy);
    }

    #[test]
    fn unmatched_defaults_to_genetic() {
        assert_eq!(route_aspect("Recomendaciones Dietéticas"), DEFAULT_ROUTE);
    }

    #[test]
    fn table_order_decides_overlap() {
        // Genetics is checked first.
        assert_eq!(
            route_aspect("Polimorfismo y Metabolismo"),
            TaskCategory::GeneticAnalysis
        );
    }
}
