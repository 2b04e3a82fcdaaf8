//! Shared types for the research pipeline.
//!
//! Task categories, plans, per-aspect results and the final synthesis. All of
//! these are immutable once produced by their pipeline stage.

use serde::{Deserialize, Serialize};

// ─── Task Categories ────────────────────────────────────────────────────────

/// The six fixed task types. Each one selects a prompt template and a model
/// strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Planning,
    GeneticAnalysis,
    MetabolicResearch,
    EpigeneticStudy,
    ClinicalSynthesis,
    LiteratureReview,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 6] = [
        TaskCategory::Planning,
        TaskCategory::GeneticAnalysis,
        TaskCategory::MetabolicResearch,
        TaskCategory::EpigeneticStudy,
        TaskCategory::ClinicalSynthesis,
        TaskCategory::LiteratureReview,
    ];

    /// Stable identifier, used in cache keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Planning => "planning",
            TaskCategory::GeneticAnalysis => "genetic_analysis",
            TaskCategory::MetabolicResearch => "metabolic_research",
            TaskCategory::EpigeneticStudy => "epigenetic_study",
            TaskCategory::ClinicalSynthesis => "clinical_synthesis",
            TaskCategory::LiteratureReview => "literature_review",
        }
    }

    /// Whether the prompt contract for this category asks for free-text
    /// Markdown. A JSON parse failure is the expected outcome for these.
    pub fn expects_free_text(self) -> bool {
        matches!(
            self,
            TaskCategory::GeneticAnalysis
                | TaskCategory::MetabolicResearch
                | TaskCategory::EpigeneticStudy
                | TaskCategory::LiteratureReview
        )
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Plans ──────────────────────────────────────────────────────────────────

/// How the planner should decompose the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchMode {
    #[default]
    DepthFirst,
    BreadthFirst,
}

impl ResearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResearchMode::DepthFirst => "depth-first",
            ResearchMode::BreadthFirst => "breadth-first",
        }
    }
}

/// Output of the planning stage: the aspects to analyze, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    /// Aspect names proposed by the planner (5–7 expected, not enforced).
    pub subagents: Vec<String>,
    pub research_mode: ResearchMode,
}

// ─── Analysis Results ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectStatus {
    Completed,
    Error,
}

/// Result of analyzing one plan aspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectResult {
    pub aspect_name: String,
    /// Display-ready Markdown.
    pub content: String,
    pub status: AspectStatus,
    /// Heuristic score in `[0, 0.95]`.
    pub confidence: f64,
}

impl AspectResult {
    /// Synthetic result standing in for an aspect whose analysis failed.
    pub fn failed(aspect_name: impl Into<String>) -> Self {
        Self {
            aspect_name: aspect_name.into(),
            content: "No se pudo completar el análisis de este aspecto.".to_string(),
            status: AspectStatus::Error,
            confidence: 0.0,
        }
    }

    /// Completed with confidence strictly above 0.5.
    pub fn is_usable(&self) -> bool {
        self.status == AspectStatus::Completed && self.confidence > 0.5
    }
}

// ─── Synthesis ──────────────────────────────────────────────────────────────

/// Terminal artifact of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSynthesis {
    pub summary_text: String,
    pub recommendations: Vec<String>,
    pub evidence_level: String,
}

/// One validated aspect re-packaged for the synthesis prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRecord {
    pub aspect: String,
    pub findings: String,
    pub confidence: f64,
}

impl From<&AspectResult> for ResearchRecord {
    fn from(result: &AspectResult) -> Self {
        Self {
            aspect: result.aspect_name.clone(),
            findings: result.content.clone(),
            confidence: result.confidence,
        }
    }
}

// ─── Task Input ─────────────────────────────────────────────────────────────

/// Structured input rendered into a prompt by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_mode: Option<ResearchMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genotype_id: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub research_data: Vec<ResearchRecord>,
}

impl TaskInput {
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_aspect(mut self, aspect: impl Into<String>) -> Self {
        self.aspect = Some(aspect.into());
        self
    }

    pub fn with_mode(mut self, mode: ResearchMode) -> Self {
        self.research_mode = Some(mode);
        self
    }

    pub fn with_genotype(mut self, genotype_id: Option<u8>) -> Self {
        self.genotype_id = genotype_id;
        self
    }

    pub fn with_research_data(mut self, data: Vec<ResearchRecord>) -> Self {
        self.research_data = data;
        self
    }

    /// Copy with whitespace collapsed and free text lower-cased, so that
    /// trivially different spellings of one request share a cache entry.
    pub fn normalized(&self) -> Self {
        Self {
            query: normalize_text(&self.query),
            aspect: self.aspect.as_deref().map(normalize_text),
            research_mode: self.research_mode,
            genotype_id: self.genotype_id,
            research_data: self
                .research_data
                .iter()
                .map(|r| ResearchRecord {
                    aspect: normalize_text(&r.aspect),
                    findings: r.findings.trim().to_string(),
                    confidence: r.confidence,
                })
                .collect(),
        }
    }
}

fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_is_not_usable() {
        let r = AspectResult::failed("Genética");
        assert_eq!(r.status, AspectStatus::Error);
        assert_eq!(r.confidence, 0.0);
        assert!(!r.is_usable());
    }

    #[test]
    fn usable_requires_confidence_above_half() {
        let mut r = AspectResult {
            aspect_name: "x".into(),
            content: "y".into(),
            status: AspectStatus::Completed,
            confidence: 0.5,
        };
        assert!(!r.is_usable());
        r.confidence = 0.51;
        assert!(r.is_usable());
    }

    #[test]
    fn normalized_collapses_whitespace_and_case() {
        let input = TaskInput::for_query("  Investiga   MTHFR\tC677T ").with_aspect("Genética ");
        let n = input.normalized();
        assert_eq!(n.query, "investiga mthfr c677t");
        assert_eq!(n.aspect.as_deref(), Some("genética"));
    }

    #[test]
    fn research_mode_serializes_kebab_case() {
        let json = serde_json::to_string(&ResearchMode::BreadthFirst).unwrap();
        assert_eq!(json, "\"breadth-first\"");
    }

    #[test]
    fn free_text_categories() {
        assert!(!TaskCategory::Planning.expects_free_text());
        assert!(!TaskCategory::ClinicalSynthesis.expects_free_text());
        assert!(TaskCategory::LiteratureReview.expects_free_text());
    }
}
