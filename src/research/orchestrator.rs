//! Three-stage research pipeline: plan → batched analysis → synthesis.
//!
//! 1. **Plan** — the planning model decomposes the query into 5–7 aspects
//! 2. **Analyze** — each aspect is routed to an analysis category and run in
//!    fixed-size batches; members of a batch run concurrently, batches run
//!    strictly one after another, and a failed member degrades to an error
//!    result instead of failing the batch
//! 3. **Synthesize** — the valid subset is integrated into one clinical report
//!
//! An orchestrator serves exactly one query. [`ResearchOrchestrator::run`]
//! consumes it; a resubmitted query gets a fresh instance that shares only
//! the invoker (and through it the cache and performance tracker).

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use super::errors::ResearchError;
use super::formatter::{format_aspect_result, format_synthesis};
use super::routing::route_aspect;
use super::types::{
    AspectResult, AspectStatus, ResearchMode, ResearchPlan, ResearchRecord, ResearchSynthesis,
    TaskCategory, TaskInput,
};
use super::validator::{validate_results, validate_subagents, validate_synthesis};
use crate::inference::invoker::ModelInvoker;
use crate::inference::response::ParsedOutput;

// ─── State Machine ──────────────────────────────────────────────────────────

/// The stage a pipeline failed in. Analysis degrades per aspect and never
/// fails a run on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Planning,
    Synthesis,
}

/// Orchestrator lifecycle. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Planning,
    Analyzing {
        plan: ResearchPlan,
    },
    Synthesizing {
        plan: ResearchPlan,
        results: Vec<AspectResult>,
    },
    Done {
        plan: ResearchPlan,
        results: Vec<AspectResult>,
        synthesis: ResearchSynthesis,
    },
    Failed {
        stage: PipelineStage,
        reason: String,
        /// Analysis results gathered before a synthesis failure, if any.
        results: Vec<AspectResult>,
    },
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Planning => "planning",
            PipelineState::Analyzing { .. } => "analyzing",
            PipelineState::Synthesizing { .. } => "synthesizing",
            PipelineState::Done { .. } => "done",
            PipelineState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done { .. } | PipelineState::Failed { .. })
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct ResearchOrchestrator {
    invoker: Arc<ModelInvoker>,
    state: PipelineState,
}

impl ResearchOrchestrator {
    pub fn new(invoker: Arc<ModelInvoker>) -> Self {
        Self {
            invoker,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::info!(
            from = self.state.name(),
            to = next.name(),
            "research pipeline transition"
        );
        self.state = next;
    }

    /// Stage 1: ask the planning model for the aspect list.
    pub async fn create_plan(
        &self,
        query: &str,
        mode: ResearchMode,
        genotype_id: Option<u8>,
    ) -> Result<ResearchPlan, ResearchError> {
        let input = TaskInput::for_query(query)
            .with_mode(mode)
            .with_genotype(genotype_id);
        let preferred = self.invoker.preferred_model(TaskCategory::Planning);
        let response = self
            .invoker
            .invoke(TaskCategory::Planning, &input, &preferred)
            .await?;

        let subagents = parse_plan_aspects(&response.content);
        if !validate_subagents(Some(subagents.as_slice())) {
            tracing::warn!(model = %response.meta.model_id, "planner returned no aspects");
            return Err(ResearchError::NoAspects);
        }

        tracing::info!(
            aspects = subagents.len(),
            mode = mode.as_str(),
            model = %response.meta.model_id,
            "research plan created"
        );
        Ok(ResearchPlan {
            subagents,
            research_mode: mode,
        })
    }

    /// Stage 2: analyze every aspect, `batch_size` at a time.
    ///
    /// Always returns exactly one result per aspect, in input order. A failed
    /// analysis becomes an error result with zero confidence.
    pub async fn execute_batch_analysis(
        &self,
        aspects: &[String],
        query: &str,
        batch_size: usize,
        genotype_id: Option<u8>,
    ) -> Vec<AspectResult> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(aspects.len());

        for (batch_index, batch) in aspects.chunks(batch_size).enumerate() {
            tracing::info!(
                batch = batch_index + 1,
                size = batch.len(),
                "starting analysis batch"
            );
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|aspect| self.analyze_aspect(aspect, query, genotype_id)),
            )
            .await;

            for (aspect, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        tracing::warn!(aspect = %aspect, error = %e, "aspect analysis failed");
                        results.push(AspectResult::failed(aspect.as_str()));
                    }
                }
            }
        }

        let failed = results
            .iter()
            .filter(|r| r.status == AspectStatus::Error)
            .count();
        tracing::info!(total = results.len(), failed, "analysis complete");
        results
    }

    async fn analyze_aspect(
        &self,
        aspect: &str,
        query: &str,
        genotype_id: Option<u8>,
    ) -> Result<AspectResult, ResearchError> {
        let category = route_aspect(aspect);
        let input = TaskInput::for_query(query)
            .with_aspect(aspect)
            .with_genotype(genotype_id);
        let preferred = self.invoker.preferred_model(category);
        let response = self.invoker.invoke(category, &input, &preferred).await?;

        Ok(AspectResult {
            aspect_name: aspect.to_string(),
            content: format_aspect_result(aspect, &response.content),
            status: AspectStatus::Completed,
            confidence: response.confidence,
        })
    }

    /// Stage 3: integrate the valid results into the final report.
    ///
    /// Fails without calling the model when no result is usable.
    pub async fn synthesize_report(
        &self,
        query: &str,
        results: &[AspectResult],
    ) -> Result<ResearchSynthesis, ResearchError> {
        let validation = validate_results(results);
        if !validation.is_valid {
            return Err(ResearchError::NoValidResults);
        }
        if validation.has_errors {
            tracing::info!(
                valid = validation.valid_results.len(),
                total = results.len(),
                "synthesizing from partial results"
            );
        }

        let records: Vec<ResearchRecord> = validation
            .valid_results
            .iter()
            .map(ResearchRecord::from)
            .collect();
        let input = TaskInput::for_query(query).with_research_data(records);
        let preferred = self
            .invoker
            .preferred_model(TaskCategory::ClinicalSynthesis);
        let response = self
            .invoker
            .invoke(TaskCategory::ClinicalSynthesis, &input, &preferred)
            .await?;

        let raw = response.content.to_value();
        if !validate_synthesis(&raw) {
            return Err(ResearchError::InvalidSynthesis {
                reason: "missing summary or clinical recommendations".to_string(),
            });
        }
        Ok(format_synthesis(&raw))
    }

    /// Drive all three stages and return the terminal state.
    pub async fn run(
        mut self,
        query: &str,
        mode: ResearchMode,
        genotype_id: Option<u8>,
    ) -> PipelineState {
        self.transition(PipelineState::Planning);
        let plan = match self.create_plan(query, mode, genotype_id).await {
            Ok(plan) => plan,
            Err(e) => {
                self.transition(PipelineState::Failed {
                    stage: PipelineStage::Planning,
                    reason: e.to_string(),
                    results: Vec::new(),
                });
                return self.state;
            }
        };

        self.transition(PipelineState::Analyzing { plan: plan.clone() });
        let batch_size = self.invoker.config().batch_size;
        let results = self
            .execute_batch_analysis(&plan.subagents, query, batch_size, genotype_id)
            .await;

        self.transition(PipelineState::Synthesizing {
            plan: plan.clone(),
            results: results.clone(),
        });
        match self.synthesize_report(query, &results).await {
            Ok(synthesis) => self.transition(PipelineState::Done {
                plan,
                results,
                synthesis,
            }),
            Err(e) => self.transition(PipelineState::Failed {
                stage: PipelineStage::Synthesis,
                reason: e.to_string(),
                results,
            }),
        }
        self.state
    }
}

/// Extract aspect names from the planning output.
///
/// Accepts a JSON array of strings, an object wrapping one (`subagents` or
/// `aspects`), or, leniently, a bulleted/numbered Markdown list.
pub fn parse_plan_aspects(output: &ParsedOutput) -> Vec<String> {
    match output {
        ParsedOutput::Structured(Value::Array(items)) => collect_names(items),
        ParsedOutput::Structured(Value::Object(map)) => ["subagents", "aspects"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(|items| collect_names(items))
            .unwrap_or_default(),
        ParsedOutput::Structured(_) => Vec::new(),
        ParsedOutput::Text(text) => parse_list_lines(text),
    }
}

fn collect_names(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_list_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let bullet = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "));
            let item = match bullet {
                Some(rest) => rest,
                None => {
                    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
                    if rest.len() == line.len() {
                        return None;
                    }
                    rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") "))?
                }
            };
            let item = item.trim().trim_matches('"').trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}
