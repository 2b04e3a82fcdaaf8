//! Model invocation with ordered fallback.
//!
//! One call = one task category + one structured input. The invoker renders
//! the category prompt, tries the preferred model and then the configured
//! fallback list, and normalizes the output. Only "model not found / not
//! supported" errors move on to the next candidate; anything else (quota,
//! auth, network) aborts immediately.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use super::client::TextGenerator;
use super::config::ResearchConfig;
use super::errors::InferenceError;
use super::response::{parse_model_text, score_confidence, ParsedOutput};
use super::types::GenerationRequest;
use crate::research::cache::{cache_key, ResponseStore};
use crate::research::error_handler::ErrorKind;
use crate::research::performance::ModelSelector;
use crate::research::orchestrator::parse_plan_aspects;
use crate::research::prompts::build_prompt;
use crate::research::types::{TaskCategory, TaskInput};
use crate::research::validator::validate_synthesis;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Call metadata attached to every normalized response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    /// The model that actually produced the response.
    pub model_id: String,
    /// The model the caller asked for.
    pub requested_model_id: String,
    pub category: TaskCategory,
    pub latency_ms: u64,
}

/// Normalized result of one successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub content: ParsedOutput,
    pub confidence: f64,
    pub meta: ResponseMeta,
}

// ─── ModelInvoker ────────────────────────────────────────────────────────────

/// Sends category prompts to the text-generation backend.
pub struct ModelInvoker {
    generator: Arc<dyn TextGenerator>,
    selector: Arc<dyn ModelSelector>,
    cache: Arc<dyn ResponseStore>,
    config: ResearchConfig,
}

impl ModelInvoker {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        selector: Arc<dyn ModelSelector>,
        cache: Arc<dyn ResponseStore>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            generator,
            selector,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// The preferred model for a category, per the performance tracker.
    pub fn preferred_model(&self, category: TaskCategory) -> String {
        self.selector.best_model_for(category)
    }

    /// Candidate order: preferred model, then the fallback list, without
    /// duplicates (first occurrence wins).
    pub fn candidate_models(&self, preferred: &str) -> Vec<String> {
        let fallbacks = self.config.fallback_models.iter().map(String::as_str);
        let mut candidates: Vec<String> = Vec::with_capacity(self.config.fallback_models.len() + 1);
        for model in std::iter::once(preferred).chain(fallbacks) {
            if !model.is_empty() && !candidates.iter().any(|c| c == model) {
                candidates.push(model.to_string());
            }
        }
        candidates
    }

    /// Invoke the model for a task, with cache lookup and fallback.
    pub async fn invoke(
        &self,
        category: TaskCategory,
        input: &TaskInput,
        preferred_model: &str,
    ) -> Result<ModelResponse, InferenceError> {
        let key = cache_key(category, input, preferred_model);
        if let Some(cached) = self.cache.get(&key) {
            tracing::info!(
                category = %category,
                model = %cached.meta.model_id,
                "response cache hit"
            );
            return Ok(cached);
        }

        let strategy = self.config.strategy(category);
        let prompt = build_prompt(category, input, &strategy);
        let candidates = self.candidate_models(preferred_model);
        let mut last_error: Option<InferenceError> = None;

        for model_id in &candidates {
            let request = GenerationRequest::from_strategy(model_id, prompt.clone(), &strategy);
            let started = Instant::now();
            let outcome = self.generator.generate(&request).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(text) => {
                    let confidence = score_confidence(&text);
                    self.selector
                        .record_outcome(model_id, category, true, latency_ms, confidence);

                    let meta = ResponseMeta {
                        model_id: model_id.clone(),
                        requested_model_id: preferred_model.to_string(),
                        category,
                        latency_ms,
                    };
                    let response = ModelResponse {
                        content: normalize_output(category, &text, &meta),
                        confidence,
                        meta,
                    };

                    if model_id != preferred_model {
                        tracing::info!(
                            category = %category,
                            requested = preferred_model,
                            served_by = %model_id,
                            "fallback model served request"
                        );
                    }

                    if is_cacheable(category, &response.content) {
                        self.cache.set(
                            &key,
                            response.clone(),
                            model_id,
                            confidence,
                            input.genotype_id.is_some(),
                        );
                    } else {
                        tracing::debug!(
                            category = %category,
                            model = %model_id,
                            "response does not fit the category contract — not cached"
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    self.selector
                        .record_outcome(model_id, category, false, latency_ms, 0.0);
                    let kind = ErrorKind::of(&e);
                    if !kind.triggers_model_fallback() {
                        tracing::warn!(
                            category = %category,
                            model = %model_id,
                            kind = ?kind,
                            error = %e,
                            "model call failed — not retrying"
                        );
                        return Err(e);
                    }
                    tracing::warn!(
                        category = %category,
                        model = %model_id,
                        error = %e,
                        "model unavailable — trying next candidate"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(InferenceError::AllModelsUnavailable {
            attempted: candidates,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no candidate models configured".to_string()),
        })
    }
}

/// Parse model text into its normalized shape for a category.
///
/// Arrays are returned as-is, objects get the call metadata merged in under
/// `_meta`, and unparseable text is kept as free text. The text fallback is
/// logged for planning and synthesis, whose callers expect JSON.
fn normalize_output(category: TaskCategory, text: &str, meta: &ResponseMeta) -> ParsedOutput {
    match parse_model_text(text) {
        ParsedOutput::Structured(Value::Object(mut map)) => {
            if let Ok(meta_value) = serde_json::to_value(meta) {
                map.insert("_meta".to_string(), meta_value);
            }
            ParsedOutput::Structured(Value::Object(map))
        }
        ParsedOutput::Text(t) => {
            if !category.expects_free_text() {
                tracing::warn!(
                    category = %category,
                    chars = t.len(),
                    "structured response expected but not JSON — returning raw text"
                );
            }
            ParsedOutput::Text(t)
        }
        structured => structured,
    }
}

/// Whether a response may be replayed from the cache.
///
/// Plans must yield at least one aspect and syntheses must carry a summary
/// and recommendations; a rejected response is never replayed on resubmit.
fn is_cacheable(category: TaskCategory, content: &ParsedOutput) -> bool {
    match category {
        TaskCategory::Planning => !parse_plan_aspects(content).is_empty(),
        TaskCategory::ClinicalSynthesis => match content {
            ParsedOutput::Structured(value @ Value::Object(_)) => validate_synthesis(value),
            _ => false,
        },
        _ => match content {
            ParsedOutput::Text(t) => !t.trim().is_empty(),
            ParsedOutput::Structured(_) => true,
        },
    }
}

// ─── Test Support ────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Handler = dyn Fn(&GenerationRequest) -> Result<String, InferenceError> + Send + Sync;

    /// Deterministic generator driven by a closure; records every request.
    pub(crate) struct FnGenerator {
        handler: Box<Handler>,
        pub(crate) calls: Mutex<Vec<GenerationRequest>>,
    }

    impl FnGenerator {
        pub(crate) fn new(
            handler: impl Fn(&GenerationRequest) -> Result<String, InferenceError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn models_called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.model_id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl TextGenerator for FnGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
            self.calls.lock().unwrap().push(request.clone());
            (self.handler)(request)
        }
    }

    pub(crate) fn not_found(model: &str) -> InferenceError {
        InferenceError::HttpError {
            status: 404,
            body: format!("models/{model} is not found for API version v1beta"),
        }
    }

    pub(crate) fn quota() -> InferenceError {
        InferenceError::HttpError {
            status: 429,
            body: "Resource has been exhausted (e.g. check quota).".into(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::test_support::{not_found, quota, FnGenerator};
    use super::*;
    use crate::research::cache::ResponseCache;
    use crate::research::performance::PerformanceTracker;
    use std::time::Duration;

    struct Harness {
        generator: Arc<FnGenerator>,
        tracker: Arc<PerformanceTracker>,
        cache: Arc<ResponseCache>,
        invoker: ModelInvoker,
    }

    fn harness(generator: FnGenerator) -> Harness {
        let mut config = ResearchConfig::default();
        config.fallback_models = vec!["fallback-a".into(), "fallback-b".into()];
        let generator = Arc::new(generator);
        let tracker = Arc::new(PerformanceTracker::new(&config));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(3600)));
        let invoker = ModelInvoker::new(generator.clone(), tracker.clone(), cache.clone(), config);
        Harness {
            generator,
            tracker,
            cache,
            invoker,
        }
    }

    #[test]
    fn candidates_are_deduplicated_in_order() {
        let h = harness(FnGenerator::new(|_| Ok(String::new())));
        assert_eq!(
            h.invoker.candidate_models("fallback-b"),
            vec!["fallback-b".to_string(), "fallback-a".to_string()]
        );
        assert_eq!(
            h.invoker.candidate_models("custom"),
            vec!["custom", "fallback-a", "fallback-b"]
        );
    }

    #[tokio::test]
    async fn falls_back_on_model_not_found() {
        let h = harness(FnGenerator::new(|req| {
            if req.model_id == "retired-model" {
                Err(not_found(&req.model_id))
            } else {
                Ok("## Análisis Genético Completo\n\nMTHFR".to_string())
            }
        }));
        let input = TaskInput::for_query("MTHFR").with_aspect("Genética");
        let resp = h
            .invoker
            .invoke(TaskCategory::GeneticAnalysis, &input, "retired-model")
            .await
            .unwrap();

        assert_eq!(h.generator.models_called(), vec!["retired-model", "fallback-a"]);
        assert_eq!(resp.meta.model_id, "fallback-a");
        assert_eq!(resp.meta.requested_model_id, "retired-model");
        assert!(resp.content.as_text().unwrap().contains("MTHFR"));

        let failed = h.tracker.record("retired-model").unwrap();
        assert_eq!(failed.error_count, 1);
        let served = h.tracker.record("fallback-a").unwrap();
        assert_eq!(served.success_count, 1);
    }

    #[tokio::test]
    async fn quota_error_stops_immediately() {
        let h = harness(FnGenerator::new(|_| Err(quota())));
        let input = TaskInput::for_query("MTHFR");
        let err = h
            .invoker
            .invoke(TaskCategory::GeneticAnalysis, &input, "retired-model")
            .await
            .unwrap_err();

        assert_eq!(h.generator.call_count(), 1);
        assert_eq!(ErrorKind::of(&err), ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn all_candidates_missing_yields_aggregate_error() {
        let h = harness(FnGenerator::new(|req| Err(not_found(&req.model_id))));
        let err = h
            .invoker
            .invoke(TaskCategory::Planning, &TaskInput::for_query("q"), "p")
            .await
            .unwrap_err();

        match err {
            InferenceError::AllModelsUnavailable {
                attempted,
                last_error,
            } => {
                assert_eq!(attempted, vec!["p", "fallback-a", "fallback-b"]);
                assert!(last_error.contains("fallback-b"));
            }
            other => panic!("expected AllModelsUnavailable, got {other:?}"),
        }
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn planning_array_is_returned_directly() {
        let h = harness(FnGenerator::new(|_| {
            Ok("```json\n[\"Genética Molecular\", \"Metabolismo\"]\n```".to_string())
        }));
        let resp = h
            .invoker
            .invoke(TaskCategory::Planning, &TaskInput::for_query("q"), "p")
            .await
            .unwrap();
        let arr = resp.content.as_structured().unwrap().as_array().unwrap();
        assert_eq!(arr.len(), 2);
    }

    #[tokio::test]
    async fn object_gets_meta_merged() {
        let h = harness(FnGenerator::new(|_| {
            Ok(r#"{"summary": ["s"], "clinicalRecommendations": ["r"]}"#.to_string())
        }));
        let resp = h
            .invoker
            .invoke(TaskCategory::ClinicalSynthesis, &TaskInput::for_query("q"), "p")
            .await
            .unwrap();
        let obj = resp.content.as_structured().unwrap();
        assert_eq!(obj["_meta"]["modelId"], "p");
        assert_eq!(obj["_meta"]["category"], "clinical_synthesis");
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let h = harness(FnGenerator::new(|_| Ok("texto".to_string())));
        let input = TaskInput::for_query("MTHFR").with_genotype(Some(2));
        let first = h
            .invoker
            .invoke(TaskCategory::LiteratureReview, &input, "p")
            .await
            .unwrap();
        let second = h
            .invoker
            .invoke(TaskCategory::LiteratureReview, &input, "p")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(h.generator.call_count(), 1);

        // A different requested model does not share the entry.
        h.invoker
            .invoke(TaskCategory::LiteratureReview, &input, "fallback-a")
            .await
            .unwrap();
        assert_eq!(h.generator.call_count(), 2);
    }

    #[tokio::test]
    async fn rejected_plan_is_not_cached() {
        let h = harness(FnGenerator::new(|_| Ok("[]".to_string())));
        let input = TaskInput::for_query("Investiga MTHFR");
        for _ in 0..2 {
            h.invoker
                .invoke(TaskCategory::Planning, &input, "p")
                .await
                .unwrap();
        }
        assert_eq!(h.generator.call_count(), 2);
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn incomplete_synthesis_is_not_cached() {
        let h = harness(FnGenerator::new(|_| {
            Ok(r#"{"summary": "x", "clinicalRecommendations": []}"#.to_string())
        }));
        h.invoker
            .invoke(TaskCategory::ClinicalSynthesis, &TaskInput::for_query("q"), "p")
            .await
            .unwrap();
        assert!(h.cache.is_empty());

        let h = harness(FnGenerator::new(|_| Ok("síntesis en prosa".to_string())));
        h.invoker
            .invoke(TaskCategory::ClinicalSynthesis, &TaskInput::for_query("q"), "p")
            .await
            .unwrap();
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn requests_carry_category_sampling() {
        let h = harness(FnGenerator::new(|_| Ok("[]".to_string())));
        h.invoker
            .invoke(TaskCategory::Planning, &TaskInput::for_query("q"), "p")
            .await
            .unwrap();
        let strategy = ResearchConfig::default().strategy(TaskCategory::Planning);
        let calls = h.generator.calls.lock().unwrap();
        assert_eq!(calls[0].temperature, strategy.temperature);
        assert_eq!(calls[0].top_k, strategy.top_k);
        assert_eq!(calls[0].max_output_tokens, strategy.max_output_tokens);
    }
}
