//! Gemini text-generation client.
//!
//! Sends a single prompt to the `generateContent` endpoint of one named model
//! and returns the candidate text. Fallback across models is not handled here;
//! see [`super::invoker::ModelInvoker`].

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::config::ResearchConfig;
use super::errors::InferenceError;
use super::types::{
    ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationRequest,
};

// ─── TextGenerator ───────────────────────────────────────────────────────────

/// An opaque text-completion service.
///
/// The pipeline only ever needs "prompt in, text out" for a named model, so
/// tests substitute deterministic implementations for the HTTP client.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for one request against one model.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError>;
}

// ─── GeminiClient ────────────────────────────────────────────────────────────

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    /// Configured request timeout, reported in `Timeout` errors.
    timeout_secs: u64,
}

impl GeminiClient {
    /// Create a client from the research configuration.
    ///
    /// Fails if the API key is missing. Does NOT check connectivity — that
    /// happens on the first request.
    pub fn from_config(config: &ResearchConfig) -> Result<Self, InferenceError> {
        let api_key = config.require_api_key()?.to_string();

        let mut builder = HttpClient::builder();
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| InferenceError::ConnectionFailed {
            endpoint: config.base_url.clone(),
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_secs: config.request_timeout_secs.unwrap_or_default(),
        })
    }

    /// The endpoint URL for a model, without the key.
    fn endpoint(&self, model_id: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model_id)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let url = self.endpoint(&request.model_id);
        let body = GenerateContentRequest::from(request);

        // Log the request metadata (not the prompt — it can be huge)
        tracing::debug!(
            url = %url,
            model = %request.model_id,
            prompt_chars = request.prompt.len(),
            max_output_tokens = request.max_output_tokens,
            "gemini request"
        );

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration_secs: self.timeout_secs,
                    }
                } else {
                    // The request URL carries the API key; keep it out of the message.
                    InferenceError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.without_url().to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: url.clone(),
                reason: format!("failed to read response body: {}", e.without_url()),
            })?;

        if !status.is_success() {
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: extract_error_message(&body_text),
            });
        }

        parse_generate_response(&body_text, &request.model_id)
    }
}

/// Pull the human-readable message out of an API error envelope, falling back
/// to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|env| env.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string())
}

/// Parse a successful `generateContent` body into the candidate text.
fn parse_generate_response(body: &str, model_id: &str) -> Result<String, InferenceError> {
    let resp: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::HttpError {
            status: 200,
            body: format!("unparseable response body: {e}"),
        })?;
    resp.first_text().ok_or_else(|| InferenceError::EmptyResponse {
        model: model_id.to_string(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
