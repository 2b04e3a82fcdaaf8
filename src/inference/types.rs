//! Shared types for the inference client.
//!
//! `GenerationRequest` is the backend-neutral request the invoker builds.
//! The remaining types mirror the Gemini `generateContent` API and are used
//! for both request building and response parsing.

use serde::{Deserialize, Serialize};

use super::config::TaskStrategy;

// ─── Backend-neutral Request ────────────────────────────────────────────────

/// One text-generation call: a model id, a prompt and sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model_id: String,
    pub prompt: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    /// Build a request using the sampling parameters of a category strategy.
    pub fn from_strategy(model_id: &str, prompt: String, strategy: &TaskStrategy) -> Self {
        Self {
            model_id: model_id.to_string(),
            prompt,
            temperature: strategy.temperature,
            top_k: strategy.top_k,
            top_p: strategy.top_p,
            max_output_tokens: strategy.max_output_tokens,
        }
    }
}

// ─── Wire Request Types ─────────────────────────────────────────────────────

/// Request body for `POST /models/{model}:generateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl From<&GenerationRequest> for GenerateContentRequest {
    fn from(req: &GenerationRequest) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(req.prompt.clone()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: req.temperature,
                top_k: req.top_k,
                top_p: req.top_p,
                max_output_tokens: req.max_output_tokens,
            },
        }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

/// A conversation turn (request and response share this shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// ─── Wire Response Types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    #[allow(dead_code)]
    pub finish_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if any.
    pub fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    #[allow(dead_code)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub status: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> GenerationRequest {
        GenerationRequest {
            model_id: "gemini-2.5-flash".into(),
            prompt: "hola".into(),
            temperature: 0.2,
            top_k: 40,
            top_p: 0.9,
            max_output_tokens: 2048,
        }
    }

    #[test]
    fn test_request_uses_camel_case_generation_config() {
        let body = GenerateContentRequest::from(&sample_request());
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"generationConfig\""));
        assert!(json.contains("\"topK\":40"));
        assert!(json.contains("\"maxOutputTokens\":2048"));
        assert!(json.contains("\"text\":\"hola\""));
    }

    #[test]
    fn test_first_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"uno "},{"text":"dos"}]},"finishReason":"STOP"}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.first_text().as_deref(), Some("uno dos"));
    }

    #[test]
    fn test_first_text_none_when_no_candidates() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.first_text().is_none());
    }

    #[test]
    fn test_error_envelope_parses() {
        let raw = r#"{"error":{"code":404,"message":"models/x is not found","status":"NOT_FOUND"}}"#;
        let env: ApiErrorEnvelope = serde_json::from_str(raw).unwrap();
        assert!(env.error.message.contains("not found"));
    }
}
