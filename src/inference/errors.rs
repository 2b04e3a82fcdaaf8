//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility — these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the text-generation API.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("network error: connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("network timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The endpoint answered 2xx but produced no candidate text.
    #[error("model '{model}' returned an empty response")]
    EmptyResponse { model: String },

    /// Every model in the candidate list failed.
    #[error(
        "all models failed (tried: {}); last error: {last_error}",
        attempted.join(", ")
    )]
    AllModelsUnavailable {
        attempted: Vec<String>,
        last_error: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// The HTTP status code, if this is an `HttpError`.
    pub fn status(&self) -> Option<u16> {
        match self {
            InferenceError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}
