//! Research pipeline error types.

use thiserror::Error;

use crate::inference::errors::InferenceError;

/// Errors that end a pipeline stage or a history operation.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Planning produced no usable aspect list.
    #[error("no aspects produced")]
    NoAspects,

    /// Every analysis result was failed or low-confidence.
    #[error("no valid results to synthesize")]
    NoValidResults,

    /// The synthesis object lacked a summary or recommendations.
    #[error("invalid synthesis: {reason}")]
    InvalidSynthesis { reason: String },

    /// A model call failed after the fallback list was exhausted or aborted.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Database operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// Case not found.
    #[error("case not found: '{case_id}'")]
    CaseNotFound { case_id: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<rusqlite::Error> for ResearchError {
    fn from(e: rusqlite::Error) -> Self {
        ResearchError::DatabaseError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ResearchError {
    fn from(e: serde_json::Error) -> Self {
        ResearchError::SerializationError {
            reason: e.to_string(),
        }
    }
}
