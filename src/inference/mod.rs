//! Inference — everything that talks to the Gemini text-generation API.
//!
//! Submodules:
//! - `config`: `config/research.yaml` loading, per-category model strategies
//! - `errors`: Inference error types
//! - `types`: `generateContent` wire types and `GenerationRequest`
//! - `client`: `GeminiClient`, the HTTP implementation of `TextGenerator`
//! - `response`: Fence stripping, JSON-or-text parse, confidence scoring
//! - `invoker`: Cache check, ordered model fallback, outcome bookkeeping
//!
//! The model identifiers live in config, so retiring a model is a config
//! change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod invoker;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use client::{GeminiClient, TextGenerator};
pub use config::{ResearchConfig, TaskStrategy};
pub use errors::InferenceError;
pub use invoker::{ModelInvoker, ModelResponse, ResponseMeta};
pub use response::ParsedOutput;
pub use types::GenerationRequest;
