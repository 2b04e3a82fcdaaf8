//! Research core — the plan → analysis → synthesis pipeline.
//!
//! Submodules:
//! - `types`: Task categories, plans, aspect results, synthesis, task input
//! - `errors`: Pipeline and history error types
//! - `performance`: Per-model outcome statistics and best-model selection
//! - `cache`: TTL response cache with an injectable clock
//! - `genotypes`: Genotype reference table for prompt context
//! - `prompts`: Per-category prompt templates with output-format contracts
//! - `formatter`: Normalizes model output into display text
//! - `validator`: Predicates over plans, results and synthesis objects
//! - `routing`: Aspect name → analysis category keyword table
//! - `error_handler`: Failure classification and user-facing messages
//! - `orchestrator`: The pipeline state machine
//! - `history`: SQLite persistence for cases and reports

pub mod cache;
pub mod error_handler;
pub mod errors;
pub mod formatter;
pub mod genotypes;
pub mod history;
pub mod orchestrator;
pub mod performance;
pub mod prompts;
pub mod routing;
pub mod types;
pub mod validator;

// Re-exports for convenience
pub use cache::{Clock, ResponseCache, ResponseStore, SystemClock};
pub use error_handler::{describe_error, describe_failure, ErrorKind, ErrorReport};
pub use errors::ResearchError;
pub use history::{CaseRecord, NewCase, NewReport, ReportRecord, ResearchHistory};
pub use orchestrator::{PipelineStage, PipelineState, ResearchOrchestrator};
pub use performance::{ModelSelector, PerformanceTracker};
pub use types::{
    AspectResult, AspectStatus, ResearchMode, ResearchPlan, ResearchSynthesis, TaskCategory,
    TaskInput,
};
