//! Research configuration loading and validation.
//!
//! Reads `config/research.yaml` and resolves environment variables.
//! Config is the single source of truth for the API endpoint, the model
//! fallback list and the per-category model strategies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::errors::InferenceError;
use crate::research::types::TaskCategory;

/// Relative location of the config file under a project root.
const CONFIG_RELATIVE_PATH: &str = "config/research.yaml";

/// Environment variable that pins the project root.
const PROJECT_ROOT_ENV: &str = "NUTRIGEN_PROJECT_ROOT";

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Model strategy for one task category.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskStrategy {
    pub primary_model: String,
    pub fallback_model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    /// Free-form depth hint rendered into prompts (e.g. "exhaustiva").
    pub research_depth: String,
}

/// Top-level research configuration (mirrors `config/research.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Fixed ordered fallback sequence tried after the preferred model.
    #[serde(default = "default_fallback_models")]
    pub fallback_models: Vec<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Unset means the HTTP client's own default.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Unset means the HTTP client's own default.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    strategies: BTreeMap<TaskCategory, TaskStrategy>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_fallback_models() -> Vec<String> {
    [
        "gemini-2.5-pro",
        "gemini-2.5-flash",
        "gemini-2.0-flash",
        "gemini-1.5-pro",
        "gemini-1.5-flash",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_batch_size() -> usize {
    3
}

/// Built-in strategy for a category.
pub fn default_strategy(category: TaskCategory) -> TaskStrategy {
    let (primary, fallback, max_tokens, temperature, top_k, top_p, depth) = match category {
        TaskCategory::Planning => (
            "gemini-2.5-flash",
            "gemini-2.0-flash",
            2048,
            0.3,
            20,
            0.8,
            "panorámica",
        ),
        TaskCategory::GeneticAnalysis => (
            "gemini-2.5-pro",
            "gemini-2.5-flash",
            8192,
            0.2,
            40,
            0.9,
            "exhaustiva",
        ),
        TaskCategory::MetabolicResearch => (
            "gemini-2.5-pro",
            "gemini-2.5-flash",
            8192,
            0.25,
            40,
            0.9,
            "exhaustiva",
        ),
        TaskCategory::EpigeneticStudy => (
            "gemini-2.5-pro",
            "gemini-2.0-flash",
            8192,
            0.3,
            40,
            0.9,
            "profunda",
        ),
        TaskCategory::ClinicalSynthesis => (
            "gemini-2.5-pro",
            "gemini-2.5-flash",
            8192,
            0.2,
            32,
            0.85,
            "integradora",
        ),
        TaskCategory::LiteratureReview => (
            "gemini-2.5-flash",
            "gemini-2.0-flash",
            6144,
            0.35,
            40,
            0.95,
            "sistemática",
        ),
    };
    TaskStrategy {
        primary_model: primary.to_string(),
        fallback_model: fallback.to_string(),
        max_output_tokens: max_tokens,
        temperature,
        top_k,
        top_p,
        research_depth: depth.to_string(),
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            fallback_models: default_fallback_models(),
            cache_ttl_secs: default_cache_ttl_secs(),
            batch_size: default_batch_size(),
            connect_timeout_secs: None,
            request_timeout_secs: None,
            strategies: BTreeMap::new(),
        }
        .with_complete_strategies()
    }
}

impl ResearchConfig {
    /// Strategy for a category. Always present after loading.
    pub fn strategy(&self, category: TaskCategory) -> TaskStrategy {
        self.strategies
            .get(&category)
            .cloned()
            .unwrap_or_else(|| default_strategy(category))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Hard precondition for building a client: a non-empty API key.
    pub fn require_api_key(&self) -> Result<&str, InferenceError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(InferenceError::ConfigError {
                reason: format!("API key not configured (set {API_KEY_ENV})"),
            });
        }
        Ok(key)
    }

    /// Fill any category missing from the file with its built-in default.
    fn with_complete_strategies(mut self) -> Self {
        for category in TaskCategory::ALL {
            self.strategies
                .entry(category)
                .or_insert_with(|| default_strategy(category));
        }
        self
    }

    fn validate(self) -> Result<Self, InferenceError> {
        if self.batch_size == 0 {
            return Err(InferenceError::ConfigError {
                reason: "batch_size must be at least 1".into(),
            });
        }
        if self.fallback_models.is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "fallback_models must not be empty".into(),
            });
        }
        Ok(self)
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve a config path relative to the project root.
///
/// Searches upward from `start` for `config/research.yaml`. Checks
/// `NUTRIGEN_PROJECT_ROOT` first if set.
pub fn find_config_path(start: &Path) -> Result<PathBuf, InferenceError> {
    if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
        let candidate = PathBuf::from(&root).join(CONFIG_RELATIVE_PATH);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_RELATIVE_PATH);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(InferenceError::ConfigError {
        reason: format!("could not find {CONFIG_RELATIVE_PATH}"),
    })
}

/// Load and parse the research configuration file.
///
/// Performs environment-variable interpolation on string values matching
/// `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_research_config(path: &Path) -> Result<ResearchConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_research_config(&raw)
}

/// Parse configuration text (after interpolation) into a validated config.
pub fn parse_research_config(raw: &str) -> Result<ResearchConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);

    let mut config: ResearchConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    if config.api_key.trim().is_empty() {
        config.api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
    }

    config.with_complete_strategies().validate()
}

/// Locate and load the config starting from `start`, or fall back to
/// built-in defaults (API key from the environment) when no file exists.
pub fn load_or_default(start: &Path) -> Result<ResearchConfig, InferenceError> {
    match find_config_path(start) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "loading research config");
            load_research_config(&path)
        }
        Err(_) => {
            tracing::info!("no research config file found — using built-in defaults");
            Ok(ResearchConfig {
                api_key: std::env::var(API_KEY_ENV).unwrap_or_default(),
                ..ResearchConfig::default()
            })
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__NUTRIGEN_TEST_MISSING__");
        let result = interpolate_env_vars("${__NUTRIGEN_TEST_MISSING__:-fallback}");
        assert_eq!(result, "fallback");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__NUTRIGEN_TEST_VAR__", "secret");
        let result = interpolate_env_vars("key: ${__NUTRIGEN_TEST_VAR__:-nope}");
        assert_eq!(result, "key: secret");
        std::env::remove_var("__NUTRIGEN_TEST_VAR__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/data");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/data"));
    }

    #[test]
    fn test_default_config_has_every_strategy() {
        let config = ResearchConfig::default();
        for category in TaskCategory::ALL {
            assert_eq!(config.strategy(category), default_strategy(category));
        }
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_partial_strategies_are_completed() {
        let yaml = r#"
            api_key: "k"
            strategies:
              planning:
                primary_model: "custom-planner"
                fallback_model: "gemini-2.0-flash"
                max_output_tokens: 1024
                temperature: 0.1
                top_k: 10
                top_p: 0.5
                research_depth: "breve"
        "#;
        let config = parse_research_config(yaml).unwrap();
        assert_eq!(
            config.strategy(TaskCategory::Planning).primary_model,
            "custom-planner"
        );
        assert_eq!(
            config.strategy(TaskCategory::GeneticAnalysis),
            default_strategy(TaskCategory::GeneticAnalysis)
        );
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = parse_research_config(include_str!("../../config/research.yaml")).unwrap();
        assert_eq!(config.fallback_models.len(), 5);
        assert_eq!(config.batch_size, 3);
        for category in TaskCategory::ALL {
            assert_eq!(config.strategy(category), default_strategy(category));
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = parse_research_config("api_key: k\nbatch_size: 0\n");
        assert!(matches!(result, Err(InferenceError::ConfigError { .. })));
    }

    #[test]
    fn test_require_api_key() {
        let mut config = ResearchConfig::default();
        config.api_key = "  ".into();
        assert!(config.require_api_key().is_err());
        config.api_key = "abc".into();
        assert_eq!(config.require_api_key().unwrap(), "abc");
    }
}
