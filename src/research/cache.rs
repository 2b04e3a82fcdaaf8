//! Time-bounded response cache.
//!
//! Entries are keyed by (task category, normalized input, requested model id)
//! and are valid for a fixed TTL (one hour by default). `get` skips stale
//! entries without removing them; `sweep_expired` removes them on demand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::types::{TaskCategory, TaskInput};
use crate::inference::invoker::ModelResponse;

// ─── Clock ──────────────────────────────────────────────────────────────────

/// Source of "now" for TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ─── ResponseStore ──────────────────────────────────────────────────────────

/// Cache interface used by the invoker.
pub trait ResponseStore: Send + Sync {
    /// A fresh cached response, or `None` on miss/expiry.
    fn get(&self, key: &str) -> Option<ModelResponse>;

    /// Insert or overwrite an entry.
    fn set(
        &self,
        key: &str,
        value: ModelResponse,
        model_id: &str,
        confidence: f64,
        genotype_scoped: bool,
    );
}

/// Derive the cache key for a task.
///
/// The key covers the category, the normalized input and the *requested*
/// model id, so entries are never shared across models.
pub fn cache_key(category: TaskCategory, input: &TaskInput, model_id: &str) -> String {
    let normalized = serde_json::to_string(&input.normalized()).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized.as_bytes());
    hasher.update([0u8]);
    hasher.update(model_id.as_bytes());
    let digest = hasher.finalize();
    format!("{}:{digest:x}", category.as_str())
}

// ─── ResponseCache ──────────────────────────────────────────────────────────

/// One cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: ModelResponse,
    pub created_at: DateTime<Utc>,
    pub model_id: String,
    pub confidence: f64,
    pub genotype_scoped: bool,
}

/// In-memory TTL cache shared by one service instance.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Cache with the given TTL, using wall-clock time.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            clock,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at < self.ttl
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.created_at < self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!(removed, remaining = entries.len(), "swept expired cache entries");
        }
        removed
    }

    /// Purge all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including stale ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResponseStore for ResponseCache {
    fn get(&self, key: &str) -> Option<ModelResponse> {
        let now = self.clock.now();
        let entries = self.lock();
        let entry = entries.get(key)?;
        if self.is_fresh(entry, now) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn set(
        &self,
        key: &str,
        value: ModelResponse,
        model_id: &str,
        confidence: f64,
        genotype_scoped: bool,
    ) {
        let entry = CacheEntry {
            value,
            created_at: self.clock.now(),
            model_id: model_id.to_string(),
            confidence,
            genotype_scoped,
        };
        self.lock().insert(key.to_string(), entry);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
