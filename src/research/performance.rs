//! Per-model outcome statistics and best-model selection.
//!
//! Every invocation attempt (success or failure) is recorded. Latency and
//! confidence are exponentially smoothed (0.9 old / 0.1 new). Records are
//! never deleted for the lifetime of the tracker.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::TaskCategory;
use crate::inference::config::ResearchConfig;

/// Weight kept from the previous average on each update.
const SMOOTHING_OLD_WEIGHT: f64 = 0.9;

/// Score multiplier for a model that has already served the task category.
const SPECIALIZATION_BONUS: f64 = 1.2;

// ─── ModelSelector ──────────────────────────────────────────────────────────

/// Outcome bookkeeping and model choice, as seen by the invoker and the
/// orchestrator.
pub trait ModelSelector: Send + Sync {
    /// Record one attempt. Never fails.
    fn record_outcome(
        &self,
        model_id: &str,
        category: TaskCategory,
        success: bool,
        latency_ms: u64,
        confidence: f64,
    );

    /// The preferred model id for a category.
    fn best_model_for(&self, category: TaskCategory) -> String;
}

// ─── Records ────────────────────────────────────────────────────────────────

/// Rolling statistics for one model id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPerformanceRecord {
    pub model_id: String,
    pub success_count: u64,
    pub error_count: u64,
    pub total_requests: u64,
    pub avg_latency_ms: f64,
    pub avg_confidence: f64,
    pub last_used_at: DateTime<Utc>,
    pub categories_seen: BTreeSet<TaskCategory>,
}

impl ModelPerformanceRecord {
    fn new(model_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            model_id: model_id.to_string(),
            success_count: 0,
            error_count: 0,
            total_requests: 0,
            avg_latency_ms: 0.0,
            avg_confidence: 0.0,
            last_used_at: now,
            categories_seen: BTreeSet::new(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_requests as f64
        }
    }

    /// Success rate × smoothed confidence, boosted when the model has
    /// already served `category`.
    pub fn score_for(&self, category: TaskCategory) -> f64 {
        let bonus = if self.categories_seen.contains(&category) {
            SPECIALIZATION_BONUS
        } else {
            1.0
        };
        self.success_rate() * self.avg_confidence * bonus
    }

    fn apply(
        &mut self,
        category: TaskCategory,
        success: bool,
        latency_ms: u64,
        confidence: f64,
        now: DateTime<Utc>,
    ) {
        // The first observation seeds the averages.
        if self.total_requests == 0 {
            self.avg_latency_ms = latency_ms as f64;
            self.avg_confidence = confidence;
        } else {
            self.avg_latency_ms = smooth(self.avg_latency_ms, latency_ms as f64);
            self.avg_confidence = smooth(self.avg_confidence, confidence);
        }
        self.total_requests += 1;
        if success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
        self.last_used_at = now;
        self.categories_seen.insert(category);
    }
}

fn smooth(old: f64, new: f64) -> f64 {
    old * SMOOTHING_OLD_WEIGHT + new * (1.0 - SMOOTHING_OLD_WEIGHT)
}

// ─── PerformanceTracker ─────────────────────────────────────────────────────

/// Process-wide tracker, shared by every invocation of one service.
pub struct PerformanceTracker {
    /// Primary/fallback pair per category, fixed at construction.
    candidates: HashMap<TaskCategory, (String, String)>,
    records: Mutex<HashMap<String, ModelPerformanceRecord>>,
}

impl PerformanceTracker {
    pub fn new(config: &ResearchConfig) -> Self {
        let candidates = TaskCategory::ALL
            .iter()
            .map(|&category| {
                let strategy = config.strategy(category);
                (category, (strategy.primary_model, strategy.fallback_model))
            })
            .collect();
        Self {
            candidates,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Copy of the record for one model, if it has been used.
    pub fn record(&self, model_id: &str) -> Option<ModelPerformanceRecord> {
        self.lock().get(model_id).cloned()
    }

    /// All records, sorted by model id.
    pub fn snapshot(&self) -> Vec<ModelPerformanceRecord> {
        let mut records: Vec<_> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        records
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ModelPerformanceRecord>> {
        // Plain last-write-wins bookkeeping: a poisoned lock still holds usable data.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ModelSelector for PerformanceTracker {
    fn record_outcome(
        &self,
        model_id: &str,
        category: TaskCategory,
        success: bool,
        latency_ms: u64,
        confidence: f64,
    ) {
        let now = Utc::now();
        let mut records = self.lock();
        let record = records
            .entry(model_id.to_string())
            .or_insert_with(|| ModelPerformanceRecord::new(model_id, now));
        record.apply(category, success, latency_ms, confidence, now);

        tracing::debug!(
            model = model_id,
            category = %category,
            success,
            latency_ms,
            success_rate = record.success_rate(),
            avg_confidence = record.avg_confidence,
            "model outcome recorded"
        );
    }

    fn best_model_for(&self, category: TaskCategory) -> String {
        let Some((primary, fallback)) = self.candidates.get(&category) else {
            // Unreachable for a tracker built from a complete config.
            return String::new();
        };
        let records = self.lock();
        let primary_score = records.get(primary).map(|r| r.score_for(category));
        let fallback_score = records.get(fallback).map(|r| r.score_for(category));

        // An unseen model takes the other's score, so it never loses to it;
        // ties resolve to the primary.
        let (p, f) = match (primary_score, fallback_score) {
            (Some(p), Some(f)) => (p, f),
            (Some(p), None) => (p, p),
            (None, Some(f)) => (f, f),
            (None, None) => (0.0, 0.0),
        };
        if f > p {
            fallback.clone()
        } else {
            primary.clone()
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
