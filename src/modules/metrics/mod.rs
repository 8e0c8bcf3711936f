//! Metrics collection utilities.
//!
//! Aggregates per-strategy attempt counts and latencies so callers can see
//! which rungs of a policy actually pay off.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::fetch::Classification;

const DEFAULT_WINDOW: usize = 128;

/// Totals across all strategies.
#[derive(Debug, Clone)]
pub struct GlobalStats {
    pub started_at: DateTime<Utc>,
    pub total_attempts: u64,
    pub accepted: u64,
    pub blocked: u64,
    pub inconclusive: u64,
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            total_attempts: 0,
            accepted: 0,
            blocked: 0,
            inconclusive: 0,
        }
    }
}

/// Strategy-scoped metrics snapshot.
#[derive(Debug, Clone)]
pub struct StrategyStats {
    pub strategy: String,
    pub attempts: u64,
    pub accepted: u64,
    pub blocked: u64,
    pub inconclusive: u64,
    pub average_latency: Option<Duration>,
    pub last_classification: Option<Classification>,
}

impl StrategyStats {
    fn from_accumulator(strategy: &str, acc: &StrategyAccumulator) -> Self {
        Self {
            strategy: strategy.to_string(),
            attempts: acc.attempts,
            accepted: acc.accepted,
            blocked: acc.blocked,
            inconclusive: acc.inconclusive,
            average_latency: acc.average_latency(),
            last_classification: acc.last_classification,
        }
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub global: GlobalStats,
    pub strategies: Vec<StrategyStats>,
}

#[derive(Debug)]
struct StrategyAccumulator {
    attempts: u64,
    accepted: u64,
    blocked: u64,
    inconclusive: u64,
    latencies: VecDeque<Duration>,
    max_window: usize,
    last_classification: Option<Classification>,
}

impl StrategyAccumulator {
    fn new(max_window: usize) -> Self {
        Self {
            attempts: 0,
            accepted: 0,
            blocked: 0,
            inconclusive: 0,
            latencies: VecDeque::with_capacity(max_window),
            max_window,
            last_classification: None,
        }
    }

    fn record(&mut self, classification: Classification, latency: Duration) {
        self.attempts += 1;
        self.last_classification = Some(classification);
        match classification {
            Classification::Accepted => self.accepted += 1,
            Classification::Blocked => self.blocked += 1,
            Classification::Inconclusive => self.inconclusive += 1,
        }

        if self.latencies.len() == self.max_window {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }

    fn average_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }
}

#[derive(Debug)]
struct MetricsState {
    global: GlobalStats,
    max_window: usize,
    strategies: HashMap<String, StrategyAccumulator>,
}

impl MetricsState {
    fn new(max_window: usize) -> Self {
        Self {
            global: GlobalStats::default(),
            max_window,
            strategies: HashMap::new(),
        }
    }
}

/// Thread-safe metrics collector shared with the event handler.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Number of latency samples kept per strategy (at least 16).
    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(window.max(16)))),
        }
    }

    fn state(&self) -> MutexGuard<'_, MetricsState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_attempt(&self, strategy: &str, classification: Classification, latency: Duration) {
        let mut guard = self.state();
        guard.global.total_attempts += 1;
        match classification {
            Classification::Accepted => guard.global.accepted += 1,
            Classification::Blocked => guard.global.blocked += 1,
            Classification::Inconclusive => guard.global.inconclusive += 1,
        }

        let window = guard.max_window;
        guard
            .strategies
            .entry(strategy.to_string())
            .or_insert_with(|| StrategyAccumulator::new(window))
            .record(classification, latency);
    }

    pub fn strategy(&self, strategy: &str) -> Option<StrategyStats> {
        let guard = self.state();
        guard
            .strategies
            .get(strategy)
            .map(|acc| StrategyStats::from_accumulator(strategy, acc))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.state();
        let mut strategies: Vec<_> = guard
            .strategies
            .iter()
            .map(|(strategy, acc)| StrategyStats::from_accumulator(strategy, acc))
            .collect();
        strategies.sort_by(|a, b| a.strategy.cmp(&b.strategy));
        MetricsSnapshot {
            global: guard.global.clone(),
            strategies,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_per_strategy_outcomes() {
        let metrics = MetricsCollector::new();
        metrics.record_attempt("plain_headers", Classification::Blocked, Duration::from_millis(100));
        metrics.record_attempt("plain_headers", Classification::Inconclusive, Duration::from_millis(300));
        metrics.record_attempt(
            "browser_automation(firefox)",
            Classification::Accepted,
            Duration::from_secs(12),
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.global.total_attempts, 3);
        assert_eq!(snapshot.global.accepted, 1);

        let plain = metrics.strategy("plain_headers").unwrap();
        assert_eq!(plain.attempts, 2);
        assert_eq!(plain.blocked, 1);
        assert_eq!(plain.inconclusive, 1);
        assert_eq!(plain.average_latency, Some(Duration::from_millis(200)));
        assert_eq!(plain.acceptance_rate(), 0.0);

        let browser = metrics.strategy("browser_automation(firefox)").unwrap();
        assert_eq!(browser.last_classification, Some(Classification::Accepted));
        assert_eq!(browser.acceptance_rate(), 1.0);
    }

    #[test]
    fn latency_window_is_bounded() {
        let metrics = MetricsCollector::with_window(16);
        for _ in 0..40 {
            metrics.record_attempt("http2_client", Classification::Blocked, Duration::from_secs(1));
        }
        metrics.record_attempt("http2_client", Classification::Blocked, Duration::from_secs(1));
        let stats = metrics.strategy("http2_client").unwrap();
        assert_eq!(stats.attempts, 41);
        assert_eq!(stats.average_latency, Some(Duration::from_secs(1)));
    }
}
