//! Event system for escalation runs.
//!
//! Provides hooks for metrics, logging, and custom reactions around each
//! attempt the selector makes.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::fetch::Classification;

use super::metrics::MetricsCollector;

/// Emitted right before a runner is invoked.
#[derive(Debug, Clone)]
pub struct AttemptStartedEvent {
    pub url: Url,
    pub strategy: String,
    pub try_number: u32,
    pub timestamp: DateTime<Utc>,
}

/// Emitted once the attempt has been classified.
#[derive(Debug, Clone)]
pub struct AttemptFinishedEvent {
    pub url: Url,
    pub strategy: String,
    pub status: Option<u16>,
    pub classification: Classification,
    pub reason: String,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub url: Url,
    pub strategy: String,
    pub next_try: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AcceptedEvent {
    pub url: Url,
    pub strategy: String,
    pub attempts: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExhaustedEvent {
    pub url: Url,
    pub attempts: usize,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum EscalationEvent {
    AttemptStarted(AttemptStartedEvent),
    AttemptFinished(AttemptFinishedEvent),
    Retry(RetryEvent),
    Accepted(AcceptedEvent),
    Exhausted(ExhaustedEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &EscalationEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: EscalationEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &EscalationEvent) {
        match event {
            EscalationEvent::AttemptStarted(started) => {
                log::debug!(
                    "-> {} try {} {}",
                    started.strategy,
                    started.try_number,
                    started.url
                );
            }
            EscalationEvent::AttemptFinished(finished) => {
                log::debug!(
                    "<- {} {} -> {} ({:.2}s)",
                    finished.strategy,
                    finished.url,
                    finished.reason,
                    finished.latency.as_secs_f64()
                );
            }
            EscalationEvent::Retry(retry) => {
                log::info!(
                    "retrying {} (try {}) after {}",
                    retry.strategy,
                    retry.next_try,
                    retry.reason
                );
            }
            EscalationEvent::Accepted(accepted) => {
                log::info!(
                    "{} accepted via {} after {} strategies",
                    accepted.url,
                    accepted.strategy,
                    accepted.attempts
                );
            }
            EscalationEvent::Exhausted(exhausted) => {
                log::warn!(
                    "{} exhausted {} strategies: {}",
                    exhausted.url,
                    exhausted.attempts,
                    exhausted.summary
                );
            }
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &EscalationEvent) {
        if let EscalationEvent::AttemptFinished(finished) = event {
            self.metrics
                .record_attempt(&finished.strategy, finished.classification, finished.latency);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(std::sync::Mutex<usize>);

    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &EscalationEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    fn finished(classification: Classification) -> EscalationEvent {
        EscalationEvent::AttemptFinished(AttemptFinishedEvent {
            url: Url::parse("https://example.com/api").unwrap(),
            strategy: "plain_headers".into(),
            status: Some(403),
            classification,
            reason: "blocked(403)".into(),
            latency: Duration::from_millis(120),
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn dispatches_to_handlers() {
        let mut dispatcher = EventDispatcher::new();
        let counter = Arc::new(CountingHandler(std::sync::Mutex::new(0)));
        dispatcher.register_handler(counter.clone());
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher.dispatch(finished(Classification::Blocked));
        assert_eq!(*counter.0.lock().unwrap(), 1);
    }

    #[test]
    fn metrics_handler_counts_finished_attempts() {
        let metrics = MetricsCollector::new();
        let handler = MetricsHandler::new(metrics.clone());
        handler.handle(&finished(Classification::Blocked));
        handler.handle(&EscalationEvent::Retry(RetryEvent {
            url: Url::parse("https://example.com/api").unwrap(),
            strategy: "plain_headers".into(),
            next_try: 2,
            reason: "timeout".into(),
            timestamp: Utc::now(),
        }));

        let stats = metrics.strategy("plain_headers").expect("stats recorded");
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.blocked, 1);
    }
}
