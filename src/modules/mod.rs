//! Cross-cutting services module
//!
//! Observability around escalation runs: structured events and per-strategy
//! metrics.

pub mod events;
pub mod metrics;

// Re-export commonly used types
pub use events::{
    AcceptedEvent, AttemptFinishedEvent, AttemptStartedEvent, EscalationEvent, EventDispatcher,
    EventHandler, ExhaustedEvent, LoggingHandler, MetricsHandler, RetryEvent,
};
pub use metrics::{GlobalStats, MetricsCollector, MetricsSnapshot, StrategyStats};
