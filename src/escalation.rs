//! Escalation selector.
//!
//! Walks an [`EscalationPolicy`] in order, runs each strategy through the
//! configured [`AttemptRunner`], classifies the outcome, and stops at the
//! first accepted response. Attempts never overlap and share no state.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;

use crate::fetch::{
	AttemptResult, AttemptRunner, Classification, FetchResponse, FetchTarget, LiveRunner,
	ResponseClassifier,
};
use crate::modules::events::{
	AcceptedEvent, AttemptFinishedEvent, AttemptStartedEvent, EscalationEvent, EventDispatcher,
	EventHandler, ExhaustedEvent, LoggingHandler, MetricsHandler, RetryEvent,
};
use crate::modules::metrics::MetricsCollector;
use crate::policy::{ConfigError, EscalationPolicy, PolicyConfig};
use crate::strategies::FetchStrategy;

const DEFAULT_INCONCLUSIVE_RETRIES: u32 = 1;

/// Result alias used across the escalation layer.
pub type EscalationResult<T> = Result<T, EscalationError>;

/// Terminal failures surfaced to the caller. Blocked and inconclusive
/// attempts are handled inside the selector and only show up in the log.
#[derive(Debug, Error)]
pub enum EscalationError {
	#[error("all {} strategies failed: {log}", .log.len())]
	Exhausted { log: AttemptLog },
}

impl EscalationError {
	/// Attempt log of the failed run.
	pub fn attempt_log(&self) -> &AttemptLog {
		let EscalationError::Exhausted { log } = self;
		log
	}
}

/// Final outcome of one strategy, including how many tries it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
	pub strategy: FetchStrategy,
	pub result: AttemptResult,
	pub tries: u32,
}

impl AttemptRecord {
	pub fn classification(&self) -> Classification {
		self.result.classification()
	}
}

/// One record per strategy attempted, in policy order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptLog {
	records: Vec<AttemptRecord>,
}

impl AttemptLog {
	fn push(&mut self, record: AttemptRecord) {
		self.records.push(record);
	}

	pub fn records(&self) -> &[AttemptRecord] {
		&self.records
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &AttemptRecord> {
		self.records.iter()
	}

	pub fn last(&self) -> Option<&AttemptRecord> {
		self.records.last()
	}

	pub fn classifications(&self) -> Vec<Classification> {
		self.records.iter().map(AttemptRecord::classification).collect()
	}
}

impl fmt::Display for AttemptLog {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (index, record) in self.records.iter().enumerate() {
			if index > 0 {
				f.write_str(", ")?;
			}
			write!(f, "{}={}", record.strategy.label(), record.result.verdict)?;
		}
		Ok(())
	}
}

/// Successful escalation run.
#[derive(Debug, Clone)]
pub struct AcceptedFetch {
	pub strategy: FetchStrategy,
	pub response: FetchResponse,
	/// Parsed body, present when the target expects JSON.
	pub json: Option<Value>,
	pub log: AttemptLog,
}

/// Fluent builder for [`EscalationSelector`].
pub struct EscalationSelectorBuilder {
	policy: EscalationPolicy,
	runner: Option<Arc<dyn AttemptRunner>>,
	classifier: ResponseClassifier,
	max_inconclusive_retries: u32,
	handlers: Vec<Arc<dyn EventHandler>>,
	enable_logging: bool,
	enable_metrics: bool,
}

impl EscalationSelectorBuilder {
	pub fn new(policy: EscalationPolicy) -> Self {
		Self {
			policy,
			runner: None,
			classifier: ResponseClassifier::default(),
			max_inconclusive_retries: DEFAULT_INCONCLUSIVE_RETRIES,
			handlers: Vec::new(),
			enable_logging: true,
			enable_metrics: true,
		}
	}

	pub fn with_runner(mut self, runner: Arc<dyn AttemptRunner>) -> Self {
		self.runner = Some(runner);
		self
	}

	pub fn with_classifier(mut self, classifier: ResponseClassifier) -> Self {
		self.classifier = classifier;
		self
	}

	/// Extra tries granted to a strategy whose attempt was inconclusive.
	pub fn with_max_inconclusive_retries(mut self, retries: u32) -> Self {
		self.max_inconclusive_retries = retries;
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn disable_logging(mut self) -> Self {
		self.enable_logging = false;
		self
	}

	pub fn disable_metrics(mut self) -> Self {
		self.enable_metrics = false;
		self
	}

	pub fn build(self) -> EscalationSelector {
		let metrics = self.enable_metrics.then(MetricsCollector::new);

		let mut events = EventDispatcher::new();
		if self.enable_logging {
			events.register_handler(Arc::new(LoggingHandler));
		}
		if let Some(ref collector) = metrics {
			events.register_handler(Arc::new(MetricsHandler::new(collector.clone())));
		}
		for handler in self.handlers {
			events.register_handler(handler);
		}

		EscalationSelector {
			policy: self.policy,
			runner: self
				.runner
				.unwrap_or_else(|| Arc::new(LiveRunner::default())),
			classifier: self.classifier,
			max_inconclusive_retries: self.max_inconclusive_retries,
			metrics,
			events,
		}
	}
}

/// Runs a policy against a target, cheapest strategy first.
pub struct EscalationSelector {
	policy: EscalationPolicy,
	runner: Arc<dyn AttemptRunner>,
	classifier: ResponseClassifier,
	max_inconclusive_retries: u32,
	metrics: Option<MetricsCollector>,
	events: EventDispatcher,
}

impl EscalationSelector {
	/// Selector with the live runner and default settings.
	pub fn new(policy: EscalationPolicy) -> Self {
		EscalationSelectorBuilder::new(policy).build()
	}

	pub fn builder(policy: EscalationPolicy) -> EscalationSelectorBuilder {
		EscalationSelectorBuilder::new(policy)
	}

	/// Builder seeded from a [`PolicyConfig`], applying its retry override.
	pub fn from_config(config: &PolicyConfig) -> Result<EscalationSelectorBuilder, ConfigError> {
		let mut builder = EscalationSelectorBuilder::new(config.policy()?);
		if let Some(retries) = config.max_inconclusive_retries {
			builder = builder.with_max_inconclusive_retries(retries);
		}
		Ok(builder)
	}

	pub fn policy(&self) -> &EscalationPolicy {
		&self.policy
	}

	/// Metrics gathered across every `fetch` call, unless disabled.
	pub fn metrics(&self) -> Option<&MetricsCollector> {
		self.metrics.as_ref()
	}

	/// Fetch `target`, escalating through the policy until a response is
	/// accepted. Strategies after the accepted one are never attempted.
	pub async fn fetch(&self, target: &FetchTarget) -> EscalationResult<AcceptedFetch> {
		let mut log = AttemptLog::default();

		for strategy in &self.policy {
			let label = strategy.label();
			let mut tries = 0u32;

			loop {
				tries += 1;

				self.events.dispatch(EscalationEvent::AttemptStarted(AttemptStartedEvent {
					url: target.url.clone(),
					strategy: label.clone(),
					try_number: tries,
					timestamp: chrono::Utc::now(),
				}));

				let started = Instant::now();
				let outcome = self.runner.run(strategy, target).await;
				let latency = started.elapsed();

				let assessment = self.classifier.assess(&outcome, target.expect_json);
				let classification = assessment.result.classification();

				self.events.dispatch(EscalationEvent::AttemptFinished(AttemptFinishedEvent {
					url: target.url.clone(),
					strategy: label.clone(),
					status: assessment.result.status,
					classification,
					reason: assessment.result.verdict.to_string(),
					latency,
					timestamp: chrono::Utc::now(),
				}));

				if let (Classification::Accepted, Ok(response)) = (classification, outcome) {
					log.push(AttemptRecord {
						strategy: strategy.clone(),
						result: assessment.result,
						tries,
					});

					self.events.dispatch(EscalationEvent::Accepted(AcceptedEvent {
						url: target.url.clone(),
						strategy: label,
						attempts: log.len(),
						timestamp: chrono::Utc::now(),
					}));

					return Ok(AcceptedFetch {
						strategy: strategy.clone(),
						response,
						json: assessment.json,
						log,
					});
				}

				if classification == Classification::Inconclusive
					&& tries <= self.max_inconclusive_retries
				{
					self.events.dispatch(EscalationEvent::Retry(RetryEvent {
						url: target.url.clone(),
						strategy: label.clone(),
						next_try: tries + 1,
						reason: assessment.result.verdict.to_string(),
						timestamp: chrono::Utc::now(),
					}));
					continue;
				}

				log.push(AttemptRecord {
					strategy: strategy.clone(),
					result: assessment.result,
					tries,
				});
				break;
			}
		}

		self.events.dispatch(EscalationEvent::Exhausted(ExhaustedEvent {
			url: target.url.clone(),
			attempts: log.len(),
			summary: log.to_string(),
			timestamp: chrono::Utc::now(),
		}));

		Err(EscalationError::Exhausted { log })
	}
}
