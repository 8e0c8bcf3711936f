//! # escalator
//!
//! Cost-ordered fetch escalation for endpoints guarded by bot management.
//!
//! A request is tried with the cheapest strategy first (plain browser-shaped
//! headers) and only escalates through session priming, HTTP/2, TLS
//! impersonation and finally a real WebDriver-driven browser when the target
//! explicitly blocks the previous attempt.
//!
//! ## Features
//!
//! - Validated, cost-increasing escalation policies loadable from JSON
//! - Three-way classification of every attempt (accepted, blocked, inconclusive)
//! - Challenge detection for Akamai, Cloudflare, PerimeterX, DataDome and Imperva
//! - Firefox or Chromium browser fallback through fantoccini
//! - Per-strategy metrics and structured log events
//!
//! ## Example
//!
//! ```no_run
//! use escalator::index::{IndexQuery, fetch_index_comparison, spdji_policy};
//! use escalator::{BrowserEngine, EscalationSelector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let selector = EscalationSelector::new(spdji_policy(BrowserEngine::Firefox));
//!     let comparison = fetch_index_comparison(&selector, &IndexQuery::new("5457755")).await?;
//!     for perf in comparison.performances() {
//!         println!("{}: {:?}", perf.index_name, perf.index_value);
//!     }
//!     Ok(())
//! }
//! ```

mod escalation;

pub mod fetch;
pub mod index;
pub mod modules;
pub mod policy;
pub mod strategies;

pub use crate::escalation::{
    AcceptedFetch,
    AttemptLog,
    AttemptRecord,
    EscalationError,
    EscalationResult,
    EscalationSelector,
    EscalationSelectorBuilder,
};

pub use crate::fetch::{
    AttemptResult,
    AttemptRunner,
    BlockSignal,
    ChallengeDetector,
    Classification,
    FetchResponse,
    FetchTarget,
    InconclusiveCause,
    LiveRunner,
    ReqwestRunner,
    ResponseClassifier,
    TransportError,
    Verdict,
};

pub use crate::policy::{ConfigError, EscalationPolicy, PolicyConfig, PolicyError};

pub use crate::strategies::browser::{BrowserLauncher, BrowserPage, WebDriverLauncher};
pub use crate::strategies::headers::{BrowserType, HeaderProfile};
pub use crate::strategies::tls::TlsProfile;
pub use crate::strategies::{BrowserConfig, BrowserEngine, FetchStrategy, StrategyKind};

pub use crate::modules::{EventHandler, MetricsCollector, MetricsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
