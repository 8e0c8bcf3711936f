//! Attempt execution contract.
//!
//! A runner performs exactly one attempt for one strategy and hands the raw
//! outcome back; judging that outcome is the classifier's job.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::strategies::FetchStrategy;
use crate::strategies::browser::{BrowserLauncher, WebDriverLauncher, run_browser_attempt};

use super::reqwest_client::ReqwestRunner;
use super::types::{FetchResponse, FetchTarget};

/// Contract that abstracts how a single strategy attempt reaches the target.
///
/// Implementations must not share cookies or connections between calls;
/// every attempt starts from a clean client.
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn run(
        &self,
        strategy: &FetchStrategy,
        target: &FetchTarget,
    ) -> Result<FetchResponse, TransportError>;
}

/// Failures raised before a usable response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("failed to convert header '{0}'")]
    InvalidHeader(String),
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),
    #[error("browser command failed: {0}")]
    Browser(String),
    #[error("runner cannot execute strategy '{0}'")]
    Unsupported(String),
}

/// Production runner: reqwest for the HTTP strategies, WebDriver for browser
/// automation.
#[derive(Clone)]
pub struct LiveRunner {
    http: ReqwestRunner,
    browser: Arc<dyn BrowserLauncher>,
}

impl LiveRunner {
    pub fn new() -> Self {
        Self {
            http: ReqwestRunner::new(),
            browser: Arc::new(WebDriverLauncher::default()),
        }
    }

    pub fn with_http(mut self, http: ReqwestRunner) -> Self {
        self.http = http;
        self
    }

    pub fn with_browser_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = launcher;
        self
    }
}

impl Default for LiveRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttemptRunner for LiveRunner {
    async fn run(
        &self,
        strategy: &FetchStrategy,
        target: &FetchTarget,
    ) -> Result<FetchResponse, TransportError> {
        match strategy {
            FetchStrategy::BrowserAutomation(config) => {
                run_browser_attempt(self.browser.as_ref(), config, target).await
            }
            other => self.http.run(other, target).await,
        }
    }
}
