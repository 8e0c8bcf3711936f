//! Escalation policies and their JSON configuration.
//!
//! A policy is the ordered list of strategies tried for one site. It is fixed
//! at construction and must climb strictly in cost.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategies::FetchStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("policy must contain at least one strategy")]
    Empty,
    #[error("strategy '{next}' at position {position} does not cost more than '{previous}'")]
    NonIncreasingCost {
        position: usize,
        previous: String,
        next: String,
    },
}

/// Ordered, strictly cost-increasing sequence of strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    strategies: Vec<FetchStrategy>,
}

impl EscalationPolicy {
    pub fn new(strategies: Vec<FetchStrategy>) -> Result<Self, PolicyError> {
        if strategies.is_empty() {
            return Err(PolicyError::Empty);
        }

        for (index, pair) in strategies.windows(2).enumerate() {
            if pair[1].cost() <= pair[0].cost() {
                return Err(PolicyError::NonIncreasingCost {
                    position: index + 1,
                    previous: pair[0].label(),
                    next: pair[1].label(),
                });
            }
        }

        Ok(Self { strategies })
    }

    pub fn strategies(&self) -> &[FetchStrategy] {
        &self.strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FetchStrategy> {
        self.strategies.iter()
    }
}

impl<'a> IntoIterator for &'a EscalationPolicy {
    type Item = &'a FetchStrategy;
    type IntoIter = std::slice::Iter<'a, FetchStrategy>;

    fn into_iter(self) -> Self::IntoIter {
        self.strategies.iter()
    }
}

impl TryFrom<Vec<FetchStrategy>> for EscalationPolicy {
    type Error = PolicyError;

    fn try_from(strategies: Vec<FetchStrategy>) -> Result<Self, Self::Error> {
        Self::new(strategies)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid policy json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),
}

/// Serialisable form of a policy plus selector tuning.
///
/// ```json
/// {
///   "max_inconclusive_retries": 1,
///   "strategies": [
///     { "strategy": "plain_headers" },
///     { "strategy": "session_cookies", "home": "https://example.com/" },
///     { "strategy": "browser_automation", "engine": "firefox", "challenge_wait_ms": 10000 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub strategies: Vec<FetchStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_inconclusive_retries: Option<u32>,
}

impl PolicyConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn policy(&self) -> Result<EscalationPolicy, ConfigError> {
        Ok(EscalationPolicy::new(self.strategies.clone())?)
    }
}

impl From<&EscalationPolicy> for PolicyConfig {
    fn from(policy: &EscalationPolicy) -> Self {
        Self {
            strategies: policy.strategies.clone(),
            max_inconclusive_retries: None,
        }
    }
}
