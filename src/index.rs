//! S&P Dow Jones Indices comparison endpoint.
//!
//! The endpoint sits behind bot management that rejects plain HTTP clients,
//! so requests go through an [`EscalationSelector`] and the accepted JSON is
//! decoded into [`IndexComparison`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::escalation::{AcceptedFetch, EscalationError, EscalationSelector};
use crate::fetch::FetchTarget;
use crate::policy::EscalationPolicy;
use crate::strategies::tls::TlsProfile;
use crate::strategies::{BrowserConfig, BrowserEngine, FetchStrategy};

pub const SPDJI_HOME: &str = "https://www.spglobal.com/spdji/en/";
pub const SPDJI_COMPARISON_URL: &str =
    "https://www.spglobal.com/spdji/en/util/redesign/get-index-comparison-data.dot";

pub const DEFAULT_PERIOD: &str = "tenYearFlag";
pub const DEFAULT_LANGUAGE_ID: &str = "1";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Escalation(#[from] EscalationError),
    #[error("failed to decode index comparison: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("index service reported failure: {messages}")]
    Rejected { messages: Value },
}

/// Parameters of one comparison request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    pub index_id: String,
    pub period: String,
    pub language_id: String,
}

impl IndexQuery {
    pub fn new(index_id: impl Into<String>) -> Self {
        Self {
            index_id: index_id.into(),
            period: DEFAULT_PERIOD.to_string(),
            language_id: DEFAULT_LANGUAGE_ID.to_string(),
        }
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = period.into();
        self
    }

    pub fn with_language_id(mut self, language_id: impl Into<String>) -> Self {
        self.language_id = language_id.into();
        self
    }

    pub fn url(&self) -> Url {
        let mut url = spdji_url(SPDJI_COMPARISON_URL);
        url.query_pairs_mut()
            .append_pair("compareArray", &self.index_id)
            .append_pair("periodFlag", &self.period)
            .append_pair("language_id", &self.language_id);
        url
    }

    /// JSON target referred from the SPDJI home page.
    pub fn target(&self) -> FetchTarget {
        FetchTarget::json(self.url()).with_referer(spdji_url(SPDJI_HOME))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexComparison {
    pub status: bool,
    #[serde(default)]
    pub service_messages: Value,
    #[serde(default)]
    pub performance_comparison_holder: Option<PerformanceComparisonHolder>,
}

impl IndexComparison {
    pub fn performances(&self) -> &[IndexPerformance] {
        self.performance_comparison_holder
            .as_ref()
            .map(|holder| holder.index_performance_for_comparison.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceComparisonHolder {
    #[serde(default)]
    pub index_performance_for_comparison: Vec<IndexPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPerformance {
    pub index_name: String,
    pub index_value: Option<f64>,
    pub daily_return: Option<f64>,
    pub year_to_date_return: Option<f64>,
    pub one_year_return: Option<f64>,
}

/// Full ladder for the SPDJI site: Firefox headers, priming on the home
/// page, then the given browser engine as last resort. The browser runs
/// with a visible window.
pub fn spdji_policy(engine: BrowserEngine) -> EscalationPolicy {
    let home = spdji_url(SPDJI_HOME);
    EscalationPolicy::new(vec![
        FetchStrategy::plain_headers(),
        FetchStrategy::session_cookies(home.clone()),
        FetchStrategy::http2_client(Some(home.clone())),
        FetchStrategy::tls_impersonation(TlsProfile::firefox(), Some(home)),
        FetchStrategy::BrowserAutomation(BrowserConfig::new(engine).headful()),
    ])
    .expect("SPDJI policy is ordered by cost")
}

/// Fetch and decode one comparison through `selector`.
pub async fn fetch_index_comparison(
    selector: &EscalationSelector,
    query: &IndexQuery,
) -> Result<IndexComparison, IndexError> {
    let accepted = selector.fetch(&query.target()).await?;
    decode_comparison(&accepted)
}

fn decode_comparison(accepted: &AcceptedFetch) -> Result<IndexComparison, IndexError> {
    let comparison: IndexComparison = match &accepted.json {
        Some(json) => serde_json::from_value(json.clone())?,
        None => serde_json::from_slice(&accepted.response.body)?,
    };

    if !comparison.status {
        return Err(IndexError::Rejected {
            messages: comparison.service_messages,
        });
    }

    Ok(comparison)
}

fn spdji_url(raw: &'static str) -> Url {
    Url::parse(raw).expect("SPDJI URLs are valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{AttemptRunner, FetchResponse, TransportError};
    use async_trait::async_trait;
    use http::HeaderMap;
    use std::sync::Arc;

    const PAYLOAD: &str = r#"{
        "status": true,
        "serviceMessages": [],
        "performanceComparisonHolder": {
            "indexPerformanceForComparison": [{
                "indexName": "S&P/TSX Composite Index",
                "indexValue": 25431.87,
                "dailyReturn": 0.4521,
                "yearToDateReturn": 18.2101,
                "oneYearReturn": 24.9877,
                "indexId": 5457755
            }]
        }
    }"#;

    struct FixedRunner(&'static str);

    #[async_trait]
    impl AttemptRunner for FixedRunner {
        async fn run(
            &self,
            _strategy: &FetchStrategy,
            target: &FetchTarget,
        ) -> Result<FetchResponse, TransportError> {
            Ok(FetchResponse::new(
                200,
                HeaderMap::new(),
                self.0,
                target.url.clone(),
            ))
        }
    }

    #[test]
    fn query_url_carries_parameters() {
        let query = IndexQuery::new("5457755");
        assert_eq!(
            query.url().as_str(),
            "https://www.spglobal.com/spdji/en/util/redesign/get-index-comparison-data.dot?compareArray=5457755&periodFlag=tenYearFlag&language_id=1"
        );

        let target = query.with_period("oneYearFlag").target();
        assert!(target.expect_json);
        assert_eq!(target.referer.unwrap().as_str(), SPDJI_HOME);
        assert!(target.url.as_str().contains("periodFlag=oneYearFlag"));
    }

    #[test]
    fn policy_has_every_level() {
        let policy = spdji_policy(BrowserEngine::Chromium);
        let labels: Vec<_> = policy.iter().map(FetchStrategy::label).collect();
        assert_eq!(
            labels,
            vec![
                "plain_headers",
                "session_cookies",
                "http2_client",
                "tls_impersonation",
                "browser_automation(chromium)"
            ]
        );

        let FetchStrategy::BrowserAutomation(browser) = &policy.strategies()[4] else {
            panic!("last rung drives a browser");
        };
        assert_eq!(browser.engine, BrowserEngine::Chromium);
        assert!(!browser.headless);
    }

    #[tokio::test]
    async fn decodes_accepted_payload() {
        let selector = EscalationSelector::builder(spdji_policy(BrowserEngine::Firefox))
            .with_runner(Arc::new(FixedRunner(PAYLOAD)))
            .disable_logging()
            .build();

        let comparison = fetch_index_comparison(&selector, &IndexQuery::new("5457755"))
            .await
            .unwrap();

        let perf = &comparison.performances()[0];
        assert_eq!(perf.index_name, "S&P/TSX Composite Index");
        assert_eq!(perf.one_year_return, Some(24.9877));
    }

    #[tokio::test]
    async fn false_status_is_rejected() {
        let selector = EscalationSelector::builder(spdji_policy(BrowserEngine::Firefox))
            .with_runner(Arc::new(FixedRunner(
                r#"{"status": false, "serviceMessages": ["Invalid index id"]}"#,
            )))
            .disable_logging()
            .build();

        let err = fetch_index_comparison(&selector, &IndexQuery::new("0"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Rejected { .. }));
        assert!(err.to_string().contains("Invalid index id"));
    }
}
