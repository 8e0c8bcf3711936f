//! Core data structures shared by runners, the classifier, and the selector.

use bytes::Bytes;
use http::HeaderMap;
use url::Url;

/// Resource the selector is asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: Url,
    pub expect_json: bool,
    pub referer: Option<Url>,
}

impl FetchTarget {
    /// Target expecting a JSON body.
    pub fn json(url: Url) -> Self {
        Self {
            url,
            expect_json: true,
            referer: None,
        }
    }

    /// Target accepting any successful body.
    pub fn any(url: Url) -> Self {
        Self {
            url,
            expect_json: false,
            referer: None,
        }
    }

    pub fn with_referer(mut self, referer: Url) -> Self {
        self.referer = Some(referer);
        self
    }
}

/// Minimal representation of an HTTP response produced by any runner.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl FetchResponse {
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>, url: Url) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            url,
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
