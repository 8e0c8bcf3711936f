//! Browser-shaped header profiles.
//!
//! Responsibilities:
//! - Provide header sets that match what a real desktop browser sends on a
//!   top-level navigation.
//! - Derive the same-origin variant used for API calls made after a session
//!   has been primed.
//! - Convert into transport header maps while preserving insertion order.

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Browser families header and TLS profiles can be shaped after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserType {
    Firefox,
    Chrome,
    Safari,
}

/// Ordered list of request headers sent with every request of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderProfile {
    pub browser: BrowserType,
    pub entries: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("invalid header name '{0}'")]
    InvalidName(String),
    #[error("invalid value for header '{0}'")]
    InvalidValue(String),
}

impl HeaderProfile {
    pub fn new(browser: BrowserType, entries: Vec<(String, String)>) -> Self {
        Self { browser, entries }
    }

    /// Firefox 147 on macOS, as captured from a real navigation.
    pub fn firefox() -> Self {
        Self::from_static(
            BrowserType::Firefox,
            &[
                (
                    "User-Agent",
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:147.0) Gecko/20100101 Firefox/147.0",
                ),
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                ),
                ("Accept-Language", "en-CA,en-US;q=0.9,en;q=0.8"),
                ("Accept-Encoding", "gzip, deflate, br, zstd"),
                ("DNT", "1"),
                ("Upgrade-Insecure-Requests", "1"),
                ("Sec-Fetch-Dest", "document"),
                ("Sec-Fetch-Mode", "navigate"),
                ("Sec-Fetch-Site", "none"),
                ("Sec-Fetch-User", "?1"),
                ("Sec-GPC", "1"),
                ("Priority", "u=0, i"),
            ],
        )
    }

    /// Chrome 131 on macOS.
    pub fn chrome() -> Self {
        Self::from_static(
            BrowserType::Chrome,
            &[
                (
                    "sec-ch-ua",
                    "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
                ),
                ("sec-ch-ua-mobile", "?0"),
                ("sec-ch-ua-platform", "\"macOS\""),
                ("Upgrade-Insecure-Requests", "1"),
                (
                    "User-Agent",
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
                ),
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
                ),
                ("Sec-Fetch-Site", "none"),
                ("Sec-Fetch-Mode", "navigate"),
                ("Sec-Fetch-User", "?1"),
                ("Sec-Fetch-Dest", "document"),
                ("Accept-Encoding", "gzip, deflate, br, zstd"),
                ("Accept-Language", "en-US,en;q=0.9"),
                ("Priority", "u=0, i"),
            ],
        )
    }

    /// Safari 18 on macOS.
    pub fn safari() -> Self {
        Self::from_static(
            BrowserType::Safari,
            &[
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                ),
                ("Sec-Fetch-Site", "none"),
                ("Accept-Encoding", "gzip, deflate, br"),
                ("Sec-Fetch-Mode", "navigate"),
                (
                    "User-Agent",
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
                ),
                ("Accept-Language", "en-US,en;q=0.9"),
                ("Sec-Fetch-Dest", "document"),
                ("Priority", "u=0, i"),
            ],
        )
    }

    /// Default profile for a browser family.
    pub fn for_browser(browser: BrowserType) -> Self {
        match browser {
            BrowserType::Firefox => Self::firefox(),
            BrowserType::Chrome => Self::chrome(),
            BrowserType::Safari => Self::safari(),
        }
    }

    fn from_static(browser: BrowserType, entries: &[(&str, &str)]) -> Self {
        Self {
            browser,
            entries: entries
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }

    /// Value of a header, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Replace a header in place, or append it when absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    /// Variant used for a fetch issued by a page of the same site: the
    /// navigation-only headers go away and the referer is filled in.
    pub fn for_api_call(&self, referer: Option<&Url>) -> Self {
        let mut profile = self.clone();
        profile.remove("Upgrade-Insecure-Requests");
        profile.remove("Sec-Fetch-User");
        profile.set("Accept", "application/json, text/plain, */*");
        profile.set("Sec-Fetch-Dest", "empty");
        profile.set("Sec-Fetch-Mode", "cors");
        profile.set("Priority", "u=4");

        match referer {
            Some(referer) => {
                profile.set("Sec-Fetch-Site", "same-origin");
                profile.set("Referer", referer.as_str());
            }
            None => profile.set("Sec-Fetch-Site", "none"),
        }
        profile
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, HeaderError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| HeaderError::InvalidName(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| HeaderError::InvalidValue(name.clone()))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

impl Default for HeaderProfile {
    fn default() -> Self {
        Self::firefox()
    }
}
