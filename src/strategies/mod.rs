//! Fetch strategy definitions.
//!
//! Each [`FetchStrategy`] variant carries everything needed to perform one
//! attempt. Variants are ranked by cost so a policy can be checked for
//! strictly increasing expense.

pub mod browser;
pub mod headers;
pub mod tls;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use self::headers::HeaderProfile;
use self::tls::TlsProfile;

const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CHALLENGE_WAIT: Duration = Duration::from_secs(10);

/// Browser engine driven by a browser automation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngine {
    Firefox,
    Chromium,
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserEngine::Firefox => write!(f, "firefox"),
            BrowserEngine::Chromium => write!(f, "chromium"),
        }
    }
}

/// Settings for a full browser attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub engine: BrowserEngine,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(
        rename = "navigation_timeout_ms",
        with = "duration_ms",
        default = "default_navigation_timeout"
    )]
    pub navigation_timeout: Duration,
    #[serde(
        rename = "challenge_wait_ms",
        with = "duration_ms",
        default = "default_challenge_wait"
    )]
    pub challenge_wait: Duration,
}

impl BrowserConfig {
    pub fn new(engine: BrowserEngine) -> Self {
        Self {
            engine,
            headless: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            challenge_wait: DEFAULT_CHALLENGE_WAIT,
        }
    }

    pub fn headful(mut self) -> Self {
        self.headless = false;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_challenge_wait(mut self, wait: Duration) -> Self {
        self.challenge_wait = wait;
        self
    }
}

fn default_headless() -> bool {
    true
}

fn default_navigation_timeout() -> Duration {
    DEFAULT_NAVIGATION_TIMEOUT
}

fn default_challenge_wait() -> Duration {
    DEFAULT_CHALLENGE_WAIT
}

/// One way of fetching the target, from cheapest to most expensive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Single request with browser-shaped headers.
    PlainHeaders {
        #[serde(default)]
        headers: HeaderProfile,
    },
    /// Visit `home` first so the cookie jar is primed, then call the target.
    SessionCookies {
        #[serde(default)]
        headers: HeaderProfile,
        home: Url,
    },
    /// HTTP/2-only client, optionally priming a session first.
    Http2Client {
        #[serde(default)]
        headers: HeaderProfile,
        #[serde(default)]
        home: Option<Url>,
    },
    /// Client presenting a browser TLS profile.
    TlsImpersonation {
        #[serde(default)]
        profile: TlsProfile,
        #[serde(default)]
        home: Option<Url>,
    },
    /// Real browser session driven over WebDriver.
    BrowserAutomation(BrowserConfig),
}

/// Discriminant of [`FetchStrategy`] without its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    PlainHeaders,
    SessionCookies,
    Http2Client,
    TlsImpersonation,
    BrowserAutomation,
}

impl StrategyKind {
    /// Relative expense: local computation < session priming < protocol
    /// negotiation < TLS spoofing < full browser rendering.
    pub fn cost(self) -> u8 {
        match self {
            StrategyKind::PlainHeaders => 0,
            StrategyKind::SessionCookies => 1,
            StrategyKind::Http2Client => 2,
            StrategyKind::TlsImpersonation => 3,
            StrategyKind::BrowserAutomation => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::PlainHeaders => "plain_headers",
            StrategyKind::SessionCookies => "session_cookies",
            StrategyKind::Http2Client => "http2_client",
            StrategyKind::TlsImpersonation => "tls_impersonation",
            StrategyKind::BrowserAutomation => "browser_automation",
        }
    }
}

impl FetchStrategy {
    pub fn plain_headers() -> Self {
        FetchStrategy::PlainHeaders {
            headers: HeaderProfile::default(),
        }
    }

    pub fn session_cookies(home: Url) -> Self {
        FetchStrategy::SessionCookies {
            headers: HeaderProfile::default(),
            home,
        }
    }

    pub fn http2_client(home: Option<Url>) -> Self {
        FetchStrategy::Http2Client {
            headers: HeaderProfile::default(),
            home,
        }
    }

    pub fn tls_impersonation(profile: TlsProfile, home: Option<Url>) -> Self {
        FetchStrategy::TlsImpersonation { profile, home }
    }

    pub fn browser(engine: BrowserEngine) -> Self {
        FetchStrategy::BrowserAutomation(BrowserConfig::new(engine))
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            FetchStrategy::PlainHeaders { .. } => StrategyKind::PlainHeaders,
            FetchStrategy::SessionCookies { .. } => StrategyKind::SessionCookies,
            FetchStrategy::Http2Client { .. } => StrategyKind::Http2Client,
            FetchStrategy::TlsImpersonation { .. } => StrategyKind::TlsImpersonation,
            FetchStrategy::BrowserAutomation(_) => StrategyKind::BrowserAutomation,
        }
    }

    pub fn cost(&self) -> u8 {
        self.kind().cost()
    }

    /// Stable identifier used in logs, metrics and attempt records.
    pub fn label(&self) -> String {
        match self {
            FetchStrategy::BrowserAutomation(config) => {
                format!("{}({})", StrategyKind::BrowserAutomation.as_str(), config.engine)
            }
            other => other.kind().as_str().to_string(),
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
