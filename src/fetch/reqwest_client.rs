//! Reqwest-based execution of the HTTP strategies.
//!
//! Every attempt builds its own `reqwest::Client` with a private cookie
//! store, primes the session when the strategy asks for it, and converts the
//! final response into the shared [`FetchResponse`] representation.
//!
//! Plain and session rungs use native-tls over HTTP/1.1, the HTTP/2 rung
//! switches to h2 prior knowledge, and TLS impersonation swaps in a rustls
//! configuration built from the browser profile.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, tls::Version};
use rustls::{ClientConfig, RootCertStore};
use url::Url;

use crate::strategies::FetchStrategy;
use crate::strategies::headers::{HeaderError, HeaderProfile};
use crate::strategies::tls::{TlsProfile, TlsProfileError, system_roots};

use super::runner::TransportError;
use super::types::{FetchResponse, FetchTarget};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Protocol constraint applied to the client of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolMode {
    Negotiated,
    Http1Only,
    Http2Only,
}

impl ProtocolMode {
    /// ALPN ids reqwest offers on its native-tls backend for this mode.
    fn native_alpn(self) -> Vec<Vec<u8>> {
        match self {
            ProtocolMode::Negotiated => vec![b"h2".to_vec(), b"http/1.1".to_vec()],
            ProtocolMode::Http1Only => vec![b"http/1.1".to_vec()],
            ProtocolMode::Http2Only => vec![b"h2".to_vec()],
        }
    }
}

/// Everything needed to build and drive the client for one HTTP attempt.
struct HttpPlan<'a> {
    headers: &'a HeaderProfile,
    home: Option<&'a Url>,
    protocol: ProtocolMode,
    tls: Option<&'a TlsProfile>,
}

impl<'a> HttpPlan<'a> {
    fn for_strategy(strategy: &'a FetchStrategy) -> Result<Self, TransportError> {
        let plan = match strategy {
            // The two cheapest rungs speak HTTP/1.1 only, like a scripted
            // client; HTTP/2 is what the next rung adds.
            FetchStrategy::PlainHeaders { headers } => HttpPlan {
                headers,
                home: None,
                protocol: ProtocolMode::Http1Only,
                tls: None,
            },
            FetchStrategy::SessionCookies { headers, home } => HttpPlan {
                headers,
                home: Some(home),
                protocol: ProtocolMode::Http1Only,
                tls: None,
            },
            FetchStrategy::Http2Client { headers, home } => HttpPlan {
                headers,
                home: home.as_ref(),
                protocol: ProtocolMode::Http2Only,
                tls: None,
            },
            FetchStrategy::TlsImpersonation { profile, home } => HttpPlan {
                headers: &profile.headers,
                home: home.as_ref(),
                protocol: if profile.offers_h2() {
                    ProtocolMode::Negotiated
                } else {
                    ProtocolMode::Http1Only
                },
                tls: Some(profile),
            },
            FetchStrategy::BrowserAutomation(_) => {
                return Err(TransportError::Unsupported(strategy.label()));
            }
        };
        Ok(plan)
    }
}

/// Transport configuration of one attempt, resolved before the client is
/// built. `tls` is `None` for the platform native-tls stack.
struct ClientSettings {
    protocol: ProtocolMode,
    tls: Option<ClientConfig>,
}

impl ClientSettings {
    fn resolve<F>(plan: &HttpPlan<'_>, roots: F) -> Result<Self, TransportError>
    where
        F: FnOnce() -> Result<RootCertStore, TlsProfileError>,
    {
        let tls = match plan.tls {
            Some(profile) => {
                let config = roots()
                    .and_then(|roots| profile.client_config(roots))
                    .map_err(|err| TransportError::Tls(err.to_string()))?;
                Some(config)
            }
            None => None,
        };

        Ok(Self {
            protocol: plan.protocol,
            tls,
        })
    }

    /// ALPN protocols offered in the ClientHello.
    fn alpn(&self) -> Vec<Vec<u8>> {
        match &self.tls {
            Some(config) => config.alpn_protocols.clone(),
            None => self.protocol.native_alpn(),
        }
    }

    /// Cipher suite ids in offer order when the profile controls them.
    fn cipher_suites(&self) -> Option<Vec<u16>> {
        self.tls.as_ref().map(|config| {
            config
                .crypto_provider()
                .cipher_suites
                .iter()
                .map(|suite| u16::from(suite.suite()))
                .collect()
        })
    }

    fn into_builder(self, timeout: Duration) -> ClientBuilder {
        let mut builder = ClientBuilder::new().cookie_store(true).timeout(timeout);

        builder = match self.protocol {
            ProtocolMode::Negotiated => builder,
            ProtocolMode::Http1Only => builder.http1_only(),
            ProtocolMode::Http2Only => builder.http2_prior_knowledge(),
        };

        match self.tls {
            Some(config) => builder.use_preconfigured_tls(config),
            None => builder.min_tls_version(Version::TLS_1_2),
        }
    }
}

/// HTTP runner used for every non-browser strategy.
#[derive(Debug, Clone)]
pub struct ReqwestRunner {
    timeout: Duration,
}

impl ReqwestRunner {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Per-request timeout, applied to the priming request and the target
    /// request separately.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(
        &self,
        strategy: &FetchStrategy,
        target: &FetchTarget,
    ) -> Result<FetchResponse, TransportError> {
        let plan = HttpPlan::for_strategy(strategy)?;
        let settings = ClientSettings::resolve(&plan, system_roots)?;
        if let (Some(profile), Some(suites)) = (plan.tls, settings.cipher_suites()) {
            log::debug!("impersonating {:?} with cipher order {suites:?}", profile.browser);
        }
        let client = settings
            .into_builder(self.timeout)
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        let request_headers = match plan.home {
            Some(home) => {
                prime_session(&client, home, plan.headers).await?;
                let referer = target.referer.as_ref().unwrap_or(home);
                plan.headers.for_api_call(Some(referer))
            }
            None => plan.headers.clone(),
        };

        log::debug!("{} -> GET {}", strategy.label(), target.url);
        let response = client
            .get(target.url.clone())
            .headers(request_headers.to_header_map().map_err(header_error)?)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        to_fetch_response(response).await
    }
}

impl Default for ReqwestRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Visit the home page so the bot manager's cookies land in the jar. The
/// priming response itself is not judged; only the target response is.
async fn prime_session(
    client: &Client,
    home: &Url,
    headers: &HeaderProfile,
) -> Result<(), TransportError> {
    let response = client
        .get(home.clone())
        .headers(headers.to_header_map().map_err(header_error)?)
        .send()
        .await
        .map_err(map_reqwest_error)?;

    let status = response.status().as_u16();
    // Drain the body before the target request.
    response.bytes().await.map_err(map_reqwest_error)?;
    log::debug!("primed session via {home} ({status})");
    Ok(())
}

async fn to_fetch_response(response: reqwest::Response) -> Result<FetchResponse, TransportError> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let url = response.url().clone();
    let body = response.bytes().await.map_err(map_reqwest_error)?;

    Ok(FetchResponse::new(status, headers, body, url))
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Transport(err.to_string())
    }
}

fn header_error(err: HeaderError) -> TransportError {
    match err {
        HeaderError::InvalidName(name) | HeaderError::InvalidValue(name) => {
            TransportError::InvalidHeader(name)
        }
    }
}
