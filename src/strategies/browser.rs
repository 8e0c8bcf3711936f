//! Browser automation attempts over WebDriver.
//!
//! A browser attempt launches one session, navigates to the target, waits
//! for any JavaScript challenge to resolve, captures the response, and closes
//! the session whether or not the earlier steps succeeded.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::wd::Capabilities;
use fantoccini::{Client, ClientBuilder, Locator};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{sleep, timeout};
use url::Url;

use crate::fetch::{FetchResponse, FetchTarget, TransportError};

use super::{BrowserConfig, BrowserEngine};

const GECKODRIVER_ENDPOINT: &str = "http://localhost:4444";
const CHROMEDRIVER_ENDPOINT: &str = "http://localhost:9515";

/// Replays the target from inside the page so the request carries the
/// cookies the challenge just issued; resolves with status and body.
const CAPTURE_SCRIPT: &str = r#"
const done = arguments[arguments.length - 1];
fetch(arguments[0], { credentials: "include", headers: { "Accept": "application/json, text/plain, */*" } })
    .then((response) => response.text().then((body) => done({ status: response.status, url: response.url, body: body })))
    .catch((error) => done({ error: String(error) }));
"#;

/// Starts browser sessions for an engine.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserPage>, TransportError>;
}

/// One open browser page. `close` must be safe to call after any failure.
#[async_trait]
pub trait BrowserPage: Send {
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<(), TransportError>;

    async fn wait(&mut self, duration: Duration) {
        sleep(duration).await;
    }

    /// Response for `url` as seen by the page.
    async fn capture(&mut self, url: &Url) -> Result<FetchResponse, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Run one browser attempt with scoped acquisition of the session.
pub async fn run_browser_attempt(
    launcher: &dyn BrowserLauncher,
    config: &BrowserConfig,
    target: &FetchTarget,
) -> Result<FetchResponse, TransportError> {
    let mut page = launcher.launch(config).await?;
    let outcome = drive_page(page.as_mut(), config, target).await;

    if let Err(err) = page.close().await {
        log::warn!("failed to close {} session: {err}", config.engine);
    }

    outcome
}

async fn drive_page(
    page: &mut dyn BrowserPage,
    config: &BrowserConfig,
    target: &FetchTarget,
) -> Result<FetchResponse, TransportError> {
    log::debug!("{} navigating to {}", config.engine, target.url);
    page.navigate(&target.url, config.navigation_timeout).await?;

    log::debug!(
        "{} waiting {:.1}s for challenge resolution",
        config.engine,
        config.challenge_wait.as_secs_f64()
    );
    page.wait(config.challenge_wait).await;

    page.capture(&target.url).await
}

/// Launcher talking to a local geckodriver / chromedriver.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    firefox_endpoint: String,
    chromium_endpoint: String,
}

impl WebDriverLauncher {
    pub fn new(firefox_endpoint: impl Into<String>, chromium_endpoint: impl Into<String>) -> Self {
        Self {
            firefox_endpoint: firefox_endpoint.into(),
            chromium_endpoint: chromium_endpoint.into(),
        }
    }

    fn endpoint(&self, engine: BrowserEngine) -> &str {
        match engine {
            BrowserEngine::Firefox => &self.firefox_endpoint,
            BrowserEngine::Chromium => &self.chromium_endpoint,
        }
    }
}

impl Default for WebDriverLauncher {
    fn default() -> Self {
        Self::new(GECKODRIVER_ENDPOINT, CHROMEDRIVER_ENDPOINT)
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserPage>, TransportError> {
        let endpoint = self.endpoint(config.engine);
        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities(config));

        let client = builder
            .connect(endpoint)
            .await
            .map_err(|err| TransportError::BrowserLaunch(format!("{endpoint}: {err}")))?;

        log::debug!("launched {} session via {endpoint}", config.engine);
        Ok(Box::new(WebDriverPage { client }))
    }
}

/// WebDriver capabilities for an engine.
pub fn capabilities(config: &BrowserConfig) -> Capabilities {
    let options = match config.engine {
        BrowserEngine::Firefox => {
            let mut args = Vec::new();
            if config.headless {
                args.push("-headless");
            }
            (
                "moz:firefoxOptions",
                json!({
                    "args": args,
                    // Keep JSON documents as plain text instead of the viewer UI.
                    "prefs": { "devtools.jsonview.enabled": false },
                }),
            )
        }
        BrowserEngine::Chromium => {
            let mut args = vec!["--disable-blink-features=AutomationControlled"];
            if config.headless {
                args.push("--headless=new");
            }
            ("goog:chromeOptions", json!({ "args": args }))
        }
    };

    let browser_name = match config.engine {
        BrowserEngine::Firefox => "firefox",
        BrowserEngine::Chromium => "chrome",
    };

    let mut caps = Capabilities::new();
    caps.insert("browserName".to_string(), Value::String(browser_name.into()));
    caps.insert(options.0.to_string(), options.1);
    caps
}

#[derive(Debug, Deserialize)]
struct CapturedResponse {
    status: Option<u16>,
    url: Option<String>,
    body: Option<String>,
    error: Option<String>,
}

struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    /// Status and body of an in-page `fetch()` of `url`, if the script ran.
    async fn replay(&self, url: &Url) -> Option<FetchResponse> {
        let captured = self
            .client
            .execute_async(CAPTURE_SCRIPT, vec![Value::String(url.to_string())])
            .await
            .map_err(browser_error)
            .and_then(|value| {
                serde_json::from_value::<CapturedResponse>(value)
                    .map_err(|err| TransportError::Browser(err.to_string()))
            });

        match captured {
            Ok(CapturedResponse {
                status: Some(status),
                url: response_url,
                body,
                error: None,
            }) => {
                log::debug!("replayed {url} from page ({status})");
                let final_url = response_url
                    .and_then(|raw| Url::parse(&raw).ok())
                    .unwrap_or_else(|| url.clone());
                Some(FetchResponse::new(
                    status,
                    HeaderMap::new(),
                    body.unwrap_or_default(),
                    final_url,
                ))
            }
            Ok(CapturedResponse { error, .. }) => {
                log::debug!(
                    "in-page replay failed: {}",
                    error.unwrap_or_else(|| "no status".into())
                );
                None
            }
            Err(err) => {
                log::debug!("in-page replay failed: {err}");
                None
            }
        }
    }

    /// Text of the rendered document.
    async fn body_text(&self, url: &Url) -> Result<FetchResponse, TransportError> {
        let body = self
            .client
            .find(Locator::Css("body"))
            .await
            .map_err(browser_error)?
            .text()
            .await
            .map_err(browser_error)?;
        let current = self.client.current_url().await.unwrap_or_else(|_| url.clone());

        // WebDriver does not expose the document status; the classifier
        // judges the body instead.
        Ok(FetchResponse::new(200, HeaderMap::new(), body, current))
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn navigate(&mut self, url: &Url, limit: Duration) -> Result<(), TransportError> {
        match timeout(limit, self.client.goto(url.as_str())).await {
            Ok(result) => result.map_err(browser_error)?,
            Err(_) => {
                return Err(TransportError::Timeout(format!(
                    "navigation to {url} exceeded {:.0}s",
                    limit.as_secs_f64()
                )));
            }
        }

        if let Ok(title) = self.client.title().await {
            log::debug!("page title: {title}");
        }
        Ok(())
    }

    /// Capture order:
    /// 1. Replay the target with `fetch()` inside the page. A 2xx JSON reply
    ///    is returned as is.
    /// 2. Otherwise read the rendered document body.
    /// 3. Return whichever of the two parses as JSON, preferring the
    ///    document, and fall back to the replay when neither does.
    async fn capture(&mut self, url: &Url) -> Result<FetchResponse, TransportError> {
        let replay = self.replay(url).await;
        if let Some(response) = &replay
            && is_json_success(response)
        {
            return Ok(response.clone());
        }

        log::debug!("in-page replay of {url} not usable, reading document body");
        let document = self.body_text(url).await;
        prefer_json(replay, document)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.client.clone().close().await.map_err(browser_error)
    }
}

fn is_json_success(response: &FetchResponse) -> bool {
    (200..300).contains(&response.status) && response.json().is_ok()
}

/// Pick between the replayed response and the document body.
fn prefer_json(
    replay: Option<FetchResponse>,
    document: Result<FetchResponse, TransportError>,
) -> Result<FetchResponse, TransportError> {
    match (replay, document) {
        (_, Ok(document)) if document.json().is_ok() => Ok(document),
        (Some(replay), Ok(_)) => Ok(replay),
        (Some(replay), Err(err)) => {
            log::debug!("document body unavailable ({err}), keeping replay");
            Ok(replay)
        }
        (None, document) => document,
    }
}

fn browser_error(err: fantoccini::error::CmdError) -> TransportError {
    TransportError::Browser(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Journal {
        steps: Mutex<Vec<String>>,
    }

    impl Journal {
        fn push(&self, step: impl Into<String>) {
            self.steps.lock().unwrap().push(step.into());
        }

        fn steps(&self) -> Vec<String> {
            self.steps.lock().unwrap().clone()
        }
    }

    struct StubLauncher {
        journal: Arc<Journal>,
        fail_navigation: bool,
    }

    struct StubPage {
        journal: Arc<Journal>,
        fail_navigation: bool,
    }

    #[async_trait]
    impl BrowserLauncher for StubLauncher {
        async fn launch(
            &self,
            config: &BrowserConfig,
        ) -> Result<Box<dyn BrowserPage>, TransportError> {
            self.journal.push(format!("launch {}", config.engine));
            Ok(Box::new(StubPage {
                journal: self.journal.clone(),
                fail_navigation: self.fail_navigation,
            }))
        }
    }

    #[async_trait]
    impl BrowserPage for StubPage {
        async fn navigate(&mut self, url: &Url, _timeout: Duration) -> Result<(), TransportError> {
            self.journal.push(format!("navigate {url}"));
            if self.fail_navigation {
                return Err(TransportError::Timeout("navigation".into()));
            }
            Ok(())
        }

        async fn wait(&mut self, duration: Duration) {
            self.journal.push(format!("wait {}ms", duration.as_millis()));
        }

        async fn capture(&mut self, url: &Url) -> Result<FetchResponse, TransportError> {
            self.journal.push("capture");
            Ok(FetchResponse::new(
                200,
                HeaderMap::new(),
                r#"{"status":true}"#,
                url.clone(),
            ))
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.journal.push("close");
            Ok(())
        }
    }

    fn target() -> FetchTarget {
        FetchTarget::json(Url::parse("https://example.com/data.json").unwrap())
    }

    #[tokio::test]
    async fn runs_full_session_and_closes() {
        let journal = Arc::new(Journal::default());
        let launcher = StubLauncher {
            journal: journal.clone(),
            fail_navigation: false,
        };
        let config = BrowserConfig::new(BrowserEngine::Firefox)
            .with_challenge_wait(Duration::from_millis(250));

        let response = run_browser_attempt(&launcher, &config, &target())
            .await
            .expect("captured response");

        assert_eq!(response.status, 200);
        assert_eq!(
            journal.steps(),
            vec![
                "launch firefox",
                "navigate https://example.com/data.json",
                "wait 250ms",
                "capture",
                "close",
            ]
        );
    }

    #[tokio::test]
    async fn closes_session_when_navigation_fails() {
        let journal = Arc::new(Journal::default());
        let launcher = StubLauncher {
            journal: journal.clone(),
            fail_navigation: true,
        };
        let config = BrowserConfig::new(BrowserEngine::Chromium);

        let err = run_browser_attempt(&launcher, &config, &target())
            .await
            .expect_err("navigation fails");

        assert!(matches!(err, TransportError::Timeout(_)));
        assert_eq!(journal.steps().last().map(String::as_str), Some("close"));
        assert!(!journal.steps().iter().any(|step| step == "capture"));
    }

    #[test]
    fn capabilities_follow_engine_and_headless_flag() {
        let firefox = capabilities(&BrowserConfig::new(BrowserEngine::Firefox));
        assert_eq!(firefox["browserName"], "firefox");
        assert_eq!(firefox["moz:firefoxOptions"]["args"][0], "-headless");

        let chromium = capabilities(&BrowserConfig::new(BrowserEngine::Chromium).headful());
        assert_eq!(chromium["browserName"], "chrome");
        let args = chromium["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|arg| arg == "--headless=new"));
    }

    fn page_response(status: u16, body: &'static str) -> FetchResponse {
        FetchResponse::new(status, HeaderMap::new(), body, target().url)
    }

    #[test]
    fn document_json_replaces_blocked_replay() {
        let replay = page_response(403, "<HTML><TITLE>Access Denied</TITLE></HTML>");
        let document = page_response(200, r#"{"status":true}"#);
        assert!(!is_json_success(&replay));

        let chosen = prefer_json(Some(replay), Ok(document.clone())).unwrap();
        assert_eq!(chosen, document);
    }

    #[test]
    fn replay_is_kept_when_document_is_not_json() {
        let replay = page_response(403, "denied");
        let chosen = prefer_json(Some(replay.clone()), Ok(page_response(200, "denied"))).unwrap();
        assert_eq!(chosen.status, 403);

        let unreadable = Err(TransportError::Browser("no such element".into()));
        assert_eq!(prefer_json(Some(replay.clone()), unreadable).unwrap(), replay);
    }

    #[test]
    fn document_is_used_when_replay_did_not_run() {
        let document = page_response(200, "<pre>plain</pre>");
        assert_eq!(prefer_json(None, Ok(document.clone())).unwrap(), document);

        let err = prefer_json(None, Err(TransportError::Browser("gone".into()))).unwrap_err();
        assert!(matches!(err, TransportError::Browser(_)));
    }

    #[test]
    fn successful_json_replay_is_final() {
        assert!(is_json_success(&page_response(200, r#"{"status":true}"#)));
        assert!(!is_json_success(&page_response(200, "<html></html>")));
        assert!(!is_json_success(&page_response(429, r#"{"error":"slow down"}"#)));
    }
}
