use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use escalator::{
    BlockSignal, BrowserConfig, BrowserEngine, BrowserLauncher, BrowserPage, Classification,
    EscalationError, EscalationPolicy, EscalationSelector, FetchResponse, FetchStrategy,
    FetchTarget, LiveRunner, TlsProfile, TransportError, Verdict,
    fetch::AttemptRunner,
};
use http::HeaderMap;
use serde_json::json;
use url::Url;

const HOME: &str = "https://www.spglobal.com/spdji/en/";
const API: &str =
    "https://www.spglobal.com/spdji/en/util/redesign/get-index-comparison-data.dot?compareArray=5457755";
const PAYLOAD: &str = r#"{"status":true,"performanceComparisonHolder":{"indexPerformanceForComparison":[{"indexName":"S&P/TSX Composite Index"}]}}"#;
const AKAMAI_DENIED: &str = "<HTML><HEAD><TITLE>Access Denied</TITLE></HEAD><BODY>You don't have permission to access this resource.<P>Reference&#32;&#35;18&#46;2f1e3e17&#46;1729000000&#46;1a2b3c</BODY></HTML>";

/// Runner with fixed outcomes per strategy label and a journal of calls.
#[derive(Default)]
struct ScriptedRunner {
    outcomes: HashMap<String, (u16, &'static str)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn respond(mut self, strategy: &FetchStrategy, status: u16, body: &'static str) -> Self {
        self.outcomes.insert(strategy.label(), (status, body));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttemptRunner for ScriptedRunner {
    async fn run(
        &self,
        strategy: &FetchStrategy,
        target: &FetchTarget,
    ) -> Result<FetchResponse, TransportError> {
        let label = strategy.label();
        self.calls.lock().unwrap().push(label.clone());
        match self.outcomes.get(&label) {
            Some((status, body)) => Ok(FetchResponse::new(
                *status,
                HeaderMap::new(),
                *body,
                target.url.clone(),
            )),
            None => Err(TransportError::Connect(format!("no script for {label}"))),
        }
    }
}

fn home() -> Url {
    Url::parse(HOME).unwrap()
}

fn target() -> FetchTarget {
    FetchTarget::json(Url::parse(API).unwrap()).with_referer(home())
}

fn five_level_policy(engine: BrowserEngine) -> EscalationPolicy {
    EscalationPolicy::new(vec![
        FetchStrategy::plain_headers(),
        FetchStrategy::session_cookies(home()),
        FetchStrategy::http2_client(Some(home())),
        FetchStrategy::tls_impersonation(TlsProfile::firefox(), Some(home())),
        FetchStrategy::browser(engine),
    ])
    .unwrap()
}

fn blocked_until_browser(
    policy: &EscalationPolicy,
    browser_status: u16,
    browser_body: &'static str,
) -> ScriptedRunner {
    let strategies = policy.strategies();
    let mut runner = ScriptedRunner::default();
    for strategy in &strategies[..4] {
        runner = runner.respond(strategy, 403, AKAMAI_DENIED);
    }
    runner.respond(&strategies[4], browser_status, browser_body)
}

fn selector(policy: EscalationPolicy, runner: Arc<dyn AttemptRunner>) -> EscalationSelector {
    EscalationSelector::builder(policy)
        .with_runner(runner)
        .disable_logging()
        .build()
}

#[tokio::test]
async fn firefox_fallback_returns_json_after_four_blocks() {
    let policy = five_level_policy(BrowserEngine::Firefox);
    let runner = Arc::new(blocked_until_browser(&policy, 200, PAYLOAD));

    let accepted = selector(policy, runner.clone())
        .fetch(&target())
        .await
        .expect("firefox rung is accepted");

    assert_eq!(accepted.log.len(), 5);
    assert_eq!(accepted.strategy, FetchStrategy::browser(BrowserEngine::Firefox));
    assert_eq!(accepted.json.unwrap()["status"], json!(true));
    assert_eq!(
        accepted.log.classifications(),
        vec![
            Classification::Blocked,
            Classification::Blocked,
            Classification::Blocked,
            Classification::Blocked,
            Classification::Accepted,
        ]
    );
    assert_eq!(runner.calls().len(), 5);
}

#[tokio::test]
async fn chromium_fallback_exhausts_the_policy() {
    let policy = five_level_policy(BrowserEngine::Chromium);
    let runner = Arc::new(blocked_until_browser(&policy, 403, ""));

    let err = selector(policy, runner)
        .fetch(&target())
        .await
        .expect_err("every rung is blocked");

    let EscalationError::Exhausted { log } = err else {
        panic!("expected exhaustion");
    };
    assert_eq!(log.len(), 5);
    assert!(log.iter().all(|record| record.classification() == Classification::Blocked));
    assert_eq!(
        log.last().unwrap().result.verdict,
        Verdict::Blocked(BlockSignal::Status(403))
    );
    assert!(matches!(
        log.records()[0].result.verdict,
        Verdict::Blocked(BlockSignal::Challenge(_))
    ));
}

#[tokio::test]
async fn later_strategies_are_never_attempted_after_acceptance() {
    let policy = five_level_policy(BrowserEngine::Firefox);
    let strategies = policy.strategies().to_vec();
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(&strategies[0], 403, "")
            .respond(&strategies[1], 200, PAYLOAD)
            .respond(&strategies[2], 200, PAYLOAD),
    );

    let accepted = selector(policy, runner.clone()).fetch(&target()).await.unwrap();

    assert_eq!(runner.calls(), vec!["plain_headers", "session_cookies"]);
    assert_eq!(accepted.log.len(), 2);
    assert_eq!(accepted.strategy.label(), "session_cookies");
}

#[tokio::test]
async fn exhaustion_records_one_entry_per_strategy() {
    let policy = EscalationPolicy::new(vec![
        FetchStrategy::plain_headers(),
        FetchStrategy::http2_client(None),
        FetchStrategy::browser(BrowserEngine::Firefox),
    ])
    .unwrap();
    // No scripts: every attempt fails at the transport level and is retried once.
    let runner = Arc::new(ScriptedRunner::default());

    let err = selector(policy, runner.clone()).fetch(&target()).await.unwrap_err();

    let log = err.attempt_log();
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|record| record.tries == 2));
    assert!(log.iter().all(|record| record.classification() == Classification::Inconclusive));
    assert_eq!(runner.calls().len(), 6);
}

#[tokio::test]
async fn identical_outcomes_give_identical_logs() {
    let policy = five_level_policy(BrowserEngine::Chromium);
    let selector = selector(
        policy.clone(),
        Arc::new(blocked_until_browser(&policy, 200, "<html>not json</html>")),
    );

    let first = selector.fetch(&target()).await.unwrap_err();
    let second = selector.fetch(&target()).await.unwrap_err();

    assert_eq!(first.attempt_log(), second.attempt_log());
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(
        first.attempt_log().last().unwrap().result.verdict,
        Verdict::Blocked(BlockSignal::UnexpectedBody)
    );
}

/// Browser stand-in: Firefox pages see the API payload, Chromium pages get
/// the Akamai denial.
struct EngineAwareLauncher {
    closed: Arc<Mutex<Vec<BrowserEngine>>>,
}

struct FakePage {
    engine: BrowserEngine,
    closed: Arc<Mutex<Vec<BrowserEngine>>>,
}

#[async_trait]
impl BrowserLauncher for EngineAwareLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserPage>, TransportError> {
        Ok(Box::new(FakePage {
            engine: config.engine,
            closed: self.closed.clone(),
        }))
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&mut self, _url: &Url, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    async fn capture(&mut self, url: &Url) -> Result<FetchResponse, TransportError> {
        let (status, body) = match self.engine {
            BrowserEngine::Firefox => (200, PAYLOAD),
            BrowserEngine::Chromium => (403, AKAMAI_DENIED),
        };
        Ok(FetchResponse::new(status, HeaderMap::new(), body, url.clone()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.lock().unwrap().push(self.engine);
        Ok(())
    }
}

#[tokio::test]
async fn live_runner_drives_the_configured_browser_engine() {
    let closed = Arc::new(Mutex::new(Vec::new()));
    let runner = Arc::new(LiveRunner::new().with_browser_launcher(Arc::new(EngineAwareLauncher {
        closed: closed.clone(),
    })));

    for engine in [BrowserEngine::Firefox, BrowserEngine::Chromium] {
        let config = BrowserConfig::new(engine).with_challenge_wait(Duration::ZERO);
        let policy =
            EscalationPolicy::new(vec![FetchStrategy::BrowserAutomation(config)]).unwrap();
        let outcome = selector(policy, runner.clone()).fetch(&target()).await;

        match engine {
            BrowserEngine::Firefox => assert!(outcome.is_ok()),
            BrowserEngine::Chromium => {
                let err = outcome.unwrap_err();
                assert!(err.to_string().contains("akamai"), "{err}");
            }
        }
    }

    assert_eq!(
        *closed.lock().unwrap(),
        vec![BrowserEngine::Firefox, BrowserEngine::Chromium]
    );
}
