//! Attempt outcome classification.
//!
//! Turns the raw outcome of a runner into one of three classes: the response
//! is usable (Accepted), the target explicitly rejected the client (Blocked),
//! or the attempt failed for reasons unrelated to bot defences
//! (Inconclusive).

use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use super::detectors::{ChallengeDetector, ChallengeMarker};
use super::runner::TransportError;
use super::types::FetchResponse;

/// Three-way outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Accepted,
    Blocked,
    Inconclusive,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Accepted => write!(f, "accepted"),
            Classification::Blocked => write!(f, "blocked"),
            Classification::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Explicit rejection signal from the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSignal {
    Status(u16),
    Challenge(ChallengeMarker),
    /// Successful status, but the body is not the structured data asked for.
    UnexpectedBody,
}

/// Failure that says nothing about bot defences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InconclusiveCause {
    Transport(TransportError),
    ServerError(u16),
}

/// Classification together with its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Blocked(BlockSignal),
    Inconclusive(InconclusiveCause),
}

impl Verdict {
    pub fn classification(&self) -> Classification {
        match self {
            Verdict::Accepted => Classification::Accepted,
            Verdict::Blocked(_) => Classification::Blocked,
            Verdict::Inconclusive(_) => Classification::Inconclusive,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accepted => write!(f, "accepted"),
            Verdict::Blocked(BlockSignal::Status(status)) => write!(f, "blocked({status})"),
            Verdict::Blocked(BlockSignal::Challenge(marker)) => write!(f, "blocked({marker})"),
            Verdict::Blocked(BlockSignal::UnexpectedBody) => write!(f, "blocked(unexpected body)"),
            Verdict::Inconclusive(InconclusiveCause::Transport(err)) => {
                write!(f, "inconclusive({err})")
            }
            Verdict::Inconclusive(InconclusiveCause::ServerError(status)) => {
                write!(f, "inconclusive({status})")
            }
        }
    }
}

/// Outcome of applying one strategy: status and body when a response
/// arrived, and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub status: Option<u16>,
    pub body: Option<Bytes>,
    pub verdict: Verdict,
}

impl AttemptResult {
    pub fn classification(&self) -> Classification {
        self.verdict.classification()
    }
}

/// Classifier output; `json` is set when the body was parsed as JSON.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub result: AttemptResult,
    pub json: Option<Value>,
}

/// Applies status rules and challenge markers to an attempt outcome.
#[derive(Debug, Clone, Default)]
pub struct ResponseClassifier {
    detector: ChallengeDetector,
}

impl ResponseClassifier {
    pub fn new(detector: ChallengeDetector) -> Self {
        Self { detector }
    }

    pub fn assess(
        &self,
        outcome: &Result<FetchResponse, TransportError>,
        expect_json: bool,
    ) -> Assessment {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                return Assessment {
                    result: AttemptResult {
                        status: None,
                        body: None,
                        verdict: Verdict::Inconclusive(InconclusiveCause::Transport(err.clone())),
                    },
                    json: None,
                };
            }
        };

        // A body that already parses as JSON is data, never a challenge page.
        let json = response.json().ok();
        let verdict = self.verdict_for(response, expect_json, json.is_some());

        Assessment {
            result: AttemptResult {
                status: Some(response.status),
                body: Some(response.body.clone()),
                verdict,
            },
            json: if expect_json { json } else { None },
        }
    }

    fn verdict_for(&self, response: &FetchResponse, expect_json: bool, is_json: bool) -> Verdict {
        if let Some(marker) = self.detector.detect_headers(&response.headers) {
            return Verdict::Blocked(BlockSignal::Challenge(marker));
        }

        if !is_json
            && let Some(marker) = self.detector.detect_body(&response.text())
        {
            return Verdict::Blocked(BlockSignal::Challenge(marker));
        }

        match response.status {
            403 | 429 => Verdict::Blocked(BlockSignal::Status(response.status)),
            500..=599 => Verdict::Inconclusive(InconclusiveCause::ServerError(response.status)),
            200..=299 if expect_json && !is_json => Verdict::Blocked(BlockSignal::UnexpectedBody),
            200..=299 => Verdict::Accepted,
            other => Verdict::Blocked(BlockSignal::Status(other)),
        }
    }
}
