//! Core utilities shared by runners, the classifier, and the selector.

pub mod classify;
pub mod detectors;
pub mod reqwest_client;
pub mod runner;
pub mod types;

pub use classify::{
    AttemptResult, Assessment, BlockSignal, Classification, InconclusiveCause, ResponseClassifier,
    Verdict,
};
pub use detectors::{BotVendor, ChallengeDetector, ChallengeMarker};
pub use reqwest_client::ReqwestRunner;
pub use runner::{AttemptRunner, LiveRunner, TransportError};
pub use types::{FetchResponse, FetchTarget};
