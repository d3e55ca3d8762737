//! Errors - エラー型と分類
//!
//! - `ValidationError` / `DispatchError`: request boundary で同期的に返す
//! - `GenerationFailure` / `PublicationFailure` / `DeliveryFailure`: job の中で
//!   データとして記録され、OutcomeReport とログにだけ現れる

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::request::JobKey;
use super::state::JobStage;

/// Rejected before a job exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("shared secret mismatch")]
    SecretMismatch,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("malformed request: {0}")]
    Malformed(String),
}

/// Rejected at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("a job for {0} is already active")]
    DuplicateJob(JobKey),

    #[error("dispatcher is shutting down")]
    Shutdown,

    #[error("job {0} was lost before reaching DONE")]
    Lost(String),
}

/// Why the content generator produced nothing usable. Absorbed into a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GenerationFailure {
    #[error("generator transport error: {0}")]
    Transport(String),

    #[error("generator timed out after {0}s")]
    Timeout(u64),

    #[error("generator returned malformed output: {0}")]
    Malformed(String),

    #[error("generator returned no files")]
    Empty,

    #[error("generator output has no entry page '{0}'")]
    MissingEntryPage(String),
}

/// Sub-steps of the publication stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStep {
    CreateDestination,
    PushArtifacts,
    EnableServing,
}

impl fmt::Display for PublicationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PublicationStep::CreateDestination => "create_destination",
            PublicationStep::PushArtifacts => "push_artifacts",
            PublicationStep::EnableServing => "enable_serving",
        };
        f.write_str(s)
    }
}

/// Error returned by a publisher call. The stage attaches the step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublisherError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid artifact path '{0}'")]
    InvalidPath(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// Terminal for the job's artifacts, still forwarded to reporting.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("publication failed at {step}: {message}")]
pub struct PublicationFailure {
    pub step: PublicationStep,
    pub message: String,
    /// Destination left behind when a later step failed.
    pub destination_id: Option<String>,
}

/// One failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DeliveryFailure {
    #[error("evaluation endpoint returned status {0}")]
    Status(u16),

    #[error("evaluation endpoint unreachable: {0}")]
    Transport(String),
}

/// Illegal state-machine move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobStage,
    pub to: JobStage,
}
