//! Error taxonomy surfaced by the orchestration core.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ProviderErrorKind;

/// Why one provider in a failover chain did not produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimited,
    AuthError,
    InvalidRequest,
    TransientServerError,
    Unknown,
    /// The cost ledger rejected the reservation.
    BudgetExceeded,
    /// The circuit was open (or its half-open trial was taken) at dispatch time.
    CircuitOpen,
}

impl From<ProviderErrorKind> for FailureKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Timeout => FailureKind::Timeout,
            ProviderErrorKind::RateLimited => FailureKind::RateLimited,
            ProviderErrorKind::AuthError => FailureKind::AuthError,
            ProviderErrorKind::InvalidRequest => FailureKind::InvalidRequest,
            ProviderErrorKind::TransientServerError => FailureKind::TransientServerError,
            ProviderErrorKind::Unknown => FailureKind::Unknown,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::AuthError => "auth_error",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::TransientServerError => "transient_server_error",
            FailureKind::Unknown => "unknown",
            FailureKind::BudgetExceeded => "budget_exceeded",
            FailureKind::CircuitOpen => "circuit_open",
        };
        write!(f, "{s}")
    }
}

/// One entry in the per-provider failure list of a terminal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub kind: FailureKind,
    pub message: String,
    pub latency_ms: u64,
}

fn summarize(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no provider was attempted".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{}: {} ({})", f.provider_id, f.kind, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// What a caller should do about a terminal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient: rate limits, budgets, timeouts, outages.
    RetryLater,
    /// The request itself is invalid.
    FixRequest,
    /// No provider can serve requests until configuration changes.
    Misconfigured,
}

/// Terminal errors returned to callers of the orchestrator.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no eligible provider: {reason}")]
    NoEligibleProvider { reason: String },

    #[error("all providers exhausted: {}", summarize(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },

    #[error("deadline exceeded after {elapsed_ms}ms: {}", summarize(.failures))]
    DeadlineExceeded {
        elapsed_ms: u64,
        failures: Vec<ProviderFailure>,
    },

    #[error("stream from '{provider_id}' interrupted ({kind}): {message}")]
    StreamInterrupted {
        provider_id: String,
        kind: FailureKind,
        message: String,
    },
}

impl OrchestratorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OrchestratorError::InvalidRequest(_) => ErrorClass::FixRequest,
            OrchestratorError::NoEligibleProvider { .. } => ErrorClass::Misconfigured,
            OrchestratorError::AllProvidersExhausted { failures } => {
                if !failures.is_empty()
                    && failures.iter().all(|f| f.kind == FailureKind::AuthError)
                {
                    ErrorClass::Misconfigured
                } else {
                    ErrorClass::RetryLater
                }
            }
            OrchestratorError::DeadlineExceeded { .. } => ErrorClass::RetryLater,
            OrchestratorError::StreamInterrupted { .. } => ErrorClass::RetryLater,
        }
    }

    /// Per-provider failure causes, in chain order, when the error carries them.
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            OrchestratorError::AllProvidersExhausted { failures }
            | OrchestratorError::DeadlineExceeded { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Rejection from the cost ledger for one provider.
#[derive(Debug, Clone, Error)]
#[error("budget exceeded for provider '{provider_id}': {detail}")]
pub struct BudgetExceeded {
    pub provider_id: String,
    pub detail: String,
}

/// Errors from the external knowledge retriever.
#[derive(Debug, Clone, Error)]
pub enum RetrieverError {
    #[error("retriever unavailable: {0}")]
    Unavailable(String),

    #[error("retrieval query failed: {0}")]
    Query(String),
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
