//! Provider-facing types.
//!
//! These model the normalized shape of a call to any backend: the request an
//! adapter receives, the response or stream events it produces, the limits it
//! advertises, and the normalized error kinds it reports.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cost::CostBudget;

/// Cost used for routing and accounting when a provider has no configured price.
pub const FALLBACK_COST_PER_1K_TOKENS: f64 = 0.01;

/// A capability a provider may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Single-shot text generation.
    Generate,
    /// Incremental streaming of generated text.
    Streaming,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Generate => write!(f, "generate"),
            Capability::Streaming => write!(f, "streaming"),
        }
    }
}

/// Backend wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Anthropic,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::OpenAiCompatible => write!(f, "openai_compatible"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderType::Anthropic),
            "openai_compatible" => Ok(ProviderType::OpenAiCompatible),
            other => Err(format!("invalid provider type: '{other}'")),
        }
    }
}

/// Static configuration for one provider.
///
/// Loaded at startup and immutable during a run. Runtime changes replace the
/// whole provider list at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub provider_type: ProviderType,
    /// Model identifier sent to the backend.
    pub model: String,
    /// Override the default base URL for the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_capability_set")]
    pub capability_set: Vec<Capability>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// USD per 1,000 tokens. Filled from the pricing table when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_1k_tokens: Option<f64>,
    /// Largest `max_tokens` this provider accepts.
    #[serde(default = "default_provider_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Lower ranks win ties in routing.
    #[serde(default)]
    pub priority_rank: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<CostBudget>,
}

fn default_capability_set() -> Vec<Capability> {
    vec![Capability::Generate, Capability::Streaming]
}

fn default_weight() -> f64 {
    1.0
}

fn default_provider_max_tokens() -> u32 {
    4096
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Minimal config with defaults, mostly useful for tests and programmatic setup.
    pub fn new(
        provider_id: impl Into<String>,
        provider_type: ProviderType,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_type,
            model: model.into(),
            base_url: None,
            api_key_env: None,
            capability_set: default_capability_set(),
            weight: default_weight(),
            cost_per_1k_tokens: None,
            max_tokens: default_provider_max_tokens(),
            timeout_ms: default_timeout_ms(),
            priority_rank: 0,
            enabled: true,
            budget: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capability_set.contains(&capability)
    }

    /// Configured price, or the conservative fallback.
    pub fn cost_per_1k(&self) -> f64 {
        self.cost_per_1k_tokens.unwrap_or(FALLBACK_COST_PER_1K_TOKENS)
    }

    /// Estimated USD cost for a number of tokens.
    pub fn cost_for(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.cost_per_1k()
    }
}

/// Limits advertised by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLimits {
    pub streaming: bool,
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
}

/// Normalized request handed to an adapter.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model override; empty means the adapter's configured model.
    pub model: String,
    /// Fully assembled prompt text (after context fusion).
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Time the adapter may spend on this call.
    pub timeout: Duration,
}

/// Normalized response from a non-streaming adapter call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Reason why the backend stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StopSequence => write!(f, "stop_sequence"),
        }
    }
}

/// Token usage reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Events emitted by an adapter's streaming call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Connection established with the backend.
    Connected,
    /// A fragment of generated text.
    TextDelta { text: String },
    /// The message is finishing with a stop reason.
    MessageDelta { stop_reason: StopReason },
    /// Token usage information.
    Usage(Usage),
    /// The stream has completed.
    Done,
}

/// Normalized error kinds every adapter reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    RateLimited,
    AuthError,
    InvalidRequest,
    TransientServerError,
    Unknown,
}

impl ProviderErrorKind {
    /// Whether an outcome of this kind counts against the provider's health.
    ///
    /// `InvalidRequest` is the caller's fault and leaves health untouched.
    pub fn affects_health(&self) -> bool {
        !matches!(self, ProviderErrorKind::InvalidRequest)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Timeout => write!(f, "timeout"),
            ProviderErrorKind::RateLimited => write!(f, "rate_limited"),
            ProviderErrorKind::AuthError => write!(f, "auth_error"),
            ProviderErrorKind::InvalidRequest => write!(f, "invalid_request"),
            ProviderErrorKind::TransientServerError => write!(f, "transient_server_error"),
            ProviderErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Errors from a single adapter call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transient server error: {0}")]
    TransientServer(String),

    #[error("provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Timeout(_) => ProviderErrorKind::Timeout,
            ProviderError::RateLimited { .. } => ProviderErrorKind::RateLimited,
            ProviderError::Auth(_) => ProviderErrorKind::AuthError,
            ProviderError::InvalidRequest(_) => ProviderErrorKind::InvalidRequest,
            ProviderError::TransientServer(_) => ProviderErrorKind::TransientServerError,
            ProviderError::Unknown(_) => ProviderErrorKind::Unknown,
        }
    }

    /// Backend hint for how long to stay away, if it gave one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    /// Map an HTTP status code and body to a normalized error.
    pub fn from_status(status: u16, body: String, retry_after_ms: Option<u64>) -> Self {
        match status {
            400 | 404 | 413 | 422 => ProviderError::InvalidRequest(format!("HTTP {status}: {body}")),
            401 | 403 => ProviderError::Auth(format!("HTTP {status}: {body}")),
            408 | 504 => ProviderError::Timeout(format!("HTTP {status}: {body}")),
            429 => ProviderError::RateLimited { retry_after_ms },
            500..=599 => ProviderError::TransientServer(format!("HTTP {status}: {body}")),
            _ => ProviderError::Unknown(format!("HTTP {status}: {body}")),
        }
    }
}
