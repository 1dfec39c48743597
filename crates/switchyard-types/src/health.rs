//! Provider health snapshot types (for dashboards and the `status` command).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Excluded from routing until the cooldown elapses.
    Open,
    /// One trial request allowed to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of one provider's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealthState {
    pub provider_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// When the circuit last opened, if it is open or half-open.
    pub opened_at: Option<DateTime<Utc>>,
    pub success_streak: u32,
    /// Cooldown applied the next time (or currently) the circuit is open.
    pub current_cooldown_ms: u64,
    /// Failure fraction over the recent outcome window (0.0 to 1.0).
    pub recent_error_rate: f64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub last_error: Option<String>,
    pub last_latency_ms: Option<u64>,
    /// Set while a rate-limit retry-after hint keeps the provider out of rotation.
    pub rate_limited_until: Option<DateTime<Utc>>,
}
