//! Orchestrator configuration types.
//!
//! `OrchestratorConfig` is the top-level `switchyard.toml`: the provider list
//! plus cache, circuit breaker, context fusion, and routing settings. All
//! sections have sensible defaults.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::provider::ProviderConfig;

/// Top-level configuration, supplied at orchestrator construction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl OrchestratorConfig {
    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.capacity must be at least 1".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.circuit_breaker.max_cooldown_ms < self.circuit_breaker.cooldown_ms {
            return Err(ConfigError::Invalid(
                "circuit_breaker.max_cooldown_ms must be >= cooldown_ms".to_string(),
            ));
        }
        if self.routing.error_rate_window == 0 {
            return Err(ConfigError::Invalid(
                "routing.error_rate_window must be at least 1".to_string(),
            ));
        }

        validate_providers(&self.providers)
    }
}

/// Check a provider list on its own (used for runtime replacement as well).
pub fn validate_providers(providers: &[ProviderConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for provider in providers {
        if provider.provider_id.trim().is_empty() {
            return Err(ConfigError::Invalid("provider_id must not be empty".to_string()));
        }
        if !seen.insert(provider.provider_id.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate provider_id '{}'",
                provider.provider_id
            )));
        }
        if !provider.weight.is_finite() || provider.weight < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' must have a non-negative weight",
                provider.provider_id
            )));
        }
        if let Some(cost) = provider.cost_per_1k_tokens {
            if !cost.is_finite() || cost < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' must have a non-negative cost_per_1k_tokens",
                    provider.provider_id
                )));
            }
        }
        if provider.timeout_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' must have a timeout_ms of at least 1",
                provider.provider_id
            )));
        }
    }
    Ok(())
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
            capacity: default_cache_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Circuit breaker thresholds shared by all providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive health-affecting failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Initial open duration before a half-open trial.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Cap for the doubled cooldown after failed trials.
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,
    /// Cap for honoring a backend's retry-after hint.
    #[serde(default = "default_rate_limit_max_wait_ms")]
    pub rate_limit_max_wait_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_max_cooldown_ms() -> u64 {
    300_000
}

fn default_rate_limit_max_wait_ms() -> u64 {
    60_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            max_cooldown_ms: default_max_cooldown_ms(),
            rate_limit_max_wait_ms: default_rate_limit_max_wait_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_millis(self.max_cooldown_ms)
    }

    pub fn rate_limit_max_wait(&self) -> Duration {
        Duration::from_millis(self.rate_limit_max_wait_ms)
    }
}

/// Context fusion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget for retrieved chunks.
    #[serde(default = "default_context_window_size")]
    pub context_window_size: u32,
    /// Chunks scoring below this are discarded.
    #[serde(default)]
    pub min_similarity_threshold: f32,
    /// Used when a request asks for context without a positive `context_top_k`.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

fn default_context_window_size() -> u32 {
    2048
}

fn default_top_k() -> usize {
    5
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_window_size: default_context_window_size(),
            min_similarity_threshold: 0.0,
            default_top_k: default_top_k(),
        }
    }
}

/// Routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Number of most recent outcomes used for the recent error rate.
    #[serde(default = "default_error_rate_window")]
    pub error_rate_window: usize,
}

fn default_error_rate_window() -> usize {
    20
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            error_rate_window: default_error_rate_window(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::BudgetWindow;
    use crate::provider::{ProviderConfig, ProviderType};

    #[test]
    fn test_config_defaults_from_empty_toml() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.context.context_window_size, 2048);
        assert_eq!(config.routing.error_rate_window, 20);
        assert!(config.providers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_with_providers() {
        let toml_str = r#"
[cache]
ttl_secs = 60
capacity = 10

[circuit_breaker]
failure_threshold = 5

[[providers]]
provider_id = "fast"
provider_type = "anthropic"
model = "claude-sonnet-4-20250514"
api_key_env = "ANTHROPIC_API_KEY"
weight = 2.0
cost_per_1k_tokens = 0.009
priority_rank = 0

[providers.budget]
max_tokens = 500000
window = "daily"

[[providers]]
provider_id = "cheap"
provider_type = "openai_compatible"
model = "gpt-4o-mini"
capability_set = ["generate"]
"#;
        let config: OrchestratorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.providers.len(), 2);

        let fast = &config.providers[0];
        assert_eq!(fast.provider_type, ProviderType::Anthropic);
        assert!((fast.weight - 2.0).abs() < f64::EPSILON);
        let budget = fast.budget.as_ref().unwrap();
        assert_eq!(budget.max_tokens, Some(500_000));
        assert_eq!(budget.window, BudgetWindow::Daily);

        let cheap = &config.providers[1];
        assert_eq!(cheap.capability_set.len(), 1);
        assert!(cheap.cost_per_1k_tokens.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let config = OrchestratorConfig {
            providers: vec![
                ProviderConfig::new("a", ProviderType::Anthropic, "m"),
                ProviderConfig::new("a", ProviderType::OpenAiCompatible, "m"),
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate provider_id 'a'"));
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = OrchestratorConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_cooldown_cap_below_base() {
        let mut config = OrchestratorConfig::default();
        config.circuit_breaker.cooldown_ms = 10_000;
        config.circuit_breaker.max_cooldown_ms = 5_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_provider_numbers() {
        let with = |edit: fn(&mut ProviderConfig)| {
            let mut provider = ProviderConfig::new("p", ProviderType::Anthropic, "m");
            edit(&mut provider);
            validate_providers(&[provider])
        };

        assert!(with(|_| {}).is_ok());
        assert!(with(|p| p.cost_per_1k_tokens = Some(0.0)).is_ok());

        let err = with(|p| p.cost_per_1k_tokens = Some(-0.01)).unwrap_err();
        assert!(err.to_string().contains("cost_per_1k_tokens"));
        assert!(with(|p| p.cost_per_1k_tokens = Some(f64::NAN)).is_err());
        assert!(with(|p| p.weight = f64::NAN).is_err());

        let err = with(|p| p.timeout_ms = 0).unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }
}
