//! Provider adapter implementations.
//!
//! Contains the concrete [`ProviderAdapter`] backends plus the factory
//! ([`create_adapter`]) that turns a [`ProviderConfig`] into a boxed adapter,
//! and [`build_registry`], which assembles the startup registry.
//!
//! [`ProviderAdapter`]: switchyard_core::llm::adapter::ProviderAdapter

pub mod anthropic;
pub(crate) mod http;
pub mod openai_compat;
pub mod pricing;

use secrecy::SecretString;

use switchyard_core::llm::box_adapter::BoxProviderAdapter;
use switchyard_core::llm::registry::ProviderRegistry;
use switchyard_types::provider::{ProviderConfig, ProviderError, ProviderType};

use self::anthropic::AnthropicAdapter;
use self::openai_compat::OpenAiCompatibleAdapter;
use self::openai_compat::config as oai_config;

/// Create a [`BoxProviderAdapter`] from a [`ProviderConfig`].
///
/// # Errors
///
/// Returns [`ProviderError::Auth`] when no API key was resolved.
pub fn create_adapter(
    config: &ProviderConfig,
    api_key: Option<SecretString>,
) -> Result<BoxProviderAdapter, ProviderError> {
    let key = api_key.ok_or_else(|| {
        ProviderError::Auth(format!(
            "no API key for provider '{}' (set {})",
            config.provider_id,
            config.api_key_env.as_deref().unwrap_or("api_key_env")
        ))
    })?;

    match config.provider_type {
        ProviderType::Anthropic => {
            let mut adapter = AnthropicAdapter::new(&config.provider_id, key, &config.model)?;
            if let Some(base_url) = config.base_url.as_deref() {
                adapter = adapter.with_base_url(base_url);
            }
            Ok(BoxProviderAdapter::new(adapter))
        }
        ProviderType::OpenAiCompatible => {
            let oai = match config.base_url.as_deref() {
                Some(base_url) => {
                    oai_config::custom(&config.provider_id, base_url, key, &config.model)
                }
                None => oai_config::infer_defaults(&config.provider_id, key, &config.model),
            };
            Ok(BoxProviderAdapter::new(OpenAiCompatibleAdapter::new(oai)?))
        }
    }
}

/// Read the provider's API key from the environment variable it names.
pub fn resolve_api_key(config: &ProviderConfig) -> Option<SecretString> {
    let var = config.api_key_env.as_deref()?;
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(SecretString::from(value)),
        _ => None,
    }
}

/// Build the startup registry from the configured providers.
///
/// Disabled providers are left out. A provider whose adapter cannot be built
/// (missing key, bad client setup) is skipped with a warning; the router
/// never picks an id that has no registered adapter.
pub fn build_registry(providers: &[ProviderConfig]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    for config in providers.iter().filter(|p| p.enabled) {
        match create_adapter(config, resolve_api_key(config)) {
            Ok(adapter) => {
                tracing::debug!(
                    provider = %config.provider_id,
                    provider_type = %config.provider_type,
                    model = %config.model,
                    "registered provider adapter"
                );
                registry.register(adapter);
            }
            Err(e) => {
                tracing::warn!(
                    provider = %config.provider_id,
                    error_kind = %e.kind(),
                    "skipping provider: {e}"
                );
            }
        }
    }

    registry
}
