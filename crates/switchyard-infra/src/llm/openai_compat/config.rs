//! Configuration and per-vendor defaults for OpenAI-compatible backends.
//!
//! Each vendor that speaks the chat completions protocol gets a factory
//! returning an [`OpenAiCompatConfig`] with its base URL and limits.

use secrecy::SecretString;

use switchyard_types::provider::ProviderLimits;

/// Configuration for an [`super::OpenAiCompatibleAdapter`].
pub struct OpenAiCompatConfig {
    /// Registry id of the provider this adapter serves.
    pub provider_id: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    pub base_url: String,
    pub api_key: SecretString,
    /// Default model (e.g., "gpt-4o").
    pub model: String,
    pub limits: ProviderLimits,
}

fn limits(max_context_tokens: u32, max_output_tokens: u32) -> ProviderLimits {
    ProviderLimits {
        streaming: true,
        max_context_tokens,
        max_output_tokens,
    }
}

/// OpenAI: `https://api.openai.com/v1`, 128K context, 16K output.
pub fn openai_defaults(provider_id: &str, api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_id: provider_id.into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key,
        model: model.into(),
        limits: limits(128_000, 16_384),
    }
}

/// Google Gemini (OpenAI-compatible beta endpoint), 1M context, 64K output.
pub fn gemini_defaults(provider_id: &str, api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_id: provider_id.into(),
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        api_key,
        model: model.into(),
        limits: limits(1_000_000, 65_536),
    }
}

/// Mistral AI: `https://api.mistral.ai/v1`, 128K context, 32K output.
pub fn mistral_defaults(provider_id: &str, api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_id: provider_id.into(),
        base_url: "https://api.mistral.ai/v1".into(),
        api_key,
        model: model.into(),
        limits: limits(128_000, 32_768),
    }
}

/// Custom endpoint with conservative limits.
pub fn custom(
    provider_id: &str,
    base_url: &str,
    api_key: SecretString,
    model: &str,
) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_id: provider_id.into(),
        base_url: base_url.trim_end_matches('/').into(),
        api_key,
        model: model.into(),
        limits: limits(32_000, 4_096),
    }
}

/// Pick vendor defaults from the model name when no base URL is configured.
pub fn infer_defaults(provider_id: &str, api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    if model.starts_with("gemini") {
        gemini_defaults(provider_id, api_key, model)
    } else if model.starts_with("mistral") || model.starts_with("codestral") {
        mistral_defaults(provider_id, api_key, model)
    } else {
        openai_defaults(provider_id, api_key, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretString {
        SecretString::from("sk-test")
    }

    #[test]
    fn test_openai_defaults() {
        let config = openai_defaults("gpt", key(), "gpt-4o");
        assert_eq!(config.provider_id, "gpt");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o");
        assert!(config.limits.streaming);
        assert_eq!(config.limits.max_output_tokens, 16_384);
    }

    #[test]
    fn test_infer_defaults_by_model() {
        let gemini = infer_defaults("g", key(), "gemini-2.5-pro");
        assert!(gemini.base_url.contains("generativelanguage.googleapis.com"));
        assert_eq!(gemini.limits.max_context_tokens, 1_000_000);

        let mistral = infer_defaults("m", key(), "mistral-large-latest");
        assert_eq!(mistral.base_url, "https://api.mistral.ai/v1");

        let other = infer_defaults("o", key(), "o3-mini");
        assert_eq!(other.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_custom_trims_trailing_slash() {
        let config = custom("local", "http://localhost:11434/v1/", key(), "llama3");
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert_eq!(config.limits.max_output_tokens, 4_096);
    }
}
