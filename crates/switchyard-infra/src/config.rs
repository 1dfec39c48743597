//! Configuration loader.
//!
//! Reads `switchyard.toml` into an [`OrchestratorConfig`]. A missing file
//! yields the defaults; a file that exists but cannot be read, parsed or
//! validated is an error. Provider prices omitted from the file are filled
//! from the default pricing table.

use std::path::Path;

use switchyard_types::config::OrchestratorConfig;
use switchyard_types::error::ConfigError;

use crate::llm::pricing::default_cost_per_1k;

/// Load and validate configuration from `path`.
pub async fn load_config(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return Ok(OrchestratorConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut config = parse_config(&content)?;
    fill_default_prices(&mut config);
    config.validate()?;

    tracing::debug!(
        path = %path.display(),
        providers = config.providers.len(),
        "loaded configuration"
    );
    Ok(config)
}

/// Parse a TOML document without touching the filesystem.
pub fn parse_config(content: &str) -> Result<OrchestratorConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn fill_default_prices(config: &mut OrchestratorConfig) {
    for provider in config
        .providers
        .iter_mut()
        .filter(|p| p.cost_per_1k_tokens.is_none())
    {
        let price = default_cost_per_1k(provider.provider_type, &provider.model);
        tracing::debug!(
            provider = %provider.provider_id,
            cost_per_1k = price,
            "using default price"
        );
        provider.cost_per_1k_tokens = Some(price);
    }
}
