//! Application state: the configured orchestrator.

use std::path::{Path, PathBuf};

use anyhow::Context;

use switchyard_core::Orchestrator;
use switchyard_infra::config::load_config;
use switchyard_infra::llm::build_registry;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub config_path: PathBuf,
}

impl AppState {
    /// Load the config, build adapters for every enabled provider whose key
    /// resolves, and assemble the orchestrator.
    pub async fn init(config_path: &Path) -> anyhow::Result<Self> {
        let config = load_config(config_path)
            .await
            .with_context(|| format!("loading {}", config_path.display()))?;

        if config.providers.is_empty() {
            tracing::warn!(
                path = %config_path.display(),
                "no providers configured; every request will fail"
            );
        }

        let registry = build_registry(&config.providers);
        let orchestrator = Orchestrator::builder(config, registry)
            .build()
            .context("building orchestrator")?;

        Ok(Self {
            orchestrator,
            config_path: config_path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_with_missing_config_has_no_providers() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::init(&tmp.path().join("switchyard.toml")).await.unwrap();
        assert!(state.orchestrator.providers().is_empty());
        assert!(state.orchestrator.health_snapshot().is_empty());
    }

    #[tokio::test]
    async fn init_rejects_invalid_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("switchyard.toml");
        tokio::fs::write(&path, "[circuit_breaker]\nfailure_threshold = 0\n")
            .await
            .unwrap();
        let err = AppState::init(&path).await.err().unwrap();
        assert!(format!("{err:#}").contains("failure_threshold"));
    }
}
