//! Infrastructure for Switchyard.
//!
//! Concrete [`ProviderAdapter`](switchyard_core::llm::adapter::ProviderAdapter)
//! implementations, the startup provider registry, the default pricing table
//! and the TOML config loader.

pub mod config;
pub mod llm;
