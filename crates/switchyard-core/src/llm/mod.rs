//! Provider abstractions and per-provider runtime state.
//!
//! - `ProviderAdapter`: RPITIT trait for concrete backend implementations
//! - `BoxProviderAdapter`: object-safe wrapper for dynamic dispatch
//! - `ProviderRegistry`: startup-built `provider_id -> adapter` map
//! - `HealthTracker`: per-provider circuit breaker
//! - `Router`: candidate filtering and failover chain ordering

pub mod adapter;
pub mod box_adapter;
pub mod health;
pub mod registry;
pub mod router;

/// Rough token estimate for text when a backend reports no usage (~4 chars per token).
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}
