//! Anthropic Claude adapter.
//!
//! [`AnthropicAdapter`] implements the
//! [`ProviderAdapter`](switchyard_core::llm::adapter::ProviderAdapter) port for
//! the Anthropic Messages API, including SSE streaming.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::AnthropicAdapter;
