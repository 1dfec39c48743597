//! ProviderAdapter trait definition.
//!
//! This is the capability interface every backend implements. Uses RPITIT for
//! `generate` and `Pin<Box<dyn Stream>>` for `generate_stream` (streams need
//! to be object-safe for the `BoxProviderAdapter` wrapper).

use std::pin::Pin;

use futures_util::Stream;

use switchyard_types::provider::{
    ProviderError, ProviderLimits, ProviderRequest, ProviderResponse, StreamEvent,
};

/// Boxed stream of adapter events.
pub type ProviderEventStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send + 'static>>;

/// Trait for backend language-model providers (Anthropic, OpenAI-compatible, ...).
///
/// Each implementation owns its wire-protocol translation and reports errors
/// normalized into [`ProviderError`]. Adapters make exactly one outbound call
/// per invocation: retries and failover are the orchestrator's job.
///
/// Implementations live in switchyard-infra.
pub trait ProviderAdapter: Send + Sync {
    /// Identifier this adapter is registered under (matches `ProviderConfig.provider_id`).
    fn provider_id(&self) -> &str;

    /// Send a request and receive the full response.
    fn generate(
        &self,
        request: &ProviderRequest,
    ) -> impl std::future::Future<Output = Result<ProviderResponse, ProviderError>> + Send;

    /// Open a streaming call. Dropping the returned stream closes the upstream
    /// connection.
    fn generate_stream(&self, request: ProviderRequest) -> ProviderEventStream;

    /// Limits advertised by the backend.
    fn describe_limits(&self) -> ProviderLimits;
}
