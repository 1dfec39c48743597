//! BoxProviderAdapter -- object-safe dynamic dispatch wrapper for ProviderAdapter.
//!
//! 1. Define an object-safe `ProviderAdapterDyn` trait with boxed futures
//! 2. Blanket-impl `ProviderAdapterDyn` for all `T: ProviderAdapter`
//! 3. `BoxProviderAdapter` wraps `Box<dyn ProviderAdapterDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use switchyard_types::provider::{
    ProviderError, ProviderLimits, ProviderRequest, ProviderResponse,
};

use super::adapter::{ProviderAdapter, ProviderEventStream};

/// Object-safe version of [`ProviderAdapter`] with boxed futures.
pub trait ProviderAdapterDyn: Send + Sync {
    fn provider_id(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + 'a>>;

    fn generate_stream_boxed(&self, request: ProviderRequest) -> ProviderEventStream;

    fn describe_limits(&self) -> ProviderLimits;
}

impl<T: ProviderAdapter> ProviderAdapterDyn for T {
    fn provider_id(&self) -> &str {
        ProviderAdapter::provider_id(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + 'a>> {
        Box::pin(self.generate(request))
    }

    fn generate_stream_boxed(&self, request: ProviderRequest) -> ProviderEventStream {
        self.generate_stream(request)
    }

    fn describe_limits(&self) -> ProviderLimits {
        ProviderAdapter::describe_limits(self)
    }
}

/// Type-erased provider adapter for runtime selection.
///
/// Since `ProviderAdapter` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxProviderAdapter` provides equivalent methods that delegate to
/// the inner `ProviderAdapterDyn` trait object.
pub struct BoxProviderAdapter {
    inner: Box<dyn ProviderAdapterDyn + Send + Sync>,
}

impl BoxProviderAdapter {
    /// Wrap a concrete `ProviderAdapter` in a type-erased box.
    pub fn new<T: ProviderAdapter + 'static>(adapter: T) -> Self {
        Self {
            inner: Box::new(adapter),
        }
    }

    pub fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }

    pub async fn generate(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.inner.generate_boxed(request).await
    }

    pub fn generate_stream(&self, request: ProviderRequest) -> ProviderEventStream {
        self.inner.generate_stream_boxed(request)
    }

    pub fn describe_limits(&self) -> ProviderLimits {
        self.inner.describe_limits()
    }
}

impl std::fmt::Debug for BoxProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxProviderAdapter")
            .field("provider_id", &self.provider_id())
            .finish()
    }
}
