//! Retriever port for external knowledge search.
//!
//! The orchestrator consumes ranked text chunks; ranking and embedding live
//! behind this trait in whatever knowledge store the host application uses.

use std::future::Future;
use std::pin::Pin;

use switchyard_types::error::RetrieverError;
use switchyard_types::request::ContextChunk;

/// Trait for knowledge retrieval backends.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Retriever: Send + Sync {
    /// Return up to `top_k` chunks relevant to `query`, best first.
    fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<ContextChunk>, RetrieverError>> + Send;
}

/// Object-safe version of [`Retriever`] with a boxed future.
pub trait RetrieverDyn: Send + Sync {
    fn search_boxed<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ContextChunk>, RetrieverError>> + Send + 'a>>;
}

impl<T: Retriever> RetrieverDyn for T {
    fn search_boxed<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ContextChunk>, RetrieverError>> + Send + 'a>> {
        Box::pin(self.search(query, top_k))
    }
}

/// Type-erased retriever held by the orchestrator.
pub struct BoxRetriever {
    inner: Box<dyn RetrieverDyn + Send + Sync>,
}

impl BoxRetriever {
    pub fn new<T: Retriever + 'static>(retriever: T) -> Self {
        Self {
            inner: Box::new(retriever),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ContextChunk>, RetrieverError> {
        self.inner.search_boxed(query, top_k).await
    }
}

impl std::fmt::Debug for BoxRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxRetriever")
    }
}
