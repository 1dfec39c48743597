//! Generation request/response types.
//!
//! A [`GenerationRequest`] is what callers hand to the orchestrator. It is
//! immutable once built and identified by its `id`. The orchestrator answers
//! with a [`GenerationResponse`] or, when streaming, a sequence of
//! [`StreamChunk`]s.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of output tokens requested when the caller does not say.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default overall time budget for one request.
pub const DEFAULT_DEADLINE_MS: u64 = 30_000;

/// Longest time budget honored for one request.
pub const MAX_DEADLINE_MS: u64 = 24 * 60 * 60 * 1000;

/// A request for text generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub prompt: String,
    /// Opaque caller tag supplied by the authentication layer. Never validated here.
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Whether to augment the prompt with retrieved knowledge chunks.
    #[serde(default)]
    pub use_context: bool,
    #[serde(default = "default_context_top_k")]
    pub context_top_k: usize,
    #[serde(default)]
    pub stream: bool,
    /// Overall time budget in milliseconds, measured from submission.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Caller policy flag. `false` for prompts with time- or user-scoped content.
    #[serde(default = "default_cacheable")]
    pub cacheable: bool,
}

fn default_context_top_k() -> usize {
    5
}

fn default_deadline_ms() -> u64 {
    DEFAULT_DEADLINE_MS
}

fn default_cacheable() -> bool {
    true
}

impl GenerationRequest {
    /// Create a request with a fresh time-sortable id and default parameters.
    pub fn new(prompt: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            prompt: prompt.into(),
            user_id: user_id.into(),
            preferred_provider: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.7,
            use_context: false,
            context_top_k: default_context_top_k(),
            stream: false,
            deadline_ms: DEFAULT_DEADLINE_MS,
            cacheable: true,
        }
    }

    pub fn with_preferred_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider_id.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enable context fusion, retrieving up to `top_k` chunks.
    pub fn with_context(mut self, top_k: usize) -> Self {
        self.use_context = true;
        self.context_top_k = top_k;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Mark the request as uncacheable (never read from or written to the cache).
    pub fn uncacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }

    /// The overall time budget as a [`Duration`], capped at one day.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms.min(MAX_DEADLINE_MS))
    }

    /// Whether a response to this request may be served from or stored in the cache.
    pub fn is_cacheable(&self) -> bool {
        self.cacheable && !self.stream
    }
}

/// A retrieved knowledge chunk supplied by the external retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub source_id: String,
    pub text: String,
    pub relevance_score: f32,
    pub token_estimate: u32,
}

/// The prompt actually sent to a provider after context fusion.
///
/// Ephemeral: owned by one request's processing and dropped after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedPrompt {
    pub final_text: String,
    pub chunks_used: Vec<ContextChunk>,
    /// `true` when at least one eligible chunk was dropped for budget reasons.
    pub truncated: bool,
}

impl AugmentedPrompt {
    /// A prompt with no context attached.
    pub fn plain(prompt: impl Into<String>) -> Self {
        Self {
            final_text: prompt.into(),
            chunks_used: Vec::new(),
            truncated: false,
        }
    }

    pub fn context_used(&self) -> bool {
        !self.chunks_used.is_empty()
    }

    /// Source ids of the chunks included, in prompt order.
    pub fn sources(&self) -> Vec<String> {
        self.chunks_used.iter().map(|c| c.source_id.clone()).collect()
    }
}

/// Final result of a non-streaming generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub request_id: Uuid,
    pub content: String,
    pub provider_used: String,
    pub tokens_used: u32,
    pub cost_estimate: f64,
    pub context_used: bool,
    pub sources: Vec<String>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    /// Providers tried and failed before `provider_used`, in chain order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failover_from: Vec<String>,
}

/// One element of a streamed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta_text: String,
    pub is_final: bool,
    /// Present on the final chunk only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta_text: text.into(),
            is_final: false,
            sources: None,
        }
    }

    pub fn last(sources: Vec<String>) -> Self {
        Self {
            delta_text: String::new(),
            is_final: true,
            sources: Some(sources),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_defaults() {
        let req = GenerationRequest::new("hello", "user-1");
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(req.deadline(), Duration::from_secs(30));
        assert!(!req.use_context);
        assert!(req.is_cacheable());
    }

    #[test]
    fn test_huge_deadline_saturates() {
        let req = GenerationRequest::new("hello", "user-1").with_deadline(Duration::MAX);
        assert_eq!(req.deadline_ms, u64::MAX);
        assert_eq!(req.deadline(), Duration::from_millis(MAX_DEADLINE_MS));
    }

    #[test]
    fn test_streaming_requests_are_not_cacheable() {
        let req = GenerationRequest::new("hello", "user-1").streaming();
        assert!(!req.is_cacheable());
    }

    #[test]
    fn test_uncacheable_flag() {
        let req = GenerationRequest::new("what time is it", "user-1").uncacheable();
        assert!(!req.is_cacheable());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = GenerationRequest::new("x", "u");
        let b = GenerationRequest::new("x", "u");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_request_deserialize_with_defaults() {
        let json = r#"{
            "id": "0190a5c4-0000-7000-8000-000000000000",
            "prompt": "hi",
            "user_id": "u",
            "max_tokens": 64,
            "temperature": 0.0
        }"#;
        let req: GenerationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.context_top_k, 5);
        assert_eq!(req.deadline_ms, DEFAULT_DEADLINE_MS);
        assert!(req.cacheable);
        assert!(req.preferred_provider.is_none());
    }

    #[test]
    fn test_augmented_prompt_sources() {
        let prompt = AugmentedPrompt {
            final_text: "x".to_string(),
            chunks_used: vec![ContextChunk {
                source_id: "doc-1".to_string(),
                text: "alpha".to_string(),
                relevance_score: 0.9,
                token_estimate: 2,
            }],
            truncated: false,
        };
        assert!(prompt.context_used());
        assert_eq!(prompt.sources(), vec!["doc-1".to_string()]);
        assert!(!AugmentedPrompt::plain("y").context_used());
    }
}
