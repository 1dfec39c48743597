//! Scripted adapters and retrievers for orchestrator tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchyard_types::config::OrchestratorConfig;
use switchyard_types::error::RetrieverError;
use switchyard_types::provider::{
    ProviderConfig, ProviderError, ProviderLimits, ProviderRequest, ProviderResponse,
    ProviderType, StopReason, StreamEvent, Usage,
};
use switchyard_types::request::ContextChunk;

use crate::context::Retriever;
use crate::llm::adapter::{ProviderAdapter, ProviderEventStream};
use crate::llm::box_adapter::BoxProviderAdapter;
use crate::llm::registry::ProviderRegistry;

/// What the mock does on one call.
#[derive(Debug, Clone)]
pub enum Behavior {
    Reply(String),
    /// Reply with the prompt it was sent.
    Echo,
    Fail(ProviderError),
    Delay(Duration, String),
    Stream(Vec<String>),
    StreamFail {
        deltas: Vec<String>,
        error: ProviderError,
    },
    /// Emit the deltas, then never finish.
    StreamHang(Vec<String>),
}

#[derive(Debug)]
struct Script {
    behaviors: Mutex<VecDeque<Behavior>>,
    usage: Mutex<Usage>,
    calls: AtomicUsize,
}

/// Adapter that follows a behavior script. The last behavior repeats.
#[derive(Debug, Clone)]
pub struct MockAdapter {
    id: String,
    script: Arc<Script>,
}

impl MockAdapter {
    pub fn new(id: &str, behavior: Behavior) -> Self {
        Self {
            id: id.to_string(),
            script: Arc::new(Script {
                behaviors: Mutex::new(VecDeque::from([behavior])),
                usage: Mutex::new(Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                }),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn then(self, behavior: Behavior) -> Self {
        self.script.behaviors.lock().unwrap().push_back(behavior);
        self
    }

    pub fn with_usage(self, input_tokens: u32, output_tokens: u32) -> Self {
        *self.script.usage.lock().unwrap() = Usage {
            input_tokens,
            output_tokens,
        };
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> (Behavior, Usage) {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        let mut behaviors = self.script.behaviors.lock().unwrap();
        let behavior = if behaviors.len() > 1 {
            behaviors.pop_front().unwrap()
        } else {
            behaviors.front().cloned().unwrap()
        };
        (behavior, *self.script.usage.lock().unwrap())
    }

    fn reply(&self, content: String, usage: Usage) -> ProviderResponse {
        ProviderResponse {
            id: format!("{}-msg", self.id),
            content,
            model: "mock".to_string(),
            stop_reason: StopReason::EndTurn,
            usage,
        }
    }
}

impl ProviderAdapter for MockAdapter {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let (behavior, usage) = self.next();
        match behavior {
            Behavior::Reply(content) => Ok(self.reply(content, usage)),
            Behavior::Echo => Ok(self.reply(request.prompt.clone(), usage)),
            Behavior::Fail(err) | Behavior::StreamFail { error: err, .. } => Err(err),
            Behavior::Delay(delay, content) => {
                tokio::time::sleep(delay).await;
                Ok(self.reply(content, usage))
            }
            Behavior::Stream(deltas) => Ok(self.reply(deltas.concat(), usage)),
            Behavior::StreamHang(_) => std::future::pending().await,
        }
    }

    fn generate_stream(&self, request: ProviderRequest) -> ProviderEventStream {
        let (behavior, usage) = self.next();
        Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::Connected);
            let (deltas, tail) = match behavior {
                Behavior::Reply(content) => (vec![content], None),
                Behavior::Echo => (vec![request.prompt.clone()], None),
                Behavior::Fail(err) => (vec![], Some(Err(err))),
                Behavior::Delay(delay, content) => {
                    tokio::time::sleep(delay).await;
                    (vec![content], None)
                }
                Behavior::Stream(deltas) => (deltas, None),
                Behavior::StreamFail { deltas, error } => (deltas, Some(Err(error))),
                Behavior::StreamHang(deltas) => (deltas, Some(Ok(()))),
            };
            for text in deltas {
                yield Ok(StreamEvent::TextDelta { text });
            }
            match tail {
                None => {
                    if usage.total() > 0 {
                        yield Ok(StreamEvent::Usage(usage));
                    }
                    yield Ok(StreamEvent::Done);
                }
                Some(Err(err)) => {
                    yield Err(err);
                }
                Some(Ok(())) => std::future::pending::<()>().await,
            }
        })
    }

    fn describe_limits(&self) -> ProviderLimits {
        ProviderLimits {
            streaming: true,
            max_context_tokens: 100_000,
            max_output_tokens: 8_192,
        }
    }
}

/// Retriever returning a fixed result.
pub struct MockRetriever {
    result: Result<Vec<ContextChunk>, RetrieverError>,
}

impl MockRetriever {
    /// Chunks given as `(source_id, relevance, token_estimate)`.
    pub fn chunks(chunks: Vec<(&str, f32, u32)>) -> Self {
        let chunks = chunks
            .into_iter()
            .map(|(source_id, relevance_score, token_estimate)| ContextChunk {
                source_id: source_id.to_string(),
                text: format!("text of {source_id}"),
                relevance_score,
                token_estimate,
            })
            .collect();
        Self { result: Ok(chunks) }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(RetrieverError::Unavailable("index offline".to_string())),
        }
    }
}

impl Retriever for MockRetriever {
    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<ContextChunk>, RetrieverError> {
        self.result
            .clone()
            .map(|chunks| chunks.into_iter().take(top_k).collect())
    }
}

/// Provider priced at $0.01 per 1k tokens.
pub fn provider(id: &str, weight: f64) -> ProviderConfig {
    let mut config = ProviderConfig::new(id, ProviderType::Anthropic, "mock-model");
    config.weight = weight;
    config.cost_per_1k_tokens = Some(0.01);
    config
}

pub fn config(providers: Vec<ProviderConfig>) -> OrchestratorConfig {
    OrchestratorConfig {
        providers,
        ..Default::default()
    }
}

pub fn registry(adapters: Vec<MockAdapter>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for adapter in adapters {
        registry.register(BoxProviderAdapter::new(adapter));
    }
    registry
}
