//! Streaming generation.
//!
//! Failover is only possible before the first text delta reaches the caller.
//! Once output has been delivered, a mid-stream failure ends the stream with
//! `StreamInterrupted` rather than splicing another provider's output in.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::{Stream, StreamExt};

use switchyard_types::error::{OrchestratorError, ProviderFailure};
use switchyard_types::provider::{ProviderError, ProviderErrorKind, StreamEvent, Usage};
use switchyard_types::request::{GenerationRequest, StreamChunk};

use super::{Inner, Orchestrator, provider_request, terminal_error, validate_request};
use crate::llm::estimate_tokens;

/// Incremental output of [`Orchestrator::generate_stream`].
///
/// Yields text deltas, then exactly one terminal item: a final chunk carrying
/// the sources, or an error. Dropping it cancels the in-flight provider call.
pub type GenerationStream =
    Pin<Box<dyn Stream<Item = Result<StreamChunk, OrchestratorError>> + Send + 'static>>;

impl Orchestrator {
    /// Generate a response incrementally.
    pub fn generate_stream(&self, request: GenerationRequest) -> GenerationStream {
        let span = tracing::info_span!(
            "gen_ai.generate",
            request_id = %request.id,
            user_id = %request.user_id,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = request.temperature,
            gen_ai.request.stream = true,
        );
        let stream = run(Arc::clone(&self.inner), request);
        Box::pin(StreamInSpan {
            inner: Box::pin(stream),
            span,
        })
    }
}

fn run(
    inner: Arc<Inner>,
    mut request: GenerationRequest,
) -> impl Stream<Item = Result<StreamChunk, OrchestratorError>> + Send + 'static {
    async_stream::stream! {
        let started = Instant::now();
        request.stream = true;
        if let Err(err) = validate_request(&request) {
            yield Err(err);
            return;
        }
        let _in_flight = match inner.admit(request.id) {
            Ok(guard) => guard,
            Err(err) => {
                yield Err(err);
                return;
            }
        };
        let deadline = started + request.deadline();

        let augmented = inner.augment(&request, deadline).await;
        let chain = match inner.router.route(&request, &inner.health, &inner.registry) {
            Ok(chain) => chain,
            Err(err) => {
                yield Err(err);
                return;
            }
        };
        let prompt_tokens = estimate_tokens(&augmented.final_text);

        let mut failures: Vec<ProviderFailure> = Vec::new();
        for provider in &chain {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let id = provider.provider_id.as_str();
            let adapter = match inner.adapter_for(id) {
                Ok(adapter) => adapter,
                Err(failure) => {
                    failures.push(failure);
                    continue;
                }
            };
            let estimate = u64::from(prompt_tokens) + u64::from(request.max_tokens);
            let (reservation, permit) = match inner.admit_provider(provider, estimate) {
                Ok(admitted) => admitted,
                Err(failure) => {
                    failures.push(failure);
                    continue;
                }
            };

            let idle_timeout = provider.timeout();
            let overall = tokio::time::Instant::from_std(deadline);
            let mut events = adapter.generate_stream(provider_request(
                provider,
                &request,
                &augmented,
                remaining.min(idle_timeout),
            ));
            tracing::debug!(provider = %id, "Stream opened");

            let call_start = Instant::now();
            let mut delivered = false;
            let mut output = String::new();
            let mut usage = Usage::default();

            let outcome: Result<(), ProviderError> = loop {
                let next_deadline = overall.min(tokio::time::Instant::now() + idle_timeout);
                match tokio::time::timeout_at(next_deadline, events.next()).await {
                    Err(_) => {
                        break Err(ProviderError::Timeout(format!(
                            "no stream event within {}ms",
                            idle_timeout.min(remaining).as_millis()
                        )));
                    }
                    Ok(None) | Ok(Some(Ok(StreamEvent::Done))) => break Ok(()),
                    Ok(Some(Ok(StreamEvent::TextDelta { text }))) => {
                        if text.is_empty() {
                            continue;
                        }
                        delivered = true;
                        output.push_str(&text);
                        yield Ok(StreamChunk::delta(text));
                    }
                    Ok(Some(Ok(StreamEvent::Usage(reported)))) => {
                        usage.input_tokens = usage.input_tokens.max(reported.input_tokens);
                        usage.output_tokens = usage.output_tokens.max(reported.output_tokens);
                    }
                    Ok(Some(Ok(StreamEvent::Connected | StreamEvent::MessageDelta { .. }))) => {}
                    Ok(Some(Err(err))) => break Err(err),
                }
            };
            drop(events);
            let latency_ms = call_start.elapsed().as_millis() as u64;

            let tokens = if usage.total() > 0 {
                usage.total()
            } else {
                prompt_tokens.saturating_add(estimate_tokens(&output))
            };

            match outcome {
                Ok(()) => {
                    let cost = provider.cost_for(u64::from(tokens));
                    reservation.commit(u64::from(tokens), cost);
                    permit.success(latency_ms);
                    if !failures.is_empty() {
                        tracing::warn!(
                            provider = %id,
                            failover_from = ?failures.iter().map(|f| f.provider_id.as_str()).collect::<Vec<_>>(),
                            "Failover occurred"
                        );
                    }
                    tracing::info!(provider = %id, latency_ms, tokens_used = tokens, cost, "Stream completed");
                    yield Ok(StreamChunk::last(augmented.sources()));
                    return;
                }
                Err(err) => {
                    let kind = err.kind();
                    tracing::warn!(
                        provider = %id,
                        latency_ms,
                        error_kind = %kind,
                        error = %err,
                        delivered,
                        "Provider stream failed"
                    );
                    permit.failure(kind, &err.to_string(), err.retry_after_ms(), latency_ms);

                    if delivered {
                        // Output already reached the caller; bill what was produced.
                        reservation.commit(u64::from(tokens), provider.cost_for(u64::from(tokens)));
                        yield Err(OrchestratorError::StreamInterrupted {
                            provider_id: id.to_string(),
                            kind: kind.into(),
                            message: err.to_string(),
                        });
                        return;
                    }
                    drop(reservation);
                    if kind == ProviderErrorKind::InvalidRequest {
                        yield Err(OrchestratorError::InvalidRequest(err.to_string()));
                        return;
                    }
                    failures.push(ProviderFailure {
                        provider_id: id.to_string(),
                        kind: kind.into(),
                        message: err.to_string(),
                        latency_ms,
                    });
                }
            }
        }

        yield Err(terminal_error(started, deadline, failures));
    }
}

/// Keeps the request span entered while the stream is polled.
struct StreamInSpan {
    inner: Pin<Box<dyn Stream<Item = Result<StreamChunk, OrchestratorError>> + Send + 'static>>,
    span: tracing::Span,
}

impl Stream for StreamInSpan {
    type Item = Result<StreamChunk, OrchestratorError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Both fields are Unpin, so no projection is needed.
        let this = self.get_mut();
        let _enter = this.span.enter();
        this.inner.as_mut().poll_next(cx)
    }
}
