//! Chat completions SSE stream to [`StreamEvent`] adapter.
//!
//! Emits `Connected`, then a `TextDelta` per non-empty content chunk, a
//! `MessageDelta` when a finish reason arrives, `Usage` from the final chunk
//! (requires `stream_options.include_usage`), and `Done` at the end.
//!
//! A stream that closes before any finish reason was seen is an error, even
//! when the server sent `[DONE]`.

use async_openai::error::WrappedError;
use async_openai::types::chat::{CreateChatCompletionStreamResponse, FinishReason};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;

use switchyard_core::llm::adapter::ProviderEventStream;
use switchyard_types::provider::{ProviderError, StopReason, StreamEvent, Usage};

use crate::llm::http::map_reqwest_error;

use super::{check_status, map_api_error};

/// Open a streaming call and map chat completion chunks to [`StreamEvent`]s.
///
/// The connection is closed when the returned stream is dropped.
pub fn create_openai_stream(request: reqwest::RequestBuilder) -> ProviderEventStream {
    Box::pin(async_stream::try_stream! {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        yield StreamEvent::Connected;

        let mut events = response.bytes_stream().eventsource();
        let mut finished = false;
        while let Some(event) = events.next().await {
            let event = event
                .map_err(|e| ProviderError::TransientServer(format!("SSE stream error: {e}")))?;
            if event.data.trim() == "[DONE]" {
                break;
            }
            let chunk = parse_chunk(&event.data)?;
            for mapped in map_chunk(&chunk) {
                if matches!(mapped, StreamEvent::MessageDelta { .. }) {
                    finished = true;
                }
                yield mapped;
            }
        }

        if !finished {
            Err(ProviderError::TransientServer(
                "stream ended before finish_reason".to_string(),
            ))?;
        }
        yield StreamEvent::Done;
    })
}

/// Parse one `data:` payload. Servers report mid-stream failures as an
/// `{"error": {...}}` object in place of a chunk.
fn parse_chunk(data: &str) -> Result<CreateChatCompletionStreamResponse, ProviderError> {
    match serde_json::from_str(data) {
        Ok(chunk) => Ok(chunk),
        Err(chunk_err) => match serde_json::from_str::<WrappedError>(data) {
            Ok(wrapped) => Err(map_api_error(None, wrapped.error, None)),
            Err(_) => Err(ProviderError::Unknown(format!(
                "malformed chat completion chunk: {chunk_err}"
            ))),
        },
    }
}

fn map_chunk(chunk: &CreateChatCompletionStreamResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(usage) = chunk.usage.as_ref() {
        events.push(StreamEvent::Usage(Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    for choice in &chunk.choices {
        if let Some(text) = choice.delta.content.as_ref().filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextDelta { text: text.clone() });
        }
        if let Some(reason) = choice.finish_reason.as_ref() {
            events.push(StreamEvent::MessageDelta {
                stop_reason: map_finish_reason(reason),
            });
        }
    }

    events
}

pub(crate) fn map_finish_reason(reason: &FinishReason) -> StopReason {
    match reason {
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::Stop
        | FinishReason::ToolCalls
        | FinishReason::ContentFilter
        | FinishReason::FunctionCall => StopReason::EndTurn,
    }
}
