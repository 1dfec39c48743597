//! SSE stream handling for the Anthropic Messages API.
//!
//! Event order on the wire:
//! 1. `message_start` -- message object with initial usage
//! 2. Per block: `content_block_start` -> N x `content_block_delta` -> `content_block_stop`
//! 3. `message_delta` -- stop_reason and cumulative output usage
//! 4. `message_stop` -- final event
//!
//! `ping` events may appear anywhere; `error` events may appear mid-stream.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;

use switchyard_core::llm::adapter::ProviderEventStream;
use switchyard_types::provider::{ProviderError, StopReason, StreamEvent, Usage};

use crate::llm::http::map_reqwest_error;

use super::client::check_status;
use super::types::{
    AnthropicDelta, ContentBlockDeltaPayload, ErrorPayload, MessageDeltaPayload,
    MessageStartPayload,
};

/// Open a streaming call and map Anthropic SSE events to [`StreamEvent`]s.
///
/// `request` must already carry auth headers and a body with `stream: true`.
/// The connection is closed when the returned stream is dropped.
pub fn create_anthropic_stream(request: reqwest::RequestBuilder) -> ProviderEventStream {
    Box::pin(async_stream::try_stream! {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        yield StreamEvent::Connected;

        let mut events = response.bytes_stream().eventsource();
        let mut finished = false;
        while let Some(event) = events.next().await {
            let event = event
                .map_err(|e| ProviderError::TransientServer(format!("SSE stream error: {e}")))?;
            for mapped in process_sse_event(&event.event, &event.data)? {
                if mapped == StreamEvent::Done {
                    finished = true;
                }
                yield mapped;
            }
            if finished {
                break;
            }
        }

        if !finished {
            Err(ProviderError::TransientServer(
                "stream ended before message_stop".to_string(),
            ))?;
        }
    })
}

/// Translate one SSE event into zero or more [`StreamEvent`]s.
pub(crate) fn process_sse_event(
    event_type: &str,
    data: &str,
) -> Result<Vec<StreamEvent>, ProviderError> {
    let mut events = Vec::new();

    match event_type {
        "message_start" => {
            let payload: MessageStartPayload = parse(event_type, data)?;
            if let Some(usage) = payload.message.usage {
                events.push(StreamEvent::Usage(Usage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                }));
            }
        }

        "content_block_delta" => {
            let payload: ContentBlockDeltaPayload = parse(event_type, data)?;
            if let AnthropicDelta::TextDelta { text } = payload.delta {
                events.push(StreamEvent::TextDelta { text });
            }
        }

        "message_delta" => {
            let payload: MessageDeltaPayload = parse(event_type, data)?;
            if let Some(reason) = payload.delta.stop_reason.as_deref() {
                events.push(StreamEvent::MessageDelta {
                    stop_reason: map_stop_reason(Some(reason)),
                });
            }
            // Output tokens here are cumulative; input is usually absent (0).
            events.push(StreamEvent::Usage(Usage {
                input_tokens: payload.usage.input_tokens,
                output_tokens: payload.usage.output_tokens,
            }));
        }

        "message_stop" => events.push(StreamEvent::Done),

        "error" => {
            let payload: ErrorPayload = parse(event_type, data)?;
            return Err(map_api_error(&payload.error.error_type, payload.error.message));
        }

        // ping, content_block_start, content_block_stop, and anything newer
        _ => {}
    }

    Ok(events)
}

fn parse<T: serde::de::DeserializeOwned>(event_type: &str, data: &str) -> Result<T, ProviderError> {
    serde_json::from_str(data)
        .map_err(|e| ProviderError::Unknown(format!("malformed {event_type} event: {e}")))
}

pub(crate) fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

/// Map an Anthropic error type string to a normalized error.
pub(crate) fn map_api_error(error_type: &str, message: String) -> ProviderError {
    match error_type {
        "authentication_error" | "permission_error" => ProviderError::Auth(message),
        "invalid_request_error" | "not_found_error" | "request_too_large" => {
            ProviderError::InvalidRequest(message)
        }
        "rate_limit_error" => ProviderError::RateLimited {
            retry_after_ms: None,
        },
        "overloaded_error" | "api_error" => ProviderError::TransientServer(message),
        _ => ProviderError::Unknown(message),
    }
}
