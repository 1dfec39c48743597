//! Anthropic Messages API types.
//!
//! Wire structures for `/v1/messages` only. The provider-agnostic shapes live
//! in `switchyard-types`.

use serde::{Deserialize, Serialize};

/// Request body for the Anthropic Messages API.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<AnthropicMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A single message in an Anthropic conversation.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// SSE event payloads
//
// The `event:` field names the event type and `data:` carries JSON. Each
// payload is deserialized into the struct matching the event name.
// ---------------------------------------------------------------------------

/// Payload for `event: message_start`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartPayload {
    pub message: AnthropicMessageObj,
}

/// The message object inside a `message_start` event.
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicMessageObj {
    pub id: String,
    pub model: String,
    pub usage: Option<AnthropicUsage>,
}

/// A content block in a non-streaming response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Payload for `event: content_block_delta`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlockDeltaPayload {
    pub index: u32,
    pub delta: AnthropicDelta,
}

/// Delta types within a content block. Only text is surfaced.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Payload for `event: message_delta`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaPayload {
    pub delta: MessageDeltaObj,
    #[serde(default)]
    pub usage: AnthropicUsage,
}

/// The delta object inside a `message_delta` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaObj {
    pub stop_reason: Option<String>,
}

/// Token usage from Anthropic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Payload for `event: error`, and the body of non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub error: AnthropicError,
}

/// An error from the Anthropic API.
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Non-streaming response from the Anthropic Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicNonStreamResponse {
    pub id: String,
    pub content: Vec<AnthropicContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: AnthropicUsage,
}
