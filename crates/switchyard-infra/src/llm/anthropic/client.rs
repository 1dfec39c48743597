//! AnthropicAdapter -- [`ProviderAdapter`] for the Anthropic Messages API.
//!
//! Sends requests to `/v1/messages` with the `x-api-key` and
//! `anthropic-version` headers. Supports both single-shot (`generate`) and
//! SSE streaming (`generate_stream`) calls.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use secrecy::{ExposeSecret, SecretString};

use switchyard_core::llm::adapter::{ProviderAdapter, ProviderEventStream};
use switchyard_types::provider::{
    ProviderError, ProviderLimits, ProviderRequest, ProviderResponse, Usage,
};

use crate::llm::http::{build_client, map_reqwest_error, parse_retry_after};

use super::streaming::{create_anthropic_stream, map_api_error, map_stop_reason};
use super::types::{
    AnthropicContentBlock, AnthropicMessage, AnthropicNonStreamResponse, AnthropicRequest,
    ErrorPayload,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic Claude adapter.
///
/// # API Key Security
///
/// The API key is stored as a [`SecretString`] and is only exposed when
/// building request headers.
pub struct AnthropicAdapter {
    provider_id: String,
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    limits: ProviderLimits,
}

impl AnthropicAdapter {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(
        provider_id: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = build_client()?;
        let model = model.into();

        Ok(Self {
            provider_id: provider_id.into(),
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            limits: Self::limits_for_model(&model),
            model,
        })
    }

    /// Override the base URL (proxies, local gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn limits_for_model(model: &str) -> ProviderLimits {
        let max_output_tokens = if model.contains("opus") {
            32_000
        } else if model.contains("sonnet") || model.contains("haiku") {
            8_192
        } else {
            4_096
        };
        ProviderLimits {
            streaming: true,
            max_context_tokens: 200_000,
            max_output_tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn to_anthropic_request(&self, request: &ProviderRequest, stream: bool) -> AnthropicRequest {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };
        AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            stream,
            temperature: Some(request.temperature),
        }
    }

    fn post(&self, body: &AnthropicRequest) -> reqwest::RequestBuilder {
        self.client
            .post(self.url("/v1/messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }
}

// No Debug derive: keeps internal state out of logs. The key itself is a SecretString.

impl ProviderAdapter for AnthropicAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = self.to_anthropic_request(request, false);
        let response = self
            .post(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;

        let parsed: AnthropicNonStreamResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("failed to parse response: {e}")))?;

        let content = parsed
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                AnthropicContentBlock::Other => None,
            })
            .collect::<String>();

        Ok(ProviderResponse {
            id: parsed.id,
            content,
            model: parsed.model,
            stop_reason: map_stop_reason(parsed.stop_reason.as_deref()),
            usage: Usage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }

    fn generate_stream(&self, request: ProviderRequest) -> ProviderEventStream {
        let body = self.to_anthropic_request(&request, true);
        create_anthropic_stream(self.post(&body))
    }

    fn describe_limits(&self) -> ProviderLimits {
        self.limits.clone()
    }
}

/// Pass 2xx responses through; turn anything else into a normalized error.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after_ms = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();

    // Prefer the typed error body when the API sent one.
    match serde_json::from_str::<ErrorPayload>(&body) {
        Ok(payload) if status.as_u16() != 429 && !status.is_server_error() => {
            Err(map_api_error(&payload.error.error_type, payload.error.message))
        }
        Ok(payload) => Err(ProviderError::from_status(
            status.as_u16(),
            payload.error.message,
            retry_after_ms,
        )),
        Err(_) => Err(ProviderError::from_status(status.as_u16(), body, retry_after_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_adapter() -> AnthropicAdapter {
        AnthropicAdapter::new(
            "claude",
            SecretString::from("test-key-not-real"),
            "claude-sonnet-4-20250514",
        )
        .unwrap()
    }

    fn request(model: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.to_string(),
            prompt: "Hello".to_string(),
            max_tokens: 256,
            temperature: 0.2,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_provider_id_and_limits() {
        let adapter = make_adapter();
        assert_eq!(adapter.provider_id(), "claude");
        let limits = adapter.describe_limits();
        assert!(limits.streaming);
        assert_eq!(limits.max_output_tokens, 8_192);
    }

    #[test]
    fn test_opus_limits() {
        let adapter =
            AnthropicAdapter::new("opus", SecretString::from("k"), "claude-opus-4-20250514")
                .unwrap();
        assert_eq!(adapter.describe_limits().max_output_tokens, 32_000);
    }

    #[test]
    fn test_request_uses_configured_model_when_empty() {
        let adapter = make_adapter();
        let body = adapter.to_anthropic_request(&request(""), true);
        assert_eq!(body.model, "claude-sonnet-4-20250514");
        assert!(body.stream);
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.temperature, Some(0.2));

        let body = adapter.to_anthropic_request(&request("claude-haiku-3-5"), false);
        assert_eq!(body.model, "claude-haiku-3-5");
    }

    #[test]
    fn test_base_url_override() {
        let adapter = make_adapter().with_base_url("http://localhost:8080/");
        assert_eq!(adapter.url("/v1/messages"), "http://localhost:8080/v1/messages");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let adapter = make_adapter().with_base_url("http://127.0.0.1:9");
        let err = adapter.generate(&request("")).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::TransientServer(_) | ProviderError::Timeout(_)
        ));
    }

    mod wire {
        use super::*;
        use futures_util::StreamExt;
        use switchyard_types::provider::{ProviderErrorKind, StopReason, StreamEvent};

        use crate::llm::http::test_server::{respond_json, send_event, spawn, start_sse};

        fn local_adapter(base_url: &str) -> AnthropicAdapter {
            make_adapter().with_base_url(base_url)
        }

        #[tokio::test]
        async fn test_rate_limit_is_returned_after_one_attempt() {
            let server = spawn(|mut socket| async move {
                let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
                respond_json(&mut socket, "429 Too Many Requests", "retry-after-ms: 800\r\n", body)
                    .await;
            })
            .await;

            let err = local_adapter(&server.base_url())
                .generate(&request(""))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ProviderErrorKind::RateLimited);
            assert_eq!(err.retry_after_ms(), Some(800));
            assert_eq!(server.hits(), 1);
        }

        #[tokio::test]
        async fn test_invalid_request_body_is_typed() {
            let server = spawn(|mut socket| async move {
                let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"prompt is too long"}}"#;
                respond_json(&mut socket, "400 Bad Request", "", body).await;
            })
            .await;

            let err = local_adapter(&server.base_url())
                .generate(&request(""))
                .await
                .unwrap_err();
            assert!(matches!(err, ProviderError::InvalidRequest(ref m) if m == "prompt is too long"));
        }

        #[tokio::test]
        async fn test_stream_complete() {
            let server = spawn(|mut socket| async move {
                start_sse(&mut socket).await;
                send_event(
                    &mut socket,
                    Some("message_start"),
                    r#"{"type":"message_start","message":{"id":"msg_1","model":"claude","usage":{"input_tokens":12,"output_tokens":1}}}"#,
                )
                .await;
                send_event(&mut socket, Some("ping"), r#"{"type":"ping"}"#).await;
                send_event(
                    &mut socket,
                    Some("content_block_delta"),
                    r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
                )
                .await;
                send_event(
                    &mut socket,
                    Some("message_delta"),
                    r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":3}}"#,
                )
                .await;
                send_event(&mut socket, Some("message_stop"), r#"{"type":"message_stop"}"#).await;
            })
            .await;

            let events: Vec<StreamEvent> = local_adapter(&server.base_url())
                .generate_stream(request(""))
                .map(|e| e.unwrap())
                .collect()
                .await;

            assert_eq!(events.first(), Some(&StreamEvent::Connected));
            assert!(events.contains(&StreamEvent::TextDelta { text: "Hi".into() }));
            assert!(events.contains(&StreamEvent::MessageDelta {
                stop_reason: StopReason::EndTurn
            }));
            assert_eq!(events.last(), Some(&StreamEvent::Done));
        }

        #[tokio::test]
        async fn test_stream_cut_before_message_stop_is_an_error() {
            let server = spawn(|mut socket| async move {
                start_sse(&mut socket).await;
                send_event(
                    &mut socket,
                    Some("content_block_delta"),
                    r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"part"}}"#,
                )
                .await;
            })
            .await;

            let events: Vec<Result<StreamEvent, ProviderError>> = local_adapter(&server.base_url())
                .generate_stream(request(""))
                .collect()
                .await;

            assert!(matches!(events.last(), Some(Err(ProviderError::TransientServer(_)))));
            assert!(!events.iter().any(|e| matches!(e, Ok(StreamEvent::Done))));
        }
    }
}
