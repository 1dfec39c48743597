//! OpenAI-compatible adapter.
//!
//! A single [`OpenAiCompatibleAdapter`] serves OpenAI, Google Gemini, Mistral
//! and any self-hosted gateway speaking the chat completions protocol, via a
//! configurable base URL.
//!
//! Request and response bodies are the typed wire structs from
//! [`async_openai::types::chat`]. Transport is a plain `reqwest` call per
//! request so that the orchestrator sees every failure as it happens and a
//! dropped stream closes its connection.

pub mod config;
pub mod streaming;

use async_openai::error::{ApiError, WrappedError};
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionStreamOptions,
    CreateChatCompletionRequest, CreateChatCompletionResponse,
};
use secrecy::{ExposeSecret, SecretString};

use switchyard_core::llm::adapter::{ProviderAdapter, ProviderEventStream};
use switchyard_types::provider::{
    ProviderError, ProviderLimits, ProviderRequest, ProviderResponse, StopReason, Usage,
};

use crate::llm::http::{build_client, map_reqwest_error, parse_retry_after};

use self::config::OpenAiCompatConfig;
use self::streaming::{create_openai_stream, map_finish_reason};

/// Adapter for any chat-completions-compatible API.
///
/// Does not derive Debug; the key is a [`SecretString`] regardless.
pub struct OpenAiCompatibleAdapter {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    provider_id: String,
    model: String,
    limits: ProviderLimits,
}

impl OpenAiCompatibleAdapter {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client()?,
            api_key: config.api_key,
            base_url: config.base_url,
            provider_id: config.provider_id,
            model: config.model,
            limits: config.limits,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &ProviderRequest, stream: bool) -> CreateChatCompletionRequest {
        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(request.prompt.clone()),
                name: None,
            },
        )];

        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        let mut req = CreateChatCompletionRequest {
            model,
            messages,
            max_completion_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature as f32),
            ..Default::default()
        };

        if stream {
            req.stream = Some(true);
            req.stream_options = Some(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            });
        }
        req
    }

    fn post(&self, body: &CreateChatCompletionRequest) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
    }
}

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = self.build_request(request, false);
        let response = self
            .post(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;

        let parsed: CreateChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("failed to parse response: {e}")))?;

        let first = parsed.choices.first();
        let content = first
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let stop_reason = first
            .and_then(|c| c.finish_reason.as_ref())
            .map(map_finish_reason)
            .unwrap_or(StopReason::EndTurn);
        let usage = parsed
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ProviderResponse {
            id: parsed.id,
            content,
            model: parsed.model,
            stop_reason,
            usage,
        })
    }

    fn generate_stream(&self, request: ProviderRequest) -> ProviderEventStream {
        let body = self.build_request(&request, true);
        create_openai_stream(self.post(&body))
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

    match serde_json::from_str::<WrappedError>(&body) {
        Ok(wrapped) => Err(map_api_error(
            Some(status.as_u16()),
            wrapped.error,
            retry_after_ms,
        )),
        Err(_) => Err(ProviderError::from_status(status.as_u16(), body, retry_after_ms)),
    }
}

/// Map an API error object to a normalized [`ProviderError`].
///
/// `status` is absent for errors delivered inside an SSE stream. A 429 or 5xx
/// status wins over the body; otherwise the error code and type decide, and
/// the status is the fallback.
pub(crate) fn map_api_error(
    status: Option<u16>,
    err: ApiError,
    retry_after_ms: Option<u64>,
) -> ProviderError {
    if let Some(status) = status.filter(|s| *s == 429 || *s >= 500) {
        return ProviderError::from_status(status, err.message, retry_after_ms);
    }

    let code = err.code.as_deref().unwrap_or("");
    let error_type = err.r#type.as_deref().unwrap_or("");

    if code == "invalid_api_key"
        || error_type == "authentication_error"
        || err.message.contains("Incorrect API key")
        || err.message.contains("Invalid API key")
    {
        ProviderError::Auth(err.message)
    } else if code == "rate_limit_exceeded"
        || error_type == "rate_limit_error"
        || error_type == "requests"
        || error_type == "tokens"
    {
        ProviderError::RateLimited { retry_after_ms }
    } else if code == "context_length_exceeded"
        || error_type == "invalid_request_error"
        || err.message.contains("maximum context length")
    {
        ProviderError::InvalidRequest(err.message)
    } else if code == "server_error"
        || error_type == "server_error"
        || error_type == "overloaded_error"
    {
        ProviderError::TransientServer(err.message)
    } else {
        match status {
            Some(status) => ProviderError::from_status(status, err.to_string(), retry_after_ms),
            None => ProviderError::Unknown(err.to_string()),
        }
    }
}
