//! OpenTelemetry GenAI semantic convention attribute names.
//!
//! `tracing` macros need field names as literals, so spans declare fields
//! like `gen_ai.usage.input_tokens = tracing::field::Empty` inline and these
//! constants are passed to [`tracing::Span::record`] to fill them later.
//!
//! Span naming convention: `"{operation} {provider}"`.

// --- Required attributes ---

/// The operation being performed (e.g. "text_completion").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The provider that served the request.
pub const GEN_AI_PROVIDER_NAME: &str = "gen_ai.provider.name";

// --- Recommended attributes ---

pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";

pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";

/// Total tokens billed for the request (input plus output).
pub const GEN_AI_USAGE_TOTAL_TOKENS: &str = "gen_ai.usage.total_tokens";

pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// The request id assigned by the orchestrator.
pub const GEN_AI_RESPONSE_ID: &str = "gen_ai.response.id";

// --- Switchyard-specific attributes ---

/// Whether the response came from the response cache.
pub const SWITCHYARD_CACHE_HIT: &str = "switchyard.cache_hit";

/// Estimated USD cost charged to the provider's budget.
pub const SWITCHYARD_COST_USD: &str = "switchyard.cost_usd";

// --- Operation name values ---

/// Single-shot generation.
pub const OP_TEXT_COMPLETION: &str = "text_completion";

/// Streaming generation.
pub const OP_STREAM_COMPLETION: &str = "stream_completion";
