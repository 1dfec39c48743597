//! `swy generate` and `swy stream`.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::style;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::field::Empty;

use switchyard_infra::llm::pricing::format_cost;
use switchyard_observe::genai_attrs::{
    GEN_AI_PROVIDER_NAME, GEN_AI_USAGE_TOTAL_TOKENS, OP_STREAM_COMPLETION, OP_TEXT_COMPLETION,
    SWITCHYARD_CACHE_HIT, SWITCHYARD_COST_USD,
};
use switchyard_types::error::{ErrorClass, OrchestratorError};
use switchyard_types::request::{GenerationRequest, GenerationResponse};

use crate::state::AppState;

/// Arguments shared by `generate` and `stream`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// The prompt to send.
    pub prompt: String,

    /// Try this provider first.
    #[arg(long, short = 'p')]
    pub provider: Option<String>,

    /// Maximum output tokens.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 to 2.0).
    #[arg(long, short = 't')]
    pub temperature: Option<f64>,

    /// Overall deadline in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Neither read from nor write to the response cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Caller identity recorded on the request.
    #[arg(long, default_value = "cli")]
    pub user: String,
}

impl GenerateArgs {
    pub fn to_request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::new(&self.prompt, &self.user);
        if let Some(provider) = &self.provider {
            request = request.with_preferred_provider(provider);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            request = request.with_deadline(Duration::from_millis(timeout_ms));
        }
        if self.no_cache {
            request = request.uncacheable();
        }
        request
    }
}

/// Run a single-shot generation and print the result.
pub async fn generate(state: &AppState, args: &GenerateArgs, json: bool) -> Result<()> {
    let request = args.to_request();
    let span = tracing::info_span!(
        "swy.generate",
        gen_ai.operation.name = OP_TEXT_COMPLETION,
        gen_ai.response.id = %request.id,
        gen_ai.provider.name = Empty,
        gen_ai.usage.total_tokens = Empty,
        switchyard.cache_hit = Empty,
        switchyard.cost_usd = Empty,
    );

    let response = state
        .orchestrator
        .generate(request)
        .instrument(span.clone())
        .await
        .map_err(explain)?;

    span.record(GEN_AI_PROVIDER_NAME, response.provider_used.as_str());
    span.record(GEN_AI_USAGE_TOTAL_TOKENS, response.tokens_used);
    span.record(SWITCHYARD_CACHE_HIT, response.cache_hit);
    span.record(SWITCHYARD_COST_USD, response.cost_estimate);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.content);
    println!();
    print_failover(&response.failover_from, &response.provider_used);
    println!("  {}", style(summary_line(&response)).dim());
    if !response.sources.is_empty() {
        println!("  {} {}", style("sources:").dim(), response.sources.join(", "));
    }
    Ok(())
}

/// Stream a generation to stdout until it finishes or Ctrl+C is pressed.
///
/// With `--json`, each chunk is printed as one JSON object per line.
pub async fn stream(state: &AppState, args: &GenerateArgs, json: bool) -> Result<()> {
    let request = args.to_request().streaming();
    let span = tracing::info_span!(
        "swy.stream",
        gen_ai.operation.name = OP_STREAM_COMPLETION,
        gen_ai.response.id = %request.id,
    );

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = pump(state, request, json, &cancel).instrument(span).await;
    watcher.abort();
    result
}

async fn pump(
    state: &AppState,
    request: GenerationRequest,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut chunks = state.orchestrator.generate_stream(request);
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            biased;

            // Returning drops the stream, which closes the provider
            // connection and releases any reserved budget.
            _ = cancel.cancelled() => {
                eprintln!();
                eprintln!("  {} cancelled", style("!").yellow().bold());
                return Ok(());
            }

            next = chunks.next() => match next {
                Some(Ok(chunk)) if json => {
                    println!("{}", serde_json::to_string(&chunk)?);
                }
                Some(Ok(chunk)) if chunk.is_final => {
                    println!();
                    let sources = chunk.sources.unwrap_or_default();
                    if !sources.is_empty() {
                        println!("  {} {}", style("sources:").dim(), sources.join(", "));
                    }
                }
                Some(Ok(chunk)) => {
                    write!(stdout, "{}", chunk.delta_text)?;
                    stdout.flush()?;
                }
                Some(Err(err)) => {
                    if !json {
                        println!();
                    }
                    return Err(explain(err));
                }
                None => return Ok(()),
            },
        }
    }
}

fn summary_line(response: &GenerationResponse) -> String {
    let mut parts = vec![
        response.provider_used.clone(),
        format!("{} tokens", response.tokens_used),
        format_cost(response.cost_estimate),
        format!("{}ms", response.latency_ms),
    ];
    if response.cache_hit {
        parts.push("cached".to_string());
    }
    if response.context_used {
        parts.push("with context".to_string());
    }
    parts.join(" · ")
}

fn print_failover(failed: &[String], served_by: &str) {
    if failed.is_empty() {
        return;
    }
    eprintln!(
        "  {} {} unavailable, answered by {}",
        style("!").yellow().bold(),
        failed.join(", "),
        style(served_by).cyan()
    );
}

/// Attach a hint telling the user what to do about the failure.
fn explain(err: OrchestratorError) -> anyhow::Error {
    let hint = match err.class() {
        ErrorClass::RetryLater => "try again later, or raise the provider budgets",
        ErrorClass::FixRequest => "adjust the request and try again",
        ErrorClass::Misconfigured => "check the providers in your configuration",
    };
    anyhow::Error::new(err).context(hint)
}
