//! The orchestrator facade.
//!
//! Per request: validate -> cache check -> context fusion -> routing ->
//! dispatch through the failover chain -> health/cost/cache updates.
//!
//! `Orchestrator` is an explicit handle, built once at startup and cloned into
//! every caller. All cross-request state lives in the health tracker, the cost
//! ledger and the response cache; everything else is per-request.

mod stream;

#[cfg(test)]
mod mock;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::Instrument;
use uuid::Uuid;

use switchyard_types::config::{ContextConfig, OrchestratorConfig, validate_providers};
use switchyard_types::cost::CostWindow;
use switchyard_types::error::{ConfigError, FailureKind, OrchestratorError, ProviderFailure};
use switchyard_types::health::ProviderHealthState;
use switchyard_types::provider::{
    ProviderConfig, ProviderErrorKind, ProviderRequest, ProviderResponse,
};
use switchyard_types::request::{AugmentedPrompt, GenerationRequest, GenerationResponse};

use crate::cache::{CacheStats, Fingerprint, ResponseCache};
use crate::context::{BoxRetriever, ContextFuser, Retriever};
use crate::ledger::{CostLedger, CostReservation};
use crate::llm::box_adapter::BoxProviderAdapter;
use crate::llm::estimate_tokens;
use crate::llm::health::{HealthPermit, HealthTracker};
use crate::llm::registry::ProviderRegistry;
use crate::llm::router::Router;

pub use stream::GenerationStream;

/// Upper bound accepted for `temperature`.
const MAX_TEMPERATURE: f64 = 2.0;

struct Inner {
    router: Router,
    registry: ProviderRegistry,
    health: HealthTracker,
    ledger: CostLedger,
    cache: Option<ResponseCache>,
    fuser: ContextFuser,
    context: ContextConfig,
    retriever: Option<BoxRetriever>,
    in_flight: DashMap<Uuid, ()>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    registry: ProviderRegistry,
    retriever: Option<BoxRetriever>,
}

impl OrchestratorBuilder {
    /// Attach a knowledge retriever used for requests with `use_context`.
    pub fn retriever<R: Retriever + 'static>(mut self, retriever: R) -> Self {
        self.retriever = Some(BoxRetriever::new(retriever));
        self
    }

    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let OrchestratorBuilder {
            config,
            registry,
            retriever,
        } = self;
        config.validate()?;
        warn_unregistered(&config.providers, &registry);

        let health = HealthTracker::new(
            config.circuit_breaker.clone(),
            config.routing.error_rate_window,
        );
        health.sync_providers(config.providers.iter().map(|p| p.provider_id.as_str()));

        let cache = config
            .cache
            .enabled
            .then(|| ResponseCache::new(config.cache.capacity, config.cache.ttl()));

        let inner = Inner {
            ledger: CostLedger::from_providers(&config.providers),
            router: Router::new(config.providers),
            registry,
            health,
            cache,
            fuser: ContextFuser::from_config(&config.context),
            context: config.context,
            retriever,
            in_flight: DashMap::new(),
        };
        Ok(Orchestrator {
            inner: Arc::new(inner),
        })
    }
}

fn warn_unregistered(providers: &[ProviderConfig], registry: &ProviderRegistry) {
    for provider in providers {
        if provider.enabled && !registry.contains(&provider.provider_id) {
            tracing::warn!(
                provider = %provider.provider_id,
                "Provider is configured but has no adapter; it will never be routed to"
            );
        }
    }
}

/// Multi-provider generation facade. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("adapters", &self.inner.registry.list_ids())
            .field("in_flight", &self.inner.in_flight.len())
            .finish()
    }
}

/// Outcome of one provider attempt inside the failover loop.
enum Attempt {
    Succeeded(GenerationResponse),
    Failed(ProviderFailure),
    /// Stop the loop and surface this error to the caller.
    Abort(OrchestratorError),
}

impl Orchestrator {
    pub fn builder(config: OrchestratorConfig, registry: ProviderRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            registry,
            retriever: None,
        }
    }

    /// Construct without a retriever.
    pub fn new(
        config: OrchestratorConfig,
        registry: ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        Self::builder(config, registry).build()
    }

    /// Generate a complete response.
    ///
    /// Returns a response or a single terminal error; per-provider failures
    /// are recovered by failover and reported inside the terminal error when
    /// the chain is exhausted.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, OrchestratorError> {
        let span = tracing::info_span!(
            "gen_ai.generate",
            request_id = %request.id,
            user_id = %request.user_id,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = request.temperature,
            gen_ai.request.stream = false,
        );
        self.generate_inner(request).instrument(span).await
    }

    async fn generate_inner(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, OrchestratorError> {
        let started = Instant::now();
        validate_request(&request)?;
        let _in_flight = self.inner.admit(request.id)?;
        let deadline = started + request.deadline();

        let fingerprint = self
            .inner
            .cache
            .as_ref()
            .filter(|_| request.is_cacheable())
            .map(|_| Fingerprint::of(&request));

        if let (Some(cache), Some(key)) = (self.inner.cache.as_ref(), fingerprint.as_ref()) {
            if let Some(cached) = cache.get(key) {
                tracing::debug!(fingerprint = %key, "Cache hit");
                return Ok(GenerationResponse {
                    request_id: request.id,
                    tokens_used: 0,
                    cost_estimate: 0.0,
                    latency_ms: started.elapsed().as_millis() as u64,
                    cache_hit: true,
                    failover_from: Vec::new(),
                    ..cached
                });
            }
        }

        let augmented = self.inner.augment(&request, deadline).await;
        let chain = self
            .inner
            .router
            .route(&request, &self.inner.health, &self.inner.registry)?;
        let prompt_tokens = estimate_tokens(&augmented.final_text);

        let mut failures: Vec<ProviderFailure> = Vec::new();
        for provider in &chain {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            if remaining.is_zero() {
                break;
            }

            let attempt = self
                .inner
                .attempt(provider, &request, &augmented, prompt_tokens, remaining, started, &failures)
                .await;
            match attempt {
                Attempt::Succeeded(response) => {
                    if !failures.is_empty() {
                        tracing::warn!(
                            provider = %response.provider_used,
                            failover_from = ?response.failover_from,
                            "Failover occurred"
                        );
                    }
                    if let (Some(cache), Some(key)) = (self.inner.cache.as_ref(), fingerprint) {
                        cache.put(key, response.clone(), cache.default_ttl());
                    }
                    return Ok(response);
                }
                Attempt::Failed(failure) => failures.push(failure),
                Attempt::Abort(err) => return Err(err),
            }
        }

        Err(terminal_error(started, deadline, failures))
    }

    /// Atomically replace the provider list.
    ///
    /// Routing, health registration and cost limits switch over together.
    /// Providers that remain keep their health and usage state.
    pub fn set_provider_config(&self, providers: Vec<ProviderConfig>) -> Result<(), ConfigError> {
        validate_providers(&providers)?;
        warn_unregistered(&providers, &self.inner.registry);
        self.inner
            .health
            .sync_providers(providers.iter().map(|p| p.provider_id.as_str()));
        self.inner.ledger.configure(&providers);
        tracing::info!(providers = providers.len(), "Provider configuration replaced");
        self.inner.router.set_provider_config(providers);
        Ok(())
    }

    /// Current provider list.
    pub fn providers(&self) -> Vec<ProviderConfig> {
        self.inner.router.providers().as_ref().clone()
    }

    pub fn health_snapshot(&self) -> Vec<ProviderHealthState> {
        self.inner.health.snapshot()
    }

    pub fn cost_snapshot(&self) -> Vec<CostWindow> {
        self.inner.ledger.snapshot()
    }

    /// `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.cache.as_ref().map(ResponseCache::stats)
    }
}

impl Inner {
    /// Claim `id` for the lifetime of the returned guard.
    fn admit(self: &Arc<Self>, id: Uuid) -> Result<InFlightGuard, OrchestratorError> {
        match self.in_flight.entry(id) {
            Entry::Occupied(_) => Err(OrchestratorError::InvalidRequest(format!(
                "request {id} is already in flight"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    inner: Arc::clone(self),
                    id,
                })
            }
        }
    }

    /// Fuse retrieved context into the prompt, or pass it through.
    ///
    /// Retrieval failures and timeouts degrade to the plain prompt.
    async fn augment(&self, request: &GenerationRequest, deadline: Instant) -> AugmentedPrompt {
        let Some(retriever) = self.retriever.as_ref().filter(|_| request.use_context) else {
            return AugmentedPrompt::plain(request.prompt.clone());
        };
        let top_k = if request.context_top_k > 0 {
            request.context_top_k
        } else {
            self.context.default_top_k
        };
        let remaining = deadline.saturating_duration_since(Instant::now());

        match tokio::time::timeout(remaining, retriever.search(&request.prompt, top_k)).await {
            Ok(Ok(chunks)) => {
                let fused = self.fuser.fuse(&request.prompt, &chunks);
                tracing::debug!(
                    retrieved = chunks.len(),
                    used = fused.chunks_used.len(),
                    truncated = fused.truncated,
                    "Context fused"
                );
                fused
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "Retriever failed, continuing without context");
                AugmentedPrompt::plain(request.prompt.clone())
            }
            Err(_) => {
                tracing::warn!("Retriever timed out, continuing without context");
                AugmentedPrompt::plain(request.prompt.clone())
            }
        }
    }

    /// The registered adapter for `id`, or the failure to record when there
    /// is none.
    fn adapter_for(&self, id: &str) -> Result<Arc<BoxProviderAdapter>, ProviderFailure> {
        self.registry.get(id).ok_or_else(|| ProviderFailure {
            provider_id: id.to_string(),
            kind: FailureKind::Unknown,
            message: "no adapter registered".to_string(),
            latency_ms: 0,
        })
    }

    /// Book budget and claim the breaker for one provider.
    ///
    /// On rejection, returns the failure to record for this provider.
    fn admit_provider(
        &self,
        provider: &ProviderConfig,
        estimated_tokens: u64,
    ) -> Result<(CostReservation, HealthPermit), ProviderFailure> {
        let id = provider.provider_id.as_str();
        let reservation = self.ledger.reserve(id, estimated_tokens).map_err(|err| {
            tracing::warn!(
                provider = %id,
                error_kind = %FailureKind::BudgetExceeded,
                detail = %err.detail,
                "Budget exceeded, skipping provider"
            );
            ProviderFailure {
                provider_id: id.to_string(),
                kind: FailureKind::BudgetExceeded,
                message: err.detail,
                latency_ms: 0,
            }
        })?;

        // Dropping `reservation` on this path releases it.
        let permit = self.health.acquire(id).ok_or_else(|| {
            tracing::debug!(provider = %id, "Circuit open at dispatch time, skipping provider");
            ProviderFailure {
                provider_id: id.to_string(),
                kind: FailureKind::CircuitOpen,
                message: "circuit open or half-open trial in progress".to_string(),
                latency_ms: 0,
            }
        })?;

        Ok((reservation, permit))
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        provider: &ProviderConfig,
        request: &GenerationRequest,
        augmented: &AugmentedPrompt,
        prompt_tokens: u32,
        remaining: Duration,
        started: Instant,
        failures: &[ProviderFailure],
    ) -> Attempt {
        let id = provider.provider_id.as_str();
        let adapter = match self.adapter_for(id) {
            Ok(adapter) => adapter,
            Err(failure) => return Attempt::Failed(failure),
        };

        let estimate = u64::from(prompt_tokens) + u64::from(request.max_tokens);
        let (reservation, permit) = match self.admit_provider(provider, estimate) {
            Ok(admitted) => admitted,
            Err(failure) => return Attempt::Failed(failure),
        };

        let call_timeout = remaining.min(provider.timeout());
        let provider_request = provider_request(provider, request, augmented, call_timeout);
        let span = tracing::info_span!(
            "gen_ai.provider_call",
            gen_ai.provider.name = %id,
            gen_ai.request.model = %provider.model,
            gen_ai.request.max_tokens = request.max_tokens,
        );

        let call_start = Instant::now();
        // Elapsed timeout drops the adapter future, which closes the connection.
        let outcome = tokio::time::timeout(call_timeout, adapter.generate(&provider_request))
            .instrument(span)
            .await;
        let latency_ms = call_start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(switchyard_types::provider::ProviderError::Timeout(format!(
                "no response within {}ms",
                call_timeout.as_millis()
            ))),
        };

        match result {
            Ok(response) => {
                let (tokens_used, cost) = settle(provider, &response, prompt_tokens);
                reservation.commit(u64::from(tokens_used), cost);
                permit.success(latency_ms);
                tracing::info!(
                    provider = %id,
                    latency_ms,
                    tokens_used,
                    cost,
                    "Provider call succeeded"
                );
                Attempt::Succeeded(GenerationResponse {
                    request_id: request.id,
                    content: response.content,
                    provider_used: id.to_string(),
                    tokens_used,
                    cost_estimate: cost,
                    context_used: augmented.context_used(),
                    sources: augmented.sources(),
                    latency_ms: started.elapsed().as_millis() as u64,
                    cache_hit: false,
                    failover_from: failures.iter().map(|f| f.provider_id.clone()).collect(),
                })
            }
            Err(err) => {
                let kind = err.kind();
                tracing::warn!(
                    provider = %id,
                    latency_ms,
                    error_kind = %kind,
                    error = %err,
                    "Provider call failed"
                );
                permit.failure(kind, &err.to_string(), err.retry_after_ms(), latency_ms);
                if kind == ProviderErrorKind::InvalidRequest {
                    return Attempt::Abort(OrchestratorError::InvalidRequest(err.to_string()));
                }
                Attempt::Failed(ProviderFailure {
                    provider_id: id.to_string(),
                    kind: kind.into(),
                    message: err.to_string(),
                    latency_ms,
                })
            }
        }
    }
}

/// Releases the request id when processing ends, however it ends.
struct InFlightGuard {
    inner: Arc<Inner>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.id);
    }
}

fn validate_request(request: &GenerationRequest) -> Result<(), OrchestratorError> {
    if request.prompt.trim().is_empty() {
        return Err(OrchestratorError::InvalidRequest(
            "prompt must not be empty".to_string(),
        ));
    }
    if request.max_tokens == 0 {
        return Err(OrchestratorError::InvalidRequest(
            "max_tokens must be at least 1".to_string(),
        ));
    }
    if !(0.0..=MAX_TEMPERATURE).contains(&request.temperature) {
        return Err(OrchestratorError::InvalidRequest(format!(
            "temperature must be between 0 and {MAX_TEMPERATURE}"
        )));
    }
    if request.deadline_ms == 0 {
        return Err(OrchestratorError::InvalidRequest(
            "deadline must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn provider_request(
    provider: &ProviderConfig,
    request: &GenerationRequest,
    augmented: &AugmentedPrompt,
    timeout: Duration,
) -> ProviderRequest {
    ProviderRequest {
        model: provider.model.clone(),
        prompt: augmented.final_text.clone(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        timeout,
    }
}

/// Actual tokens and cost of a completed call, estimated when the backend
/// reported no usage.
fn settle(provider: &ProviderConfig, response: &ProviderResponse, prompt_tokens: u32) -> (u32, f64) {
    let tokens = if response.usage.total() > 0 {
        response.usage.total()
    } else {
        prompt_tokens.saturating_add(estimate_tokens(&response.content))
    };
    (tokens, provider.cost_for(u64::from(tokens)))
}

/// `DeadlineExceeded` if the caller's time ran out, otherwise exhaustion.
fn terminal_error(
    started: Instant,
    deadline: Instant,
    failures: Vec<ProviderFailure>,
) -> OrchestratorError {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if Instant::now() >= deadline {
        tracing::warn!(elapsed_ms, attempts = failures.len(), "Deadline exceeded");
        OrchestratorError::DeadlineExceeded {
            elapsed_ms,
            failures,
        }
    } else {
        tracing::warn!(attempts = failures.len(), "All providers exhausted");
        OrchestratorError::AllProvidersExhausted { failures }
    }
}
