//! Provider selection.
//!
//! The router turns the current provider list, health state and a request
//! into an ordered failover chain. It holds no per-request state; the only
//! mutable thing it owns is the provider list, which is replaced wholesale.

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use switchyard_types::error::OrchestratorError;
use switchyard_types::provider::{Capability, ProviderConfig};
use switchyard_types::request::GenerationRequest;

use super::health::HealthTracker;
use super::registry::ProviderRegistry;

/// Lower bound for the cost denominator in routing scores.
const COST_EPSILON: f64 = 1e-6;

/// Ranks providers into a failover chain.
#[derive(Debug)]
pub struct Router {
    providers: RwLock<Arc<Vec<ProviderConfig>>>,
}

impl Router {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self {
            providers: RwLock::new(Arc::new(providers)),
        }
    }

    /// Atomically replace the provider list. Requests already routed keep the
    /// chain they were given.
    pub fn set_provider_config(&self, providers: Vec<ProviderConfig>) {
        let mut guard = self
            .providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(providers);
    }

    /// Current provider list.
    pub fn providers(&self) -> Arc<Vec<ProviderConfig>> {
        let guard = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Build the failover chain for `request`.
    ///
    /// Candidates are enabled providers with a registered adapter, the required
    /// capabilities, room for `max_tokens`, and a circuit that is not open. The
    /// preferred provider, if eligible, goes first; the rest are ordered by
    /// `weight * (1 - recent_error_rate) / cost_per_1k` descending, ties broken
    /// by `priority_rank` then `provider_id`.
    pub fn route(
        &self,
        request: &GenerationRequest,
        health: &HealthTracker,
        registry: &ProviderRegistry,
    ) -> Result<Vec<ProviderConfig>, OrchestratorError> {
        let providers = self.providers();
        if providers.is_empty() {
            return Err(OrchestratorError::NoEligibleProvider {
                reason: "no providers configured".to_string(),
            });
        }

        let mut excluded: Vec<String> = Vec::new();
        let mut candidates: Vec<(f64, &ProviderConfig)> = Vec::with_capacity(providers.len());

        for provider in providers.iter() {
            let id = provider.provider_id.as_str();
            let skip = exclusion_reason(provider, request, health, registry);

            match skip {
                Some(reason) => excluded.push(format!("{id} ({reason})")),
                None => {
                    let error_rate = health.recent_error_rate(id);
                    let score = provider.weight * (1.0 - error_rate)
                        / provider.cost_per_1k().max(COST_EPSILON);
                    candidates.push((score, provider));
                }
            }
        }

        if candidates.is_empty() {
            return Err(OrchestratorError::NoEligibleProvider {
                reason: excluded.join(", "),
            });
        }

        candidates.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.priority_rank.cmp(&b.priority_rank))
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });

        let mut chain: Vec<ProviderConfig> =
            candidates.into_iter().map(|(_, p)| p.clone()).collect();

        if let Some(preferred) = request.preferred_provider.as_deref() {
            match chain.iter().position(|p| p.provider_id == preferred) {
                Some(pos) => {
                    let chosen = chain.remove(pos);
                    chain.insert(0, chosen);
                }
                None => {
                    tracing::debug!(
                        provider = %preferred,
                        "Preferred provider not eligible, using ranked chain"
                    );
                }
            }
        }

        tracing::debug!(
            request_id = %request.id,
            chain = ?chain.iter().map(|p| p.provider_id.as_str()).collect::<Vec<_>>(),
            excluded = ?excluded,
            "Routed request"
        );
        Ok(chain)
    }
}

/// Why `provider` cannot serve `request`, or `None` when it can.
///
/// Capabilities and output limits must hold both in the provider config and
/// in what the registered adapter reports for itself.
fn exclusion_reason(
    provider: &ProviderConfig,
    request: &GenerationRequest,
    health: &HealthTracker,
    registry: &ProviderRegistry,
) -> Option<&'static str> {
    if !provider.enabled {
        return Some("disabled");
    }
    let Some(adapter) = registry.get(&provider.provider_id) else {
        return Some("no adapter");
    };
    let limits = adapter.describe_limits();

    let can_stream = provider.supports(Capability::Streaming) && limits.streaming;
    if !provider.supports(Capability::Generate) || (request.stream && !can_stream) {
        return Some("missing capability");
    }
    if provider.max_tokens.min(limits.max_output_tokens) < request.max_tokens {
        return Some("max_tokens too small");
    }
    if !health.is_eligible(&provider.provider_id) {
        return Some("circuit open");
    }
    None
}
