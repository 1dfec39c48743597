//! Per-provider cost accounting and budget enforcement.
//!
//! `CostLedger` keeps one active `CostWindow` per provider. `reserve` checks
//! and books an estimate before dispatch; the returned [`CostReservation`]
//! reconciles it with the actual usage on `commit`, or gives it back when
//! dropped uncommitted (cancelled or failed call). Each provider's
//! check-and-book runs under its `DashMap` shard lock, so concurrent requests
//! cannot overrun a budget.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use switchyard_types::cost::{BudgetWindow, CostBudget, CostWindow};
use switchyard_types::error::BudgetExceeded;
use switchyard_types::provider::{FALLBACK_COST_PER_1K_TOKENS, ProviderConfig};

#[derive(Debug)]
struct Slot {
    budget: Option<CostBudget>,
    cost_per_1k: f64,
    window_start: DateTime<Utc>,
    tokens_used: u64,
    dollars_used: f64,
}

impl Slot {
    fn new(budget: Option<CostBudget>, cost_per_1k: f64, now: DateTime<Utc>) -> Self {
        let window = budget.as_ref().map(|b| b.window).unwrap_or_default();
        Self {
            budget,
            cost_per_1k,
            window_start: window.window_start(now),
            tokens_used: 0,
            dollars_used: 0.0,
        }
    }

    fn window(&self) -> BudgetWindow {
        self.budget.as_ref().map(|b| b.window).unwrap_or_default()
    }

    /// Reset counters if `now` falls in a later window. Safe to call repeatedly.
    fn roll(&mut self, now: DateTime<Utc>) {
        let start = self.window().window_start(now);
        if start != self.window_start {
            self.window_start = start;
            self.tokens_used = 0;
            self.dollars_used = 0.0;
        }
    }

    fn check(&self, provider_id: &str, tokens: u64, dollars: f64) -> Result<(), BudgetExceeded> {
        let Some(budget) = &self.budget else {
            return Ok(());
        };
        if let Some(max) = budget.max_tokens {
            if self.tokens_used.saturating_add(tokens) > max {
                return Err(BudgetExceeded {
                    provider_id: provider_id.to_string(),
                    detail: format!("tokens {} + {} > {}", self.tokens_used, tokens, max),
                });
            }
        }
        if let Some(max) = budget.max_dollars {
            if self.dollars_used + dollars > max {
                return Err(BudgetExceeded {
                    provider_id: provider_id.to_string(),
                    detail: format!(
                        "dollars {:.4} + {:.4} > {:.4}",
                        self.dollars_used, dollars, max
                    ),
                });
            }
        }
        Ok(())
    }

    fn release(&mut self, window_start: DateTime<Utc>, tokens: u64, dollars: f64) {
        if self.window_start == window_start {
            self.tokens_used = self.tokens_used.saturating_sub(tokens);
            self.dollars_used = (self.dollars_used - dollars).max(0.0);
        }
    }

    fn to_window(&self, provider_id: &str) -> CostWindow {
        CostWindow {
            provider_id: provider_id.to_string(),
            window_start: self.window_start,
            tokens_used: self.tokens_used,
            dollars_used: self.dollars_used,
            max_tokens: self.budget.as_ref().and_then(|b| b.max_tokens),
            max_dollars: self.budget.as_ref().and_then(|b| b.max_dollars),
        }
    }
}

/// Token and dollar usage per provider per budget window.
///
/// Cloning produces a shared view of the same ledger.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    slots: Arc<DashMap<String, Slot>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger with limits from the provider list.
    pub fn from_providers(providers: &[ProviderConfig]) -> Self {
        let ledger = Self::new();
        ledger.configure(providers);
        ledger
    }

    /// Replace limits and prices with those of `providers`.
    ///
    /// Usage in the active window is kept for providers that remain; providers
    /// no longer listed are dropped.
    pub fn configure(&self, providers: &[ProviderConfig]) {
        let now = Utc::now();
        self.slots
            .retain(|id, _| providers.iter().any(|p| &p.provider_id == id));
        for provider in providers {
            let cost = provider.cost_per_1k();
            self.slots
                .entry(provider.provider_id.clone())
                .and_modify(|slot| {
                    slot.budget = provider.budget.clone();
                    slot.cost_per_1k = cost;
                    slot.roll(now);
                })
                .or_insert_with(|| Slot::new(provider.budget.clone(), cost, now));
        }
    }

    /// Book `estimated_tokens` against the provider's active window.
    ///
    /// Rejected when the booking would take the window past its token or
    /// dollar limit. Unknown providers are unbounded.
    pub fn reserve(
        &self,
        provider_id: &str,
        estimated_tokens: u64,
    ) -> Result<CostReservation, BudgetExceeded> {
        self.reserve_at(provider_id, estimated_tokens, Utc::now())
    }

    fn reserve_at(
        &self,
        provider_id: &str,
        estimated_tokens: u64,
        now: DateTime<Utc>,
    ) -> Result<CostReservation, BudgetExceeded> {
        let mut slot = self
            .slots
            .entry(provider_id.to_string())
            .or_insert_with(|| Slot::new(None, FALLBACK_COST_PER_1K_TOKENS, now));
        slot.roll(now);

        let dollars = estimated_tokens as f64 / 1000.0 * slot.cost_per_1k;
        slot.check(provider_id, estimated_tokens, dollars)?;
        slot.tokens_used = slot.tokens_used.saturating_add(estimated_tokens);
        slot.dollars_used += dollars;

        Ok(CostReservation {
            slots: Arc::clone(&self.slots),
            provider_id: provider_id.to_string(),
            window_start: slot.window_start,
            tokens: estimated_tokens,
            dollars,
            settled: false,
        })
    }

    /// Active window of every provider, sorted by id.
    pub fn snapshot(&self) -> Vec<CostWindow> {
        let now = Utc::now();
        let mut windows: Vec<CostWindow> = self
            .slots
            .iter_mut()
            .map(|mut entry| {
                entry.roll(now);
                entry.to_window(entry.key())
            })
            .collect();
        windows.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        windows
    }
}

/// Budget booked for one dispatch attempt.
///
/// Dropping it without calling [`CostReservation::commit`] releases the
/// booked amount.
#[derive(Debug)]
pub struct CostReservation {
    slots: Arc<DashMap<String, Slot>>,
    provider_id: String,
    window_start: DateTime<Utc>,
    tokens: u64,
    dollars: f64,
    settled: bool,
}

impl CostReservation {
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.tokens
    }

    /// Replace the estimate with actual usage.
    pub fn commit(self, actual_tokens: u64, actual_cost: f64) {
        self.commit_at(actual_tokens, actual_cost, Utc::now());
    }

    fn commit_at(mut self, actual_tokens: u64, actual_cost: f64, now: DateTime<Utc>) {
        self.settled = true;
        let Some(mut slot) = self.slots.get_mut(&self.provider_id) else {
            return;
        };
        slot.roll(now);
        // If the window rolled over since reserve, the estimate is already gone.
        slot.release(self.window_start, self.tokens, self.dollars);
        slot.tokens_used = slot.tokens_used.saturating_add(actual_tokens);
        slot.dollars_used += actual_cost;
        tracing::debug!(
            provider = %self.provider_id,
            estimated_tokens = self.tokens,
            actual_tokens,
            actual_cost,
            "Cost committed"
        );
    }
}

impl Drop for CostReservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(mut slot) = self.slots.get_mut(&self.provider_id) {
            slot.release(self.window_start, self.tokens, self.dollars);
        }
    }
}
