//! Provider health tracking.
//!
//! Implements a circuit breaker per provider, fed exclusively by call outcomes
//! the orchestrator reports after each adapter invocation. State lives in a
//! `DashMap` so concurrent requests to different providers never contend, and
//! each provider's counters are updated under that provider's shard lock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use switchyard_types::config::CircuitBreakerConfig;
use switchyard_types::health::{CircuitState, ProviderHealthState};
use switchyard_types::provider::ProviderErrorKind;

/// Internal circuit state with the timing data each state needs.
#[derive(Debug, Clone)]
enum Circuit {
    /// Normal operation.
    Closed,
    /// Excluded until `since + cooldown`.
    Open { since: Instant },
    /// Probing: at most one trial request in flight.
    HalfOpen { trial_in_flight: bool },
}

/// Health record for a single provider.
#[derive(Debug)]
struct ProviderHealth {
    circuit: Circuit,
    consecutive_failures: u32,
    success_streak: u32,
    opened_at: Option<DateTime<Utc>>,
    current_cooldown: Duration,
    rate_limited_until: Option<(Instant, DateTime<Utc>)>,
    /// Recent health-affecting outcomes, `true` = failure.
    outcomes: VecDeque<bool>,
    window: usize,
    total_calls: u64,
    total_failures: u64,
    last_error: Option<String>,
    last_latency_ms: Option<u64>,
}

impl ProviderHealth {
    fn new(cooldown: Duration, window: usize) -> Self {
        Self {
            circuit: Circuit::Closed,
            consecutive_failures: 0,
            success_streak: 0,
            opened_at: None,
            current_cooldown: cooldown,
            rate_limited_until: None,
            outcomes: VecDeque::with_capacity(window),
            window,
            total_calls: 0,
            total_failures: 0,
            last_error: None,
            last_latency_ms: None,
        }
    }

    fn is_rate_limited(&self, now: Instant) -> bool {
        matches!(self.rate_limited_until, Some((until, _)) if now < until)
    }

    /// Read-only eligibility check used by the router.
    fn is_eligible(&self, now: Instant) -> bool {
        if self.is_rate_limited(now) {
            return false;
        }
        match &self.circuit {
            Circuit::Closed => true,
            Circuit::Open { since } => now.duration_since(*since) >= self.current_cooldown,
            Circuit::HalfOpen { trial_in_flight } => !trial_in_flight,
        }
    }

    fn acquire(&mut self, now: Instant) -> Option<Admission> {
        if self.is_rate_limited(now) {
            return None;
        }
        self.rate_limited_until = None;

        match &self.circuit {
            Circuit::Closed => Some(Admission::Normal),
            Circuit::Open { since } => {
                if now.duration_since(*since) >= self.current_cooldown {
                    self.circuit = Circuit::HalfOpen {
                        trial_in_flight: true,
                    };
                    Some(Admission::Trial)
                } else {
                    None
                }
            }
            Circuit::HalfOpen { trial_in_flight } => {
                if *trial_in_flight {
                    None
                } else {
                    self.circuit = Circuit::HalfOpen {
                        trial_in_flight: true,
                    };
                    Some(Admission::Trial)
                }
            }
        }
    }

    fn push_outcome(&mut self, failed: bool) {
        self.outcomes.push_back(failed);
        while self.outcomes.len() > self.window {
            self.outcomes.pop_front();
        }
    }

    fn recent_error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|failed| **failed).count();
        failures as f64 / self.outcomes.len() as f64
    }

    fn open(&mut self, now: Instant) {
        self.circuit = Circuit::Open { since: now };
        self.opened_at = Some(Utc::now());
    }

    /// How an outcome reported without a permit is treated: as the trial
    /// while half-open, as an ordinary call otherwise.
    fn implied_admission(&self) -> Admission {
        match self.circuit {
            Circuit::HalfOpen { .. } => Admission::Trial,
            _ => Admission::Normal,
        }
    }

    fn record_success(
        &mut self,
        admission: Admission,
        latency_ms: u64,
        config: &CircuitBreakerConfig,
    ) {
        self.total_calls += 1;
        self.last_latency_ms = Some(latency_ms);
        self.push_outcome(false);

        match (&self.circuit, admission) {
            (Circuit::HalfOpen { .. }, Admission::Trial) => {
                // Recovery confirmed, close the circuit
                self.circuit = Circuit::Closed;
                self.consecutive_failures = 0;
                self.success_streak = 1;
                self.opened_at = None;
                self.current_cooldown = config.cooldown();
            }
            (Circuit::Closed, _) => {
                self.consecutive_failures = 0;
                self.success_streak = self.success_streak.saturating_add(1);
            }
            // Calls admitted before the circuit opened; only the trial decides.
            (Circuit::HalfOpen { .. }, Admission::Normal) | (Circuit::Open { .. }, _) => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_failure(
        &mut self,
        admission: Admission,
        kind: ProviderErrorKind,
        message: &str,
        retry_after_ms: Option<u64>,
        latency_ms: u64,
        now: Instant,
        config: &CircuitBreakerConfig,
    ) {
        self.total_calls += 1;
        self.total_failures += 1;
        self.last_error = Some(format!("{kind}: {message}"));
        self.last_latency_ms = Some(latency_ms);
        self.success_streak = 0;
        self.push_outcome(true);

        if let (ProviderErrorKind::RateLimited, Some(hint)) = (kind, retry_after_ms) {
            let wait = Duration::from_millis(hint).min(config.rate_limit_max_wait());
            let wall = Utc::now() + chrono::Duration::milliseconds(wait.as_millis() as i64);
            self.rate_limited_until = Some((now + wait, wall));
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match (&self.circuit, admission) {
            (Circuit::Closed, _) => {
                if self.consecutive_failures >= config.failure_threshold {
                    self.open(now);
                }
            }
            (Circuit::HalfOpen { .. }, Admission::Trial) => {
                // Trial failed, reopen with a longer cooldown
                self.current_cooldown = (self.current_cooldown * 2).min(config.max_cooldown());
                self.open(now);
            }
            (Circuit::HalfOpen { .. }, Admission::Normal) | (Circuit::Open { .. }, _) => {}
        }
    }

    /// Give back an unused half-open trial slot.
    fn release_trial(&mut self) {
        if let Circuit::HalfOpen { trial_in_flight } = &mut self.circuit {
            *trial_in_flight = false;
        }
    }

    fn snapshot(&self, provider_id: &str, now: Instant) -> ProviderHealthState {
        let state = match &self.circuit {
            Circuit::Closed => CircuitState::Closed,
            Circuit::Open { .. } => CircuitState::Open,
            Circuit::HalfOpen { .. } => CircuitState::HalfOpen,
        };
        ProviderHealthState {
            provider_id: provider_id.to_string(),
            state,
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at,
            success_streak: self.success_streak,
            current_cooldown_ms: self.current_cooldown.as_millis() as u64,
            recent_error_rate: self.recent_error_rate(),
            total_calls: self.total_calls,
            total_failures: self.total_failures,
            last_error: self.last_error.clone(),
            last_latency_ms: self.last_latency_ms,
            rate_limited_until: self
                .rate_limited_until
                .filter(|(until, _)| now < *until)
                .map(|(_, wall)| wall),
        }
    }
}

/// How a call was admitted past the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    /// The single half-open trial.
    Trial,
}

struct Shared {
    config: CircuitBreakerConfig,
    error_rate_window: usize,
    providers: DashMap<String, ProviderHealth>,
}

impl Shared {
    fn new_health(&self) -> ProviderHealth {
        ProviderHealth::new(self.config.cooldown(), self.error_rate_window)
    }
}

/// Circuit breaker registry for all configured providers.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HealthTracker {
    shared: Arc<Shared>,
}

impl HealthTracker {
    pub fn new(config: CircuitBreakerConfig, error_rate_window: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                error_rate_window: error_rate_window.max(1),
                providers: DashMap::new(),
            }),
        }
    }

    /// Make the tracked set match `provider_ids`.
    ///
    /// Providers that stay keep their state; new ones start closed; providers
    /// no longer configured are dropped.
    pub fn sync_providers<'a>(&self, provider_ids: impl IntoIterator<Item = &'a str>) {
        let ids: Vec<&str> = provider_ids.into_iter().collect();
        self.shared
            .providers
            .retain(|id, _| ids.contains(&id.as_str()));
        for id in ids {
            self.shared
                .providers
                .entry(id.to_string())
                .or_insert_with(|| self.shared.new_health());
        }
    }

    /// Whether the router may include this provider. Unknown providers are
    /// treated as healthy.
    pub fn is_eligible(&self, provider_id: &str) -> bool {
        self.is_eligible_at(provider_id, Instant::now())
    }

    fn is_eligible_at(&self, provider_id: &str, now: Instant) -> bool {
        self.shared
            .providers
            .get(provider_id)
            .is_none_or(|health| health.is_eligible(now))
    }

    /// Failure fraction over the provider's recent outcome window.
    pub fn recent_error_rate(&self, provider_id: &str) -> f64 {
        self.shared
            .providers
            .get(provider_id)
            .map(|health| health.recent_error_rate())
            .unwrap_or(0.0)
    }

    /// Ask to dispatch one call. Moves an expired `OPEN` circuit to `HALF_OPEN`
    /// and claims its single trial slot.
    ///
    /// Returns `None` when the circuit is open, the trial is already taken, or
    /// a rate-limit hint is still in force.
    pub fn acquire(&self, provider_id: &str) -> Option<HealthPermit> {
        self.acquire_at(provider_id, Instant::now())
    }

    fn acquire_at(&self, provider_id: &str, now: Instant) -> Option<HealthPermit> {
        let admission = {
            let mut health = self
                .shared
                .providers
                .entry(provider_id.to_string())
                .or_insert_with(|| self.shared.new_health());
            health.acquire(now)?
        };
        if admission == Admission::Trial {
            tracing::info!(provider = %provider_id, "Circuit half-open, sending trial request");
        }
        Some(HealthPermit {
            tracker: self.clone(),
            provider_id: provider_id.to_string(),
            admission,
            reported: false,
        })
    }

    /// Record a successful call made without a [`HealthPermit`].
    ///
    /// While half-open the outcome counts as the trial's.
    pub fn record_success(&self, provider_id: &str, latency_ms: u64) {
        self.record_success_as(provider_id, None, latency_ms);
    }

    fn record_success_as(&self, provider_id: &str, admission: Option<Admission>, latency_ms: u64) {
        let Some(mut health) = self.shared.providers.get_mut(provider_id) else {
            return;
        };
        let admission = admission.unwrap_or_else(|| health.implied_admission());
        let was_recovering = matches!(health.circuit, Circuit::HalfOpen { .. });
        health.record_success(admission, latency_ms, &self.shared.config);
        if was_recovering && matches!(health.circuit, Circuit::Closed) {
            tracing::info!(provider = %provider_id, latency_ms, "Circuit closed after successful trial");
        }
    }

    /// Record a failed call made without a [`HealthPermit`]. `InvalidRequest`
    /// is the caller's fault and leaves health untouched.
    ///
    /// While half-open the outcome counts as the trial's.
    pub fn record_failure(
        &self,
        provider_id: &str,
        kind: ProviderErrorKind,
        message: &str,
        retry_after_ms: Option<u64>,
        latency_ms: u64,
    ) {
        self.record_failure_at(
            provider_id,
            None,
            kind,
            message,
            retry_after_ms,
            latency_ms,
            Instant::now(),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn record_failure_at(
        &self,
        provider_id: &str,
        admission: Option<Admission>,
        kind: ProviderErrorKind,
        message: &str,
        retry_after_ms: Option<u64>,
        latency_ms: u64,
        now: Instant,
    ) {
        let Some(mut health) = self.shared.providers.get_mut(provider_id) else {
            return;
        };
        let admission = admission.unwrap_or_else(|| health.implied_admission());
        if !kind.affects_health() {
            if admission == Admission::Trial {
                health.release_trial();
            }
            return;
        }
        let was_open = matches!(health.circuit, Circuit::Open { .. });
        health.record_failure(
            admission,
            kind,
            message,
            retry_after_ms,
            latency_ms,
            now,
            &self.shared.config,
        );
        if !was_open && matches!(health.circuit, Circuit::Open { .. }) {
            tracing::warn!(
                provider = %provider_id,
                consecutive_failures = health.consecutive_failures,
                cooldown_ms = health.current_cooldown.as_millis() as u64,
                "Circuit opened"
            );
        }
    }

    /// Point-in-time view of every tracked provider, sorted by id.
    pub fn snapshot(&self) -> Vec<ProviderHealthState> {
        let now = Instant::now();
        let mut states: Vec<ProviderHealthState> = self
            .shared
            .providers
            .iter()
            .map(|entry| entry.value().snapshot(entry.key(), now))
            .collect();
        states.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        states
    }

    /// Snapshot of a single provider.
    pub fn state_of(&self, provider_id: &str) -> Option<ProviderHealthState> {
        self.shared
            .providers
            .get(provider_id)
            .map(|health| health.snapshot(provider_id, Instant::now()))
    }
}

impl std::fmt::Debug for HealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthTracker")
            .field("providers", &self.shared.providers.len())
            .finish()
    }
}

/// Admission to call a provider once.
///
/// Report the outcome through [`HealthPermit::success`] or
/// [`HealthPermit::failure`]. Dropping an unreported trial permit (the call was
/// cancelled) frees the half-open slot without changing state.
#[derive(Debug)]
pub struct HealthPermit {
    tracker: HealthTracker,
    provider_id: String,
    admission: Admission,
    reported: bool,
}

impl HealthPermit {
    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn success(mut self, latency_ms: u64) {
        self.reported = true;
        self.tracker
            .record_success_as(&self.provider_id, Some(self.admission), latency_ms);
    }

    pub fn failure(
        mut self,
        kind: ProviderErrorKind,
        message: &str,
        retry_after_ms: Option<u64>,
        latency_ms: u64,
    ) {
        self.reported = true;
        self.tracker.record_failure_at(
            &self.provider_id,
            Some(self.admission),
            kind,
            message,
            retry_after_ms,
            latency_ms,
            Instant::now(),
        );
    }
}

impl Drop for HealthPermit {
    fn drop(&mut self) {
        if self.reported || self.admission != Admission::Trial {
            return;
        }
        if let Some(mut health) = self.tracker.shared.providers.get_mut(&self.provider_id) {
            health.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(threshold: u32, cooldown_ms: u64) -> HealthTracker {
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown_ms,
            max_cooldown_ms: cooldown_ms * 4,
            rate_limit_max_wait_ms: 1_000,
        };
        let tracker = HealthTracker::new(config, 4);
        tracker.sync_providers(["a", "b"]);
        tracker
    }

    fn fail(tracker: &HealthTracker, id: &str, now: Instant) {
        tracker.record_failure_at(
            id,
            None,
            ProviderErrorKind::TransientServerError,
            "503",
            None,
            10,
            now,
        );
    }

    #[test]
    fn test_new_provider_is_closed_and_eligible() {
        let tracker = tracker(3, 1_000);
        let state = tracker.state_of("a").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert!(tracker.is_eligible("a"));
    }

    #[test]
    fn test_opens_after_threshold() {
        let tracker = tracker(3, 1_000);
        let now = Instant::now();
        fail(&tracker, "a", now);
        fail(&tracker, "a", now);
        assert_eq!(tracker.state_of("a").unwrap().state, CircuitState::Closed);
        assert_eq!(tracker.state_of("a").unwrap().consecutive_failures, 2);

        fail(&tracker, "a", now);
        let state = tracker.state_of("a").unwrap();
        assert_eq!(state.state, CircuitState::Open);
        assert!(state.opened_at.is_some());
        assert!(!tracker.is_eligible_at("a", now));
        assert!(tracker.acquire_at("a", now).is_none());
        // Other providers are unaffected
        assert!(tracker.is_eligible_at("b", now));
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let tracker = tracker(3, 1_000);
        let now = Instant::now();
        fail(&tracker, "a", now);
        fail(&tracker, "a", now);
        tracker.record_success("a", 5);
        let state = tracker.state_of("a").unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.success_streak, 1);
    }

    #[test]
    fn test_half_open_after_cooldown_allows_single_trial() {
        let tracker = tracker(1, 1_000);
        let now = Instant::now();
        fail(&tracker, "a", now);
        assert!(!tracker.is_eligible_at("a", now + Duration::from_millis(999)));

        let later = now + Duration::from_millis(1_000);
        assert!(tracker.is_eligible_at("a", later));
        let permit = tracker.acquire_at("a", later).unwrap();
        assert_eq!(permit.admission(), Admission::Trial);
        assert_eq!(tracker.state_of("a").unwrap().state, CircuitState::HalfOpen);

        // Second concurrent request is refused while the trial is in flight
        assert!(!tracker.is_eligible_at("a", later));
        assert!(tracker.acquire_at("a", later).is_none());
        drop(permit);
    }

    #[test]
    fn test_trial_success_closes_circuit() {
        let tracker = tracker(2, 1_000);
        let now = Instant::now();
        fail(&tracker, "a", now);
        fail(&tracker, "a", now);
        let permit = tracker
            .acquire_at("a", now + Duration::from_secs(2))
            .unwrap();
        permit.success(12);

        let state = tracker.state_of("a").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.current_cooldown_ms, 1_000);
        assert!(state.opened_at.is_none());
    }

    #[test]
    fn test_trial_failure_doubles_cooldown_up_to_cap() {
        let tracker = tracker(1, 1_000);
        let mut now = Instant::now();
        fail(&tracker, "a", now);

        for expected in [2_000, 4_000, 4_000] {
            now += Duration::from_secs(10);
            let permit = tracker.acquire_at("a", now).unwrap();
            assert_eq!(permit.admission(), Admission::Trial);
            permit.failure(ProviderErrorKind::Timeout, "slow", None, 10);
            let state = tracker.state_of("a").unwrap();
            assert_eq!(state.state, CircuitState::Open);
            assert_eq!(state.current_cooldown_ms, expected);
        }
    }

    #[test]
    fn test_late_outcomes_of_ordinary_calls_do_not_decide_the_trial() {
        let tracker = tracker(1, 1_000);
        let now = Instant::now();
        // Both admitted while the circuit was still closed
        let slow_failure = tracker.acquire_at("a", now).unwrap();
        let slow_success = tracker.acquire_at("a", now).unwrap();
        fail(&tracker, "a", now);

        let trial = tracker
            .acquire_at("a", now + Duration::from_secs(2))
            .unwrap();
        assert_eq!(trial.admission(), Admission::Trial);

        slow_failure.failure(ProviderErrorKind::Timeout, "slow", None, 900);
        let state = tracker.state_of("a").unwrap();
        assert_eq!(state.state, CircuitState::HalfOpen);
        assert_eq!(state.current_cooldown_ms, 1_000);

        slow_success.success(800);
        assert_eq!(tracker.state_of("a").unwrap().state, CircuitState::HalfOpen);

        slow_invalid_request(&tracker);
        assert!(tracker.acquire_at("a", now + Duration::from_secs(2)).is_none());

        trial.success(12);
        let state = tracker.state_of("a").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.consecutive_failures, 0);
    }

    /// An ordinary call rejected as invalid must not free the trial slot.
    fn slow_invalid_request(tracker: &HealthTracker) {
        tracker.record_failure_at(
            "a",
            Some(Admission::Normal),
            ProviderErrorKind::InvalidRequest,
            "bad",
            None,
            5,
            Instant::now(),
        );
    }

    #[test]
    fn test_dropped_trial_permit_frees_slot() {
        let tracker = tracker(1, 1_000);
        let now = Instant::now();
        fail(&tracker, "a", now);
        let later = now + Duration::from_secs(2);
        let permit = tracker.acquire_at("a", later).unwrap();
        drop(permit);
        assert_eq!(tracker.state_of("a").unwrap().state, CircuitState::HalfOpen);
        assert!(tracker.is_eligible_at("a", later));
        assert!(tracker.acquire_at("a", later).is_some());
    }

    #[test]
    fn test_invalid_request_does_not_affect_health() {
        let tracker = tracker(1, 1_000);
        tracker.record_failure("a", ProviderErrorKind::InvalidRequest, "bad", None, 3);
        let state = tracker.state_of("a").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_failures, 0);
    }

    #[test]
    fn test_auth_and_rate_limit_count_as_failures() {
        let tracker = tracker(2, 1_000);
        tracker.record_failure("a", ProviderErrorKind::AuthError, "401", None, 3);
        tracker.record_failure("a", ProviderErrorKind::RateLimited, "429", None, 3);
        assert_eq!(tracker.state_of("a").unwrap().state, CircuitState::Open);
    }

    #[test]
    fn test_rate_limit_hint_excludes_until_capped_instant() {
        let tracker = tracker(5, 1_000);
        let now = Instant::now();
        tracker.record_failure_at(
            "a",
            None,
            ProviderErrorKind::RateLimited,
            "429",
            Some(60_000),
            3,
            now,
        );
        assert_eq!(tracker.state_of("a").unwrap().state, CircuitState::Closed);
        assert!(!tracker.is_eligible_at("a", now + Duration::from_millis(500)));
        // Capped at rate_limit_max_wait_ms = 1000
        assert!(tracker.is_eligible_at("a", now + Duration::from_millis(1_001)));
    }

    #[test]
    fn test_recent_error_rate_uses_sliding_window() {
        let tracker = tracker(100, 1_000);
        let now = Instant::now();
        fail(&tracker, "a", now);
        fail(&tracker, "a", now);
        assert!((tracker.recent_error_rate("a") - 1.0).abs() < 1e-9);
        for _ in 0..4 {
            tracker.record_success("a", 1);
        }
        // Window of 4 now holds only successes
        assert!(tracker.recent_error_rate("a").abs() < 1e-9);
        tracker.record_failure("a", ProviderErrorKind::Unknown, "x", None, 1);
        assert!((tracker.recent_error_rate("a") - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_sync_providers_keeps_existing_state() {
        let tracker = tracker(1, 1_000);
        fail(&tracker, "a", Instant::now());
        tracker.sync_providers(["a", "c"]);
        let ids: Vec<String> = tracker
            .snapshot()
            .into_iter()
            .map(|s| s.provider_id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(tracker.state_of("a").unwrap().state, CircuitState::Open);
    }

    #[test]
    fn test_concurrent_failures_are_counted_exactly() {
        let tracker = tracker(1_000, 1_000);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let tracker = tracker.clone();
                scope.spawn(move || {
                    for _ in 0..25 {
                        tracker.record_failure("a", ProviderErrorKind::Timeout, "t", None, 1);
                    }
                });
            }
        });
        let state = tracker.state_of("a").unwrap();
        assert_eq!(state.consecutive_failures, 200);
        assert_eq!(state.total_failures, 200);
    }
}
