//! Cost budget and accounting window types.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock interval after which a provider's usage counters reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetWindow {
    Hourly,
    #[default]
    Daily,
    /// Calendar month, UTC.
    Monthly,
    /// Fixed interval in seconds, aligned to the Unix epoch.
    Custom(u64),
}

impl BudgetWindow {
    /// Start of the window containing `now`.
    ///
    /// Two instants in the same window always map to the same start, which is
    /// what makes rollover idempotent.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BudgetWindow::Hourly => align_to_epoch(now, 3_600),
            BudgetWindow::Daily => align_to_epoch(now, 86_400),
            BudgetWindow::Monthly => Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(now),
            BudgetWindow::Custom(secs) => align_to_epoch(now, *secs),
        }
    }
}

fn align_to_epoch(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    let len_ms = (secs.max(1) as i64).saturating_mul(1000);
    let ms = now.timestamp_millis();
    let start = ms - ms.rem_euclid(len_ms);
    DateTime::from_timestamp_millis(start).unwrap_or(now)
}

/// Per-provider spending limits. An absent limit is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBudget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_dollars: Option<f64>,
    #[serde(default)]
    pub window: BudgetWindow,
}

/// Usage in the active accounting window of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostWindow {
    pub provider_id: String,
    pub window_start: DateTime<Utc>,
    /// Committed plus currently reserved tokens.
    pub tokens_used: u64,
    /// Committed plus currently reserved dollars.
    pub dollars_used: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_dollars: Option<f64>,
}

impl CostWindow {
    /// Fraction of the tightest limit consumed (0.0 when unbounded).
    pub fn utilization(&self) -> f64 {
        let tokens = self
            .max_tokens
            .filter(|max| *max > 0)
            .map(|max| self.tokens_used as f64 / max as f64)
            .unwrap_or(0.0);
        let dollars = self
            .max_dollars
            .filter(|max| *max > 0.0)
            .map(|max| self.dollars_used / max)
            .unwrap_or(0.0);
        tokens.max(dollars)
    }
}
