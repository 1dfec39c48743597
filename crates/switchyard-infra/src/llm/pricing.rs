//! Default pricing for known models.
//!
//! Routing and accounting work in a single blended USD-per-1k-token figure.
//! When a provider's config omits `cost_per_1k_tokens`, the loader fills it
//! from this table by provider type and model prefix. Estimates shown to
//! users are labeled as approximate (`~$0.12`).

use switchyard_types::provider::ProviderType;

struct PricingEntry {
    provider_type: ProviderType,
    model_prefix: &'static str,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
}

/// Conservative fallback when no model matches.
const FALLBACK_INPUT_COST: f64 = 5.0;
const FALLBACK_OUTPUT_COST: f64 = 15.0;

/// Approximate list prices in USD per million tokens.
///
/// Longer prefixes must come before shorter ones that they extend
/// (`gpt-4o-mini` before `gpt-4o`).
fn default_pricing_table() -> Vec<PricingEntry> {
    use ProviderType::{Anthropic, OpenAiCompatible};

    let entry = |provider_type, model_prefix, input, output| PricingEntry {
        provider_type,
        model_prefix,
        input_cost_per_million: input,
        output_cost_per_million: output,
    };

    vec![
        entry(Anthropic, "claude-sonnet-4", 3.0, 15.0),
        entry(Anthropic, "claude-opus-4", 15.0, 75.0),
        entry(Anthropic, "claude-haiku-3", 0.25, 1.25),
        entry(Anthropic, "claude-3-5-haiku", 0.80, 4.0),
        entry(OpenAiCompatible, "gpt-4o-mini", 0.15, 0.60),
        entry(OpenAiCompatible, "gpt-4o", 2.50, 10.0),
        entry(OpenAiCompatible, "gemini-2", 1.25, 5.0),
        entry(OpenAiCompatible, "mistral-large", 2.0, 6.0),
        entry(OpenAiCompatible, "mistral-small", 0.20, 0.60),
    ]
}

/// Blended price in USD per 1,000 tokens for a provider type and model.
///
/// Input and output prices are averaged, since the ledger charges a single
/// rate on total tokens.
pub fn default_cost_per_1k(provider_type: ProviderType, model: &str) -> f64 {
    let (input, output) = default_pricing_table()
        .into_iter()
        .find(|e| e.provider_type == provider_type && model.starts_with(e.model_prefix))
        .map(|e| (e.input_cost_per_million, e.output_cost_per_million))
        .unwrap_or((FALLBACK_INPUT_COST, FALLBACK_OUTPUT_COST));

    (input + output) / 2.0 / 1000.0
}

/// Format a cost estimate as a human-readable string.
///
/// Below $0.01 three decimal places are shown, otherwise two.
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("~${cost:.3}")
    } else {
        format!("~${cost:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn known_model_uses_blended_price() {
        // (3 + 15) / 2 per million = 0.009 per 1k
        let cost = default_cost_per_1k(ProviderType::Anthropic, "claude-sonnet-4-20250514");
        assert!(close(cost, 0.009), "got {cost}");
    }

    #[test]
    fn mini_matches_before_regular() {
        let mini = default_cost_per_1k(ProviderType::OpenAiCompatible, "gpt-4o-mini-2024");
        assert!(close(mini, 0.000375), "got {mini}");
        let full = default_cost_per_1k(ProviderType::OpenAiCompatible, "gpt-4o");
        assert!(close(full, 0.00625), "got {full}");
    }

    #[test]
    fn provider_type_must_match() {
        // An Anthropic model name behind an OpenAI-compatible gateway is unknown.
        let cost = default_cost_per_1k(ProviderType::OpenAiCompatible, "claude-sonnet-4");
        assert!(close(cost, 0.01), "got {cost}");
    }

    #[test]
    fn unknown_model_uses_fallback() {
        let cost = default_cost_per_1k(ProviderType::Anthropic, "some-future-model");
        assert!(close(cost, 0.01), "got {cost}");
    }

    #[test]
    fn format_cost_precision() {
        assert_eq!(format_cost(0.001), "~$0.001");
        assert_eq!(format_cost(0.0), "~$0.000");
        assert_eq!(format_cost(0.12), "~$0.12");
        assert_eq!(format_cost(4.5), "~$4.50");
    }
}
