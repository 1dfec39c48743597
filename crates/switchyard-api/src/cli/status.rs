//! Provider status dashboard.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use switchyard_infra::llm::pricing::format_cost;
use switchyard_types::health::CircuitState;

use crate::state::AppState;

/// Show configured providers with their health, budget usage and the
/// response cache counters.
///
/// Health and cache state live in memory, so a fresh process reports every
/// provider closed and an empty cache.
pub fn status(state: &AppState, json: bool) -> Result<()> {
    let orchestrator = &state.orchestrator;
    let providers = orchestrator.providers();
    let health = orchestrator.health_snapshot();
    let costs = orchestrator.cost_snapshot();
    let cache = orchestrator.cache_stats();

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "config": state.config_path.display().to_string(),
            "providers": providers,
            "health": health,
            "costs": costs,
            "cache": cache,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Switchyard v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("  {}", style(state.config_path.display()).dim());
    println!();

    if providers.is_empty() {
        println!(
            "  {} No providers configured. Add a {} section to the config file.",
            style("i").blue().bold(),
            style("[[providers]]").cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Weight").fg(Color::White),
        Cell::new("$/1k").fg(Color::White),
        Cell::new("Circuit").fg(Color::White),
        Cell::new("Err rate").fg(Color::White),
        Cell::new("Calls").fg(Color::White),
        Cell::new("Budget used").fg(Color::White),
        Cell::new("Last error").fg(Color::White),
    ]);

    for config in &providers {
        let id = config.provider_id.as_str();
        let provider_health = health.iter().find(|h| h.provider_id == id);
        let window = costs.iter().find(|c| c.provider_id == id);

        let circuit_cell = if !config.enabled {
            Cell::new("disabled").fg(Color::DarkGrey)
        } else {
            match provider_health.map(|h| h.state) {
                Some(CircuitState::Closed) | None => Cell::new("closed").fg(Color::Green),
                Some(CircuitState::Open) => Cell::new("OPEN").fg(Color::Red),
                Some(CircuitState::HalfOpen) => Cell::new("half_open").fg(Color::Yellow),
            }
        };

        let (error_rate, calls, last_error) = match provider_health {
            Some(h) => (
                format!("{:.0}%", h.recent_error_rate * 100.0),
                format!("{} / {}", h.total_calls, h.total_failures),
                truncate(h.last_error.as_deref().unwrap_or("-"), 40),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };

        let budget = match window {
            Some(w) if w.max_tokens.is_some() || w.max_dollars.is_some() => {
                format!("{:.0}%", w.utilization() * 100.0)
            }
            Some(w) => format!("{} tok", format_tokens(w.tokens_used)),
            None => "-".to_string(),
        };

        table.add_row(vec![
            Cell::new(id).fg(Color::White),
            Cell::new(config.provider_type.to_string()).fg(Color::DarkGrey),
            Cell::new(&config.model).fg(Color::DarkGrey),
            Cell::new(config.weight).fg(Color::Cyan),
            Cell::new(format_cost(config.cost_per_1k())).fg(Color::DarkGrey),
            circuit_cell,
            Cell::new(error_rate).fg(Color::White),
            Cell::new(calls).fg(Color::White),
            Cell::new(budget).fg(Color::White),
            Cell::new(last_error).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();

    if let Some(cache) = cache {
        println!("  {}", style("── Cache ──").dim());
        println!("  Entries:  {}", style(cache.entries).bold());
        println!(
            "  Hit rate: {:.0}% ({} hits, {} misses)",
            cache.hit_rate() * 100.0,
            cache.hits,
            cache.misses
        );
        println!();
    }

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn format_tokens(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
