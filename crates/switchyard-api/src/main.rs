//! Switchyard CLI entry point.
//!
//! Binary name: `swy`
//!
//! Parses arguments, loads the configuration, builds the orchestrator and
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use switchyard_observe::tracing_setup::{init_tracing_with_level, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info,switchyard_core=debug,switchyard_infra=debug",
        _ => "trace",
    };
    init_tracing_with_level(cli.otel, level)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need a config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "swy", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(&cli.config).await?;

    match cli.command {
        Commands::Generate(args) => cli::generate::generate(&state, &args, cli.json).await,
        Commands::Stream(args) => cli::generate::stream(&state, &args, cli.json).await,
        Commands::Status => cli::status::status(&state, cli.json),
        Commands::Completions { .. } => Ok(()),
    }
}
