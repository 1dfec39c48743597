//! CLI command definitions for the `swy` binary.

pub mod generate;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use self::generate::GenerateArgs;

/// Route prompts across LLM providers with failover, caching and budgets.
#[derive(Parser, Debug)]
#[command(name = "swy", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "SWITCHYARD_CONFIG",
        default_value = "switchyard.toml"
    )]
    pub config: PathBuf,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed logs on stderr (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a complete response for a prompt.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Stream a response as it is generated. Ctrl+C cancels.
    Stream(GenerateArgs),

    /// Show provider health, budget usage and cache statistics.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
