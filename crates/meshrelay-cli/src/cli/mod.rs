//! CLI command definitions for the `meshrelay` binary.

pub mod check;
pub mod history;
pub mod run;
pub mod stats;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Bridge a mesh radio network to a generative text backend.
#[derive(Parser)]
#[command(name = "meshrelay", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to meshrelay.toml (default: $MESHRELAY_CONFIG or ./meshrelay.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed logs (-v for debug, -vv for everything).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay on the console transport (one `[#ch] <node>: <text>` per line).
    Run {
        /// Node id the relay answers as; its own echoes are ignored.
        #[arg(long, default_value = "!meshrelay")]
        node_id: String,
    },

    /// Show a user's stored conversation and summary.
    History {
        /// Node id, e.g. `!a1b2c3d4`.
        user_id: String,

        /// Only show the most recent N turns.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Delete a user's conversation history and summary.
    Reset { user_id: String },

    /// Store-wide counters.
    Stats,

    /// Validate the configuration and backend setup without starting.
    #[command(name = "check-config")]
    CheckConfig,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
