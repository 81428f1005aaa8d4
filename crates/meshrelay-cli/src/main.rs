//! meshrelay CLI entry point.
//!
//! Binary name: `meshrelay`
//!
//! Parses CLI arguments, initializes tracing, loads configuration, then
//! dispatches to the relay loop or an operator command.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use meshrelay_infra::config::{load_config, resolve_config_path};
use meshrelay_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions need neither logging nor config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "meshrelay", &mut std::io::stdout());
        return Ok(());
    }

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    let tracing_options = TracingOptions::from_verbosity(cli.verbose, cli.quiet)
        .with_format(format)
        .with_otel(cli.otel);
    init_tracing(&tracing_options).map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_config(&config_path).await?;

    if let Commands::CheckConfig = cli.command {
        return cli::check::check_config(&config, &config_path, cli.json);
    }

    let state = AppState::init(config, &config_path).await?;

    match cli.command {
        Commands::Run { node_id } => {
            let shutdown = CancellationToken::new();
            let trigger = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                trigger.cancel();
            });
            cli::run::run(state, node_id, shutdown).await?;
        }
        Commands::History { user_id, limit } => {
            cli::history::show_history(&state, &user_id, limit, cli.json).await?;
            state.pool.close().await;
        }
        Commands::Reset { user_id } => {
            cli::history::reset_user(&state, &user_id, cli.json).await?;
            state.pool.close().await;
        }
        Commands::Stats => {
            cli::stats::stats(&state, cli.json).await?;
            state.pool.close().await;
        }
        Commands::CheckConfig | Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
