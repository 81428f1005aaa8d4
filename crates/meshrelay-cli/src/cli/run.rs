//! `meshrelay run`: the relay loop.
//!
//! Reads messages from the transport, handles each one on its own task and
//! stops on Ctrl+C/SIGTERM or when the transport closes. In-flight messages
//! are allowed to finish before the database is closed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use console::style;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use meshrelay_core::command::{
    BoxCommandHandler, CommandDispatcher, HelpCommand, PingCommand, ResetCommand, StatusCommand,
};
use meshrelay_core::llm::LlmBackend;
use meshrelay_core::memory::{MemoryManager, Summarizer};
use meshrelay_core::rate_limit::RateLimiter;
use meshrelay_core::router::{RouteOutcome, Router};
use meshrelay_core::transport::Transport;
use meshrelay_infra::console::ConsoleTransport;
use meshrelay_infra::llm::build_backend_chain;
use meshrelay_types::message::InboundMessage;

use crate::state::{AppState, ConcreteMemory, ConcreteRouter};

/// How often idle per-user lock entries are dropped.
const LOCK_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

pub async fn run(state: AppState, node_id: String, shutdown: CancellationToken) -> Result<()> {
    let config = &state.config;
    let backend = Arc::new(build_backend_chain(&config.llm)?);
    let limiter = Arc::new(RateLimiter::new(&config.rate_limits));
    let memory: Arc<ConcreteMemory> = Arc::new(MemoryManager::new(
        state.summaries.clone(),
        Summarizer::new(backend.clone()),
        config.memory.clone(),
    ));
    let cached = memory.reconcile().await?;

    let commands = Arc::new(build_commands(&state, memory.clone(), limiter.clone()));
    let transport = Arc::new(ConsoleTransport::stdio(node_id.clone()));
    let router = Arc::new(Router::new(
        config,
        transport,
        state.history.clone(),
        memory,
        backend.clone(),
        limiter,
        commands,
    )?);

    tracing::info!(
        node_id = %node_id,
        backend = %backend.name(),
        db = %state.db_path.display(),
        cached_summaries = cached,
        "Relay started"
    );
    eprintln!(
        "  {} meshrelay listening as {} ({})",
        style("⚡").bold(),
        style(&node_id).cyan(),
        style(backend.name()).dim()
    );
    eprintln!("  {}", style("Type '<node>: <text>' or '#<ch> <node>: <text>'. Ctrl+C to stop.").dim());

    relay_loop(router, shutdown).await;

    state.pool.close().await;
    tracing::info!("Relay stopped");
    Ok(())
}

fn build_commands(
    state: &AppState,
    memory: Arc<ConcreteMemory>,
    limiter: Arc<RateLimiter>,
) -> CommandDispatcher {
    let mut dispatcher = CommandDispatcher::new(state.config.commands.prefix);
    dispatcher.register(BoxCommandHandler::new(PingCommand));
    dispatcher.register(BoxCommandHandler::new(StatusCommand::new(
        state.history.clone(),
        limiter,
        Instant::now(),
    )));
    dispatcher.register(BoxCommandHandler::new(ResetCommand::new(
        state.history.clone(),
        state.summaries.clone(),
        memory,
    )));
    let help = HelpCommand::new(dispatcher.prefix(), dispatcher.catalog());
    dispatcher.register(BoxCommandHandler::new(help));
    dispatcher
}

/// Receive until shutdown or transport close, one task per message.
async fn relay_loop<T>(router: Arc<ConcreteRouter<T>>, shutdown: CancellationToken)
where
    T: Transport + 'static,
{
    let mut tasks = JoinSet::new();
    let mut prune = tokio::time::interval(LOCK_PRUNE_INTERVAL);
    prune.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown requested");
                break;
            }
            _ = prune.tick() => {
                let locks = router.prune_idle_locks();
                let rate_states = router.limiter().prune_idle(Instant::now());
                tracing::debug!(
                    locks,
                    rate_states,
                    remaining_locks = router.lock_entries(),
                    tracked_users = router.limiter().tracked_users(),
                    "Pruned idle per-user state"
                );
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Message task panicked");
                }
            }
            received = router.transport().receive() => match received {
                Ok(Some(msg)) => {
                    let router = router.clone();
                    tasks.spawn(async move { handle_one(&router, msg).await });
                }
                Ok(None) => {
                    tracing::info!("Transport closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Transport failed");
                    break;
                }
            },
        }
    }

    if !tasks.is_empty() {
        tracing::info!(in_flight = tasks.len(), "Waiting for in-flight messages");
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Message task panicked");
        }
    }
}

async fn handle_one<T: Transport>(router: &ConcreteRouter<T>, msg: InboundMessage) {
    match router.handle(msg).await {
        Ok(RouteOutcome::Replied {
            backend_failed: true,
            ..
        }) => tracing::warn!("Replied with apology after backend failure"),
        Ok(outcome) => tracing::debug!(?outcome, "Message handled"),
        Err(e) => tracing::error!(error = %e, "Message dropped"),
    }
}
