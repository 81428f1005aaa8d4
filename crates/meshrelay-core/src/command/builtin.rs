//! Built-in command handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use meshrelay_types::error::CommandError;

use super::handler::{CommandContext, CommandHandler};
use crate::llm::LlmBackend;
use crate::memory::MemoryManager;
use crate::rate_limit::RateLimiter;
use crate::repository::{HistoryRepository, SummaryRepository};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `!ping` -> `pong`.
pub struct PingCommand;

impl CommandHandler for PingCommand {
    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Test connectivity"
    }

    async fn execute(&self, _args: &str, _context: &CommandContext) -> Result<String, CommandError> {
        Ok("pong".to_string())
    }
}

/// `!help`: lists the commands registered before it plus itself.
pub struct HelpCommand {
    text: String,
}

impl HelpCommand {
    pub fn new(prefix: char, mut catalog: Vec<(String, String)>) -> Self {
        if !catalog.iter().any(|(name, _)| name == "help") {
            catalog.push(("help".to_string(), "Show available commands".to_string()));
        }
        catalog.sort_by(|a, b| a.0.cmp(&b.0));

        let mut parts = vec!["Commands:".to_string()];
        parts.extend(
            catalog
                .iter()
                .map(|(name, description)| format!("{prefix}{name} - {description}")),
        );
        Self {
            text: parts.join(" | "),
        }
    }
}

impl CommandHandler for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "Show available commands"
    }

    async fn execute(&self, _args: &str, _context: &CommandContext) -> Result<String, CommandError> {
        Ok(self.text.clone())
    }
}

/// `!reset`: clears the sender's turns and summary.
///
/// Admission state is left alone: a reset never refills the sender's bucket.
pub struct ResetCommand<H, S, L> {
    history: Arc<H>,
    summaries: Arc<S>,
    memory: Arc<MemoryManager<S, L>>,
}

impl<H, S, L> ResetCommand<H, S, L> {
    pub fn new(history: Arc<H>, summaries: Arc<S>, memory: Arc<MemoryManager<S, L>>) -> Self {
        Self {
            history,
            summaries,
            memory,
        }
    }
}

impl<H, S, L> CommandHandler for ResetCommand<H, S, L>
where
    H: HistoryRepository,
    S: SummaryRepository,
    L: LlmBackend,
{
    fn name(&self) -> &str {
        "reset"
    }

    fn description(&self) -> &str {
        "Clear your chat history"
    }

    async fn execute(&self, _args: &str, context: &CommandContext) -> Result<String, CommandError> {
        let user_id = context.user_id.as_str();
        let deleted = self.history.clear_history(user_id).await?;
        self.summaries.clear_summary(user_id).await?;
        self.memory.invalidate(user_id);
        tracing::info!(user_id, deleted, "History reset");

        Ok(if deleted > 0 {
            format!("Cleared {deleted} messages from history")
        } else {
            "No history to clear".to_string()
        })
    }
}

/// `!status`: version, uptime, store counters and global headroom.
///
/// Answered even when the sender is rate limited.
pub struct StatusCommand<H> {
    history: Arc<H>,
    limiter: Arc<RateLimiter>,
    started_at: Instant,
}

impl<H> StatusCommand<H> {
    pub fn new(history: Arc<H>, limiter: Arc<RateLimiter>, started_at: Instant) -> Self {
        Self {
            history,
            limiter,
            started_at,
        }
    }
}

impl<H: HistoryRepository> CommandHandler for StatusCommand<H> {
    fn name(&self) -> &str {
        "status"
    }

    fn description(&self) -> &str {
        "Show relay status"
    }

    fn bypasses_rate_limit(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &str, _context: &CommandContext) -> Result<String, CommandError> {
        let stats = self.history.stats().await?;
        let global = self.limiter.global_snapshot();
        Ok([
            format!("MeshRelay v{VERSION}"),
            format!("Up: {}", format_uptime(self.started_at.elapsed())),
            format!("Users: {}", stats.unique_users),
            format!("Msgs: {}", stats.total_turns),
            format!("Slots: {}/{}", global.tokens_available, global.capacity),
        ]
        .join(" | "))
    }
}

/// Compact uptime: `3d4h`, `2h15m`, `5m12s`.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60,
    );
    if days > 0 {
        format!("{days}d{hours}h")
    } else if hours > 0 {
        format!("{hours}h{minutes}m")
    } else {
        format!("{minutes}m{seconds}s")
    }
}
