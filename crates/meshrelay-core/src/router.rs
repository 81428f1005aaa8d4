//! Per-message orchestration.
//!
//! The router is the only component that talks to the transport and the
//! backend. For each inbound message it decides whether to answer, applies
//! admission control, then takes either the command path or the chat path:
//!
//! ```text
//! filter -> validate -> per-user lock -> rate limit -> command | chat
//! chat: append user turn -> history -> memory context -> generate
//!       -> append assistant turn -> split -> paced send
//! ```
//!
//! Everything after the filter runs under the sender's lock, so one user's
//! messages are handled strictly one at a time while other users proceed.

use std::sync::Arc;

use regex::Regex;

use meshrelay_types::config::{BotConfig, ChannelsConfig, LimitsConfig, RelayConfig, ResponseConfig};
use meshrelay_types::conversation::Role;
use meshrelay_types::error::RepositoryError;
use meshrelay_types::llm::{ChatMessage, GenerateRequest};
use meshrelay_types::message::{Destination, InboundMessage};

use crate::chunk::{DeliveryOutcome, DeliveryReport, Pacer, fits, split};
use crate::command::{CommandContext, CommandDispatcher, DispatchResult};
use crate::llm::LlmBackend;
use crate::memory::MemoryManager;
use crate::rate_limit::RateLimiter;
use crate::repository::{HistoryRepository, SummaryRepository};
use crate::sync::KeyedLocks;
use crate::transport::Transport;

/// Reply sent when the backend (and any fallback) failed.
pub const APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A store read or write failed; the request is abandoned.
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("invalid mention pattern: {0}")]
    MentionPattern(#[from] regex::Error),
}

/// What happened to one inbound message.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Not addressed to the relay (own echo, filtered channel, no mention).
    Ignored,
    /// Addressed but malformed (too long, empty after cleanup).
    Invalid,
    RateLimited {
        retry_after_seconds: f64,
        notified: bool,
    },
    Command {
        delivery: DeliveryReport,
    },
    Replied {
        delivery: DeliveryReport,
        backend_failed: bool,
    },
}

pub struct Router<T, H, S, L> {
    transport: Arc<T>,
    history: Arc<H>,
    memory: Arc<MemoryManager<S, L>>,
    backend: Arc<L>,
    limiter: Arc<RateLimiter>,
    commands: Arc<CommandDispatcher>,
    pacer: Pacer,
    locks: KeyedLocks,
    mention: Regex,
    bot: BotConfig,
    channels: ChannelsConfig,
    response: ResponseConfig,
    limits: LimitsConfig,
    notify_rejections: bool,
}

impl<T, H, S, L> Router<T, H, S, L>
where
    T: Transport,
    H: HistoryRepository,
    S: SummaryRepository,
    L: LlmBackend,
{
    pub fn new(
        config: &RelayConfig,
        transport: Arc<T>,
        history: Arc<H>,
        memory: Arc<MemoryManager<S, L>>,
        backend: Arc<L>,
        limiter: Arc<RateLimiter>,
        commands: Arc<CommandDispatcher>,
    ) -> Result<Self, RouterError> {
        let mention = Regex::new(&format!(r"(?i)@{}\b", regex::escape(&config.bot.name)))?;
        Ok(Self {
            transport,
            history,
            memory,
            backend,
            limiter,
            commands,
            pacer: Pacer::from_config(&config.response),
            locks: KeyedLocks::new(),
            mention,
            bot: config.bot.clone(),
            channels: config.channels.clone(),
            response: config.response.clone(),
            limits: config.limits.clone(),
            notify_rejections: config.rate_limits.notify_rejections,
        })
    }

    /// Replace the pacer (tests use [`Pacer::immediate`]).
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Per-user lock entries currently held in memory.
    pub fn lock_entries(&self) -> usize {
        self.locks.len()
    }

    /// Drop lock entries for users with nothing in flight.
    pub fn prune_idle_locks(&self) -> usize {
        self.locks.prune_idle()
    }

    /// Whether the relay should answer this message at all.
    pub fn should_respond(&self, msg: &InboundMessage) -> bool {
        if msg.user_id == self.transport.own_id() {
            return false;
        }
        if msg.is_direct_message {
            return self.bot.respond_to_dms;
        }
        if !self.channels.allows(msg.channel) {
            return false;
        }
        if self.bot.respond_to_mentions && self.mention.is_match(&msg.text) {
            return true;
        }
        self.commands.is_command(&msg.text)
    }

    /// Process one inbound message end to end.
    #[tracing::instrument(
        name = "route_message",
        skip_all,
        fields(
            request_id = %uuid::Uuid::now_v7(),
            user_id = %msg.user_id,
            channel = msg.channel,
            dm = msg.is_direct_message,
        )
    )]
    pub async fn handle(&self, msg: InboundMessage) -> Result<RouteOutcome, RouterError> {
        if !self.should_respond(&msg) {
            tracing::trace!("Message not addressed to relay");
            return Ok(RouteOutcome::Ignored);
        }

        let text = msg.text.trim();
        let length = text.chars().count();
        if length == 0 || length > self.limits.max_inbound_chars {
            tracing::debug!(length, max = self.limits.max_inbound_chars, "Dropping invalid message");
            return Ok(RouteOutcome::Invalid);
        }

        let _guard = self.locks.lock(&msg.user_id).await;
        let destination = msg.reply_destination();
        let is_command = self.commands.is_command(text);

        if !(is_command && self.commands.bypasses_rate_limit(text)) {
            let decision = self.limiter.check(&msg.user_id);
            if !decision.admitted {
                let notified = self
                    .notify_rejection(&destination, decision.retry_after_seconds)
                    .await;
                tracing::info!(
                    retry_after_seconds = decision.retry_after_seconds,
                    notified,
                    "Rate limited"
                );
                return Ok(RouteOutcome::RateLimited {
                    retry_after_seconds: decision.retry_after_seconds,
                    notified,
                });
            }
        }

        if is_command {
            let context = CommandContext::from(&msg);
            let reply = match self.commands.dispatch(text, &context).await {
                DispatchResult::Handled { response } => response,
                DispatchResult::Unknown { hint } => hint,
                DispatchResult::NotACommand => return self.chat(&msg, text, destination).await,
            };
            let delivery = self.send_reply(&destination, &reply).await;
            return Ok(RouteOutcome::Command { delivery });
        }

        self.chat(&msg, text, destination).await
    }

    async fn chat(
        &self,
        msg: &InboundMessage,
        text: &str,
        destination: Destination,
    ) -> Result<RouteOutcome, RouterError> {
        let query = self.clean_query(text);
        if query.is_empty() {
            return Ok(RouteOutcome::Invalid);
        }

        let user_id = msg.user_id.as_str();
        self.history.append_turn(user_id, Role::User, &query).await?;
        let history = self.history.get_history(user_id).await?;
        let context = self.memory.get_context(user_id, history).await?;

        let system_prompt = match &context.summary {
            Some(summary) => format!(
                "{}\n\nPrevious conversation summary: {summary}",
                self.bot.system_prompt
            ),
            None => self.bot.system_prompt.clone(),
        };
        let request = GenerateRequest {
            messages: context.recent.iter().map(ChatMessage::from).collect(),
            system_prompt: Some(system_prompt),
            max_output_tokens: self.limits.max_output_tokens,
            temperature: None,
        };

        let (reply, backend_failed) = match self.backend.generate(&request).await {
            Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), false),
            Ok(_) => {
                tracing::warn!(backend = %self.backend.name(), "Backend returned empty reply");
                (APOLOGY.to_string(), true)
            }
            Err(err) => {
                tracing::error!(backend = %self.backend.name(), error = %err, "Generation failed");
                (APOLOGY.to_string(), true)
            }
        };

        self.history.append_turn(user_id, Role::Assistant, &reply).await?;

        let outbound = self.format_reply(msg, &reply);
        let delivery = self.send_reply(&destination, &outbound).await;
        Ok(RouteOutcome::Replied {
            delivery,
            backend_failed,
        })
    }

    /// Strip `@name` mentions and collapse whitespace.
    fn clean_query(&self, text: &str) -> String {
        let stripped = self.mention.replace_all(text, "");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Prefix channel replies with `@sender: ` when the prefixed text still
    /// splits without truncation.
    fn format_reply(&self, msg: &InboundMessage, reply: &str) -> String {
        if msg.is_direct_message || !self.bot.mention_sender {
            return reply.to_string();
        }
        let prefixed = format!("@{}: {reply}", msg.sender_name);
        if fits(&prefixed, self.response.max_len, self.response.max_chunks) {
            prefixed
        } else {
            reply.to_string()
        }
    }

    async fn send_reply(&self, destination: &Destination, text: &str) -> DeliveryReport {
        let chunks = split(text, self.response.max_len, self.response.max_chunks);
        let report = self
            .pacer
            .deliver(self.transport.as_ref(), destination, &chunks)
            .await;
        if report.outcome() != DeliveryOutcome::Delivered {
            tracing::warn!(
                %destination,
                sent = report.sent,
                total = report.total,
                "Reply only partially delivered"
            );
        }
        report
    }

    async fn notify_rejection(&self, destination: &Destination, retry_after: f64) -> bool {
        if !self.notify_rejections {
            return false;
        }
        let notice = format!("Slow down, retry in {}s", retry_after.ceil().max(1.0) as u64);
        let notice: String = notice.chars().take(self.response.max_len).collect();
        match self.transport.send(destination, &notice).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to send rate-limit notice");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BoxCommandHandler, HelpCommand, PingCommand, ResetCommand, StatusCommand};
    use crate::memory::Summarizer;
    use crate::testing::{InMemoryHistory, InMemorySummaries, RecordingTransport, ScriptedBackend};
    use meshrelay_types::llm::LlmError;
    use std::time::Instant;

    type TestRouter = Router<RecordingTransport, InMemoryHistory, InMemorySummaries, ScriptedBackend>;

    struct Harness {
        router: TestRouter,
        transport: Arc<RecordingTransport>,
        history: Arc<InMemoryHistory>,
        summaries: Arc<InMemorySummaries>,
        backend: Arc<ScriptedBackend>,
    }

    fn harness_with(config: RelayConfig, backend: ScriptedBackend) -> Harness {
        let transport = Arc::new(RecordingTransport::new("!relay"));
        let history = Arc::new(InMemoryHistory::default());
        let summaries = Arc::new(InMemorySummaries::default());
        let backend = Arc::new(backend);
        let limiter = Arc::new(RateLimiter::new(&config.rate_limits));
        let memory = Arc::new(MemoryManager::new(
            summaries.clone(),
            Summarizer::new(backend.clone()),
            config.memory.clone(),
        ));

        let mut commands = CommandDispatcher::new(config.commands.prefix);
        commands.register(BoxCommandHandler::new(PingCommand));
        commands.register(BoxCommandHandler::new(ResetCommand::new(
            history.clone(),
            summaries.clone(),
            memory.clone(),
        )));
        commands.register(BoxCommandHandler::new(StatusCommand::new(
            history.clone(),
            limiter.clone(),
            Instant::now(),
        )));
        let help = HelpCommand::new(commands.prefix(), commands.catalog());
        commands.register(BoxCommandHandler::new(help));

        let router = Router::new(
            &config,
            transport.clone(),
            history.clone(),
            memory,
            backend.clone(),
            limiter,
            Arc::new(commands),
        )
        .unwrap()
        .with_pacer(Pacer::immediate());

        Harness {
            router,
            transport,
            history,
            summaries,
            backend,
        }
    }

    fn relaxed_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.rate_limits.cooldown_seconds = 0.0;
        config.rate_limits.burst_allowance = 100;
        config.rate_limits.messages_per_minute = 100;
        config.rate_limits.global_messages_per_minute = 100;
        config
    }

    fn harness(backend: ScriptedBackend) -> Harness {
        harness_with(relaxed_config(), backend)
    }

    fn dm(user_id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            user_id: user_id.to_string(),
            sender_name: user_id.trim_start_matches('!').to_string(),
            channel: 0,
            text: text.to_string(),
            is_direct_message: true,
        }
    }

    fn on_channel(user_id: &str, channel: u32, text: &str) -> InboundMessage {
        InboundMessage {
            is_direct_message: false,
            channel,
            ..dm(user_id, text)
        }
    }

    #[tokio::test]
    async fn test_dm_chat_round_trip() {
        let h = harness(ScriptedBackend::replying("Antennas should be vertical."));

        let outcome = h.router.handle(dm("!u", "how do I mount it?")).await.unwrap();

        let RouteOutcome::Replied { delivery, backend_failed } = outcome else {
            panic!("expected reply, got {outcome:?}");
        };
        assert!(!backend_failed);
        assert_eq!(delivery.outcome(), DeliveryOutcome::Delivered);
        assert_eq!(
            h.transport.sent(),
            vec![(
                Destination::Direct("!u".to_string()),
                "Antennas should be vertical.".to_string()
            )]
        );
        let turns = h.history.get_history("!u").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].content, "Antennas should be vertical.");
    }

    #[tokio::test]
    async fn test_own_echo_ignored() {
        let h = harness(ScriptedBackend::replying("x"));
        let outcome = h.router.handle(dm("!relay", "hello")).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Ignored));
        assert_eq!(h.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_requires_mention_or_command() {
        let h = harness(ScriptedBackend::replying("hi there"));

        let ignored = h.router.handle(on_channel("!u", 0, "just chatting")).await.unwrap();
        assert!(matches!(ignored, RouteOutcome::Ignored));

        let replied = h.router.handle(on_channel("!u", 0, "@AI   what's up")).await.unwrap();
        assert!(matches!(replied, RouteOutcome::Replied { .. }));
        assert_eq!(h.backend.last_request().unwrap().messages[0].content, "what's up");
        assert_eq!(
            h.transport.sent(),
            vec![(Destination::Channel(0), "@u: hi there".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mention_prefix_dropped_when_it_forces_truncation() {
        let mut config = relaxed_config();
        config.response.max_len = 10;
        config.response.max_chunks = 2;
        let h = harness_with(config, ScriptedBackend::replying("abcdefg hijklmno"));

        // "@u: abcdefg hijklmno" is 20 chars but would split into 3 pieces
        h.router.handle(on_channel("!u", 0, "@ai go")).await.unwrap();

        assert_eq!(
            h.transport.sent_texts(),
            vec!["abcdefg".to_string(), "hijklmno".to_string()]
        );
    }

    #[tokio::test]
    async fn test_mention_needs_word_boundary() {
        let h = harness(ScriptedBackend::replying("x"));
        let outcome = h.router.handle(on_channel("!u", 0, "@aircraft overhead")).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_whitelist_filters_channels() {
        let mut config = relaxed_config();
        config.channels.mode = meshrelay_types::config::ChannelMode::Whitelist;
        config.channels.whitelist = vec![2];
        let h = harness_with(config, ScriptedBackend::replying("x"));

        let blocked = h.router.handle(on_channel("!u", 1, "@ai hi")).await.unwrap();
        assert!(matches!(blocked, RouteOutcome::Ignored));
        let allowed = h.router.handle(on_channel("!u", 2, "@ai hi")).await.unwrap();
        assert!(matches!(allowed, RouteOutcome::Replied { .. }));
    }

    #[tokio::test]
    async fn test_dms_can_be_disabled() {
        let mut config = relaxed_config();
        config.bot.respond_to_dms = false;
        let h = harness_with(config, ScriptedBackend::replying("x"));
        let outcome = h.router.handle(dm("!u", "hello")).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_oversized_message_dropped_unstored() {
        let h = harness(ScriptedBackend::replying("x"));
        let outcome = h.router.handle(dm("!u", &"z".repeat(501))).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Invalid));
        assert!(h.history.get_history("!u").await.unwrap().is_empty());
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_sends_apology() {
        let h = harness(ScriptedBackend::failing(LlmError::Service("502".into())));

        let outcome = h.router.handle(dm("!u", "hello?")).await.unwrap();

        assert!(matches!(
            outcome,
            RouteOutcome::Replied {
                backend_failed: true,
                ..
            }
        ));
        assert_eq!(h.transport.sent_texts(), vec![APOLOGY.to_string()]);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal_for_request() {
        let h = harness(ScriptedBackend::replying("x"));
        h.history.fail_appends();

        let err = h.router.handle(dm("!u", "hello")).await.unwrap_err();
        assert!(matches!(err, RouterError::Persistence(_)));
        assert_eq!(h.backend.call_count(), 0);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_long_reply_is_chunked() {
        let h = harness(ScriptedBackend::replying(&"a".repeat(500)));
        h.router.handle(dm("!u", "tell me everything")).await.unwrap();

        let sent = h.transport.sent_texts();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].chars().count(), 150);
        assert!(sent[1].ends_with("..."));
    }

    #[tokio::test]
    async fn test_commands_are_not_recorded() {
        let h = harness(ScriptedBackend::replying("x"));
        h.router.handle(dm("!u", "!PING")).await.unwrap();
        h.router.handle(dm("!u", "!bogus")).await.unwrap();

        assert_eq!(
            h.transport.sent_texts(),
            vec![
                "pong".to_string(),
                "Unknown command: !bogus. Try !help".to_string()
            ]
        );
        assert!(h.history.get_history("!u").await.unwrap().is_empty());
        assert_eq!(h.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_dropped_silently_but_status_answers() {
        let mut config = RelayConfig::default();
        config.rate_limits.burst_allowance = 1;
        config.rate_limits.cooldown_seconds = 60.0;
        let h = harness_with(config, ScriptedBackend::replying("ok"));

        assert!(matches!(
            h.router.handle(dm("!u", "first")).await.unwrap(),
            RouteOutcome::Replied { .. }
        ));
        let limited = h.router.handle(dm("!u", "second")).await.unwrap();
        assert!(matches!(
            limited,
            RouteOutcome::RateLimited { notified: false, .. }
        ));
        assert_eq!(h.transport.sent().len(), 1);

        let status = h.router.handle(dm("!u", "!status")).await.unwrap();
        assert!(matches!(status, RouteOutcome::Command { .. }));
        assert!(h.transport.sent_texts()[1].starts_with("MeshRelay v"));

        let ping = h.router.handle(dm("!u", "!ping")).await.unwrap();
        assert!(matches!(ping, RouteOutcome::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_notice_when_enabled() {
        let mut config = RelayConfig::default();
        config.rate_limits.burst_allowance = 1;
        config.rate_limits.cooldown_seconds = 30.0;
        config.rate_limits.notify_rejections = true;
        let h = harness_with(config, ScriptedBackend::replying("ok"));

        h.router.handle(dm("!u", "first")).await.unwrap();
        let limited = h.router.handle(dm("!u", "second")).await.unwrap();

        assert!(matches!(limited, RouteOutcome::RateLimited { notified: true, .. }));
        let notice = &h.transport.sent_texts()[1];
        assert!(notice.starts_with("Slow down, retry in "));
    }

    #[tokio::test]
    async fn test_reset_does_not_refill_sender_bucket() {
        let mut config = RelayConfig::default();
        config.rate_limits.burst_allowance = 3;
        config.rate_limits.cooldown_seconds = 0.0;
        config.rate_limits.global_messages_per_minute = 100;
        let h = harness_with(config, ScriptedBackend::replying("ok"));

        let mut admitted = 0;
        for round in 0..4 {
            for text in [format!("chat {round}a"), format!("chat {round}b"), "!reset".to_string()] {
                let outcome = h.router.handle(dm("!u", &text)).await.unwrap();
                if !matches!(outcome, RouteOutcome::RateLimited { .. }) {
                    admitted += 1;
                }
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(h.backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_idle_rate_state_is_prunable() {
        let h = harness(ScriptedBackend::replying("ok"));
        h.router.handle(dm("!u", "hello")).await.unwrap();
        assert_eq!(h.router.limiter().tracked_users(), 1);

        let later = Instant::now() + std::time::Duration::from_secs(3600);
        assert_eq!(h.router.limiter().prune_idle(later), 1);
        assert_eq!(h.router.limiter().tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_reset_then_history_empty_and_summary_gone() {
        let h = harness(ScriptedBackend::replying("ok"));
        for i in 0..6 {
            h.router.handle(dm("!u", &format!("msg {i}"))).await.unwrap();
        }
        assert!(h.summaries.get("!u").is_some());

        h.router.handle(dm("!u", "!reset")).await.unwrap();

        assert!(h.history.get_history("!u").await.unwrap().is_empty());
        assert!(h.summaries.get("!u").is_none());
        assert_eq!(
            h.transport.sent_texts().last().unwrap(),
            "Cleared 12 messages from history"
        );
    }

    #[tokio::test]
    async fn test_twentieth_turn_uses_summary_of_first_twelve() {
        let h = harness(
            ScriptedBackend::replying("reply")
                .then(vec![Ok("Summary of twelve.".to_string())]),
        );
        for i in 1..=19 {
            let role = if i % 2 == 1 { Role::User } else { Role::Assistant };
            h.history.append_turn("!u", role, &format!("turn {i}")).await.unwrap();
        }

        h.router.handle(dm("!u", "turn 20")).await.unwrap();

        let summary = h.summaries.get("!u").unwrap();
        assert_eq!(summary.checkpoint_count, 12);
        let chat = h.backend.last_request().unwrap();
        let contents: Vec<&str> = chat.messages.iter().map(|m| m.content.as_str()).collect();
        let expected: Vec<String> = (13..=20).map(|i| format!("turn {i}")).collect();
        assert_eq!(contents, expected);
        assert!(
            chat.system_prompt
                .unwrap()
                .ends_with("\n\nPrevious conversation summary: Summary of twelve.")
        );
    }

    #[tokio::test]
    async fn test_same_user_messages_are_serialized() {
        let h = Arc::new(harness(ScriptedBackend::replying("ok")));
        let mut handles = Vec::new();
        for i in 0..8 {
            let h = h.clone();
            handles.push(tokio::spawn(async move {
                h.router.handle(dm("!u", &format!("q{i}"))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let turns = h.history.get_history("!u").await.unwrap();
        assert_eq!(turns.len(), 16);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
    }
}
