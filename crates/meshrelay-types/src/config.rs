//! Relay configuration types.
//!
//! `RelayConfig` mirrors `meshrelay.toml`. Every section is optional and every
//! field has a default, so an empty file yields a working relay that talks to
//! an OpenAI-compatible endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::BackendKind;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant on a Meshtastic mesh network. \
Keep responses VERY brief - under 250 characters total. Be concise but friendly. \
No markdown formatting.";

/// Longest accepted delay or cooldown, in seconds.
pub const MAX_DELAY_SECONDS: f64 = 86_400.0;

/// Convert seconds to a `Duration`, clamped to `0..=MAX_DELAY_SECONDS`.
/// NaN maps to zero.
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_DELAY_SECONDS)).unwrap_or_default()
}

/// Top-level configuration for the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bot: BotConfig,
    pub channels: ChannelsConfig,
    pub memory: MemoryConfig,
    pub rate_limits: RateLimitConfig,
    pub response: ResponseConfig,
    pub commands: CommandsConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
}

impl RelayConfig {
    /// Reject values the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.memory.window_size < 1 {
            return invalid("memory.window_size must be at least 1");
        }
        if self.memory.summarize_threshold < 1 {
            return invalid("memory.summarize_threshold must be at least 1");
        }
        if self.rate_limits.messages_per_minute == 0 {
            return invalid("rate_limits.messages_per_minute must be at least 1");
        }
        if self.rate_limits.global_messages_per_minute == 0 {
            return invalid("rate_limits.global_messages_per_minute must be at least 1");
        }
        if self.rate_limits.burst_allowance == 0 {
            return invalid("rate_limits.burst_allowance must be at least 1");
        }
        if self.response.max_len == 0 {
            return invalid("response.max_len must be at least 1");
        }
        if self.response.max_chunks == 0 {
            return invalid("response.max_chunks must be at least 1");
        }
        let r = &self.response;
        for (name, v) in [
            ("rate_limits.cooldown_seconds", self.rate_limits.cooldown_seconds),
            ("response.delay_min", r.delay_min),
            ("response.delay_max", r.delay_max),
            ("response.inter_chunk_delay", r.inter_chunk_delay),
        ] {
            if !(0.0..=MAX_DELAY_SECONDS).contains(&v) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 0 and {MAX_DELAY_SECONDS} seconds"
                )));
            }
        }
        if r.delay_min > r.delay_max {
            return invalid("response.delay_min must not exceed response.delay_max");
        }
        if self.commands.prefix.is_whitespace() {
            return invalid("commands.prefix must not be whitespace");
        }
        if self.limits.max_inbound_chars == 0 {
            return invalid("limits.max_inbound_chars must be at least 1");
        }
        if self.limits.max_output_tokens == 0 {
            return invalid("limits.max_output_tokens must be at least 1");
        }
        if self.storage.database.trim().is_empty() {
            return invalid("storage.database must not be empty");
        }
        self.llm.primary.validate("llm")?;
        if let Some(fallback) = &self.llm.fallback {
            fallback.validate("llm.fallback")?;
        }
        Ok(())
    }
}

/// `[bot]`: identity and when to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Name matched by `@name` mentions on channels.
    pub name: String,
    pub respond_to_dms: bool,
    pub respond_to_mentions: bool,
    /// Prefix channel replies with `@sender: `.
    pub mention_sender: bool,
    pub system_prompt: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "ai".to_string(),
            respond_to_dms: true,
            respond_to_mentions: true,
            mention_sender: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Which channels the relay listens on for mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    #[default]
    All,
    Whitelist,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::All => write!(f, "all"),
            ChannelMode::Whitelist => write!(f, "whitelist"),
        }
    }
}

/// `[channels]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub mode: ChannelMode,
    pub whitelist: Vec<u32>,
}

impl ChannelsConfig {
    pub fn allows(&self, channel: u32) -> bool {
        match self.mode {
            ChannelMode::All => true,
            ChannelMode::Whitelist => self.whitelist.contains(&channel),
        }
    }
}

/// `[memory]`: rolling summary compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Recent exchange pairs kept verbatim.
    pub window_size: usize,
    /// New uncovered turns needed before re-summarizing.
    pub summarize_threshold: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: 4,
            summarize_threshold: 8,
        }
    }
}

/// `[rate_limits]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub messages_per_minute: u32,
    pub global_messages_per_minute: u32,
    pub cooldown_seconds: f64,
    pub burst_allowance: u32,
    /// Node ids exempt from admission control.
    pub vip_users: Vec<String>,
    /// Tell rejected users when to retry instead of dropping silently.
    pub notify_rejections: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: 10,
            global_messages_per_minute: 30,
            cooldown_seconds: 5.0,
            burst_allowance: 3,
            vip_users: Vec::new(),
            notify_rejections: false,
        }
    }
}

impl RateLimitConfig {
    pub fn cooldown(&self) -> Duration {
        seconds(self.cooldown_seconds)
    }
}

/// `[response]`: chunking and pacing of replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Maximum characters per transmitted chunk.
    pub max_len: usize,
    pub max_chunks: usize,
    pub delay_min: f64,
    pub delay_max: f64,
    pub inter_chunk_delay: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_len: 150,
            max_chunks: 2,
            delay_min: 2.2,
            delay_max: 3.0,
            inter_chunk_delay: 1.0,
        }
    }
}

/// `[commands]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub prefix: char,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self { prefix: '!' }
    }
}

/// `[limits]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longer inbound text is dropped and never stored.
    pub max_inbound_chars: usize,
    pub max_output_tokens: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_inbound_chars: 500,
            max_output_tokens: 300,
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file path, relative paths resolve against the config directory.
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "meshrelay.db".to_string(),
        }
    }
}

/// `[llm]`: primary backend plus an optional `[llm.fallback]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(flatten)]
    pub primary: LlmBackendConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<LlmBackendConfig>,
}

/// One backend entry.
///
/// `api_key` holds either a literal key or a `${ENV_VAR}` reference; the
/// infra loader resolves it into a secret before use.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmBackendConfig {
    pub backend: BackendKind,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmBackendConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl LlmBackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{section}.model must not be empty")));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "{section}.timeout_secs must be at least 1"
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for LlmBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmBackendConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
