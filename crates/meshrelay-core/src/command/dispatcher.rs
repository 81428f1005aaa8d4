//! Command parsing and routing.

use std::collections::BTreeMap;

use super::handler::{BoxCommandHandler, CommandContext};

/// Result of offering a message to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Message does not start with the prefix; it belongs to the chat path.
    NotACommand,
    /// Prefixed but no handler matched.
    Unknown { hint: String },
    Handled { response: String },
}

/// Maximum characters of a handler error echoed back to the sender.
const ERROR_ECHO_CHARS: usize = 100;

pub struct CommandDispatcher {
    prefix: char,
    handlers: BTreeMap<String, BoxCommandHandler>,
}

impl CommandDispatcher {
    pub fn new(prefix: char) -> Self {
        Self {
            prefix,
            handlers: BTreeMap::new(),
        }
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Register a handler, replacing any handler with the same name.
    pub fn register(&mut self, handler: BoxCommandHandler) {
        let name = handler.name().to_lowercase();
        tracing::debug!(command = %name, "Registered command");
        self.handlers.insert(name, handler);
    }

    /// `(name, description)` for every registered command, sorted by name.
    pub fn catalog(&self) -> Vec<(String, String)> {
        self.handlers
            .iter()
            .map(|(name, h)| (name.clone(), h.description().to_string()))
            .collect()
    }

    /// Split `text` into a lowercase command name and its raw arguments.
    pub fn parse<'a>(&self, text: &'a str) -> Option<(String, &'a str)> {
        let body = text.trim().strip_prefix(self.prefix)?;
        let mut parts = body.splitn(2, char::is_whitespace);
        let name = parts.next().filter(|n| !n.is_empty())?;
        let args = parts.next().unwrap_or("").trim();
        Some((name.to_lowercase(), args))
    }

    pub fn is_command(&self, text: &str) -> bool {
        self.parse(text).is_some()
    }

    /// True when `text` names a registered command exempt from rate limiting.
    pub fn bypasses_rate_limit(&self, text: &str) -> bool {
        self.parse(text)
            .and_then(|(name, _)| self.handlers.get(&name))
            .is_some_and(|h| h.bypasses_rate_limit())
    }

    pub async fn dispatch(&self, text: &str, context: &CommandContext) -> DispatchResult {
        let Some((name, args)) = self.parse(text) else {
            return DispatchResult::NotACommand;
        };

        let Some(handler) = self.handlers.get(&name) else {
            tracing::debug!(command = %name, user_id = %context.user_id, "Unknown command");
            return DispatchResult::Unknown {
                hint: format!(
                    "Unknown command: {p}{name}. Try {p}help",
                    p = self.prefix
                ),
            };
        };

        tracing::debug!(command = %name, user_id = %context.user_id, "Dispatching command");
        match handler.execute(args, context).await {
            Ok(response) => DispatchResult::Handled { response },
            Err(err) => {
                tracing::error!(command = %name, error = %err, "Command failed");
                let detail: String = err.to_string().chars().take(ERROR_ECHO_CHARS).collect();
                DispatchResult::Handled {
                    response: format!("Error: {detail}"),
                }
            }
        }
    }
}
