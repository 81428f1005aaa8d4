//! CommandHandler trait and its boxed wrapper.

use std::future::Future;
use std::pin::Pin;

use meshrelay_types::error::CommandError;
use meshrelay_types::message::InboundMessage;

/// Who issued a command and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub user_id: String,
    pub sender_name: String,
    pub channel: u32,
    pub is_direct_message: bool,
}

impl From<&InboundMessage> for CommandContext {
    fn from(msg: &InboundMessage) -> Self {
        Self {
            user_id: msg.user_id.clone(),
            sender_name: msg.sender_name.clone(),
            channel: msg.channel,
            is_direct_message: msg.is_direct_message,
        }
    }
}

/// A built-in command.
///
/// Uses native async fn in traits (RPITIT). Register through
/// [`BoxCommandHandler`] for dynamic dispatch.
pub trait CommandHandler: Send + Sync {
    /// Lowercase command name without the prefix.
    fn name(&self) -> &str;

    /// One-line description for the help listing.
    fn description(&self) -> &str;

    /// Whether the command is answered even when the sender is rate limited.
    fn bypasses_rate_limit(&self) -> bool {
        false
    }

    fn execute(
        &self,
        args: &str,
        context: &CommandContext,
    ) -> impl Future<Output = Result<String, CommandError>> + Send;
}

/// Object-safe version of [`CommandHandler`].
pub trait CommandHandlerDyn: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn bypasses_rate_limit(&self) -> bool;
    fn execute_boxed<'a>(
        &'a self,
        args: &'a str,
        context: &'a CommandContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, CommandError>> + Send + 'a>>;
}

impl<T: CommandHandler> CommandHandlerDyn for T {
    fn name(&self) -> &str {
        CommandHandler::name(self)
    }

    fn description(&self) -> &str {
        CommandHandler::description(self)
    }

    fn bypasses_rate_limit(&self) -> bool {
        CommandHandler::bypasses_rate_limit(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        args: &'a str,
        context: &'a CommandContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, CommandError>> + Send + 'a>> {
        Box::pin(self.execute(args, context))
    }
}

/// Type-erased command handler held by the dispatcher.
pub struct BoxCommandHandler {
    inner: Box<dyn CommandHandlerDyn + Send + Sync>,
}

impl BoxCommandHandler {
    pub fn new<T: CommandHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub fn bypasses_rate_limit(&self) -> bool {
        self.inner.bypasses_rate_limit()
    }

    pub async fn execute(&self, args: &str, context: &CommandContext) -> Result<String, CommandError> {
        self.inner.execute_boxed(args, context).await
    }
}
