//! Prefixed control commands (`!help`, `!ping`, `!reset`, `!status`).
//!
//! `CommandDispatcher` only parses and routes; each handler owns its side
//! effects.

pub mod builtin;
pub mod dispatcher;
pub mod handler;

pub use builtin::{HelpCommand, PingCommand, ResetCommand, StatusCommand};
pub use dispatcher::{CommandDispatcher, DispatchResult};
pub use handler::{BoxCommandHandler, CommandContext, CommandHandler};
