//! Mesh-side message types exchanged with a transport.

use serde::{Deserialize, Serialize};

use std::fmt;

/// A text message received from the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Node id of the sender (e.g. `!a1b2c3d4`).
    pub user_id: String,
    /// Display name of the sender, falls back to the node id.
    pub sender_name: String,
    /// Channel index the message arrived on.
    pub channel: u32,
    pub text: String,
    pub is_direct_message: bool,
}

impl InboundMessage {
    /// Where a reply to this message should go.
    pub fn reply_destination(&self) -> Destination {
        if self.is_direct_message {
            Destination::Direct(self.user_id.clone())
        } else {
            Destination::Channel(self.channel)
        }
    }
}

/// Target of an outbound send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Destination {
    /// Direct message to a single node.
    Direct(String),
    /// Broadcast on a channel index.
    Channel(u32),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Direct(node) => write!(f, "dm:{node}"),
            Destination::Channel(index) => write!(f, "ch:{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(is_direct_message: bool) -> InboundMessage {
        InboundMessage {
            user_id: "!0000beef".to_string(),
            sender_name: "beef".to_string(),
            channel: 2,
            text: "hello".to_string(),
            is_direct_message,
        }
    }

    #[test]
    fn test_dm_replies_direct() {
        assert_eq!(
            message(true).reply_destination(),
            Destination::Direct("!0000beef".to_string())
        );
    }

    #[test]
    fn test_channel_message_replies_on_channel() {
        assert_eq!(message(false).reply_destination(), Destination::Channel(2));
    }

    #[test]
    fn test_destination_display() {
        assert_eq!(Destination::Channel(0).to_string(), "ch:0");
        assert_eq!(Destination::Direct("!1".into()).to_string(), "dm:!1");
    }
}
