//! Conversation turn and summary types.
//!
//! A [`Turn`] is one recorded message in a user's conversation with the relay.
//! A [`Summary`] is the compacted text standing in for a leading run of turns.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Who produced a turn.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('user', 'assistant'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// One recorded message in a user's conversation.
///
/// Turns are append-only. Within a user they are ordered by
/// `(timestamp, id)` ascending, where `id` is the store-assigned
/// insertion sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Compacted summary of a user's leading turns.
///
/// At most one summary exists per user. `checkpoint_count` is the number
/// of leading turns (by arrival order) the text covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub user_id: String,
    pub text: String,
    pub checkpoint_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Summary {
    /// Build a summary stamped with the current time, at the microsecond
    /// precision the store keeps.
    pub fn new(user_id: impl Into<String>, text: impl Into<String>, checkpoint_count: u32) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            checkpoint_count,
            updated_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// Aggregate counters over the whole turn log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_turns: u64,
    pub unique_users: u64,
    pub oldest_turn_at: Option<DateTime<Utc>>,
}
