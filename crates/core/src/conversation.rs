//! Conversation log contract and record format.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Who spoke a logged turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "USER"),
            Role::Assistant => write!(f, "ASSISTANT"),
        }
    }
}

/// An append-only sink of conversation turns.
///
/// A single sink is shared by every concurrent call, so implementations must
/// keep each appended turn contiguous.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append(&self, role: Role, text: &str) -> Result<()>;
}

/// Renders one turn as `[timestamp] ROLE\nTEXT\n` followed by a separator line.
pub fn format_record(timestamp: DateTime<Utc>, role: Role, text: &str) -> String {
    format!(
        "[{}] {}\n{}\n{}\n",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        role,
        text,
        "=".repeat(50)
    )
}
