use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Sequence number of a message within one conversation.
///
/// Assigned in insertion order starting at 1, so ordering by id is ordering
/// by position in the transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Assistant,
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::User => write!(f, "user"),
            Author::Assistant => write!(f, "assistant"),
        }
    }
}

/// Lifecycle of a user turn.
///
/// - Submitted -> AwaitingReply (reply scheduled)
/// - AwaitingReply -> Answered (assistant message appended)
///
/// `Answered` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Appended to the transcript, reply not yet scheduled.
    Submitted,
    /// Reply scheduled, waiting for the simulated delay.
    AwaitingReply,
    /// Assistant reply appended.
    Answered,
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnStatus::Submitted => write!(f, "Submitted"),
            TurnStatus::AwaitingReply => write!(f, "AwaitingReply"),
            TurnStatus::Answered => write!(f, "Answered"),
        }
    }
}

impl TurnStatus {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &TurnStatus) -> bool {
        matches!(
            (self, target),
            (TurnStatus::Submitted, TurnStatus::AwaitingReply)
                | (TurnStatus::AwaitingReply, TurnStatus::Answered)
        )
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self, TurnStatus::Answered)
    }
}

// =============================================================================
// Message
// =============================================================================

/// One entry of the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Lifecycle state. Only user messages carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TurnStatus>,
    /// The user message this assistant message answers. `None` for the greeting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

impl Message {
    /// A freshly submitted user message.
    pub fn user(id: MessageId, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            author: Author::User,
            content: content.into(),
            created_at,
            status: Some(TurnStatus::Submitted),
            reply_to: None,
        }
    }

    /// An assistant message, optionally answering a user turn.
    pub fn assistant(
        id: MessageId,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
        reply_to: Option<MessageId>,
    ) -> Self {
        Self {
            id,
            author: Author::Assistant,
            content: content.into(),
            created_at,
            status: None,
            reply_to,
        }
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }
}
