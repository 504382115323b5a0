use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Author, MessageId};

/// Events emitted by a conversation after each state change.
///
/// Consumed by renderers that redraw the transcript and by the event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConversationEvent {
    /// A message was appended to the transcript.
    MessageAppended {
        conversation_id: Uuid,
        message_id: MessageId,
        author: Author,
        timestamp: DateTime<Utc>,
    },

    /// A user turn received its assistant reply.
    TurnAnswered {
        conversation_id: Uuid,
        message_id: MessageId,
        reply_id: MessageId,
        timestamp: DateTime<Utc>,
    },

    /// The conversation was torn down; pending replies were dropped.
    ConversationClosed {
        conversation_id: Uuid,
        dropped_turns: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ConversationEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            ConversationEvent::MessageAppended { conversation_id, .. }
            | ConversationEvent::TurnAnswered { conversation_id, .. }
            | ConversationEvent::ConversationClosed { conversation_id, .. } => *conversation_id,
        }
    }
}
