//! Error types for the conversational core.

use sakhi_core::error::SakhiError;
use sakhi_core::types::{MessageId, TurnStatus};

use crate::notify::Notification;

/// Errors from the chat engine.
///
/// Reply generation itself cannot fail; these cover rejected input, the
/// lifecycle guard, and the optional speech capability.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("conversation is closed")]
    Closed,
    #[error("message not found: {0}")]
    UnknownMessage(MessageId),
    #[error("invalid turn transition for message {id}: {from} -> {to}")]
    InvalidTransition {
        id: MessageId,
        from: TurnStatus,
        to: TurnStatus,
    },
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),
    #[error("capability failed: {0}")]
    CapabilityFailure(String),
    #[error("voice capture is already active")]
    VoiceBusy,
    /// Config, I/O or serialization failure from the core crate.
    #[error(transparent)]
    Core(#[from] SakhiError),
}

impl ChatError {
    /// The advisory shown to the user for capability problems.
    ///
    /// Returns `None` for errors that are not surfaced as notifications.
    pub fn notification(&self) -> Option<Notification> {
        match self {
            ChatError::CapabilityUnavailable(what) => {
                Some(Notification::destructive("Not Supported", what.clone()))
            }
            ChatError::CapabilityFailure(what) => {
                Some(Notification::destructive("Voice Error", what.clone()))
            }
            ChatError::VoiceBusy => Some(Notification::info(
                "Listening",
                "Voice capture is already in progress",
            )),
            _ => None,
        }
    }
}
