//! Optional speech capture and read-aloud.
//!
//! The conversation never depends on speech. A [`SpeechCapability`] backend
//! is asked for availability up front; every failure is reported to the user
//! as a notification and leaves the transcript untouched. Nothing is retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sakhi_core::config::VoiceConfig;
use sakhi_core::types::MessageId;

use crate::error::ChatError;
use crate::notify::{Notification, NotificationSink};
use crate::store::ConversationStore;

/// Platform speech services.
#[async_trait]
pub trait SpeechCapability: Send + Sync {
    /// Whether this host can capture and play speech at all.
    fn is_available(&self) -> bool;

    /// Record one utterance and return its transcription.
    async fn capture(&self, language: &str) -> Result<String, ChatError>;

    /// Play `text` aloud.
    async fn speak(&self, text: &str, language: &str) -> Result<(), ChatError>;
}

/// Backend for hosts without any speech support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSpeech;

#[async_trait]
impl SpeechCapability for UnavailableSpeech {
    fn is_available(&self) -> bool {
        false
    }

    async fn capture(&self, _language: &str) -> Result<String, ChatError> {
        Err(ChatError::CapabilityUnavailable(
            "Voice recognition not supported on this device".to_string(),
        ))
    }

    async fn speak(&self, _text: &str, _language: &str) -> Result<(), ChatError> {
        Err(ChatError::CapabilityUnavailable(
            "Speech synthesis not supported on this device".to_string(),
        ))
    }
}

/// Clears the listening flag however capture ends.
struct ListeningGuard<'a>(&'a AtomicBool);

impl Drop for ListeningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Voice controls of the chat widget: the microphone and speaker buttons.
pub struct VoiceInterface {
    capability: Arc<dyn SpeechCapability>,
    sink: Arc<dyn NotificationSink>,
    /// Language tag handed to the backend.
    pub language: String,
    /// When false every voice action reports the capability as unavailable.
    pub enabled: bool,
    listening: AtomicBool,
}

impl std::fmt::Debug for VoiceInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceInterface")
            .field("language", &self.language)
            .field("enabled", &self.enabled)
            .field("listening", &self.is_listening())
            .finish()
    }
}

impl VoiceInterface {
    pub fn new(
        capability: Arc<dyn SpeechCapability>,
        sink: Arc<dyn NotificationSink>,
        config: &VoiceConfig,
    ) -> Self {
        Self {
            capability,
            sink,
            language: config.language.clone(),
            enabled: config.enabled,
            listening: AtomicBool::new(false),
        }
    }

    /// Whether voice features can be offered right now.
    pub fn is_available(&self) -> bool {
        self.enabled && self.capability.is_available()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn report(&self, err: ChatError) -> ChatError {
        if let Some(n) = err.notification() {
            self.sink.notify(n);
        }
        err
    }

    /// Capture one utterance.
    ///
    /// Only one capture may be active at a time.
    pub async fn capture(&self) -> Result<String, ChatError> {
        if !self.is_available() {
            return Err(self.report(ChatError::CapabilityUnavailable(
                "Voice recognition not supported on this device".to_string(),
            )));
        }
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(self.report(ChatError::VoiceBusy));
        }
        let _guard = ListeningGuard(&self.listening);

        self.sink.notify(Notification::info("Listening", "Speak now..."));
        tracing::debug!(language = %self.language, "Voice capture started");

        match self.capability.capture(&self.language).await {
            Ok(text) if !text.trim().is_empty() => {
                self.sink.notify(Notification::info(
                    "Voice Captured",
                    "Voice input captured successfully",
                ));
                tracing::info!(chars = text.chars().count(), "Voice input captured");
                Ok(text.trim().to_string())
            }
            Ok(_) => Err(self.voice_error("no speech detected")),
            Err(e) => {
                tracing::warn!(error = %e, "Voice capture failed");
                Err(self.voice_error(&e.to_string()))
            }
        }
    }

    fn voice_error(&self, cause: &str) -> ChatError {
        self.sink.notify(Notification::destructive(
            "Voice Error",
            "Voice recognition failed. Please try again.",
        ));
        ChatError::CapabilityFailure(cause.to_string())
    }

    /// Capture one utterance and submit it as a user turn.
    pub async fn capture_and_submit(
        &self,
        store: &ConversationStore,
    ) -> Result<MessageId, ChatError> {
        let text = self.capture().await?;
        store.submit(&text)
    }

    /// Read the latest assistant message aloud.
    ///
    /// Returns the id of the message spoken, or `None` when there was
    /// nothing to read.
    pub async fn speak_last_reply(
        &self,
        store: &ConversationStore,
    ) -> Result<Option<MessageId>, ChatError> {
        let Some(message) = store.last_assistant_message() else {
            return Ok(None);
        };
        if !self.is_available() {
            return Err(self.report(ChatError::CapabilityUnavailable(
                "Speech synthesis not supported on this device".to_string(),
            )));
        }

        self.sink
            .notify(Notification::info("Speaking", "Reading message aloud..."));
        if let Err(e) = self.capability.speak(&message.content, &self.language).await {
            tracing::warn!(error = %e, id = %message.id, "Read-aloud failed");
            let err = if matches!(
                e,
                ChatError::CapabilityFailure(_) | ChatError::CapabilityUnavailable(_)
            ) {
                e
            } else {
                ChatError::CapabilityFailure(e.to_string())
            };
            return Err(self.report(err));
        }
        Ok(Some(message.id))
    }
}

// =============================================================================
// Tests
// =============================================================================
