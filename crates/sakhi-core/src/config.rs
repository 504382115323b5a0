use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SakhiError};

/// Greeting shown as the first assistant message of every conversation.
pub const DEFAULT_GREETING: &str =
    "Namaste! I'm Sakhi, your AI farming assistant. How can I help you with your crops today?";

/// Top-level configuration for Sakhi.
///
/// Loaded from `~/.sakhi/config.toml` by default. Every section is optional
/// in the file; missing keys fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SakhiConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

impl SakhiConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SakhiConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the chat engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chat.max_message_length == Some(0) {
            return Err(SakhiError::Config(
                "chat.max_message_length must be greater than zero".to_string(),
            ));
        }
        if self.chat.greeting.trim().is_empty() {
            return Err(SakhiError::Config("chat.greeting cannot be empty".to_string()));
        }
        if self.chat.event_capacity == 0 {
            return Err(SakhiError::Config(
                "chat.event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Simulated latency before an assistant reply is appended.
    pub reply_delay_ms: u64,
    /// Longest accepted user message, in characters. Unlimited when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_length: Option<usize>,
    /// First assistant message of every conversation.
    pub greeting: String,
    /// Buffer size of the conversation event channel.
    pub event_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reply_delay_ms: 1000,
            max_message_length: None,
            greeting: DEFAULT_GREETING.to_string(),
            event_capacity: 64,
        }
    }
}

impl ChatConfig {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}

/// Optional speech capture / playback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether the voice commands are offered at all.
    pub enabled: bool,
    /// BCP 47 language tag passed to the speech backend.
    pub language: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en-US".to_string(),
        }
    }
}
