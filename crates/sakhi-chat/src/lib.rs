//! Conversational core for Krishi Sakhi.
//!
//! Provides the keyword rule table, the reply engine with its randomized
//! fallback pool, the conversation store that drives each turn from
//! submission to answer, and the optional speech capability.

pub mod error;
pub mod notify;
pub mod response;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod voice;

pub use error::ChatError;
pub use notify::{ChannelSink, Notification, NotificationSink, NotificationVariant};
pub use response::{generate_reply, FallbackPicker, FixedPicker, ResponseEngine, ThreadRngPicker};
pub use rules::{Rule, Topic, Trigger, FALLBACK_REPLIES, RULES};
pub use scheduler::{
    Clock, ImmediateScheduler, ManualClock, ManualScheduler, ReplyScheduler, ReplyTask, SystemClock,
    TokioScheduler,
};
pub use store::ConversationStore;
pub use voice::{SpeechCapability, UnavailableSpeech, VoiceInterface};
