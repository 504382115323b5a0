pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::SakhiConfig;
pub use error::{Result, SakhiError};
pub use events::ConversationEvent;
pub use types::*;
