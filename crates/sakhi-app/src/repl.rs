//! Interactive chat loop.
//!
//! Reads lines from stdin, submits them to the conversation store, and prints
//! assistant messages and notifications as they arrive.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;

use sakhi_chat::{
    ChannelSink, ConversationStore, Notification, NotificationVariant, ReplyScheduler,
    ResponseEngine, TokioScheduler, UnavailableSpeech, VoiceInterface,
};
use sakhi_core::config::SakhiConfig;
use sakhi_core::events::ConversationEvent;
use sakhi_core::types::{Author, Message};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Plain text to submit.
    Say(String),
    /// Capture a spoken question.
    Voice,
    /// Read the last reply aloud.
    Speak,
    /// Show which rule a text would hit.
    Why(String),
    Transcript,
    Json,
    Help,
    Quit,
    /// Unrecognised `/command`.
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return ReplCommand::Say(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name.to_lowercase().as_str() {
            "voice" | "mic" => ReplCommand::Voice,
            "speak" => ReplCommand::Speak,
            "why" => ReplCommand::Why(arg.to_string()),
            "transcript" | "history" => ReplCommand::Transcript,
            "json" => ReplCommand::Json,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(name.to_string()),
        }
    }
}

const HELP: &str = "Ask about crops, weather, pests...\n\
  /voice        speak your question\n\
  /speak        read the last reply aloud\n\
  /why <text>   show which advice rule matches\n\
  /transcript   show the conversation so far\n\
  /json         print the conversation as JSON\n\
  /quit         leave";

/// Format a message the way the chat window shows it.
pub fn render_message(message: &Message) -> String {
    let time = message
        .created_at
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S");
    let who = match message.author {
        Author::User => "You",
        Author::Assistant => "Sakhi",
    };
    format!("[{}] {}: {}", time, who, message.content)
}

pub fn render_notification(notification: &Notification) -> String {
    let marker = match notification.variant {
        NotificationVariant::Default => "*",
        NotificationVariant::Destructive => "!",
    };
    format!(
        "{} {}: {}",
        marker, notification.title, notification.description
    )
}

/// Transcript as JSON, or the export error as a one-line advisory.
fn render_json(store: &ConversationStore) -> String {
    match store.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Transcript export failed");
            format!("! {}", e)
        }
    }
}

/// Wait until every submitted turn has its reply, or `limit` passes.
async fn wait_for_replies(store: &ConversationStore, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while !store.pending_turns().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Run the chat loop until `/quit` or end of input.
pub async fn run(config: &SakhiConfig) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = Arc::new(TokioScheduler::new(Handle::current()));
    let store = Arc::new(ConversationStore::new(&config.chat, scheduler.clone()));
    let engine = ResponseEngine::new();
    let (sink, mut notes) = ChannelSink::new();
    let voice = VoiceInterface::new(Arc::new(UnavailableSpeech), Arc::new(sink), &config.voice);

    tracing::info!(
        conversation_id = %store.id(),
        delay_ms = config.chat.reply_delay_ms,
        voice = voice.is_available(),
        "Chat session started"
    );

    for message in store.transcript() {
        println!("{}", render_message(&message));
    }

    // Renderer: prints replies and notifications as they arrive.
    let mut events = store.subscribe();
    let render_store = Arc::clone(&store);
    let renderer = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(ConversationEvent::MessageAppended { author: Author::Assistant, message_id, .. }) => {
                        if let Some(message) = render_store.message(message_id) {
                            println!("{}", render_message(&message));
                        }
                    }
                    Ok(ConversationEvent::ConversationClosed { .. }) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Renderer fell behind, events skipped");
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(note) = notes.recv() => println!("{}", render_notification(&note)),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut quit = false;
    while let Some(line) = lines.next_line().await? {
        match ReplCommand::parse(&line) {
            ReplCommand::Say(text) => {
                if let Err(e) = store.submit(&text) {
                    // Blank lines are simply ignored, like a disabled send button.
                    if !matches!(e, sakhi_chat::ChatError::EmptyMessage) {
                        println!("! {}", e);
                    }
                }
            }
            ReplCommand::Voice => {
                if let Err(e) = voice.capture_and_submit(&store).await {
                    tracing::debug!(error = %e, "Voice input unavailable");
                }
            }
            ReplCommand::Speak => {
                if let Err(e) = voice.speak_last_reply(&store).await {
                    tracing::debug!(error = %e, "Read-aloud unavailable");
                }
            }
            ReplCommand::Why(text) => match engine.classify(&text) {
                Some(topic) => println!("* matches the {} rule", topic),
                None => println!("* no rule matches; a general tip would be picked"),
            },
            ReplCommand::Transcript => {
                for message in store.transcript() {
                    println!("{}", render_message(&message));
                }
            }
            ReplCommand::Json => println!("{}", render_json(&store)),
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => {
                quit = true;
                break;
            }
            ReplCommand::Unknown(name) => println!("! unknown command /{} (try /help)", name),
        }
    }

    // Piped input ends before the replies land; give them one delay to arrive.
    if !quit {
        wait_for_replies(&store, store.reply_delay() + Duration::from_millis(200)).await;
    }
    let dropped = store.close();
    if dropped > 0 {
        tracing::info!(dropped, "Left with unanswered questions");
    }
    scheduler.shutdown();
    if let Err(e) = renderer.await {
        tracing::warn!(error = %e, "Renderer task failed");
    }
    Ok(())
}
