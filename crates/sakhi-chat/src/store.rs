//! Conversation store: the transcript and the lifecycle of each turn.
//!
//! A turn moves Submitted -> AwaitingReply when the user message is appended
//! and its reply scheduled, then AwaitingReply -> Answered when the scheduled
//! reply is appended. Replies land in the order their delays elapse, which
//! need not be submission order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use sakhi_core::config::ChatConfig;
use sakhi_core::error::SakhiError;
use sakhi_core::events::ConversationEvent;
use sakhi_core::types::{Author, Message, MessageId, TurnStatus};

use crate::error::ChatError;
use crate::response::ResponseEngine;
use crate::scheduler::{Clock, ReplyScheduler, SystemClock};

// =============================================================================
// Shared state
// =============================================================================

#[derive(Debug)]
struct Inner {
    messages: Vec<Message>,
    next_id: u64,
    closed: bool,
}

/// State reachable from scheduled reply tasks. Tasks hold a `Weak` so a
/// dropped store discards its late replies.
struct Shared {
    id: Uuid,
    state: Mutex<Inner>,
    engine: ResponseEngine,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ConversationEvent>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timestamp for the next message, never earlier than the last one.
    fn stamp(&self, inner: &Inner) -> DateTime<Utc> {
        let now = self.clock.now();
        match inner.messages.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        }
    }

    fn emit(&self, event: ConversationEvent) {
        // No subscribers is normal.
        let _ = self.events.send(event);
    }

    fn append(
        &self,
        inner: &mut Inner,
        build: impl FnOnce(MessageId, DateTime<Utc>) -> Message,
    ) -> MessageId {
        let id = MessageId(inner.next_id);
        inner.next_id += 1;
        let created_at = self.stamp(inner);
        let message = build(id, created_at);
        let author = message.author;
        inner.messages.push(message);
        self.emit(ConversationEvent::MessageAppended {
            conversation_id: self.id,
            message_id: id,
            author,
            timestamp: created_at,
        });
        id
    }

    fn transition(
        &self,
        inner: &mut Inner,
        id: MessageId,
        to: TurnStatus,
    ) -> Result<(), ChatError> {
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.author == Author::User)
            .ok_or(ChatError::UnknownMessage(id))?;
        let from = message.status.unwrap_or(TurnStatus::Answered);
        if !from.can_transition_to(&to) {
            return Err(ChatError::InvalidTransition { id, from, to });
        }
        tracing::debug!(id = %id, "Turn state: {} -> {}", from, to);
        message.status = Some(to);
        Ok(())
    }

    /// Append the reply for `id` and mark the turn answered.
    fn deliver(&self, id: MessageId, text: &str) {
        let reply = self.engine.generate_reply(text);
        let mut inner = self.state();
        if inner.closed {
            tracing::debug!(id = %id, "Conversation closed, reply discarded");
            return;
        }
        // Validate before appending so a turn is answered at most once.
        let pending = inner
            .messages
            .iter()
            .any(|m| m.id == id && m.status == Some(TurnStatus::AwaitingReply));
        if !pending {
            tracing::warn!(id = %id, "Reply for a turn that is not awaiting one, discarded");
            return;
        }
        let reply_id = self.append(&mut inner, |rid, at| {
            Message::assistant(rid, reply, at, Some(id))
        });
        if let Err(e) = self.transition(&mut inner, id, TurnStatus::Answered) {
            tracing::warn!(error = %e, "Failed to mark turn answered");
            return;
        }
        let timestamp = self.stamp(&inner);
        self.emit(ConversationEvent::TurnAnswered {
            conversation_id: self.id,
            message_id: id,
            reply_id,
            timestamp,
        });
        tracing::info!(id = %id, reply_id = %reply_id, "Turn answered");
    }
}

// =============================================================================
// ConversationStore
// =============================================================================

/// Owns one conversation's transcript and drives its turns.
///
/// The transcript always starts with the configured greeting. Consumers read
/// snapshots through [`ConversationStore::transcript`] and change it only
/// through [`ConversationStore::submit`].
pub struct ConversationStore {
    shared: Arc<Shared>,
    scheduler: Arc<dyn ReplyScheduler>,
    reply_delay: Duration,
    max_message_length: Option<usize>,
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("id", &self.shared.id)
            .field("messages", &self.len())
            .field("reply_delay", &self.reply_delay)
            .finish()
    }
}

impl ConversationStore {
    /// Create a store with the default engine and wall-clock timestamps.
    pub fn new(config: &ChatConfig, scheduler: Arc<dyn ReplyScheduler>) -> Self {
        Self::with_parts(config, ResponseEngine::new(), scheduler, Arc::new(SystemClock))
    }

    /// Create a store from explicit collaborators.
    pub fn with_parts(
        config: &ChatConfig,
        engine: ResponseEngine,
        scheduler: Arc<dyn ReplyScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            state: Mutex::new(Inner {
                messages: Vec::new(),
                next_id: 1,
                closed: false,
            }),
            engine,
            clock,
            events,
        });
        {
            let mut inner = shared.state();
            let greeting = config.greeting.clone();
            shared.append(&mut inner, |id, at| Message::assistant(id, greeting, at, None));
        }
        tracing::debug!(conversation_id = %shared.id, "Conversation started");

        Self {
            shared,
            scheduler,
            reply_delay: config.reply_delay(),
            max_message_length: config.max_message_length,
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn reply_delay(&self) -> Duration {
        self.reply_delay
    }

    /// Submit a user turn.
    ///
    /// Empty or whitespace-only text is rejected with no change to the
    /// transcript. Otherwise the trimmed text is appended, the turn moves to
    /// AwaitingReply, and its reply is scheduled after the configured delay.
    pub fn submit(&self, text: &str) -> Result<MessageId, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if let Some(limit) = self.max_message_length {
            if trimmed.chars().count() > limit {
                return Err(ChatError::MessageTooLong(limit));
            }
        }

        let id = {
            let mut inner = self.shared.state();
            if inner.closed {
                return Err(ChatError::Closed);
            }
            let id = self
                .shared
                .append(&mut inner, |id, at| Message::user(id, trimmed, at));
            self.shared
                .transition(&mut inner, id, TurnStatus::AwaitingReply)?;
            id
        };
        tracing::info!(id = %id, chars = trimmed.chars().count(), "User turn submitted");

        // The lock is released: schedulers may run the task inline.
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let original = trimmed.to_string();
        self.scheduler.schedule(
            self.reply_delay,
            Box::new(move || match weak.upgrade() {
                Some(shared) => shared.deliver(id, &original),
                None => tracing::debug!(id = %id, "Conversation dropped, reply discarded"),
            }),
        );
        Ok(id)
    }

    /// Reply the engine would give for `text`, without touching the transcript.
    pub fn generate_reply(&self, text: &str) -> String {
        self.shared.engine.generate_reply(text)
    }

    /// Snapshot of the full transcript in insertion order.
    pub fn transcript(&self) -> Vec<Message> {
        self.shared.state().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.state().messages.len()
    }

    /// Always false after construction: the greeting is the first message.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.shared
            .state()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn status(&self, id: MessageId) -> Option<TurnStatus> {
        self.message(id).and_then(|m| m.status)
    }

    /// User turns still waiting for their reply, oldest first.
    pub fn pending_turns(&self) -> Vec<MessageId> {
        self.shared
            .state()
            .messages
            .iter()
            .filter(|m| m.status.is_some_and(|s| s.is_pending()))
            .map(|m| m.id)
            .collect()
    }

    /// The most recent assistant message (the greeting if nothing else).
    pub fn last_assistant_message(&self) -> Option<Message> {
        self.shared
            .state()
            .messages
            .iter()
            .rev()
            .find(|m| m.author == Author::Assistant)
            .cloned()
    }

    /// Receive an event for every appended message and answered turn.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.shared.events.subscribe()
    }

    /// Transcript as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ChatError> {
        let transcript = self.transcript();
        let json = serde_json::to_string_pretty(&transcript).map_err(SakhiError::from)?;
        Ok(json)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state().closed
    }

    /// Tear the conversation down.
    ///
    /// Pending replies are discarded when they fire and never appended; later
    /// submissions fail with [`ChatError::Closed`]. Returns how many turns were
    /// left unanswered. Closing twice is a no-op.
    ///
    /// The scheduler is left running, since other conversations may share it.
    /// Its owner calls [`ReplyScheduler::shutdown`] when the host exits.
    pub fn close(&self) -> usize {
        let dropped = {
            let mut inner = self.shared.state();
            if inner.closed {
                return 0;
            }
            inner.closed = true;
            let dropped = inner
                .messages
                .iter()
                .filter(|m| m.status.is_some_and(|s| s.is_pending()))
                .count();
            let timestamp = self.shared.stamp(&inner);
            self.shared.emit(ConversationEvent::ConversationClosed {
                conversation_id: self.shared.id,
                dropped_turns: dropped,
                timestamp,
            });
            dropped
        };
        tracing::info!(conversation_id = %self.shared.id, dropped, "Conversation closed");
        dropped
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::FixedPicker;
    use crate::rules::FALLBACK_REPLIES;
    use crate::scheduler::{ImmediateScheduler, ManualClock, ManualScheduler};

    fn manual_store() -> (ConversationStore, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let store = ConversationStore::new(&ChatConfig::default(), scheduler.clone());
        (store, scheduler)
    }

    #[test]
    fn test_starts_with_greeting() {
        let (store, _) = manual_store();
        let transcript = store.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].author, Author::Assistant);
        assert_eq!(transcript[0].id, MessageId(1));
        assert_eq!(transcript[0].content, ChatConfig::default().greeting);
        assert_eq!(transcript[0].status, None);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_custom_greeting() {
        let config = ChatConfig {
            greeting: "Vanakkam!".to_string(),
            ..ChatConfig::default()
        };
        let store = ConversationStore::new(&config, Arc::new(ManualScheduler::new()));
        assert_eq!(store.transcript()[0].content, "Vanakkam!");
    }

    #[test]
    fn test_blank_submissions_rejected() {
        let (store, scheduler) = manual_store();
        assert!(matches!(store.submit(""), Err(ChatError::EmptyMessage)));
        assert!(matches!(store.submit("   "), Err(ChatError::EmptyMessage)));
        assert!(matches!(store.submit("\n\t"), Err(ChatError::EmptyMessage)));
        assert_eq!(store.len(), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_too_long_rejected() {
        let config = ChatConfig {
            max_message_length: Some(5),
            ..ChatConfig::default()
        };
        let store = ConversationStore::new(&config, Arc::new(ManualScheduler::new()));
        assert!(matches!(store.submit("water!"), Err(ChatError::MessageTooLong(5))));
        // Surrounding whitespace does not count.
        assert!(store.submit("  water  ").is_ok());
        // Limit counts characters, not bytes.
        assert!(store.submit("पानी").is_ok());
    }

    #[test]
    fn test_long_message_accepted_by_default() {
        let (store, scheduler) = manual_store();
        let long = "water ".repeat(400);
        let id = store.submit(&long).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.message(id).unwrap().content, long.trim());
        scheduler.run_all();
        assert_eq!(store.status(id), Some(TurnStatus::Answered));
    }

    #[test]
    fn test_submit_then_deliver() {
        let (store, scheduler) = manual_store();
        let id = store.submit("  When should I water my field?  ").unwrap();

        let transcript = store.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "When should I water my field?");
        assert_eq!(store.status(id), Some(TurnStatus::AwaitingReply));
        assert_eq!(scheduler.delays(), vec![Duration::from_millis(1000)]);

        assert!(scheduler.run_next());
        let transcript = store.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[2].author, Author::Assistant);
        assert_eq!(
            transcript[2].content,
            store.generate_reply("When should I water my field?")
        );
        assert_eq!(transcript[2].reply_to, Some(id));
        assert_eq!(store.status(id), Some(TurnStatus::Answered));
        assert!(store.pending_turns().is_empty());
    }

    #[test]
    fn test_immediate_scheduler_answers_inline() {
        let store = ConversationStore::new(&ChatConfig::default(), Arc::new(ImmediateScheduler));
        let id = store.submit("pest").unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.status(id), Some(TurnStatus::Answered));
    }

    #[test]
    fn test_replies_follow_completion_order() {
        let (store, scheduler) = manual_store();
        let water = store.submit("water").unwrap();
        let pest = store.submit("pest").unwrap();
        assert_eq!(store.pending_turns(), vec![water, pest]);

        // Second submission completes first.
        assert!(scheduler.run_last());
        let transcript = store.transcript();
        assert_eq!(transcript[3].reply_to, Some(pest));
        assert_eq!(store.status(water), Some(TurnStatus::AwaitingReply));
        assert_eq!(store.status(pest), Some(TurnStatus::Answered));

        assert!(scheduler.run_next());
        let transcript = store.transcript();
        assert_eq!(transcript.len(), 5);
        assert_eq!(transcript[4].reply_to, Some(water));
        assert!(store.pending_turns().is_empty());
    }

    #[test]
    fn test_fallback_reply_uses_injected_picker() {
        let scheduler = Arc::new(ManualScheduler::new());
        let store = ConversationStore::with_parts(
            &ChatConfig::default(),
            ResponseEngine::with_picker(Arc::new(FixedPicker(3))),
            scheduler.clone(),
            Arc::new(SystemClock),
        );
        store.submit("hello there").unwrap();
        scheduler.run_all();
        assert_eq!(store.transcript()[2].content, FALLBACK_REPLIES[3]);
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let scheduler = Arc::new(ManualScheduler::new());
        let store = ConversationStore::with_parts(
            &ChatConfig::default(),
            ResponseEngine::new(),
            scheduler.clone(),
            clock.clone(),
        );
        clock.advance(chrono::Duration::seconds(10));
        store.submit("water").unwrap();
        // Clock steps backwards before the reply lands.
        clock.set(start);
        scheduler.run_all();

        let transcript = store.transcript();
        for pair in transcript.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
            assert!(pair[0].id < pair[1].id);
        }
        assert_eq!(transcript[2].created_at, start + chrono::Duration::seconds(10));
    }

    #[test]
    fn test_close_discards_pending_and_rejects_new() {
        let (store, scheduler) = manual_store();
        store.submit("water").unwrap();
        store.submit("pest").unwrap();
        assert_eq!(store.close(), 2);
        assert!(store.is_closed());
        assert!(matches!(store.submit("market"), Err(ChatError::Closed)));
        // Replies already queued still fire, but append nothing.
        assert_eq!(scheduler.pending(), 2);
        scheduler.run_all();
        assert_eq!(store.len(), 3);
        assert_eq!(store.close(), 0);
    }

    #[test]
    fn test_close_leaves_shared_scheduler_running() {
        let scheduler = Arc::new(ManualScheduler::new());
        let a = ConversationStore::new(&ChatConfig::default(), scheduler.clone());
        let b = ConversationStore::new(&ChatConfig::default(), scheduler.clone());
        a.submit("water").unwrap();
        let before = b.submit("pest").unwrap();
        a.close();

        let after = b.submit("market").unwrap();
        assert_eq!(scheduler.pending(), 3);
        scheduler.run_all();
        assert_eq!(a.len(), 2);
        assert_eq!(b.status(before), Some(TurnStatus::Answered));
        assert_eq!(b.status(after), Some(TurnStatus::Answered));
        assert_eq!(b.len(), 5);
    }

    #[test]
    fn test_late_delivery_after_close_is_dropped() {
        // A scheduler that ignores shutdown still cannot append after close.
        let held: Arc<Mutex<Vec<crate::scheduler::ReplyTask>>> = Arc::default();
        struct Holding(Arc<Mutex<Vec<crate::scheduler::ReplyTask>>>);
        impl ReplyScheduler for Holding {
            fn schedule(&self, _delay: Duration, task: crate::scheduler::ReplyTask) {
                self.0.lock().unwrap().push(task);
            }
        }
        let store = ConversationStore::new(&ChatConfig::default(), Arc::new(Holding(held.clone())));
        let id = store.submit("water").unwrap();
        store.close();
        for task in held.lock().unwrap().drain(..) {
            task();
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.status(id), Some(TurnStatus::AwaitingReply));
    }

    #[test]
    fn test_reply_after_drop_is_discarded() {
        let (store, scheduler) = manual_store();
        store.submit("water").unwrap();
        drop(store);
        // Must not panic.
        assert!(scheduler.run_next());
    }

    #[test]
    fn test_double_delivery_answers_once() {
        let (store, _) = manual_store();
        let id = store.submit("water").unwrap();
        store.shared.deliver(id, "water");
        store.shared.deliver(id, "water");
        assert_eq!(store.len(), 3);
        assert_eq!(store.status(id), Some(TurnStatus::Answered));
    }

    #[test]
    fn test_transition_guard() {
        let (store, _) = manual_store();
        let id = store.submit("water").unwrap();
        let mut inner = store.shared.state();
        let err = store
            .shared
            .transition(&mut inner, id, TurnStatus::AwaitingReply)
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidTransition { .. }));
        // The greeting is not a user turn.
        let err = store
            .shared
            .transition(&mut inner, MessageId(1), TurnStatus::Answered)
            .unwrap_err();
        assert!(matches!(err, ChatError::UnknownMessage(MessageId(1))));
    }

    #[test]
    fn test_last_assistant_message() {
        let (store, scheduler) = manual_store();
        assert_eq!(store.last_assistant_message().unwrap().id, MessageId(1));
        store.submit("market").unwrap();
        // Pending user turn does not count.
        assert_eq!(store.last_assistant_message().unwrap().id, MessageId(1));
        scheduler.run_all();
        let last = store.last_assistant_message().unwrap();
        assert_eq!(last.id, MessageId(3));
        assert_eq!(last.content, store.generate_reply("market"));
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let (store, scheduler) = manual_store();
        let mut rx = store.subscribe();
        let id = store.submit("water").unwrap();
        scheduler.run_all();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            ConversationEvent::MessageAppended { author: Author::User, message_id, .. } if message_id == id
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            ConversationEvent::MessageAppended { author: Author::Assistant, .. }
        ));
        let third = rx.recv().await.unwrap();
        assert!(matches!(
            third,
            ConversationEvent::TurnAnswered { message_id, reply_id: MessageId(3), .. } if message_id == id
        ));
        assert_eq!(third.conversation_id(), store.id());
    }

    #[test]
    fn test_to_json() {
        let (store, scheduler) = manual_store();
        store.submit("weather").unwrap();
        scheduler.run_all();
        let json: serde_json::Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();
        let arr = json.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[1]["author"], "user");
        assert_eq!(arr[1]["status"], "answered");
        assert_eq!(arr[2]["reply_to"], 2);
    }
}
