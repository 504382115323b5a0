//! Reply generation for chat turns.
//!
//! Maps a user utterance to a reply using the ordered keyword table in
//! [`crate::rules`], falling back to a randomly chosen generic answer.
//! No I/O and no state beyond the injected random source.

use std::sync::Arc;

use rand::Rng;

use crate::rules::{self, Topic, FALLBACK_REPLIES};

// =============================================================================
// Fallback selection
// =============================================================================

/// Chooses an index into the fallback pool.
pub trait FallbackPicker: Send + Sync {
    /// Return an index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform pick from the thread-local generator. No seeding contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngPicker;

impl FallbackPicker for ThreadRngPicker {
    fn pick(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Always returns the same index. Used to make fallback replies deterministic.
#[derive(Debug, Clone, Copy)]
pub struct FixedPicker(pub usize);

impl FallbackPicker for FixedPicker {
    fn pick(&self, _len: usize) -> usize {
        self.0
    }
}

// =============================================================================
// ResponseEngine
// =============================================================================

/// Rule-based reply generator.
#[derive(Clone)]
pub struct ResponseEngine {
    picker: Arc<dyn FallbackPicker>,
}

impl Default for ResponseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEngine")
            .field("rules", &rules::RULES.len())
            .field("fallbacks", &FALLBACK_REPLIES.len())
            .finish()
    }
}

impl ResponseEngine {
    /// Create an engine drawing fallbacks from the thread-local generator.
    pub fn new() -> Self {
        Self::with_picker(Arc::new(ThreadRngPicker))
    }

    /// Create an engine with a custom fallback source.
    pub fn with_picker(picker: Arc<dyn FallbackPicker>) -> Self {
        Self { picker }
    }

    /// Topic of the first rule matching `text`, or `None` when the fallback
    /// pool would be used.
    pub fn classify(&self, text: &str) -> Option<Topic> {
        rules::first_match(&text.to_lowercase()).map(|rule| rule.topic)
    }

    /// Produce the reply for `text`.
    ///
    /// Total: empty or whitespace-only input falls through to the fallback
    /// pool. The result is never empty.
    pub fn generate_reply(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        if let Some(rule) = rules::first_match(&lowered) {
            tracing::debug!(topic = %rule.topic, "Reply rule matched");
            return rule.reply.to_string();
        }

        // Out-of-range picks wrap instead of panicking.
        let idx = self.picker.pick(FALLBACK_REPLIES.len()) % FALLBACK_REPLIES.len();
        tracing::debug!(index = idx, "No rule matched, using fallback reply");
        FALLBACK_REPLIES[idx].to_string()
    }
}

/// Reply for `text` using the default engine.
pub fn generate_reply(text: &str) -> String {
    ResponseEngine::new().generate_reply(text)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RULES;

    fn reply_for(topic: Topic) -> &'static str {
        RULES.iter().find(|r| r.topic == topic).unwrap().reply
    }

    #[test]
    fn test_each_rule_reachable() {
        let engine = ResponseEngine::new();
        let cases = [
            ("How is the weather tomorrow?", Topic::Weather),
            ("When should I water my field?", Topic::Irrigation),
            ("drip irrigation setup", Topic::Irrigation),
            ("Which fertilizer for paddy?", Topic::Fertilizer),
            ("nutrient deficiency", Topic::Fertilizer),
            ("There are insects on the leaves", Topic::PestControl),
            ("pest attack", Topic::PestControl),
            ("tomato price today", Topic::Market),
            ("market trend", Topic::Market),
            ("check my crop health", Topic::CropHealth),
        ];
        for (input, topic) in cases {
            assert_eq!(engine.classify(input), Some(topic), "input: {input}");
            assert_eq!(engine.generate_reply(input), reply_for(topic), "input: {input}");
        }
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let engine = ResponseEngine::new();
        assert_eq!(engine.classify("WEATHER report"), Some(Topic::Weather));
        assert_eq!(engine.classify("Crop HEALTH"), Some(Topic::CropHealth));
    }

    #[test]
    fn test_earliest_rule_wins() {
        let engine = ResponseEngine::new();
        // Matches irrigation (rule 2) and pest (rule 4); rule 2 comes first.
        let input = "what about crop pests and irrigation water";
        assert_eq!(engine.classify(input), Some(Topic::Irrigation));
        assert_eq!(engine.generate_reply(input), reply_for(Topic::Irrigation));

        // Weather outranks everything.
        let input = "weather, water, pest and market price";
        assert_eq!(engine.generate_reply(input), reply_for(Topic::Weather));

        // Pest outranks market.
        assert_eq!(engine.classify("pest spray price"), Some(Topic::PestControl));
    }

    #[test]
    fn test_crop_health_needs_both_keywords() {
        let engine = ResponseEngine::with_picker(Arc::new(FixedPicker(0)));
        assert_eq!(engine.classify("crop"), None);
        assert_eq!(engine.classify("health"), None);
        assert_ne!(engine.generate_reply("crop"), reply_for(Topic::CropHealth));
        assert_eq!(engine.generate_reply("crop health"), reply_for(Topic::CropHealth));
    }

    #[test]
    fn test_crop_health_loses_to_earlier_rules() {
        let engine = ResponseEngine::new();
        assert_eq!(engine.classify("crop health and pest"), Some(Topic::PestControl));
    }

    #[test]
    fn test_rule_replies_are_deterministic() {
        let engine = ResponseEngine::new();
        let first = engine.generate_reply("market price");
        for _ in 0..20 {
            assert_eq!(engine.generate_reply("market price"), first);
        }
    }

    #[test]
    fn test_fallback_is_member_of_pool() {
        let engine = ResponseEngine::new();
        for _ in 0..200 {
            let reply = engine.generate_reply("hello there");
            assert!(FALLBACK_REPLIES.contains(&reply.as_str()), "unexpected: {reply}");
        }
    }

    #[test]
    fn test_fixed_picker_selects_entry() {
        for i in 0..FALLBACK_REPLIES.len() {
            let engine = ResponseEngine::with_picker(Arc::new(FixedPicker(i)));
            assert_eq!(engine.generate_reply("hello there"), FALLBACK_REPLIES[i]);
        }
    }

    #[test]
    fn test_out_of_range_pick_wraps() {
        let engine = ResponseEngine::with_picker(Arc::new(FixedPicker(FALLBACK_REPLIES.len() + 1)));
        assert_eq!(engine.generate_reply("hello"), FALLBACK_REPLIES[1]);
    }

    #[test]
    fn test_total_on_blank_input() {
        let engine = ResponseEngine::new();
        for input in ["", "   ", "\n\t"] {
            let reply = engine.generate_reply(input);
            assert!(!reply.is_empty());
            assert!(FALLBACK_REPLIES.contains(&reply.as_str()));
        }
    }

    #[test]
    fn test_non_ascii_input() {
        let engine = ResponseEngine::new();
        assert_eq!(engine.classify("നെല്ല് water"), Some(Topic::Irrigation));
        assert!(!engine.generate_reply("नमस्ते").is_empty());
    }

    #[test]
    fn test_free_function_matches_engine() {
        assert_eq!(
            generate_reply("When should I water my field?"),
            reply_for(Topic::Irrigation)
        );
    }

    #[test]
    fn test_thread_rng_picker_in_range() {
        for _ in 0..100 {
            assert!(ThreadRngPicker.pick(6) < 6);
        }
        assert_eq!(ThreadRngPicker.pick(1), 0);
    }
}
