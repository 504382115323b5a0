//! Static keyword rules for the farming assistant.
//!
//! Rules are scanned top to bottom against the lower-cased input and the
//! first match wins. Keywords match as plain substrings, so "watering"
//! triggers the irrigation rule and "pesticide" the pest rule.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Advisory topic a rule answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Weather,
    Irrigation,
    Fertilizer,
    PestControl,
    Market,
    CropHealth,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Weather => write!(f, "weather"),
            Topic::Irrigation => write!(f, "irrigation"),
            Topic::Fertilizer => write!(f, "fertilizer"),
            Topic::PestControl => write!(f, "pest_control"),
            Topic::Market => write!(f, "market"),
            Topic::CropHealth => write!(f, "crop_health"),
        }
    }
}

/// Keyword predicate over already lower-cased text.
#[derive(Clone, Copy, Debug)]
pub enum Trigger {
    /// At least one keyword is present.
    AnyOf(&'static [&'static str]),
    /// Every keyword is present.
    AllOf(&'static [&'static str]),
}

impl Trigger {
    pub fn matches(&self, lowered: &str) -> bool {
        match self {
            Trigger::AnyOf(words) => words.iter().any(|w| lowered.contains(w)),
            Trigger::AllOf(words) => words.iter().all(|w| lowered.contains(w)),
        }
    }
}

/// One entry of the ordered rule table.
#[derive(Clone, Copy, Debug)]
pub struct Rule {
    pub topic: Topic,
    pub trigger: Trigger,
    pub reply: &'static str,
}

impl Rule {
    pub fn matches(&self, lowered: &str) -> bool {
        self.trigger.matches(lowered)
    }
}

/// Ordered rule table. Position is precedence.
///
/// The crop-health rule needs both keywords while every other rule needs
/// any one of its keywords.
pub static RULES: &[Rule] = &[
    Rule {
        topic: Topic::Weather,
        trigger: Trigger::AnyOf(&["weather"]),
        reply: "Based on current weather data, I recommend avoiding outdoor activities during expected rainfall. Consider indoor farm maintenance tasks.",
    },
    Rule {
        topic: Topic::Irrigation,
        trigger: Trigger::AnyOf(&["irrigation", "water"]),
        reply: "For your crops, I suggest early morning irrigation around 6-7 AM when evaporation is minimal. Check soil moisture levels first.",
    },
    Rule {
        topic: Topic::Fertilizer,
        trigger: Trigger::AnyOf(&["fertilizer", "nutrient"]),
        reply: "NPK 10:26:26 is suitable for your rice crop at this stage. Apply 50kg per hectare and ensure proper soil moisture.",
    },
    Rule {
        topic: Topic::PestControl,
        trigger: Trigger::AnyOf(&["pest", "insect"]),
        reply: "I detected possible pest activity. Consider organic neem oil spray in the evening hours for effective control.",
    },
    Rule {
        topic: Topic::Market,
        trigger: Trigger::AnyOf(&["market", "price"]),
        reply: "Current market prices show tomatoes trending upward. Consider harvesting your ready crop for better profits.",
    },
    Rule {
        topic: Topic::CropHealth,
        trigger: Trigger::AllOf(&["crop", "health"]),
        reply: "Upload a crop image and I can analyze the health status. Meanwhile, ensure proper nutrition and pest monitoring.",
    },
];

/// Generic advice used when no rule matches.
pub static FALLBACK_REPLIES: &[&str] = &[
    "I understand your concern. Let me help you with personalized advice based on your farm data and current conditions.",
    "Based on your query, I recommend checking soil moisture levels and considering organic fertilizers for better crop yield.",
    "Weather conditions look favorable for planting. Make sure to maintain proper irrigation schedules.",
    "For pest control, try neem-based solutions first before using chemical pesticides.",
    "Consider crop rotation to maintain soil health. Legumes can help fix nitrogen naturally.",
    "Monitor your crops daily and maintain proper spacing for optimal growth.",
];

/// First rule matching `lowered`, if any.
pub fn first_match(lowered: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.matches(lowered))
}
