//! Fact extraction from conversation turns.
//!
//! The production extractor is an external service; the engine only needs
//! the callable shape. The heuristic default catches the obvious
//! self-disclosures so single-node deployments still build memory.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One candidate fact produced by an extractor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawFact {
    pub content: String,
    pub fact_type: String,
    pub confidence: f32,
    pub source: String,
}

/// Extracts candidate facts from one conversation turn.
pub trait FactExtractor: Send + Sync {
    fn extract(&self, user_message: &str, ai_response: &str) -> Vec<RawFact>;
}

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:my name is|i am called|mi chiamo|je m'appelle|nama saya)\s+(?P<name>[A-Za-zÀ-ÿ]{2,30})").expect("name regex")
});

static NATIONALITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bi(?:'m| am)\s+(?:from\s+(?P<country>[A-Za-z ]{3,30})|(?P<adj>italian|ukrainian|russian|american|german|french|australian|british|indonesian))").expect("nationality regex")
});

static BUDGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbudget\s+(?:is|of|di)?\s*(?P<amount>(?:\$|usd|idr|rp|€)?\s*[\d.,]+\s*(?:k|m|million|billion|juta|miliar)?(?:\s*(?:usd|idr|eur))?)")
        .expect("budget regex")
});

static GOAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bi want to\s+(?P<goal>(?:open|start|set up|setup|launch|buy|extend|apply for)\s+[^.?!\n]{3,80})").expect("goal regex")
});

/// Pattern-based extractor over the user's message.
pub struct HeuristicFactExtractor;

impl FactExtractor for HeuristicFactExtractor {
    fn extract(&self, user_message: &str, _ai_response: &str) -> Vec<RawFact> {
        let mut facts = Vec::new();
        let fact = |content: String, fact_type: &str, confidence: f32| RawFact {
            content,
            fact_type: fact_type.to_string(),
            confidence,
            source: "user".to_string(),
        };

        if let Some(caps) = NAME_RE.captures(user_message) {
            facts.push(fact(format!("Name: {}", &caps["name"]), "identity", 0.9));
        }
        if let Some(caps) = NATIONALITY_RE.captures(user_message) {
            let value = caps
                .name("country")
                .or_else(|| caps.name("adj"))
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            if !value.is_empty() {
                facts.push(fact(format!("Nationality/origin: {value}"), "identity", 0.8));
            }
        }
        if let Some(caps) = BUDGET_RE.captures(user_message) {
            facts.push(fact(
                format!("Budget: {}", caps["amount"].trim()),
                "preference",
                0.8,
            ));
        }
        if let Some(caps) = GOAL_RE.captures(user_message) {
            facts.push(fact(format!("Goal: {}", caps["goal"].trim()), "goal", 0.8));
        }
        facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_budget_and_goal() {
        let facts = HeuristicFactExtractor.extract(
            "My name is Marco, I am from Italy. I want to open a restaurant in Canggu. My budget is $50k USD.",
            "Great, let's plan it.",
        );
        let contents: Vec<_> = facts.iter().map(|f| f.content.as_str()).collect();
        assert!(contents.iter().any(|c| c.contains("Marco")));
        assert!(contents.iter().any(|c| c.contains("Italy")));
        assert!(contents.iter().any(|c| c.starts_with("Budget:")));
        assert!(contents.iter().any(|c| c.contains("open a restaurant")));
    }

    #[test]
    fn small_talk_produces_no_facts() {
        let facts = HeuristicFactExtractor.extract("thanks, that helps!", "You're welcome.");
        assert!(facts.is_empty());
    }
}
