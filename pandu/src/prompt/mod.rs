//! System prompt assembly with a TTL cache, plus the pattern checks the
//! query gates run (greetings, casual chatter, identity, injection).

mod checks;
mod templates;

pub use checks::{casual_response, detect_prompt_injection, greeting_response, identity_response};
pub use templates::{CREATOR_PERSONA, DEEP_THINK_INSTRUCTION, MASTER_TEMPLATE, TEAM_PERSONA};

use std::time::Duration;

use tracing::{debug, info};

use crate::cache::{Cache, InMemoryCache};
use crate::lang::{self, Lang};
use crate::memory::UserContext;

/// Email domain that activates the internal-team persona.
pub const TEAM_EMAIL_DOMAIN: &str = "@nusaatlas.com";

/// Identity markers of the engineer who gets the architect persona.
const CREATOR_MARKERS: &[&str] = &["raka", "wiratama"];

/// Builds personalized system prompts. Built prompts are cached; the key
/// captures everything that changes the output, so a hit returns the
/// cached string verbatim.
pub struct SystemPromptBuilder {
    cache: InMemoryCache<String, String>,
    cache_ttl: Duration,
}

impl SystemPromptBuilder {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache: InMemoryCache::new(),
            cache_ttl,
        }
    }

    fn is_creator(email: &str) -> bool {
        let lower = email.to_lowercase();
        CREATOR_MARKERS.iter().any(|m| lower.contains(m))
    }

    fn is_team(email: &str, context: &UserContext) -> bool {
        if email.to_lowercase().contains(TEAM_EMAIL_DOMAIN) {
            return true;
        }
        context
            .profile
            .as_ref()
            .and_then(|p| p.role.as_deref())
            .is_some_and(|r| r.to_lowercase().contains("admin"))
    }

    /// Cache key over every input that shapes the prompt.
    fn cache_key(
        user_id: &str,
        context: &UserContext,
        deep_think: bool,
        is_creator: bool,
        is_team: bool,
        additional_context: &str,
        lang: Lang,
    ) -> String {
        format!(
            "{user_id}:{deep_think}:{}:{}:{}:{is_creator}:{is_team}:{}:{}",
            context.facts.len(),
            context.collective_facts.len(),
            context.timeline_summary.len(),
            additional_context.len(),
            lang.tag(),
        )
    }

    /// Assembles the `<user_memory>` block.
    fn user_memory_block(context: &UserContext) -> String {
        let mut parts = Vec::new();

        if let Some(profile) = &context.profile {
            parts.push(format!(
                "User Name: {}\nRole: {}\nDepartment: {}\nNotes: {}",
                profile.name.as_deref().unwrap_or("Partner"),
                profile.role.as_deref().unwrap_or("Client"),
                profile.department.as_deref().unwrap_or("General"),
                profile.notes.as_deref().unwrap_or(""),
            ));
        }

        if !context.facts.is_empty() {
            let facts = context
                .facts
                .iter()
                .map(|f| format!("- {f}"))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("FACTS:\n{facts}"));
        }

        if !context.timeline_summary.is_empty() {
            parts.push(format!("RECENT HISTORY:\n{}", context.timeline_summary));
        }

        if !context.collective_facts.is_empty() {
            let facts = context
                .collective_facts
                .iter()
                .map(|f| format!("- {f}"))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("COLLECTIVE KNOWLEDGE:\n{facts}"));
        }

        if !context.kg_entities.is_empty() {
            let entities = context
                .kg_entities
                .iter()
                .map(|e| format!("- {} ({})", e.name, e.entity_type))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("RELATED ENTITIES:\n{entities}"));
        }

        if parts.is_empty() {
            "No specific memory yet.".to_string()
        } else {
            parts.join("\n\n")
        }
    }

    /// Builds (or returns the cached) system prompt for this query.
    pub async fn build_system_prompt(
        &self,
        user_id: &str,
        context: &UserContext,
        query: &str,
        deep_think_mode: bool,
        additional_context: &str,
    ) -> String {
        let email = context
            .profile
            .as_ref()
            .and_then(|p| p.email.as_deref())
            .unwrap_or(user_id);
        let is_creator = Self::is_creator(email);
        let is_team = !is_creator && Self::is_team(email, context);
        let detected = lang::detect(query);

        let key = Self::cache_key(
            user_id,
            context,
            deep_think_mode,
            is_creator,
            is_team,
            additional_context,
            detected,
        );
        if let Some(cached) = self.cache.get(&key).await {
            debug!(user_id, "system prompt cache hit");
            return cached;
        }

        let body = MASTER_TEMPLATE
            .replace("{user_memory}", &Self::user_memory_block(context))
            .replace(
                "{query}",
                if query.is_empty() { "General inquiry" } else { query },
            );

        let mut prompt = String::new();
        if is_creator {
            info!(user_id, "creator persona activated");
            prompt.push_str(CREATOR_PERSONA);
            prompt.push_str("\n\n");
        } else if is_team {
            info!(user_id, "team persona activated");
            prompt.push_str(TEAM_PERSONA);
            prompt.push_str("\n\n");
        }

        // Non-Indonesian queries get an explicit language banner; the model
        // otherwise drifts toward the informal local register.
        if !matches!(detected, Lang::Indonesian | Lang::Unknown) {
            prompt.push_str(&format!(
                "================================================================================\n\
                 YOU ARE RESPONDING TO A {} SPEAKER.\n\
                 YOUR ENTIRE RESPONSE MUST BE IN {}.\n\
                 DO NOT USE INDONESIAN WORDS OR SLANG.\n\
                 ================================================================================\n\n",
                detected.display_name(),
                detected.display_name(),
            ));
        }

        prompt.push_str(&body);

        if deep_think_mode {
            prompt.push_str(DEEP_THINK_INSTRUCTION);
        }
        if !additional_context.is_empty() {
            prompt.push('\n');
            prompt.push_str(additional_context);
        }

        let _ = self
            .cache
            .set(key, prompt.clone(), Some(self.cache_ttl))
            .await;
        prompt
    }
}
