//! Prompt construction for chat replies.
//!
//! The pipeline treats prompts as opaque; it only hands the event and the
//! current settings to a [`PromptBuilder`].

use crate::chat::event::ChatEvent;
use crate::config::RuntimeSettings;
use crate::defaults;

/// Prompt sent to a text provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Personality and style rules.
    pub system: String,
    /// The chat message framed for a reply.
    pub user: String,
}

impl Prompt {
    /// System and user text joined, for providers without a system role.
    pub fn combined(&self) -> String {
        if self.system.is_empty() {
            self.user.clone()
        } else {
            format!("{}\n\n{}", self.user, self.system)
        }
    }
}

/// What the pipeline knows about the chatter beyond the event itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatterContext {
    /// The channel owner wrote the message.
    pub streamer: bool,
    /// No earlier message from this user was answered this session.
    pub first_time: bool,
}

pub trait PromptBuilder: Send + Sync {
    fn build(
        &self,
        event: &ChatEvent,
        chatter: ChatterContext,
        settings: &RuntimeSettings,
    ) -> Prompt;
}

/// Display name as it should be read aloud: underscores become spaces.
pub fn spoken_name(display_name: &str) -> String {
    display_name.replace('_', " ").trim().to_string()
}

/// Frames a chat message for a named companion with a configurable personality.
#[derive(Debug, Clone)]
pub struct PersonaPrompt {
    name: String,
}

impl PersonaPrompt {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for PersonaPrompt {
    fn default() -> Self {
        Self::new(defaults::COMPANION_NAME)
    }
}

impl PromptBuilder for PersonaPrompt {
    fn build(
        &self,
        event: &ChatEvent,
        chatter: ChatterContext,
        settings: &RuntimeSettings,
    ) -> Prompt {
        let boss = if chatter.streamer { " (BOSS)" } else { "" };
        let mut user = format!(
            "Chat message from {}{boss}: \"{}\". Respond as {} (energetic, short, max {} words).",
            spoken_name(&event.display_name),
            event.message,
            self.name,
            settings.max_words
        );
        if chatter.first_time {
            user.push_str(" This is their first message here: greet them creatively.");
        }
        Prompt {
            system: format!("Personality: {}", settings.personality),
            user,
        }
    }
}

/// Trim whitespace and wrapping quotes from a model reply.
///
/// A reply that was nothing but quotes becomes the fallback greeting.
pub fn clean_reply(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim();
    if unquoted.is_empty() {
        defaults::FALLBACK_REPLY.to_string()
    } else {
        unquoted.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn persona_prompt_mentions_user_message_and_name() {
        let settings = RuntimeSettings::from_config(&Config::default());
        let event = ChatEvent::new("viewer", "gg").with_display_name("Viewer");
        let prompt = PersonaPrompt::default().build(&event, ChatterContext::default(), &settings);

        assert!(prompt.user.contains("Viewer"));
        assert!(prompt.user.contains("\"gg\""));
        assert!(prompt.user.contains("Respond as Aura"));
        assert!(prompt.user.contains("max 10 words"));
        assert!(prompt.system.contains(&settings.personality));
    }

    #[test]
    fn personality_is_read_from_settings() {
        let mut settings = RuntimeSettings::from_config(&Config::default());
        settings.personality = "You are a grumpy pirate.".to_string();
        let prompt = PersonaPrompt::new("Aura").build(
            &ChatEvent::new("a", "b"),
            ChatterContext::default(),
            &settings,
        );
        assert!(prompt.combined().contains("grumpy pirate"));
    }

    #[test]
    fn streamer_is_tagged_and_newcomers_greeted() {
        let settings = RuntimeSettings::from_config(&Config::default());
        let event = ChatEvent::new("kevzo", "we live").with_display_name("Kevzo");
        let prompt = PersonaPrompt::default().build(
            &event,
            ChatterContext {
                streamer: true,
                first_time: false,
            },
            &settings,
        );
        assert!(prompt.user.contains("from Kevzo (BOSS):"));
        assert!(!prompt.user.contains("greet"));

        let prompt = PersonaPrompt::default().build(
            &event,
            ChatterContext {
                streamer: false,
                first_time: true,
            },
            &settings,
        );
        assert!(!prompt.user.contains("BOSS"));
        assert!(prompt.user.contains("greet them"));
    }

    #[test]
    fn underscores_are_spoken_as_spaces() {
        assert_eq!(spoken_name("cool_cat_99"), "cool cat 99");
        assert_eq!(spoken_name("_lurker_"), "lurker");

        let settings = RuntimeSettings::from_config(&Config::default());
        let event = ChatEvent::new("cool_cat", "hi").with_display_name("Cool_Cat");
        let prompt = PersonaPrompt::default().build(&event, ChatterContext::default(), &settings);
        assert!(prompt.user.contains("from Cool Cat:"));
    }

    #[test]
    fn clean_reply_strips_quotes() {
        assert_eq!(clean_reply("  \"Let's gooo!\"  "), "Let's gooo!");
        assert_eq!(clean_reply("no quotes"), "no quotes");
    }

    #[test]
    fn clean_reply_falls_back_when_empty() {
        assert_eq!(clean_reply("\"\""), "Yo!");
    }
}
