//! "Rescue me": a grounding conversation for when the user is triggered.

use anyhow::{Result, bail};
use minijinja::context;

use super::reply_or_fallback;
use crate::prompts::{self, RESCUE_PROMPT_TEMPLATE};
use crate::providers::persistence::{Persistence, RescueSessionRecord, best_effort};
use crate::providers::{TextGenerator, Turn, TurnRole};

pub const OPENING_LINE: &str =
    "Take a deep breath. You're safe here. Let's acknowledge what you're feeling.";

pub const QUICK_ACTIONS: [&str; 4] = [
    "Place your hand on your chest and feel your breath for 30 seconds.",
    "Step outside or look at something green for a moment.",
    "Drink a glass of water slowly, notice each sip.",
    "Name 3 things you can see, 2 you can touch, 1 you can hear.",
];

/// An in-progress rescue conversation. Starts with the opening line.
#[derive(Debug, Clone)]
pub struct RescueChat {
    turns: Vec<Turn>,
}

impl Default for RescueChat {
    fn default() -> Self {
        Self::new()
    }
}

impl RescueChat {
    pub fn new() -> Self {
        Self {
            turns: vec![Turn::model(OPENING_LINE)],
        }
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.turns
    }

    /// Quick actions are offered until the user first speaks.
    pub fn shows_quick_actions(&self) -> bool {
        !self.turns.iter().any(|t| t.role == TurnRole::User)
    }

    /// Turns sent to the model: blanks dropped, instruction folded into an
    /// opening model turn.
    pub fn request_turns(&self) -> Vec<Turn> {
        let instruction = match prompts::render("rescue", RESCUE_PROMPT_TEMPLATE, context! {}) {
            Ok(instruction) => Some(instruction),
            Err(e) => {
                tracing::error!(error = %e, "Rescue instruction failed to render");
                None
            }
        };

        self.turns
            .iter()
            .filter(|t| !t.text.trim().is_empty())
            .enumerate()
            .map(|(i, turn)| match &instruction {
                Some(instruction) if i == 0 && turn.role == TurnRole::Model => {
                    Turn::model(format!("{instruction}\n\n{}", turn.text))
                }
                _ => turn.clone(),
            })
            .collect()
    }

    /// Adds the user's message and the model's answer. Returns the answer.
    ///
    /// # Errors
    /// Returns an error if `message` is blank.
    pub async fn send(&mut self, generator: &impl TextGenerator, message: &str) -> Result<&str> {
        let message = message.trim();
        if message.is_empty() {
            bail!("Message cannot be empty");
        }
        self.turns.push(Turn::user(message));

        let reply = reply_or_fallback(generator, &self.request_turns(), "rescue").await;
        self.turns.push(Turn::model(reply));
        Ok(self.turns.last().map_or("", |t| t.text.as_str()))
    }

    /// Stores the transcript. Returns whether the write succeeded.
    pub async fn save(
        &self,
        db: &impl Persistence,
        user_id: &str,
        feeling: Option<&str>,
        trigger: Option<&str>,
    ) -> bool {
        let record = RescueSessionRecord {
            user_id: user_id.to_string(),
            conversation: self.turns.clone(),
            feeling: feeling.map(str::to_string),
            trigger: trigger.map(str::to_string),
            created_at: None,
        };
        best_effort("insert_rescue_session", db.insert_rescue_session(&record))
            .await
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::GENERATION_FAILED;
    use crate::testing::{FakeGenerator, FakePersistence};

    #[test]
    fn test_new_chat_opens_with_grounding_line() {
        let chat = RescueChat::new();
        assert_eq!(chat.transcript(), &[Turn::model(OPENING_LINE)]);
        assert!(chat.shows_quick_actions());
    }

    #[test]
    fn test_request_prefixes_instruction_to_opening_turn() {
        let chat = RescueChat::new();
        let turns = chat.request_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, TurnRole::Model);
        assert!(turns[0].text.ends_with(&format!("\n\n{OPENING_LINE}")));
        assert!(turns[0].text.len() > OPENING_LINE.len() + 2);
    }

    #[tokio::test]
    async fn test_send_appends_both_turns() {
        let generator = FakeGenerator::replying(&["What are you noticing in your body?"]);
        let mut chat = RescueChat::new();

        let reply = chat.send(&generator, "  everything is too loud ").await.unwrap();
        assert_eq!(reply, "What are you noticing in your body?");

        assert_eq!(chat.transcript().len(), 3);
        assert_eq!(chat.transcript()[1], Turn::user("everything is too loud"));
        assert!(!chat.shows_quick_actions());

        let sent = &generator.calls()[0];
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.contains(OPENING_LINE));
        assert_eq!(sent[1].text, "everything is too loud");
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected() {
        let generator = FakeGenerator::unavailable();
        let mut chat = RescueChat::new();
        assert!(chat.send(&generator, "   ").await.is_err());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_generation_keeps_conversation_going() {
        let generator = FakeGenerator::unavailable();
        let mut chat = RescueChat::new();
        let reply = chat.send(&generator, "help").await.unwrap();
        assert_eq!(reply, GENERATION_FAILED);
    }

    #[tokio::test]
    async fn test_save_stores_transcript() {
        let generator = FakeGenerator::replying(&["I'm here."]);
        let db = FakePersistence::default();
        let mut chat = RescueChat::new();
        chat.send(&generator, "panicking").await.unwrap();

        assert!(chat.save(&db, "u1", Some("panic"), None).await);
        let rows = db.rescue_sessions.lock().unwrap();
        assert_eq!(rows[0].conversation.len(), 3);
        assert_eq!(rows[0].feeling.as_deref(), Some("panic"));
    }
}
