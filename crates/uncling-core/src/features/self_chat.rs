//! Secure self-chat: one-shot supportive replies with a saved history.

use anyhow::{Result, bail};
use minijinja::context;

use super::{GENERATION_FAILED, reply_or_fallback};
use crate::prompts::{self, SELF_CHAT_PROMPT_TEMPLATE};
use crate::providers::persistence::{ChatTurnRecord, Persistence, best_effort};
use crate::providers::{TextGenerator, Turn};

/// `feature` column value for this chat.
pub const FEATURE: &str = "SecureSelfChat";

pub const GREETING: &str = "I'm here to listen and support you. What's on your mind today?";

/// Greeting followed by every saved exchange, oldest first.
pub async fn load_history(db: &impl Persistence, user_id: &str) -> Vec<Turn> {
    let rows = best_effort("chat_history", db.chat_history(user_id, FEATURE))
        .await
        .unwrap_or_default();

    std::iter::once(Turn::model(GREETING))
        .chain(
            rows.into_iter()
                .flat_map(|row| [Turn::user(row.user_message), Turn::model(row.ai_response)]),
        )
        .collect()
}

/// Model reply for a single message. Never fails.
pub async fn reply(generator: &impl TextGenerator, message: &str) -> String {
    match prompts::render("self_chat", SELF_CHAT_PROMPT_TEMPLATE, context! { message }) {
        Ok(prompt) => reply_or_fallback(generator, &[Turn::user(prompt)], "self_chat").await,
        Err(e) => {
            tracing::error!(error = %e, "Self-chat prompt failed to render");
            GENERATION_FAILED.to_string()
        }
    }
}

/// Replies to `message` and saves the exchange best-effort.
///
/// # Errors
/// Returns an error if `message` is blank.
pub async fn exchange(
    generator: &impl TextGenerator,
    db: &impl Persistence,
    user_id: &str,
    message: &str,
) -> Result<ChatTurnRecord> {
    let message = message.trim();
    if message.is_empty() {
        bail!("Message cannot be empty");
    }

    let record = ChatTurnRecord {
        user_id: user_id.to_string(),
        feature: FEATURE.to_string(),
        user_message: message.to_string(),
        ai_response: reply(generator, message).await,
        created_at: None,
    };
    best_effort("insert_chat_turn", db.insert_chat_turn(&record)).await;
    Ok(record)
}
