//! Guided wellness flows built on the session, persistence, and text generation.

use crate::providers::{ProviderErrorKind, TextGenerator, Turn};

pub mod attachment;
pub mod check_in;
pub mod onboarding;
pub mod progress;
pub mod rescue;
pub mod rest;
pub mod self_chat;

pub use attachment::AttachmentStyle;

/// Shown when the model call fails.
pub const GENERATION_FAILED: &str = "Sorry, something went wrong while talking to Gemini.";
/// Shown when the model answers with nothing usable.
pub const GENERATION_UNREADABLE: &str = "Sorry, I couldn't understand that.";

/// Generates a conversational reply, substituting a friendly line on failure.
pub(crate) async fn reply_or_fallback(
    generator: &impl TextGenerator,
    turns: &[Turn],
    feature: &'static str,
) -> String {
    match generator.generate(turns).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(feature, kind = %e.kind, error = %e, "Model reply unavailable");
            if e.kind == ProviderErrorKind::Parse {
                GENERATION_UNREADABLE.to_string()
            } else {
                GENERATION_FAILED.to_string()
            }
        }
    }
}
