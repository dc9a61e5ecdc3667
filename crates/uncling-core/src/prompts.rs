//! Prompt templates for the guided conversations.

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// Check-in reply prompt (`MiniJinja`; `mood`, `intensity`, `intensity_label`, `attachment_style`).
pub const CHECK_IN_PROMPT_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/check_in.md"));

/// Instruction prefixed to the first model turn of a rescue chat.
pub const RESCUE_PROMPT_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/rescue.md"));

/// Secure self-chat prompt (`MiniJinja`; `message`).
pub const SELF_CHAT_PROMPT_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/self_chat.md"));

/// Evening reflection system turn (`MiniJinja`; `attachment_style`).
pub const REST_PROMPT_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/rest.md"));

/// Progress insight prompt (`MiniJinja`; `notes`).
pub const PROGRESS_PROMPT_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/progress.md"));

/// Renders `template` with `vars`. Unknown variables are an error.
///
/// # Errors
/// Returns an error if the template is invalid or references a missing variable.
pub fn render(name: &str, template: &str, vars: impl Serialize) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template(name, template)
        .with_context(|| format!("Invalid prompt template {name}"))?;

    let output = env
        .get_template(name)
        .with_context(|| format!("Missing prompt template {name}"))?
        .render(vars)
        .with_context(|| format!("Failed to render prompt template {name}"))?;

    Ok(output.replace("\r\n", "\n").trim().to_string())
}
