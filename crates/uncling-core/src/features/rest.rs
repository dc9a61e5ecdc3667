//! "Before you rest": a two-question evening reflection.

use anyhow::{Result, bail};
use minijinja::context;

use super::attachment::AttachmentStyle;
use super::reply_or_fallback;
use crate::prompts::{self, REST_PROMPT_TEMPLATE};
use crate::providers::persistence::{Persistence, RestNoteRecord, best_effort};
use crate::providers::{TextGenerator, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestQuestion {
    WhatHelped,
    MessageToSelf,
}

impl RestQuestion {
    pub fn title(self) -> &'static str {
        match self {
            RestQuestion::WhatHelped => "What helped you today?",
            RestQuestion::MessageToSelf => "Message to future self",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            RestQuestion::WhatHelped => {
                "What helped you feel even a little better today? Even small things count..."
            }
            RestQuestion::MessageToSelf => {
                "What would you like to tell yourself if you feel this way again tomorrow?"
            }
        }
    }
}

/// State of one evening reflection.
///
/// The first answer to each question is kept for the saved note; later
/// messages only continue the conversation.
#[derive(Debug, Clone)]
pub struct RestReflection {
    style: AttachmentStyle,
    question: RestQuestion,
    turns: Vec<Turn>,
    what_helped: Option<String>,
    message_to_self: Option<String>,
    ai_reflection: Option<String>,
}

impl RestReflection {
    pub fn new(style: AttachmentStyle) -> Self {
        Self {
            style,
            question: RestQuestion::WhatHelped,
            turns: vec![Turn::model(RestQuestion::WhatHelped.prompt())],
            what_helped: None,
            message_to_self: None,
            ai_reflection: None,
        }
    }

    pub fn question(&self) -> RestQuestion {
        self.question
    }

    /// Conversation for the current question.
    pub fn transcript(&self) -> &[Turn] {
        &self.turns
    }

    pub fn has_answered(&self) -> bool {
        match self.question {
            RestQuestion::WhatHelped => self.what_helped.is_some(),
            RestQuestion::MessageToSelf => self.message_to_self.is_some(),
        }
    }

    fn request_turns(&self) -> Result<Vec<Turn>> {
        let system = prompts::render(
            "rest",
            REST_PROMPT_TEMPLATE,
            context! { attachment_style => self.style.as_str() },
        )?;
        Ok(std::iter::once(Turn::user(system))
            .chain(
                self.turns
                    .iter()
                    .filter(|t| !t.text.trim().is_empty())
                    .cloned(),
            )
            .collect())
    }

    /// Adds the user's message and the model's reflection. Returns the reflection.
    ///
    /// # Errors
    /// Returns an error if `message` is blank or the prompt cannot be rendered.
    pub async fn send(&mut self, generator: &impl TextGenerator, message: &str) -> Result<&str> {
        let message = message.trim();
        if message.is_empty() {
            bail!("Message cannot be empty");
        }
        self.turns.push(Turn::user(message));
        let answer = match self.question {
            RestQuestion::WhatHelped => &mut self.what_helped,
            RestQuestion::MessageToSelf => &mut self.message_to_self,
        };
        answer.get_or_insert_with(|| message.to_string());

        let turns = self.request_turns()?;
        let reply = reply_or_fallback(generator, &turns, "rest").await;
        self.ai_reflection = Some(reply.clone());
        self.turns.push(Turn::model(reply));
        Ok(self.turns.last().map_or("", |t| t.text.as_str()))
    }

    /// Moves to the next question. Returns `true` once the reflection is finished.
    ///
    /// # Errors
    /// Returns an error if the current question has not been answered.
    pub fn advance(&mut self) -> Result<bool> {
        if !self.has_answered() {
            bail!("Answer \"{}\" before moving on", self.question.title());
        }
        match self.question {
            RestQuestion::WhatHelped => {
                self.question = RestQuestion::MessageToSelf;
                self.turns = vec![Turn::model(RestQuestion::MessageToSelf.prompt())];
                Ok(false)
            }
            RestQuestion::MessageToSelf => Ok(true),
        }
    }

    /// Two-line note stored with the reflection.
    pub fn note_text(&self) -> String {
        format!(
            "What helped: {}\nMessage to self: {}",
            self.what_helped.as_deref().unwrap_or_default(),
            self.message_to_self.as_deref().unwrap_or_default()
        )
    }

    /// Closing summary shown once both questions are done.
    pub fn summary(&self) -> String {
        format!(
            "Tonight you reflected on what helped you today: \"{}\".\n\
             You also left yourself this loving reminder: \"{}\".\n\
             AI Reflection: {}",
            self.what_helped.as_deref().unwrap_or_default(),
            self.message_to_self.as_deref().unwrap_or_default(),
            self.ai_reflection.as_deref().unwrap_or_default()
        )
    }

    /// Stores the note. Returns whether the write succeeded.
    pub async fn save(&self, db: &impl Persistence, user_id: &str) -> bool {
        let record = RestNoteRecord {
            user_id: user_id.to_string(),
            notes: self.note_text(),
            attachment_style: self.style,
            ai_reflection: self.ai_reflection.clone(),
            created_at: None,
        };
        best_effort("insert_rest_note", db.insert_rest_note(&record))
            .await
            .is_some()
    }
}

/// Splits a stored note back into its two answers.
pub fn split_note(notes: &str) -> (Option<&str>, Option<&str>) {
    let mut lines = notes.lines();
    let helped = lines
        .next()
        .and_then(|l| l.strip_prefix("What helped: "))
        .filter(|s| !s.is_empty());
    let message = lines
        .next()
        .and_then(|l| l.strip_prefix("Message to self: "))
        .filter(|s| !s.is_empty());
    (helped, message)
}
