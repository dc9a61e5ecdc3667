//! Attachment-style questionnaire.

use anyhow::{Result, bail};

use super::attachment::AttachmentStyle;

/// One multiple-choice question. `answers[i]` votes for `AttachmentStyle::all()[i]`.
#[derive(Debug, Clone, Copy)]
pub struct Question {
    pub prompt: &'static str,
    pub answers: [&'static str; 4],
}

impl Question {
    /// Style voted for by answer `choice` (zero-based).
    pub fn style_for(&self, choice: usize) -> Option<AttachmentStyle> {
        AttachmentStyle::all().get(choice).copied()
    }
}

pub static QUESTIONS: [Question; 12] = [
    Question {
        prompt: "When someone important to you seems distant, you typically:",
        answers: [
            "Worry they're losing interest and try harder to connect",
            "Give them space and focus on other things",
            "Feel confused and unsure how to respond",
            "Check in with them directly and communicate openly",
        ],
    },
    Question {
        prompt: "In relationships, you tend to:",
        answers: [
            "Need frequent reassurance that you're valued",
            "Prefer maintaining your independence",
            "Want closeness but fear getting hurt",
            "Feel comfortable with intimacy and autonomy",
        ],
    },
    Question {
        prompt: "When feeling overwhelmed, you usually:",
        answers: [
            "Seek comfort from others immediately",
            "Handle it on your own",
            "Feel torn between reaching out and withdrawing",
            "Take time to process, then reach out if needed",
        ],
    },
    Question {
        prompt: "During conflicts with loved ones, you typically:",
        answers: [
            "Get emotional and need immediate resolution",
            "Withdraw and need time to cool down",
            "Feel overwhelmed and struggle to communicate clearly",
            "Stay calm and work through it together",
        ],
    },
    Question {
        prompt: "When it comes to sharing your feelings, you:",
        answers: [
            "Share openly, sometimes more than others are comfortable with",
            "Keep most feelings to yourself",
            "Want to share but often feel misunderstood",
            "Share appropriately when it feels right",
        ],
    },
    Question {
        prompt: "Your self-worth often depends on:",
        answers: [
            "How others see you and treat you",
            "Your achievements and independence",
            "External validation, but you doubt it when you get it",
            "Your own values and self-knowledge",
        ],
    },
    Question {
        prompt: "When someone you care about cancels plans last minute, you:",
        answers: [
            "Feel rejected and wonder if they're avoiding you",
            "Feel relieved to have the time to yourself",
            "Feel disappointed but also somewhat relieved",
            "Feel disappointed but understand things come up",
        ],
    },
    Question {
        prompt: "In your childhood, your caregivers were typically:",
        answers: [
            "Inconsistent - sometimes loving, sometimes unavailable",
            "Emotionally distant or focused on achievements",
            "Unpredictable or sometimes the source of your stress",
            "Generally responsive and emotionally available",
        ],
    },
    Question {
        prompt: "When you're stressed, you believe:",
        answers: [
            "Others should notice and help without you asking",
            "You should handle it yourself without burdening others",
            "You need help but aren't sure how to ask for it",
            "It's okay to ask for support when you need it",
        ],
    },
    Question {
        prompt: "Your approach to trust in relationships is:",
        answers: [
            "I trust quickly but constantly need reassurance",
            "I'm cautious about trusting and prefer to rely on myself",
            "I want to trust but often feel conflicted about it",
            "I trust gradually as people show they're trustworthy",
        ],
    },
    Question {
        prompt: "When facing a big life decision, you typically:",
        answers: [
            "Seek lots of advice and worry about making the wrong choice",
            "Research thoroughly and decide on your own",
            "Feel paralyzed by the options and their consequences",
            "Consider your options, seek some input, then trust your judgment",
        ],
    },
    Question {
        prompt: "After an argument with someone you care about, you usually:",
        answers: [
            "Replay it over and over, worrying about the relationship",
            "Try to move on and not think about it",
            "Feel confused about what happened and your role in it",
            "Reflect on it, then address any unresolved issues",
        ],
    },
];

/// Majority vote over the answers.
///
/// Styles are compared in the order they first received a vote and a tie
/// goes to the later one. Returns `None` for no answers.
pub fn score(answers: &[AttachmentStyle]) -> Option<AttachmentStyle> {
    let mut counts: Vec<(AttachmentStyle, usize)> = Vec::new();
    for answer in answers {
        match counts.iter_mut().find(|(style, _)| style == answer) {
            Some((_, count)) => *count += 1,
            None => counts.push((*answer, 1)),
        }
    }

    counts
        .into_iter()
        .reduce(|best, next| if best.1 > next.1 { best } else { next })
        .map(|(style, _)| style)
}

/// Walks through [`QUESTIONS`] collecting one answer each.
#[derive(Debug, Default, Clone)]
pub struct Questionnaire {
    answers: Vec<AttachmentStyle>,
}

impl Questionnaire {
    pub fn new() -> Self {
        Self::default()
    }

    /// The question awaiting an answer, `None` once all are answered.
    pub fn current(&self) -> Option<&'static Question> {
        QUESTIONS.get(self.answers.len())
    }

    /// Zero-based index of the current question.
    pub fn position(&self) -> usize {
        self.answers.len()
    }

    pub fn is_complete(&self) -> bool {
        self.answers.len() == QUESTIONS.len()
    }

    /// Records answer `choice` (zero-based) for the current question.
    ///
    /// # Errors
    /// Returns an error if the questionnaire is finished or `choice` is out of range.
    pub fn answer(&mut self, choice: usize) -> Result<()> {
        let Some(question) = self.current() else {
            bail!("All {} questions are already answered", QUESTIONS.len());
        };
        let Some(style) = question.style_for(choice) else {
            bail!("Answer must be between 1 and {}", question.answers.len());
        };
        self.answers.push(style);
        Ok(())
    }

    /// Resulting style once every question is answered.
    pub fn result(&self) -> Option<AttachmentStyle> {
        if self.is_complete() {
            score(&self.answers)
        } else {
            None
        }
    }
}
