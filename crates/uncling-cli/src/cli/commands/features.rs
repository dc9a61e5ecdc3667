//! Feature command handlers: check-in, self-chat, rescue, rest, progress.

use anyhow::Result;
use uncling_core::config::Config;
use uncling_core::features::check_in::intensity_label;
use uncling_core::features::rescue::{OPENING_LINE, QUICK_ACTIONS, RescueChat};
use uncling_core::features::rest::{self, RestReflection};
use uncling_core::providers::{Turn, TurnRole};
use uncling_core::session::Route;

use super::read_line;
use super::session::open_screen;

fn speaker(turn: &Turn) -> &'static str {
    match turn.role {
        TurnRole::User => "you",
        TurnRole::Model => "uncling",
    }
}

pub async fn check_in(config: &Config, mood: &str, intensity: u8) -> Result<()> {
    let app = open_screen(config, Route::CheckIn).await?;

    let style = app.attachment_style();
    println!("Feeling {mood}, {}.", intensity_label(intensity));
    println!("Other words that may fit: {}", style.suggested_moods().join(", "));

    let reply = app.check_in(mood, intensity).await?;
    println!();
    println!("{}", reply.message);
    if !reply.actions.is_empty() {
        println!();
        println!("Things you could try:");
        for (i, action) in reply.actions.iter().enumerate() {
            println!("  {}. {action}", i + 1);
        }
    }
    app.shutdown().await;
    Ok(())
}

pub async fn chat(config: &Config, message: Option<&str>) -> Result<()> {
    let app = open_screen(config, Route::SecureChat).await?;

    match message {
        Some(message) => {
            let turn = app.secure_chat(message).await?;
            println!("{}", turn.ai_response);
        }
        None => {
            for turn in app.chat_history().await? {
                println!("{}: {}", speaker(&turn), turn.text);
            }
        }
    }
    app.shutdown().await;
    Ok(())
}

pub async fn rescue(config: &Config, feeling: Option<&str>, trigger: Option<&str>) -> Result<()> {
    let app = open_screen(config, Route::RescueMe).await?;

    let mut chat = RescueChat::new();
    println!("{OPENING_LINE}");
    println!();
    println!("If words are hard right now, try one of these:");
    for action in QUICK_ACTIONS {
        println!("  - {action}");
    }
    println!();
    println!("Type what you're feeling. An empty line ends the conversation.");

    while let Some(line) = read_line("> ")? {
        if line.is_empty() {
            break;
        }
        let reply = chat.send(app.generator(), &line).await?;
        println!("{reply}");
    }

    if !chat.shows_quick_actions() {
        let user_id = app.user_id()?;
        if chat
            .save(app.persistence(), &user_id, feeling, trigger)
            .await
        {
            println!("Conversation saved.");
        } else {
            eprintln!("Could not save this conversation.");
        }
    }
    app.shutdown().await;
    Ok(())
}

pub async fn rest(config: &Config) -> Result<()> {
    let app = open_screen(config, Route::BeforeYouRest).await?;

    let mut reflection = RestReflection::new(app.attachment_style());
    loop {
        let question = reflection.question();
        println!();
        println!("{}", question.title());
        println!("{}", question.prompt());

        loop {
            let Some(line) = read_line("> ")? else {
                // stdin closed: keep whatever was answered
                break;
            };
            if line.is_empty() {
                if reflection.has_answered() {
                    break;
                }
                eprintln!("Write at least one answer first.");
                continue;
            }
            let reply = reflection.send(app.generator(), &line).await?;
            println!("{reply}");
        }

        if !reflection.has_answered() {
            println!("Reflection stopped before it was finished.");
            app.shutdown().await;
            return Ok(());
        }
        if reflection.advance()? {
            break;
        }
    }

    println!();
    println!("{}", reflection.summary());
    let user_id = app.user_id()?;
    if reflection.save(app.persistence(), &user_id).await {
        println!("Reflection saved.");
    } else {
        eprintln!("Could not save this reflection.");
    }
    app.shutdown().await;
    Ok(())
}

pub async fn progress(config: &Config) -> Result<()> {
    let app = open_screen(config, Route::Progress).await?;

    let (report, insight) = app.progress().await?;

    println!("Check-ins:");
    if report.check_ins.is_empty() {
        println!("  none yet");
    }
    for entry in &report.check_ins {
        let day = entry
            .created_at
            .map(|d| d.date_naive().to_string())
            .unwrap_or_default();
        println!(
            "  {day} {} ({}/7, {})",
            entry.notes, entry.mood, entry.attachment_style
        );
    }

    println!();
    println!("Rescue sessions:");
    if report.rescue_sessions.is_empty() {
        println!("  none yet");
    }
    for session in &report.rescue_sessions {
        let day = session
            .created_at
            .map(|d| d.date_naive().to_string())
            .unwrap_or_default();
        let feeling = session.feeling.as_deref().unwrap_or("unnamed feeling");
        match session.trigger.as_deref() {
            Some(trigger) => println!("  {day} {feeling} after {trigger}"),
            None => println!("  {day} {feeling}"),
        }
    }

    println!();
    println!("Rest notes:");
    if report.rest_notes.is_empty() {
        println!("  none yet");
    }
    for note in &report.rest_notes {
        let day = note
            .created_at
            .map(|d| d.date_naive().to_string())
            .unwrap_or_default();
        let (helped, message) = rest::split_note(&note.notes);
        println!("  {day}");
        if let Some(helped) = helped {
            println!("    what helped: {helped}");
        }
        if let Some(message) = message {
            println!("    message to self: {message}");
        }
    }

    println!();
    println!("Insight: {insight}");
    app.shutdown().await;
    Ok(())
}
