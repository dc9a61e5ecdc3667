//! Session command handlers: open, login, onboarding, reset.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::json;
use uncling_core::config::{Config, paths};
use uncling_core::features::onboarding::Questionnaire;
use uncling_core::providers::supabase::{SessionCache, SupabaseAuth, SupabaseClient, SupabaseRest};
use uncling_core::providers::{GeminiClient, GeminiConfig, IdentityProvider};
use uncling_core::session::{
    AuthStatus, FileFlagStore, Identity, RenderDecision, Route, RouteShell, SessionState,
    SessionStore, resolve as resolve_route,
};
use uncling_core::{App, BootReport};
use url::Url;

use super::read_line;

pub type LiveApp = App<SupabaseAuth, SupabaseRest, GeminiClient>;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum AuthArg {
    Unknown,
    Anonymous,
    Authenticated,
}

pub struct ResolveArgs {
    pub path: String,
    pub auth: AuthArg,
    pub splash_seen: bool,
    pub onboarded: bool,
    pub pending_callback: bool,
}

fn backend(config: &Config) -> Result<(SupabaseAuth, SupabaseRest)> {
    let client = SupabaseClient::from_config(&config.providers.backend)?;
    let cache = SessionCache::new(paths::session_path());
    Ok((
        SupabaseAuth::new(client.clone(), cache.clone()),
        SupabaseRest::new(client, cache),
    ))
}

fn load_store() -> Result<SessionStore> {
    SessionStore::load(FileFlagStore::new(paths::flags_path())).context("load local flags")
}

/// Absolute addresses are used as-is; anything else is a path under the
/// configured origin.
fn start_url(config: &Config, raw: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(raw) {
        return Ok(url);
    }
    let origin = Url::parse(&config.auth.redirect_origin)
        .with_context(|| format!("invalid redirect_origin {}", config.auth.redirect_origin))?;
    origin
        .join(raw)
        .with_context(|| format!("invalid address {raw}"))
}

/// Loads the app at `address` and settles the session.
async fn boot_at(config: &Config, address: &str) -> Result<(LiveApp, BootReport)> {
    let (auth, rest) = backend(config)?;
    let gemini = GeminiClient::new(GeminiConfig::from_settings(&config.providers.gemini)?);
    let mut app = App::new(
        load_store()?,
        Arc::new(auth),
        rest,
        gemini,
        start_url(config, address)?,
        config.session_timeout(),
    );

    let report = app.boot().await;
    if let Some(notice) = report.notice {
        eprintln!("{notice}");
    }
    Ok((app, report))
}

/// Fails with a hint unless the app is showing `route`. Gating may have
/// moved it elsewhere during boot.
fn require_screen(app: &LiveApp, route: Route) -> Result<()> {
    match app.render() {
        RenderDecision::Screen(current) if current == route => Ok(()),
        RenderDecision::Loading => bail!("Session is still loading. Try again."),
        RenderDecision::Screen(Route::Dashboard) if route == Route::Onboarding => {
            bail!("Already onboarded. Run `uncling retake-quiz` to answer again.")
        }
        RenderDecision::Screen(Route::Onboarding) | RenderDecision::Redirect(Route::Onboarding) => {
            bail!("Finish onboarding first: run `uncling onboard`.")
        }
        RenderDecision::Screen(Route::Splash | Route::Auth) | RenderDecision::Redirect(_) => {
            bail!("Not signed in. Run `uncling login` first.")
        }
        RenderDecision::Screen(current) => bail!("Cannot open {route} from {current}."),
    }
}

/// Boots at the root and then opens `route` the way a user would from the
/// dashboard. A fresh load straight onto a gated path is sent to the
/// dashboard by the resolver, so feature commands never start there.
pub(crate) async fn open_screen(config: &Config, route: Route) -> Result<LiveApp> {
    let (mut app, _) = boot_at(config, Route::Splash.path()).await?;
    if app.render() != RenderDecision::Screen(route) {
        app.navigate(route);
    }
    require_screen(&app, route)?;
    Ok(app)
}

fn print_location(app: &LiveApp) {
    let decision = app.render();
    println!("location: {}", app.location());
    println!("screen: {decision}");
    if let RenderDecision::Screen(route) = decision {
        println!("title: {}", route.title());
    }
}

pub async fn open(config: &Config, address: &str) -> Result<()> {
    let (app, report) = boot_at(config, address).await?;
    print_location(&app);
    if let Some(route) = report.redirected {
        println!("redirected: {route}");
    }

    if report.decision == RenderDecision::Screen(Route::Dashboard) {
        let dashboard = app.dashboard().await;
        println!("attachment style: {}", dashboard.attachment_style);
        println!("streak: {}", dashboard.streak);
        println!("{}", dashboard.encouragement);
    }
    app.shutdown().await;
    Ok(())
}

pub fn resolve(args: &ResolveArgs, as_json: bool) -> Result<()> {
    let auth = match args.auth {
        AuthArg::Unknown => AuthStatus::Unknown,
        AuthArg::Anonymous => AuthStatus::Anonymous,
        AuthArg::Authenticated => AuthStatus::Authenticated(Identity {
            id: "local".to_string(),
            email: None,
            attachment_style: None,
        }),
    };
    let state = SessionState {
        splash_seen: args.splash_seen,
        auth,
        onboarding_complete: args.onboarded,
        pending_callback: args.pending_callback,
        epoch: 0,
    };

    let target = resolve_route(&state, &args.path);
    let render = RouteShell::render(&state, &args.path);

    if as_json {
        let output = json!({
            "path": args.path,
            "target": target.map(Route::path),
            "render": render.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("target: {}", target.map_or("none", Route::path));
        println!("render: {render}");
    }
    Ok(())
}

pub async fn login(config: &Config, email: Option<&str>, no_browser: bool) -> Result<()> {
    let (auth, _) = backend(config)?;
    let redirect_to = config.auth.redirect_origin.as_str();

    if let Some(email) = email {
        auth.send_magic_link(email.trim(), redirect_to)
            .await
            .context("request sign-in link")?;
        println!("Sign-in link sent to {}.", email.trim());
        println!("After following it, run `uncling open <address you landed on>`.");
        return Ok(());
    }

    let url = auth
        .sign_in_url(&config.auth.oauth_provider, redirect_to)
        .context("prepare sign-in")?;
    println!("{url}");
    if !no_browser && let Err(e) = open::that(&url) {
        tracing::warn!(error = %e, "Failed to open browser");
        eprintln!("Could not open a browser; visit the address above.");
    }
    println!("After signing in, run `uncling open <address you landed on>`.");
    Ok(())
}

pub async fn logout(config: &Config) -> Result<()> {
    let (mut app, _) = boot_at(config, "/").await?;
    app.sign_out().await;
    println!("Signed out.");
    print_location(&app);
    app.shutdown().await;
    Ok(())
}

pub fn splash() -> Result<()> {
    load_store()?.set_splash_seen()?;
    println!("Splash dismissed.");
    Ok(())
}

fn collect_answers(answers: Option<Vec<usize>>) -> Result<Questionnaire> {
    let mut quiz = Questionnaire::new();

    if let Some(answers) = answers {
        for answer in answers {
            let choice = answer
                .checked_sub(1)
                .context("Answers are numbered from 1")?;
            quiz.answer(choice)?;
        }
        return Ok(quiz);
    }

    while let Some(question) = quiz.current() {
        println!();
        println!("{}. {}", quiz.position() + 1, question.prompt);
        for (i, answer) in question.answers.iter().enumerate() {
            println!("  {}) {answer}", i + 1);
        }
        let Some(line) = read_line("> ")? else {
            bail!("Questionnaire interrupted");
        };
        match line.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
            Some(choice) => {
                if let Err(e) = quiz.answer(choice) {
                    eprintln!("{e}");
                }
            }
            None => eprintln!("Pick a number from 1 to {}", question.answers.len()),
        }
    }
    Ok(quiz)
}

async fn run_questionnaire(app: &mut LiveApp, answers: Option<Vec<usize>>) -> Result<()> {
    let quiz = collect_answers(answers)?;
    let Some(style) = quiz.result() else {
        bail!("Expected an answer for every question, got {}", quiz.position());
    };

    app.complete_onboarding(style).await?;
    println!("Your attachment style: {style}");
    println!("{}", style.description());
    print_location(app);
    Ok(())
}

pub async fn onboard(config: &Config, answers: Option<Vec<usize>>) -> Result<()> {
    let (mut app, _) = boot_at(config, Route::Onboarding.path()).await?;
    require_screen(&app, Route::Onboarding)?;
    run_questionnaire(&mut app, answers).await?;
    app.shutdown().await;
    Ok(())
}

/// Clears the style and answers the questionnaire again in one go; a later
/// launch would gate an onboarded user straight back to the dashboard.
pub async fn retake_quiz(config: &Config, answers: Option<Vec<usize>>) -> Result<()> {
    let mut app = open_screen(config, Route::Settings).await?;
    app.retake_quiz()?;
    println!("Attachment style cleared.");
    run_questionnaire(&mut app, answers).await?;
    app.shutdown().await;
    Ok(())
}

pub async fn reset(config: &Config) -> Result<()> {
    let (mut app, _) = boot_at(config, Route::Settings.path()).await?;
    app.clear_data().await?;
    println!("All local data cleared.");
    print_location(&app);
    app.shutdown().await;
    Ok(())
}
