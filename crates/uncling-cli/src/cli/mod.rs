//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use uncling_core::config::{self, paths};
use uncling_core::logging;

mod commands;

#[derive(Parser)]
#[command(name = "uncling")]
#[command(version)]
#[command(about = "Uncling companion: session gating and guided check-ins")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Load the app at an address (e.g. an OAuth callback) and show where it lands
    Open {
        /// Full address, or a path relative to the configured origin
        #[arg(value_name = "URL", default_value = "/")]
        url: String,
    },

    /// Evaluate the redirect table for a hypothetical session
    Resolve {
        /// Current path
        #[arg(long, default_value = "/")]
        path: String,

        /// Auth status
        #[arg(long, value_enum, default_value = "unknown")]
        auth: commands::session::AuthArg,

        /// The splash screen was dismissed
        #[arg(long)]
        splash_seen: bool,

        /// Onboarding is complete
        #[arg(long)]
        onboarded: bool,

        /// An OAuth callback is still being consumed
        #[arg(long)]
        pending_callback: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Sign in (browser OAuth, or a magic link with --email)
    Login {
        /// Email a sign-in link instead of opening the browser
        #[arg(long, value_name = "ADDRESS")]
        email: Option<String>,

        /// Print the sign-in URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Sign out
    Logout,

    /// Dismiss the splash screen
    Splash,

    /// Answer the attachment questionnaire
    Onboard {
        /// Comma-separated answers 1-4, one per question (prompts when omitted)
        #[arg(long, value_name = "LIST", value_delimiter = ',')]
        answers: Option<Vec<usize>>,
    },

    /// Forget the attachment style and answer the questionnaire again
    RetakeQuiz {
        /// Comma-separated answers 1-4, one per question (prompts when omitted)
        #[arg(long, value_name = "LIST", value_delimiter = ',')]
        answers: Option<Vec<usize>>,
    },

    /// Clear all local data and start over
    Reset,

    /// Name a feeling and get a validating reply
    CheckIn {
        /// How you feel
        #[arg(long)]
        mood: String,

        /// Intensity from 1 to 7
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=7))]
        intensity: u8,
    },

    /// Secure self-chat (shows history when no message is given)
    Chat {
        /// Message to send
        message: Option<String>,
    },

    /// Grounding conversation for a triggered moment (reads lines from stdin)
    Rescue {
        /// What you are feeling, saved with the transcript
        #[arg(long)]
        feeling: Option<String>,

        /// What set it off, saved with the transcript
        #[arg(long)]
        trigger: Option<String>,
    },

    /// Evening reflection (reads answers from stdin)
    Rest,

    /// Past entries and an insight
    Progress,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Set a single dotted key (e.g. providers.backend.url)
    Set {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init(&paths::logs_dir())?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    match cli.command {
        Commands::Open { url } => commands::session::open(&config, &url).await,
        Commands::Resolve {
            path,
            auth,
            splash_seen,
            onboarded,
            pending_callback,
            json,
        } => commands::session::resolve(
            &commands::session::ResolveArgs {
                path,
                auth,
                splash_seen,
                onboarded,
                pending_callback,
            },
            json,
        ),
        Commands::Login { email, no_browser } => {
            commands::session::login(&config, email.as_deref(), no_browser).await
        }
        Commands::Logout => commands::session::logout(&config).await,
        Commands::Splash => commands::session::splash(),
        Commands::Onboard { answers } => commands::session::onboard(&config, answers).await,
        Commands::RetakeQuiz { answers } => {
            commands::session::retake_quiz(&config, answers).await
        }
        Commands::Reset => commands::session::reset(&config).await,

        Commands::CheckIn { mood, intensity } => {
            commands::features::check_in(&config, &mood, intensity).await
        }
        Commands::Chat { message } => commands::features::chat(&config, message.as_deref()).await,
        Commands::Rescue { feeling, trigger } => {
            commands::features::rescue(&config, feeling.as_deref(), trigger.as_deref()).await
        }
        Commands::Rest => commands::features::rest(&config).await,
        Commands::Progress => commands::features::progress(&config).await,

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Set { key, value } => commands::config::set(&key, &value),
        },
    }
}
