mod app;
mod cli;
mod handler;
mod tui;
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use truthlens_core::{AnalysisKind, Config, TruthLens};

use crate::app::App;
use crate::tui::EventHandler;

#[derive(Parser)]
#[command(name = "truthlens")]
#[command(version, about = "Check messages, links and images for scams and misinformation")]
struct Cli {
    /// Without a subcommand the interactive terminal UI starts.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a piece of content
    Analyze {
        /// text, link or image
        #[arg(value_parser = cli::parse_kind)]
        kind: AnalysisKind,
        /// The text, the URL, or the path to an image file
        input: String,
    },
    /// Check a claim against official sources
    Verify {
        /// text or link
        #[arg(value_parser = cli::parse_kind)]
        kind: AnalysisKind,
        content: String,
    },
    /// Ask the assistant a question
    Chat {
        message: String,
    },
    /// List past analyses
    History {
        /// Only bookmarked analyses
        #[arg(short, long)]
        bookmarked: bool,
        /// Filter by content or explanation
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show dashboard statistics
    Stats,
    /// Sign in
    Login,
    /// Create an account, then sign in
    Signup,
    /// Sign out
    Logout,
    /// Show remaining free analyses
    Usage,
}

/// Logs go to a file while the TUI owns the terminal, else to stderr.
fn init_tracing(to_file: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("truthlens=info".parse()?)
        .add_directive("truthlens_core=info".parse()?);

    if to_file {
        let dir = Config::state_dir()?;
        std::fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("truthlens.log"))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.is_none())?;

    let config = Config::load()?;
    let lens = match cli.command {
        Some(Commands::Usage | Commands::Logout) => TruthLens::local_from_config(config)?,
        _ => TruthLens::from_config(config)?,
    };

    match cli.command {
        None => run_tui(lens).await?,
        Some(Commands::Analyze { kind, input }) => cli::analyze(&lens, kind, &input).await?,
        Some(Commands::Verify { kind, content }) => cli::verify(&lens, kind, &content).await?,
        Some(Commands::Chat { message }) => cli::chat(&lens, &message).await?,
        Some(Commands::History { bookmarked, search }) => {
            cli::history(&lens, bookmarked, search.as_deref()).await?
        }
        Some(Commands::Stats) => cli::stats(&lens).await?,
        Some(Commands::Login) => cli::login(&lens, false).await?,
        Some(Commands::Signup) => cli::login(&lens, true).await?,
        Some(Commands::Logout) => cli::logout(&lens).await?,
        Some(Commands::Usage) => cli::usage(&lens)?,
    }

    Ok(())
}

async fn run_tui(lens: TruthLens) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(lens, events.sender());

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_parses_kind_and_input() {
        let cli = Cli::parse_from(["truthlens", "analyze", "link", "https://x.example"]);
        match cli.command {
            Some(Commands::Analyze { kind, input }) => {
                assert_eq!(kind, AnalysisKind::Link);
                assert_eq!(input, "https://x.example");
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn usage_and_logout_take_no_arguments() {
        for name in ["usage", "logout"] {
            let cli = Cli::try_parse_from(["truthlens", name]).unwrap();
            assert!(matches!(cli.command, Some(Commands::Usage | Commands::Logout)));
        }
    }
}
