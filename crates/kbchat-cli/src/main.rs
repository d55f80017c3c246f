//! kbchat - terminal chat client for a streaming knowledge-base backend.
//!
//! This is the entry point for the `kbchat` binary.

mod app;
mod markdown;
mod ui;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use kbchat_core::{ClientConfig, ReconnectPolicy, Session, SessionEvent, Transcript};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use app::App;

/// Title of exported transcripts.
const TRANSCRIPT_TITLE: &str = "kbchat transcript";

/// kbchat - chat with a knowledge-base backend from the terminal.
#[derive(Parser, Debug)]
#[command(name = "kbchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (http/https or ws/wss).
    #[arg(long, env = "KBCHAT_SERVER")]
    server: Option<String>,

    /// Path of the chat socket on the backend.
    #[arg(long, env = "KBCHAT_PATH")]
    path: Option<String>,

    /// TOML configuration file.
    #[arg(long, env = "KBCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Write the conversation as HTML to this file on exit.
    #[arg(long, env = "KBCHAT_TRANSCRIPT")]
    transcript: Option<PathBuf>,

    /// Use a fixed reconnect delay (milliseconds) instead of backoff.
    #[arg(long, env = "KBCHAT_FIXED_DELAY_MS")]
    fixed_delay_ms: Option<u64>,

    /// Enable debug logging.
    #[arg(long, env = "KBCHAT_DEBUG", default_value = "false")]
    debug: bool,

    /// Log file. Defaults to stderr.
    #[arg(long, env = "KBCHAT_LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Load the configuration file and apply command-line overrides.
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;

        if let Some(server) = &self.server {
            config.server_url.clone_from(server);
        }
        if let Some(path) = &self.path {
            config.chat_path.clone_from(path);
        }
        if let Some(ms) = self.fixed_delay_ms {
            config.reconnect = ReconnectPolicy::fixed(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    if !args.debug {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kbchat_core=debug,kbchat_cli=debug,warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        builder.with_writer(io::stderr).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments
    let args = Args::parse();
    init_tracing(&args)?;

    let config = args.client_config()?;
    let (session, events) = Session::from_config(&config, Transcript::new())
        .context("invalid server configuration")?;
    tracing::info!(endpoint = %session.endpoint(), "Configuration loaded");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session, config.input_max_rows);
    app.start();

    let result = run_event_loop(&mut terminal, &mut app, events).await;
    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if let Some(path) = &args.transcript {
        app.transcript()
            .write_html(path, TRANSCRIPT_TITLE)
            .with_context(|| format!("failed to write transcript to {}", path.display()))?;
        println!("Transcript written to {}", path.display());
    }

    result
}

/// Main event loop. Session events redraw immediately so streaming stays smooth.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut events: mpsc::Receiver<SessionEvent>,
) -> anyhow::Result<()> {
    loop {
        app.tick_animation();
        terminal.draw(|f| ui::render(f, app))?;

        let tick_rate = if app.needs_immediate_redraw() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(100)
        };

        tokio::select! {
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::ZERO)? {
                    match event::read()? {
                        Event::Key(key) => app.handle_key(key),
                        Event::Mouse(mouse) => app.handle_mouse(mouse),
                        _ => {}
                    }
                }
            }

            Some(event) = events.recv() => {
                app.handle_session_event(event);
                terminal.draw(|f| ui::render(f, app))?;
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
