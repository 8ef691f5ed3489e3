//! Sketchroom TUI
//!
//! Terminal client for a shared canvas and chat room.
//!
//! ## Layout
//!
//! - Left: canvas (drag with the left mouse button to draw)
//! - Right: chat log, pending messages marked
//! - Bottom: chat input line and connection status
//!
//! ## Keys
//!
//! - p/e: Pen / eraser
//! - 1-6: Pen color
//! - +/-: Brush width
//! - u/r: Undo / redo (local only)
//! - c: Clear canvas (local only)
//! - R: Reconnect now
//! - i: Type a chat message (Enter sends, Esc returns)
//! - q: Quit

mod app;
mod ui;

use std::fs::File;
use std::io::stdout;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use sketchroom_core::session::SessionCommand;
use sketchroom_core::{spawn_session, Config, SessionHandle, SessionResult};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app::App;

/// Run the TUI application
pub async fn run(config: Config) -> Result<()> {
    // Initialize TUI logging (file-based, only if SKETCHROOM_LOG is set)
    init_tui_logging(&config);

    let handle =
        spawn_session(config.session_config()).context("Failed to start session")?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = App::new(handle.display_name());
    let result = run_app(&mut terminal, &mut app, &handle).await;

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(DisableMouseCapture)?;
    stdout().execute(LeaveAlternateScreen)?;

    handle.shutdown().await;
    result
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    handle: &SessionHandle,
) -> Result<()> {
    let mut status_rx = handle.status_rx.clone();
    let mut canvas_rx = handle.canvas_rx.clone();
    let mut chat_rx = handle.chat_rx.clone();

    loop {
        app.refresh(handle);
        terminal.draw(|frame| ui::draw(frame, app))?;

        // Redraw on session updates; poll the terminal otherwise
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    warn!("Session task stopped");
                    app.should_quit = true;
                }
            }
            changed = canvas_rx.changed() => {
                if changed.is_err() {
                    app.should_quit = true;
                }
            }
            changed = chat_rx.changed() => {
                if changed.is_err() {
                    app.should_quit = true;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                // Drain every pending terminal event (mouse drags arrive in bursts)
                while event::poll(Duration::from_millis(0))? {
                    let command = match event::read()? {
                        // Only handle key press events (not release)
                        Event::Key(key) if key.kind == KeyEventKind::Press => {
                            app.handle_key(key.code, key.modifiers)
                        }
                        Event::Mouse(mouse) => app.handle_mouse(mouse),
                        _ => None,
                    };

                    if let Some(command) = command {
                        if let Err(e) = dispatch(handle, command) {
                            warn!(error = %e, "Session command failed");
                            app.should_quit = true;
                        }
                    }
                    if app.should_quit {
                        break;
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Forward a command from the UI to the session
fn dispatch(handle: &SessionHandle, command: SessionCommand) -> SessionResult<()> {
    match command {
        SessionCommand::BeginStroke(stroke) => handle.begin_stroke(stroke),
        SessionCommand::ExtendStroke { id, points } => handle.extend_stroke(&id, points),
        SessionCommand::EndStroke { id } => handle.end_stroke(&id),
        SessionCommand::SendChat(text) => match handle.send_chat(&text) {
            // Blank input never reaches here, but a rejected message is not fatal
            Err(e) if e.is_validation() => Ok(()),
            other => other,
        },
        SessionCommand::Clear => handle.clear(),
        SessionCommand::Undo => handle.undo(),
        SessionCommand::Redo => handle.redo(),
        SessionCommand::ForceReconnect => handle.force_reconnect(),
        // Quitting goes through App::should_quit
        SessionCommand::Shutdown => Ok(()),
    }
}

/// Initialize file-based logging for TUI mode
///
/// Only logs if SKETCHROOM_LOG is set (e.g. SKETCHROOM_LOG=debug).
/// Logs go to `log_file` from config, or `<data_dir>/debug.log`.
fn init_tui_logging(config: &Config) {
    // Only log if SKETCHROOM_LOG is set
    let Ok(log_level) = std::env::var("SKETCHROOM_LOG") else {
        return;
    };

    let log_path = config.log_path();
    if config.log_file.is_none() {
        if let Err(e) = config.ensure_data_dir() {
            eprintln!("Warning: {:#}", e);
            return;
        }
    }

    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "sketchroom_core={},sketchroom_cli={}",
        log_level, log_level
    ));

    // Initialize file-based logging (ignore error if already initialized)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init();

    info!("TUI logging initialized to {:?}", log_path);
}
