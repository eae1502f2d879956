//! Main event loop for the TUI.
//!
//! Multiplexes terminal input, background sync events, parse results, and a
//! periodic tick with `tokio::select!`.

use crate::app::{App, AppEvent};
use crate::content::ParseEvent;
use crate::sync::{run_sync, RemoteClient};
use anyhow::Result;
use crossterm::{
    event::Event,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use super::events::handle_app_event;
use super::input::handle_input;
use super::render::render;

/// Result of handling a key press event.
pub enum Action {
    Continue,
    Quit,
}

/// Runs the TUI application event loop.
///
/// Installs a panic hook that restores terminal state before unwinding, so
/// a panic never leaves the terminal in raw mode.
pub async fn run(
    app: &mut App,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    mut event_rx: mpsc::UnboundedReceiver<AppEvent>,
    mut parse_rx: mpsc::UnboundedReceiver<ParseEvent>,
) -> Result<()> {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;
    let mut event_stream = crossterm::event::EventStream::new();
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    // Periodic background sync, if configured
    let mut next_sync = (app.config.sync_interval_minutes > 0 && !app.config.api_url.is_empty())
        .then(|| Instant::now() + Duration::from_secs(app.config.sync_interval_minutes * 60));

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        if app.needs_redraw {
            terminal.draw(|f| render(f, app))?;
            app.needs_redraw = false;
        }

        if app.clear_expired_status() {
            app.needs_redraw = true;
        }

        // Drain pending events before waiting, so results are never starved
        // by rapid input
        while let Ok(event) = event_rx.try_recv() {
            handle_app_event(app, event).await;
        }
        while let Ok(event) = parse_rx.try_recv() {
            if let Err(e) = app.handle_parse_event(event).await {
                app.set_status(format!("Error: {}", e));
            }
        }

        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                break;
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                break;
            }

            maybe_event = event_stream.next() => {
                if let Some(Ok(Event::Key(key))) = maybe_event {
                    app.needs_redraw = true;
                    match handle_input(app, key.code, key.modifiers, &event_tx).await {
                        Ok(Action::Quit) => break,
                        Ok(Action::Continue) => {}
                        Err(e) => app.set_status(format!("Error: {}", e)),
                    }
                }
            }

            Some(event) = event_rx.recv() => {
                handle_app_event(app, event).await;
            }

            Some(event) = parse_rx.recv() => {
                if let Err(e) = app.handle_parse_event(event).await {
                    app.set_status(format!("Error: {}", e));
                }
            }

            _ = tick_interval.tick() => {
                // The tick drives the auto-parse cooldown
                app.parser.tick();

                if let Some(due) = next_sync {
                    if Instant::now() >= due && !app.sync_running {
                        spawn_sync(app, &event_tx);
                        next_sync = Some(
                            Instant::now()
                                + Duration::from_secs(app.config.sync_interval_minutes * 60),
                        );
                    }
                }
            }
        }
    }

    restore_terminal(terminal)?;
    Ok(())
}

/// Spawn a full sync cycle in the background.
///
/// Results come back as `AppEvent::SyncCompleted` / `SyncFailed`. Only one
/// sync runs at a time; a request while one is in flight is ignored.
pub(super) fn spawn_sync(app: &mut App, event_tx: &mpsc::UnboundedSender<AppEvent>) {
    if app.sync_running {
        return;
    }
    if app.config.api_url.is_empty() {
        app.set_status("Sync not configured (set api_url in config.toml)");
        return;
    }

    let client = match RemoteClient::new(
        app.http_client.clone(),
        &app.config.api_url,
        app.config.resolved_api_token(),
    ) {
        Ok(client) => client,
        Err(e) => {
            app.set_status(format!("Sync error: {}", e));
            return;
        }
    };

    app.sync_running = true;
    let _ = event_tx.send(AppEvent::SyncStarted);

    let db = app.db.clone();
    let log_path = app.sync_log_path.clone();
    let tx = event_tx.clone();

    let handle = tokio::spawn(async move { run_sync(&db, &client, &log_path).await });
    tokio::spawn(async move {
        let event = match handle.await {
            Ok(Ok(outcome)) => AppEvent::SyncCompleted { outcome },
            Ok(Err(e)) => AppEvent::SyncFailed {
                error: e.to_string(),
            },
            Err(join_err) => AppEvent::TaskPanicked {
                task: "sync",
                error: join_err.to_string(),
            },
        };
        if tx.send(event).is_err() {
            tracing::warn!("Failed to deliver sync result (receiver dropped)");
        }
    });
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
