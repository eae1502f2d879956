//! Keyboard input handling for browse and reader views.

use crate::app::{App, AppEvent, Focus, View};
use crate::liststate::ListContext;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyModifiers};
use tokio::sync::mpsc;

use super::loop_runner::{spawn_sync, Action};

/// Maximum tag filter input length.
const MAX_TAG_LENGTH: usize = 64;

/// Dispatch a key press to the handler for the current view.
pub(super) async fn handle_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    event_tx: &mpsc::UnboundedSender<AppEvent>,
) -> Result<Action> {
    if app.tag_input_mode {
        return handle_tag_input(app, code).await;
    }

    match app.view {
        View::Browse => handle_browse_input(app, code, modifiers, event_tx).await,
        View::Reader => handle_reader_input(app, code, modifiers).await,
    }
}

async fn handle_browse_input(
    app: &mut App,
    code: KeyCode,
    _modifiers: KeyModifiers,
    event_tx: &mpsc::UnboundedSender<AppEvent>,
) -> Result<Action> {
    match code {
        KeyCode::Char('q') => return Ok(Action::Quit),

        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::Feeds => Focus::Articles,
                Focus::Articles => Focus::Feeds,
            };
        }

        KeyCode::Char('j') | KeyCode::Down => app.nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.nav_up(),

        KeyCode::Enter => match app.focus {
            Focus::Feeds => {
                if let Some(feed) = app.selected_feed() {
                    let context = ListContext {
                        feed_id: Some(feed.id),
                        ..Default::default()
                    };
                    app.set_context(context).await?;
                    app.focus = Focus::Articles;
                }
            }
            Focus::Articles => app.open_selected_article().await?,
        },

        // All articles across feeds
        KeyCode::Char('a') => {
            app.set_context(ListContext::default()).await?;
            app.focus = Focus::Articles;
        }

        // Folder of the selected feed
        KeyCode::Char('o') => {
            if let Some(folder) = app.selected_feed().and_then(|f| f.folder.clone()) {
                app.set_context(ListContext {
                    folder: Some(folder),
                    ..Default::default()
                })
                .await?;
                app.focus = Focus::Articles;
            } else {
                app.set_status("Selected feed has no folder");
            }
        }

        // Tag filter input
        KeyCode::Char('t') => {
            app.tag_input_mode = true;
            app.tag_input.clear();
        }

        KeyCode::Char('f') => {
            app.cycle_filter().await?;
            app.set_status(format!("Filter: {}", app.filter_label()));
        }

        KeyCode::Char('m') => app.toggle_read_selected().await?,
        KeyCode::Char('s') => app.toggle_star_selected().await?,

        KeyCode::Char('S') | KeyCode::Char('r') => spawn_sync(app, event_tx),

        // Toggle the partial-content flag on the selected feed, forcing
        // (or stopping) proxy fetches for all its articles
        KeyCode::Char('P') => {
            if let Some(feed) = app.selected_feed() {
                let partial = app.db.toggle_partial_content(feed.id).await?;
                app.set_status(if partial {
                    "Feed marked as partial content"
                } else {
                    "Feed marked as full content"
                });
                app.reload_feeds().await?;
            }
        }

        _ => {}
    }
    Ok(Action::Continue)
}

async fn handle_reader_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Result<Action> {
    match code {
        KeyCode::Char('q') => return Ok(Action::Quit),

        KeyCode::Char('b') | KeyCode::Esc => app.exit_reader().await?,

        KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => app.scroll_down(10),
        KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => app.scroll_up(10),

        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),

        // Manual full-content parse, bypassing eligibility heuristics
        KeyCode::Char('p') => app.request_manual_parse(),

        KeyCode::Char('s') => app.toggle_star_selected().await?,

        _ => {}
    }
    Ok(Action::Continue)
}

async fn handle_tag_input(app: &mut App, code: KeyCode) -> Result<Action> {
    match code {
        KeyCode::Esc => {
            app.tag_input_mode = false;
            app.tag_input.clear();
        }
        KeyCode::Enter => {
            app.tag_input_mode = false;
            let tag = app.tag_input.trim().to_string();
            app.tag_input.clear();
            if tag.is_empty() {
                app.set_context(ListContext::default()).await?;
            } else {
                app.set_context(ListContext {
                    tag: Some(tag),
                    ..Default::default()
                })
                .await?;
            }
            app.focus = Focus::Articles;
        }
        KeyCode::Backspace => {
            app.tag_input.pop();
        }
        KeyCode::Char(c) => {
            if app.tag_input.len() < MAX_TAG_LENGTH {
                app.tag_input.push(c);
            }
        }
        _ => {}
    }
    Ok(Action::Continue)
}
