use crate::app::{App, View};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use std::borrow::Cow;

/// Render the status bar
pub(super) fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    // Cow avoids allocations for the static hint strings
    let text: Cow<'_, str> = if app.sync_running {
        match &app.last_sync_label {
            Some(label) => Cow::Owned(format!("Syncing... (last {})", label)),
            None => Cow::Borrowed("Syncing..."),
        }
    } else if let Some((msg, _)) = &app.status_message {
        Cow::Borrowed(msg.as_ref())
    } else {
        match app.view {
            View::Browse => {
                if app.tag_input_mode {
                    Cow::Borrowed("Type tag name | ESC cancel | ENTER confirm")
                } else {
                    match &app.last_sync_label {
                        Some(label) => Cow::Owned(format!(
                            "[r]sync [f]ilter [m]ark [s]tar [t]ag [Tab]switch [q]uit | synced {}",
                            label
                        )),
                        None => Cow::Borrowed(
                            "[r]sync [f]ilter [m]ark [s]tar [t]ag [Tab]switch [q]uit | never synced",
                        ),
                    }
                }
            }
            View::Reader => {
                Cow::Borrowed("[b]ack [j/k]scroll [Ctrl+d/u]page [p]arse [s]tar [q]uit")
            }
        }
    };

    let style = Style::default().bg(Color::DarkGray).fg(Color::White);

    let paragraph = Paragraph::new(text).style(style);
    f.render_widget(paragraph, area);
}
