use crate::app::{App, Focus};
use crate::util::strip_control_chars;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

/// Render the feed list panel
pub(super) fn render(f: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Feeds;

    let items: Vec<ListItem> = if app.feeds.is_empty() {
        vec![ListItem::new("No feeds (press r to sync)")]
    } else {
        app.feeds
            .iter()
            .enumerate()
            .map(|(i, feed)| {
                let unread_text = if feed.unread_count > 0 {
                    format!(" ({})", feed.unread_count)
                } else {
                    String::new()
                };

                let content = format!("{}{}", strip_control_chars(&feed.title), unread_text);

                let style = if i == app.selected_feed {
                    Style::default().bg(Color::DarkGray).fg(Color::White)
                } else if feed.unread_count > 0 {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };

                // Partial-content feeds get a marker since their articles go
                // through the proxy fetch path
                let mut spans = Vec::with_capacity(3);
                if let Some(folder) = &feed.folder {
                    spans.push(Span::styled(
                        format!("{}/", folder),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
                spans.push(Span::styled(content, style));
                if feed.partial_content {
                    spans.push(Span::styled(" +", Style::default().fg(Color::Blue)));
                }

                ListItem::new(Line::from(spans))
            })
            .collect()
    };

    let border_style = if is_focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };

    let title = format!("Feeds ({})", app.feeds.len());
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title),
    );

    f.render_widget(list, area);
}
