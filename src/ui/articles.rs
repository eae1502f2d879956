use crate::app::{App, Focus};
use crate::liststate::ArticleEmphasis;
use crate::util::{strip_control_chars, truncate_to_width};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

/// Format timestamp as relative time
pub fn format_relative_time(timestamp: Option<i64>) -> String {
    let Some(ts) = timestamp else {
        return String::new();
    };

    let now = Utc::now().timestamp();
    let diff = now - ts;

    // Future dates (malformed feeds)
    if diff < 0 {
        return "now".to_string();
    }

    if diff < 3600 {
        return format!("{}m", diff / 60);
    }

    if diff < 86400 {
        return format!("{}h", diff / 3600);
    }

    if diff < 604800 {
        return format!("{}d", diff / 86400);
    }

    // Older than 7 days, show the date
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%b %d").to_string())
        .unwrap_or_default()
}

/// Render the article list panel
pub(super) fn render(f: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Articles;

    let items: Vec<ListItem> = if app.articles.is_empty() {
        vec![ListItem::new("No articles")]
    } else {
        app.articles
            .iter()
            .enumerate()
            .map(|(i, article)| {
                let time_str = format_relative_time(article.published);

                let mut spans = Vec::new();

                if article.starred {
                    spans.push(Span::styled("* ", Style::default().fg(Color::Yellow)));
                }

                // Session-read rows stay visually distinct from older read
                // rows so a return from the reader doesn't look like the
                // list silently reshuffled
                let title_style = if i == app.selected_article {
                    Style::default().bg(Color::DarkGray).fg(Color::White)
                } else {
                    match app.list_state.emphasis(article.id, article.read) {
                        ArticleEmphasis::Unread => Style::default().add_modifier(Modifier::BOLD),
                        ArticleEmphasis::SessionRead => Style::default()
                            .fg(Color::DarkGray)
                            .add_modifier(Modifier::ITALIC),
                        ArticleEmphasis::Read => Style::default().fg(Color::Gray),
                    }
                };

                // Remote titles go through sanitization before hitting the
                // terminal; leave room for the star and timestamp columns
                let max_title_width = area.width.saturating_sub(12) as usize;
                let clean = strip_control_chars(&article.title);
                let title = truncate_to_width(&clean, max_title_width).into_owned();
                spans.push(Span::styled(title, title_style));

                if !time_str.is_empty() {
                    spans.push(Span::styled(
                        format!("  {}", time_str),
                        Style::default().fg(Color::DarkGray),
                    ));
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

    let title = panel_title(app);

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title),
    );

    f.render_widget(list, area);
}

fn panel_title(app: &App) -> String {
    if app.tag_input_mode {
        return format!("Tag: {}_", app.tag_input);
    }

    let context = app.list_state.context();
    let scope = if let Some(feed_id) = context.feed_id {
        app.feeds
            .iter()
            .find(|feed| feed.id == feed_id)
            .map(|feed| feed.title.to_string())
            .unwrap_or_else(|| "Articles".to_string())
    } else if let Some(folder) = &context.folder {
        format!("Folder: {}", folder)
    } else if let Some(tag) = &context.tag {
        format!("Tag: {}", tag)
    } else {
        "All Articles".to_string()
    };

    format!("{} [{}]", scope, app.filter_label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_time_none() {
        assert_eq!(format_relative_time(None), "");
    }

    #[test]
    fn test_relative_time_future() {
        let future = Utc::now().timestamp() + 3600;
        assert_eq!(format_relative_time(Some(future)), "now");
    }

    #[test]
    fn test_relative_time_minutes() {
        let ts = Utc::now().timestamp() - 120;
        assert_eq!(format_relative_time(Some(ts)), "2m");
    }

    #[test]
    fn test_relative_time_hours() {
        let ts = Utc::now().timestamp() - 7200;
        assert_eq!(format_relative_time(Some(ts)), "2h");
    }

    #[test]
    fn test_relative_time_days() {
        let ts = Utc::now().timestamp() - 86400 * 3;
        assert_eq!(format_relative_time(Some(ts)), "3d");
    }
}
