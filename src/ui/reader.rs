use crate::app::{App, ContentState, MAX_SCROLL};
use crate::ui::articles::format_relative_time;
use crate::util::strip_control_chars;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use std::borrow::Cow;

/// Render the article reader view
pub(super) fn render(f: &mut Frame, app: &App, area: Rect) {
    // Layout may produce zero-sized rects during extreme terminal resizes
    if area.width < 3 || area.height < 3 {
        return;
    }

    let Some(article) = app.reader_article.as_ref() else {
        let paragraph = Paragraph::new("No article selected")
            .block(Block::default().borders(Borders::ALL).title("Reader"));
        f.render_widget(paragraph, area);
        return;
    };

    let feed_name = app
        .feeds
        .iter()
        .find(|feed| feed.id == article.feed_id)
        .map(|feed| &*feed.title)
        .unwrap_or("Unknown Feed");
    let time_str = format_relative_time(article.published);

    let mut header = vec![
        Line::from(Span::styled(
            strip_control_chars(&article.title).into_owned(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("{} - {}", strip_control_chars(feed_name), time_str),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ];
    if article.starred {
        header[0]
            .spans
            .push(Span::styled(" *", Style::default().fg(Color::Yellow)));
    }

    // Cow lets us reference the cached Loaded lines without cloning the Vec
    let content_lines: Cow<'_, [Line<'static>]> = match &app.content_state {
        ContentState::Stored => match article.display_content() {
            Some(content) => Cow::Owned(render_markdown(content)),
            None => Cow::Owned(vec![Line::from(Span::styled(
                "No content available",
                Style::default().fg(Color::DarkGray),
            ))]),
        },
        ContentState::Loading => {
            let mut lines = vec![Line::from(Span::styled(
                "Fetching full content...",
                Style::default().fg(Color::Yellow),
            ))];
            if let Some(summary) = article.summary.as_deref() {
                lines.push(Line::from(""));
                lines.extend(render_markdown(summary));
            }
            Cow::Owned(lines)
        }
        ContentState::Loaded { rendered_lines } => Cow::Borrowed(rendered_lines),
        ContentState::Failed { error, can_retry } => {
            let mut lines = vec![Line::from(Span::styled(
                format!("Failed to load content: {}", error),
                Style::default().fg(Color::Red),
            ))];
            if *can_retry {
                lines.push(Line::from(Span::styled(
                    "Press p to retry",
                    Style::default().fg(Color::DarkGray),
                )));
            }
            lines.push(Line::from(""));
            if let Some(summary) = article.summary.as_deref() {
                lines.push(Line::from(Span::styled(
                    "Showing summary:",
                    Style::default().fg(Color::Yellow),
                )));
                lines.push(Line::from(""));
                lines.extend(render_markdown(summary));
            }
            Cow::Owned(lines)
        }
    };

    let text = Text::from_iter(header.into_iter().chain(content_lines.iter().cloned()));

    // ratatui's scroll offset is u16; content beyond 65535 lines is not
    // reachable, which is acceptable for article-length text
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Article"))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll_offset.min(MAX_SCROLL) as u16, 0));

    f.render_widget(paragraph, area);
}

/// Convert markdown to styled ratatui Lines.
/// Returns owned Lines so the result can be cached in `ContentState::Loaded`.
pub fn render_markdown(md: &str) -> Vec<Line<'static>> {
    let parser = Parser::new(md);
    let mut lines: Vec<Line<'static>> = Vec::with_capacity(md.lines().count());
    let mut current_spans: Vec<Span<'static>> = Vec::with_capacity(4);
    let mut in_code_block = false;
    let mut in_heading = false;
    let mut in_emphasis = false;
    let mut in_strong = false;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                in_heading = true;
            }
            Event::End(TagEnd::Heading(_)) => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
                in_heading = false;
            }
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
                lines.push(Line::from(""));
            }
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                lines.push(Line::from(""));
            }
            Event::Start(Tag::Emphasis) => {
                in_emphasis = true;
            }
            Event::End(TagEnd::Emphasis) => {
                in_emphasis = false;
            }
            Event::Start(Tag::Strong) => {
                in_strong = true;
            }
            Event::End(TagEnd::Strong) => {
                in_strong = false;
            }
            Event::Start(Tag::Link { .. }) => {}
            Event::End(TagEnd::Link) => {}
            Event::Start(Tag::Image { dest_url, .. }) => {
                current_spans.push(Span::styled(
                    format!("[Image: {}]", dest_url),
                    Style::default().fg(Color::Blue),
                ));
            }
            Event::Text(text) => {
                let style = if in_code_block {
                    Style::default().fg(Color::Yellow).bg(Color::Black)
                } else if in_heading {
                    Style::default()
                        .add_modifier(Modifier::BOLD)
                        .fg(Color::Cyan)
                } else if in_strong {
                    Style::default().add_modifier(Modifier::BOLD)
                } else if in_emphasis {
                    Style::default().add_modifier(Modifier::ITALIC)
                } else {
                    Style::default()
                };
                // Fetched content is untrusted; escape sequences must not
                // reach the terminal
                current_spans.push(Span::styled(
                    strip_control_chars(&text).into_owned(),
                    style,
                ));
            }
            Event::Code(code) => {
                current_spans.push(Span::styled(
                    format!("`{}`", strip_control_chars(&code)),
                    Style::default().fg(Color::Yellow),
                ));
            }
            Event::SoftBreak => {
                current_spans.push(Span::raw(" "));
            }
            Event::HardBreak => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
            }
            _ => {}
        }
    }

    if !current_spans.is_empty() {
        lines.push(Line::from(current_spans));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_text() {
        let lines = render_markdown("Hello world");
        assert!(!lines.is_empty());
    }

    #[test]
    fn test_render_heading() {
        let lines = render_markdown("# Heading 1\n\n## Heading 2");
        assert!(!lines.is_empty());
    }

    #[test]
    fn test_render_bold() {
        let lines = render_markdown("This is **bold** text");
        assert!(!lines.is_empty());
    }

    #[test]
    fn test_render_code_block() {
        let lines = render_markdown("```\ncode block\n```");
        assert!(!lines.is_empty());
    }

    #[test]
    fn test_render_empty() {
        let lines = render_markdown("");
        assert!(lines.is_empty());
    }

    #[test]
    fn test_render_unicode() {
        let lines = render_markdown("Hello \u{4e16}\u{754c}");
        assert!(!lines.is_empty());
    }

    #[test]
    fn test_render_strips_terminal_escapes() {
        let lines = render_markdown("Be\u{1b}fore `co\u{7}de` after");
        let rendered: String = lines
            .iter()
            .flat_map(|line| line.spans.iter())
            .map(|span| span.content.as_ref())
            .collect();
        assert!(!rendered.contains('\u{1b}'));
        assert!(!rendered.contains('\u{7}'));
        assert!(rendered.contains("Before"));
        assert!(rendered.contains("`code`"));
    }
}
