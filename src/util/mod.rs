//! Small shared utilities: control-character sanitization, width-aware
//! truncation for terminal rendering, and URL validation.

mod url;

pub use url::{validate_url, UrlValidationError};

use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Strip ASCII control characters from text coming out of the database.
///
/// Remote titles and summaries are stored verbatim; anything that could
/// corrupt the terminal (escape sequences, bells, backspaces) is removed
/// before rendering. Tabs are replaced with a single space, newlines with
/// a space, everything else below 0x20 (and DEL) is dropped.
///
/// Returns `Cow::Borrowed` when the input is already clean.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| c.is_control()) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\t' | '\n' | '\r' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Display width of a string in terminal columns (CJK- and emoji-aware).
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Truncate a string to fit `max_width` terminal columns, appending "..."
/// when text was cut. Width accounting is Unicode-aware so CJK titles do
/// not overflow the article list column.
///
/// Widths of 3 or less return as many characters as fit, without ellipsis.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    if max_width <= ELLIPSIS_WIDTH {
        let mut width = 0;
        let mut end = 0;
        for (idx, c) in s.char_indices() {
            let w = UnicodeWidthChar::width(c).unwrap_or(0);
            if width + w > max_width {
                break;
            }
            width += w;
            end = idx + c.len_utf8();
        }
        return Cow::Owned(s[..end].to_string());
    }

    let target = max_width - ELLIPSIS_WIDTH;
    let mut width = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > target {
            break;
        }
        width += w;
        end = idx + c.len_utf8();
    }

    let mut out = s[..end].to_string();
    out.push_str(ELLIPSIS);
    Cow::Owned(out)
}
