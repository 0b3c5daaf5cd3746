use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

/// Ellipsis appended to truncated text
const ELLIPSIS: &str = "...";

/// Prepares feed-supplied text for a single terminal line.
///
/// Control characters (including ESC, so ANSI sequences cannot reach the
/// terminal) are dropped, line breaks and tabs become spaces, and the result
/// is cut to `max_width` display columns with a trailing `...` when it does
/// not fit.
///
/// # Examples
///
/// ```
/// use feedline::util::clean_line;
///
/// assert_eq!(clean_line("Short", 10), "Short");
/// assert_eq!(clean_line("A longer title", 10), "A longe...");
/// assert_eq!(clean_line("two\nlines", 20), "two lines");
/// ```
pub fn clean_line(s: &str, max_width: usize) -> Cow<'_, str> {
    let needs_clean = s.chars().any(char::is_control);
    let cleaned: Cow<'_, str> = if needs_clean {
        Cow::Owned(
            s.chars()
                .filter_map(|c| match c {
                    '\n' | '\r' | '\t' => Some(' '),
                    c if c.is_control() => None,
                    c => Some(c),
                })
                .collect(),
        )
    } else {
        Cow::Borrowed(s)
    };

    let width: usize = cleaned
        .chars()
        .map(|c| UnicodeWidthChar::width(c).unwrap_or(0))
        .sum();
    if width <= max_width {
        return cleaned;
    }

    // Too narrow for an ellipsis: keep what fits
    let with_ellipsis = max_width > ELLIPSIS.len();
    let budget = if with_ellipsis {
        max_width - ELLIPSIS.len()
    } else {
        max_width
    };
    let mut used = 0;
    let mut out = String::with_capacity(max_width);
    for c in cleaned.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    if with_ellipsis {
        out.push_str(ELLIPSIS);
    }
    Cow::Owned(out)
}
