use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";

/// Truncates or pads `s` so it occupies exactly `width` terminal columns.
///
/// Width is measured with `unicode-width`, so CJK characters and emoji count
/// as two columns. Truncated text ends in `...` when there is room for it.
///
/// ```
/// use feedwarden::util::fit_to_width;
///
/// assert_eq!(fit_to_width("News", 6), "News  ");
/// assert_eq!(fit_to_width("Hello World", 8), "Hello...");
/// ```
pub fn fit_to_width(s: &str, width: usize) -> String {
    let current = UnicodeWidthStr::width(s);
    if current <= width {
        return format!("{}{}", s, " ".repeat(width - current));
    }

    let budget = if width > ELLIPSIS.len() {
        width - ELLIPSIS.len()
    } else {
        width
    };

    let mut out = String::with_capacity(width);
    let mut used = 0;
    for c in s.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    if width > ELLIPSIS.len() {
        out.push_str(ELLIPSIS);
        used += ELLIPSIS.len();
    }
    // A wide char that did not fit leaves a one-column gap
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}

/// SEC-001: Removes terminal control characters and ANSI escape sequences.
///
/// Feed titles come from arbitrary documents and servers; printing them raw
/// would let a title move the cursor or recolor the terminal. Tabs become
/// spaces and line breaks are dropped so a table row stays on one line.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| c.is_control()) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                // CSI: parameters until a final byte in 0x40..=0x7E
                Some('[') => {
                    chars.next();
                    for n in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&n) {
                            break;
                        }
                    }
                }
                // OSC: until BEL or ST
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\x07' {
                            break;
                        }
                        if n == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\t' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
