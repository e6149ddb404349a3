//! Quote-aware scanning over SQL text.
//!
//! Statement splitting, parameter expansion and the dialect rewrite passes
//! all need to know whether a byte of command text sits inside a string
//! literal or a quoted identifier. The scanner is a single forward pass over
//! the text tracking that state; all positions are byte offsets.

/// Quoting context of a position in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteState {
    /// Plain code; markers found here are significant.
    None,
    /// Inside `'...'`; a doubled `''` is a literal quote, not an exit.
    SingleQuoted,
    /// Inside `"..."`; a doubled `""` is a literal quote, not an exit.
    DoubleQuoted,
    /// Inside a `[...]` quoted identifier.
    Bracketed,
    /// Inside a `` `...` `` quoted identifier.
    Backticked,
}

impl QuoteState {
    fn enter(ch: char) -> Option<QuoteState> {
        match ch {
            '\'' => Some(QuoteState::SingleQuoted),
            '"' => Some(QuoteState::DoubleQuoted),
            '[' => Some(QuoteState::Bracketed),
            '`' => Some(QuoteState::Backticked),
            _ => None,
        }
    }
}

/// Visits every character with the quote state it is read in, and returns the
/// state after the final character. An unterminated quote never resets, so
/// everything after it is reported as quoted.
fn walk(sql: &str, mut visit: impl FnMut(usize, char, QuoteState)) -> QuoteState {
    let mut state = QuoteState::None;
    let mut chars = sql.char_indices().peekable();
    while let Some((pos, ch)) = chars.next() {
        visit(pos, ch, state);
        match state {
            QuoteState::None => {
                if let Some(entered) = QuoteState::enter(ch) {
                    state = entered;
                }
            }
            QuoteState::SingleQuoted | QuoteState::DoubleQuoted => {
                let quote = if state == QuoteState::SingleQuoted { '\'' } else { '"' };
                if ch == quote {
                    if chars.peek().map(|&(_, next)| next) == Some(quote) {
                        // doubled quote: consume the second half, stay inside
                        if let Some((escaped_pos, escaped)) = chars.next() {
                            visit(escaped_pos, escaped, state);
                        }
                    } else {
                        state = QuoteState::None;
                    }
                }
            }
            QuoteState::Bracketed => {
                if ch == ']' {
                    state = QuoteState::None;
                }
            }
            QuoteState::Backticked => {
                if ch == '`' {
                    state = QuoteState::None;
                }
            }
        }
    }
    state
}

/// Byte offsets of every unquoted occurrence of any character in `markers`,
/// in ascending order.
///
/// The marker set should not contain the quote delimiters themselves.
pub fn marker_positions(sql: &str, markers: &[char]) -> Vec<usize> {
    marker_positions_in(sql, markers, 0, sql.len())
}

/// Same as [`marker_positions`], restricted to the window of `len` bytes
/// starting at `start`. Returned offsets are relative to the window start.
///
/// Quote tracking begins fresh at the window start, so the window should not
/// begin inside a quoted region. `start` and `start + len` must lie on
/// character boundaries.
pub fn marker_positions_in(sql: &str, markers: &[char], start: usize, len: usize) -> Vec<usize> {
    let window = &sql[start..start + len];
    let mut found = Vec::new();
    walk(window, |pos, ch, state| {
        if state == QuoteState::None && markers.contains(&ch) {
            found.push(pos);
        }
    });
    found
}

/// The quote state in which the character at byte offset `pos` is read.
///
/// An opening quote character is itself read in the outer state; the closing
/// one is read inside. Offsets past the end of the text report the final
/// state, which for an unterminated quote is still the quoted one.
pub fn quote_state_at(sql: &str, pos: usize) -> QuoteState {
    let mut at = None;
    let final_state = walk(sql, |p, ch, state| {
        if at.is_none() && p + ch.len_utf8() > pos {
            at = Some(state);
        }
    });
    at.unwrap_or(final_state)
}

/// Whether the character at byte offset `pos` sits inside any quoted region.
pub fn is_quoted(sql: &str, pos: usize) -> bool {
    quote_state_at(sql, pos) != QuoteState::None
}
