//! Textual rewrite passes that turn Access-flavored statements into
//! something the driver accepts.
//!
//! Each pass edits a single already-split statement in place, consuming
//! parameters from its list when a marker disappears from the text. The
//! passes run in a fixed order per statement: guard resolution, global
//! variable substitution, TOP inlining, SKIP extraction, TOP-to-LIMIT
//! translation. All matching skips quoted regions.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    connection::JetConnection,
    parameters::{self, JetParameter},
    result::{JetError, Result},
    scan,
};

// Regexes compiled once as lazy statics
static IF_EXISTS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*if\s+(not\s+)?exists\s*\((.+)\)\s*then\s+(.+)$").unwrap()
});
static CREATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*create\b").unwrap());
static TOP_PARAM_SUM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btop\s+\(?\s*(@\w+|\?)\s*\+\s*(@\w+|\?)\s*\)?").unwrap());
static TOP_PARAM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btop\s+(?:\(\s*(@\w+|\?)\s*\)|(@\w+|\?))").unwrap());
static TOP_LITERAL_SUM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btop\s+\(?\s*(\d+)\s*\+\s*(\d+)\s*\)?").unwrap());
static TOP_LITERAL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btop\s+(\d+)\b").unwrap());
static SKIP_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bskip\s+(@\w+|\?|\d+)").unwrap());
static SELECT_TOP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(select(?:\s+distinct(?:row)?|\s+all)?)\s+top\s+(\d+)\s+").unwrap()
});

const IDENTITY_TOKEN: &str = "@@identity";
const ROWCOUNT_TOKEN: &str = "@@rowcount";

type Span = Range<usize>;

/// Leftmost match of `re` whose start is unquoted (and at parenthesis depth
/// zero when `outermost_only`). Returns the full-match span plus one span per
/// capture group.
fn find_match(re: &Regex, text: &str, outermost_only: bool) -> Option<(Span, Vec<Option<Span>>)> {
    let mut start = 0;
    while let Some(caps) = re.captures_at(text, start) {
        let full = caps.get(0)?.range();
        let usable = !scan::is_quoted(text, full.start)
            && (!outermost_only || paren_depth_before(text, full.start) == 0);
        if usable {
            let groups = (1..caps.len()).map(|i| caps.get(i).map(|m| m.range())).collect();
            return Some((full, groups));
        }
        start = full.start + 1;
    }
    None
}

fn paren_depth_before(text: &str, pos: usize) -> i32 {
    let mut depth = 0;
    for offset in scan::marker_positions(text, &['(', ')']) {
        if offset >= pos {
            break;
        }
        if text.as_bytes()[offset] == b'(' {
            depth += 1;
        } else {
            depth -= 1;
        }
    }
    depth
}

/// Index of the marker starting at byte `offset` within the statement's
/// marker list; this is also the index of its parameter.
fn placeholder_index_at(text: &str, offset: usize) -> Result<usize> {
    parameters::placeholder_positions(text)
        .iter()
        .position(|ph| ph.offset == offset)
        .ok_or_else(|| {
            JetError::InconsistentPlaceholders(format!(
                "no parameter marker at byte offset {offset}"
            ))
        })
}

fn parse_literal(text: &str, span: &Span) -> Result<i64> {
    text[span.clone()]
        .parse::<i64>()
        .map_err(|_| JetError::type_mismatch("integer", text[span.clone()].to_string()))
}

/// Result of resolving an `IF [NOT] EXISTS (...) THEN ...` guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuardResolution {
    /// The guard failed; nothing may be sent to the driver.
    pub suppressed: bool,
    /// The collapsed statement is CREATE-style, so an "already exists"
    /// driver error counts as zero rows affected.
    pub tolerate_existing: bool,
}

/// Recognizes `IF [NOT] EXISTS (check) THEN guarded` and resolves it by
/// running the check as an existence probe on the spot.
///
/// When the guard passes, the statement text collapses to the guarded part
/// and the check's leading share of parameters is dropped. When it fails,
/// the statement is marked suppressed. Text that merely resembles the
/// construct passes through untouched for the driver to judge.
pub fn resolve_if_exists(
    conn: &JetConnection,
    text: &mut String,
    params: &mut Vec<JetParameter>,
) -> Result<GuardResolution> {
    let parsed = IF_EXISTS_REGEX.captures(text.as_str()).map(|caps| {
        (
            caps.get(1).is_some(),
            caps.get(2).map(|m| m.as_str().trim().to_string()),
            caps.get(3).map(|m| m.as_str().trim().to_string()),
        )
    });
    let Some((negated, Some(check), Some(guarded))) = parsed else {
        return Ok(GuardResolution::default());
    };

    let check_count = parameters::placeholder_positions(&check).len();
    if check_count > params.len() {
        return Err(JetError::InconsistentPlaceholders(format!(
            "existence check references {check_count} parameters, only {} attached",
            params.len()
        )));
    }
    let found = conn.has_rows(&check, &params[..check_count])?;
    if negated == found {
        return Ok(GuardResolution {
            suppressed: true,
            tolerate_existing: false,
        });
    }
    params.drain(..check_count);
    let tolerate_existing = CREATE_REGEX.is_match(&guarded);
    *text = guarded;
    Ok(GuardResolution {
        suppressed: false,
        tolerate_existing,
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Global {
    Identity,
    RowCount,
}

impl Global {
    fn token(self) -> &'static str {
        match self {
            Global::Identity => IDENTITY_TOKEN,
            Global::RowCount => ROWCOUNT_TOKEN,
        }
    }
}

fn global_at(text: &str, offset: usize) -> Option<Global> {
    let bytes = text.as_bytes();
    for kind in [Global::Identity, Global::RowCount] {
        let token = kind.token();
        let end = offset + token.len();
        if end > bytes.len() || !bytes[offset..end].eq_ignore_ascii_case(token.as_bytes()) {
            continue;
        }
        // not part of a longer identifier
        match bytes.get(end) {
            Some(b) if b.is_ascii_alphanumeric() || *b == b'_' => continue,
            _ => return Some(kind),
        }
    }
    None
}

/// Replaces every unquoted `@@identity` and `@@rowcount` token with its
/// current value as a numeric literal.
///
/// `@@rowcount` reads the count the connection recorded from its last
/// data-modifying statement. `@@identity` runs the connection's identity
/// query once per statement, however many times the token occurs.
pub fn substitute_globals(conn: &JetConnection, text: &mut String) -> Result<()> {
    let hits: Vec<(usize, Global)> = scan::marker_positions(text, &['@'])
        .into_iter()
        .filter_map(|offset| global_at(text, offset).map(|kind| (offset, kind)))
        .collect();
    if hits.is_empty() {
        return Ok(());
    }
    let mut identity: Option<i64> = None;
    for &(offset, kind) in hits.iter().rev() {
        let value = match kind {
            Global::Identity => match identity {
                Some(value) => value,
                None => {
                    let fetched = conn.last_identity()?;
                    identity = Some(fetched);
                    fetched
                }
            },
            Global::RowCount => conn.row_count(),
        };
        text.replace_range(offset..offset + kind.token().len(), &value.to_string());
    }
    Ok(())
}

/// Folds every TOP argument into a plain integer literal, repeating until
/// nothing changes: parameter sums like `TOP (@a + @b)` first, then single
/// parameters, then literal sums. Each parameter marker folded away takes
/// its parameter out of the statement's list.
pub fn inline_top(text: &mut String, params: &mut Vec<JetParameter>) -> Result<()> {
    loop {
        if fold_param_sum(text, params)? {
            continue;
        }
        if fold_single_param(text, params)? {
            continue;
        }
        if fold_literal_sum(text)? {
            continue;
        }
        return Ok(());
    }
}

fn fold_param_sum(text: &mut String, params: &mut Vec<JetParameter>) -> Result<bool> {
    let Some((full, groups)) = find_match(&TOP_PARAM_SUM_REGEX, text, false) else {
        return Ok(false);
    };
    let Some(first) = groups.into_iter().flatten().next() else {
        return Ok(false);
    };
    let idx = placeholder_index_at(text, first.start)?;
    if idx + 2 > params.len() {
        return Err(JetError::InconsistentPlaceholders(format!(
            "TOP sum needs parameters {idx} and {}, only {} attached",
            idx + 1,
            params.len()
        )));
    }
    let total = parameters::integer_value(&params[idx])?
        .saturating_add(parameters::integer_value(&params[idx + 1])?);
    params.remove(idx);
    params.remove(idx);
    text.replace_range(full, &format!("TOP {total}"));
    Ok(true)
}

fn fold_single_param(text: &mut String, params: &mut Vec<JetParameter>) -> Result<bool> {
    let Some((full, groups)) = find_match(&TOP_PARAM_REGEX, text, false) else {
        return Ok(false);
    };
    let Some(arg) = groups.into_iter().flatten().next() else {
        return Ok(false);
    };
    let idx = placeholder_index_at(text, arg.start)?;
    if idx >= params.len() {
        return Err(JetError::InconsistentPlaceholders(format!(
            "TOP marker needs parameter {idx}, only {} attached",
            params.len()
        )));
    }
    let value = parameters::integer_value(&params[idx])?;
    params.remove(idx);
    text.replace_range(full, &format!("TOP {value}"));
    Ok(true)
}

fn fold_literal_sum(text: &mut String) -> Result<bool> {
    let Some((full, groups)) = find_match(&TOP_LITERAL_SUM_REGEX, text, false) else {
        return Ok(false);
    };
    let mut spans = groups.into_iter().flatten();
    let (Some(first), Some(second)) = (spans.next(), spans.next()) else {
        return Ok(false);
    };
    let total = parse_literal(text, &first)?.saturating_add(parse_literal(text, &second)?);
    text.replace_range(full, &format!("TOP {total}"));
    Ok(true)
}

/// Removes an outermost `SKIP n` clause and returns the number of leading
/// rows the reader must discard.
///
/// A parameter marker as the skip argument is consumed from the statement's
/// list. When the statement also carries a literal TOP, the TOP value is
/// raised by the skip so the window still ends at the same row after the
/// discard. Subquery SKIPs are left for the driver to reject.
pub fn extract_skip(text: &mut String, params: &mut Vec<JetParameter>) -> Result<i64> {
    let Some((full, groups)) = find_match(&SKIP_REGEX, text, true) else {
        return Ok(0);
    };
    let Some(arg) = groups.into_iter().flatten().next() else {
        return Ok(0);
    };
    let token = text[arg.clone()].to_string();
    let skip = if token == "?" || token.starts_with('@') {
        let idx = placeholder_index_at(text, arg.start)?;
        if idx >= params.len() {
            return Err(JetError::InconsistentPlaceholders(format!(
                "SKIP marker needs parameter {idx}, only {} attached",
                params.len()
            )));
        }
        let value = parameters::integer_value(&params[idx])?;
        params.remove(idx);
        value
    } else {
        token
            .parse::<i64>()
            .map_err(|_| JetError::type_mismatch("integer", token.clone()))?
    };
    text.replace_range(full, "");
    if skip > 0 {
        raise_top_literal(text, skip)?;
    }
    Ok(skip.max(0))
}

fn raise_top_literal(text: &mut String, delta: i64) -> Result<()> {
    let Some((full, groups)) = find_match(&TOP_LITERAL_REGEX, text, true) else {
        return Ok(());
    };
    let Some(num) = groups.into_iter().flatten().next() else {
        return Ok(());
    };
    let current = parse_literal(text, &num)?;
    text.replace_range(full, &format!("TOP {}", current.saturating_add(delta)));
    Ok(())
}

/// Translates an outermost `SELECT TOP n` into the driver's `LIMIT n`,
/// appended at the end of the statement. Runs after TOP inlining, so the
/// argument is always a literal by now. Subquery TOPs are left alone.
pub fn top_to_limit(text: &mut String) -> Result<()> {
    let Some((full, groups)) = find_match(&SELECT_TOP_REGEX, text, true) else {
        return Ok(());
    };
    let mut spans = groups.into_iter().flatten();
    let (Some(select), Some(num)) = (spans.next(), spans.next()) else {
        return Ok(());
    };
    let limit = parse_literal(text, &num)?;
    let select_word = text[select].to_string();
    text.replace_range(full, &format!("{select_word} "));
    let end = text.trim_end().len();
    text.truncate(end);
    text.push_str(&format!(" LIMIT {limit}"));
    Ok(())
}
