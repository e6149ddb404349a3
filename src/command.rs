use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    connection::JetConnection,
    parameters::{self, JetParameter},
    reader::JetDataReader,
    result::{JetError, Result},
    rewrite, scan,
};

// Regexes compiled once as lazy statics
static CREATE_PROCEDURE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*create\s+procedure\b").unwrap());
static EXEC_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*exec(ute)?\b").unwrap());
static DML_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(insert|update|delete)\b").unwrap());

/// One single-statement slice of a logical command, carrying its own share
/// of the resolved parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SubCommand {
    pub text: String,
    pub parameters: Vec<JetParameter>,
}

/// Drops every line whose first non-whitespace characters are `--`.
pub fn strip_line_comments(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits expanded command text on unquoted semicolons and deals each
/// statement its parameters in marker order.
///
/// `CREATE PROCEDURE` bodies keep no parameters: their markers' share is
/// consumed and discarded. An `EXEC` statement takes everything still
/// undealt. Empty slices between semicolons produce no sub-command.
pub fn split_statements(text: &str, parameters: &[JetParameter]) -> Vec<SubCommand> {
    let text = strip_line_comments(text);
    let mut pool: std::collections::VecDeque<JetParameter> = parameters.iter().cloned().collect();

    let mut ranges = Vec::new();
    let mut start = 0;
    for delimiter in scan::marker_positions(&text, &[';']) {
        ranges.push((start, delimiter));
        start = delimiter + 1;
    }
    ranges.push((start, text.len()));

    let mut subs = Vec::new();
    for (from, to) in ranges {
        let statement = text[from..to].trim();
        if statement.is_empty() {
            continue;
        }
        let marker_count = parameters::placeholder_positions(statement).len();
        if CREATE_PROCEDURE_REGEX.is_match(statement) {
            for _ in 0..marker_count {
                pool.pop_front();
            }
            subs.push(SubCommand {
                text: statement.to_string(),
                parameters: Vec::new(),
            });
        } else if EXEC_REGEX.is_match(statement) {
            subs.push(SubCommand {
                text: statement.to_string(),
                parameters: pool.drain(..).collect(),
            });
        } else {
            let take = marker_count.min(pool.len());
            let share = pool.drain(..take).collect();
            subs.push(SubCommand {
                text: statement.to_string(),
                parameters: share,
            });
        }
    }
    subs
}

/// A logical command: SQL text in the emulated dialect plus bound
/// parameters, tied to the connection it executes against.
///
/// Execution re-derives everything from the current text and bindings, so a
/// command can be edited and executed again; the bound parameter list is
/// never consumed.
#[derive(Debug, Clone)]
pub struct JetCommand<'conn> {
    conn: &'conn JetConnection,
    text: String,
    parameters: Vec<JetParameter>,
}

enum SubOutcome {
    /// Rows affected, with guard suppression and tolerated "already exists"
    /// both counting as zero.
    Rows(i64),
    /// Statement was not data-modifying.
    NonDml,
}

enum Rewritten {
    Execute { skip: i64, tolerate_existing: bool },
    Suppressed,
}

impl<'conn> JetCommand<'conn> {
    pub(crate) fn new(conn: &'conn JetConnection, text: impl Into<String>) -> Self {
        JetCommand {
            conn,
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn parameters(&self) -> &[JetParameter] {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Vec<JetParameter> {
        &mut self.parameters
    }

    /// Binds a named parameter; the name may carry its `@` sigil or not.
    pub fn param(&mut self, name: &str, value: impl Into<serde_json::Value>) -> &mut Self {
        self.parameters.push(JetParameter::named(name, value));
        self
    }

    /// Binds the next positional parameter.
    pub fn positional(&mut self, value: impl Into<serde_json::Value>) -> &mut Self {
        self.parameters.push(JetParameter::positional(value));
        self
    }

    /// Executes every statement in the command for its side effects.
    ///
    /// Returns the rows-affected count of the last INSERT, UPDATE or DELETE
    /// in the batch, or -1 when the batch held no data-modifying statement
    /// at all. An empty command is a no-op reporting 0.
    pub fn execute_non_query(&mut self) -> Result<i64> {
        let subs = self.prepare_subs()?;
        if subs.is_empty() {
            return Ok(0);
        }
        let mut last_dml = None;
        for mut sub in subs {
            if let SubOutcome::Rows(count) = self.run_sub(&mut sub)? {
                last_dml = Some(count);
            }
        }
        Ok(last_dml.unwrap_or(-1))
    }

    /// Executes the command and surfaces the final statement's rows.
    ///
    /// Every statement before the last runs as a non-query; only the last
    /// one's result is materialized into the returned reader.
    pub fn execute_reader(&mut self) -> Result<JetDataReader> {
        let mut subs = self.prepare_subs()?;
        let Some(mut last) = subs.pop() else {
            return Ok(JetDataReader::empty());
        };
        for mut sub in subs {
            self.run_sub(&mut sub)?;
        }
        match self.rewrite_sub(&mut last)? {
            Rewritten::Suppressed => Ok(JetDataReader::empty()),
            Rewritten::Execute {
                skip,
                tolerate_existing,
            } => match self.conn.run_query(&last.text, &last.parameters) {
                Ok((columns, rows)) => {
                    Ok(JetDataReader::new(columns, rows, skip.max(0) as usize))
                }
                Err(JetError::Sqlite(e)) if tolerate_existing && already_exists(&e) => {
                    Ok(JetDataReader::empty())
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Executes the command and returns the first column of the first row of
    /// the final statement's result, or `None` when there is no row.
    pub fn execute_scalar(&mut self) -> Result<Option<serde_json::Value>> {
        let mut reader = self.execute_reader()?;
        Ok(reader.next().and_then(|row| row.into_iter().next()))
    }

    fn prepare_subs(&self) -> Result<Vec<SubCommand>> {
        let (text, resolved) =
            parameters::expand(&self.text, &self.parameters, self.conn.marker_style())?;
        Ok(split_statements(&text, &resolved))
    }

    /// Rewrite battery applied to one statement immediately before its
    /// execution: guard, globals, TOP, SKIP, LIMIT. Runs per statement
    /// because globals and the guard probe read connection state that
    /// earlier statements in the same batch may have just changed.
    fn rewrite_sub(&self, sub: &mut SubCommand) -> Result<Rewritten> {
        let guard = rewrite::resolve_if_exists(self.conn, &mut sub.text, &mut sub.parameters)?;
        if guard.suppressed {
            return Ok(Rewritten::Suppressed);
        }
        rewrite::substitute_globals(self.conn, &mut sub.text)?;
        rewrite::inline_top(&mut sub.text, &mut sub.parameters)?;
        let skip = rewrite::extract_skip(&mut sub.text, &mut sub.parameters)?;
        rewrite::top_to_limit(&mut sub.text)?;
        Ok(Rewritten::Execute {
            skip,
            tolerate_existing: guard.tolerate_existing,
        })
    }

    fn run_sub(&self, sub: &mut SubCommand) -> Result<SubOutcome> {
        let rewritten = self.rewrite_sub(sub)?;
        let tolerate_existing = match rewritten {
            Rewritten::Suppressed => return Ok(SubOutcome::Rows(0)),
            Rewritten::Execute {
                tolerate_existing, ..
            } => tolerate_existing,
        };
        let dml = DML_REGEX.is_match(&sub.text);
        match self.conn.run_non_query(&sub.text, &sub.parameters) {
            Ok(changed) => {
                if dml {
                    self.conn.set_row_count(changed as i64);
                    Ok(SubOutcome::Rows(changed as i64))
                } else {
                    Ok(SubOutcome::NonDml)
                }
            }
            Err(JetError::Sqlite(e)) if tolerate_existing && already_exists(&e) => {
                Ok(SubOutcome::Rows(0))
            }
            Err(e) => Err(e),
        }
    }
}

fn already_exists(error: &rusqlite::Error) -> bool {
    error.to_string().to_lowercase().contains("already exists")
}
