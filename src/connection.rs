use std::cell::Cell;
use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};

use crate::{
    command::JetCommand,
    parameters::{self, JetParameter, MarkerStyle},
    result::{JetError, Result},
};

fn default_identity_query() -> String {
    "SELECT last_insert_rowid()".to_string()
}

/// Connection-level options, deserializable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JetConfig {
    /// Marker convention of the simulated driver.
    #[serde(default)]
    pub marker_style: MarkerStyle,
    /// Scalar query answering `@@identity` substitutions.
    #[serde(default = "default_identity_query")]
    pub identity_query: String,
}

impl Default for JetConfig {
    fn default() -> Self {
        JetConfig {
            marker_style: MarkerStyle::Named,
            identity_query: default_identity_query(),
        }
    }
}

impl JetConfig {
    /// Load configuration from a JSON value
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(json)?)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// A database connection carrying the session state the dialect needs:
/// the rows-affected count of the last data-modifying statement and the
/// side-channel query used to answer `@@identity`.
///
/// The connection is single-threaded; commands created from it borrow it
/// for their whole life.
#[derive(Debug)]
pub struct JetConnection {
    conn: rusqlite::Connection,
    config: JetConfig,
    row_count: Cell<i64>,
}

impl JetConnection {
    /// Wraps an already-open SQLite connection.
    pub fn new(conn: rusqlite::Connection, config: JetConfig) -> Self {
        JetConnection {
            conn,
            config,
            row_count: Cell::new(0),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, JetConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: JetConfig) -> Result<Self> {
        Ok(Self::new(rusqlite::Connection::open(path)?, config))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(JetConfig::default())
    }

    pub fn open_in_memory_with(config: JetConfig) -> Result<Self> {
        Ok(Self::new(rusqlite::Connection::open_in_memory()?, config))
    }

    /// Creates a command bound to this connection.
    pub fn command(&self, text: impl Into<String>) -> JetCommand<'_> {
        JetCommand::new(self, text)
    }

    pub fn config(&self) -> &JetConfig {
        &self.config
    }

    pub fn marker_style(&self) -> MarkerStyle {
        self.config.marker_style
    }

    /// Rows affected by the last data-modifying statement executed through a
    /// command on this connection. This is the value `@@rowcount` reports.
    pub fn row_count(&self) -> i64 {
        self.row_count.get()
    }

    pub(crate) fn set_row_count(&self, count: i64) {
        self.row_count.set(count);
    }

    /// Runs the configured identity query. Called at most once per statement
    /// rewrite no matter how many times `@@identity` occurs in it.
    pub(crate) fn last_identity(&self) -> Result<i64> {
        let value = self
            .conn
            .query_row(&self.config.identity_query, [], |row| row.get::<_, i64>(0))?;
        Ok(value)
    }

    /// Handle for interrupting a long-running statement from another thread.
    pub fn interrupt_handle(&self) -> rusqlite::InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// The underlying SQLite connection.
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Opens a transaction; dropping the guard without committing rolls back.
    pub fn begin_transaction(&self) -> Result<JetTransaction<'_>> {
        JetTransaction::begin(self)
    }

    /// Executes one fully rewritten statement for its side effects and
    /// returns the driver's rows-affected count. Statements that produce
    /// result columns are stepped to completion instead and report zero.
    pub(crate) fn run_non_query(&self, text: &str, params: &[JetParameter]) -> Result<usize> {
        let args = bind_args(text, params)?;
        let mut stmt = self.conn.prepare(text)?;
        if stmt.column_count() > 0 {
            let mut rows = match args {
                BindArgs::Positional(values) => stmt.query(params_from_iter(values))?,
                BindArgs::Named(pairs) => {
                    let named = named_slice(&pairs);
                    stmt.query(&named[..])?
                }
            };
            while rows.next()?.is_some() {}
            return Ok(0);
        }
        let changed = match args {
            BindArgs::Positional(values) => stmt.execute(params_from_iter(values))?,
            BindArgs::Named(pairs) => {
                let named = named_slice(&pairs);
                stmt.execute(&named[..])?
            }
        };
        Ok(changed)
    }

    /// Executes one fully rewritten statement and materializes its complete
    /// result: column names plus every row as JSON values.
    pub(crate) fn run_query(
        &self,
        text: &str,
        params: &[JetParameter],
    ) -> Result<(Vec<String>, Vec<Vec<serde_json::Value>>)> {
        let args = bind_args(text, params)?;
        let mut stmt = self.conn.prepare(text)?;
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut rows = match args {
            BindArgs::Positional(values) => stmt.query(params_from_iter(values))?,
            BindArgs::Named(pairs) => {
                let named = named_slice(&pairs);
                stmt.query(&named[..])?
            }
        };
        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                record.push(crate::reader::value_ref_to_json(row.get_ref(idx)?));
            }
            data.push(record);
        }
        Ok((columns, data))
    }

    /// Whether the statement yields at least one row. Steps once, so an
    /// existence check never drains a large result.
    pub(crate) fn has_rows(&self, text: &str, params: &[JetParameter]) -> Result<bool> {
        let args = bind_args(text, params)?;
        let mut stmt = self.conn.prepare(text)?;
        let mut rows = match args {
            BindArgs::Positional(values) => stmt.query(params_from_iter(values))?,
            BindArgs::Named(pairs) => {
                let named = named_slice(&pairs);
                stmt.query(&named[..])?
            }
        };
        Ok(rows.next()?.is_some())
    }
}

#[derive(Debug)]
enum BindArgs {
    Positional(Vec<SqlValue>),
    Named(Vec<(String, SqlValue)>),
}

/// Pairs every marker left in the statement with its parameter. The marker
/// scan decides the binding mode, so a statement whose markers were rewritten
/// to `?` binds positionally even when its parameters carry names.
fn bind_args(text: &str, params: &[JetParameter]) -> Result<BindArgs> {
    let placeholders = parameters::placeholder_positions(text);
    if placeholders.len() != params.len() {
        return Err(JetError::InconsistentPlaceholders(format!(
            "statement has {} parameter markers but {} parameters attached",
            placeholders.len(),
            params.len()
        )));
    }
    if placeholders.iter().any(|ph| ph.name.is_some()) {
        let mut pairs = Vec::with_capacity(params.len());
        for (ph, param) in placeholders.iter().zip(params) {
            let name = match ph.name.as_deref() {
                Some(name) => name,
                None => return Err(JetError::MixedPlaceholderStyles),
            };
            pairs.push((format!("@{name}"), parameters::sql_value(&param.value)?));
        }
        Ok(BindArgs::Named(pairs))
    } else {
        let values = params
            .iter()
            .map(|p| parameters::sql_value(&p.value))
            .collect::<Result<Vec<_>>>()?;
        Ok(BindArgs::Positional(values))
    }
}

fn named_slice(pairs: &[(String, SqlValue)]) -> Vec<(&str, &dyn rusqlite::ToSql)> {
    pairs
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn rusqlite::ToSql))
        .collect()
}

/// RAII transaction guard. SQLite on Jet semantics: explicit commit, implicit
/// rollback on drop.
pub struct JetTransaction<'conn> {
    conn: &'conn JetConnection,
    finished: bool,
}

impl<'conn> JetTransaction<'conn> {
    fn begin(conn: &'conn JetConnection) -> Result<Self> {
        conn.raw().execute_batch("BEGIN")?;
        Ok(JetTransaction {
            conn,
            finished: false,
        })
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.raw().execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.raw().execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for JetTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // a rollback failure during drop has nowhere to report to
            let _ = self.conn.raw().execute_batch("ROLLBACK");
        }
    }
}
