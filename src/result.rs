use thiserror::Error;

/// Main error type for the jetbridge library.
///
/// Driver failures pass through as [`JetError::Sqlite`] with the native
/// message intact; the remaining variants are usage errors raised before
/// anything reaches the driver.
#[derive(Error, Debug)]
pub enum JetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("placeholder count mismatch: {placeholders} '?' markers, {supplied} parameters supplied")]
    PlaceholderCountMismatch { placeholders: usize, supplied: usize },
    #[error("inconsistent placeholder naming: command mixes @named and ? positional markers")]
    MixedPlaceholderStyles,
    #[error("parameter not provided: {0}")]
    ParameterNotProvided(String),
    #[error("parameter type mismatch: expected {expected}, got {got}")]
    ParameterTypeMismatch { expected: String, got: String },
    #[error("parameters do not line up with placeholders: {0}")]
    InconsistentPlaceholders(String),
}

impl JetError {
    pub(crate) fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        JetError::ParameterTypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

/// Type alias for Results using JetError
pub type Result<T> = std::result::Result<T, JetError>;
