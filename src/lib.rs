pub mod command;
pub mod connection;
pub mod parameters;
pub mod reader;
pub mod result;
pub mod rewrite;
pub mod scan;

// Re-export types for convenience
pub use command::{JetCommand, SubCommand};
pub use connection::{JetConfig, JetConnection, JetTransaction};
pub use parameters::{JetParameter, MarkerStyle, Placeholder};
pub use reader::JetDataReader;
pub use result::{JetError, Result};

// Re-export third-party types used in the public API to provide fallback for dependency conflicts
pub use rusqlite::Connection as SqliteConnection;
pub use serde_json::Value as JsonValue;
