use thiserror::Error;

/// Failures raised by [`Store`](super::Store).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to create database directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("table '{0}' does not exist")]
    MissingTable(String),

    #[error("table '{table}' has columns {found:?}, expected {expected:?}")]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),
}
