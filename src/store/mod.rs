//! Embedded tabular store backed by a single SQLite file.
//!
//! Tables are append-only. A table is created from its row type's fixed
//! schema the first time a non-empty batch is appended; later appends must
//! find exactly the same columns.

mod error;
mod schema;

pub use error::StoreError;
pub use schema::{Column, Record, format_timestamp};

use rusqlite::{Connection, params, params_from_iter};
use std::path::Path;
use tracing::{debug, info};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Checks that `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn validate_table_name(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_names<R: Record>() -> Vec<String> {
    R::COLUMNS.iter().map(|c| c.name.to_string()).collect()
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (or creates) the database file at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened database");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Whether `table` exists. Table names compare case-insensitively, as
    /// SQLite resolves them.
    pub fn exists(&self, table: &str) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> StoreResult<usize> {
        validate_table_name(table)?;
        if !self.exists(table)? {
            return Err(StoreError::MissingTable(table.to_string()));
        }

        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Column names of an existing table, in declaration order.
    pub fn columns(&self, table: &str) -> StoreResult<Vec<String>> {
        validate_table_name(table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Creates `table` with `R`'s schema if it is missing, otherwise checks
    /// that the existing columns match.
    pub fn ensure_table<R: Record>(&self, table: &str) -> StoreResult<()> {
        validate_table_name(table)?;

        if self.exists(table)? {
            return self.check_schema::<R>(table);
        }

        let columns = R::COLUMNS
            .iter()
            .map(|c| format!("{} {}", quote_ident(c.name), c.sql_type))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute(
            &format!("CREATE TABLE {} ({})", quote_ident(table), columns),
            [],
        )?;

        info!(table, "Created table");
        Ok(())
    }

    fn check_schema<R: Record>(&self, table: &str) -> StoreResult<()> {
        let found = self.columns(table)?;
        let expected = column_names::<R>();
        if found != expected {
            return Err(StoreError::SchemaMismatch {
                table: table.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Appends `rows` to `table` in a single transaction and returns how many
    /// were written. An empty batch touches nothing.
    pub fn append<R: Record>(&mut self, table: &str, rows: &[R]) -> StoreResult<usize> {
        if rows.is_empty() {
            debug!(table, "Empty batch, nothing to append");
            return Ok(0);
        }

        self.ensure_table::<R>(table)?;

        let placeholders = (1..=R::COLUMNS.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let names = R::COLUMNS
            .iter()
            .map(|c| quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names,
            placeholders
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.to_values()))?;
            }
        }
        tx.commit()?;

        info!(table, rows = rows.len(), "Appended rows");
        Ok(rows.len())
    }

    /// Reads every row of `table` in insertion order.
    pub fn read<R: Record>(&self, table: &str) -> StoreResult<Vec<R>> {
        validate_table_name(table)?;
        if !self.exists(table)? {
            return Err(StoreError::MissingTable(table.to_string()));
        }
        self.check_schema::<R>(table)?;

        let names = R::COLUMNS
            .iter()
            .map(|c| quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY rowid",
            names,
            quote_ident(table)
        ))?;

        let rows = stmt
            .query_map([], |row| R::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
