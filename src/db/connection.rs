use log::info;
use rusqlite::Connection;
use std::cell::RefCell;
use std::fs;

use crate::errors::{EtlError, Result};

/// One logical store ("source" or "destination") backed by a SQLite file.
/// The connection is opened lazily on first use and kept for the lifetime
/// of the handle, so `:memory:` databases survive between calls.
pub struct Database {
    label: String,
    path: String,
    conn: RefCell<Option<Connection>>,
}

impl Database {
    pub fn new(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            conn: RefCell::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Provides a mutable connection to the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut slot = self.conn.try_borrow_mut().map_err(|_| {
            EtlError::storage(format!("{} database connection is already in use", self.label))
        })?;

        if slot.is_none() {
            let conn = Connection::open(&self.path).map_err(|e| {
                EtlError::storage(format!(
                    "Open {} database at {} failed: {e}",
                    self.label, self.path
                ))
            })?;
            *slot = Some(conn);
        }

        match slot.as_mut() {
            Some(conn) => f(conn),
            None => Err(EtlError::storage("connection slot empty after open")),
        }
    }
}

/// Initialize database from a SQL schema file
pub fn init_db(db: &Database, schema_path: &str) -> Result<()> {
    let schema_sql = fs::read_to_string(schema_path).map_err(|e| {
        EtlError::storage(format!("Failed to read schema file {schema_path}: {e}"))
    })?;

    db.with_conn(|conn| {
        conn.execute_batch(&schema_sql)?;
        Ok(())
    })?;

    info!(
        "{} database initialized from {}",
        db.label(),
        schema_path
    );
    Ok(())
}
