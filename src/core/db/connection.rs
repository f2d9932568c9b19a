/// Connection Management Module
///
/// The [`DatabaseHandler`] owns exactly one SQLite connection for its whole
/// lifetime. There is no pooling: re-opening happens only through an explicit
/// [`DatabaseHandler::reconnect`].

use crate::core::{DashError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use tracing::info;

/// Names accepted when strict identifier checking is on.
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Parameters needed to open the database.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectionParams {
    /// Path to the SQLite database file, or ":memory:"
    #[serde(default = "default_path")]
    pub path: String,
    /// Text encoding applied with `PRAGMA encoding` on a fresh database
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Create the database file when it does not exist
    #[serde(default = "default_create")]
    pub create_if_missing: bool,
    /// Reject table and column names that are not plain identifiers
    #[serde(default)]
    pub strict_identifiers: bool,
}

fn default_path() -> String {
    "tabledash.db".to_string()
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

fn default_create() -> bool {
    true
}

impl Default for ConnectionParams {
    fn default() -> Self {
        ConnectionParams {
            path: default_path(),
            encoding: default_encoding(),
            create_if_missing: default_create(),
            strict_identifiers: false,
        }
    }
}

impl ConnectionParams {
    /// Parameters for a private in-memory database
    pub fn in_memory() -> Self {
        ConnectionParams {
            path: ":memory:".to_string(),
            ..Default::default()
        }
    }

    fn open_flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

/// Owns the single connection and exposes table-level operations.
///
/// Schema operations live in `schema.rs`, reads and writes in `query.rs`.
#[derive(Debug)]
pub struct DatabaseHandler {
    conn: Option<Connection>,
    params: ConnectionParams,
}

impl DatabaseHandler {
    /// Opens a connection with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns `DashError::Database` when the file cannot be opened or the
    /// encoding pragma is rejected.
    pub fn connect(params: ConnectionParams) -> Result<Self> {
        let conn = open(&params)?;
        info!("Connected to database {}", params.path);
        Ok(DatabaseHandler {
            conn: Some(conn),
            params,
        })
    }

    /// Drops the current connection (if any) and opens a new one.
    pub fn reconnect(&mut self) -> Result<()> {
        self.conn = None;
        self.conn = Some(open(&self.params)?);
        info!("Reconnected to database {}", self.params.path);
        Ok(())
    }

    /// Closes the connection. Later operations fail with `NotConnected`.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Dropping closes as well; close() only adds the error report.
            if let Err((_, e)) = conn.close() {
                tracing::warn!("Error while closing database {}: {}", self.params.path, e);
            }
            info!("Closed connection to database {}", self.params.path);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub(crate) fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(DashError::NotConnected)
    }

    pub(crate) fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(DashError::NotConnected)
    }

    /// Applies strict identifier checking when it is enabled.
    ///
    /// Names are otherwise interpolated into SQL text exactly as given.
    pub(crate) fn check_identifier(&self, name: &str) -> Result<()> {
        if self.params.strict_identifiers && !IDENTIFIER.is_match(name) {
            return Err(DashError::InvalidIdentifier(name.to_string()));
        }
        Ok(())
    }
}

impl Drop for DatabaseHandler {
    fn drop(&mut self) {
        self.close();
    }
}

fn open(params: &ConnectionParams) -> Result<Connection> {
    let conn = Connection::open_with_flags(&params.path, params.open_flags())?;
    // Only takes effect before the first table is created.
    conn.execute_batch(&format!("PRAGMA encoding = '{}';", params.encoding))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DbErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_connect_in_memory() {
        let handler = DatabaseHandler::connect(ConnectionParams::in_memory()).unwrap();
        assert!(handler.is_connected());
    }

    #[test]
    fn test_close_then_operations_fail() {
        let mut handler = DatabaseHandler::connect(ConnectionParams::in_memory()).unwrap();
        handler.close();
        assert!(!handler.is_connected());
        assert!(matches!(handler.conn(), Err(DashError::NotConnected)));

        handler.reconnect().unwrap();
        assert!(handler.is_connected());
    }

    #[test]
    fn test_connection_error_handling() {
        let params = ConnectionParams {
            path: "/nonexistent/path/database.db".to_string(),
            ..Default::default()
        };
        let err = DatabaseHandler::connect(params).unwrap_err();
        assert_eq!(err.kind(), Some(DbErrorKind::Interface));
    }

    #[test]
    fn test_missing_file_without_create_fails() {
        let dir = TempDir::new().unwrap();
        let params = ConnectionParams {
            path: dir.path().join("absent.db").to_string_lossy().into_owned(),
            create_if_missing: false,
            ..Default::default()
        };
        assert!(DatabaseHandler::connect(params).is_err());
    }

    #[test]
    fn test_strict_identifiers() {
        let params = ConnectionParams {
            strict_identifiers: true,
            ..ConnectionParams::in_memory()
        };
        let handler = DatabaseHandler::connect(params).unwrap();
        assert!(handler.check_identifier("sensor_01").is_ok());
        assert!(matches!(
            handler.check_identifier("t; DROP TABLE x"),
            Err(DashError::InvalidIdentifier(_))
        ));

        let lax = DatabaseHandler::connect(ConnectionParams::in_memory()).unwrap();
        assert!(lax.check_identifier("t; DROP TABLE x").is_ok());
    }
}
