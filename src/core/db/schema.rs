/// Schema Introspection Module
///
/// Table discovery, column discovery, and the payload-to-SQL type mapping
/// used when a table is created from a payload.

use super::connection::DatabaseHandler;
use crate::core::Result;
use crate::payload::{Dtype, Payload};
use std::fmt;
use tracing::info;

/// SQL storage class emitted in `CREATE TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Float,
    Int,
    Varchar,
    DateTime,
    /// Fallback for any dtype without a dedicated class
    Text,
}

impl SqlType {
    pub fn as_sql(self) -> &'static str {
        match self {
            SqlType::Float => "FLOAT",
            SqlType::Int => "INT",
            SqlType::Varchar => "VARCHAR(255)",
            SqlType::DateTime => "DATETIME",
            SqlType::Text => "TEXT",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Maps a payload column type to its SQL storage class.
///
/// The mapping is lossy: reading the table back yields whatever the driver
/// reports for the stored values, not the original dtype.
pub fn dtype_to_sql(dtype: Dtype) -> SqlType {
    match dtype {
        Dtype::Float => SqlType::Float,
        Dtype::Int => SqlType::Int,
        Dtype::Object => SqlType::Varchar,
        Dtype::DateTime => SqlType::DateTime,
        _ => SqlType::Text,
    }
}

/// Builds the `CREATE TABLE` statement for a payload, e.g.
/// `CREATE TABLE demo (x FLOAT,label VARCHAR(255));`
pub fn create_table_sql(table: &str, payload: &Payload) -> String {
    let columns: Vec<String> = payload
        .columns()
        .iter()
        .zip(payload.dtypes())
        .map(|(name, dtype)| format!("{} {}", name, dtype_to_sql(*dtype)))
        .collect();
    format!("CREATE TABLE {} ({});", table, columns.join(","))
}

const LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

impl DatabaseHandler {
    /// Lists user tables in name order.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(LIST_TABLES_SQL)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        info!("Listed {} tables", names.len());
        Ok(names)
    }

    /// Lists a table's columns in declaration order.
    ///
    /// The probe statement is only prepared, never stepped, so no rows are
    /// fetched.
    pub fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        self.check_identifier(table)?;
        let conn = self.conn()?;
        let stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT 1", table))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        info!("Read {} columns of table {}", columns.len(), table);
        Ok(columns)
    }

    /// Creates a table whose columns and types follow the payload.
    pub fn create_table(&self, table: &str, payload: &Payload) -> Result<()> {
        self.check_identifier(table)?;
        for column in payload.columns() {
            self.check_identifier(column)?;
        }
        let sql = create_table_sql(table, payload);
        self.conn()?.execute_batch(&sql)?;
        info!("Created table {}: {}", table, sql);
        Ok(())
    }
}
