/// Query Execution Module
///
/// Reads tables into payloads and writes payloads into tables. Table and
/// column names go into the SQL text as given; only row values are bound as
/// parameters.

use super::connection::DatabaseHandler;
use crate::core::Result;
use crate::payload::{Payload, Value};
use rusqlite::params_from_iter;
use tracing::info;

/// Builds the `SELECT` for a full table or a column subset.
pub fn select_sql(table: &str, columns: Option<&[&str]>) -> String {
    match columns {
        Some(cols) if !cols.is_empty() => format!("SELECT {} FROM {}", cols.join(","), table),
        _ => format!("SELECT * FROM {}", table),
    }
}

/// Builds the batched insert statement, e.g.
/// `INSERT INTO demo (x,label) VALUES (?,?)`
pub fn insert_sql(table: &str, columns: &[String]) -> String {
    let placeholders = vec!["?"; columns.len()].join(",");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(","),
        placeholders
    )
}

impl DatabaseHandler {
    /// Reads a whole table, or only the named columns in the given order.
    ///
    /// Without a subset the column names come from the statement metadata;
    /// with one they are echoed back from the request.
    pub fn read_table(&self, table: &str, columns: Option<&[&str]>) -> Result<Payload> {
        self.check_identifier(table)?;
        if let Some(cols) = columns {
            for col in cols {
                self.check_identifier(col)?;
            }
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&select_sql(table, columns))?;
        let names: Vec<String> = match columns {
            Some(cols) if !cols.is_empty() => cols.iter().map(|c| c.to_string()).collect(),
            _ => stmt.column_names().into_iter().map(String::from).collect(),
        };
        let column_count = stmt.column_count();

        let rows = stmt
            .query_map([], |row| {
                (0..column_count)
                    .map(|i| row.get_ref(i).map(Value::from_sql_ref))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        info!("Read {} rows from table {}", rows.len(), table);
        Payload::new(names, rows)
    }

    /// Creates the table from the payload's columns, then inserts its rows.
    pub fn write_table(&mut self, table: &str, payload: &Payload) -> Result<()> {
        self.create_table(table, payload)?;
        let inserted = self.insert_rows(table, payload)?;
        info!("Wrote {} rows to new table {}", inserted, table);
        Ok(())
    }

    /// Appends the payload's rows to an existing table.
    ///
    /// Existing rows are never modified; this is an insert, not an upsert.
    pub fn update_table(&mut self, table: &str, payload: &Payload) -> Result<()> {
        let inserted = self.insert_rows(table, payload)?;
        info!("Appended {} rows to table {}", inserted, table);
        Ok(())
    }

    /// Drops the table.
    pub fn delete_table(&self, table: &str) -> Result<()> {
        self.check_identifier(table)?;
        self.conn()?.execute_batch(&format!("DROP TABLE {}", table))?;
        info!("Dropped table {}", table);
        Ok(())
    }

    /// Inserts every row with one prepared statement inside one transaction.
    fn insert_rows(&mut self, table: &str, payload: &Payload) -> Result<usize> {
        self.check_identifier(table)?;
        for column in payload.columns() {
            self.check_identifier(column)?;
        }

        let sql = insert_sql(table, payload.columns());
        let tx = self.conn_mut()?.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in payload.rows() {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(payload.row_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::ConnectionParams;
    use crate::core::{DashError, DbErrorKind};
    use crate::payload::Dtype;

    fn setup() -> DatabaseHandler {
        DatabaseHandler::connect(ConnectionParams::in_memory()).unwrap()
    }

    fn demo_payload() -> Payload {
        Payload::new(
            vec!["x".to_string(), "label".to_string()],
            vec![
                vec![Value::Float(1.5), Value::Text("a".into())],
                vec![Value::Float(2.5), Value::Text("b".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_statement_shapes() {
        assert_eq!(
            insert_sql("demo", &["x".to_string(), "label".to_string()]),
            "INSERT INTO demo (x,label) VALUES (?,?)"
        );
        assert_eq!(select_sql("demo", None), "SELECT * FROM demo");
        assert_eq!(select_sql("demo", Some(&["label", "x"])), "SELECT label,x FROM demo");
        assert_eq!(select_sql("demo", Some(&[])), "SELECT * FROM demo");
    }

    #[test]
    fn test_write_then_read() {
        let mut handler = setup();
        handler.write_table("demo", &demo_payload()).unwrap();

        let read = handler.read_table("demo", None).unwrap();
        assert_eq!(read.columns(), &["x", "label"]);
        assert_eq!(read.row_count(), 2);
        assert_eq!(read.rows()[1], vec![Value::Float(2.5), Value::Text("b".into())]);
        assert_eq!(read.dtypes(), &[Dtype::Float, Dtype::Object]);
    }

    #[test]
    fn test_read_column_subset_in_requested_order() {
        let mut handler = setup();
        handler.write_table("demo", &demo_payload()).unwrap();

        let read = handler.read_table("demo", Some(&["label", "x"])).unwrap();
        assert_eq!(read.columns(), &["label", "x"]);
        assert_eq!(read.rows()[0], vec![Value::Text("a".into()), Value::Float(1.5)]);
    }

    #[test]
    fn test_update_appends_rows() {
        let mut handler = setup();
        handler.write_table("demo", &demo_payload()).unwrap();
        handler.update_table("demo", &demo_payload()).unwrap();

        let read = handler.read_table("demo", None).unwrap();
        assert_eq!(read.row_count(), 4);
        assert_eq!(read.rows()[0], read.rows()[2]);
    }

    #[test]
    fn test_update_missing_table_fails() {
        let mut handler = setup();
        let err = handler.update_table("nowhere", &demo_payload()).unwrap_err();
        assert_eq!(err.kind(), Some(DbErrorKind::Programming));
    }

    #[test]
    fn test_delete_table() {
        let mut handler = setup();
        handler.write_table("demo", &demo_payload()).unwrap();
        handler.delete_table("demo").unwrap();

        assert!(!handler.list_tables().unwrap().contains(&"demo".to_string()));
        let err = handler.read_table("demo", None).unwrap_err();
        assert!(matches!(err, DashError::Database(_)));
    }

    #[test]
    fn test_bool_and_null_values_round_trip() {
        let mut handler = setup();
        let payload = Payload::new(
            vec!["flag".to_string(), "n".to_string()],
            vec![
                vec![Value::Bool(true), Value::Int(1)],
                vec![Value::Bool(false), Value::Null],
            ],
        )
        .unwrap();
        handler.write_table("flags", &payload).unwrap();

        // TEXT affinity stores the bound integer as text.
        let read = handler.read_table("flags", None).unwrap();
        assert_eq!(read.rows()[0][0], Value::Text("1".into()));
        assert_eq!(read.rows()[1][1], Value::Null);
    }

    #[test]
    fn test_operations_after_close() {
        let mut handler = setup();
        handler.close();
        assert!(matches!(handler.list_tables(), Err(DashError::NotConnected)));
        assert!(matches!(
            handler.write_table("demo", &demo_payload()),
            Err(DashError::NotConnected)
        ));
    }
}
