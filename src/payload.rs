//! In-memory tabular data exchanged between uploads, the database handler,
//! and the dashboard.
//!
//! A [`Payload`] is a list of named columns, one [`Dtype`] per column, and
//! rows of [`Value`]s. The optional row index carries labels for display
//! only; it is never written to the database.

use std::fmt;

use chrono::NaiveDateTime;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

use crate::core::{DashError, Result};

/// Format used when a datetime is written to or shown from the database.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Runtime type of a non-null value.
    pub fn dtype(&self) -> Option<Dtype> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(Dtype::Int),
            Value::Float(_) => Some(Dtype::Float),
            Value::Bool(_) => Some(Dtype::Bool),
            Value::Text(_) => Some(Dtype::Object),
            Value::DateTime(_) => Some(Dtype::DateTime),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used by the plot.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Converts a SQLite value read back from a table.
    pub fn from_sql_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Text(format!("<BLOB: {} bytes>", b.len())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Text(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(*b as i64)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::DateTime(dt) => ToSqlOutput::from(dt.format(DATETIME_FORMAT).to_string()),
        })
    }
}

/// Runtime type of a payload column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Int,
    Float,
    Bool,
    /// Strings and mixed content
    Object,
    DateTime,
}

impl Dtype {
    pub fn is_numeric(self) -> bool {
        matches!(self, Dtype::Int | Dtype::Float)
    }

    /// Infers a column type from its values.
    ///
    /// Integers with nulls widen to float; integers mixed with floats widen
    /// to float; anything heterogeneous, and an all-null column, is object.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Dtype {
        let mut seen: Option<Dtype> = None;
        let mut has_null = false;
        for value in values {
            let Some(dtype) = value.dtype() else {
                has_null = true;
                continue;
            };
            seen = Some(match (seen, dtype) {
                (None, d) => d,
                (Some(a), b) if a == b => a,
                (Some(Dtype::Int), Dtype::Float) | (Some(Dtype::Float), Dtype::Int) => Dtype::Float,
                _ => return Dtype::Object,
            });
        }
        match seen {
            Some(Dtype::Int) if has_null => Dtype::Float,
            Some(d) => d,
            None => Dtype::Object,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dtype::Int => "int64",
            Dtype::Float => "float64",
            Dtype::Bool => "bool",
            Dtype::Object => "object",
            Dtype::DateTime => "datetime64",
        };
        write!(f, "{}", name)
    }
}

/// A table in memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    columns: Vec<String>,
    dtypes: Vec<Dtype>,
    rows: Vec<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<Vec<String>>,
}

impl Payload {
    /// Builds a payload, inferring one dtype per column.
    ///
    /// Every row must have exactly one value per column. Values of a column
    /// inferred as float are widened so values and dtype agree.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DashError::Validation(format!(
                    "Row {} has {} values, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }

        let dtypes: Vec<Dtype> = (0..columns.len())
            .map(|c| Dtype::infer(rows.iter().map(|row| &row[c])))
            .collect();

        let mut rows = rows;
        for row in rows.iter_mut() {
            for (value, dtype) in row.iter_mut().zip(&dtypes) {
                if *dtype == Dtype::Float {
                    if let Value::Int(i) = *value {
                        *value = Value::Float(i as f64);
                    }
                }
            }
        }

        Ok(Payload {
            columns,
            dtypes,
            rows,
            index: None,
        })
    }

    /// Attaches row labels. The label count must match the row count.
    pub fn with_index(mut self, index: Vec<String>) -> Result<Self> {
        if index.len() != self.rows.len() {
            return Err(DashError::Validation(format!(
                "Index has {} labels for {} rows",
                index.len(),
                self.rows.len()
            )));
        }
        self.index = Some(index);
        Ok(self)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn dtypes(&self) -> &[Dtype] {
        &self.dtypes
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Label for row `i`: the index label when present, else its position.
    pub fn index_label(&self, i: usize) -> String {
        match &self.index {
            Some(labels) => labels.get(i).cloned().unwrap_or_default(),
            None => i.to_string(),
        }
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn dtype_of(&self, name: &str) -> Option<Dtype> {
        self.column_position(name).map(|i| self.dtypes[i])
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let pos = self.column_position(name)?;
        Some(self.rows.iter().map(|row| &row[pos]).collect())
    }

    /// Names of the columns that can be plotted.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .zip(&self.dtypes)
            .filter(|(_, d)| d.is_numeric())
            .map(|(c, _)| c.as_str())
            .collect()
    }

    /// The final row as a record, if any.
    pub fn last_record(&self) -> Option<Record> {
        let row = self.rows.last()?;
        Some(Record {
            fields: self
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        })
    }
}

/// One row keyed by column name, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
