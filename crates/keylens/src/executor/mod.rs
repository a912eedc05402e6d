use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::guard::ValidatedSql;

/// Column names plus positional rows, in store order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SQL执行失败: {message}")]
pub struct ExecutionError {
    pub sql: String,
    /// The store's own error text.
    pub message: String,
}

impl ExecutionError {
    fn from_sqlite(sql: &ValidatedSql, error: &rusqlite::Error) -> Self {
        Self {
            sql: sql.as_str().to_string(),
            message: error.to_string(),
        }
    }
}

/// Runs validated statements. Implementations never inspect the SQL.
pub trait QueryExecutor {
    fn execute(&self, sql: &ValidatedSql) -> Result<QueryResult, ExecutionError>;
}

pub struct SqliteExecutor<'c> {
    connection: &'c Connection,
}

impl<'c> SqliteExecutor<'c> {
    #[must_use]
    pub fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }
}

impl QueryExecutor for SqliteExecutor<'_> {
    fn execute(&self, sql: &ValidatedSql) -> Result<QueryResult, ExecutionError> {
        let mut statement = self
            .connection
            .prepare(sql.as_str())
            .map_err(|error| ExecutionError::from_sqlite(sql, &error))?;
        let columns = statement
            .column_names()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        let mut rows = statement
            .query([])
            .map_err(|error| ExecutionError::from_sqlite(sql, &error))?;
        let mut result_rows = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|error| ExecutionError::from_sqlite(sql, &error))?
        {
            let mut record = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                let value = row
                    .get::<usize, SqlValue>(index)
                    .map_err(|error| ExecutionError::from_sqlite(sql, &error))?;
                record.push(json_value_from_sql(value));
            }
            result_rows.push(record);
        }

        Ok(QueryResult {
            columns,
            rows: result_rows,
        })
    }
}

fn json_value_from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => json!(value),
        SqlValue::Real(value) => json!(value),
        SqlValue::Text(value) => json!(value),
        SqlValue::Blob(value) => json!(encode_blob_hex(&value)),
    }
}

fn encode_blob_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push(HEX[(byte >> 4) as usize] as char);
        output.push(HEX[(byte & 0x0f) as usize] as char);
    }
    output
}
