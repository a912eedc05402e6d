use std::fmt::{Display, Formatter};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescription {
    pub name: String,
    pub declared_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnDescription>,
}

impl TableDescription {
    /// `表 <table>: <col> (<type>), ...`
    #[must_use]
    pub fn render_line(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| format!("{} ({})", column.name, column.declared_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("表 {}: {columns}", self.name)
    }
}

/// Live description of the store's user tables, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableDescription>,
}

impl SchemaDescription {
    #[must_use]
    pub fn render(&self) -> String {
        self.tables
            .iter()
            .map(TableDescription::render_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableDescription> {
        self.tables.iter().find(|table| table.name == name)
    }
}

impl Display for SchemaDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

pub fn introspect_schema(connection: &Connection) -> Result<SchemaDescription> {
    let mut statement = connection
        .prepare(
            "SELECT name
             FROM sqlite_schema
             WHERE type = 'table'
             ORDER BY rowid",
        )
        .context("failed to prepare sqlite_schema introspection query")?;

    let table_names = statement
        .query_map([], |row| row.get::<usize, String>(0))
        .context("failed to execute sqlite_schema introspection query")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to decode sqlite_schema row")?;

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        if is_internal_table(&name) {
            continue;
        }
        let columns = load_table_columns(connection, &name)?;
        tables.push(TableDescription { name, columns });
    }

    Ok(SchemaDescription { tables })
}

fn load_table_columns(
    connection: &Connection,
    table_name: &str,
) -> Result<Vec<ColumnDescription>> {
    let pragma_sql = format!("PRAGMA table_info({})", sqlite_single_quoted(table_name));
    let mut statement = connection
        .prepare(&pragma_sql)
        .with_context(|| format!("failed to prepare column introspection for `{table_name}`"))?;

    let column_rows = statement
        .query_map([], |row| {
            Ok(ColumnDescription {
                name: row.get::<usize, String>(1)?,
                declared_type: row.get::<usize, Option<String>>(2)?.unwrap_or_default(),
            })
        })
        .with_context(|| format!("failed to execute column introspection for `{table_name}`"))?;

    column_rows
        .map(|row| row.context("failed to decode schema column row"))
        .collect()
}

// sqlite_sequence and friends are bookkeeping, not data the model should query.
fn is_internal_table(table_name: &str) -> bool {
    table_name.starts_with("sqlite_")
}

fn sqlite_single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
