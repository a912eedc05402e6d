//! Diagnostic "what happened today" queries run after an empty primary result.

use time::{Date, OffsetDateTime};
use tracing::warn;

use crate::executor::{ExecutionError, QueryExecutor, QueryResult};
use crate::guard;
use crate::schema::SchemaDescription;
use crate::sqlite::{KNOWN_TABLES, KnownTable};

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSection {
    pub table: &'static str,
    pub label: &'static str,
    pub sql: String,
    pub outcome: Result<QueryResult, ExecutionError>,
}

/// Local calendar date, or UTC when the local offset cannot be determined.
#[must_use]
pub fn today_local() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// `yyyy-mm-dd`
#[must_use]
pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

#[must_use]
pub fn fallback_sql(table: &KnownTable, today: &str) -> String {
    format!("SELECT * FROM {} WHERE date = '{today}'", table.name)
}

/// Known tables absent from `schema`; their fallback sections will fail.
#[must_use]
pub fn missing_known_tables(schema: &SchemaDescription) -> Vec<&'static str> {
    KNOWN_TABLES
        .iter()
        .filter(|table| schema.table(table.name).is_none())
        .map(|table| table.name)
        .collect()
}

/// One section per known table. A failing table is reported in its own
/// section and never stops the others.
pub fn run_today_fallback(executor: &dyn QueryExecutor, today: Date) -> Vec<FallbackSection> {
    let today = format_date(today);

    KNOWN_TABLES
        .iter()
        .map(|table| {
            let sql = fallback_sql(table, &today);
            let outcome = guard::validate(&sql)
                .map_err(|blocked| ExecutionError {
                    sql: sql.clone(),
                    message: blocked.message,
                })
                .and_then(|validated| executor.execute(&validated));
            if let Err(error) = &outcome {
                warn!(table = table.name, error = %error.message, "fallback query failed");
            }

            FallbackSection {
                table: table.name,
                label: table.label,
                sql,
                outcome,
            }
        })
        .collect()
}
