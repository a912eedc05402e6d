use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags};

pub const NORMAL_KEYS_TABLE: &str = "normal_keys";
pub const SHORTCUT_KEYS_TABLE: &str = "shortcut_keys";
pub const MOUSE_EVENTS_TABLE: &str = "mouse_events";

/// One of the three append-only event tables written by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownTable {
    pub name: &'static str,
    pub label: &'static str,
}

pub const KNOWN_TABLES: &[KnownTable] = &[
    KnownTable {
        name: NORMAL_KEYS_TABLE,
        label: "普通按键",
    },
    KnownTable {
        name: SHORTCUT_KEYS_TABLE,
        label: "组合键",
    },
    KnownTable {
        name: MOUSE_EVENTS_TABLE,
        label: "鼠标点击",
    },
];

const CREATE_NORMAL_KEYS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS normal_keys (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    date TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (key, date),
    CHECK (count >= 0)
);
"#;

const CREATE_SHORTCUT_KEYS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS shortcut_keys (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    combination TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    date TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (combination, date),
    CHECK (count >= 0)
);
"#;

const CREATE_MOUSE_EVENTS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS mouse_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    button TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    date TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (button, date),
    CHECK (count >= 0)
);
"#;

#[must_use]
pub fn event_table_statements() -> &'static [&'static str] {
    &[
        CREATE_NORMAL_KEYS_TABLE_SQL,
        CREATE_SHORTCUT_KEYS_TABLE_SQL,
        CREATE_MOUSE_EVENTS_TABLE_SQL,
    ]
}

#[must_use]
pub fn create_event_tables_sql() -> String {
    event_table_statements().join("\n")
}

/// Opens (and creates if needed) a writable database. Only `init` and test
/// fixtures use this; the question pipeline always goes through
/// [`open_read_only_connection`].
pub fn open_sqlite_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create sqlite parent directory: {}",
                parent.display()
            )
        })?;
    }

    Connection::open(path)
        .with_context(|| format!("failed to open sqlite database: {}", path.display()))
}

pub fn open_read_only_connection(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        bail!("sqlite database does not exist: {}", path.display());
    }

    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| {
        format!(
            "failed to open sqlite database read-only: {}",
            path.display()
        )
    })
}

pub fn create_event_tables(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(&create_event_tables_sql())
        .context("failed to create event tables")
}
