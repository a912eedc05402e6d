use anyhow::Result;
use clap::Args;

use crate::config::AppConfig;
use crate::sqlite::{KNOWN_TABLES, create_event_tables, open_sqlite_connection};

#[derive(Debug, Clone, Args)]
pub struct InitArgs {}

pub fn run(_args: &InitArgs, config: &AppConfig) -> Result<()> {
    let connection = open_sqlite_connection(&config.db_path)?;
    create_event_tables(&connection)?;

    let names = KNOWN_TABLES
        .iter()
        .map(|table| table.name)
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "keylens: event tables ready ({names}) in {}",
        config.db_path.display()
    );
    Ok(())
}
