use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use crate::config::AppConfig;
use crate::models::Envelope;
use crate::schema::introspect_schema;
use crate::sqlite::open_read_only_connection;

#[derive(Debug, Clone, Args)]
pub struct SchemaArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub fn run(args: &SchemaArgs, config: &AppConfig) -> Result<()> {
    let connection = open_read_only_connection(&config.db_path)?;
    let schema = introspect_schema(&connection)?;

    if args.json {
        let envelope = Envelope::ok("schema", json!({ "tables": schema.tables }))
            .with_meta("db_path", json!(config.db_path.display().to_string()))
            .with_meta("table_count", json!(schema.tables.len()));
        let encoded =
            serde_json::to_string_pretty(&envelope).context("failed to encode schema envelope")?;
        println!("{encoded}");
    } else {
        println!("{schema}");
    }

    Ok(())
}
