use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::AppConfig;
use crate::fallback::missing_known_tables;
use crate::generate::PromptStrategy;
use crate::schema::introspect_schema;
use crate::server::{AppState, HttpBackends, ServerSettings, serve};
use crate::sqlite::open_read_only_connection;

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to listen on (default 127.0.0.1:5001).
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, value_enum, default_value_t = PromptStrategy::Translated)]
    pub prompt_strategy: PromptStrategy,
}

pub fn run(args: &ServeArgs, config: &AppConfig) -> Result<()> {
    // Probe the database once before binding.
    let connection = open_read_only_connection(&config.db_path)?;
    let schema = introspect_schema(&connection)?;
    drop(connection);
    let missing = missing_known_tables(&schema);
    if !missing.is_empty() {
        tracing::warn!(?missing, "event tables missing; today fallback will report errors");
    }
    tracing::info!(
        db = %config.db_path.display(),
        tables = schema.tables.len(),
        "database ready"
    );

    let state = AppState {
        settings: Arc::new(ServerSettings {
            db_path: config.db_path.clone(),
            default_strategy: args.prompt_strategy,
        }),
        backends: Arc::new(HttpBackends {
            llm: config.llm.clone(),
            translate: config.translate.clone(),
        }),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(serve(state, config.server.bind))
}
