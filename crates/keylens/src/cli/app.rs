use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{
    api_schema::ApiSchemaArgs, ask::AskArgs, init::InitArgs, repl::ReplArgs, schema::SchemaArgs,
    serve::ServeArgs,
};
use crate::config::ConfigOverrides;

#[derive(Debug, Parser)]
#[command(
    name = "keylens",
    version,
    about = "Ask natural-language questions about local keyboard and mouse stats"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    /// SQLite database with the event tables.
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[arg(long, global = true, value_name = "URL")]
    pub llm_endpoint: Option<String>,

    #[arg(long, global = true, value_name = "NAME")]
    pub model: Option<String>,

    #[arg(long, global = true, value_name = "SECS")]
    pub llm_timeout_secs: Option<u64>,
}

impl RuntimeArgs {
    #[must_use]
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            db_path: self.db.clone(),
            llm_endpoint: self.llm_endpoint.clone(),
            llm_model: self.model.clone(),
            llm_timeout_secs: self.llm_timeout_secs,
            bind: None,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive question loop.
    Repl(ReplArgs),
    /// Serve `POST /ai/ask`.
    Serve(ServeArgs),
    /// Answer one question and print a JSON envelope.
    Ask(AskArgs),
    /// Print the live schema description.
    Schema(SchemaArgs),
    /// Create the event tables if they are missing.
    Init(InitArgs),
    /// Print JSON Schema documents for the HTTP bodies.
    ApiSchema(ApiSchemaArgs),
}
