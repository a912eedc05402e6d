#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod generate;
pub mod guard;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod server;
pub mod sqlite;
pub mod summary;
pub mod translate;

pub use cli::app::{Cli, Command};
