#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use clap::error::ErrorKind;
use keylens::cli::app::{Cli, Command, RuntimeArgs};
use keylens::cli::commands;
use keylens::config::{AppConfig, ConfigOverrides};
use keylens::models::EnvelopeCommandFailure;
use tracing_subscriber::EnvFilter;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_BLOCKED: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };
    init_tracing(&cli.command);
    let command_name = command_name(&cli.command);
    tracing::debug!(command = command_name, "starting");

    match execute(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(error) => {
            let exit_code = classify_runtime_error(&error);
            match error.downcast_ref::<EnvelopeCommandFailure>() {
                Some(failure) => println!("{failure}"),
                None => eprintln!("keylens: `{command_name}` failed: {error:#}"),
            }
            exit_code
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Repl(args) => {
            let config = resolve_config(&cli.runtime, cli.runtime.config_overrides())?;
            commands::repl::run(&args, &config)
        }
        Command::Serve(args) => {
            let overrides = ConfigOverrides {
                bind: args.bind,
                ..cli.runtime.config_overrides()
            };
            let config = resolve_config(&cli.runtime, overrides)?;
            commands::serve::run(&args, &config)
        }
        Command::Ask(args) => {
            let config = resolve_config(&cli.runtime, cli.runtime.config_overrides())?;
            commands::ask::run(&args, &config)
        }
        Command::Schema(args) => {
            let config = resolve_config(&cli.runtime, cli.runtime.config_overrides())?;
            commands::schema::run(&args, &config)
        }
        Command::Init(args) => {
            let config = resolve_config(&cli.runtime, cli.runtime.config_overrides())?;
            commands::init::run(&args, &config)
        }
        Command::ApiSchema(args) => commands::api_schema::run(&args),
    }
}

/// Logs go to stderr; stdout carries answers and envelopes. The REPL
/// defaults to warnings only so progress lines do not interleave with it.
fn init_tracing(command: &Command) {
    let default_directive = match command {
        Command::Repl(_) => "keylens=warn",
        _ => "keylens=info",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn classify_runtime_error(error: &anyhow::Error) -> i32 {
    if error
        .downcast_ref::<EnvelopeCommandFailure>()
        .is_some_and(EnvelopeCommandFailure::is_blocked)
    {
        EXIT_BLOCKED
    } else {
        EXIT_RUNTIME_FAILURE
    }
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Repl(_) => "repl",
        Command::Serve(_) => "serve",
        Command::Ask(_) => "ask",
        Command::Schema(_) => "schema",
        Command::Init(_) => "init",
        Command::ApiSchema(_) => "api-schema",
    }
}

fn resolve_config(args: &RuntimeArgs, overrides: ConfigOverrides) -> Result<AppConfig> {
    let home_dir = match &args.home_dir {
        Some(path) => path.clone(),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME is not set; pass --home-dir"))?,
    };

    let cwd = match &args.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    keylens::config::resolve_app_config(
        |name| std::env::var(name).ok(),
        &home_dir,
        &cwd,
        &overrides,
    )
}
