use anyhow::{Context, Error, Result};
use clap::Args;
use serde_json::{Value, json};

use crate::config::AppConfig;
use crate::error::AskError;
use crate::executor::SqliteExecutor;
use crate::generate::PromptStrategy;
use crate::guard::BlockReason;
use crate::llm::OllamaClient;
use crate::models::{Envelope, EnvelopeCommandFailure};
use crate::pipeline::{Answer, AskRequest, Pipeline};
use crate::schema::introspect_schema;
use crate::server::FallbackReply;
use crate::sqlite::open_read_only_connection;
use crate::translate::TranslationChain;

const COMMAND: &str = "ask";

#[derive(Debug, Clone, Args)]
pub struct AskArgs {
    #[arg(value_name = "QUESTION")]
    pub question: String,

    /// Run this SQL instead of generating one. Still validated.
    #[arg(long, value_name = "SQL")]
    pub sql: Option<String>,

    #[arg(long, value_enum, default_value_t = PromptStrategy::Direct)]
    pub prompt_strategy: PromptStrategy,
}

pub fn run(args: &AskArgs, config: &AppConfig) -> Result<()> {
    let connection = open_read_only_connection(&config.db_path).map_err(|error| {
        Error::new(EnvelopeCommandFailure::new(
            Envelope::error(COMMAND, "database_unavailable", "unable to open sqlite database")
                .with_error_details(json!({
                    "db_path": config.db_path.display().to_string(),
                    "cause": format!("{error:#}")
                })),
        ))
    })?;
    let schema = introspect_schema(&connection)?.render();
    let llm = OllamaClient::new(&config.llm)?;
    let translator = match args.prompt_strategy {
        PromptStrategy::Direct => TranslationChain::disabled(),
        PromptStrategy::Translated => TranslationChain::from_config(&config.translate)?,
    };
    let executor = SqliteExecutor::new(&connection);
    let pipeline = Pipeline::new(&llm, &translator, &executor, args.prompt_strategy);

    let request = AskRequest {
        question: args.question.clone(),
        sql: args.sql.clone(),
        prefetched: None,
    };
    let envelope = match pipeline.ask(&request, &schema) {
        Ok(answer) => answer_envelope(answer)
            .with_meta("model", json!(llm.model()))
            .with_meta("prompt_strategy", json!(args.prompt_strategy)),
        Err(error) => return Err(Error::new(failure_for(&error))),
    };

    let encoded = serde_json::to_string(&envelope).context("failed to encode ask envelope")?;
    println!("{encoded}");
    Ok(())
}

#[must_use]
pub fn answer_envelope(answer: Answer) -> Envelope {
    let row_count = answer.result.row_count();
    let failed_fallbacks = answer
        .fallback
        .iter()
        .filter_map(|section| {
            section
                .outcome
                .as_ref()
                .err()
                .map(|error| format!("{}: {}", section.table, error.message))
        })
        .collect::<Vec<_>>();
    let fallback = answer
        .fallback
        .into_iter()
        .map(FallbackReply::from)
        .collect::<Vec<_>>();

    let mut envelope = Envelope::ok(
        COMMAND,
        json!({
            "sql": answer.sql,
            "columns": answer.result.columns,
            "rows": answer.result.rows,
            "row_count": row_count,
            "summary": answer.summary,
            "fallback": fallback,
        }),
    )
    .with_meta("row_count", json!(row_count))
    .with_meta("fallback_ran", json!(!fallback.is_empty()));

    for message in failed_fallbacks {
        envelope = envelope.with_warning("fallback_query_failed", message);
    }
    envelope
}

#[must_use]
pub fn failure_for(error: &AskError) -> EnvelopeCommandFailure {
    let envelope = Envelope::error(COMMAND, error.code(), error.to_string());
    match error {
        AskError::Blocked(blocked) => {
            let keyword = match &blocked.reason {
                BlockReason::DangerousKeyword(keyword) => Value::String(keyword.clone()),
                BlockReason::EmptyStatement => Value::Null,
            };
            EnvelopeCommandFailure::blocked(envelope.with_error_details(json!({
                "reason": blocked.reason.code(),
                "keyword": keyword,
                "sql": blocked.sql,
            })))
        }
        AskError::Execution(failure) => EnvelopeCommandFailure::new(
            envelope.with_error_details(json!({ "sql": failure.sql, "cause": failure.message })),
        ),
        AskError::Generation(_) | AskError::Summary(_) => EnvelopeCommandFailure::new(envelope),
    }
}
