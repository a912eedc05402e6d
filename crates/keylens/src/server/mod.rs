//! `POST /ai/ask` over axum.
//!
//! Every request runs the synchronous pipeline on the blocking pool with its
//! own connection and clients. Only the immutable settings are shared.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::config::{LlmConfig, TranslateConfig};
use crate::error::AskError;
use crate::executor::{QueryExecutor, QueryResult, SqliteExecutor};
use crate::fallback::FallbackSection;
use crate::generate::PromptStrategy;
use crate::llm::{LlmService, OllamaClient};
use crate::pipeline::{Answer, AskRequest, Pipeline};
use crate::schema::introspect_schema;
use crate::sqlite::open_read_only_connection;
use crate::translate::TranslationChain;

pub const ASK_ROUTE: &str = "/ai/ask";
const INTERNAL_ERROR_PREFIX: &str = "AI内部错误: ";

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct AskRequestBody {
    #[serde(default)]
    pub user_question: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    /// Positional arrays, or objects keyed by column name.
    #[serde(default)]
    pub rows: Option<Vec<Value>>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Overrides the configured model name for this request only.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt_strategy: Option<PromptStrategy>,
}

impl AskRequestBody {
    /// Rows count as supplied only when both rows and columns are non-empty.
    #[must_use]
    pub fn into_ask_request(self) -> AskRequest {
        let prefetched = match (self.rows, self.columns) {
            (Some(rows), Some(columns)) if !rows.is_empty() && !columns.is_empty() => {
                let rows = rows
                    .into_iter()
                    .map(|row| positional_row(row, &columns))
                    .collect();
                Some(QueryResult { columns, rows })
            }
            _ => None,
        };
        AskRequest {
            question: self.user_question.unwrap_or_default(),
            sql: self.sql,
            prefetched,
        }
    }
}

/// Object rows are read in `columns` order, missing keys becoming null. A
/// scalar row is a single cell.
fn positional_row(row: Value, columns: &[String]) -> Vec<Value> {
    match row {
        Value::Array(cells) => cells,
        Value::Object(mut fields) => columns
            .iter()
            .map(|column| fields.remove(column).unwrap_or(Value::Null))
            .collect(),
        scalar => vec![scalar],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FallbackReply {
    pub table: String,
    pub label: String,
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<FallbackSection> for FallbackReply {
    fn from(section: FallbackSection) -> Self {
        let (columns, rows, error) = match section.outcome {
            Ok(result) => (result.columns, result.rows, None),
            Err(failure) => (Vec::new(), Vec::new(), Some(failure.message)),
        };
        Self {
            table: section.table.to_string(),
            label: section.label.to_string(),
            sql: section.sql,
            columns,
            rows,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AskReply {
    pub reply: String,
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Vec<FallbackReply>>,
}

impl From<Answer> for AskReply {
    fn from(answer: Answer) -> Self {
        let fallback = (!answer.fallback.is_empty()).then(|| {
            answer
                .fallback
                .into_iter()
                .map(FallbackReply::from)
                .collect()
        });
        Self {
            reply: answer.summary,
            sql: answer.sql,
            row_count: answer.result.row_count(),
            columns: answer.result.columns,
            rows: answer.result.rows,
            fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BlockedReply {
    pub reply: String,
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorReply {
    pub reply: String,
}

impl ErrorReply {
    #[must_use]
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self {
            reply: format!("{INTERNAL_ERROR_PREFIX}{message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AskResponse {
    Answered(AskReply),
    Blocked(BlockedReply),
    Failed(ErrorReply),
}

impl AskResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Answered(_) => StatusCode::OK,
            Self::Blocked(_) => StatusCode::BAD_REQUEST,
            Self::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Result<Value> {
        let body = match self {
            Self::Answered(reply) => serde_json::to_value(reply),
            Self::Blocked(reply) => serde_json::to_value(reply),
            Self::Failed(reply) => serde_json::to_value(reply),
        };
        body.context("failed to encode ask response")
    }

    fn from_error(error: AskError) -> Self {
        match error {
            AskError::Blocked(blocked) => Self::Blocked(BlockedReply {
                reply: blocked.message,
                sql: String::new(),
                columns: Vec::new(),
                rows: Vec::new(),
            }),
            other => {
                error!(code = other.code(), error = %other, "ask failed");
                Self::Failed(ErrorReply::internal(other))
            }
        }
    }
}

impl IntoResponse for AskResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Answered(reply) => (status, Json(reply)).into_response(),
            Self::Blocked(reply) => (status, Json(reply)).into_response(),
            Self::Failed(reply) => (status, Json(reply)).into_response(),
        }
    }
}

/// Builds the per-request network clients.
pub trait Backends: Send + Sync {
    fn llm(&self, model_override: Option<&str>) -> Result<Box<dyn LlmService>>;
    fn translator(&self) -> Result<TranslationChain>;
}

#[derive(Debug, Clone)]
pub struct HttpBackends {
    pub llm: LlmConfig,
    pub translate: TranslateConfig,
}

impl Backends for HttpBackends {
    fn llm(&self, model_override: Option<&str>) -> Result<Box<dyn LlmService>> {
        let mut client = OllamaClient::new(&self.llm)?;
        if let Some(model) = model_override.filter(|model| !model.trim().is_empty()) {
            client = client.with_model(model);
        }
        Ok(Box::new(client))
    }

    fn translator(&self) -> Result<TranslationChain> {
        TranslationChain::from_config(&self.translate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub db_path: PathBuf,
    pub default_strategy: PromptStrategy,
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ServerSettings>,
    pub backends: Arc<dyn Backends>,
}

/// Runs one request against an already-built set of collaborators.
pub fn respond(
    llm: &dyn LlmService,
    translator: &TranslationChain,
    executor: &dyn QueryExecutor,
    strategy: PromptStrategy,
    request: &AskRequest,
    schema: &str,
) -> AskResponse {
    match Pipeline::new(llm, translator, executor, strategy).ask(request, schema) {
        Ok(answer) => AskResponse::Answered(AskReply::from(answer)),
        Err(error) => AskResponse::from_error(error),
    }
}

/// Opens a fresh read-only connection and clients, then answers `body`.
pub fn handle_ask(
    settings: &ServerSettings,
    backends: &dyn Backends,
    body: AskRequestBody,
) -> AskResponse {
    match prepare_and_respond(settings, backends, body) {
        Ok(response) => response,
        Err(error) => {
            error!(error = %format!("{error:#}"), "ask request setup failed");
            AskResponse::Failed(ErrorReply::internal(format!("{error:#}")))
        }
    }
}

fn prepare_and_respond(
    settings: &ServerSettings,
    backends: &dyn Backends,
    body: AskRequestBody,
) -> Result<AskResponse> {
    let connection = open_read_only_connection(&settings.db_path)?;
    let schema = introspect_schema(&connection)?.render();
    let llm = backends.llm(body.model.as_deref())?;
    let translator = backends.translator()?;
    let strategy = body.prompt_strategy.unwrap_or(settings.default_strategy);
    let executor = SqliteExecutor::new(&connection);
    let request = body.into_ask_request();

    Ok(respond(
        llm.as_ref(),
        &translator,
        &executor,
        strategy,
        &request,
        &schema,
    ))
}

async fn ask_route(State(state): State<AppState>, Json(body): Json<AskRequestBody>) -> AskResponse {
    let AppState { settings, backends } = state;
    let joined =
        tokio::task::spawn_blocking(move || handle_ask(&settings, backends.as_ref(), body)).await;
    match joined {
        Ok(response) => response,
        Err(join_error) => {
            error!(error = %join_error, "ask worker panicked");
            AskResponse::Failed(ErrorReply::internal(join_error))
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(ASK_ROUTE, post(ask_route))
        .with_state(state)
}

pub async fn serve(state: AppState, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, route = ASK_ROUTE, "keylens server listening");
    axum::serve(listener, router(state))
        .await
        .context("http server stopped unexpectedly")
}
