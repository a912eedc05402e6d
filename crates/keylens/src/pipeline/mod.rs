//! Question → SQL → rows → narrative.
//!
//! A [`Pipeline`] borrows its collaborators and holds no state between
//! calls, so each request builds its own and drops it when done.

use time::Date;
use tracing::{info, warn};

use crate::error::AskError;
use crate::executor::{QueryExecutor, QueryResult};
use crate::fallback::{FallbackSection, run_today_fallback, today_local};
use crate::generate::{PromptStrategy, SqlGenerator, first_statement};
use crate::guard::{self, ValidatedSql};
use crate::llm::LlmService;
use crate::summary::Summarizer;
use crate::translate::TranslationChain;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AskRequest {
    pub question: String,
    /// Caller-supplied SQL. Still truncated and validated.
    pub sql: Option<String>,
    /// Rows the caller already has; execution is skipped when present.
    pub prefetched: Option<QueryResult>,
}

impl AskRequest {
    #[must_use]
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub result: QueryResult,
    /// Empty unless the primary result was empty.
    pub fallback: Vec<FallbackSection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub sql: String,
    pub result: QueryResult,
    pub fallback: Vec<FallbackSection>,
    pub summary: String,
}

pub struct Pipeline<'a> {
    llm: &'a dyn LlmService,
    translator: &'a TranslationChain,
    executor: &'a dyn QueryExecutor,
    strategy: PromptStrategy,
    today: Option<Date>,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(
        llm: &'a dyn LlmService,
        translator: &'a TranslationChain,
        executor: &'a dyn QueryExecutor,
        strategy: PromptStrategy,
    ) -> Self {
        Self {
            llm,
            translator,
            executor,
            strategy,
            today: None,
        }
    }

    /// Pins the date used by the fallback queries.
    #[must_use]
    pub fn with_today(mut self, today: Date) -> Self {
        self.today = Some(today);
        self
    }

    /// Uses `supplied_sql` when it is non-blank, otherwise generates SQL for
    /// `question`. Either way the statement is cut to its first `;` and must
    /// pass the guard.
    pub fn resolve_sql(
        &self,
        question: &str,
        supplied_sql: Option<&str>,
        schema: &str,
    ) -> Result<ValidatedSql, AskError> {
        let candidate = match supplied_sql.filter(|sql| !sql.trim().is_empty()) {
            Some(sql) => first_statement(sql).unwrap_or_default(),
            None => SqlGenerator::new(self.llm, self.translator, self.strategy)
                .generate(question, schema)?,
        };

        guard::validate(&candidate).map_err(|blocked| {
            warn!(
                reason = blocked.reason.code(),
                keyword = ?blocked.reason,
                sql = %blocked.sql,
                "sql blocked"
            );
            AskError::from(blocked)
        })
    }

    pub fn run_query(&self, sql: &ValidatedSql) -> Result<QueryOutcome, AskError> {
        let result = self.executor.execute(sql).map_err(|error| {
            warn!(sql = %error.sql, error = %error.message, "sql execution failed");
            AskError::from(error)
        })?;
        info!(rows = result.row_count(), "query executed");

        let fallback = if result.is_empty() {
            let today = self.today.unwrap_or_else(today_local);
            info!(%today, "primary result empty; running today fallback");
            run_today_fallback(self.executor, today)
        } else {
            Vec::new()
        };

        Ok(QueryOutcome { result, fallback })
    }

    pub fn summarize(
        &self,
        question: &str,
        sql: &str,
        result: &QueryResult,
    ) -> Result<String, AskError> {
        Ok(Summarizer::new(self.llm).summarize(question, sql, result)?)
    }

    pub fn ask(&self, request: &AskRequest, schema: &str) -> Result<Answer, AskError> {
        info!(
            question = %request.question,
            sql_supplied = request.sql.is_some(),
            rows_supplied = request.prefetched.is_some(),
            "ask received"
        );
        let sql = self.resolve_sql(&request.question, request.sql.as_deref(), schema)?;

        let outcome = match &request.prefetched {
            Some(result) => QueryOutcome {
                result: result.clone(),
                fallback: Vec::new(),
            },
            None => self.run_query(&sql)?,
        };

        let summary = self.summarize(&request.question, sql.as_str(), &outcome.result)?;

        Ok(Answer {
            sql: sql.into_string(),
            result: outcome.result,
            fallback: outcome.fallback,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use serde_json::json;
    use time::macros::date;

    use super::{AskRequest, Pipeline};
    use crate::executor::{ExecutionError, QueryExecutor, QueryResult};
    use crate::generate::PromptStrategy;
    use crate::guard::ValidatedSql;
    use crate::llm::{LlmError, LlmService};
    use crate::translate::TranslationChain;

    struct ScriptedLlm {
        replies: RefCell<Vec<&'static str>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&'static str]) -> Self {
            Self {
                replies: RefCell::new(replies.iter().rev().copied().collect()),
            }
        }
    }

    impl LlmService for ScriptedLlm {
        fn complete(&self, _prompt: &str, _system_prompt: Option<&str>) -> Result<String, LlmError> {
            Ok(self.replies.borrow_mut().pop().unwrap_or_default().to_string())
        }
    }

    struct FixedExecutor {
        result: QueryResult,
        calls: Cell<usize>,
    }

    impl QueryExecutor for FixedExecutor {
        fn execute(&self, _sql: &ValidatedSql) -> Result<QueryResult, ExecutionError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.result.clone())
        }
    }

    #[test]
    fn prefetched_rows_skip_execution() {
        let llm = ScriptedLlm::new(&["总结"]);
        let translator = TranslationChain::disabled();
        let executor = FixedExecutor {
            result: QueryResult::default(),
            calls: Cell::new(0),
        };
        let pipeline = Pipeline::new(&llm, &translator, &executor, PromptStrategy::Direct)
            .with_today(date!(2024 - 01 - 01));

        let answer = pipeline
            .ask(
                &AskRequest {
                    question: "哪个键最多？".to_string(),
                    sql: Some("SELECT key FROM normal_keys".to_string()),
                    prefetched: Some(QueryResult {
                        columns: vec!["key".to_string()],
                        rows: vec![vec![json!("a")]],
                    }),
                },
                "",
            )
            .expect("ask should pass");

        assert_eq!(executor.calls.get(), 0);
        assert_eq!(answer.sql, "SELECT key FROM normal_keys;");
        assert_eq!(answer.summary, "总结");
        assert!(answer.fallback.is_empty());
    }

    #[test]
    fn blank_supplied_sql_falls_back_to_generation() {
        let llm = ScriptedLlm::new(&["SELECT 1;", ""]);
        let translator = TranslationChain::disabled();
        let executor = FixedExecutor {
            result: QueryResult {
                columns: vec!["1".to_string()],
                rows: vec![vec![json!(1)]],
            },
            calls: Cell::new(0),
        };
        let pipeline = Pipeline::new(&llm, &translator, &executor, PromptStrategy::Direct);

        let sql = pipeline
            .resolve_sql("随便查查", Some("   "), "")
            .expect("generated sql should pass");
        assert_eq!(sql.as_str(), "SELECT 1;");
    }

    #[test]
    fn semicolon_only_supplied_sql_is_blocked() {
        let llm = ScriptedLlm::new(&[]);
        let translator = TranslationChain::disabled();
        let executor = FixedExecutor {
            result: QueryResult::default(),
            calls: Cell::new(0),
        };
        let pipeline = Pipeline::new(&llm, &translator, &executor, PromptStrategy::Direct);

        let error = pipeline
            .resolve_sql("", Some(";"), "")
            .expect_err("empty statement must be blocked");
        assert!(error.is_blocked());
    }
}
