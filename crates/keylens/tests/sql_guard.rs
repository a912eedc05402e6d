use std::cell::{Cell, RefCell};

use keylens::executor::{ExecutionError, QueryExecutor, QueryResult};
use keylens::generate::PromptStrategy;
use keylens::guard::{BLOCKED_MESSAGE, BlockReason, validate};
use keylens::llm::{LlmError, LlmService};
use keylens::pipeline::{AskRequest, Pipeline};
use keylens::translate::TranslationChain;

#[derive(Default)]
struct SpyExecutor {
    calls: Cell<usize>,
}

impl QueryExecutor for SpyExecutor {
    fn execute(
        &self,
        _sql: &keylens::guard::ValidatedSql,
    ) -> Result<QueryResult, ExecutionError> {
        self.calls.set(self.calls.get() + 1);
        Ok(QueryResult::default())
    }
}

struct CannedLlm {
    reply: String,
    calls: RefCell<usize>,
}

impl CannedLlm {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: RefCell::new(0),
        }
    }
}

impl LlmService for CannedLlm {
    fn complete(&self, _prompt: &str, _system_prompt: Option<&str>) -> Result<String, LlmError> {
        *self.calls.borrow_mut() += 1;
        Ok(self.reply.clone())
    }
}

const DANGEROUS: &[&str] = &[
    "DROP TABLE normal_keys",
    "drop table normal_keys;",
    "Delete FROM mouse_events WHERE 1",
    "TRUNCATE TABLE shortcut_keys",
    "alter table normal_keys rename to x",
    "UPDATE normal_keys SET count = 0",
    "update\tnormal_keys set count = 0",
    "/* sneaky */ DELETE FROM normal_keys",
    "UPDATE\"normal_keys\"SET count=0",
    "UPDATE[normal_keys]SET count=0",
    "DELETE`normal_keys`",
    "DROP\"normal_keys\"",
    "ATTACH'/tmp/other.db' AS other",
];

#[test]
fn supplied_dangerous_sql_never_reaches_executor() {
    for sql in DANGEROUS {
        let llm = CannedLlm::new("不应被调用");
        let translator = TranslationChain::disabled();
        let spy = SpyExecutor::default();
        let pipeline = Pipeline::new(&llm, &translator, &spy, PromptStrategy::Direct);

        let error = pipeline
            .ask(
                &AskRequest {
                    question: "清空数据".to_string(),
                    sql: Some((*sql).to_string()),
                    prefetched: None,
                },
                "",
            )
            .expect_err("dangerous sql must be blocked");

        assert!(error.is_blocked(), "expected blocked for {sql}: {error}");
        assert_eq!(error.to_string(), BLOCKED_MESSAGE);
        assert_eq!(spy.calls.get(), 0, "executor ran for {sql}");
        assert_eq!(*llm.calls.borrow(), 0, "llm ran for {sql}");
    }
}

#[test]
fn generated_dangerous_sql_never_reaches_executor() {
    for sql in DANGEROUS {
        let llm = CannedLlm::new(sql);
        let translator = TranslationChain::disabled();
        let spy = SpyExecutor::default();
        let pipeline = Pipeline::new(&llm, &translator, &spy, PromptStrategy::Direct);

        let error = pipeline
            .ask(&AskRequest::question("把数据都删掉"), "表 normal_keys: key (TEXT)")
            .expect_err("dangerous sql must be blocked");

        assert!(error.is_blocked(), "expected blocked for {sql}: {error}");
        assert_eq!(spy.calls.get(), 0, "executor ran for {sql}");
    }
}

#[test]
fn only_the_first_generated_statement_is_considered() {
    let llm = CannedLlm::new("SELECT key FROM normal_keys; DROP TABLE normal_keys;");
    let translator = TranslationChain::disabled();
    let spy = SpyExecutor::default();
    let pipeline = Pipeline::new(&llm, &translator, &spy, PromptStrategy::Direct);

    let sql = pipeline
        .resolve_sql("按了哪些键", None, "")
        .expect("first statement is safe");
    assert_eq!(sql.as_str(), "SELECT key FROM normal_keys;");
}

#[test]
fn identifiers_containing_keywords_are_allowed() {
    for sql in [
        "SELECT key AS dropped_key FROM normal_keys;",
        "SELECT combination FROM shortcut_keys WHERE combination = 'ctrl+updated';",
        "SELECT count AS deleted_count FROM mouse_events;",
    ] {
        assert!(validate(sql).is_ok(), "expected safe: {sql}");
    }
}

#[test]
fn blocked_outcome_reports_reason() {
    let blocked = validate("  ").expect_err("blank sql must be blocked");
    assert_eq!(blocked.reason, BlockReason::EmptyStatement);

    let blocked = validate("VACUUM;").expect_err("vacuum must be blocked");
    assert_eq!(blocked.reason, BlockReason::DangerousKeyword("vacuum".to_string()));
}

#[test]
fn quoted_identifier_right_after_keyword_is_blocked() {
    for (sql, keyword) in [
        ("UPDATE\"normal_keys\"SET count=0", "update"),
        ("UPDATE[normal_keys]SET count=0", "update"),
        ("REPLACE INTO\"normal_keys\"(key, count, date) VALUES ('a', 1, '2024-01-01')", "replace into"),
        ("DETACH'other'", "detach"),
    ] {
        let blocked = validate(sql).expect_err("quoted identifier must not hide keyword");
        assert_eq!(
            blocked.reason,
            BlockReason::DangerousKeyword(keyword.to_string()),
            "unexpected reason for {sql}"
        );
    }
}

#[test]
fn key_names_in_string_literals_are_allowed() {
    for sql in [
        "SELECT count FROM normal_keys WHERE key = 'Delete';",
        "SELECT count FROM normal_keys WHERE key IN ('Insert','Delete');",
    ] {
        assert!(validate(sql).is_ok(), "expected safe: {sql}");
    }
}
