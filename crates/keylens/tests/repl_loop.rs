use std::cell::RefCell;
use std::io::Cursor;

use keylens::cli::commands::repl::{GOODBYE, NO_ROWS, run_loop};
use keylens::executor::SqliteExecutor;
use keylens::generate::PromptStrategy;
use keylens::guard::BLOCKED_MESSAGE;
use keylens::llm::{LlmError, LlmService};
use keylens::pipeline::Pipeline;
use keylens::schema::introspect_schema;
use keylens::sqlite::create_event_tables;
use keylens::translate::TranslationChain;
use rusqlite::Connection;
use time::macros::date;

struct ScriptedLlm {
    replies: RefCell<Vec<&'static str>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedLlm {
    fn new(replies: &[&'static str]) -> Self {
        Self {
            replies: RefCell::new(replies.iter().rev().copied().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl LlmService for ScriptedLlm {
    fn complete(&self, prompt: &str, _system_prompt: Option<&str>) -> Result<String, LlmError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self.replies.borrow_mut().pop().unwrap_or_default().to_string())
    }
}

fn seeded_store() -> Connection {
    let connection = Connection::open_in_memory().expect("in-memory db should open");
    create_event_tables(&connection).expect("tables should be created");
    connection
        .execute_batch(
            "INSERT INTO normal_keys (key, count, date) VALUES ('space', 12, '2024-01-01');
             INSERT INTO normal_keys (key, count, date) VALUES ('a', 5, '2024-01-01');",
        )
        .expect("fixture rows should insert");
    connection
}

fn run_session(llm: &ScriptedLlm, connection: &Connection, input: &str) -> String {
    let translator = TranslationChain::disabled();
    let executor = SqliteExecutor::new(connection);
    let pipeline = Pipeline::new(llm, &translator, &executor, PromptStrategy::Direct)
        .with_today(date!(2024 - 01 - 02));
    let schema = introspect_schema(connection)
        .expect("schema should load")
        .render();

    let mut output = Vec::new();
    run_loop(&pipeline, &schema, Cursor::new(input.to_string()), &mut output)
        .expect("loop should finish");
    String::from_utf8(output).expect("output should be utf-8")
}

#[test]
fn session_survives_blocked_and_failing_questions() {
    let connection = seeded_store();
    let llm = ScriptedLlm::new(&["空格键按得最多。", "DROP TABLE normal_keys;"]);

    let output = run_session(
        &llm,
        &connection,
        "SELECT key, count FROM normal_keys ORDER BY count DESC\n\
         把数据全部删掉\n\
         SELECT nope FROM normal_keys;\n\
         exit\n",
    );

    assert!(output.contains("数据库结构如下："), "missing banner: {output}");
    assert!(output.contains("表 normal_keys: id (INTEGER), key (TEXT)"));
    assert!(output.contains("key   | count\n-------------\nspace | 12\na     | 5\n"));
    assert!(output.contains("AI分析总结：\n空格键按得最多。\n"));
    assert!(output.contains("正在调用本地AI模型生成SQL，请稍候..."));
    assert!(output.contains(BLOCKED_MESSAGE));
    assert!(!output.contains("AI生成的SQL:\nDROP"));
    assert!(output.contains("SQL执行失败: no such column: nope"), "unexpected: {output}");
    assert!(output.trim_end().ends_with(GOODBYE));

    let remaining: i64 = connection
        .query_row("SELECT COUNT(*) FROM normal_keys", [], |row| row.get(0))
        .expect("normal_keys should still exist");
    assert_eq!(remaining, 2);
    assert_eq!(llm.prompts.borrow().len(), 2);
}

#[test]
fn raw_sql_skips_the_model_for_generation() {
    let connection = seeded_store();
    let llm = ScriptedLlm::new(&["只有a键。"]);

    let output = run_session(
        &llm,
        &connection,
        "select key from normal_keys where key = 'a'\nquit\n",
    );

    assert!(!output.contains("正在调用本地AI模型生成SQL"));
    assert!(!output.contains("AI生成的SQL:"));
    assert!(output.contains("key\n---\na\n"));
    let prompts = llm.prompts.borrow();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("select key from normal_keys where key = 'a';"));
}

#[test]
fn empty_result_prints_today_sections() {
    let connection = seeded_store();
    let llm = ScriptedLlm::new(&["今天还没有数据。"]);

    let output = run_session(
        &llm,
        &connection,
        "SELECT key FROM normal_keys WHERE key = 'zzz'\n",
    );

    assert!(output.contains(NO_ROWS));
    assert!(output.contains("今天的普通按键（normal_keys）："));
    assert!(output.contains("今天的组合键（shortcut_keys）："));
    assert!(output.contains("今天的鼠标点击（mouse_events）："));
    assert!(output.ends_with(&format!("\n{GOODBYE}\n")));
}

#[test]
fn blank_lines_are_ignored() {
    let connection = seeded_store();
    let llm = ScriptedLlm::new(&[]);

    let output = run_session(&llm, &connection, "\n   \n退出\n");

    assert!(llm.prompts.borrow().is_empty());
    assert!(output.trim_end().ends_with(GOODBYE));
}
