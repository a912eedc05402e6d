use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_BLOCKED: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("{prefix}-{nanos}"));
    std::fs::create_dir_all(&path).expect("temp dir should be creatable");
    path
}

/// Runs the binary with explicit home, cwd and database so the host
/// environment does not leak in. The LLM endpoint points at a closed port.
fn keylens(temp: &Path, db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_keylens"))
        .arg("--home-dir")
        .arg(temp)
        .arg("--cwd")
        .arg(temp)
        .arg("--db")
        .arg(db)
        .args(["--llm-endpoint", "http://127.0.0.1:9/api/generate"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("command should execute")
}

fn initialized_db(prefix: &str) -> (PathBuf, PathBuf) {
    let temp = unique_temp_dir(prefix);
    let db = temp.join("key_stats.db");
    let output = keylens(&temp, &db, &["init"]);
    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    (temp, db)
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be a json envelope")
}

#[test]
fn missing_question_exits_with_usage_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_keylens"))
        .arg("ask")
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_USAGE_ERROR));
}

#[test]
fn init_then_schema_succeeds() {
    let (temp, db) = initialized_db("keylens-exit-init");

    let output = keylens(&temp, &db, &["schema"]);
    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("表 normal_keys: id (INTEGER)"), "unexpected: {stdout}");
    assert!(stdout.contains("表 mouse_events:"), "unexpected: {stdout}");
}

#[test]
fn blocked_sql_exits_with_blocked_code_and_envelope() {
    let (temp, db) = initialized_db("keylens-exit-blocked");

    let output = keylens(
        &temp,
        &db,
        &["ask", "删除表", "--sql", "DROP TABLE normal_keys"],
    );

    assert_eq!(output.status.code(), Some(EXIT_BLOCKED));
    let envelope = stdout_json(&output);
    assert_eq!(envelope["ok"], Value::Bool(false));
    assert_eq!(envelope["error"]["code"], "sql_blocked");
    assert_eq!(envelope["error"]["details"]["reason"], "dangerous_keyword");

    let schema = keylens(&temp, &db, &["schema"]);
    assert!(String::from_utf8_lossy(&schema.stdout).contains("表 normal_keys:"));
}

#[test]
fn execution_failure_exits_with_runtime_code() {
    let (temp, db) = initialized_db("keylens-exit-exec");

    let output = keylens(
        &temp,
        &db,
        &["ask", "问题", "--sql", "SELECT nope FROM normal_keys"],
    );

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    let envelope = stdout_json(&output);
    assert_eq!(envelope["error"]["code"], "execution_failed");
    assert_eq!(
        envelope["error"]["details"]["sql"],
        "SELECT nope FROM normal_keys;"
    );
}

#[test]
fn missing_database_exits_with_runtime_code() {
    let temp = unique_temp_dir("keylens-exit-missing");
    let db = temp.join("absent.db");

    let output = keylens(&temp, &db, &["ask", "问题"]);

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    assert_eq!(stdout_json(&output)["error"]["code"], "database_unavailable");
    assert!(!db.exists());
}

#[test]
fn relative_home_dir_exits_with_runtime_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_keylens"))
        .args(["--home-dir", "relative", "schema"])
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_RUNTIME_FAILURE));
}
