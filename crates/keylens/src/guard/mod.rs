use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Non-portable constructs and their SQLite spelling. Matching is literal and
/// case-sensitive; `CURDATE()`/`NOW()` must run before `CURRENT_DATE`.
pub const COMPAT_REWRITES: &[(&str, &str)] = &[
    ("CURDATE()", "date('now', 'localtime')"),
    ("NOW()", "datetime('now', 'localtime')"),
    ("CURRENT_DATE", "date('now', 'localtime')"),
];

pub const DENYLIST: &[&str] = &[
    "drop",
    "delete",
    "truncate",
    "alter",
    "update",
    "insert",
    "create",
    "attach",
    "detach",
    "replace into",
    "vacuum",
];

pub const BLOCKED_MESSAGE: &str = "检测到危险SQL语句，已阻止执行！";
pub const EMPTY_MESSAGE: &str = "SQL语句为空，已阻止执行！";

fn danger_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        let alternatives = DENYLIST
            .iter()
            .map(|keyword| keyword.replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        // A quoted or bracketed identifier may follow a keyword with no space.
        // `'` only counts for attach/detach, whose operand is a file name;
        // elsewhere it would block literals such as `key = 'Delete'`.
        Regex::new(&format!(
            r#"(?i)\b(?:({alternatives})(?:\s|;|$|["`\[(])|(attach|detach)')"#
        ))
        .expect("denylist regex should compile")
    })
}

fn line_comment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"--[^\n]*").expect("line comment regex should compile"))
}

fn block_comment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex should compile"))
}

/// SQL that went through [`validate`]. The executor accepts nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for ValidatedSql {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    EmptyStatement,
    DangerousKeyword(String),
}

impl BlockReason {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyStatement => "empty_statement",
            Self::DangerousKeyword(_) => "dangerous_keyword",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SqlBlocked {
    pub reason: BlockReason,
    pub message: String,
    pub sql: String,
}

#[must_use]
pub fn rewrite_compat(sql: &str) -> String {
    COMPAT_REWRITES
        .iter()
        .fold(sql.to_string(), |rewritten, (token, portable)| {
            rewritten.replace(token, portable)
        })
}

/// Returns the first denylisted keyword, lowercased with single spaces.
///
/// Both the raw text and a comment-stripped copy are checked, so a keyword
/// split by `/* */` is caught and a keyword hidden after `--` inside a string
/// literal is still seen.
#[must_use]
pub fn dangerous_keyword(sql: &str) -> Option<String> {
    let without_comments = strip_comments(sql);
    [sql, without_comments.as_str()]
        .into_iter()
        .find_map(|candidate| danger_regex().captures(candidate))
        .and_then(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|keyword| {
            keyword
                .as_str()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_lowercase()
        })
}

/// Rewrites portability constructs, then classifies the result.
pub fn validate(sql: &str) -> Result<ValidatedSql, SqlBlocked> {
    let rewritten = rewrite_compat(sql);

    if is_empty_statement(&rewritten) {
        return Err(SqlBlocked {
            reason: BlockReason::EmptyStatement,
            message: EMPTY_MESSAGE.to_string(),
            sql: rewritten,
        });
    }

    if let Some(keyword) = dangerous_keyword(&rewritten) {
        return Err(SqlBlocked {
            reason: BlockReason::DangerousKeyword(keyword),
            message: BLOCKED_MESSAGE.to_string(),
            sql: rewritten,
        });
    }

    Ok(ValidatedSql(rewritten))
}

#[must_use]
pub fn is_empty_statement(sql: &str) -> bool {
    strip_comments(sql)
        .chars()
        .all(|ch| ch.is_whitespace() || ch == ';')
}

fn strip_comments(sql: &str) -> String {
    let without_blocks = block_comment_regex().replace_all(sql, " ");
    line_comment_regex().replace_all(&without_blocks, " ").into_owned()
}
