//! Versioned prompt templates with named slots.
//!
//! Templates are plain text with `{slot}` markers. Rendering is a single
//! left-to-right pass, so slot markers that happen to appear inside a
//! supplied value (a question that contains `{schema}`, say) are copied
//! through untouched.

use serde_json::Value;
use thiserror::Error;

pub const NO_RESULT_MARKER: &str = "（无查询结果）";
const RESULT_DIVIDER_WIDTH: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("prompt template `{template}` is missing a value for slot `{slot}`")]
    MissingSlot {
        template: &'static str,
        slot: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub id: &'static str,
    pub slots: &'static [&'static str],
    body: &'static str,
}

impl PromptTemplate {
    #[must_use]
    pub const fn new(id: &'static str, slots: &'static [&'static str], body: &'static str) -> Self {
        Self { id, slots, body }
    }

    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, PromptError> {
        for slot in self.slots {
            if !values.iter().any(|(name, _)| name == slot) {
                return Err(PromptError::MissingSlot {
                    template: self.id,
                    slot: *slot,
                });
            }
        }

        let mut rendered = String::with_capacity(self.body.len());
        let mut rest = self.body;
        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            let slot_value = after_open.find('}').and_then(|close| {
                let name = &after_open[..close];
                self.slots
                    .contains(&name)
                    .then(|| values.iter().find(|(key, _)| *key == name))
                    .flatten()
                    .map(|(_, value)| (*value, close))
            });
            match slot_value {
                Some((value, close)) => {
                    rendered.push_str(value);
                    rest = &after_open[close + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = after_open;
                }
            }
        }
        rendered.push_str(rest);

        Ok(rendered)
    }
}

pub const GENERATION_SLOTS: &[&str] = &["schema", "examples", "rules", "question"];
pub const SUMMARY_SLOTS: &[&str] = &["question", "sql", "table"];

pub const GENERATION_TEMPLATE_ZH: PromptTemplate = PromptTemplate::new(
    "generation.zh.v1",
    GENERATION_SLOTS,
    r#"你是一个sqlite数据库分析助手。用户会用中文提出分析需求，你需要根据下面的数据库结构，把需求转成一条标准、可直接执行的 SQLite SQL 语句。

【数据库结构】
{schema}

【示例】
{examples}

【规则】
{rules}

【用户需求】
{question}

只输出一条SQL语句，以分号结尾，不要解释，不要输出任何其他内容。
"#,
);

pub const GENERATION_TEMPLATE_EN: PromptTemplate = PromptTemplate::new(
    "generation.en.v1",
    GENERATION_SLOTS,
    r#"You are a SQLite analytics assistant. Turn the user's requirement into one standard, directly executable SQLite SQL statement based on the database structure below.

[Database structure]
{schema}

[Examples]
{examples}

[Rules]
{rules}

[User requirement]
{question}

Output exactly one SQL statement ending with a semicolon. No explanation, nothing else.
"#,
);

pub const SUMMARY_TEMPLATE_ZH: PromptTemplate = PromptTemplate::new(
    "summary.zh.v1",
    SUMMARY_SLOTS,
    r#"你是一个有趣的数据库分析助手。请根据以下信息，用中文生成一段简洁有趣的分析总结，风格可以幽默、鼓励、调侃，适合普通用户阅读。

【用户需求】
{question}

【SQL语句】
{sql}

【查询结果】
{table}

要求：只输出分析总结，不要输出SQL和表格，不要解释SQL。可以用emoji、网络流行语、拟人化等方式让总结更生动，只能使用中文回答。
"#,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptLanguage {
    Chinese,
    English,
}

pub const GENERATION_RULES_ZH: [&str; 10] = [
    "查询日期只使用 date 字段，date 字段格式为 yyyy-mm-dd。",
    "不要用 timestamp 字段判断日期，它只记录写入时间。",
    "“今天”或“最近一天”使用 date = (SELECT MAX(date) FROM <表>)，不要使用 date('now') 等相对日期函数。",
    "“昨天”使用 date = date((SELECT MAX(date) FROM <表>), '-1 day')。",
    "“最近N天”使用 date >= date((SELECT MAX(date) FROM <表>), '-N days')。",
    "“按了哪些键/组合键/鼠标按键”使用 SELECT DISTINCT <键列>。",
    "“最多/最少”使用 ORDER BY count DESC（或 ASC）LIMIT 1。",
    "跨多天的“总共/累计”使用 SUM(count) 并按键列 GROUP BY。",
    "只能使用上面数据库结构中列出的表和字段，不要编造不存在的表或字段。",
    "只输出一条SQL语句，以分号结尾，不要输出解释、注释或 markdown。",
];

pub const GENERATION_RULES_EN: [&str; 10] = [
    "Filter dates only with the `date` column, formatted yyyy-mm-dd.",
    "Never use the `timestamp` column to decide dates; it only records insertion time.",
    "For \"today\" or \"most recent day\" use date = (SELECT MAX(date) FROM <table>), not relative date functions such as date('now').",
    "For \"yesterday\" use date = date((SELECT MAX(date) FROM <table>), '-1 day').",
    "For \"last N days\" use date >= date((SELECT MAX(date) FROM <table>), '-N days').",
    "For \"which keys/combinations/buttons were pressed\" use SELECT DISTINCT <key column>.",
    "For superlatives (\"most\", \"least\") use ORDER BY count DESC (or ASC) LIMIT 1.",
    "For totals across several days use SUM(count) grouped by the key column.",
    "Only reference tables and columns listed in the database structure above.",
    "Output exactly one SQL statement ending with a semicolon, with no explanation, comments or markdown.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkedExample {
    pub question_zh: &'static str,
    pub question_en: &'static str,
    pub sql: &'static str,
}

pub const WORKED_EXAMPLES: &[WorkedExample] = &[
    WorkedExample {
        question_zh: "今天每个键按了几次？",
        question_en: "How many times was each key pressed today?",
        sql: "SELECT key, count FROM normal_keys WHERE date = (SELECT MAX(date) FROM normal_keys) ORDER BY count DESC;",
    },
    WorkedExample {
        question_zh: "最近7天用得最多的组合键是哪个？",
        question_en: "Which key combination was used most in the last 7 days?",
        sql: "SELECT combination, SUM(count) AS total FROM shortcut_keys WHERE date >= date((SELECT MAX(date) FROM shortcut_keys), '-7 days') GROUP BY combination ORDER BY total DESC LIMIT 1;",
    },
    WorkedExample {
        question_zh: "昨天点过哪些鼠标按键？",
        question_en: "Which mouse buttons were clicked yesterday?",
        sql: "SELECT DISTINCT button FROM mouse_events WHERE date = date((SELECT MAX(date) FROM mouse_events), '-1 day');",
    },
];

#[must_use]
pub fn render_rules(language: PromptLanguage) -> String {
    let rules = match language {
        PromptLanguage::Chinese => &GENERATION_RULES_ZH,
        PromptLanguage::English => &GENERATION_RULES_EN,
    };
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| format!("{}. {rule}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub fn render_examples(language: PromptLanguage) -> String {
    WORKED_EXAMPLES
        .iter()
        .map(|example| match language {
            PromptLanguage::Chinese => format!("问题：{}\nSQL：{}", example.question_zh, example.sql),
            PromptLanguage::English => {
                format!("Question: {}\nSQL: {}", example.question_en, example.sql)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn generation_prompt(
    language: PromptLanguage,
    schema: &str,
    question: &str,
) -> Result<String, PromptError> {
    let template = match language {
        PromptLanguage::Chinese => GENERATION_TEMPLATE_ZH,
        PromptLanguage::English => GENERATION_TEMPLATE_EN,
    };
    let examples = render_examples(language);
    let rules = render_rules(language);
    template.render(&[
        ("schema", schema),
        ("examples", &examples),
        ("rules", &rules),
        ("question", question),
    ])
}

pub fn summary_prompt(
    question: &str,
    sql: &str,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<String, PromptError> {
    let table = render_result_table(columns, rows);
    SUMMARY_TEMPLATE_ZH.render(&[("question", question), ("sql", sql), ("table", &table)])
}

/// Header, a 30-dash divider, then one pipe-delimited line per row.
#[must_use]
pub fn render_result_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    if rows.is_empty() {
        return NO_RESULT_MARKER.to_string();
    }

    let mut table = columns.join(" | ");
    table.push('\n');
    table.push_str(&"-".repeat(RESULT_DIVIDER_WIDTH));
    table.push('\n');
    for row in rows {
        let cells = row.iter().map(display_value).collect::<Vec<_>>();
        table.push_str(&cells.join(" | "));
        table.push('\n');
    }
    table
}

#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
