use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use clap::Args;
use tracing::warn;

use crate::config::AppConfig;
use crate::executor::{QueryResult, SqliteExecutor};
use crate::fallback::{FallbackSection, missing_known_tables};
use crate::generate::PromptStrategy;
use crate::llm::OllamaClient;
use crate::pipeline::Pipeline;
use crate::prompt::display_value;
use crate::schema::introspect_schema;
use crate::sqlite::open_read_only_connection;
use crate::translate::TranslationChain;

pub const INPUT_PROMPT: &str = "\n请输入你的分析需求（或直接输入SQL）：\n> ";
pub const GOODBYE: &str = "感谢使用，再见！";
pub const NO_ROWS: &str = "没有查询到数据。";
const EXIT_WORDS: &[&str] = &["exit", "quit", "退出"];
const BANNER_RULE: &str = "----------------------------------------------------------";

#[derive(Debug, Clone, Args)]
pub struct ReplArgs {
    #[arg(long, value_enum, default_value_t = PromptStrategy::Direct)]
    pub prompt_strategy: PromptStrategy,
}

pub fn run(args: &ReplArgs, config: &AppConfig) -> Result<()> {
    let connection = open_read_only_connection(&config.db_path)?;
    let description = introspect_schema(&connection)?;
    let missing = missing_known_tables(&description);
    if !missing.is_empty() {
        warn!(?missing, "event tables missing; today fallback will report errors");
    }
    let schema = description.render();
    let llm = OllamaClient::new(&config.llm)?;
    let translator = match args.prompt_strategy {
        PromptStrategy::Direct => TranslationChain::disabled(),
        PromptStrategy::Translated => TranslationChain::from_config(&config.translate)?,
    };
    let executor = SqliteExecutor::new(&connection);
    let pipeline = Pipeline::new(&llm, &translator, &executor, args.prompt_strategy);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    run_loop(&pipeline, &schema, stdin.lock(), &mut stdout)
}

/// Reads questions until EOF or an exit word. Per-question failures are
/// printed and the loop keeps going.
pub fn run_loop<R: BufRead, W: Write>(
    pipeline: &Pipeline<'_>,
    schema: &str,
    mut input: R,
    output: &mut W,
) -> Result<()> {
    write_banner(output, schema)?;

    let mut line = String::new();
    loop {
        write!(output, "{INPUT_PROMPT}").context("failed to write prompt")?;
        output.flush().context("failed to flush prompt")?;

        line.clear();
        if input.read_line(&mut line).context("failed to read input")? == 0 {
            writeln!(output, "\n{GOODBYE}").context("failed to write output")?;
            return Ok(());
        }
        let user_input = line.trim();
        if user_input.is_empty() {
            continue;
        }
        if is_exit_word(user_input) {
            writeln!(output, "{GOODBYE}").context("failed to write output")?;
            return Ok(());
        }

        answer_one(pipeline, schema, user_input, output)?;
    }
}

fn answer_one<W: Write>(
    pipeline: &Pipeline<'_>,
    schema: &str,
    user_input: &str,
    output: &mut W,
) -> Result<()> {
    let raw_sql = is_raw_sql(user_input);
    if !raw_sql {
        writeln!(output, "正在调用本地AI模型生成SQL，请稍候...")?;
    }

    let sql = match pipeline.resolve_sql(user_input, raw_sql.then_some(user_input), schema) {
        Ok(sql) => sql,
        Err(error) => {
            writeln!(output, "{error}")?;
            return Ok(());
        }
    };
    if !raw_sql {
        writeln!(output, "\nAI生成的SQL:\n{sql}")?;
    }

    let outcome = match pipeline.run_query(&sql) {
        Ok(outcome) => outcome,
        Err(error) => {
            writeln!(output, "{error}")?;
            return Ok(());
        }
    };

    writeln!(output, "{}", render_console_table(&outcome.result))?;
    if !outcome.fallback.is_empty() {
        write!(output, "{}", render_fallback_sections(&outcome.fallback))?;
    }

    writeln!(output, "\nAI分析总结：")?;
    match pipeline.summarize(user_input, sql.as_str(), &outcome.result) {
        Ok(summary) => writeln!(output, "{summary}")?,
        Err(error) => {
            warn!(error = %error, "summary failed");
            writeln!(output, "{error}")?;
        }
    }
    Ok(())
}

#[must_use]
pub fn is_exit_word(input: &str) -> bool {
    let lowered = input.to_lowercase();
    EXIT_WORDS.contains(&lowered.as_str())
}

/// Input starting with `select` or `with` is run as SQL instead of being
/// sent to the model.
#[must_use]
pub fn is_raw_sql(input: &str) -> bool {
    let lowered = input.trim_start().to_lowercase();
    lowered.starts_with("select") || lowered.starts_with("with")
}

fn write_banner<W: Write>(output: &mut W, schema: &str) -> Result<()> {
    writeln!(output, "欢迎使用本地AI数据库分析助手（Ollama版）")?;
    writeln!(output, "输入自然语言问题，或直接输入SQL语句。输入 exit 退出。")?;
    writeln!(output, "{BANNER_RULE}")?;
    writeln!(output, "数据库结构如下：")?;
    writeln!(output, "{schema}")?;
    writeln!(output, "{BANNER_RULE}")?;
    Ok(())
}

/// Left-aligned columns padded to the widest cell and a dashed rule as wide
/// as the header.
#[must_use]
pub fn render_console_table(result: &QueryResult) -> String {
    if result.is_empty() {
        return NO_ROWS.to_string();
    }

    let cells = result
        .rows
        .iter()
        .map(|row| row.iter().map(display_value).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let widths = result
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .filter_map(|row| row.get(index))
                .map(|cell| cell.chars().count())
                .fold(column.chars().count(), usize::max)
        })
        .collect::<Vec<_>>();

    let header = pad_cells(&result.columns, &widths);
    let mut lines = vec![
        header.trim_end().to_string(),
        "-".repeat(header.chars().count()),
    ];
    for row in &cells {
        lines.push(pad_cells(row, &widths).trim_end().to_string());
    }
    lines.join("\n")
}

fn pad_cells(values: &[String], widths: &[usize]) -> String {
    values
        .iter()
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[must_use]
pub fn render_fallback_sections(sections: &[FallbackSection]) -> String {
    let mut rendered = String::new();
    for section in sections {
        rendered.push_str(&format!("\n今天的{}（{}）：\n", section.label, section.table));
        match &section.outcome {
            Ok(result) => rendered.push_str(&render_console_table(result)),
            Err(error) => rendered.push_str(&format!("查询失败: {}", error.message)),
        }
        rendered.push('\n');
    }
    rendered
}
