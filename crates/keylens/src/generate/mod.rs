use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::{LlmError, LlmService};
use crate::prompt::{PromptError, PromptLanguage, generation_prompt};
use crate::translate::TranslationChain;

/// How the question reaches the model.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PromptStrategy {
    /// Chinese template, question and schema passed verbatim.
    #[default]
    Direct,
    /// English template; schema and question go through the translation chain first.
    Translated,
}

impl PromptStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Translated => "translated",
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("SQL生成失败: {0}")]
    Llm(#[from] LlmError),
    #[error("SQL生成失败: 模型没有返回可执行的SQL语句 (raw output: {raw:?})")]
    EmptyStatement { raw: String },
    #[error("SQL生成失败: {0}")]
    Prompt(#[from] PromptError),
}

pub struct SqlGenerator<'a> {
    llm: &'a dyn LlmService,
    translator: &'a TranslationChain,
    strategy: PromptStrategy,
}

impl<'a> SqlGenerator<'a> {
    #[must_use]
    pub fn new(
        llm: &'a dyn LlmService,
        translator: &'a TranslationChain,
        strategy: PromptStrategy,
    ) -> Self {
        Self {
            llm,
            translator,
            strategy,
        }
    }

    pub fn generate(&self, question: &str, schema: &str) -> Result<String, GenerationError> {
        let prompt = match self.strategy {
            PromptStrategy::Direct => generation_prompt(PromptLanguage::Chinese, schema, question)?,
            PromptStrategy::Translated => {
                let schema = self.translator.translate_lines(schema);
                let question = self.translator.translate_or_original(question);
                debug!(translated_question = %question, "question translated for generation");
                generation_prompt(PromptLanguage::English, &schema, &question)?
            }
        };

        let raw = self.llm.complete(&prompt, None)?;
        let sql = first_statement(&raw).ok_or(GenerationError::EmptyStatement { raw })?;
        info!(strategy = self.strategy.as_str(), sql = %sql, "generated sql");
        Ok(sql)
    }
}

fn code_fence_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n?(.*?)(?:```|\z)").expect("code fence regex should compile")
    })
}

/// Body of the first markdown code fence, or the input when there is none.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    code_fence_regex()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map_or(text, |body| body.as_str())
}

/// Keeps only the first statement and terminates it with exactly one `;`.
/// `None` when nothing but whitespace precedes the first `;`.
#[must_use]
pub fn first_statement(raw: &str) -> Option<String> {
    let trimmed = strip_code_fence(raw).trim();
    let head = trimmed
        .split_once(';')
        .map_or(trimmed, |(head, _)| head)
        .trim_end();
    if head.is_empty() {
        return None;
    }
    Some(format!("{head};"))
}
