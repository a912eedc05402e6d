use thiserror::Error;
use tracing::debug;

use crate::executor::QueryResult;
use crate::llm::{LlmError, LlmService};
use crate::prompt::{PromptError, summary_prompt};

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("AI分析总结失败: {0}")]
    Llm(#[from] LlmError),
    #[error("AI分析总结失败: {0}")]
    Prompt(#[from] PromptError),
}

pub struct Summarizer<'a> {
    llm: &'a dyn LlmService,
}

impl<'a> Summarizer<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmService) -> Self {
        Self { llm }
    }

    /// An empty completion is returned as an empty narrative.
    pub fn summarize(
        &self,
        question: &str,
        sql: &str,
        result: &QueryResult,
    ) -> Result<String, SummaryError> {
        let prompt = summary_prompt(question, sql, &result.columns, &result.rows)?;
        let narrative = self.llm.complete(&prompt, None)?;
        debug!(chars = narrative.chars().count(), "summary received");
        Ok(narrative.trim().to_string())
    }
}
