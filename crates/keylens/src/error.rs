use thiserror::Error;

use crate::executor::ExecutionError;
use crate::generate::GenerationError;
use crate::guard::SqlBlocked;
use crate::summary::SummaryError;

/// Request-level failures. Only `Blocked` is a caller mistake; the rest are
/// internal failures.
#[derive(Debug, Error)]
pub enum AskError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Blocked(#[from] SqlBlocked),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
}

impl AskError {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation_failed",
            Self::Blocked(_) => "sql_blocked",
            Self::Execution(_) => "execution_failed",
            Self::Summary(_) => "summary_failed",
        }
    }
}
