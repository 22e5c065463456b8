use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Operator input that can be corrected and retried.
    #[error("{0}")]
    Validation(String),

    #[error("unknown setup id {setup_id}")]
    NotFound { setup_id: String },

    #[error("No data available to generate report.")]
    NoData,

    #[error("intake must be submitted before running setups")]
    IntakeRequired,

    #[error("cannot {action} while runner is {state}")]
    InvalidTransition { action: &'static str, state: String },

    #[error("runner for {setup_id} was not dispatched by the current session")]
    ForeignRunner { setup_id: String },

    #[error("record {index} is no longer the last of {len} stored sessions")]
    StaleTarget { index: usize, len: usize },

    #[error("failed to access {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session store {} is malformed: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load setup catalog {}: {message}", path.display())]
    Catalog { path: PathBuf, message: String },

    #[error("failed to load config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl WorkflowError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn storage(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the operator can fix the problem and retry the same action.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NoData | Self::IntakeRequired)
    }
}
