use serde_json::Value;
use thiserror::Error;

/// Failures raised while resolving or executing a tool call.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid input for tool '{tool}', expected {expected}: {source}")]
    InputMismatch {
        tool: String,
        input: Value,
        expected: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Tool '{tool}' execution failed")]
    ExecutionFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ToolError {
    /// The name of the tool that produced this error.
    pub fn tool_name(&self) -> &str {
        match self {
            ToolError::NotFound(name) => name,
            ToolError::InputMismatch { tool, .. } => tool,
            ToolError::ExecutionFailed { tool, .. } => tool,
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CounselError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Advisor '{advisor}' aborted the chain")]
    ChainAborted {
        advisor: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Model call failed")]
    Model(#[source] anyhow::Error),

    #[error("Conversation memory operation failed")]
    Memory(#[source] anyhow::Error),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Tool loop exceeded {rounds} rounds without a final response")]
    ToolLoopExceeded { rounds: usize },

    #[error("Prompt template rendering failed")]
    Template(#[source] tera::Error),
}

impl CounselError {
    /// Wrap an advisor-phase failure, recording which advisor raised it.
    pub fn chain_aborted(advisor: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        CounselError::ChainAborted {
            advisor: advisor.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = CounselError> = std::result::Result<T, E>;
