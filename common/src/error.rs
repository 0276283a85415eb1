// Error types for the PonPulse edge agent
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("no configuration for equipment {0}")]
    ConfigMissing(String),

    #[error("transport failure on {equipment}: {detail}")]
    Transport { equipment: String, detail: String },

    #[error("device rejected '{command}': {output}")]
    Execute { command: String, output: String },

    #[error("unparseable output for {what}: {hint}")]
    Parse { what: String, hint: String },

    #[error("verification failed for {target}: expected one of [{expected}], last observed '{observed}'")]
    Verification {
        target: String,
        expected: String,
        observed: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("no available ONU ID on {0}")]
    NoFreeOnuId(String),

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl AgentError {
    /// Transport-level failures are worth retrying on the next poll;
    /// everything else is a command-level verdict.
    pub fn is_retriable(&self) -> bool {
        matches!(self, AgentError::Transport { .. } | AgentError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
