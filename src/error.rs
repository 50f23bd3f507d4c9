use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Generation service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("No SQL in generation response: {0}")]
    GenerationEmpty(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query execution error: {0}")]
    Execution(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Stable machine-readable kind, used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Validation(_) => "validation",
            AgentError::UpstreamUnavailable(_) => "upstream_unavailable",
            AgentError::GenerationEmpty(_) => "generation_empty",
            AgentError::Connection(_) => "connection",
            AgentError::Execution(_) => "execution",
            AgentError::Config(_) => "config",
            AgentError::Io(_) => "io",
            AgentError::Json(_) => "json",
        }
    }

    /// HTTP status this error maps to. The request handler is the only
    /// place that turns internal kinds into responses.
    pub fn status(&self) -> u16 {
        match self {
            AgentError::Validation(_) => 400,
            AgentError::UpstreamUnavailable(_) | AgentError::GenerationEmpty(_) => 502,
            AgentError::Connection(_) | AgentError::Execution(_) => 500,
            AgentError::Config(_) | AgentError::Io(_) | AgentError::Json(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
