use thiserror::Error;

/// The main error type for monospace operations.
///
/// Every recoverable failure carries its kind in the variant so callers can
/// decide whether to abort before any job starts (config, pipeline,
/// resolution) or to keep going (execution, state restore).
#[derive(Debug, Error)]
pub enum MonospaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Project error: {0}")]
    Project(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Runner error: {0}")]
    Runner(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("User Aborted")]
    Aborted,

    #[error("unterminated {quote} quote in '{input}'")]
    ParseQuote { quote: char, input: String },
}

/// Result type alias for monospace operations
pub type MonospaceResult<T> = Result<T, MonospaceError>;
