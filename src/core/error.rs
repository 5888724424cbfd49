//! Custom error types for Careline
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for Careline operations
#[derive(Error, Debug)]
pub enum CarelineError {
    /// The model backend could not produce a response (timeout, bad output, quota)
    #[error("Upstream inference error: {0}")]
    Upstream(String),

    /// Session store load/save failures
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model not available
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Convenience Result type for Careline operations
pub type Result<T> = std::result::Result<T, CarelineError>;

impl CarelineError {
    /// Create an upstream inference error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Create a session store error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::SessionStore(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an error with additional context
    pub fn with_context<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Whether this error came from the model backend
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::ModelNotFound(_))
    }
}
