//! Error types for agent-core

use thiserror::Error;

/// Result type alias for agent-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for agent operations
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// Agent initialization failed
    #[error("Agent initialization failed: {0}")]
    InitializationFailed(String),

    /// Agent processing failed
    #[error("Agent processing failed: {0}")]
    ProcessingFailed(String),

    /// An external service (LLM, market data, search) kept failing
    #[error("{service} call failed after {attempts} attempt(s): {message}")]
    ExternalCall {
        /// Service that was called (e.g. "llm:gemini", "yahoo")
        service: String,
        /// Number of attempts made before giving up
        attempts: u32,
        /// Last error reported by the service
        message: String,
    },

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Build an [`Error::ExternalCall`]
    pub fn external(service: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::ExternalCall {
            service: service.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Whether the error came from an external call
    pub fn is_external(&self) -> bool {
        matches!(self, Self::ExternalCall { .. })
    }
}
