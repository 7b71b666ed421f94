//! Error types for PharmaGuard

/// Result type alias using PharmaGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for PharmaGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Classification rule errors (bad globs, keyword sets)
    #[error("classification error: {0}")]
    Classification(String),

    /// Audit store errors
    #[error("audit store error: {0}")]
    Store(String),

    /// Log sink errors
    #[error("log sink error: {0}")]
    Sink(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new classification error
    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    /// Create a new audit store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new log sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
