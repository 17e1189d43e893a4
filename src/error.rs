//! Error types for db-gate.
//!
//! `GateError` covers connection management, configuration and driver
//! failures. The gateway converts it into an `ExecutionError` before it
//! reaches an agent, see `crate::gateway`.

use thiserror::Error;

/// Main error type for db-gate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, missing tables, timeouts, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, bad patterns, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema introspection errors (allowlisted table missing, etc.)
    #[error("Schema error: {0}")]
    Schema(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a schema error with the given message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Schema(_) => "Schema Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Connection(msg)
            | Self::Query(msg)
            | Self::Config(msg)
            | Self::Schema(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

/// Result type alias using GateError.
pub type Result<T> = std::result::Result<T, GateError>;
