//! Error types for the view cache
//!
//! Provides structured error types for the client cache, its endpoint
//! listener, and both sides of the authority protocol.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the view cache
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Startup Errors
    // =========================================================================
    #[error("Startup failed during {phase}: {source}")]
    Startup {
        phase: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Listener failed to bind {addr}: {reason}")]
    ListenerBind { addr: String, reason: String },

    #[error("Listener exited before publishing its address")]
    ListenerNotReady,

    // =========================================================================
    // Authority Errors
    // =========================================================================
    #[error("Authority unreachable at {endpoint}: {reason}")]
    AuthorityUnreachable { endpoint: String, reason: String },

    #[error("Authority rejected {operation} with status {status}: {message}")]
    AuthorityRejected {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Remote call {operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Write-through to authority failed: {source}")]
    WriteThrough {
        #[source]
        source: Box<Error>,
    },

    #[error("Client unreachable at {address}: {reason}")]
    ClientUnreachable { address: String, reason: String },

    // =========================================================================
    // Listener Errors
    // =========================================================================
    #[error("Inbound dispatch failed: {0}")]
    Dispatch(String),

    #[error("Invalid callable address: {0}")]
    InvalidAddress(String),

    // =========================================================================
    // Transport / Parse Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take when an operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Retry after specific duration
    RetryAfter(Duration),
    /// Don't retry, the failure will not go away on its own
    Abort,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Transport(_)
            | Error::AuthorityUnreachable { .. }
            | Error::ClientUnreachable { .. }
            | Error::Timeout { .. } => ErrorAction::RetryWithBackoff,

            // Authority overloaded or restarting
            Error::AuthorityRejected { status, .. } if *status >= 500 => {
                ErrorAction::RetryAfter(Duration::from_secs(1))
            }

            // Wrapped errors carry the classification of their cause
            Error::WriteThrough { source } | Error::Startup { source, .. } => source.action(),

            // Everything else needs a different input to succeed
            _ => ErrorAction::Abort,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::Abort)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_)
            | Error::AuthorityUnreachable { .. }
            | Error::ClientUnreachable { .. }
            | Error::Timeout { .. } => true,
            Error::WriteThrough { source } => source.is_transient(),
            _ => false,
        }
    }

    /// Wrap this error as a fatal startup failure for the given phase
    pub fn during_startup(self, phase: &'static str) -> Self {
        Error::Startup {
            phase,
            source: Box::new(self),
        }
    }

    /// Wrap this error as a failed write-through
    pub fn write_through(self) -> Self {
        Error::WriteThrough {
            source: Box::new(self),
        }
    }
}

/// Result type alias for the view cache
pub type Result<T> = std::result::Result<T, Error>;
