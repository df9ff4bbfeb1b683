//! Error types for PageChat.
//!
//! Library crates use [`PageChatError`] via `thiserror`.
//! App crates (cli/tui) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all PageChat operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PageChatError {
    /// Transport-level failure (connection refused, reset, DNS, ...).
    #[error("network error: {0}")]
    Network(String),

    /// A single request attempt exceeded its deadline and was cancelled.
    #[error("request to {endpoint} timed out after {timeout_ms} ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// The backend answered with a non-2xx status.
    #[error("backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    /// Indexing did not produce a ready analysis within the allowed time.
    #[error("indexing did not finish within {waited_ms} ms")]
    IndexingTimeout { waited_ms: u64 },

    /// Input rejected before any network call (empty question, restricted page, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Response body could not be decoded into the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The owning workflow run was superseded or torn down.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Key-value store / database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PageChatError>;

impl PageChatError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Whether the request client should try again after this failure.
    ///
    /// Validation, cancellation and local (config/storage/io) errors are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::Backend { .. } | Self::Parse { .. }
        )
    }

    /// Short user-facing description, used for inline error entries.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Could not reach the backend. Is it running?".to_string(),
            Self::Timeout { .. } => "The backend took too long to answer.".to_string(),
            Self::Backend { status, .. } => format!("The backend failed (HTTP {status})."),
            Self::IndexingTimeout { waited_ms } => format!(
                "Indexing is taking longer than {}s. Try connecting again.",
                waited_ms / 1000
            ),
            Self::Validation { message } => message.clone(),
            Self::Parse { .. } => "The backend sent a response I could not read.".to_string(),
            Self::Cancelled(_) => "Cancelled.".to_string(),
            Self::Config { message } => format!("Configuration problem: {message}"),
            Self::Storage(_) | Self::Io { .. } => "Local storage is unavailable.".to_string(),
        }
    }
}
