//! Error types for leadharvest.
//!
//! Library crates use [`LeadHarvestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! An element missing from a page is never an error: extractors fall back to
//! default field values. Only navigation, storage and collaborator failures
//! surface here.

use std::path::PathBuf;

/// Top-level error type for all leadharvest operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadHarvestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A page could not be loaded (unreachable host, HTTP error status, body read failure).
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// A navigation exceeded its per-request timeout.
    #[error("navigation to {url} timed out")]
    Timeout { url: String },

    /// No persisted session exists; a manual login run is required.
    #[error("no session found at {path:?}; import one with `leadharvest session import`")]
    SessionAbsent { path: PathBuf },

    /// A protected page bounced to the login wall; the session has expired.
    #[error("session rejected while loading {url}; capture a fresh session")]
    SessionInvalid { url: String },

    /// Malformed input (URL, session file, cookie header).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedding collaborator failure or dimension mismatch.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid value struct, bad bounds).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Export artifact could not be written.
    #[error("export error: {0}")]
    Export(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadHarvestError>;

impl LeadHarvestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a navigation error for `url`.
    pub fn navigation(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
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
            source,
        }
    }

    /// Whether this error came from loading a page (as opposed to storage,
    /// embedding or local I/O).
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Self::Navigation { .. } | Self::Timeout { .. } | Self::SessionInvalid { .. }
        )
    }
}
