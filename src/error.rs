//! Error types for the extraction pipeline.
//!
//! Only conditions that change control flow are errors. A field that no
//! strategy could locate is `None`, and a record whose name fails validation
//! is reported through `DetailOutcome::Rejected`, not through these types.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a browser backend.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The browser could not be started or attached to.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// A page load failed (network error, timeout, HTTP error status).
    #[error("failed to load {url}: {message}")]
    Load { url: String, message: String },

    /// A structural query could not be evaluated.
    #[error("query {query} failed: {message}")]
    Query { query: String, message: String },

    /// An element handle no longer refers to a node on the current page.
    #[error("element is no longer attached to the page")]
    Detached,

    /// Clicking an element failed.
    #[error("click failed: {0}")]
    Click(String),

    /// The backend does not implement the requested capability.
    #[error("{0} is not supported by this browser backend")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the pipeline components.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Bad input to a component call; fatal to that call only.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Navigation still failed after every retry attempt.
    #[error("navigation to {url} failed after {attempts} attempts: {source}")]
    Navigation {
        url: String,
        attempts: u32,
        #[source]
        source: BrowserError,
    },

    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// Both the primary writer and the raw fallback writer failed.
    #[error("failed to write records to {path}: {message}")]
    Serialization { path: PathBuf, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;
