//! Error types for feedcast
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] type with `#[from]` conversions for I/O, HTTP and JSON failures
//! - [`ResolutionError`] for feed sources that could not be turned into a channel
//! - [`ConversionError`] for media conversion backends
//! - HTTP status code mapping used by the feed server

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for feedcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feedcast
///
/// Most failures inside a refresh are soft: they are logged and the feed keeps its
/// last known state. The variants that reach callers are configuration problems,
/// persistence failures and server bind errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "server.port")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A feed source could not be resolved into a channel
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Media conversion failed
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// The feed server could not bind its listening socket
    #[error("failed to bind feed server to {address}: {source}")]
    ServerBind {
        /// Address the server attempted to bind
        address: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Feed server runtime error
    #[error("feed server error: {0}")]
    Server(String),

    /// Persisted state could not be read or written
    #[error("persistence error: {0}")]
    Persistence(String),

    /// External tool execution failed (e.g., yt-dlp)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Requested feed or file not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

/// Reasons a feed URL could not be resolved by one strategy
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The source could not be reached at all
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// The source answered with an error status
    #[error("source returned HTTP {0}")]
    HttpStatus(u16),

    /// The document is neither valid RSS nor valid Atom
    #[error("malformed feed: {0}")]
    Malformed(String),

    /// The playlist listing produced nothing usable
    #[error("no entries found")]
    NoEntries,

    /// The playlist extractor failed
    #[error("extractor failed: {0}")]
    ExtractorFailed(String),
}

/// Errors raised while converting a media link into a local audio file
#[derive(Debug, Error)]
pub enum ConversionError {
    /// A single backend reported failure
    #[error("backend {backend} failed: {reason}")]
    BackendFailed {
        /// Name of the backend
        backend: &'static str,
        /// Human-readable failure reason
        reason: String,
    },

    /// A backend claimed success but the output is not audio
    #[error("backend {backend} produced invalid output")]
    InvalidOutput {
        /// Name of the backend
        backend: &'static str,
    },

    /// Every backend in the chain failed
    #[error("all conversion backends failed")]
    Exhausted,
}

impl ConversionError {
    /// Shorthand for a [`ConversionError::BackendFailed`]
    pub fn backend(backend: &'static str, reason: impl Into<String>) -> Self {
        ConversionError::BackendFailed {
            backend,
            reason: reason.into(),
        }
    }
}

/// Convert errors to HTTP status codes for feed server responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::NotFound(_) => 404,

            Error::Io(_)
            | Error::Serialization(_)
            | Error::Server(_)
            | Error::ServerBind { .. }
            | Error::Persistence(_)
            | Error::Conversion(_)
            | Error::Other(_) => 500,

            // upstream failures
            Error::Network(_) | Error::Resolution(_) => 502,

            Error::ExternalTool(_) => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Resolution(_) => "resolution_error",
            Error::Conversion(_) => "conversion_error",
            Error::ServerBind { .. } => "server_bind_error",
            Error::Server(_) => "server_error",
            Error::Persistence(_) => "persistence_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotFound(_) => "not_found",
            Error::Other(_) => "internal_error",
        }
    }
}
