//! Error types for the instrumentation layer.
//!
//! Measurement failures never show up here: a payload that cannot be sized
//! contributes zero bytes and is otherwise ignored. The only errors are the
//! ones that make starting the instrumentation pointless.

use thiserror::Error;

/// Errors raised while starting instrumentation.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric could not be created or its name collides with one already
    /// present in the registry.
    #[error("metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    /// A background task was requested outside a tokio runtime.
    #[error("namespace polling and the exporter require a tokio runtime")]
    NoRuntime,

    /// The exporter path is not an absolute route such as `/metrics`.
    #[error("exporter path must start with '/', got '{0}'")]
    InvalidPath(String),

    /// The exporter bind address is not a valid socket address.
    #[error("invalid exporter address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

impl MetricsError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Registration(_) => "registration",
            Self::NoRuntime => "no_runtime",
            Self::InvalidAddress { .. } => "invalid_address",
            Self::InvalidPath(_) => "invalid_path",
        }
    }
}
