//! Transport errors.

use thiserror::Error;

/// Errors raised by the in-memory transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The namespace was removed from its server.
    #[error("namespace {0} is closed")]
    NamespaceClosed(String),

    /// A socket with this id is already connected to the server.
    #[error("socket id {0} is already connected")]
    DuplicateSocket(String),
}
