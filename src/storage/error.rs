//! Versioned store error type.
use thiserror::Error;

/// Errors raised by the versioned store client or the state resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level failure talking to the store; safe to retry.
    #[error("transient store failure: {0}")]
    Transient(String),
    /// The store returned a payload that does not decode as expected.
    #[error("corrupt store payload: {0}")]
    Corrupt(String),
    /// An invalid cursor was supplied to a scan.
    #[error("invalid scan cursor")]
    InvalidCursor,
}
