//! Execution error and supporting code.
use thiserror::Error;

use crate::{resolvers::error::ResolverError, storage};

/// Possible execution errors.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Unable to prepare a WASM instance from a compiled module.
    #[error("instantiation error: {0}")]
    Instantiation(String),
    /// WASM interpreter error while the guest was running.
    #[error("interpreter error: {0}")]
    Interpreter(String),
    /// Versioned store error reached through a host function.
    #[error("storage error: {0}")]
    Storage(storage::Error),
    /// Error using the WASM host function resolver.
    #[error("resolver error: {0}")]
    Resolver(ResolverError),
    /// WASM bytes contain an unsupported "start" section.
    #[error("unsupported wasm start")]
    UnsupportedWasmStart,
    /// No account revision at or below the pinned height.
    #[error("account not found: {0}")]
    AccountNotFound(String),
    /// The requested export is absent or is not callable.
    #[error("no such method: {0}")]
    NoSuchMethod(String),
    /// The guest invoked `panic` or `panic_utf8`.
    #[error("guest panic: {0}")]
    GuestPanic(String),
    /// The guest invoked `abort`.
    #[error("guest abort: {0}")]
    GuestAbort(String),
    /// The guest called a host import the view engine does not support.
    #[error("host function not implemented: {0}")]
    NotImplemented(String),
    /// The guest named a register that holds no value.
    #[error("invalid register id: {0}")]
    InvalidRegister(u64),
    /// The guest named a storage iterator that was never opened.
    #[error("invalid iterator id: {0}")]
    InvalidIterator(u64),
    /// The guest passed bytes that do not decode as UTF-8.
    #[error("invalid utf-8 from guest")]
    InvalidUtf8,
    /// The guest passed bytes that do not decode as UTF-16.
    #[error("invalid utf-16 from guest")]
    InvalidUtf16,
    /// A pointer/length pair escaped the guest's linear memory.
    #[error("memory access error: {0}")]
    MemoryAccess(String),
    /// The call deadline expired.
    #[error("deadline exceeded")]
    Timeout,
    /// The worker executing the job went away without replying.
    #[error("worker lost")]
    WorkerLost,
}

impl From<storage::Error> for Error {
    fn from(error: storage::Error) -> Self {
        Error::Storage(error)
    }
}

impl From<ResolverError> for Error {
    fn from(error: ResolverError) -> Self {
        Error::Resolver(error)
    }
}

impl Error {
    /// True when the worker that produced this error must be discarded:
    /// instantiation residue, guest-level faults and expired deadlines all
    /// leave the sandbox in a state not worth trusting for the next call.
    pub(crate) fn destroys_worker(&self) -> bool {
        match self {
            Error::Instantiation(_)
            | Error::Interpreter(_)
            | Error::Resolver(_)
            | Error::UnsupportedWasmStart
            | Error::GuestPanic(_)
            | Error::GuestAbort(_)
            | Error::InvalidRegister(_)
            | Error::InvalidIterator(_)
            | Error::InvalidUtf8
            | Error::InvalidUtf16
            | Error::MemoryAccess(_)
            | Error::Timeout => true,
            Error::Storage(_)
            | Error::AccountNotFound(_)
            | Error::NoSuchMethod(_)
            | Error::NotImplemented(_)
            | Error::WorkerLost => false,
        }
    }
}

impl wasmi::HostError for Error {}
