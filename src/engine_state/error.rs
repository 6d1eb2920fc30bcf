//! The structured error surfaced to the engine's caller.
use thiserror::Error;

use crate::{execution, storage};

/// Outcome of a failed view call, carrying a stable machine-readable tag.
///
/// No implementation-level detail leaks through this type; messages are
/// either guest-authored (panic, abort, logs) or single-line summaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// No account revision at or below the pinned height.
    #[error("account not found: {contract_id}")]
    AccountNotFound {
        /// The queried contract.
        contract_id: String,
    },
    /// No code revision at or below the pinned height.
    #[error("code not found: {contract_id}")]
    CodeNotFound {
        /// The queried contract.
        contract_id: String,
    },
    /// The bytecode is invalid or could not be instantiated.
    #[error("code compilation failed: {message}")]
    CodeCompilation {
        /// What went wrong preparing the module.
        message: String,
    },
    /// The requested export is absent or not callable.
    #[error("method not found: {method_name}")]
    MethodNotFound {
        /// The requested export.
        method_name: String,
    },
    /// The guest panicked, trapped, or misused the bridge.
    #[error("guest panicked: {message}")]
    Panic {
        /// Guest-supplied or trap-describing message.
        message: String,
    },
    /// The guest invoked `abort`.
    #[error("{message}")]
    Abort {
        /// Structured `abort: file:line:col msg` message.
        message: String,
    },
    /// The guest called a host import the view engine does not support.
    /// Signals the caller to retry via an external authoritative node.
    #[error("host function not implemented: {host_function}")]
    NotImplemented {
        /// Name of the unsupported import.
        host_function: String,
    },
    /// The call deadline expired.
    #[error("view call deadline exceeded")]
    Timeout,
    /// Versioned store I/O failure or worker loss; safe to retry.
    #[error("transient failure: {message}")]
    Transient {
        /// Short failure summary.
        message: String,
    },
}

impl Error {
    /// The stable tag identifying this error kind on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::AccountNotFound { .. } => "accountNotFound",
            Error::CodeNotFound { .. } => "codeNotFound",
            Error::CodeCompilation { .. } => "codeCompilation",
            Error::MethodNotFound { .. } => "methodNotFound",
            Error::Panic { .. } => "panic",
            Error::Abort { .. } => "abort",
            Error::NotImplemented { .. } => "notImplemented",
            Error::Timeout => "timeout",
            Error::Transient { .. } => "transient",
        }
    }
}

impl From<storage::Error> for Error {
    fn from(store_error: storage::Error) -> Self {
        Error::Transient {
            message: store_error.to_string(),
        }
    }
}

impl From<execution::Error> for Error {
    fn from(execution_error: execution::Error) -> Self {
        match execution_error {
            execution::Error::AccountNotFound(contract_id) => {
                Error::AccountNotFound { contract_id }
            }
            execution::Error::NoSuchMethod(method_name) => Error::MethodNotFound { method_name },
            execution::Error::GuestPanic(message) => Error::Panic { message },
            execution::Error::GuestAbort(message) => Error::Abort { message },
            execution::Error::NotImplemented(host_function) => {
                Error::NotImplemented { host_function }
            }
            execution::Error::Timeout => Error::Timeout,
            execution::Error::WorkerLost => Error::Transient {
                message: "view worker lost".to_string(),
            },
            execution::Error::Storage(store_error) => store_error.into(),
            execution::Error::Instantiation(message) => Error::CodeCompilation { message },
            execution::Error::Resolver(resolver_error) => Error::CodeCompilation {
                message: resolver_error.to_string(),
            },
            execution::Error::UnsupportedWasmStart => Error::CodeCompilation {
                message: "unsupported wasm start section".to_string(),
            },
            // Interpreter traps and bridge misuse are guest faults; they
            // surface under the panic tag with a descriptive message.
            guest_fault => Error::Panic {
                message: guest_fault.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        let cases: Vec<(Error, &str)> = vec![
            (
                Error::AccountNotFound {
                    contract_id: "c".to_string(),
                },
                "accountNotFound",
            ),
            (
                Error::CodeNotFound {
                    contract_id: "c".to_string(),
                },
                "codeNotFound",
            ),
            (
                Error::CodeCompilation {
                    message: "bad".to_string(),
                },
                "codeCompilation",
            ),
            (
                Error::MethodNotFound {
                    method_name: "m".to_string(),
                },
                "methodNotFound",
            ),
            (
                Error::Panic {
                    message: "kaboom".to_string(),
                },
                "panic",
            ),
            (
                Error::Abort {
                    message: "abort: f.ts:1:2 oh".to_string(),
                },
                "abort",
            ),
            (
                Error::NotImplemented {
                    host_function: "storage_write".to_string(),
                },
                "notImplemented",
            ),
            (Error::Timeout, "timeout"),
            (
                Error::Transient {
                    message: "io".to_string(),
                },
                "transient",
            ),
        ];
        for (error, tag) in cases {
            assert_eq!(error.tag(), tag);
        }
    }

    #[test]
    fn guest_faults_surface_as_panics() {
        let converted: Error = execution::Error::InvalidRegister(7).into();
        assert_eq!(converted.tag(), "panic");
        let converted: Error = execution::Error::Interpreter("unreachable".to_string()).into();
        assert_eq!(converted.tag(), "panic");
    }
}
