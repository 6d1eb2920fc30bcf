//! Errors from the host import resolvers.
use thiserror::Error;

/// An error resolving a module's imports against the view-call host ABI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// The module did not import the host-provided linear memory.
    #[error("no imported memory")]
    NoImportedMemory,
}
