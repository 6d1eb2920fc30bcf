//! Access to the host-provided linear memory of an instantiated module.
use wasmi::MemoryRef;

use super::error::ResolverError;

/// Implemented by resolvers that hand the module its linear memory.
pub(crate) trait MemoryResolver {
    /// Returns the memory instance allocated during import resolution.
    fn memory_ref(&self) -> Result<MemoryRef, ResolverError>;
}
