//! Access to the versioned key-value store that backs the engine.
//!
//! The store itself is an external service populated by an indexer; this
//! module only defines the thin client contract the engine consumes, the
//! bit-exact keyspace, and the state resolver that composes the client
//! primitives into domain queries.
pub mod error;
pub mod in_memory;
pub mod keyspace;
pub mod state_resolver;

pub use error::Error;
pub use in_memory::InMemoryVersionedStore;
pub use state_resolver::{Snapshot, StateResolver};

/// The initial scan cursor, and also the value that signals scan completion.
pub const SCAN_CURSOR_START: &[u8] = b"0";

/// Client contract over the external ordered key-value service.
///
/// All three primitives return raw bytes; no interpretation happens at this
/// layer. Transport failures surface as [`Error::Transient`].
pub trait VersionedStore: Send + Sync {
    /// Exact-key fetch. Keys may be arbitrary byte strings.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    /// Returns the single member of the ordered set at `set_key` with the
    /// greatest score not exceeding `max_score`, or `None` if no member
    /// qualifies.
    fn revrange_le(&self, set_key: &[u8], max_score: u64) -> Result<Option<Vec<u8>>, Error>;

    /// Cooperative cursor-based key scan.
    ///
    /// `pattern` is a literal byte prefix optionally terminated by `*`. Pass
    /// [`SCAN_CURSOR_START`] to begin; iteration is complete when the
    /// returned cursor equals [`SCAN_CURSOR_START`] again. `count_hint` is
    /// advisory and implementations may return more or fewer keys per step.
    fn scan(
        &self,
        cursor: &[u8],
        pattern: &[u8],
        count_hint: usize,
    ) -> Result<(Vec<u8>, Vec<Vec<u8>>), Error>;
}
