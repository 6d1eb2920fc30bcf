//! Domain queries over the versioned store.
//!
//! The resolver composes the three store primitives into height-indexed
//! lookups: "latest revision of this resource as of height H" plus the
//! payload fetch for a resolved revision. A [`Snapshot`] pins one height
//! for the duration of a view call and memoizes every lookup so the call
//! observes a single point-in-time state even while the indexer keeps
//! writing underneath it.
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{keyspace, Error, VersionedStore};

/// A storage key scanned at a pinned height, with its value resolved at
/// that height (`None` when the entry is absent or deleted).
pub type ScannedEntry = (Vec<u8>, Option<Vec<u8>>);

/// Height-indexed state lookups over a shared store handle.
pub struct StateResolver<S> {
    store: Arc<S>,
    /// Bounded-TTL memo for `latest_block_height`; the only entry whose
    /// freshness matters more than its stability.
    latest_height_memo: Mutex<Option<(Instant, u64)>>,
    latest_height_ttl: Duration,
    retries: usize,
}

impl<S: VersionedStore> StateResolver<S> {
    /// Creates a resolver over `store`.
    pub fn new(store: Arc<S>, latest_height_ttl: Duration, retries: usize) -> Self {
        StateResolver {
            store,
            latest_height_memo: Mutex::new(None),
            latest_height_ttl,
            retries,
        }
    }

    /// Runs `operation`, retrying a bounded number of times on transient
    /// store failures. All other outcomes surface immediately.
    fn with_retry<T>(
        &self,
        name: &str,
        operation: impl Fn() -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut attempt = 0;
        loop {
            match operation() {
                Err(Error::Transient(message)) if attempt < self.retries => {
                    attempt += 1;
                    warn!(%name, attempt, %message, "transient store failure, retrying");
                }
                other => return other,
            }
        }
    }

    /// Returns the latest indexed block height.
    pub fn latest_height(&self) -> Result<u64, Error> {
        {
            let memo = self.latest_height_memo.lock();
            if let Some((fetched_at, height)) = *memo {
                if fetched_at.elapsed() < self.latest_height_ttl {
                    return Ok(height);
                }
            }
        }

        let raw = self
            .with_retry("latest_height", || {
                self.store.get(keyspace::LATEST_BLOCK_HEIGHT_KEY)
            })?
            // An empty index means the store has not been populated yet;
            // callers may retry once the indexer catches up.
            .ok_or_else(|| Error::Transient("latest_block_height not yet indexed".to_string()))?;

        let height = std::str::from_utf8(&raw)
            .ok()
            .and_then(|height| height.parse().ok())
            .ok_or_else(|| Error::Corrupt("latest_block_height is not ASCII decimal".to_string()))?;

        *self.latest_height_memo.lock() = Some((Instant::now(), height));
        trace!(height, "refreshed latest block height");
        Ok(height)
    }

    /// Latest code revision of `contract_id` as of `height`.
    pub fn code_revision(&self, contract_id: &str, height: u64) -> Result<Option<Vec<u8>>, Error> {
        let set_key = keyspace::code_index_key(contract_id);
        self.with_retry("code_revision", || self.store.revrange_le(&set_key, height))
    }

    /// Raw bytecode blob for `(contract_id, revision)`.
    pub fn code_blob(&self, contract_id: &str, revision: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let key = keyspace::code_value_key(contract_id, revision);
        self.with_retry("code_blob", || self.store.get(&key))
    }

    /// Latest account-record revision of `contract_id` as of `height`.
    pub fn account_revision(
        &self,
        contract_id: &str,
        height: u64,
    ) -> Result<Option<Vec<u8>>, Error> {
        let set_key = keyspace::account_index_key(contract_id);
        self.with_retry("account_revision", || self.store.revrange_le(&set_key, height))
    }

    /// Binary account record for `(contract_id, revision)`.
    pub fn account_blob(
        &self,
        contract_id: &str,
        revision: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        let key = keyspace::account_value_key(contract_id, revision);
        self.with_retry("account_blob", || self.store.get(&key))
    }

    /// Latest storage-entry revision of `composite_key` as of `height`.
    pub fn data_revision(
        &self,
        composite_key: &[u8],
        height: u64,
    ) -> Result<Option<Vec<u8>>, Error> {
        let set_key = keyspace::data_index_key(composite_key);
        self.with_retry("data_revision", || self.store.revrange_le(&set_key, height))
    }

    /// Raw value bytes for `(composite_key, revision)`. An empty payload is
    /// the tombstone marker and resolves to `None`.
    pub fn data_blob(&self, composite_key: &[u8], revision: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let key = keyspace::data_value_key(composite_key, revision);
        let value = self.with_retry("data_blob", || self.store.get(&key))?;
        Ok(value.filter(|value| !value.is_empty()))
    }

    /// Resolves `storage_key` of `contract_id` at `height`.
    pub fn data_at(
        &self,
        contract_id: &str,
        storage_key: &[u8],
        height: u64,
    ) -> Result<Option<Vec<u8>>, Error> {
        let composite = keyspace::composite_data_key(contract_id, storage_key);
        match self.data_revision(&composite, height)? {
            Some(revision) => self.data_blob(&composite, &revision),
            None => Ok(None),
        }
    }

    /// One step of a cursor scan over the storage keys of `contract_id`
    /// matching `pattern` (a `data:{C}:{prefix}*` pattern built with
    /// [`keyspace::data_scan_pattern`]). Returned keys are stripped of the
    /// `data:` and `{C}:` prefixes; each key's value is resolved at
    /// `height`, `None` when no revision ≤ `height` exists or the entry is
    /// tombstoned.
    pub fn scan_data_keys(
        &self,
        contract_id: &str,
        height: u64,
        pattern: &[u8],
        cursor: &[u8],
        limit: usize,
    ) -> Result<(Vec<u8>, Vec<ScannedEntry>), Error> {
        let (next_cursor, index_keys) =
            self.with_retry("scan_data_keys", || self.store.scan(cursor, pattern, limit))?;

        let mut entries = Vec::with_capacity(index_keys.len());
        for index_key in index_keys {
            let Some(storage_key) = keyspace::strip_data_prefixes(&index_key, contract_id) else {
                continue;
            };
            let value = match self.with_retry("scan_data_revision", || {
                self.store.revrange_le(&index_key, height)
            })? {
                Some(revision) => {
                    let composite = keyspace::composite_data_key(contract_id, storage_key);
                    self.data_blob(&composite, &revision)?
                }
                None => None,
            };
            entries.push((storage_key.to_vec(), value));
        }
        Ok((next_cursor, entries))
    }
}

/// Request-scoped view of contract state pinned at a single block height.
///
/// Every lookup is memoized, so repeated reads of one key within a call
/// return identical results even if the underlying store advances.
pub struct Snapshot<S> {
    resolver: Arc<StateResolver<S>>,
    block_height: u64,
    data_memo: HashMap<Vec<u8>, Option<Vec<u8>>>,
    account_memo: Option<Option<Vec<u8>>>,
}

impl<S: VersionedStore> Snapshot<S> {
    /// Pins a snapshot of `resolver` at `block_height`.
    pub fn new(resolver: Arc<StateResolver<S>>, block_height: u64) -> Self {
        Snapshot {
            resolver,
            block_height,
            data_memo: HashMap::new(),
            account_memo: None,
        }
    }

    /// The pinned block height.
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Reads `storage_key` of `contract_id` at the pinned height.
    pub fn storage_read(
        &mut self,
        contract_id: &str,
        storage_key: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        let composite = keyspace::composite_data_key(contract_id, storage_key);
        if let Some(value) = self.data_memo.get(&composite) {
            return Ok(value.clone());
        }
        let value = self
            .resolver
            .data_at(contract_id, storage_key, self.block_height)?;
        self.data_memo.insert(composite, value.clone());
        Ok(value)
    }

    /// Reads the raw account record of `contract_id` at the pinned height.
    pub fn account_record(&mut self, contract_id: &str) -> Result<Option<Vec<u8>>, Error> {
        if let Some(record) = &self.account_memo {
            return Ok(record.clone());
        }
        let record = match self
            .resolver
            .account_revision(contract_id, self.block_height)?
        {
            Some(revision) => self.resolver.account_blob(contract_id, &revision)?,
            None => None,
        };
        self.account_memo = Some(record.clone());
        Ok(record)
    }

    /// One cursor-scan step at the pinned height; see
    /// [`StateResolver::scan_data_keys`].
    pub fn scan_data_keys(
        &mut self,
        contract_id: &str,
        pattern: &[u8],
        cursor: &[u8],
        limit: usize,
    ) -> Result<(Vec<u8>, Vec<ScannedEntry>), Error> {
        let (next_cursor, entries) =
            self.resolver
                .scan_data_keys(contract_id, self.block_height, pattern, cursor, limit)?;
        // Point reads of scanned keys must agree with the scan within the
        // same call.
        for (storage_key, value) in &entries {
            let composite = keyspace::composite_data_key(contract_id, storage_key);
            self.data_memo.entry(composite).or_insert_with(|| value.clone());
        }
        Ok((next_cursor, entries))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::storage::{InMemoryVersionedStore, SCAN_CURSOR_START};

    fn resolver(store: Arc<InMemoryVersionedStore>) -> StateResolver<InMemoryVersionedStore> {
        StateResolver::new(store, Duration::from_millis(500), 1)
    }

    #[test]
    fn code_revision_picks_greatest_not_exceeding_height() {
        let store = Arc::new(InMemoryVersionedStore::new());
        store.push_code("c", 50, b"r50", b"\0asm");
        let resolver = resolver(store);

        assert_eq!(resolver.code_revision("c", 49).unwrap(), None);
        assert_eq!(resolver.code_revision("c", 50).unwrap(), Some(b"r50".to_vec()));
        assert_eq!(resolver.code_revision("c", 100).unwrap(), Some(b"r50".to_vec()));
    }

    #[test]
    fn latest_height_is_memoized_within_ttl() {
        let store = Arc::new(InMemoryVersionedStore::new());
        store.set_latest_height(100);
        let resolver = StateResolver::new(Arc::clone(&store), Duration::from_secs(60), 1);

        assert_eq!(resolver.latest_height().unwrap(), 100);
        store.set_latest_height(200);
        // Still within the TTL; the memoized height wins.
        assert_eq!(resolver.latest_height().unwrap(), 100);

        let uncached = StateResolver::new(store, Duration::ZERO, 1);
        assert_eq!(uncached.latest_height().unwrap(), 200);
    }

    #[test]
    fn missing_latest_height_is_transient() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let resolver = resolver(store);
        assert!(matches!(
            resolver.latest_height().unwrap_err(),
            Error::Transient(_)
        ));
    }

    #[test]
    fn tombstoned_values_resolve_to_none() {
        let store = Arc::new(InMemoryVersionedStore::new());
        store.push_data("c", b"k", 10, b"r10", b"alive");
        store.push_data("c", b"k", 20, b"r20", b"");
        let resolver = resolver(store);

        assert_eq!(resolver.data_at("c", b"k", 15).unwrap(), Some(b"alive".to_vec()));
        assert_eq!(resolver.data_at("c", b"k", 25).unwrap(), None);
    }

    #[test]
    fn scan_data_keys_strips_prefixes_and_resolves_at_height() {
        let store = Arc::new(InMemoryVersionedStore::new());
        store.push_data("c", b"aa", 10, b"r1", b"1");
        store.push_data("c", b"ab", 20, b"r2", b"2");
        store.push_data("c", b"ba", 10, b"r3", b"3");
        store.push_data("other", b"aa", 10, b"r4", b"4");
        let resolver = resolver(store);

        let pattern = keyspace::data_scan_pattern("c", b"a");
        let mut cursor = SCAN_CURSOR_START.to_vec();
        let mut entries = Vec::new();
        loop {
            let (next, mut batch) = resolver
                .scan_data_keys("c", 15, &pattern, &cursor, 2)
                .unwrap();
            entries.append(&mut batch);
            if next == SCAN_CURSOR_START {
                break;
            }
            cursor = next;
        }
        entries.sort();
        assert_eq!(
            entries,
            vec![
                (b"aa".to_vec(), Some(b"1".to_vec())),
                // Revision lands at height 20, above the pinned 15.
                (b"ab".to_vec(), None),
            ]
        );
    }

    #[test]
    fn snapshot_memoizes_reads_across_store_updates() {
        let store = Arc::new(InMemoryVersionedStore::new());
        store.push_data("c", b"k", 40, b"r40", b"old");
        let resolver = Arc::new(StateResolver::new(
            Arc::clone(&store),
            Duration::from_millis(500),
            1,
        ));
        let mut snapshot = Snapshot::new(resolver, 100);

        assert_eq!(
            snapshot.storage_read("c", b"k").unwrap(),
            Some(b"old".to_vec())
        );
        // A new revision below the pinned height arrives mid-call; the
        // memoized snapshot must not observe it.
        store.push_data("c", b"k", 60, b"r60", b"new");
        assert_eq!(
            snapshot.storage_read("c", b"k").unwrap(),
            Some(b"old".to_vec())
        );
    }

    #[test]
    fn retries_are_bounded() {
        struct FlakyStore {
            failures: AtomicUsize,
        }
        impl VersionedStore for FlakyStore {
            fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
                if self.failures.fetch_sub(1, Ordering::SeqCst) > 1 {
                    Err(Error::Transient("connection reset".to_string()))
                } else {
                    Ok(Some(b"123".to_vec()))
                }
            }
            fn revrange_le(&self, _: &[u8], _: u64) -> Result<Option<Vec<u8>>, Error> {
                Err(Error::Transient("connection reset".to_string()))
            }
            fn scan(&self, _: &[u8], _: &[u8], _: usize) -> Result<(Vec<u8>, Vec<Vec<u8>>), Error> {
                Err(Error::Transient("connection reset".to_string()))
            }
        }

        let store = Arc::new(FlakyStore {
            failures: AtomicUsize::new(2),
        });
        let resolver = StateResolver::new(store, Duration::ZERO, 1);
        // One failure followed by one retry succeeds.
        assert_eq!(resolver.latest_height().unwrap(), 123);
        // revrange keeps failing past the retry budget.
        assert!(matches!(
            resolver.code_revision("c", 10).unwrap_err(),
            Error::Transient(_)
        ));
    }

    proptest! {
        /// For any seeded set of revision heights, `code_revision(C, H)`
        /// yields the revision with the greatest height ≤ H, and its blob
        /// is non-empty.
        #[test]
        fn code_revision_is_greatest_le_height(
            heights in proptest::collection::btree_set(0u64..1_000, 1..16),
            query in 0u64..1_100,
        ) {
            let store = Arc::new(InMemoryVersionedStore::new());
            for height in &heights {
                let revision = format!("rev-{height}");
                let blob = format!("code-at-{height}");
                store.push_code("c", *height, revision.as_bytes(), blob.as_bytes());
            }
            let resolver = StateResolver::new(store, Duration::from_millis(500), 1);

            let expected = heights.iter().rev().find(|height| **height <= query).copied();
            let resolved = resolver.code_revision("c", query).unwrap();
            match expected {
                None => prop_assert_eq!(resolved, None),
                Some(height) => {
                    let revision = resolved.expect("revision must resolve");
                    prop_assert_eq!(&revision, format!("rev-{height}").as_bytes());
                    let blob = resolver.code_blob("c", &revision).unwrap().expect("blob");
                    prop_assert!(!blob.is_empty());
                }
            }
        }
    }
}
