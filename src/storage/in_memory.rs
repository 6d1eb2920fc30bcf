//! Versioned store implemented purely in memory. Nothing is persisted; this
//! is mostly used for testing purposes and local runs without an indexer.
use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{keyspace, Error, VersionedStore, SCAN_CURSOR_START};

#[derive(Default)]
struct Inner {
    /// Plain key/value entries.
    strings: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Ordered sets: set key -> (score -> member).
    sorted_sets: BTreeMap<Vec<u8>, BTreeMap<u64, Vec<u8>>>,
}

/// In-memory implementation of [`VersionedStore`] with helpers for seeding
/// the keyspace the way the indexer would.
#[derive(Default)]
pub struct InMemoryVersionedStore {
    inner: RwLock<Inner>,
}

impl InMemoryVersionedStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the `latest_block_height` entry.
    pub fn set_latest_height(&self, height: u64) {
        self.inner.write().strings.insert(
            keyspace::LATEST_BLOCK_HEIGHT_KEY.to_vec(),
            height.to_string().into_bytes(),
        );
    }

    /// Records a code revision for `contract_id` becoming current at `height`.
    pub fn push_code(&self, contract_id: &str, height: u64, revision: &[u8], blob: &[u8]) {
        let mut inner = self.inner.write();
        inner
            .sorted_sets
            .entry(keyspace::code_index_key(contract_id))
            .or_default()
            .insert(height, revision.to_vec());
        inner
            .strings
            .insert(keyspace::code_value_key(contract_id, revision), blob.to_vec());
    }

    /// Records an account-record revision becoming current at `height`.
    pub fn push_account(&self, contract_id: &str, height: u64, revision: &[u8], record: &[u8]) {
        let mut inner = self.inner.write();
        inner
            .sorted_sets
            .entry(keyspace::account_index_key(contract_id))
            .or_default()
            .insert(height, revision.to_vec());
        inner.strings.insert(
            keyspace::account_value_key(contract_id, revision),
            record.to_vec(),
        );
    }

    /// Records a storage-entry revision becoming current at `height`. An
    /// empty `value` is the tombstone marker for a deleted entry.
    pub fn push_data(
        &self,
        contract_id: &str,
        storage_key: &[u8],
        height: u64,
        revision: &[u8],
        value: &[u8],
    ) {
        let composite = keyspace::composite_data_key(contract_id, storage_key);
        let mut inner = self.inner.write();
        inner
            .sorted_sets
            .entry(keyspace::data_index_key(&composite))
            .or_default()
            .insert(height, revision.to_vec());
        inner
            .strings
            .insert(keyspace::data_value_key(&composite, revision), value.to_vec());
    }
}

/// Returns true if `key` matches `pattern`, where the pattern is a literal
/// byte string optionally terminated by a `*` wildcard.
fn key_matches(key: &[u8], pattern: &[u8]) -> bool {
    match pattern.split_last() {
        Some((b'*', prefix)) => key.starts_with(prefix),
        _ => key == pattern,
    }
}

impl VersionedStore for InMemoryVersionedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.inner.read().strings.get(key).cloned())
    }

    fn revrange_le(&self, set_key: &[u8], max_score: u64) -> Result<Option<Vec<u8>>, Error> {
        let inner = self.inner.read();
        let Some(set) = inner.sorted_sets.get(set_key) else {
            return Ok(None);
        };
        Ok(set
            .range(..=max_score)
            .next_back()
            .map(|(_, member)| member.clone()))
    }

    fn scan(
        &self,
        cursor: &[u8],
        pattern: &[u8],
        count_hint: usize,
    ) -> Result<(Vec<u8>, Vec<Vec<u8>>), Error> {
        let position: usize = if cursor == SCAN_CURSOR_START {
            0
        } else {
            std::str::from_utf8(cursor)
                .ok()
                .and_then(|cursor| cursor.parse().ok())
                .ok_or(Error::InvalidCursor)?
        };

        // The scan walks every key in the store, matching the external
        // service's keyspace-wide cursor semantics. Sorted-set keys and
        // plain keys share one ordered key sequence.
        let inner = self.inner.read();
        let keys: Vec<&Vec<u8>> = inner
            .strings
            .keys()
            .chain(inner.sorted_sets.keys())
            .collect();
        let step = count_hint.max(1);

        let matched: Vec<Vec<u8>> = keys
            .iter()
            .skip(position)
            .take(step)
            .filter(|key| key_matches(key, pattern))
            .map(|key| key.to_vec())
            .collect();

        let next_position = position.saturating_add(step);
        let next_cursor = if next_position >= keys.len() {
            SCAN_CURSOR_START.to_vec()
        } else {
            next_position.to_string().into_bytes()
        };
        Ok((next_cursor, matched))
    }
}
