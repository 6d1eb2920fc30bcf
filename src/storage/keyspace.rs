//! Bit-exact construction of the versioned store keyspace.
//!
//! Keys are raw byte strings joined with literal colon bytes (`0x3A`); no
//! length prefixing is used anywhere. Revision hashes are fixed-length and
//! opaque, so the trailing `:{R}` of a payload key can always be recovered
//! by the writer without framing.

/// Key holding the latest indexed block height as ASCII decimal.
pub const LATEST_BLOCK_HEIGHT_KEY: &[u8] = b"latest_block_height";

const SEPARATOR: u8 = b':';

fn join(parts: &[&[u8]]) -> Vec<u8> {
    let total = parts.iter().map(|part| part.len()).sum::<usize>() + parts.len() - 1;
    let mut key = Vec::with_capacity(total);
    for (index, part) in parts.iter().enumerate() {
        if index != 0 {
            key.push(SEPARATOR);
        }
        key.extend_from_slice(part);
    }
    key
}

/// Ordered set `code:{C}` scoring code revisions by block height.
pub fn code_index_key(contract_id: &str) -> Vec<u8> {
    join(&[b"code", contract_id.as_bytes()])
}

/// Payload key `code:{C}:{R}` holding a raw bytecode blob.
pub fn code_value_key(contract_id: &str, revision: &[u8]) -> Vec<u8> {
    join(&[b"code", contract_id.as_bytes(), revision])
}

/// Ordered set `account:{C}` scoring account-record revisions by height.
pub fn account_index_key(contract_id: &str) -> Vec<u8> {
    join(&[b"account", contract_id.as_bytes()])
}

/// Payload key `account-data:{C}:{R}` holding a binary account record.
pub fn account_value_key(contract_id: &str, revision: &[u8]) -> Vec<u8> {
    join(&[b"account-data", contract_id.as_bytes(), revision])
}

/// Composite storage key `{C}:{key}` scoping a contract-chosen key to its
/// contract. The contract-chosen part may be arbitrary bytes.
pub fn composite_data_key(contract_id: &str, storage_key: &[u8]) -> Vec<u8> {
    join(&[contract_id.as_bytes(), storage_key])
}

/// Ordered set `data:{C}:{key}` scoring storage-entry revisions by height.
pub fn data_index_key(composite_key: &[u8]) -> Vec<u8> {
    join(&[b"data", composite_key])
}

/// Payload key `data-value:{C}:{key}:{R}` holding raw value bytes.
pub fn data_value_key(composite_key: &[u8], revision: &[u8]) -> Vec<u8> {
    join(&[b"data-value", composite_key, revision])
}

/// Scan pattern `data:{C}:{prefix}*` matching every storage-entry index of
/// `contract_id` whose contract-chosen key starts with `key_prefix`.
pub fn data_scan_pattern(contract_id: &str, key_prefix: &[u8]) -> Vec<u8> {
    let mut pattern = data_index_key(&composite_data_key(contract_id, key_prefix));
    pattern.push(b'*');
    pattern
}

/// Recovers the contract-chosen storage key from a scanned `data:{C}:{key}`
/// index key. Returns `None` if the key does not belong to `contract_id`.
pub fn strip_data_prefixes<'a>(index_key: &'a [u8], contract_id: &str) -> Option<&'a [u8]> {
    let rest = index_key.strip_prefix(b"data:")?;
    let rest = rest.strip_prefix(contract_id.as_bytes())?;
    rest.strip_prefix(&[SEPARATOR])
}
