//! Binary account record stored by the indexer.
use thiserror::Error;

/// Serialized length of an [`AccountRecord`].
pub const ACCOUNT_RECORD_SERIALIZED_LENGTH: usize = 16 + 16 + 32 + 8;

/// An error decoding an account record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("account record must be {ACCOUNT_RECORD_SERIALIZED_LENGTH} bytes, got {actual}")]
pub struct AccountRecordError {
    /// Length of the rejected payload.
    pub actual: usize,
}

/// Account metadata at one revision.
///
/// The wire layout is fixed: `amount` and `locked` as little-endian
/// `u128`, the 32-byte code hash, then `storage_usage` as little-endian
/// `u64`, concatenated without padding (72 bytes total).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRecord {
    /// Spendable balance.
    pub amount: u128,
    /// Balance locked for staking.
    pub locked: u128,
    /// Hash of the account's current contract code.
    pub code_hash: [u8; 32],
    /// Storage bytes charged to the account.
    pub storage_usage: u64,
}

impl AccountRecord {
    /// Serializes the record into its fixed 72-byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ACCOUNT_RECORD_SERIALIZED_LENGTH);
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes.extend_from_slice(&self.locked.to_le_bytes());
        bytes.extend_from_slice(&self.code_hash);
        bytes.extend_from_slice(&self.storage_usage.to_le_bytes());
        bytes
    }

    /// Deserializes a record, rejecting payloads of the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AccountRecordError> {
        if bytes.len() != ACCOUNT_RECORD_SERIALIZED_LENGTH {
            return Err(AccountRecordError {
                actual: bytes.len(),
            });
        }
        let mut amount = [0u8; 16];
        amount.copy_from_slice(&bytes[0..16]);
        let mut locked = [0u8; 16];
        locked.copy_from_slice(&bytes[16..32]);
        let mut code_hash = [0u8; 32];
        code_hash.copy_from_slice(&bytes[32..64]);
        let mut storage_usage = [0u8; 8];
        storage_usage.copy_from_slice(&bytes[64..72]);
        Ok(AccountRecord {
            amount: u128::from_le_bytes(amount),
            locked: u128::from_le_bytes(locked),
            code_hash,
            storage_usage: u64::from_le_bytes(storage_usage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const U64_BOUNDARIES: [u64; 4] = [0, 1, (1 << 63) - 1, u64::MAX];
    const U128_BOUNDARIES: [u128; 3] = [0, 1 << 127, u128::MAX];

    #[test]
    fn round_trips_across_boundary_values() {
        for amount in U128_BOUNDARIES {
            for locked in U128_BOUNDARIES {
                for storage_usage in U64_BOUNDARIES {
                    let record = AccountRecord {
                        amount,
                        locked,
                        code_hash: [0xA5; 32],
                        storage_usage,
                    };
                    let bytes = record.to_bytes();
                    assert_eq!(bytes.len(), ACCOUNT_RECORD_SERIALIZED_LENGTH);
                    assert_eq!(AccountRecord::from_bytes(&bytes), Ok(record));
                }
            }
        }
    }

    #[test]
    fn layout_is_little_endian_without_padding() {
        let record = AccountRecord {
            amount: 0x0102,
            locked: 0x0304,
            code_hash: [7; 32],
            storage_usage: 0x0506,
        };
        let bytes = record.to_bytes();
        assert_eq!(&bytes[0..2], &[0x02, 0x01]);
        assert_eq!(&bytes[16..18], &[0x04, 0x03]);
        assert_eq!(&bytes[32..64], &[7; 32]);
        assert_eq!(&bytes[64..66], &[0x06, 0x05]);
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert_eq!(
            AccountRecord::from_bytes(&[0; 71]),
            Err(AccountRecordError { actual: 71 })
        );
        assert_eq!(
            AccountRecord::from_bytes(&[0; 73]),
            Err(AccountRecordError { actual: 73 })
        );
        assert_eq!(
            AccountRecord::from_bytes(&[]),
            Err(AccountRecordError { actual: 0 })
        );
    }
}
