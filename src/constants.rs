//! QBR Chain Consensus Parameters
//!
//! Every constant in this module is consensus-critical: all nodes must agree
//! on these values bit-for-bit or the network forks. Amounts are expressed in
//! NQT, the indivisible minor unit of the QBR coin.

use chrono::{DateTime, TimeZone, Utc};

/// Number of NQT in one whole QBR coin.
pub const ONE_QBR: i64 = 100_000_000;

/// Total coin supply cap, in whole coins.
pub const MAX_BALANCE_QBR: i64 = 1_000_000_000;

/// Total coin supply cap, in NQT. Amounts and fees must lie in
/// `[0, MAX_BALANCE_NQT]`.
pub const MAX_BALANCE_NQT: i64 = MAX_BALANCE_QBR * ONE_QBR;

/// Maximum number of transactions in a single block.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 255;

/// Size of a version-1 transaction with an empty attachment and no
/// appendages: the fixed 176-byte header.
pub const MIN_TRANSACTION_SIZE: usize = 176;

/// Maximum total serialized size of all transactions in a block. A single
/// transaction whose `full_size` exceeds this is never valid.
pub const MAX_PAYLOAD_LENGTH: usize = MAX_TRANSACTIONS_PER_BLOCK * MIN_TRANSACTION_SIZE;

/// Anti-spam deposit debited from the sender's unconfirmed balance when a
/// transaction carries a referenced-transaction full hash.
pub const UNCONFIRMED_POOL_DEPOSIT_NQT: i64 = 100 * ONE_QBR;

/// Account id of the genesis creator. Substituted on the wire for the
/// recipient field of transaction kinds that cannot have a recipient.
pub const CREATOR_ID: u64 = 8_364_259_285_482_708_513;

/// Maximum transaction deadline, in minutes (24 hours).
pub const MAX_DEADLINE_MINUTES: i16 = 1440;

/// Maximum length of a plain message payload, in bytes.
pub const MAX_ARBITRARY_MESSAGE_LENGTH: usize = 1000;

/// Maximum length of an encrypted message ciphertext, in bytes: the
/// plaintext cap plus the 16-byte AEAD tag.
pub const MAX_ENCRYPTED_MESSAGE_LENGTH: usize = MAX_ARBITRARY_MESSAGE_LENGTH + 16;

/// Maximum number of whitelisted voter accounts on a phased transaction.
pub const MAX_PHASING_WHITELIST_SIZE: usize = 10;

/// Maximum number of blocks between a phased transaction's inclusion height
/// and its finish height.
pub const MAX_PHASING_DURATION: i32 = 14 * 1440;

/// Minimum time a prunable payload must be retained before it may be pruned,
/// in seconds.
pub const MIN_PRUNABLE_LIFETIME: i32 = 14 * 24 * 3600;

/// Protocol epoch: 2021-01-01T00:00:00 UTC. All transaction and block
/// timestamps count seconds from this instant.
pub const EPOCH_BEGINNING_UNIX: i64 = 1_609_459_200;

/// Returns the protocol epoch as a chrono instant.
pub fn epoch_beginning() -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH_BEGINNING_UNIX, 0).unwrap()
}

/// Current time in protocol-epoch seconds.
pub fn epoch_time_now() -> i32 {
    from_unix_time(Utc::now().timestamp())
}

/// Converts a Unix timestamp to protocol-epoch seconds. Saturates rather
/// than wrapping for instants outside the representable range.
pub fn from_unix_time(unix_seconds: i64) -> i32 {
    (unix_seconds - EPOCH_BEGINNING_UNIX).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Converts protocol-epoch seconds back to a Unix timestamp.
pub fn to_unix_time(epoch_seconds: i32) -> i64 {
    EPOCH_BEGINNING_UNIX + epoch_seconds as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_fits_in_i64() {
        assert!(MAX_BALANCE_NQT > 0);
        assert_eq!(MAX_BALANCE_NQT, 100_000_000_000_000_000);
    }

    #[test]
    fn test_payload_length() {
        assert_eq!(MAX_PAYLOAD_LENGTH, 255 * 176);
    }

    #[test]
    fn test_unix_time_roundtrip() {
        let unix = EPOCH_BEGINNING_UNIX + 12_345;
        assert_eq!(from_unix_time(unix), 12_345);
        assert_eq!(to_unix_time(12_345), unix);
    }

    #[test]
    fn test_epoch_beginning_matches_unix_constant() {
        assert_eq!(epoch_beginning().timestamp(), EPOCH_BEGINNING_UNIX);
    }

    #[test]
    fn test_pre_epoch_time_clamps() {
        assert_eq!(from_unix_time(EPOCH_BEGINNING_UNIX - 1), -1);
        assert_eq!(from_unix_time(i64::MIN), i32::MIN);
    }
}
