//! Optional Transaction Appendages
//!
//! An appendage is a self-delimited optional section serialized after the
//! attachment. Presence is recorded in the transaction's flags field, one
//! bit per appendage kind, and the wire order is the ascending bit order:
//!
//! | bit  | appendage |
//! |------|-----------|
//! | 0x01 | plain message |
//! | 0x02 | encrypted message |
//! | 0x04 | public-key announcement |
//! | 0x08 | encrypt-to-self message |
//! | 0x10 | phasing |
//! | 0x20 | prunable plain message |
//! | 0x40 | prunable encrypted message |
//!
//! Every appendage knows its own wire size, fee schedule, validation rules
//! and ledger effect. Prunable appendages carry only a payload hash on the
//! wire; the payload itself travels in a side-channel JSON bag and may be
//! pruned from archival storage after [`crate::constants::MIN_PRUNABLE_LIFETIME`].

pub mod encrypted;
pub mod message;
pub mod phasing;

pub use encrypted::{
    EncryptToSelfMessageAppendix, EncryptedMessageAppendix, PrunableEncryptedMessageAppendix,
};
pub use message::{MessageAppendix, PrunablePlainMessageAppendix, PublicKeyAnnouncementAppendix};
pub use phasing::PhasingAppendix;

use serde_json::Map;

use crate::account::AccountLedger;
use crate::chain::ChainView;
use crate::error::{not_valid, Result};
use crate::transaction::codec::ByteReader;
use crate::transaction::fee::FeeSchedule;
use crate::transaction::Transaction;

pub const FLAG_MESSAGE: u32 = 0x01;
pub const FLAG_ENCRYPTED_MESSAGE: u32 = 0x02;
pub const FLAG_PUBLIC_KEY_ANNOUNCEMENT: u32 = 0x04;
pub const FLAG_ENCRYPT_TO_SELF_MESSAGE: u32 = 0x08;
pub const FLAG_PHASING: u32 = 0x10;
pub const FLAG_PRUNABLE_PLAIN_MESSAGE: u32 = 0x20;
pub const FLAG_PRUNABLE_ENCRYPTED_MESSAGE: u32 = 0x40;

/// All appendage flags in wire order (ascending bit order).
pub const ALL_FLAGS: [u32; 7] = [
    FLAG_MESSAGE,
    FLAG_ENCRYPTED_MESSAGE,
    FLAG_PUBLIC_KEY_ANNOUNCEMENT,
    FLAG_ENCRYPT_TO_SELF_MESSAGE,
    FLAG_PHASING,
    FLAG_PRUNABLE_PLAIN_MESSAGE,
    FLAG_PRUNABLE_ENCRYPTED_MESSAGE,
];

/// Mask of all defined appendage flags. Set bits outside this mask make a
/// transaction permanently invalid.
pub const KNOWN_FLAGS: u32 = 0x7F;

/// One optional section of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Appendage {
    Message(MessageAppendix),
    EncryptedMessage(EncryptedMessageAppendix),
    PublicKeyAnnouncement(PublicKeyAnnouncementAppendix),
    EncryptToSelfMessage(EncryptToSelfMessageAppendix),
    Phasing(PhasingAppendix),
    PrunablePlainMessage(PrunablePlainMessageAppendix),
    PrunableEncryptedMessage(PrunableEncryptedMessageAppendix),
}

impl Appendage {
    /// Parses the appendage for `flag` from the wire.
    pub fn parse(flag: u32, reader: &mut ByteReader) -> Result<Appendage> {
        match flag {
            FLAG_MESSAGE => MessageAppendix::parse(reader).map(Appendage::Message),
            FLAG_ENCRYPTED_MESSAGE => {
                EncryptedMessageAppendix::parse(reader).map(Appendage::EncryptedMessage)
            }
            FLAG_PUBLIC_KEY_ANNOUNCEMENT => {
                PublicKeyAnnouncementAppendix::parse(reader).map(Appendage::PublicKeyAnnouncement)
            }
            FLAG_ENCRYPT_TO_SELF_MESSAGE => {
                EncryptToSelfMessageAppendix::parse(reader).map(Appendage::EncryptToSelfMessage)
            }
            FLAG_PHASING => PhasingAppendix::parse(reader).map(Appendage::Phasing),
            FLAG_PRUNABLE_PLAIN_MESSAGE => {
                PrunablePlainMessageAppendix::parse(reader).map(Appendage::PrunablePlainMessage)
            }
            FLAG_PRUNABLE_ENCRYPTED_MESSAGE => PrunableEncryptedMessageAppendix::parse(reader)
                .map(Appendage::PrunableEncryptedMessage),
            _ => Err(not_valid(format!("unknown appendage flag {flag:#x}"))),
        }
    }

    pub fn flag(&self) -> u32 {
        match self {
            Appendage::Message(_) => FLAG_MESSAGE,
            Appendage::EncryptedMessage(_) => FLAG_ENCRYPTED_MESSAGE,
            Appendage::PublicKeyAnnouncement(_) => FLAG_PUBLIC_KEY_ANNOUNCEMENT,
            Appendage::EncryptToSelfMessage(_) => FLAG_ENCRYPT_TO_SELF_MESSAGE,
            Appendage::Phasing(_) => FLAG_PHASING,
            Appendage::PrunablePlainMessage(_) => FLAG_PRUNABLE_PLAIN_MESSAGE,
            Appendage::PrunableEncryptedMessage(_) => FLAG_PRUNABLE_ENCRYPTED_MESSAGE,
        }
    }

    /// Name used for the `version.<Name>` marker in attachment JSON.
    pub fn name(&self) -> &'static str {
        match self {
            Appendage::Message(_) => "Message",
            Appendage::EncryptedMessage(_) => "EncryptedMessage",
            Appendage::PublicKeyAnnouncement(_) => "PublicKeyAnnouncement",
            Appendage::EncryptToSelfMessage(_) => "EncryptToSelfMessage",
            Appendage::Phasing(_) => "Phasing",
            Appendage::PrunablePlainMessage(_) => "PrunablePlainMessage",
            Appendage::PrunableEncryptedMessage(_) => "PrunableEncryptedMessage",
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            Appendage::Message(a) => a.version(),
            Appendage::EncryptedMessage(a) => a.version(),
            Appendage::PublicKeyAnnouncement(a) => a.version(),
            Appendage::EncryptToSelfMessage(a) => a.version(),
            Appendage::Phasing(a) => a.version(),
            Appendage::PrunablePlainMessage(a) => a.version(),
            Appendage::PrunableEncryptedMessage(a) => a.version(),
        }
    }

    /// Wire size in bytes, including the version byte where one is carried.
    pub fn size(&self) -> usize {
        match self {
            Appendage::Message(a) => a.size(),
            Appendage::EncryptedMessage(a) => a.size(),
            Appendage::PublicKeyAnnouncement(a) => a.size(),
            Appendage::EncryptToSelfMessage(a) => a.size(),
            Appendage::Phasing(a) => a.size(),
            Appendage::PrunablePlainMessage(a) => a.size(),
            Appendage::PrunableEncryptedMessage(a) => a.size(),
        }
    }

    /// Wire size plus any externally carried payload. Differs from
    /// [`Appendage::size`] only for prunable appendages; fees are charged
    /// on this value.
    pub fn full_size(&self) -> usize {
        match self {
            Appendage::PrunablePlainMessage(a) => a.full_size(),
            Appendage::PrunableEncryptedMessage(a) => a.full_size(),
            other => other.size(),
        }
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Appendage::Message(a) => a.put_bytes(out),
            Appendage::EncryptedMessage(a) => a.put_bytes(out),
            Appendage::PublicKeyAnnouncement(a) => a.put_bytes(out),
            Appendage::EncryptToSelfMessage(a) => a.put_bytes(out),
            Appendage::Phasing(a) => a.put_bytes(out),
            Appendage::PrunablePlainMessage(a) => a.put_bytes(out),
            Appendage::PrunableEncryptedMessage(a) => a.put_bytes(out),
        }
    }

    /// Merges this appendage's fields into the attachment JSON object.
    pub fn put_json(&self, object: &mut Map<String, serde_json::Value>) {
        object.insert(
            format!("version.{}", self.name()),
            serde_json::Value::from(self.version()),
        );
        match self {
            Appendage::Message(a) => a.put_json(object),
            Appendage::EncryptedMessage(a) => a.put_json(object),
            Appendage::PublicKeyAnnouncement(a) => a.put_json(object),
            Appendage::EncryptToSelfMessage(a) => a.put_json(object),
            Appendage::Phasing(a) => a.put_json(object),
            Appendage::PrunablePlainMessage(a) => a.put_json(object),
            Appendage::PrunableEncryptedMessage(a) => a.put_json(object),
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        match self {
            Appendage::Message(a) => a.fee_schedule(),
            Appendage::EncryptedMessage(a) => a.fee_schedule(),
            Appendage::PublicKeyAnnouncement(a) => a.fee_schedule(),
            Appendage::EncryptToSelfMessage(a) => a.fee_schedule(),
            Appendage::Phasing(a) => a.fee_schedule(),
            Appendage::PrunablePlainMessage(a) => a.fee_schedule(),
            Appendage::PrunableEncryptedMessage(a) => a.fee_schedule(),
        }
    }

    /// Fee contribution at `height`, charged on the full size.
    pub fn fee_nqt(&self, height: i32) -> i64 {
        self.fee_schedule()
            .at_height(height)
            .fee_for_size(self.full_size())
    }

    /// Checks the appendage version against the owning transaction's
    /// version. Version-0 transactions may carry only the legacy plain
    /// message; everything else requires the current appendage version.
    pub fn verify_version(&self, transaction_version: u8) -> Result<()> {
        let expected = match self {
            Appendage::Message(_) if transaction_version == 0 => 0,
            _ if transaction_version == 0 => {
                return Err(not_valid(format!(
                    "{} appendage not allowed in version-0 transaction",
                    self.name()
                )))
            }
            _ => 1,
        };
        if self.version() != expected {
            return Err(not_valid(format!(
                "invalid {} appendage version {}",
                self.name(),
                self.version()
            )));
        }
        Ok(())
    }

    /// Validates the appendage against current chain state.
    pub fn validate(&self, transaction: &Transaction, chain: &dyn ChainView) -> Result<()> {
        match self {
            Appendage::Message(a) => a.validate(transaction),
            Appendage::EncryptedMessage(a) => a.validate(transaction),
            Appendage::PublicKeyAnnouncement(a) => a.validate(transaction),
            Appendage::EncryptToSelfMessage(a) => a.validate(transaction),
            Appendage::Phasing(a) => a.validate(chain.height()),
            Appendage::PrunablePlainMessage(a) => a.validate(transaction),
            Appendage::PrunableEncryptedMessage(a) => a.validate(transaction),
        }
    }

    /// Validation applied when a phased transaction's deferred effects
    /// execute. Height-window checks that could only hold at acceptance
    /// are skipped.
    pub fn validate_at_finish(&self, transaction: &Transaction, chain: &dyn ChainView) -> Result<()> {
        match self {
            Appendage::Phasing(a) => a.validate_at_finish(chain.height()),
            other => other.validate(transaction, chain),
        }
    }

    /// Applies the appendage's ledger effect, if any.
    pub fn apply(&self, transaction: &Transaction, ledger: &dyn AccountLedger) {
        if let Appendage::PublicKeyAnnouncement(a) = self {
            a.apply(transaction, ledger);
        }
    }

    /// True for the phasing appendage: the owning transaction's attachment
    /// effects are deferred until its poll resolves.
    pub fn is_phasing(&self) -> bool {
        matches!(self, Appendage::Phasing(_))
    }
}

/// Encodes a payload length with the is-text marker in the sign bit.
pub(crate) fn flagged_length(length: usize, is_text: bool) -> i32 {
    let length = length as i32;
    if is_text {
        length | i32::MIN
    } else {
        length
    }
}

/// Decodes a flagged length into `(length, is_text)`.
pub(crate) fn read_flagged_length(raw: i32) -> (usize, bool) {
    ((raw & i32::MAX) as usize, raw < 0)
}

/// Whether the prunable payload of a transaction created at
/// `transaction_timestamp` may already have been pruned.
pub(crate) fn prunable_expired(transaction_timestamp: i32) -> bool {
    crate::constants::epoch_time_now().saturating_sub(crate::constants::MIN_PRUNABLE_LIFETIME)
        > transaction_timestamp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_distinct_bits_in_order() {
        let mut seen = 0u32;
        let mut previous = 0u32;
        for flag in ALL_FLAGS {
            assert_eq!(flag.count_ones(), 1);
            assert!(flag > previous, "flags must ascend in wire order");
            seen |= flag;
            previous = flag;
        }
        assert_eq!(seen, KNOWN_FLAGS);
    }

    #[test]
    fn test_flagged_length_roundtrip() {
        for (length, is_text) in [(0usize, false), (1, true), (1000, true), (1000, false)] {
            let raw = flagged_length(length, is_text);
            assert_eq!(read_flagged_length(raw), (length, is_text));
        }
    }

    #[test]
    fn test_parse_rejects_unknown_flag() {
        let mut reader = ByteReader::new(&[]);
        assert!(Appendage::parse(0x80, &mut reader).is_err());
    }
}
