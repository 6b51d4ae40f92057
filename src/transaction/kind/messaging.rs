//! Arbitrary Message

use serde_json::{Map, Value};

use crate::account::{AccountLedger, LedgerEvent};
use crate::error::{not_valid, Result};
use crate::transaction::codec::ByteReader;
use crate::transaction::kind::{
    release_unconfirmed, reserve_unconfirmed, Attachment, TransactionKind,
    SUBTYPE_MESSAGING_ARBITRARY_MESSAGE, TYPE_MESSAGING,
};
use crate::transaction::Transaction;

/// Carries a message appendage without moving value. The recipient is
/// optional; the amount must be zero.
#[derive(Debug, Clone, Copy)]
pub struct ArbitraryMessage;

impl TransactionKind for ArbitraryMessage {
    fn type_code(&self) -> u8 {
        TYPE_MESSAGING
    }

    fn subtype_code(&self) -> u8 {
        SUBTYPE_MESSAGING_ARBITRARY_MESSAGE
    }

    fn name(&self) -> &'static str {
        "ArbitraryMessage"
    }

    fn ledger_event(&self) -> LedgerEvent {
        LedgerEvent::ArbitraryMessage
    }

    fn can_have_recipient(&self) -> bool {
        true
    }

    fn must_have_recipient(&self) -> bool {
        false
    }

    fn parse_attachment(&self, _reader: &mut ByteReader) -> Result<Attachment> {
        Ok(Attachment::ArbitraryMessage)
    }

    fn attachment_from_json(&self, _object: &Map<String, Value>) -> Result<Attachment> {
        Ok(Attachment::ArbitraryMessage)
    }

    fn validate_attachment(&self, transaction: &Transaction) -> Result<()> {
        if transaction.amount_nqt() != 0 {
            return Err(not_valid("arbitrary message transaction cannot carry an amount"));
        }
        let has_message = transaction.appendages().iter().any(|appendage| {
            matches!(
                appendage,
                crate::transaction::appendix::Appendage::Message(_)
                    | crate::transaction::appendix::Appendage::EncryptedMessage(_)
                    | crate::transaction::appendix::Appendage::PrunablePlainMessage(_)
                    | crate::transaction::appendix::Appendage::PrunableEncryptedMessage(_)
            )
        });
        if !has_message {
            return Err(not_valid("arbitrary message transaction carries no message"));
        }
        Ok(())
    }

    fn apply_unconfirmed(&self, transaction: &Transaction, ledger: &dyn AccountLedger) -> bool {
        reserve_unconfirmed(transaction, ledger)
    }

    fn undo_unconfirmed(&self, transaction: &Transaction, ledger: &dyn AccountLedger) {
        release_unconfirmed(transaction, ledger);
    }

    fn apply_attachment(&self, _transaction: &Transaction, _ledger: &dyn AccountLedger) {
        // Message delivery is off-ledger; nothing moves.
    }
}
