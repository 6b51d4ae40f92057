//! Ordinary Payment

use serde_json::{Map, Value};

use crate::account::{AccountLedger, LedgerEvent};
use crate::error::{not_valid, Result};
use crate::transaction::codec::ByteReader;
use crate::transaction::kind::{
    release_unconfirmed, reserve_unconfirmed, Attachment, TransactionKind,
    SUBTYPE_PAYMENT_ORDINARY, TYPE_PAYMENT,
};
use crate::transaction::Transaction;

/// Plain value transfer from sender to recipient.
#[derive(Debug, Clone, Copy)]
pub struct OrdinaryPayment;

impl TransactionKind for OrdinaryPayment {
    fn type_code(&self) -> u8 {
        TYPE_PAYMENT
    }

    fn subtype_code(&self) -> u8 {
        SUBTYPE_PAYMENT_ORDINARY
    }

    fn name(&self) -> &'static str {
        "OrdinaryPayment"
    }

    fn ledger_event(&self) -> LedgerEvent {
        LedgerEvent::OrdinaryPayment
    }

    fn can_have_recipient(&self) -> bool {
        true
    }

    fn parse_attachment(&self, _reader: &mut ByteReader) -> Result<Attachment> {
        Ok(Attachment::OrdinaryPayment)
    }

    fn attachment_from_json(&self, _object: &Map<String, Value>) -> Result<Attachment> {
        Ok(Attachment::OrdinaryPayment)
    }

    fn validate_attachment(&self, transaction: &Transaction) -> Result<()> {
        if transaction.amount_nqt() <= 0 {
            return Err(not_valid(format!(
                "invalid payment amount {}",
                transaction.amount_nqt()
            )));
        }
        Ok(())
    }

    fn apply_unconfirmed(&self, transaction: &Transaction, ledger: &dyn AccountLedger) -> bool {
        reserve_unconfirmed(transaction, ledger)
    }

    fn undo_unconfirmed(&self, transaction: &Transaction, ledger: &dyn AccountLedger) {
        release_unconfirmed(transaction, ledger);
    }

    fn apply_attachment(&self, transaction: &Transaction, ledger: &dyn AccountLedger) {
        ledger.add_to_balance_and_unconfirmed(
            transaction.recipient_id(),
            self.ledger_event(),
            transaction.event_id(),
            transaction.amount_nqt(),
        );
    }
}
