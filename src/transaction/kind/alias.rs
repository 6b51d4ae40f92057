//! Alias Assignment
//!
//! Binds a short name to a URI under the sender's account. The alias
//! registry itself lives outside the engine; this kind only defines the
//! envelope rules: no recipient, no amount, one assignment per alias per
//! block.

use serde_json::{Map, Value};

use crate::account::{AccountLedger, LedgerEvent};
use crate::constants::ONE_QBR;
use crate::error::{not_valid, Result};
use crate::transaction::codec::ByteReader;
use crate::transaction::fee::{FeePolicy, FeeSchedule};
use crate::transaction::kind::{
    release_unconfirmed, reserve_unconfirmed, Attachment, TransactionKind,
    SUBTYPE_MESSAGING_ALIAS_ASSIGNMENT, TYPE_MESSAGING,
};
use crate::transaction::Transaction;
use crate::validation::DuplicateGuard;

pub const MAX_ALIAS_LENGTH: usize = 100;
pub const MAX_ALIAS_URI_LENGTH: usize = 1000;

/// The alias payload: name plus the URI it points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasAssignmentAttachment {
    version: u8,
    alias_name: String,
    alias_uri: String,
}

impl AliasAssignmentAttachment {
    pub fn new(alias_name: impl Into<String>, alias_uri: impl Into<String>) -> Self {
        Self {
            version: 1,
            alias_name: alias_name.into(),
            alias_uri: alias_uri.into(),
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let version = reader.u8()?;
        let name_length = reader.u8()? as usize;
        if name_length > MAX_ALIAS_LENGTH {
            return Err(not_valid(format!("alias name of {name_length} bytes")));
        }
        let alias_name = String::from_utf8(reader.bytes(name_length)?)
            .map_err(|_| not_valid("alias name is not valid UTF-8"))?;
        let uri_length = reader.u16_le()? as usize;
        if uri_length > MAX_ALIAS_URI_LENGTH {
            return Err(not_valid(format!("alias URI of {uri_length} bytes")));
        }
        let alias_uri = String::from_utf8(reader.bytes(uri_length)?)
            .map_err(|_| not_valid("alias URI is not valid UTF-8"))?;
        Ok(Self {
            version,
            alias_name,
            alias_uri,
        })
    }

    pub fn alias_name(&self) -> &str {
        &self.alias_name
    }

    pub fn alias_uri(&self) -> &str {
        &self.alias_uri
    }

    pub fn size(&self) -> usize {
        1 + 1 + self.alias_name.len() + 2 + self.alias_uri.len()
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.push(self.alias_name.len() as u8);
        out.extend_from_slice(self.alias_name.as_bytes());
        out.extend_from_slice(&(self.alias_uri.len() as u16).to_le_bytes());
        out.extend_from_slice(self.alias_uri.as_bytes());
    }

    pub fn put_json(&self, object: &mut Map<String, Value>) {
        object.insert("version.AliasAssignment".into(), Value::from(self.version));
        object.insert("alias".into(), Value::from(self.alias_name.clone()));
        object.insert("uri".into(), Value::from(self.alias_uri.clone()));
    }
}

/// Registers or reassigns an alias. Type 1, subtype 1.
#[derive(Debug, Clone, Copy)]
pub struct AliasAssignment;

impl TransactionKind for AliasAssignment {
    fn type_code(&self) -> u8 {
        TYPE_MESSAGING
    }

    fn subtype_code(&self) -> u8 {
        SUBTYPE_MESSAGING_ALIAS_ASSIGNMENT
    }

    fn name(&self) -> &'static str {
        "AliasAssignment"
    }

    fn ledger_event(&self) -> LedgerEvent {
        LedgerEvent::AliasAssignment
    }

    fn can_have_recipient(&self) -> bool {
        false
    }

    fn parse_attachment(&self, reader: &mut ByteReader) -> Result<Attachment> {
        AliasAssignmentAttachment::parse(reader).map(Attachment::AliasAssignment)
    }

    fn attachment_from_json(&self, object: &Map<String, Value>) -> Result<Attachment> {
        let alias_name = object
            .get("alias")
            .and_then(Value::as_str)
            .ok_or_else(|| not_valid("missing alias name"))?;
        let alias_uri = object.get("uri").and_then(Value::as_str).unwrap_or("");
        Ok(Attachment::AliasAssignment(AliasAssignmentAttachment::new(
            alias_name, alias_uri,
        )))
    }

    fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::flat(FeePolicy::Constant(2 * ONE_QBR))
    }

    fn validate_attachment(&self, transaction: &Transaction) -> Result<()> {
        let Attachment::AliasAssignment(attachment) = transaction.attachment() else {
            return Err(not_valid("attachment does not match transaction type"));
        };
        let name = attachment.alias_name();
        if name.is_empty() || name.len() > MAX_ALIAS_LENGTH {
            return Err(not_valid(format!("invalid alias length {}", name.len())));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(not_valid(format!("invalid alias name {name:?}")));
        }
        if attachment.alias_uri().len() > MAX_ALIAS_URI_LENGTH {
            return Err(not_valid(format!(
                "invalid alias URI length {}",
                attachment.alias_uri().len()
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

    fn apply_attachment(&self, _transaction: &Transaction, _ledger: &dyn AccountLedger) {
        // The alias registry is maintained outside the engine; no balance
        // moves here.
    }

    fn is_duplicate(&self, transaction: &Transaction, guard: &mut DuplicateGuard) -> bool {
        let Attachment::AliasAssignment(attachment) = transaction.attachment() else {
            return false;
        };
        // One assignment per alias per block, case-insensitive.
        guard.check(self, attachment.alias_name().to_lowercase(), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_wire_roundtrip() {
        let attachment = AliasAssignmentAttachment::new("qbrwallet", "https://wallet.example");
        let mut out = Vec::new();
        attachment.put_bytes(&mut out);
        assert_eq!(out.len(), attachment.size());

        let parsed = AliasAssignmentAttachment::parse(&mut ByteReader::new(&out)).unwrap();
        assert_eq!(parsed, attachment);
    }

    #[test]
    fn test_parse_rejects_oversize_name() {
        let mut out = Vec::new();
        out.push(1);
        out.push(101);
        out.extend_from_slice(&[b'a'; 101]);
        out.extend_from_slice(&0u16.to_le_bytes());
        assert!(AliasAssignmentAttachment::parse(&mut ByteReader::new(&out)).is_err());
    }
}
