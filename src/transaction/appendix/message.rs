//! Plain-Message, Announcement and Prunable-Message Appendages

use serde_json::{Map, Value};

use crate::account::AccountLedger;
use crate::chain::PrunableStore;
use crate::constants::MAX_ARBITRARY_MESSAGE_LENGTH;
use crate::crypto::{self, PublicKey};
use crate::error::{not_currently_valid, not_valid, Result};
use crate::transaction::appendix::{flagged_length, prunable_expired, read_flagged_length};
use crate::transaction::codec::ByteReader;
use crate::transaction::fee::{FeePolicy, FeeSchedule};
use crate::transaction::Transaction;

const MESSAGE_FEE: FeeSchedule = FeeSchedule::flat(FeePolicy::SizeBased {
    constant: 0,
    fee_per_chunk: crate::constants::ONE_QBR,
    chunk_size: 32,
});

const PRUNABLE_MESSAGE_FEE: FeeSchedule = FeeSchedule::flat(FeePolicy::SizeBased {
    constant: 0,
    fee_per_chunk: crate::constants::ONE_QBR / 10,
    chunk_size: 32,
});

/// An unencrypted message carried on-chain. Flag bit 0x01.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAppendix {
    version: u8,
    message: Vec<u8>,
    is_text: bool,
}

impl MessageAppendix {
    pub fn text(message: &str) -> Self {
        Self {
            version: 1,
            message: message.as_bytes().to_vec(),
            is_text: true,
        }
    }

    pub fn binary(message: Vec<u8>) -> Self {
        Self {
            version: 1,
            message,
            is_text: false,
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let version = reader.u8()?;
        Self::parse_body(version, reader)
    }

    /// Version-0 transactions carry the message without a version byte.
    pub(crate) fn parse_legacy(reader: &mut ByteReader) -> Result<Self> {
        Self::parse_body(0, reader)
    }

    fn parse_body(version: u8, reader: &mut ByteReader) -> Result<Self> {
        let (length, is_text) = read_flagged_length(reader.i32_le()?);
        if length > MAX_ARBITRARY_MESSAGE_LENGTH {
            return Err(not_valid(format!("message length {length} exceeds maximum")));
        }
        Ok(Self {
            version,
            message: reader.bytes(length)?,
            is_text,
        })
    }

    pub(crate) fn from_json(object: &Map<String, Value>, transaction_version: u8) -> Result<Option<Self>> {
        let marked = object.contains_key("version.Message");
        if transaction_version > 0 && !marked {
            return Ok(None);
        }
        let Some(message) = object.get("message") else {
            return Ok(None);
        };
        let message = message
            .as_str()
            .ok_or_else(|| not_valid("message must be a string"))?;
        let is_text = object
            .get("messageIsText")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let message = if is_text {
            message.as_bytes().to_vec()
        } else {
            hex::decode(message).map_err(|_| not_valid("message is not valid hex"))?
        };
        Ok(Some(Self {
            version: if transaction_version == 0 { 0 } else { 1 },
            message,
            is_text,
        }))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn is_text(&self) -> bool {
        self.is_text
    }

    pub fn size(&self) -> usize {
        let version_byte = usize::from(self.version > 0);
        version_byte + 4 + self.message.len()
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        if self.version > 0 {
            out.push(self.version);
        }
        out.extend_from_slice(&flagged_length(self.message.len(), self.is_text).to_le_bytes());
        out.extend_from_slice(&self.message);
    }

    pub fn put_json(&self, object: &mut Map<String, Value>) {
        let rendered = if self.is_text {
            String::from_utf8_lossy(&self.message).into_owned()
        } else {
            hex::encode(&self.message)
        };
        object.insert("message".into(), Value::from(rendered));
        object.insert("messageIsText".into(), Value::from(self.is_text));
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        MESSAGE_FEE
    }

    pub fn validate(&self, _transaction: &Transaction) -> Result<()> {
        if self.message.len() > MAX_ARBITRARY_MESSAGE_LENGTH {
            return Err(not_valid(format!(
                "message length {} exceeds maximum",
                self.message.len()
            )));
        }
        if self.is_text && std::str::from_utf8(&self.message).is_err() {
            return Err(not_valid("text message is not valid UTF-8"));
        }
        Ok(())
    }
}

/// Binds a public key to the recipient account on first use. Flag bit 0x04.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyAnnouncementAppendix {
    version: u8,
    public_key: PublicKey,
}

impl PublicKeyAnnouncementAppendix {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            version: 1,
            public_key,
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(Self {
            version: reader.u8()?,
            public_key: reader.array_32()?,
        })
    }

    pub(crate) fn from_json(object: &Map<String, Value>) -> Result<Option<Self>> {
        if !object.contains_key("version.PublicKeyAnnouncement") {
            return Ok(None);
        }
        let key = object
            .get("recipientPublicKey")
            .and_then(Value::as_str)
            .ok_or_else(|| not_valid("missing recipientPublicKey"))?;
        let key = hex::decode(key).map_err(|_| not_valid("recipientPublicKey is not valid hex"))?;
        let public_key: PublicKey = key
            .try_into()
            .map_err(|_| not_valid("recipientPublicKey must be 32 bytes"))?;
        Ok(Some(Self::new(public_key)))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn size(&self) -> usize {
        1 + 32
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.extend_from_slice(&self.public_key);
    }

    pub fn put_json(&self, object: &mut Map<String, Value>) {
        object.insert(
            "recipientPublicKey".into(),
            Value::from(hex::encode(self.public_key)),
        );
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::flat(FeePolicy::Constant(crate::constants::ONE_QBR))
    }

    pub fn validate(&self, transaction: &Transaction) -> Result<()> {
        if !transaction.kind().can_have_recipient() {
            return Err(not_valid(
                "public key announcement on a transaction without recipient",
            ));
        }
        if crypto::account_id(&self.public_key) != transaction.recipient_id() {
            return Err(not_valid(
                "announced public key does not match the recipient account",
            ));
        }
        Ok(())
    }

    pub fn apply(&self, transaction: &Transaction, ledger: &dyn AccountLedger) {
        if !ledger.set_or_verify_public_key(transaction.recipient_id(), &self.public_key) {
            tracing::debug!(
                recipient = transaction.recipient_id(),
                "announced public key conflicts with the one already bound"
            );
        }
    }
}

/// A plain message whose payload may be pruned from archival storage; only
/// its hash is consensus-bound. Flag bit 0x20.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunablePlainMessageAppendix {
    version: u8,
    hash: Option<[u8; 32]>,
    message: Option<Vec<u8>>,
    is_text: bool,
}

impl PrunablePlainMessageAppendix {
    pub fn text(message: &str) -> Self {
        Self {
            version: 1,
            hash: None,
            message: Some(message.as_bytes().to_vec()),
            is_text: true,
        }
    }

    pub fn binary(message: Vec<u8>) -> Self {
        Self {
            version: 1,
            hash: None,
            message: Some(message),
            is_text: false,
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(Self {
            version: reader.u8()?,
            hash: Some(reader.array_32()?),
            message: None,
            is_text: false,
        })
    }

    pub(crate) fn from_json(object: &Map<String, Value>) -> Result<Option<Self>> {
        if !object.contains_key("version.PrunablePlainMessage") {
            return Ok(None);
        }
        let is_text = object
            .get("messageIsText")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let message = match object.get("message").and_then(Value::as_str) {
            Some(text) if is_text => Some(text.as_bytes().to_vec()),
            Some(data) => {
                Some(hex::decode(data).map_err(|_| not_valid("message is not valid hex"))?)
            }
            None => None,
        };
        let hash = match object.get("messageHash").and_then(Value::as_str) {
            Some(hash) => {
                let hash = hex::decode(hash).map_err(|_| not_valid("messageHash is not valid hex"))?;
                Some(
                    hash.try_into()
                        .map_err(|_| not_valid("messageHash must be 32 bytes"))?,
                )
            }
            None => None,
        };
        if message.is_none() && hash.is_none() {
            return Err(not_valid("prunable message carries neither payload nor hash"));
        }
        Ok(Some(Self {
            version: 1,
            hash,
            message,
            is_text,
        }))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Payload bytes, when not pruned.
    pub fn message(&self) -> Option<&[u8]> {
        self.message.as_deref()
    }

    pub fn is_text(&self) -> bool {
        self.is_text
    }

    /// The consensus-bound payload hash: computed from the payload when
    /// present, read from the wire otherwise.
    pub fn hash(&self) -> [u8; 32] {
        match &self.message {
            Some(message) => crypto::sha256(message),
            None => self
                .hash
                .expect("prunable appendage carries neither payload nor hash"),
        }
    }

    pub fn size(&self) -> usize {
        1 + 32
    }

    pub fn full_size(&self) -> usize {
        self.size() + self.message.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.extend_from_slice(&self.hash());
    }

    pub fn put_json(&self, object: &mut Map<String, Value>) {
        object.insert("messageHash".into(), Value::from(hex::encode(self.hash())));
        if let Some(message) = &self.message {
            let rendered = if self.is_text {
                String::from_utf8_lossy(message).into_owned()
            } else {
                hex::encode(message)
            };
            object.insert("message".into(), Value::from(rendered));
            object.insert("messageIsText".into(), Value::from(self.is_text));
        }
    }

    /// Payload fields alone, for the out-of-band prunable bag.
    pub fn prunable_json(&self) -> Option<Value> {
        let message = self.message.as_ref()?;
        let rendered = if self.is_text {
            String::from_utf8_lossy(message).into_owned()
        } else {
            hex::encode(message)
        };
        let mut object = Map::new();
        object.insert("message".into(), Value::from(rendered));
        object.insert("messageIsText".into(), Value::from(self.is_text));
        Some(Value::Object(object))
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        PRUNABLE_MESSAGE_FEE
    }

    pub fn validate(&self, transaction: &Transaction) -> Result<()> {
        match &self.message {
            Some(message) => {
                if message.len() > MAX_ARBITRARY_MESSAGE_LENGTH {
                    return Err(not_valid(format!(
                        "prunable message length {} exceeds maximum",
                        message.len()
                    )));
                }
                if self.is_text && std::str::from_utf8(message).is_err() {
                    return Err(not_valid("text message is not valid UTF-8"));
                }
                if let Some(declared) = self.hash {
                    if declared != crypto::sha256(message) {
                        return Err(not_valid("prunable message hash does not match payload"));
                    }
                }
                Ok(())
            }
            None if prunable_expired(transaction.timestamp()) => Ok(()),
            None => Err(not_currently_valid("prunable message payload is missing")),
        }
    }

    /// Rehydrates the payload from archival storage. No-op when the
    /// payload is already present or has expired without `include_expired`.
    pub fn load_prunable(
        &mut self,
        full_hash: &[u8; 32],
        transaction_timestamp: i32,
        store: &dyn PrunableStore,
        include_expired: bool,
    ) {
        if self.message.is_some() {
            return;
        }
        if prunable_expired(transaction_timestamp) && !include_expired {
            return;
        }
        if let Some((message, is_text)) = store.plain_message(full_hash) {
            self.message = Some(message);
            self.is_text = is_text;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_roundtrip() {
        let appendix = MessageAppendix::text("hi");
        let mut out = Vec::new();
        appendix.put_bytes(&mut out);
        assert_eq!(out.len(), appendix.size());
        assert_eq!(appendix.size(), 1 + 4 + 2);

        let mut reader = ByteReader::new(&out);
        let parsed = MessageAppendix::parse(&mut reader).unwrap();
        assert_eq!(parsed, appendix);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_binary_message_keeps_flag() {
        let appendix = MessageAppendix::binary(vec![0xDE, 0xAD]);
        let mut out = Vec::new();
        appendix.put_bytes(&mut out);

        let mut reader = ByteReader::new(&out);
        let parsed = MessageAppendix::parse(&mut reader).unwrap();
        assert!(!parsed.is_text());
        assert_eq!(parsed.message(), &[0xDE, 0xAD]);
    }

    #[test]
    fn test_message_parse_rejects_oversize() {
        let mut out = Vec::new();
        out.push(1);
        out.extend_from_slice(&flagged_length(MAX_ARBITRARY_MESSAGE_LENGTH + 1, false).to_le_bytes());
        let mut reader = ByteReader::new(&out);
        assert!(MessageAppendix::parse(&mut reader).is_err());
    }

    #[test]
    fn test_announcement_wire_roundtrip() {
        let appendix = PublicKeyAnnouncementAppendix::new([7u8; 32]);
        let mut out = Vec::new();
        appendix.put_bytes(&mut out);
        assert_eq!(out.len(), 33);

        let mut reader = ByteReader::new(&out);
        let parsed = PublicKeyAnnouncementAppendix::parse(&mut reader).unwrap();
        assert_eq!(parsed, appendix);
    }

    #[test]
    fn test_prunable_message_hash_is_payload_hash() {
        let appendix = PrunablePlainMessageAppendix::text("archive me");
        assert_eq!(appendix.hash(), crypto::sha256(b"archive me"));
    }

    #[test]
    fn test_prunable_wire_carries_only_hash() {
        let appendix = PrunablePlainMessageAppendix::text("archive me");
        let mut out = Vec::new();
        appendix.put_bytes(&mut out);
        assert_eq!(out.len(), 33);
        assert_eq!(appendix.full_size(), 33 + "archive me".len());

        let mut reader = ByteReader::new(&out);
        let parsed = PrunablePlainMessageAppendix::parse(&mut reader).unwrap();
        assert_eq!(parsed.hash(), appendix.hash());
        assert!(parsed.message().is_none());
    }

    #[test]
    fn test_prunable_load_from_store() {
        use crate::chain::MemoryPrunableStore;

        let source = PrunablePlainMessageAppendix::text("archive me");
        let full_hash = [9u8; 32];
        let store = MemoryPrunableStore::new();
        store.store_plain_message(full_hash, b"archive me".to_vec(), true);

        let mut out = Vec::new();
        source.put_bytes(&mut out);
        let mut pruned =
            PrunablePlainMessageAppendix::parse(&mut ByteReader::new(&out)).unwrap();

        pruned.load_prunable(&full_hash, crate::constants::epoch_time_now(), &store, false);
        assert_eq!(pruned.message(), Some(b"archive me".as_slice()));
        assert!(pruned.is_text());
    }

    #[test]
    fn test_message_json_roundtrip() {
        let appendix = MessageAppendix::text("hello");
        let mut object = Map::new();
        object.insert("version.Message".into(), Value::from(1));
        appendix.put_json(&mut object);

        let parsed = MessageAppendix::from_json(&object, 1).unwrap().unwrap();
        assert_eq!(parsed, appendix);
    }
}
