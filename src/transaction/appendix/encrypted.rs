//! Encrypted-Message Appendages
//!
//! Three encrypted forms: a message to the recipient (0x02), a note the
//! sender seals to itself (0x08), and a prunable variant of the recipient
//! message (0x40). The first two can be built from plaintext and are sealed
//! by the builder when it signs with a secret phrase; a transaction must
//! never reach the wire with pending plaintext.

use serde_json::{Map, Value};

use crate::chain::PrunableStore;
use crate::constants::MAX_ENCRYPTED_MESSAGE_LENGTH;
use crate::crypto::encrypted_data::NONCE_LENGTH;
use crate::crypto::{self, EncryptedData, PublicKey};
use crate::error::{not_currently_valid, not_valid, Result};
use crate::transaction::appendix::{flagged_length, prunable_expired, read_flagged_length};
use crate::transaction::codec::ByteReader;
use crate::transaction::fee::{FeePolicy, FeeSchedule};
use crate::transaction::Transaction;

const ENCRYPTED_MESSAGE_FEE: FeeSchedule = FeeSchedule::flat(FeePolicy::SizeBased {
    constant: 0,
    fee_per_chunk: crate::constants::ONE_QBR,
    chunk_size: 32,
});

const PRUNABLE_ENCRYPTED_MESSAGE_FEE: FeeSchedule = FeeSchedule::flat(FeePolicy::SizeBased {
    constant: 0,
    fee_per_chunk: crate::constants::ONE_QBR / 10,
    chunk_size: 32,
});

/// Payload of an encryptable appendage: sealed ciphertext, or plaintext
/// still waiting for the builder to encrypt it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EncryptablePayload {
    Sealed(EncryptedData),
    Pending {
        plaintext: Vec<u8>,
        recipient_public_key: Option<PublicKey>,
    },
}

impl EncryptablePayload {
    fn sealed(&self) -> Option<&EncryptedData> {
        match self {
            EncryptablePayload::Sealed(data) => Some(data),
            EncryptablePayload::Pending { .. } => None,
        }
    }

    /// Estimated ciphertext length: exact for sealed payloads, plaintext
    /// plus the AEAD tag for pending ones.
    fn data_len(&self) -> usize {
        match self {
            EncryptablePayload::Sealed(data) => data.data().len(),
            EncryptablePayload::Pending { plaintext, .. } => plaintext.len() + 16,
        }
    }

    fn seal(&mut self, secret_phrase: &str, fallback_key: PublicKey) -> Result<()> {
        if let EncryptablePayload::Pending {
            plaintext,
            recipient_public_key,
        } = self
        {
            let key = recipient_public_key.unwrap_or(fallback_key);
            let sealed = EncryptedData::encrypt(plaintext, secret_phrase, &key)?;
            *self = EncryptablePayload::Sealed(sealed);
        }
        Ok(())
    }
}

fn parse_encrypted_payload(reader: &mut ByteReader) -> Result<(EncryptedData, bool)> {
    let (length, is_text) = read_flagged_length(reader.i32_le()?);
    if length > MAX_ENCRYPTED_MESSAGE_LENGTH {
        return Err(not_valid(format!(
            "encrypted message length {length} exceeds maximum"
        )));
    }
    let data = reader.bytes(length)?;
    let nonce: [u8; NONCE_LENGTH] = reader
        .bytes(NONCE_LENGTH)?
        .try_into()
        .expect("reader returned the requested length");
    Ok((EncryptedData::new(data, nonce), is_text))
}

fn put_encrypted_payload(out: &mut Vec<u8>, data: &EncryptedData, is_text: bool) {
    out.extend_from_slice(&flagged_length(data.data().len(), is_text).to_le_bytes());
    out.extend_from_slice(data.data());
    out.extend_from_slice(data.nonce());
}

fn encrypted_data_json(data: &EncryptedData, is_text: bool) -> Value {
    let mut object = Map::new();
    object.insert("data".into(), Value::from(hex::encode(data.data())));
    object.insert("nonce".into(), Value::from(hex::encode(data.nonce())));
    object.insert("isText".into(), Value::from(is_text));
    Value::Object(object)
}

fn encrypted_data_from_json(value: &Value) -> Result<(EncryptedData, bool)> {
    let object = value
        .as_object()
        .ok_or_else(|| not_valid("encrypted message must be an object"))?;
    let data = object
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| not_valid("missing encrypted data"))?;
    let data = hex::decode(data).map_err(|_| not_valid("encrypted data is not valid hex"))?;
    let nonce = object
        .get("nonce")
        .and_then(Value::as_str)
        .ok_or_else(|| not_valid("missing encryption nonce"))?;
    let nonce = hex::decode(nonce).map_err(|_| not_valid("encryption nonce is not valid hex"))?;
    let nonce: [u8; NONCE_LENGTH] = nonce
        .try_into()
        .map_err(|_| not_valid("encryption nonce must be 24 bytes"))?;
    let is_text = object
        .get("isText")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    Ok((EncryptedData::new(data, nonce), is_text))
}

fn validate_sealed(
    payload: &EncryptablePayload,
    is_signed: bool,
    what: &str,
) -> Result<()> {
    match payload {
        EncryptablePayload::Pending { .. } if is_signed => Err(not_valid(format!(
            "{what} must be encrypted before the transaction is signed"
        ))),
        EncryptablePayload::Pending { .. } => Ok(()),
        EncryptablePayload::Sealed(data) => {
            if data.data().len() > MAX_ENCRYPTED_MESSAGE_LENGTH {
                return Err(not_valid(format!(
                    "{what} length {} exceeds maximum",
                    data.data().len()
                )));
            }
            if data.data().len() < 16 {
                return Err(not_valid(format!("{what} is shorter than the cipher tag")));
            }
            Ok(())
        }
    }
}

/// A message encrypted to the recipient. Flag bit 0x02.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessageAppendix {
    version: u8,
    is_text: bool,
    payload: EncryptablePayload,
}

impl EncryptedMessageAppendix {
    /// Wraps an already sealed payload.
    pub fn sealed(data: EncryptedData, is_text: bool) -> Self {
        Self {
            version: 1,
            is_text,
            payload: EncryptablePayload::Sealed(data),
        }
    }

    /// Holds plaintext for the builder to encrypt to `recipient_public_key`
    /// when it signs.
    pub fn prepare(plaintext: Vec<u8>, is_text: bool, recipient_public_key: PublicKey) -> Self {
        Self {
            version: 1,
            is_text,
            payload: EncryptablePayload::Pending {
                plaintext,
                recipient_public_key: Some(recipient_public_key),
            },
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let version = reader.u8()?;
        let (data, is_text) = parse_encrypted_payload(reader)?;
        Ok(Self {
            version,
            is_text,
            payload: EncryptablePayload::Sealed(data),
        })
    }

    pub(crate) fn from_json(object: &Map<String, Value>) -> Result<Option<Self>> {
        if !object.contains_key("version.EncryptedMessage") {
            return Ok(None);
        }
        let value = object
            .get("encryptedMessage")
            .ok_or_else(|| not_valid("missing encryptedMessage"))?;
        let (data, is_text) = encrypted_data_from_json(value)?;
        Ok(Some(Self::sealed(data, is_text)))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn is_text(&self) -> bool {
        self.is_text
    }

    /// Sealed ciphertext; `None` while encryption is still pending.
    pub fn encrypted_data(&self) -> Option<&EncryptedData> {
        self.payload.sealed()
    }

    pub fn is_pending(&self) -> bool {
        self.encrypted_data().is_none()
    }

    /// Seals pending plaintext with the sender's secret phrase.
    pub fn encrypt(&mut self, secret_phrase: &str) -> Result<()> {
        let own_key = crypto::public_key(secret_phrase);
        self.payload.seal(secret_phrase, own_key)
    }

    pub fn size(&self) -> usize {
        1 + 4 + self.payload.data_len() + NONCE_LENGTH
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        match self.payload.sealed() {
            Some(data) => put_encrypted_payload(out, data, self.is_text),
            // Serializing pending plaintext would leak it; emit a hole of
            // the right size and rely on validate() rejecting the state.
            None => out.extend(std::iter::repeat(0).take(self.size() - 1)),
        }
    }

    pub fn put_json(&self, object: &mut Map<String, Value>) {
        if let Some(data) = self.payload.sealed() {
            object.insert(
                "encryptedMessage".into(),
                encrypted_data_json(data, self.is_text),
            );
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        ENCRYPTED_MESSAGE_FEE
    }

    pub fn validate(&self, transaction: &Transaction) -> Result<()> {
        validate_sealed(
            &self.payload,
            transaction.signature().is_some(),
            "encrypted message",
        )
    }
}

/// A note the sender encrypts to its own key. Flag bit 0x08.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptToSelfMessageAppendix {
    version: u8,
    is_text: bool,
    payload: EncryptablePayload,
}

impl EncryptToSelfMessageAppendix {
    pub fn sealed(data: EncryptedData, is_text: bool) -> Self {
        Self {
            version: 1,
            is_text,
            payload: EncryptablePayload::Sealed(data),
        }
    }

    /// Holds plaintext; the builder seals it to the sender's own public key
    /// when it signs.
    pub fn prepare(plaintext: Vec<u8>, is_text: bool) -> Self {
        Self {
            version: 1,
            is_text,
            payload: EncryptablePayload::Pending {
                plaintext,
                recipient_public_key: None,
            },
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let version = reader.u8()?;
        let (data, is_text) = parse_encrypted_payload(reader)?;
        Ok(Self {
            version,
            is_text,
            payload: EncryptablePayload::Sealed(data),
        })
    }

    pub(crate) fn from_json(object: &Map<String, Value>) -> Result<Option<Self>> {
        if !object.contains_key("version.EncryptToSelfMessage") {
            return Ok(None);
        }
        let value = object
            .get("encryptToSelfMessage")
            .ok_or_else(|| not_valid("missing encryptToSelfMessage"))?;
        let (data, is_text) = encrypted_data_from_json(value)?;
        Ok(Some(Self::sealed(data, is_text)))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn is_text(&self) -> bool {
        self.is_text
    }

    pub fn encrypted_data(&self) -> Option<&EncryptedData> {
        self.payload.sealed()
    }

    pub fn is_pending(&self) -> bool {
        self.encrypted_data().is_none()
    }

    pub fn encrypt(&mut self, secret_phrase: &str) -> Result<()> {
        let own_key = crypto::public_key(secret_phrase);
        self.payload.seal(secret_phrase, own_key)
    }

    pub fn size(&self) -> usize {
        1 + 4 + self.payload.data_len() + NONCE_LENGTH
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        match self.payload.sealed() {
            Some(data) => put_encrypted_payload(out, data, self.is_text),
            None => out.extend(std::iter::repeat(0).take(self.size() - 1)),
        }
    }

    pub fn put_json(&self, object: &mut Map<String, Value>) {
        if let Some(data) = self.payload.sealed() {
            object.insert(
                "encryptToSelfMessage".into(),
                encrypted_data_json(data, self.is_text),
            );
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        ENCRYPTED_MESSAGE_FEE
    }

    pub fn validate(&self, transaction: &Transaction) -> Result<()> {
        validate_sealed(
            &self.payload,
            transaction.signature().is_some(),
            "encrypt-to-self message",
        )
    }
}

/// An encrypted message whose ciphertext may be pruned; only its hash is
/// consensus-bound. Flag bit 0x40.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunableEncryptedMessageAppendix {
    version: u8,
    hash: Option<[u8; 32]>,
    payload: Option<(EncryptedData, bool)>,
}

impl PrunableEncryptedMessageAppendix {
    pub fn new(data: EncryptedData, is_text: bool) -> Self {
        Self {
            version: 1,
            hash: None,
            payload: Some((data, is_text)),
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(Self {
            version: reader.u8()?,
            hash: Some(reader.array_32()?),
            payload: None,
        })
    }

    pub(crate) fn from_json(object: &Map<String, Value>) -> Result<Option<Self>> {
        if !object.contains_key("version.PrunableEncryptedMessage") {
            return Ok(None);
        }
        let payload = match object.get("encryptedMessage") {
            Some(value) => Some(encrypted_data_from_json(value)?),
            None => None,
        };
        let hash = match object.get("encryptedMessageHash").and_then(Value::as_str) {
            Some(hash) => {
                let hash = hex::decode(hash)
                    .map_err(|_| not_valid("encryptedMessageHash is not valid hex"))?;
                Some(
                    hash.try_into()
                        .map_err(|_| not_valid("encryptedMessageHash must be 32 bytes"))?,
                )
            }
            None => None,
        };
        if payload.is_none() && hash.is_none() {
            return Err(not_valid(
                "prunable encrypted message carries neither payload nor hash",
            ));
        }
        Ok(Some(Self {
            version: 1,
            hash,
            payload,
        }))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn encrypted_data(&self) -> Option<&EncryptedData> {
        self.payload.as_ref().map(|(data, _)| data)
    }

    pub fn is_text(&self) -> bool {
        self.payload.as_ref().map(|(_, t)| *t).unwrap_or(false)
    }

    /// Hash over ciphertext and nonce; computed from the payload when
    /// present, read from the wire otherwise.
    pub fn hash(&self) -> [u8; 32] {
        match &self.payload {
            Some((data, _)) => crypto::sha256_pair(data.data(), data.nonce()),
            None => self
                .hash
                .expect("prunable appendage carries neither payload nor hash"),
        }
    }

    pub fn size(&self) -> usize {
        1 + 32
    }

    pub fn full_size(&self) -> usize {
        self.size()
            + self
                .payload
                .as_ref()
                .map(|(data, _)| data.size())
                .unwrap_or(0)
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.extend_from_slice(&self.hash());
    }

    pub fn put_json(&self, object: &mut Map<String, Value>) {
        object.insert(
            "encryptedMessageHash".into(),
            Value::from(hex::encode(self.hash())),
        );
        if let Some((data, is_text)) = &self.payload {
            object.insert("encryptedMessage".into(), encrypted_data_json(data, *is_text));
        }
    }

    /// Payload fields alone, for the out-of-band prunable bag.
    pub fn prunable_json(&self) -> Option<Value> {
        let (data, is_text) = self.payload.as_ref()?;
        let mut object = Map::new();
        object.insert("encryptedMessage".into(), encrypted_data_json(data, *is_text));
        Some(Value::Object(object))
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        PRUNABLE_ENCRYPTED_MESSAGE_FEE
    }

    pub fn validate(&self, transaction: &Transaction) -> Result<()> {
        match &self.payload {
            Some((data, _)) => {
                if data.data().len() > MAX_ENCRYPTED_MESSAGE_LENGTH {
                    return Err(not_valid(format!(
                        "prunable encrypted message length {} exceeds maximum",
                        data.data().len()
                    )));
                }
                if let Some(declared) = self.hash {
                    if declared != crypto::sha256_pair(data.data(), data.nonce()) {
                        return Err(not_valid(
                            "prunable encrypted message hash does not match payload",
                        ));
                    }
                }
                Ok(())
            }
            None if prunable_expired(transaction.timestamp()) => Ok(()),
            None => Err(not_currently_valid(
                "prunable encrypted message payload is missing",
            )),
        }
    }

    /// Rehydrates the ciphertext from archival storage.
    pub fn load_prunable(
        &mut self,
        full_hash: &[u8; 32],
        transaction_timestamp: i32,
        store: &dyn PrunableStore,
        include_expired: bool,
    ) {
        if self.payload.is_some() {
            return;
        }
        if prunable_expired(transaction_timestamp) && !include_expired {
            return;
        }
        if let Some((data, is_text)) = store.encrypted_message(full_hash) {
            self.payload = Some((data, is_text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: &str = "sender of sealed notes";
    const RECIPIENT: &str = "recipient of sealed notes";

    fn sealed_sample() -> EncryptedData {
        EncryptedData::encrypt(b"hidden text", SENDER, &crypto::public_key(RECIPIENT)).unwrap()
    }

    #[test]
    fn test_encrypted_message_wire_roundtrip() {
        let appendix = EncryptedMessageAppendix::sealed(sealed_sample(), true);
        let mut out = Vec::new();
        appendix.put_bytes(&mut out);
        assert_eq!(out.len(), appendix.size());

        let mut reader = ByteReader::new(&out);
        let parsed = EncryptedMessageAppendix::parse(&mut reader).unwrap();
        assert_eq!(parsed, appendix);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_pending_message_seals_with_phrase() {
        let mut appendix =
            EncryptedMessageAppendix::prepare(b"later".to_vec(), true, crypto::public_key(RECIPIENT));
        assert!(appendix.is_pending());

        appendix.encrypt(SENDER).unwrap();
        assert!(!appendix.is_pending());

        let data = appendix.encrypted_data().unwrap();
        let opened = data.decrypt(RECIPIENT, &crypto::public_key(SENDER)).unwrap();
        assert_eq!(opened, b"later");
    }

    #[test]
    fn test_pending_size_matches_sealed_size() {
        let mut appendix =
            EncryptedMessageAppendix::prepare(b"12345".to_vec(), true, crypto::public_key(RECIPIENT));
        let estimated = appendix.size();
        appendix.encrypt(SENDER).unwrap();
        assert_eq!(appendix.size(), estimated);
    }

    #[test]
    fn test_encrypt_to_self_seals_to_own_key() {
        let mut appendix = EncryptToSelfMessageAppendix::prepare(b"my note".to_vec(), true);
        appendix.encrypt(SENDER).unwrap();

        let data = appendix.encrypted_data().unwrap();
        let own_key = crypto::public_key(SENDER);
        assert_eq!(data.decrypt(SENDER, &own_key).unwrap(), b"my note");
    }

    #[test]
    fn test_prunable_encrypted_hash_covers_nonce() {
        let data = sealed_sample();
        let appendix = PrunableEncryptedMessageAppendix::new(data.clone(), true);
        assert_eq!(appendix.hash(), crypto::sha256_pair(data.data(), data.nonce()));
    }

    #[test]
    fn test_prunable_encrypted_wire_carries_only_hash() {
        let appendix = PrunableEncryptedMessageAppendix::new(sealed_sample(), true);
        let mut out = Vec::new();
        appendix.put_bytes(&mut out);
        assert_eq!(out.len(), 33);

        let parsed =
            PrunableEncryptedMessageAppendix::parse(&mut ByteReader::new(&out)).unwrap();
        assert_eq!(parsed.hash(), appendix.hash());
        assert!(parsed.encrypted_data().is_none());
    }

    #[test]
    fn test_encrypted_json_roundtrip() {
        let appendix = EncryptedMessageAppendix::sealed(sealed_sample(), false);
        let mut object = Map::new();
        object.insert("version.EncryptedMessage".into(), Value::from(1));
        appendix.put_json(&mut object);

        let parsed = EncryptedMessageAppendix::from_json(&object).unwrap().unwrap();
        assert_eq!(parsed, appendix);
    }
}
