//! Canonical Transaction Codec
//!
//! Binary layout (all integers little-endian):
//!
//! ```text
//! offset  size  field
//!   0      1    type
//!   1      1    (version << 4) | subtype
//!   2      4    timestamp (i32)
//!   6      2    deadline (i16)
//!   8     32    sender public key
//!  40      8    recipient id (CREATOR_ID when the type forbids one)
//!  48      8    amount NQT (i64)
//!  56      8    fee NQT (i64)
//!  64     32    referenced transaction full hash (zeroed if absent)
//!  96     64    signature (zeroed if absent, and for signing/id derivation)
//! 160      4    flags (version > 0 only)
//! 164      4    EC block height        "
//! 168      8    EC block id            "
//! 176    ...    attachment, then each set appendage in flag-bit order
//! ```
//!
//! Version-0 transactions omit the flags and EC fields; their only possible
//! appendage is the implicit plain message of an arbitrary-message
//! transaction, which directly follows the signature.
//!
//! The JSON mirror round-trips every consensus field; unsigned 64-bit ids
//! travel as decimal strings to survive JSON number precision.

use serde_json::{Map, Value};

use crate::constants::CREATOR_ID;
use crate::crypto::SignatureBytes;
use crate::error::{not_valid, Result};
use crate::transaction::appendix::{
    Appendage, EncryptToSelfMessageAppendix, EncryptedMessageAppendix, MessageAppendix,
    PhasingAppendix, PrunableEncryptedMessageAppendix, PrunablePlainMessageAppendix,
    PublicKeyAnnouncementAppendix, ALL_FLAGS, KNOWN_FLAGS,
};
use crate::transaction::builder::TransactionBuilder;
use crate::transaction::kind::{self, TYPE_MESSAGING};
use crate::transaction::Transaction;

/// Forward-only cursor over untrusted transaction bytes.
pub struct ByteReader<'a> {
    input: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.input.len() < n {
            return Err(not_valid("transaction bytes too short"));
        }
        let (head, tail) = self.input.split_at(n);
        self.input = tail;
        Ok(head)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i16_le(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn i32_le(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i64_le(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes(b.try_into().expect("8-byte slice")))
    }

    pub fn u64_le(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().expect("8-byte slice")))
    }

    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.take(n).map(<[u8]>::to_vec)
    }

    pub fn array_32(&mut self) -> Result<[u8; 32]> {
        let b = self.take(32)?;
        Ok(b.try_into().expect("32-byte slice"))
    }

    pub fn array_64(&mut self) -> Result<[u8; 64]> {
        let b = self.take(64)?;
        Ok(b.try_into().expect("64-byte slice"))
    }
}

/// Canonical serialization of a transaction. Field order is
/// consensus-relevant; changing it is a hard fork.
pub(crate) fn encode(transaction: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(transaction.size());
    out.push(transaction.type_code());
    out.push((transaction.version() << 4) | transaction.subtype_code());
    out.extend_from_slice(&transaction.timestamp().to_le_bytes());
    out.extend_from_slice(&transaction.deadline().to_le_bytes());
    out.extend_from_slice(transaction.sender_public_key());
    let wire_recipient = if transaction.kind().can_have_recipient() {
        transaction.recipient_id()
    } else {
        CREATOR_ID
    };
    out.extend_from_slice(&wire_recipient.to_le_bytes());
    out.extend_from_slice(&transaction.amount_nqt().to_le_bytes());
    out.extend_from_slice(&transaction.fee_nqt().to_le_bytes());
    match transaction.referenced_transaction_full_hash() {
        Some(hash) => out.extend_from_slice(hash),
        None => out.extend_from_slice(&[0u8; 32]),
    }
    match transaction.signature() {
        Some(signature) => out.extend_from_slice(signature),
        None => out.extend_from_slice(&[0u8; 64]),
    }
    if transaction.version() > 0 {
        out.extend_from_slice(&transaction.flags().to_le_bytes());
        out.extend_from_slice(&transaction.ec_block_height().to_le_bytes());
        out.extend_from_slice(&transaction.ec_block_id().to_le_bytes());
    }
    transaction.attachment().put_bytes(&mut out);
    for appendage in transaction.appendages() {
        appendage.put_bytes(&mut out);
    }
    out
}

/// Parses the canonical serialization into a builder. The builder carries
/// the signature verbatim; calling `build` re-derives the immutable
/// transaction.
pub fn decode(bytes: &[u8]) -> Result<TransactionBuilder> {
    let mut reader = ByteReader::new(bytes);

    let type_code = reader.u8()?;
    let packed = reader.u8()?;
    let version = packed >> 4;
    let subtype_code = packed & 0x0F;
    let timestamp = reader.i32_le()?;
    let deadline = reader.i16_le()?;
    let sender_public_key = reader.array_32()?;
    let wire_recipient = reader.u64_le()?;
    let amount_nqt = reader.i64_le()?;
    let fee_nqt = reader.i64_le()?;
    let referenced_hash = reader.array_32()?;
    let signature = reader.array_64()?;

    let (flags, ec_block_height, ec_block_id) = if version > 0 {
        (reader.u32_le()?, reader.i32_le()?, reader.u64_le()?)
    } else {
        (0, 0, 0)
    };
    if flags & !KNOWN_FLAGS != 0 {
        return Err(not_valid(format!("unknown transaction flags {flags:#x}")));
    }

    let kind = kind::require_kind(type_code, subtype_code)?;
    let attachment = kind.parse_attachment(&mut reader)?;

    let mut builder = TransactionBuilder::new(attachment)
        .version(version)
        .timestamp(timestamp)
        .deadline(deadline)
        .sender_public_key(sender_public_key)
        .amount_nqt(amount_nqt)
        .fee_nqt(fee_nqt)
        .ec_block(ec_block_height, ec_block_id);
    if kind.can_have_recipient() {
        builder = builder.recipient_id(wire_recipient);
    }
    if referenced_hash != [0u8; 32] {
        builder = builder.referenced_transaction_full_hash(referenced_hash);
    }
    if signature != [0u8; 64] {
        builder = builder.signature(signature);
    }

    if version == 0 {
        // Legacy rule: an arbitrary-message transaction carries an implicit
        // plain message appendage after the signature.
        if type_code == TYPE_MESSAGING
            && subtype_code == kind::SUBTYPE_MESSAGING_ARBITRARY_MESSAGE
        {
            let message = MessageAppendix::parse_legacy(&mut reader)?;
            builder = builder.appendage(Appendage::Message(message));
        }
    } else {
        for flag in ALL_FLAGS {
            if flags & flag != 0 {
                builder = builder.appendage(Appendage::parse(flag, &mut reader)?);
            }
        }
    }

    if !reader.is_empty() {
        return Err(not_valid("transaction bytes too long"));
    }
    Ok(builder)
}

/// Canonical JSON mirror.
pub(crate) fn to_json(transaction: &Transaction) -> Value {
    let mut object = Map::new();
    object.insert("type".into(), Value::from(transaction.type_code()));
    object.insert("subtype".into(), Value::from(transaction.subtype_code()));
    object.insert("timestamp".into(), Value::from(transaction.timestamp()));
    object.insert("deadline".into(), Value::from(transaction.deadline()));
    object.insert(
        "senderPublicKey".into(),
        Value::from(hex::encode(transaction.sender_public_key())),
    );
    if transaction.kind().can_have_recipient() && transaction.recipient_id() != 0 {
        object.insert(
            "recipient".into(),
            Value::from(transaction.recipient_id().to_string()),
        );
    }
    object.insert("amountNQT".into(), Value::from(transaction.amount_nqt()));
    object.insert("feeNQT".into(), Value::from(transaction.fee_nqt()));
    if let Some(hash) = transaction.referenced_transaction_full_hash() {
        object.insert(
            "referencedTransactionFullHash".into(),
            Value::from(hex::encode(hash)),
        );
    }
    object.insert(
        "ecBlockHeight".into(),
        Value::from(transaction.ec_block_height()),
    );
    object.insert(
        "ecBlockId".into(),
        Value::from(transaction.ec_block_id().to_string()),
    );
    if let Some(signature) = transaction.signature() {
        object.insert("signature".into(), Value::from(hex::encode(signature)));
    }
    let mut attachment = Map::new();
    transaction.attachment().put_json(&mut attachment);
    for appendage in transaction.appendages() {
        appendage.put_json(&mut attachment);
    }
    if !attachment.is_empty() {
        object.insert("attachment".into(), Value::Object(attachment));
    }
    object.insert("version".into(), Value::from(transaction.version()));
    Value::Object(object)
}

/// Prunable payloads for out-of-band delivery.
pub(crate) fn prunable_attachment_json(transaction: &Transaction) -> Option<Value> {
    let mut object = Map::new();
    if let Some(Value::Object(entries)) = transaction
        .prunable_plain_message()
        .and_then(PrunablePlainMessageAppendix::prunable_json)
    {
        object.extend(entries);
    }
    if let Some(Value::Object(entries)) = transaction
        .prunable_encrypted_message()
        .and_then(PrunableEncryptedMessageAppendix::prunable_json)
    {
        object.extend(entries);
    }
    if object.is_empty() {
        None
    } else {
        Some(Value::Object(object))
    }
}

fn required_u8(object: &Map<String, Value>, key: &str) -> Result<u8> {
    object
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| not_valid(format!("missing or invalid {key}")))
}

fn required_i64(object: &Map<String, Value>, key: &str) -> Result<i64> {
    object
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| not_valid(format!("missing or invalid {key}")))
}

fn decimal_id(object: &Map<String, Value>, key: &str) -> Result<Option<u64>> {
    match object.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .and_then(|id| id.parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| not_valid(format!("{key} must be an unsigned decimal string"))),
    }
}

/// Parses the JSON mirror back into a builder.
pub fn from_json(value: &Value) -> Result<TransactionBuilder> {
    let object = value
        .as_object()
        .ok_or_else(|| not_valid("transaction JSON must be an object"))?;

    let type_code = required_u8(object, "type")?;
    let subtype_code = required_u8(object, "subtype")?;
    let version = match object.get("version") {
        Some(v) => v
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| not_valid("invalid version"))?,
        None => 1,
    };
    let kind = kind::require_kind(type_code, subtype_code)?;

    let timestamp = required_i64(object, "timestamp")? as i32;
    let deadline = required_i64(object, "deadline")? as i16;
    let sender_public_key = object
        .get("senderPublicKey")
        .and_then(Value::as_str)
        .ok_or_else(|| not_valid("missing senderPublicKey"))?;
    let sender_public_key: [u8; 32] = hex::decode(sender_public_key)
        .map_err(|_| not_valid("senderPublicKey is not valid hex"))?
        .try_into()
        .map_err(|_| not_valid("senderPublicKey must be 32 bytes"))?;
    let amount_nqt = required_i64(object, "amountNQT")?;
    let fee_nqt = required_i64(object, "feeNQT")?;

    let empty = Map::new();
    let attachment_object = object
        .get("attachment")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let attachment = kind.attachment_from_json(attachment_object)?;

    let mut builder = TransactionBuilder::new(attachment)
        .version(version)
        .timestamp(timestamp)
        .deadline(deadline)
        .sender_public_key(sender_public_key)
        .amount_nqt(amount_nqt)
        .fee_nqt(fee_nqt);

    if let Some(recipient) = decimal_id(object, "recipient")? {
        builder = builder.recipient_id(recipient);
    }
    if let Some(hash) = object
        .get("referencedTransactionFullHash")
        .and_then(Value::as_str)
    {
        let hash: [u8; 32] = hex::decode(hash)
            .map_err(|_| not_valid("referencedTransactionFullHash is not valid hex"))?
            .try_into()
            .map_err(|_| not_valid("referencedTransactionFullHash must be 32 bytes"))?;
        builder = builder.referenced_transaction_full_hash(hash);
    }
    if let Some(height) = object.get("ecBlockHeight").and_then(Value::as_i64) {
        let id = decimal_id(object, "ecBlockId")?.unwrap_or(0);
        builder = builder.ec_block(height as i32, id);
    }
    if let Some(signature) = object.get("signature").and_then(Value::as_str) {
        let signature: SignatureBytes = hex::decode(signature)
            .map_err(|_| not_valid("signature is not valid hex"))?
            .try_into()
            .map_err(|_| not_valid("signature must be 64 bytes"))?;
        builder = builder.signature(signature);
    }

    if let Some(message) = MessageAppendix::from_json(attachment_object, version)? {
        builder = builder.appendage(Appendage::Message(message));
    }
    if let Some(appendage) = EncryptedMessageAppendix::from_json(attachment_object)? {
        builder = builder.appendage(Appendage::EncryptedMessage(appendage));
    }
    if let Some(appendage) = PublicKeyAnnouncementAppendix::from_json(attachment_object)? {
        builder = builder.appendage(Appendage::PublicKeyAnnouncement(appendage));
    }
    if let Some(appendage) = EncryptToSelfMessageAppendix::from_json(attachment_object)? {
        builder = builder.appendage(Appendage::EncryptToSelfMessage(appendage));
    }
    if let Some(appendage) = PhasingAppendix::from_json(attachment_object)? {
        builder = builder.appendage(Appendage::Phasing(appendage));
    }
    if let Some(appendage) = PrunablePlainMessageAppendix::from_json(attachment_object)? {
        builder = builder.appendage(Appendage::PrunablePlainMessage(appendage));
    }
    if let Some(appendage) = PrunableEncryptedMessageAppendix::from_json(attachment_object)? {
        builder = builder.appendage(Appendage::PrunableEncryptedMessage(appendage));
    }

    Ok(builder)
}
