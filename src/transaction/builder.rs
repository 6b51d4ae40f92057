//! Transaction Builder
//!
//! Accumulates fields, applies defaults, resolves the fee floor and seals
//! the transaction. The builder is a plain single-threaded value; the
//! [`Transaction`] it produces is immutable and freely shareable.
//!
//! Sealing rules:
//! - a signature and a secret phrase together are refused (double signing);
//! - an adopted signature is taken verbatim;
//! - a secret phrase signs the canonical unsigned bytes, after sealing any
//!   appendage still holding plaintext;
//! - neither yields an unsigned transaction, valid for further assembly.

use tracing::debug;

use crate::chain::{ChainView, PrunableStore};
use crate::config::EngineConfig;
use crate::constants::epoch_time_now;
use crate::crypto::{self, PublicKey, SignatureBytes};
use crate::error::{not_valid, Result};
use crate::transaction::appendix::{
    Appendage, EncryptToSelfMessageAppendix, EncryptedMessageAppendix, MessageAppendix,
    PhasingAppendix, PrunableEncryptedMessageAppendix, PrunablePlainMessageAppendix,
    PublicKeyAnnouncementAppendix,
};
use crate::transaction::kind::Attachment;
use crate::transaction::{minimum_fee_nqt, Transaction};

/// Builder for [`Transaction`]. Created from the attachment, which pins the
/// transaction kind.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    version: u8,
    attachment: Attachment,
    timestamp: Option<i32>,
    deadline: i16,
    sender_public_key: Option<PublicKey>,
    recipient_id: u64,
    amount_nqt: i64,
    fee_nqt: i64,
    referenced_transaction_full_hash: Option<[u8; 32]>,
    signature: Option<SignatureBytes>,
    ec_block: Option<(i32, u64)>,

    message: Option<MessageAppendix>,
    encrypted_message: Option<EncryptedMessageAppendix>,
    public_key_announcement: Option<PublicKeyAnnouncementAppendix>,
    encrypt_to_self_message: Option<EncryptToSelfMessageAppendix>,
    phasing: Option<PhasingAppendix>,
    prunable_plain_message: Option<PrunablePlainMessageAppendix>,
    prunable_encrypted_message: Option<PrunableEncryptedMessageAppendix>,
}

impl TransactionBuilder {
    pub fn new(attachment: Attachment) -> Self {
        Self {
            version: 1,
            attachment,
            timestamp: None,
            deadline: 1440,
            sender_public_key: None,
            recipient_id: 0,
            amount_nqt: 0,
            fee_nqt: 0,
            referenced_transaction_full_hash: None,
            signature: None,
            ec_block: None,
            message: None,
            encrypted_message: None,
            public_key_announcement: None,
            encrypt_to_self_message: None,
            phasing: None,
            prunable_plain_message: None,
            prunable_encrypted_message: None,
        }
    }

    pub(crate) fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Creation time in protocol-epoch seconds. Defaults to the current
    /// time at build.
    pub fn timestamp(mut self, timestamp: i32) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validity window in minutes after the timestamp.
    pub fn deadline(mut self, deadline: i16) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn sender_public_key(mut self, key: PublicKey) -> Self {
        self.sender_public_key = Some(key);
        self
    }

    pub fn recipient_id(mut self, recipient_id: u64) -> Self {
        self.recipient_id = recipient_id;
        self
    }

    pub fn amount_nqt(mut self, amount_nqt: i64) -> Self {
        self.amount_nqt = amount_nqt;
        self
    }

    pub fn fee_nqt(mut self, fee_nqt: i64) -> Self {
        self.fee_nqt = fee_nqt;
        self
    }

    pub fn referenced_transaction_full_hash(mut self, full_hash: [u8; 32]) -> Self {
        self.referenced_transaction_full_hash = Some(full_hash);
        self
    }

    /// Adopts an existing signature (peer-received or externally signed
    /// transactions).
    pub fn signature(mut self, signature: SignatureBytes) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Pins the economic-cluster block. Resolved from the chain at build
    /// when not set.
    pub fn ec_block(mut self, height: i32, id: u64) -> Self {
        self.ec_block = Some((height, id));
        self
    }

    pub fn message(mut self, message: MessageAppendix) -> Self {
        self.message = Some(message);
        self
    }

    pub fn encrypted_message(mut self, message: EncryptedMessageAppendix) -> Self {
        self.encrypted_message = Some(message);
        self
    }

    pub fn public_key_announcement(
        mut self,
        announcement: PublicKeyAnnouncementAppendix,
    ) -> Self {
        self.public_key_announcement = Some(announcement);
        self
    }

    pub fn encrypt_to_self_message(mut self, message: EncryptToSelfMessageAppendix) -> Self {
        self.encrypt_to_self_message = Some(message);
        self
    }

    pub fn phasing(mut self, phasing: PhasingAppendix) -> Self {
        self.phasing = Some(phasing);
        self
    }

    pub fn prunable_plain_message(mut self, message: PrunablePlainMessageAppendix) -> Self {
        self.prunable_plain_message = Some(message);
        self
    }

    pub fn prunable_encrypted_message(
        mut self,
        message: PrunableEncryptedMessageAppendix,
    ) -> Self {
        self.prunable_encrypted_message = Some(message);
        self
    }

    /// Slots any appendage; a later appendage of the same kind replaces an
    /// earlier one.
    pub fn appendage(self, appendage: Appendage) -> Self {
        match appendage {
            Appendage::Message(a) => self.message(a),
            Appendage::EncryptedMessage(a) => self.encrypted_message(a),
            Appendage::PublicKeyAnnouncement(a) => self.public_key_announcement(a),
            Appendage::EncryptToSelfMessage(a) => self.encrypt_to_self_message(a),
            Appendage::Phasing(a) => self.phasing(a),
            Appendage::PrunablePlainMessage(a) => self.prunable_plain_message(a),
            Appendage::PrunableEncryptedMessage(a) => self.prunable_encrypted_message(a),
        }
    }

    /// Rehydrates pruned payloads from archival storage, given the owning
    /// transaction's full hash.
    pub fn load_prunables(
        mut self,
        full_hash: &[u8; 32],
        store: &dyn PrunableStore,
        include_expired: bool,
    ) -> Self {
        let timestamp = self.timestamp.unwrap_or_else(epoch_time_now);
        if let Some(message) = &mut self.prunable_plain_message {
            message.load_prunable(full_hash, timestamp, store, include_expired);
        }
        if let Some(message) = &mut self.prunable_encrypted_message {
            message.load_prunable(full_hash, timestamp, store, include_expired);
        }
        self
    }

    /// Builds an unsigned transaction, or one carrying an adopted
    /// signature.
    pub fn build(self, chain: &dyn ChainView, config: &EngineConfig) -> Result<Transaction> {
        self.build_inner(None, chain, config)
    }

    /// Builds and signs with the secret phrase.
    pub fn sign_and_build(
        self,
        secret_phrase: &str,
        chain: &dyn ChainView,
        config: &EngineConfig,
    ) -> Result<Transaction> {
        self.build_inner(Some(secret_phrase), chain, config)
    }

    fn build_inner(
        mut self,
        secret_phrase: Option<&str>,
        chain: &dyn ChainView,
        config: &EngineConfig,
    ) -> Result<Transaction> {
        if self.signature.is_some() && secret_phrase.is_some() {
            return Err(not_valid("transaction is already signed"));
        }

        let timestamp = self.timestamp.unwrap_or_else(epoch_time_now);
        let (ec_block_height, ec_block_id) = match self.ec_block {
            Some(ec) => ec,
            None => {
                let ec = chain.ec_block(timestamp);
                (ec.height, ec.id)
            }
        };

        let sender_public_key = match (self.sender_public_key, secret_phrase) {
            (Some(key), Some(phrase)) => {
                if key != crypto::public_key(phrase) {
                    return Err(not_valid(
                        "secret phrase does not match the sender public key",
                    ));
                }
                key
            }
            (Some(key), None) => key,
            (None, Some(phrase)) => crypto::public_key(phrase),
            (None, None) => return Err(not_valid("sender public key is required")),
        };

        if let Some(phrase) = secret_phrase {
            if let Some(message) = &mut self.encrypted_message {
                message.encrypt(phrase)?;
            }
            if let Some(message) = &mut self.encrypt_to_self_message {
                message.encrypt(phrase)?;
            }
        }

        let appendages: Vec<Appendage> = [
            self.message.map(Appendage::Message),
            self.encrypted_message.map(Appendage::EncryptedMessage),
            self.public_key_announcement
                .map(Appendage::PublicKeyAnnouncement),
            self.encrypt_to_self_message
                .map(Appendage::EncryptToSelfMessage),
            self.phasing.map(Appendage::Phasing),
            self.prunable_plain_message
                .map(Appendage::PrunablePlainMessage),
            self.prunable_encrypted_message
                .map(Appendage::PrunableEncryptedMessage),
        ]
        .into_iter()
        .flatten()
        .collect();

        let kind = self.attachment.kind();
        let fee_nqt = if timestamp == 0 {
            // Genesis sentinel: the fee is taken verbatim.
            self.fee_nqt
        } else if self.fee_nqt <= 0
            || (config.correct_invalid_fees && self.signature.is_none())
        {
            let minimum = minimum_fee_nqt(
                kind,
                &self.attachment,
                &appendages,
                self.referenced_transaction_full_hash.is_some(),
                chain.height(),
            );
            let resolved = minimum.max(self.fee_nqt);
            if resolved != self.fee_nqt {
                debug!(
                    requested = self.fee_nqt,
                    resolved, "fee raised to the current floor"
                );
            }
            resolved
        } else {
            self.fee_nqt
        };

        let transaction = Transaction::assemble(
            self.version,
            kind,
            timestamp,
            self.deadline,
            sender_public_key,
            self.recipient_id,
            self.amount_nqt,
            fee_nqt,
            self.referenced_transaction_full_hash,
            self.signature,
            ec_block_height,
            ec_block_id,
            self.attachment,
            appendages,
        );
        transaction.validate_structure()?;

        match secret_phrase {
            None => Ok(transaction),
            Some(phrase) => {
                let signature = crypto::sign(&transaction.unsigned_bytes(), phrase);
                Ok(transaction.with_signature(signature))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use crate::constants::ONE_QBR;
    use crate::error::TransactionError;
    use crate::transaction::codec;

    const SECRET: &str = "builder test secret phrase";

    fn chain_at_height_ten() -> MemoryChain {
        let chain = MemoryChain::new();
        for height in 0..=10 {
            chain.push_block(1000 + height as u64, height * 30);
        }
        chain
    }

    fn payment() -> TransactionBuilder {
        TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(400)
            .recipient_id(77)
            .amount_nqt(5 * ONE_QBR)
            .fee_nqt(ONE_QBR)
    }

    #[test]
    fn test_defaults_applied_at_build() {
        let chain = chain_at_height_ten();
        let before = epoch_time_now();
        let tx = TransactionBuilder::new(Attachment::OrdinaryPayment)
            .recipient_id(77)
            .amount_nqt(ONE_QBR)
            .fee_nqt(ONE_QBR)
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap();
        let after = epoch_time_now();

        assert!(tx.timestamp() >= before && tx.timestamp() <= after);
        // EC block resolved from the chain at the build timestamp.
        assert_eq!(tx.ec_block_height(), 10);
        assert_eq!(tx.ec_block_id(), 1010);
        assert_eq!(tx.deadline(), 1440);
    }

    #[test]
    fn test_signing_is_deterministic_and_verifiable() {
        let chain = chain_at_height_ten();
        let a = payment()
            .ec_block(3, 1003)
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap();
        let b = payment()
            .ec_block(3, 1003)
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap();

        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.full_hash().unwrap(), b.full_hash().unwrap());
        assert!(crypto::verify(
            a.signature().unwrap(),
            &a.unsigned_bytes(),
            &crypto::public_key(SECRET)
        ));
    }

    #[test]
    fn test_resigning_is_refused() {
        let chain = chain_at_height_ten();
        let signed = payment()
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap();

        // Reload the signed bytes and try to sign again.
        let err = codec::decode(signed.bytes())
            .unwrap()
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, TransactionError::NotValid(ref m) if m.contains("already signed")));
    }

    #[test]
    fn test_mismatched_public_key_is_refused() {
        let chain = chain_at_height_ten();
        let err = payment()
            .sender_public_key(crypto::public_key("someone else"))
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, TransactionError::NotValid(_)));
    }

    #[test]
    fn test_zero_fee_is_raised_to_the_floor() {
        let chain = chain_at_height_ten();
        let config = EngineConfig {
            correct_invalid_fees: true,
            ..EngineConfig::default()
        };
        let tx = payment()
            .fee_nqt(0)
            .sign_and_build(SECRET, &chain, &config)
            .unwrap();
        assert_eq!(tx.fee_nqt(), tx.minimum_fee_nqt(chain.height()));
        assert_eq!(tx.fee_nqt(), ONE_QBR);
    }

    #[test]
    fn test_low_fee_backfill_requires_unsigned_input() {
        let chain = chain_at_height_ten();
        let config = EngineConfig {
            correct_invalid_fees: true,
            ..EngineConfig::default()
        };

        // Unsigned input: the floor wins over a 1 NQT fee.
        let tx = payment()
            .fee_nqt(1)
            .sign_and_build(SECRET, &chain, &config)
            .unwrap();
        assert_eq!(tx.fee_nqt(), ONE_QBR);

        // Already-signed input keeps its fee verbatim.
        let signed = payment()
            .fee_nqt(1)
            .sign_and_build(SECRET, &chain, &EngineConfig::default());
        // A 1 NQT fee is structurally fine; it fails later at validation.
        let signed = signed.unwrap();
        let reloaded = codec::decode(signed.bytes())
            .unwrap()
            .build(&chain, &config)
            .unwrap();
        assert_eq!(reloaded.fee_nqt(), 1);
        assert_eq!(reloaded.full_hash().unwrap(), signed.full_hash().unwrap());
    }

    #[test]
    fn test_genesis_sentinel_keeps_fee_verbatim() {
        let chain = chain_at_height_ten();
        let tx = TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(0)
            .deadline(0)
            .recipient_id(77)
            .amount_nqt(ONE_QBR)
            .fee_nqt(0)
            .sender_public_key(crypto::public_key(SECRET))
            .build(&chain, &EngineConfig::default())
            .unwrap();
        assert_eq!(tx.fee_nqt(), 0);
        assert_eq!(tx.deadline(), 0);
    }

    #[test]
    fn test_invalid_deadline_is_refused() {
        let chain = chain_at_height_ten();
        assert!(payment()
            .deadline(0)
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .is_err());
        assert!(payment()
            .deadline(1441)
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .is_err());
    }

    #[test]
    fn test_pending_encrypted_message_sealed_at_signing() {
        let chain = chain_at_height_ten();
        let recipient_key = crypto::public_key("recipient phrase");
        let tx = payment()
            .recipient_id(crypto::account_id(&recipient_key))
            .encrypted_message(EncryptedMessageAppendix::prepare(
                b"for your eyes".to_vec(),
                true,
                recipient_key,
            ))
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap();

        let sealed = tx.encrypted_message().unwrap();
        assert!(!sealed.is_pending());
        let opened = sealed
            .encrypted_data()
            .unwrap()
            .decrypt("recipient phrase", &crypto::public_key(SECRET))
            .unwrap();
        assert_eq!(opened, b"for your eyes");
    }

    #[test]
    fn test_missing_sender_key_is_refused() {
        let chain = chain_at_height_ten();
        let err = payment()
            .build(&chain, &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, TransactionError::NotValid(_)));
    }
}
