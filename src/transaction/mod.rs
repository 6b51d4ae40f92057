//! Transaction Core
//!
//! The canonical value-transfer transaction: its consensus fields, the
//! derived identity, and the lifecycle hooks that move balances when the
//! transaction enters or leaves a block.
//!
//! ## Identity
//!
//! A transaction's identity is derived from its signed bytes:
//!
//! ```text
//! full_hash = SHA256(unsigned_bytes || SHA256(signature))
//! id        = first 8 bytes of full_hash, little-endian
//! ```
//!
//! where `unsigned_bytes` is the canonical serialization with the signature
//! field zeroed. Both values are memoized after the first derivation and are
//! undefined (an [`TransactionError::IllegalState`]) until the transaction
//! is signed.
//!
//! ## Immutability
//!
//! A built transaction never changes its consensus fields and is freely
//! shareable across threads. The only mutable state is the block linkage
//! written when the transaction is attached to or detached from a block,
//! and the lazily derived fields, which are published through atomic cells.

pub mod appendix;
pub mod builder;
pub mod codec;
pub mod fee;
pub mod kind;

pub use builder::TransactionBuilder;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{OnceLock, RwLock};

use crate::account::{AccountLedger, LedgerEvent};
use crate::chain::PrunableStore;
use crate::constants::{
    MAX_BALANCE_NQT, MAX_DEADLINE_MINUTES, UNCONFIRMED_POOL_DEPOSIT_NQT,
};
use crate::crypto::{self, PublicKey, SignatureBytes};
use crate::error::{not_valid, Result, TransactionError};
use crate::transaction::appendix::{
    Appendage, EncryptToSelfMessageAppendix, EncryptedMessageAppendix, MessageAppendix,
    PhasingAppendix, PrunableEncryptedMessageAppendix, PrunablePlainMessageAppendix,
    PublicKeyAnnouncementAppendix,
};
use crate::transaction::kind::{Attachment, TransactionKind};
use crate::validation::DuplicateGuard;

/// Byte offset of the signature field in the canonical serialization.
pub const SIGNATURE_OFFSET: usize = 96;

/// Height placeholder for a transaction that has never been in a block.
const UNSET_HEIGHT: i32 = i32::MAX;

/// Where a transaction sits inside a block. Cleared on reorg; the height is
/// retained separately for tiebreaking on reinclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLink {
    pub block_id: u64,
    pub block_timestamp: i32,
    pub index: i16,
}

/// An immutable transaction. Construct through [`TransactionBuilder`].
pub struct Transaction {
    version: u8,
    kind: &'static dyn TransactionKind,
    timestamp: i32,
    deadline: i16,
    sender_public_key: PublicKey,
    recipient_id: u64,
    amount_nqt: i64,
    fee_nqt: i64,
    referenced_transaction_full_hash: Option<[u8; 32]>,
    signature: Option<SignatureBytes>,
    ec_block_height: i32,
    ec_block_id: u64,
    attachment: Attachment,
    appendages: Vec<Appendage>,
    appendages_size: usize,

    bytes: OnceLock<Vec<u8>>,
    full_hash: OnceLock<[u8; 32]>,
    sender_id: OnceLock<u64>,
    signature_verified: AtomicBool,

    block: RwLock<Option<BlockLink>>,
    height: AtomicI32,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        version: u8,
        kind: &'static dyn TransactionKind,
        timestamp: i32,
        deadline: i16,
        sender_public_key: PublicKey,
        recipient_id: u64,
        amount_nqt: i64,
        fee_nqt: i64,
        referenced_transaction_full_hash: Option<[u8; 32]>,
        signature: Option<SignatureBytes>,
        ec_block_height: i32,
        ec_block_id: u64,
        attachment: Attachment,
        appendages: Vec<Appendage>,
    ) -> Self {
        let appendages_size =
            attachment.size() + appendages.iter().map(Appendage::size).sum::<usize>();
        Self {
            version,
            kind,
            timestamp,
            deadline,
            sender_public_key,
            recipient_id,
            amount_nqt,
            fee_nqt,
            referenced_transaction_full_hash,
            signature,
            ec_block_height,
            ec_block_id,
            attachment,
            appendages,
            appendages_size,
            bytes: OnceLock::new(),
            full_hash: OnceLock::new(),
            sender_id: OnceLock::new(),
            signature_verified: AtomicBool::new(false),
            block: RwLock::new(None),
            height: AtomicI32::new(UNSET_HEIGHT),
        }
    }

    /// Reseals the transaction with a freshly computed signature. Consumes
    /// the unsigned value so no stale derived state survives.
    pub(crate) fn with_signature(self, signature: SignatureBytes) -> Self {
        Self::assemble(
            self.version,
            self.kind,
            self.timestamp,
            self.deadline,
            self.sender_public_key,
            self.recipient_id,
            self.amount_nqt,
            self.fee_nqt,
            self.referenced_transaction_full_hash,
            Some(signature),
            self.ec_block_height,
            self.ec_block_id,
            self.attachment,
            self.appendages,
        )
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn kind(&self) -> &'static dyn TransactionKind {
        self.kind
    }

    pub fn type_code(&self) -> u8 {
        self.kind.type_code()
    }

    pub fn subtype_code(&self) -> u8 {
        self.kind.subtype_code()
    }

    pub fn timestamp(&self) -> i32 {
        self.timestamp
    }

    pub fn deadline(&self) -> i16 {
        self.deadline
    }

    /// Protocol-epoch second after which the transaction can no longer be
    /// included in a block.
    pub fn expiration(&self) -> i32 {
        self.timestamp + self.deadline as i32 * 60
    }

    pub fn sender_public_key(&self) -> &PublicKey {
        &self.sender_public_key
    }

    /// Account id derived from the sender public key. Memoized.
    pub fn sender_id(&self) -> u64 {
        *self
            .sender_id
            .get_or_init(|| crypto::account_id(&self.sender_public_key))
    }

    pub fn recipient_id(&self) -> u64 {
        self.recipient_id
    }

    pub fn amount_nqt(&self) -> i64 {
        self.amount_nqt
    }

    pub fn fee_nqt(&self) -> i64 {
        self.fee_nqt
    }

    pub fn referenced_transaction_full_hash(&self) -> Option<&[u8; 32]> {
        self.referenced_transaction_full_hash.as_ref()
    }

    pub fn signature(&self) -> Option<&SignatureBytes> {
        self.signature.as_ref()
    }

    pub fn ec_block_height(&self) -> i32 {
        self.ec_block_height
    }

    pub fn ec_block_id(&self) -> u64 {
        self.ec_block_id
    }

    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// Appendages in canonical (flag-bit) order.
    pub fn appendages(&self) -> &[Appendage] {
        &self.appendages
    }

    /// Appendage presence bitmask, as serialized in the flags field.
    pub fn flags(&self) -> u32 {
        self.appendages
            .iter()
            .fold(0, |flags, appendage| flags | appendage.flag())
    }

    pub fn message(&self) -> Option<&MessageAppendix> {
        self.appendages.iter().find_map(|a| match a {
            Appendage::Message(m) => Some(m),
            _ => None,
        })
    }

    pub fn encrypted_message(&self) -> Option<&EncryptedMessageAppendix> {
        self.appendages.iter().find_map(|a| match a {
            Appendage::EncryptedMessage(m) => Some(m),
            _ => None,
        })
    }

    pub fn public_key_announcement(&self) -> Option<&PublicKeyAnnouncementAppendix> {
        self.appendages.iter().find_map(|a| match a {
            Appendage::PublicKeyAnnouncement(m) => Some(m),
            _ => None,
        })
    }

    pub fn encrypt_to_self_message(&self) -> Option<&EncryptToSelfMessageAppendix> {
        self.appendages.iter().find_map(|a| match a {
            Appendage::EncryptToSelfMessage(m) => Some(m),
            _ => None,
        })
    }

    pub fn phasing(&self) -> Option<&PhasingAppendix> {
        self.appendages.iter().find_map(|a| match a {
            Appendage::Phasing(p) => Some(p),
            _ => None,
        })
    }

    pub fn prunable_plain_message(&self) -> Option<&PrunablePlainMessageAppendix> {
        self.appendages.iter().find_map(|a| match a {
            Appendage::PrunablePlainMessage(m) => Some(m),
            _ => None,
        })
    }

    pub fn prunable_encrypted_message(&self) -> Option<&PrunableEncryptedMessageAppendix> {
        self.appendages.iter().find_map(|a| match a {
            Appendage::PrunableEncryptedMessage(m) => Some(m),
            _ => None,
        })
    }

    /// Whether the transaction's attachment effects are deferred behind a
    /// phasing poll.
    pub fn is_phased(&self) -> bool {
        self.phasing().is_some()
    }

    /// Serialized size in bytes: the fixed header plus attachment and
    /// appendages.
    pub fn size(&self) -> usize {
        header_length(self.version) + self.appendages_size
    }

    /// Size including prunable payloads carried out of band. Fees and the
    /// payload-length bound are charged on this value.
    pub fn full_size(&self) -> usize {
        let pruned_extra: usize = self
            .appendages
            .iter()
            .map(|a| a.full_size() - a.size())
            .sum();
        self.size() + pruned_extra
    }

    /// Canonical serialization. Memoized; the signature field holds zeros
    /// while unsigned.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.get_or_init(|| codec::encode(self))
    }

    /// Canonical serialization with the signature field zeroed. This is
    /// the message that is signed and the first input of the identity
    /// derivation.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut data = self.bytes().to_vec();
        data[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 64].fill(0);
        data
    }

    /// The 32-byte digest identifying the signed transaction.
    pub fn full_hash(&self) -> Result<[u8; 32]> {
        let Some(signature) = &self.signature else {
            return Err(TransactionError::IllegalState(
                "full hash of an unsigned transaction is undefined".into(),
            ));
        };
        Ok(*self.full_hash.get_or_init(|| {
            let signature_hash = crypto::sha256(signature);
            crypto::sha256_pair(&self.unsigned_bytes(), &signature_hash)
        }))
    }

    /// Numeric transaction id: the leading 8 bytes of the full hash,
    /// little-endian.
    pub fn id(&self) -> Result<u64> {
        self.full_hash()
            .map(|hash| u64::from_le_bytes(hash[..8].try_into().expect("hash is 32 bytes")))
    }

    /// The id as the unsigned decimal string used in JSON and APIs.
    pub fn string_id(&self) -> Result<String> {
        self.id().map(crypto::unsigned_decimal)
    }

    /// Id for ledger attribution; zero while unsigned. Unsigned
    /// transactions never reach the ledger hooks.
    pub(crate) fn event_id(&self) -> u64 {
        self.id().unwrap_or(0)
    }

    /// Verifies the signature over the unsigned bytes and binds the sender
    /// public key to the sender account. The result is memoized after the
    /// first success.
    pub fn verify_signature(&self, ledger: &dyn AccountLedger) -> bool {
        if self.signature_verified.load(Ordering::Acquire) {
            return true;
        }
        let Some(signature) = &self.signature else {
            return false;
        };
        let valid = crypto::verify(signature, &self.unsigned_bytes(), &self.sender_public_key)
            && ledger.set_or_verify_public_key(self.sender_id(), &self.sender_public_key);
        if valid {
            self.signature_verified.store(true, Ordering::Release);
        }
        valid
    }

    /// Fee floor at `height`: the attachment's schedule plus every
    /// appendage's schedule, plus the flat surcharge when a referenced
    /// transaction full hash is present.
    pub fn minimum_fee_nqt(&self, height: i32) -> i64 {
        minimum_fee_nqt(
            self.kind,
            &self.attachment,
            &self.appendages,
            self.referenced_transaction_full_hash.is_some(),
            height,
        )
    }

    /// Structural invariants: parameter ranges, the genesis sentinel, and
    /// the recipient rules of the transaction kind. Everything here is
    /// permanent: a failure can never become valid.
    pub fn validate_structure(&self) -> Result<()> {
        if self.version > 1 {
            return Err(not_valid(format!(
                "unsupported transaction version {}",
                self.version
            )));
        }
        if self.timestamp == 0 {
            // Genesis sentinel.
            if self.deadline != 0 || self.fee_nqt != 0 {
                return Err(not_valid(format!(
                    "invalid genesis transaction parameters: deadline {}, fee {}",
                    self.deadline, self.fee_nqt
                )));
            }
        } else if self.deadline < 1
            || self.deadline > MAX_DEADLINE_MINUTES
            || self.fee_nqt <= 0
        {
            return Err(not_valid(format!(
                "invalid transaction parameters: timestamp {}, deadline {}, fee {}",
                self.timestamp, self.deadline, self.fee_nqt
            )));
        }
        if self.fee_nqt > MAX_BALANCE_NQT {
            return Err(not_valid(format!("fee {} above supply cap", self.fee_nqt)));
        }
        if self.amount_nqt < 0 || self.amount_nqt > MAX_BALANCE_NQT {
            return Err(not_valid(format!("invalid amount {}", self.amount_nqt)));
        }
        if self.attachment.kind().type_code() != self.kind.type_code()
            || self.attachment.kind().subtype_code() != self.kind.subtype_code()
        {
            return Err(not_valid("attachment does not match transaction type"));
        }
        if !self.kind.can_have_recipient() && (self.recipient_id != 0 || self.amount_nqt != 0) {
            return Err(not_valid(
                "transactions of this type must have no recipient and no amount",
            ));
        }
        if self.kind.must_have_recipient() && self.recipient_id == 0 {
            return Err(not_valid("transactions of this type must have a recipient"));
        }
        Ok(())
    }

    /// Canonical JSON mirror of the transaction.
    pub fn json(&self) -> serde_json::Value {
        codec::to_json(self)
    }

    /// Prunable payloads alone, for out-of-band delivery alongside the
    /// main JSON. `None` when the transaction has no prunable payloads.
    pub fn prunable_attachment_json(&self) -> Option<serde_json::Value> {
        codec::prunable_attachment_json(self)
    }

    // ---- lifecycle -------------------------------------------------------

    /// Reserves the sender's unconfirmed balance on pool admission.
    /// Returns false when the sender account is unknown or the reservation
    /// fails (a double spend).
    pub fn apply_unconfirmed(&self, ledger: &dyn AccountLedger) -> bool {
        if !ledger.account_exists(self.sender_id()) {
            return false;
        }
        self.kind.apply_unconfirmed(self, ledger)
    }

    /// Reverses a successful [`Transaction::apply_unconfirmed`].
    pub fn undo_unconfirmed(&self, ledger: &dyn AccountLedger) {
        self.kind.undo_unconfirmed(self, ledger);
    }

    /// Applies the transaction at block inclusion. For phased transactions
    /// only the fee moves now; the rest is deferred to
    /// [`Transaction::apply_phased`].
    pub fn apply(&self, ledger: &dyn AccountLedger) {
        let sender = self.sender_id();
        if !ledger.set_or_verify_public_key(sender, &self.sender_public_key) {
            tracing::debug!(sender, "sender public key conflicts with the bound key");
        }
        ledger.add_or_get_account(sender);
        if self.kind.can_have_recipient() && self.recipient_id != 0 {
            ledger.add_or_get_account(self.recipient_id);
        }
        if self.referenced_transaction_full_hash.is_some() {
            ledger.add_to_unconfirmed_balance(
                sender,
                LedgerEvent::UnconfirmedPoolDeposit,
                self.event_id(),
                -UNCONFIRMED_POOL_DEPOSIT_NQT,
            );
        }
        if self.is_phased() {
            ledger.add_to_balance(
                sender,
                LedgerEvent::TransactionFee,
                self.event_id(),
                -self.fee_nqt,
            );
        } else {
            let total = self.amount_nqt.saturating_add(self.fee_nqt);
            ledger.add_to_balance(sender, self.kind.ledger_event(), self.event_id(), -total);
            self.kind.apply_attachment(self, ledger);
            for appendage in &self.appendages {
                appendage.apply(self, ledger);
            }
        }
    }

    /// Applies the deferred half of a phased transaction once its poll
    /// resolves: the amount moves and the attachment takes effect.
    pub fn apply_phased(&self, ledger: &dyn AccountLedger) {
        let sender = self.sender_id();
        ledger.add_to_balance(
            sender,
            self.kind.ledger_event(),
            self.event_id(),
            -self.amount_nqt,
        );
        self.kind.apply_attachment(self, ledger);
        for appendage in &self.appendages {
            if !appendage.is_phasing() {
                appendage.apply(self, ledger);
            }
        }
    }

    /// Per-block duplicate check. Phased transactions run their kind's
    /// duplicate rule at execution height and only the block-level rule at
    /// acceptance height.
    pub fn attachment_is_duplicate(
        &self,
        guard: &mut DuplicateGuard,
        at_acceptance_height: bool,
    ) -> bool {
        let phased = self.is_phased();
        if at_acceptance_height {
            if self.kind.is_block_duplicate(self, guard) {
                return true;
            }
            if !phased {
                return self.kind.is_duplicate(self, guard);
            }
            false
        } else {
            phased && self.kind.is_duplicate(self, guard)
        }
    }

    /// Duplicate check against the unconfirmed pool.
    pub fn is_unconfirmed_duplicate(&self, guard: &mut DuplicateGuard) -> bool {
        self.kind.is_unconfirmed_duplicate(self, guard)
    }

    // ---- block linkage ---------------------------------------------------

    /// Records inclusion in a block.
    pub fn set_block(&self, block_id: u64, height: i32, block_timestamp: i32, index: i16) {
        *self.block.write().expect("block link lock poisoned") = Some(BlockLink {
            block_id,
            block_timestamp,
            index,
        });
        self.height.store(height, Ordering::Release);
    }

    /// Detaches from a block on reorg. The height is retained for
    /// tiebreaking when the transaction is reincluded.
    pub fn unset_block(&self) {
        *self.block.write().expect("block link lock poisoned") = None;
    }

    pub fn block_id(&self) -> Option<u64> {
        self.block
            .read()
            .expect("block link lock poisoned")
            .map(|link| link.block_id)
    }

    pub fn block_timestamp(&self) -> Option<i32> {
        self.block
            .read()
            .expect("block link lock poisoned")
            .map(|link| link.block_timestamp)
    }

    /// Position within the containing block.
    pub fn index(&self) -> Result<i16> {
        self.block
            .read()
            .expect("block link lock poisoned")
            .map(|link| link.index)
            .ok_or_else(|| {
                TransactionError::IllegalState(
                    "index of a transaction outside a block is undefined".into(),
                )
            })
    }

    /// Height of the block the transaction was (last) included in, or
    /// `i32::MAX` when it never was.
    pub fn height(&self) -> i32 {
        self.height.load(Ordering::Acquire)
    }

    /// Rehydrated prunable plain-message payload, fetched from `store`
    /// without mutating the transaction.
    pub fn load_prunable_plain_message(
        &self,
        store: &dyn PrunableStore,
        include_expired: bool,
    ) -> Result<Option<(Vec<u8>, bool)>> {
        let Some(appendage) = self.prunable_plain_message() else {
            return Ok(None);
        };
        if let Some(message) = appendage.message() {
            return Ok(Some((message.to_vec(), appendage.is_text())));
        }
        if appendix::prunable_expired(self.timestamp) && !include_expired {
            return Ok(None);
        }
        Ok(store.plain_message(&self.full_hash()?))
    }
}

/// Fixed header length for a transaction version.
pub(crate) fn header_length(version: u8) -> usize {
    if version > 0 {
        176
    } else {
        160
    }
}

/// Shared fee-floor computation for built transactions and the builder.
pub(crate) fn minimum_fee_nqt(
    kind: &'static dyn TransactionKind,
    attachment: &Attachment,
    appendages: &[Appendage],
    has_referenced_hash: bool,
    height: i32,
) -> i64 {
    let mut fee = kind
        .fee_schedule()
        .at_height(height)
        .fee_for_size(attachment.size());
    for appendage in appendages {
        fee = fee.saturating_add(appendage.fee_nqt(height));
    }
    if has_referenced_hash {
        fee = fee.saturating_add(crate::constants::ONE_QBR);
    }
    fee
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("kind", &self.kind.name())
            .field("version", &self.version)
            .field("timestamp", &self.timestamp)
            .field("deadline", &self.deadline)
            .field("sender", &self.sender_id())
            .field("recipient", &self.recipient_id)
            .field("amount_nqt", &self.amount_nqt)
            .field("fee_nqt", &self.fee_nqt)
            .field("signed", &self.signature.is_some())
            .field("flags", &self.flags())
            .finish()
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for Transaction {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use crate::config::EngineConfig;
    use crate::constants::ONE_QBR;
    use crate::transaction::builder::TransactionBuilder;

    const SECRET: &str = "wagon frost letter glow";

    fn signed_payment() -> Transaction {
        let chain = MemoryChain::new();
        TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(100)
            .deadline(1440)
            .recipient_id(0x1122334455667788)
            .amount_nqt(5 * ONE_QBR)
            .fee_nqt(ONE_QBR)
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap()
    }

    #[test]
    fn test_id_undefined_before_signing() {
        let chain = MemoryChain::new();
        let tx = TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(100)
            .recipient_id(1)
            .amount_nqt(ONE_QBR)
            .fee_nqt(ONE_QBR)
            .sender_public_key(crypto::public_key(SECRET))
            .build(&chain, &EngineConfig::default())
            .unwrap();

        assert!(matches!(tx.id(), Err(TransactionError::IllegalState(_))));
        assert!(matches!(
            tx.full_hash(),
            Err(TransactionError::IllegalState(_))
        ));
    }

    #[test]
    fn test_id_stable_across_rederivations() {
        let tx = signed_payment();
        let first = tx.id().unwrap();
        for _ in 0..100 {
            assert_eq!(tx.id().unwrap(), first);
        }
    }

    #[test]
    fn test_id_unaffected_by_block_linkage() {
        let tx = signed_payment();
        let id = tx.id().unwrap();
        let hash = tx.full_hash().unwrap();

        tx.set_block(42, 10, 600, 3);
        assert_eq!(tx.id().unwrap(), id);
        assert_eq!(tx.full_hash().unwrap(), hash);
        assert_eq!(tx.block_id(), Some(42));
        assert_eq!(tx.index().unwrap(), 3);

        tx.unset_block();
        assert_eq!(tx.id().unwrap(), id);
        // Height survives detachment.
        assert_eq!(tx.height(), 10);
        assert!(tx.index().is_err());
    }

    #[test]
    fn test_full_hash_matches_manual_derivation() {
        let tx = signed_payment();
        let signature_hash = crypto::sha256(tx.signature().unwrap());
        let expected = crypto::sha256_pair(&tx.unsigned_bytes(), &signature_hash);
        assert_eq!(tx.full_hash().unwrap(), expected);
    }

    #[test]
    fn test_expiration() {
        let tx = signed_payment();
        assert_eq!(tx.expiration(), 100 + 1440 * 60);
    }

    #[test]
    fn test_verify_signature_binds_public_key() {
        use crate::account::MemoryLedger;

        let tx = signed_payment();
        let ledger = MemoryLedger::new();
        assert!(tx.verify_signature(&ledger));
        assert_eq!(
            ledger.get_public_key(tx.sender_id()),
            Some(*tx.sender_public_key())
        );
        // Memoized second call.
        assert!(tx.verify_signature(&ledger));
    }

    #[test]
    fn test_verify_signature_rejects_conflicting_key() {
        use crate::account::MemoryLedger;

        let tx = signed_payment();
        let ledger = MemoryLedger::new();
        ledger.set_or_verify_public_key(tx.sender_id(), &[9u8; 32]);
        assert!(!tx.verify_signature(&ledger));
    }

    #[test]
    fn test_apply_unconfirmed_reserves_and_detects_double_spend() {
        use crate::account::MemoryLedger;

        let tx = signed_payment(); // 5 QBR amount, 1 QBR fee
        let ledger = MemoryLedger::new();

        // Unknown sender: nothing to reserve against.
        assert!(!tx.apply_unconfirmed(&ledger));

        ledger.seed_account(tx.sender_id(), 10 * ONE_QBR);
        assert!(tx.apply_unconfirmed(&ledger));
        assert_eq!(ledger.unconfirmed_balance_nqt(tx.sender_id()), 4 * ONE_QBR);
        // Confirmed balance is untouched by the reservation.
        assert_eq!(ledger.balance_nqt(tx.sender_id()), 10 * ONE_QBR);

        // A second reservation would overdraw.
        assert!(!tx.apply_unconfirmed(&ledger));

        tx.undo_unconfirmed(&ledger);
        assert_eq!(ledger.unconfirmed_balance_nqt(tx.sender_id()), 10 * ONE_QBR);
    }

    #[test]
    fn test_apply_moves_amount_and_fee() {
        use crate::account::MemoryLedger;

        let tx = signed_payment();
        let ledger = MemoryLedger::new();
        ledger.seed_account(tx.sender_id(), 10 * ONE_QBR);

        tx.apply(&ledger);
        assert_eq!(ledger.balance_nqt(tx.sender_id()), 4 * ONE_QBR);
        assert_eq!(ledger.balance_nqt(tx.recipient_id()), 5 * ONE_QBR);
        assert_eq!(
            ledger.unconfirmed_balance_nqt(tx.recipient_id()),
            5 * ONE_QBR
        );
        // The sender's public key is now bound.
        assert_eq!(
            ledger.get_public_key(tx.sender_id()),
            Some(*tx.sender_public_key())
        );
    }

    #[test]
    fn test_apply_debits_pool_deposit_for_referenced_hash() {
        use crate::account::MemoryLedger;

        let chain = MemoryChain::new();
        let tx = TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(100)
            .recipient_id(42)
            .amount_nqt(ONE_QBR)
            .fee_nqt(2 * ONE_QBR)
            .referenced_transaction_full_hash([3u8; 32])
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap();

        let ledger = MemoryLedger::new();
        ledger.seed_account(tx.sender_id(), 500 * ONE_QBR);
        tx.apply(&ledger);
        assert_eq!(
            ledger.unconfirmed_balance_nqt(tx.sender_id()),
            500 * ONE_QBR - crate::constants::UNCONFIRMED_POOL_DEPOSIT_NQT
        );
    }

    #[test]
    fn test_phased_apply_charges_fee_only_then_defers_amount() {
        use crate::account::MemoryLedger;
        use crate::transaction::appendix::PhasingAppendix;

        let chain = MemoryChain::new();
        let tx = TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(100)
            .recipient_id(42)
            .amount_nqt(5 * ONE_QBR)
            .fee_nqt(2 * ONE_QBR)
            .phasing(PhasingAppendix::new(1_000, 1, vec![]))
            .sign_and_build(SECRET, &chain, &EngineConfig::default())
            .unwrap();

        let ledger = MemoryLedger::new();
        ledger.seed_account(tx.sender_id(), 10 * ONE_QBR);

        tx.apply(&ledger);
        // Fee only at inclusion.
        assert_eq!(ledger.balance_nqt(tx.sender_id()), 8 * ONE_QBR);
        assert_eq!(ledger.balance_nqt(tx.recipient_id()), 0);

        tx.apply_phased(&ledger);
        assert_eq!(ledger.balance_nqt(tx.sender_id()), 3 * ONE_QBR);
        assert_eq!(ledger.balance_nqt(tx.recipient_id()), 5 * ONE_QBR);
    }

    #[test]
    fn test_minimum_fee_nondecreasing_across_appendage_additions() {
        let chain = MemoryChain::new();
        let config = EngineConfig::default();
        let base = TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(100)
            .recipient_id(1)
            .amount_nqt(ONE_QBR)
            .fee_nqt(10 * ONE_QBR)
            .sender_public_key(crypto::public_key(SECRET));

        let plain = base.clone().build(&chain, &config).unwrap();
        let with_message = base
            .clone()
            .message(appendix::MessageAppendix::text("a short note"))
            .build(&chain, &config)
            .unwrap();
        let with_both = base
            .message(appendix::MessageAppendix::text("a short note"))
            .phasing(PhasingAppendix::new(1_000, 1, vec![]))
            .build(&chain, &config)
            .unwrap();

        let floor_plain = plain.minimum_fee_nqt(0);
        let floor_message = with_message.minimum_fee_nqt(0);
        let floor_both = with_both.minimum_fee_nqt(0);
        assert!(floor_message >= floor_plain);
        assert!(floor_both >= floor_message);
    }

    #[test]
    fn test_shared_across_threads() {
        let tx = std::sync::Arc::new(signed_payment());
        let expected = tx.id().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tx = tx.clone();
                std::thread::spawn(move || (tx.id().unwrap(), tx.full_hash().unwrap()))
            })
            .collect();
        for handle in handles {
            let (id, hash) = handle.join().unwrap();
            assert_eq!(id, expected);
            assert_eq!(hash, tx.full_hash().unwrap());
        }
    }

    #[test]
    fn test_minimum_fee_includes_referenced_hash_surcharge() {
        let chain = MemoryChain::new();
        let plain = TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(100)
            .recipient_id(1)
            .amount_nqt(ONE_QBR)
            .fee_nqt(ONE_QBR)
            .sender_public_key(crypto::public_key(SECRET))
            .build(&chain, &EngineConfig::default())
            .unwrap();
        assert_eq!(plain.minimum_fee_nqt(0), ONE_QBR);

        let referencing = TransactionBuilder::new(Attachment::OrdinaryPayment)
            .timestamp(100)
            .recipient_id(1)
            .amount_nqt(ONE_QBR)
            .fee_nqt(2 * ONE_QBR)
            .referenced_transaction_full_hash([5u8; 32])
            .sender_public_key(crypto::public_key(SECRET))
            .build(&chain, &EngineConfig::default())
            .unwrap();
        assert_eq!(referencing.minimum_fee_nqt(0), 2 * ONE_QBR);
    }
}
