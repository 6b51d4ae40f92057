//! Transaction Validation
//!
//! [`TransactionValidator`] runs the layered admission checks: structural
//! invariants, attachment and appendage rules, the payload-size bound, and
//! the state-dependent checks (fee floor, economic-cluster binding, account
//! policy). It automatically switches to at-finish mode for a signed phased
//! transaction whose poll already exists, meaning the deferred attachment
//! effects are about to execute, and then skips the checks that only make
//! sense at acceptance.
//!
//! [`DuplicateGuard`] is the per-block budgeted dedup map used by block
//! producers and the unconfirmed pool.

pub mod cache;
pub mod metrics;

pub use cache::ValidationCache;
pub use metrics::EngineMetrics;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::account::AccountLedger;
use crate::chain::{AccountPolicy, ChainView, PhasingPolls};
use crate::config::EngineConfig;
use crate::constants::MAX_PAYLOAD_LENGTH;
use crate::error::{not_currently_valid, not_valid, Result};
use crate::transaction::kind::TransactionKind;
use crate::transaction::Transaction;

/// Budgeted duplicate tracking, keyed by transaction kind plus a
/// kind-chosen string. Each key carries a budget; once it is exhausted,
/// further transactions with the same key are duplicates. A later, smaller
/// budget lowers the ceiling.
#[derive(Debug, Default)]
pub struct DuplicateGuard {
    remaining: HashMap<(u8, u8, String), usize>,
}

impl DuplicateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one slot of `key`'s budget. Returns true when the budget
    /// is already exhausted (the transaction is a duplicate).
    pub fn check(&mut self, kind: &dyn TransactionKind, key: String, max_count: usize) -> bool {
        let remaining = self
            .remaining
            .entry((kind.type_code(), kind.subtype_code(), key))
            .or_insert(max_count);
        *remaining = (*remaining).min(max_count);
        if *remaining == 0 {
            return true;
        }
        *remaining -= 1;
        false
    }
}

/// The validation pipeline, wired to the chain facades at construction.
pub struct TransactionValidator {
    chain: Arc<dyn ChainView>,
    ledger: Arc<dyn AccountLedger>,
    policy: Arc<dyn AccountPolicy>,
    polls: Arc<dyn PhasingPolls>,
    metrics: Arc<EngineMetrics>,
    cache: ValidationCache,
}

impl TransactionValidator {
    pub fn new(
        chain: Arc<dyn ChainView>,
        ledger: Arc<dyn AccountLedger>,
        policy: Arc<dyn AccountPolicy>,
        polls: Arc<dyn PhasingPolls>,
        config: &EngineConfig,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            chain,
            ledger,
            policy,
            polls,
            metrics,
            cache: ValidationCache::new(config.validation_cache_size),
        }
    }

    /// Runs the full check sequence. The first failure is returned; its
    /// kind tells the caller whether to drop the transaction for good or
    /// retry later.
    pub fn validate(&self, transaction: &Transaction) -> Result<()> {
        match self.validate_inner(transaction) {
            Ok(()) => {
                self.metrics.increment_valid_transactions();
                Ok(())
            }
            Err(error) => {
                self.metrics.increment_validation_failures(error.code());
                debug!(%error, "transaction rejected");
                Err(error)
            }
        }
    }

    /// Signature verification with sender-key binding; separate from
    /// [`TransactionValidator::validate`] so peers' bytes can be checked
    /// before any state-dependent work.
    pub fn verify_signature(&self, transaction: &Transaction) -> bool {
        transaction.verify_signature(self.ledger.as_ref())
    }

    fn validate_inner(&self, transaction: &Transaction) -> Result<()> {
        let height = self.chain.height();

        if let Ok(full_hash) = transaction.full_hash() {
            if self.cache.is_validated(&full_hash, height) {
                self.metrics.increment_cache_hits();
                return Ok(());
            }
        }

        let at_finish = transaction.is_phased()
            && transaction.signature().is_some()
            && transaction
                .id()
                .map(|id| self.polls.poll_exists(id))
                .unwrap_or(false);

        transaction.validate_structure()?;
        transaction.kind().validate_attachment(transaction)?;

        for appendage in transaction.appendages() {
            appendage.verify_version(transaction.version())?;
            if at_finish {
                appendage.validate_at_finish(transaction, self.chain.as_ref())?;
            } else {
                appendage.validate(transaction, self.chain.as_ref())?;
            }
        }

        if transaction.full_size() > MAX_PAYLOAD_LENGTH {
            return Err(not_valid(format!(
                "transaction size {} exceeds the maximum payload length",
                transaction.full_size()
            )));
        }

        if !at_finish {
            if transaction.timestamp() != 0 {
                let minimum = transaction.minimum_fee_nqt(height);
                if transaction.fee_nqt() < minimum {
                    return Err(not_currently_valid(format!(
                        "fee {} below the minimum {minimum} at height {height}",
                        transaction.fee_nqt()
                    )));
                }
            }
            self.check_ec_block(transaction, height)?;
            self.policy.check_transaction(transaction)?;

            if let Ok(full_hash) = transaction.full_hash() {
                self.cache.note_validated(full_hash, height);
            }
        }
        Ok(())
    }

    /// Economic-cluster binding: the chain must actually contain the block
    /// the sender committed to. A `(0, 0)` binding means the transaction
    /// predates the rule and is accepted.
    fn check_ec_block(&self, transaction: &Transaction, height: i32) -> Result<()> {
        if transaction.ec_block_id() == 0 {
            if transaction.ec_block_height() != 0 {
                return Err(not_valid(
                    "economic cluster block height without a block id",
                ));
            }
            return Ok(());
        }
        if transaction.ec_block_height() < 0 {
            return Err(not_valid(format!(
                "invalid economic cluster block height {}",
                transaction.ec_block_height()
            )));
        }
        if transaction.ec_block_height() > height {
            return Err(not_currently_valid(format!(
                "economic cluster block height {} is ahead of the chain at {height}",
                transaction.ec_block_height()
            )));
        }
        match self.chain.block_id_at_height(transaction.ec_block_height()) {
            Some(id) if id == transaction.ec_block_id() => Ok(()),
            _ => Err(not_currently_valid(
                "transaction was generated on a fork",
            )),
        }
    }
}
