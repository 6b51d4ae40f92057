//! Account Ledger Facade
//!
//! Balance state lives outside the engine; lifecycle hooks mutate it
//! through [`AccountLedger`]. Balances are tracked twice per account: the
//! confirmed balance (moved at block application) and the unconfirmed
//! balance (reserved when a transaction enters the pool, released on drop
//! or reorg). Every mutation is attributed to a ledger event and the
//! transaction that caused it so implementations can keep an audit trail.
//!
//! The engine performs check-then-mutate sequences (e.g. the double-spend
//! test in `apply_unconfirmed`) from the single block-producer thread;
//! implementations only need per-call atomicity.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

/// Why a balance changed. Carried to the ledger for attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    OrdinaryPayment,
    ArbitraryMessage,
    AliasAssignment,
    TransactionFee,
    UnconfirmedPoolDeposit,
}

/// Point-in-time snapshot of an account, as exposed to embedders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
    pub balance_nqt: i64,
    pub unconfirmed_balance_nqt: i64,
}

/// Account state facade consumed by validation and the lifecycle hooks.
pub trait AccountLedger: Send + Sync {
    /// Public key bound to the account, if one has been seen.
    fn get_public_key(&self, id: u64) -> Option<PublicKey>;

    /// Binds `key` to the account on first sight; afterwards verifies
    /// equality. Returns false when a different key is already bound.
    fn set_or_verify_public_key(&self, id: u64, key: &PublicKey) -> bool;

    fn account_exists(&self, id: u64) -> bool;

    /// Creates the account with zero balances if missing.
    fn add_or_get_account(&self, id: u64);

    fn balance_nqt(&self, id: u64) -> i64;

    fn unconfirmed_balance_nqt(&self, id: u64) -> i64;

    /// Adds `amount_nqt` (may be negative) to the confirmed balance.
    fn add_to_balance(&self, id: u64, event: LedgerEvent, transaction_id: u64, amount_nqt: i64);

    /// Adds `amount_nqt` (may be negative) to the unconfirmed balance.
    fn add_to_unconfirmed_balance(
        &self,
        id: u64,
        event: LedgerEvent,
        transaction_id: u64,
        amount_nqt: i64,
    );

    /// Adds `amount_nqt` to both balances at once (a confirmed credit that
    /// is immediately spendable).
    fn add_to_balance_and_unconfirmed(
        &self,
        id: u64,
        event: LedgerEvent,
        transaction_id: u64,
        amount_nqt: i64,
    );
}

#[derive(Debug, Default, Clone)]
struct AccountState {
    public_key: Option<PublicKey>,
    balance_nqt: i64,
    unconfirmed_balance_nqt: i64,
}

/// In-memory [`AccountLedger`] for tests and embedders without a database.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    accounts: RwLock<HashMap<u64, AccountState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account with equal confirmed and unconfirmed balances.
    pub fn seed_account(&self, id: u64, balance_nqt: i64) {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        let state = accounts.entry(id).or_default();
        state.balance_nqt = balance_nqt;
        state.unconfirmed_balance_nqt = balance_nqt;
    }

    /// Snapshot of an account, if it exists.
    pub fn account(&self, id: u64) -> Option<Account> {
        self.accounts
            .read()
            .expect("ledger lock poisoned")
            .get(&id)
            .map(|state| Account {
                id,
                public_key: state.public_key,
                balance_nqt: state.balance_nqt,
                unconfirmed_balance_nqt: state.unconfirmed_balance_nqt,
            })
    }
}

impl AccountLedger for MemoryLedger {
    fn get_public_key(&self, id: u64) -> Option<PublicKey> {
        self.accounts
            .read()
            .expect("ledger lock poisoned")
            .get(&id)
            .and_then(|state| state.public_key)
    }

    fn set_or_verify_public_key(&self, id: u64, key: &PublicKey) -> bool {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        let state = accounts.entry(id).or_default();
        match &state.public_key {
            None => {
                state.public_key = Some(*key);
                true
            }
            Some(existing) => existing == key,
        }
    }

    fn account_exists(&self, id: u64) -> bool {
        self.accounts
            .read()
            .expect("ledger lock poisoned")
            .contains_key(&id)
    }

    fn add_or_get_account(&self, id: u64) {
        self.accounts
            .write()
            .expect("ledger lock poisoned")
            .entry(id)
            .or_default();
    }

    fn balance_nqt(&self, id: u64) -> i64 {
        self.accounts
            .read()
            .expect("ledger lock poisoned")
            .get(&id)
            .map(|state| state.balance_nqt)
            .unwrap_or(0)
    }

    fn unconfirmed_balance_nqt(&self, id: u64) -> i64 {
        self.accounts
            .read()
            .expect("ledger lock poisoned")
            .get(&id)
            .map(|state| state.unconfirmed_balance_nqt)
            .unwrap_or(0)
    }

    fn add_to_balance(&self, id: u64, _event: LedgerEvent, _transaction_id: u64, amount_nqt: i64) {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        let state = accounts.entry(id).or_default();
        state.balance_nqt = state.balance_nqt.saturating_add(amount_nqt);
    }

    fn add_to_unconfirmed_balance(
        &self,
        id: u64,
        _event: LedgerEvent,
        _transaction_id: u64,
        amount_nqt: i64,
    ) {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        let state = accounts.entry(id).or_default();
        state.unconfirmed_balance_nqt = state.unconfirmed_balance_nqt.saturating_add(amount_nqt);
    }

    fn add_to_balance_and_unconfirmed(
        &self,
        id: u64,
        _event: LedgerEvent,
        _transaction_id: u64,
        amount_nqt: i64,
    ) {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        let state = accounts.entry(id).or_default();
        state.balance_nqt = state.balance_nqt.saturating_add(amount_nqt);
        state.unconfirmed_balance_nqt = state.unconfirmed_balance_nqt.saturating_add(amount_nqt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_and_read_balances() {
        let ledger = MemoryLedger::new();
        ledger.seed_account(7, 1_000);
        assert_eq!(ledger.balance_nqt(7), 1_000);
        assert_eq!(ledger.unconfirmed_balance_nqt(7), 1_000);
        assert_eq!(ledger.balance_nqt(8), 0);
    }

    #[test]
    fn test_set_or_verify_public_key() {
        let ledger = MemoryLedger::new();
        let key_a = [1u8; 32];
        let key_b = [2u8; 32];

        assert!(ledger.set_or_verify_public_key(7, &key_a));
        assert!(ledger.set_or_verify_public_key(7, &key_a));
        assert!(!ledger.set_or_verify_public_key(7, &key_b));
        assert_eq!(ledger.get_public_key(7), Some(key_a));
    }

    #[test]
    fn test_balance_mutation() {
        let ledger = MemoryLedger::new();
        ledger.seed_account(7, 500);

        ledger.add_to_balance(7, LedgerEvent::OrdinaryPayment, 1, -200);
        ledger.add_to_unconfirmed_balance(7, LedgerEvent::OrdinaryPayment, 1, -300);
        assert_eq!(ledger.balance_nqt(7), 300);
        assert_eq!(ledger.unconfirmed_balance_nqt(7), 200);

        ledger.add_to_balance_and_unconfirmed(7, LedgerEvent::OrdinaryPayment, 2, 100);
        assert_eq!(ledger.balance_nqt(7), 400);
        assert_eq!(ledger.unconfirmed_balance_nqt(7), 300);
    }

    #[test]
    fn test_add_or_get_account_is_idempotent() {
        let ledger = MemoryLedger::new();
        assert!(!ledger.account_exists(9));
        ledger.add_or_get_account(9);
        assert!(ledger.account_exists(9));

        ledger.seed_account(9, 42);
        ledger.add_or_get_account(9);
        assert_eq!(ledger.balance_nqt(9), 42);
    }
}
