//! # QBR Chain Core
//!
//! The transaction engine of the QBR proof-of-stake node: the canonical
//! on-wire transaction format, the deterministic binary codec, the
//! Curve25519-based identity derivation, and the layered validation
//! pipeline that gates admission into the unconfirmed pool and execution
//! against account state.
//!
//! ## Key Components
//!
//! - **Transaction**: immutable once built; identity (`id`, `full_hash`)
//!   derived from the signed bytes and memoized
//! - **Builder**: field accumulation, defaults, fee-floor resolution,
//!   signing with strict mutability discipline
//! - **Codec**: the consensus-critical binary layout and its JSON mirror
//! - **Appendages**: flag-driven optional sections (messages, encrypted
//!   messages, key announcements, phasing, prunables)
//! - **Validation**: structural, economic and consensus-binding checks,
//!   with metrics and a height-scoped cache
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qbr_chain_core::{Attachment, EngineConfig, MemoryChain, TransactionBuilder};
//!
//! let chain = MemoryChain::new();
//! let tx = TransactionBuilder::new(Attachment::OrdinaryPayment)
//!     .recipient_id(0x1122334455667788)
//!     .amount_nqt(500_000_000)
//!     .fee_nqt(100_000_000)
//!     .sign_and_build("secret phrase", &chain, &EngineConfig::default())?;
//!
//! let wire = tx.bytes();           // gossip to peers
//! let id = tx.string_id()?;        // unsigned decimal id
//! ```
//!
//! ## Consensus Warning
//!
//! Every byte of the binary layout in [`transaction::codec`] is
//! consensus-critical: an ordering, padding or endianness change forks the
//! network. The identity derivation consumes the serialized form directly.

pub mod account;
pub mod chain;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod transaction;
pub mod validation;

// Re-export commonly used types
pub use account::{Account, AccountLedger, LedgerEvent, MemoryLedger};
pub use chain::{
    AccountPolicy, ChainView, EcBlock, MemoryChain, MemoryPrunableStore, NoPolls, OpenPolicy,
    PhasingPolls, PrunableStore,
};
pub use config::EngineConfig;
pub use crypto::EncryptedData;
pub use error::{Result, TransactionError};
pub use transaction::appendix::{
    Appendage, EncryptToSelfMessageAppendix, EncryptedMessageAppendix, MessageAppendix,
    PhasingAppendix, PrunableEncryptedMessageAppendix, PrunablePlainMessageAppendix,
    PublicKeyAnnouncementAppendix,
};
pub use transaction::codec::{decode, from_json};
pub use transaction::fee::{FeePolicy, FeeSchedule};
pub use transaction::kind::{kind_for, Attachment, TransactionKind};
pub use transaction::{Transaction, TransactionBuilder};
pub use validation::{DuplicateGuard, EngineMetrics, TransactionValidator, ValidationCache};
