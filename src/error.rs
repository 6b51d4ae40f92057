//! Transaction Engine Errors
//!
//! Three families, with distinct caller contracts:
//!
//! - [`TransactionError::NotValid`]: permanent. The transaction can never
//!   become valid; peers relaying it should be blacklisted.
//! - [`TransactionError::NotCurrentlyValid`]: recoverable. The transaction
//!   may become valid as chain state advances (fee schedule change, fork
//!   resolution) or after resubmission with adjusted fields.
//! - [`TransactionError::IllegalState`]: programmer error, e.g. reading a
//!   derived identity field before the transaction is signed.

use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Errors raised by the transaction codec, builder and validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The transaction is permanently invalid and must be dropped.
    #[error("Invalid transaction: {0}")]
    NotValid(String),

    /// The transaction is invalid against current chain state but may
    /// become valid later.
    #[error("Transaction not currently valid: {0}")]
    NotCurrentlyValid(String),

    /// A derived field was read before it was defined. Indicates a bug in
    /// the caller, never an input problem.
    #[error("Illegal transaction state: {0}")]
    IllegalState(String),
}

impl TransactionError {
    /// Permanent errors warrant dropping the transaction and blacklisting
    /// the relaying peer; recoverable ones allow a later retry.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, TransactionError::NotCurrentlyValid(_))
    }

    /// Stable machine-readable code for API error translation.
    pub fn code(&self) -> &'static str {
        match self {
            TransactionError::NotValid(_) => "TX_NOT_VALID",
            TransactionError::NotCurrentlyValid(_) => "TX_NOT_CURRENTLY_VALID",
            TransactionError::IllegalState(_) => "TX_ILLEGAL_STATE",
        }
    }
}

pub(crate) fn not_valid(msg: impl Into<String>) -> TransactionError {
    TransactionError::NotValid(msg.into())
}

pub(crate) fn not_currently_valid(msg: impl Into<String>) -> TransactionError {
    TransactionError::NotCurrentlyValid(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanence() {
        assert!(not_valid("bad bytes").is_permanent());
        assert!(!not_currently_valid("fee too low").is_permanent());
        assert!(TransactionError::IllegalState("unsigned".into()).is_permanent());
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(not_valid("x").code(), "TX_NOT_VALID");
        assert_eq!(not_currently_valid("x").code(), "TX_NOT_CURRENTLY_VALID");
    }
}
