//! Engine Configuration
//!
//! Runtime knobs for the transaction engine. Unlike [`crate::constants`],
//! nothing here is consensus-critical on its own; operators configure these
//! per deployment and the activation flags are coordinated network-wide
//! through release schedules.

use serde::{Deserialize, Serialize};

/// Configuration for transaction building and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// When enabled, the builder rewrites a below-minimum fee on locally
    /// originated (unsigned) transactions up to the current fee floor.
    /// Never applied to transactions that arrive already signed.
    pub correct_invalid_fees: bool,

    /// Maximum number of entries retained by the validation cache.
    pub validation_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            correct_invalid_fees: false,
            validation_cache_size: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.correct_invalid_fees);
        assert!(config.validation_cache_size > 0);
    }
}
