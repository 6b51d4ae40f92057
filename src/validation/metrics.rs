//! Engine Metrics
//!
//! Prometheus counters for the validation pipeline. The engine never logs
//! at error level on its own input; these counters are the operational
//! signal instead.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub struct EngineMetrics {
    transactions_validated: IntCounter,
    validation_failures: IntCounterVec,
    cache_hits: IntCounter,
}

impl EngineMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let transactions_validated = IntCounter::new(
            "qbr_transactions_validated_total",
            "Transactions that passed full validation",
        )?;
        registry.register(Box::new(transactions_validated.clone()))?;

        let validation_failures = IntCounterVec::new(
            Opts::new(
                "qbr_transaction_validation_failures_total",
                "Transactions rejected by validation, by error code",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(validation_failures.clone()))?;

        let cache_hits = IntCounter::new(
            "qbr_transaction_validation_cache_hits_total",
            "Validations answered from the cache",
        )?;
        registry.register(Box::new(cache_hits.clone()))?;

        Ok(Self {
            transactions_validated,
            validation_failures,
            cache_hits,
        })
    }

    pub fn increment_valid_transactions(&self) {
        self.transactions_validated.inc();
    }

    pub fn increment_validation_failures(&self, reason: &str) {
        self.validation_failures.with_label_values(&[reason]).inc();
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_register_and_count() {
        let registry = Registry::new();
        let metrics = EngineMetrics::new(&registry).unwrap();

        metrics.increment_valid_transactions();
        metrics.increment_validation_failures("TX_NOT_VALID");
        metrics.increment_validation_failures("TX_NOT_VALID");
        metrics.increment_cache_hits();

        let families = registry.gather();
        assert!(!families.is_empty());
        let failures = families
            .iter()
            .find(|f| f.name() == "qbr_transaction_validation_failures_total")
            .unwrap();
        assert_eq!(failures.get_metric()[0].get_counter().value(), 2.0);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        EngineMetrics::new(&registry).unwrap();
        assert!(EngineMetrics::new(&registry).is_err());
    }
}
