//! Fee Schedules
//!
//! Every attachment and appendage declares a [`FeePolicy`]; the minimum fee
//! of a transaction is the sum of the policies of all its parts at the
//! current height, plus the flat surcharge for a referenced-transaction
//! full hash. Schedules can switch at a height: a part exposes a baseline
//! policy and an optional next policy with its activation height.

use crate::constants::ONE_QBR;

/// How a transaction part prices itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Flat fee regardless of size.
    Constant(i64),
    /// Flat component plus a per-chunk component. The first `chunk_size`
    /// bytes are covered by the constant; each further started chunk adds
    /// `fee_per_chunk`.
    SizeBased {
        constant: i64,
        fee_per_chunk: i64,
        chunk_size: usize,
    },
}

impl FeePolicy {
    /// Default policy for attachments without a bespoke schedule.
    pub const DEFAULT: FeePolicy = FeePolicy::Constant(ONE_QBR);

    /// Fee in NQT for a part of `size` bytes.
    pub fn fee_for_size(&self, size: usize) -> i64 {
        match *self {
            FeePolicy::Constant(fee) => fee,
            FeePolicy::SizeBased {
                constant,
                fee_per_chunk,
                chunk_size,
            } => {
                let extra_chunks = (size.saturating_sub(1) / chunk_size.max(1)) as i64;
                constant.saturating_add(fee_per_chunk.saturating_mul(extra_chunks))
            }
        }
    }
}

/// A baseline policy with an optional successor activating at a height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub baseline: FeePolicy,
    pub next: Option<(i32, FeePolicy)>,
}

impl FeeSchedule {
    pub const fn flat(policy: FeePolicy) -> Self {
        Self {
            baseline: policy,
            next: None,
        }
    }

    /// Policy in force at `height`.
    pub fn at_height(&self, height: i32) -> FeePolicy {
        match self.next {
            Some((activation, next)) if height >= activation => next,
            _ => self.baseline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_fee_ignores_size() {
        let policy = FeePolicy::Constant(ONE_QBR);
        assert_eq!(policy.fee_for_size(0), ONE_QBR);
        assert_eq!(policy.fee_for_size(10_000), ONE_QBR);
    }

    #[test]
    fn test_size_based_fee_chunks() {
        let policy = FeePolicy::SizeBased {
            constant: 0,
            fee_per_chunk: ONE_QBR,
            chunk_size: 32,
        };
        // First chunk is covered by the constant component.
        assert_eq!(policy.fee_for_size(1), 0);
        assert_eq!(policy.fee_for_size(32), 0);
        assert_eq!(policy.fee_for_size(33), ONE_QBR);
        assert_eq!(policy.fee_for_size(96), 2 * ONE_QBR);
        assert_eq!(policy.fee_for_size(97), 3 * ONE_QBR);
    }

    #[test]
    fn test_schedule_switches_at_height() {
        let schedule = FeeSchedule {
            baseline: FeePolicy::Constant(ONE_QBR),
            next: Some((1000, FeePolicy::Constant(2 * ONE_QBR))),
        };
        assert_eq!(schedule.at_height(999), FeePolicy::Constant(ONE_QBR));
        assert_eq!(schedule.at_height(1000), FeePolicy::Constant(2 * ONE_QBR));
    }

    #[test]
    fn test_fee_is_never_negative_for_any_size() {
        let policy = FeePolicy::SizeBased {
            constant: 0,
            fee_per_chunk: ONE_QBR,
            chunk_size: 32,
        };
        for size in [0usize, 1, 31, 32, 33, 1000, usize::MAX] {
            assert!(policy.fee_for_size(size) >= 0);
        }
    }
}
