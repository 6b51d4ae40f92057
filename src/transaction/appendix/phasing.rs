//! Phasing Appendage
//!
//! Marks the transaction as conditionally executed: the fee is charged when
//! the transaction is included in a block, but the attachment's effects are
//! deferred until the phasing poll resolves at `finish_height`. Flag bit
//! 0x10.

use serde_json::{Map, Value};

use crate::constants::{MAX_PHASING_DURATION, MAX_PHASING_WHITELIST_SIZE};
use crate::error::{not_currently_valid, not_valid, Result};
use crate::transaction::codec::ByteReader;
use crate::transaction::fee::{FeePolicy, FeeSchedule};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasingAppendix {
    version: u8,
    finish_height: i32,
    quorum: i64,
    whitelist: Vec<u64>,
}

impl PhasingAppendix {
    pub fn new(finish_height: i32, quorum: i64, whitelist: Vec<u64>) -> Self {
        Self {
            version: 1,
            finish_height,
            quorum,
            whitelist,
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let version = reader.u8()?;
        let finish_height = reader.i32_le()?;
        let quorum = reader.i64_le()?;
        let count = reader.u8()? as usize;
        if count > MAX_PHASING_WHITELIST_SIZE {
            return Err(not_valid(format!("phasing whitelist of {count} accounts")));
        }
        let mut whitelist = Vec::with_capacity(count);
        for _ in 0..count {
            whitelist.push(reader.u64_le()?);
        }
        Ok(Self {
            version,
            finish_height,
            quorum,
            whitelist,
        })
    }

    pub(crate) fn from_json(object: &Map<String, Value>) -> Result<Option<Self>> {
        if !object.contains_key("version.Phasing") {
            return Ok(None);
        }
        let finish_height = object
            .get("phasingFinishHeight")
            .and_then(Value::as_i64)
            .ok_or_else(|| not_valid("missing phasingFinishHeight"))?;
        let quorum = object
            .get("phasingQuorum")
            .and_then(Value::as_i64)
            .ok_or_else(|| not_valid("missing phasingQuorum"))?;
        let whitelist = match object.get("phasingWhitelist") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| {
                    entry
                        .as_str()
                        .and_then(|id| id.parse::<u64>().ok())
                        .ok_or_else(|| not_valid("phasingWhitelist entries must be decimal ids"))
                })
                .collect::<Result<Vec<u64>>>()?,
            Some(_) => return Err(not_valid("phasingWhitelist must be an array")),
            None => Vec::new(),
        };
        Ok(Some(Self::new(finish_height as i32, quorum, whitelist)))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn finish_height(&self) -> i32 {
        self.finish_height
    }

    pub fn quorum(&self) -> i64 {
        self.quorum
    }

    pub fn whitelist(&self) -> &[u64] {
        &self.whitelist
    }

    pub fn size(&self) -> usize {
        1 + 4 + 8 + 1 + 8 * self.whitelist.len()
    }

    pub fn put_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.extend_from_slice(&self.finish_height.to_le_bytes());
        out.extend_from_slice(&self.quorum.to_le_bytes());
        out.push(self.whitelist.len() as u8);
        for account in &self.whitelist {
            out.extend_from_slice(&account.to_le_bytes());
        }
    }

    pub fn put_json(&self, object: &mut Map<String, Value>) {
        object.insert("phasingFinishHeight".into(), Value::from(self.finish_height));
        object.insert("phasingQuorum".into(), Value::from(self.quorum));
        if !self.whitelist.is_empty() {
            let entries: Vec<Value> = self
                .whitelist
                .iter()
                .map(|id| Value::from(id.to_string()))
                .collect();
            object.insert("phasingWhitelist".into(), Value::Array(entries));
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::flat(FeePolicy::Constant(crate::constants::ONE_QBR))
    }

    fn validate_params(&self) -> Result<()> {
        if self.quorum < 1 {
            return Err(not_valid(format!("invalid phasing quorum {}", self.quorum)));
        }
        if self.whitelist.len() > MAX_PHASING_WHITELIST_SIZE {
            return Err(not_valid(format!(
                "phasing whitelist of {} accounts",
                self.whitelist.len()
            )));
        }
        let mut seen = self.whitelist.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.whitelist.len() {
            return Err(not_valid("duplicate account in phasing whitelist"));
        }
        if !self.whitelist.is_empty() && self.quorum > self.whitelist.len() as i64 {
            return Err(not_valid("phasing quorum exceeds whitelist size"));
        }
        Ok(())
    }

    pub fn validate(&self, current_height: i32) -> Result<()> {
        self.validate_params()?;
        if self.finish_height <= current_height {
            return Err(not_currently_valid(format!(
                "phasing finish height {} is not above current height {current_height}",
                self.finish_height
            )));
        }
        if self.finish_height > current_height + MAX_PHASING_DURATION {
            return Err(not_valid(format!(
                "phasing finish height {} too far in the future",
                self.finish_height
            )));
        }
        Ok(())
    }

    /// At finish time the height window no longer holds; only the
    /// structural parameters are re-checked.
    pub fn validate_at_finish(&self, _current_height: i32) -> Result<()> {
        self.validate_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        let appendix = PhasingAppendix::new(5_000, 2, vec![111, 222, 333]);
        let mut out = Vec::new();
        appendix.put_bytes(&mut out);
        assert_eq!(out.len(), appendix.size());
        assert_eq!(appendix.size(), 1 + 4 + 8 + 1 + 24);

        let parsed = PhasingAppendix::parse(&mut ByteReader::new(&out)).unwrap();
        assert_eq!(parsed, appendix);
    }

    #[test]
    fn test_finish_height_window() {
        let appendix = PhasingAppendix::new(1_000, 1, vec![]);
        assert!(appendix.validate(500).is_ok());

        // Already past.
        assert!(matches!(
            appendix.validate(1_000),
            Err(crate::error::TransactionError::NotCurrentlyValid(_))
        ));

        // Too far out.
        let distant = PhasingAppendix::new(MAX_PHASING_DURATION + 100, 1, vec![]);
        assert!(matches!(
            distant.validate(0),
            Err(crate::error::TransactionError::NotValid(_))
        ));
    }

    #[test]
    fn test_at_finish_skips_window_check() {
        let appendix = PhasingAppendix::new(1_000, 1, vec![]);
        assert!(appendix.validate_at_finish(2_000).is_ok());
    }

    #[test]
    fn test_rejects_bad_quorum_and_whitelist() {
        assert!(PhasingAppendix::new(100, 0, vec![]).validate(10).is_err());
        assert!(PhasingAppendix::new(100, 3, vec![1, 2]).validate(10).is_err());
        assert!(PhasingAppendix::new(100, 1, vec![5, 5]).validate(10).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let appendix = PhasingAppendix::new(5_000, 2, vec![111, 222]);
        let mut object = Map::new();
        object.insert("version.Phasing".into(), Value::from(1));
        appendix.put_json(&mut object);

        let parsed = PhasingAppendix::from_json(&object).unwrap().unwrap();
        assert_eq!(parsed, appendix);
    }
}
