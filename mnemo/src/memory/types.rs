//! Types for memory records, queries and scored results.
//!
//! Design goals:
//! - Small, serializable structures whose JSON shape is the on-disk record shape.
//! - Strict deserialization: every record field is required, unknown keys are ignored.
//! - Minimal helpers to keep this file focused on data types.
//!
//! Unit tests are colocated at the bottom of this file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, monotonically increasing record identifier. `0` is never assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub u64);

impl MemoryId {
    pub const INVALID: MemoryId = MemoryId(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// The id immediately after this one, used to advance next-id watermarks.
    pub fn successor(self) -> u64 {
        self.0.saturating_add(1)
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MemoryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Strength assigned to a freshly staged record.
pub const INITIAL_STRENGTH: f32 = 1.0;

/// A durable text unit with timestamps and a decayable strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Immutable once assigned.
    pub id: MemoryId,
    /// UTF-8 payload; never empty for records created through the live API.
    pub text: String,
    /// Creation time in nanoseconds since the Unix epoch. Immutable.
    pub created_ns: u64,
    /// Last mutation time in nanoseconds since the Unix epoch.
    pub updated_ns: u64,
    /// Confidence/relevance weight, never negative.
    pub strength: f32,
}

impl MemoryRecord {
    /// Build a new record stamped at `now_ns` with the initial strength.
    pub fn new(id: MemoryId, text: impl Into<String>, now_ns: u64) -> Self {
        Self {
            id,
            text: text.into(),
            created_ns: now_ns,
            updated_ns: now_ns,
            strength: INITIAL_STRENGTH,
        }
    }

    /// Check the invariants a persisted record must satisfy before it is accepted.
    pub fn validate(&self) -> Result<(), String> {
        if !self.id.is_valid() {
            return Err("record id is 0".to_string());
        }
        if !self.strength.is_finite() || self.strength < 0.0 {
            return Err(format!("record {} has invalid strength {}", self.id, self.strength));
        }
        Ok(())
    }
}

/// Retrieval request. Empty `text` matches everything; `limit == 0` returns nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub text: String,
    pub limit: usize,
}

impl MemoryQuery {
    pub fn new(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            limit,
        }
    }

    /// Match every indexed record, up to `limit`.
    pub fn all(limit: usize) -> Self {
        Self::new(String::new(), limit)
    }
}

/// A scored, read-only projection of a committed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryResult {
    pub record: MemoryRecord,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_id_validity_and_successor() {
        assert!(!MemoryId::INVALID.is_valid());
        assert!(MemoryId::new(7).is_valid());
        assert_eq!(MemoryId::new(7).successor(), 8);
        assert_eq!(MemoryId::new(u64::MAX).successor(), u64::MAX);
    }

    #[test]
    fn test_record_serializes_with_flat_id() {
        let record = MemoryRecord::new(MemoryId(3), "hello", 42);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["text"], "hello");
        assert_eq!(json["created_ns"], 42);
        assert_eq!(json["updated_ns"], 42);
        assert_eq!(json["strength"], 1.0);
    }

    #[test]
    fn test_record_missing_field_is_rejected() {
        let missing_strength = r#"{"id":1,"text":"a","created_ns":1,"updated_ns":1}"#;
        assert!(serde_json::from_str::<MemoryRecord>(missing_strength).is_err());
    }

    #[test]
    fn test_record_unknown_keys_are_ignored() {
        let extra = r#"{"id":1,"text":"a","created_ns":1,"updated_ns":2,"strength":0.5,"tags":["x"]}"#;
        let record: MemoryRecord = serde_json::from_str(extra).unwrap();
        assert_eq!(record.id, MemoryId(1));
        assert_eq!(record.updated_ns, 2);
        assert_eq!(record.strength, 0.5);
    }

    #[test]
    fn test_validate_rejects_zero_id_and_negative_strength() {
        let mut record = MemoryRecord::new(MemoryId(0), "a", 1);
        assert!(record.validate().is_err());
        record.id = MemoryId(1);
        assert!(record.validate().is_ok());
        record.strength = -0.1;
        assert!(record.validate().is_err());
    }
}
