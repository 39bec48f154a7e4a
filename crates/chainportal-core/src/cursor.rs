//! Block cursor: identifies one block by number and hash.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A position in the chain.
///
/// Two cursors are equal only when both number and hash agree. The same
/// number with a different hash means the chain forked at that height.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Unix timestamp of the block, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Cursor {
    pub fn new(number: u64, hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns the next block to request (cursor + 1).
    pub fn next_block(&self) -> u64 {
        self.number + 1
    }

    /// Block time as UTC, when the timestamp is known and in range.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && self.hash == other.hash
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}
