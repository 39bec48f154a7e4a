//! Shared types for the ingestion pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cursor::Cursor;

// ─── Block ────────────────────────────────────────────────────────────────────

/// Header fields every portal block record carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    #[serde(default)]
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Protocol-specific header fields selected by the query.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One newline-delimited block record from a portal stream.
///
/// Everything besides the header (logs, transactions, …) is protocol-defined
/// and kept as raw JSON for decoders to interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Block {
    /// The cursor identifying this block.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            number: self.header.number,
            hash: self.header.hash.clone(),
            timestamp: self.header.timestamp,
        }
    }

    /// Raw items of one kind (`"logs"`, `"transactions"`, …), empty if absent.
    pub fn items(&self, kind: &str) -> &[Value] {
        self.data
            .get(kind)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ─── Head ─────────────────────────────────────────────────────────────────────

/// What the portal last told us about the chain tip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadInfo {
    /// Irreversible boundary (`X-Sqd-Finalized-Head-*`).
    pub finalized: Option<Cursor>,
    /// Current tip number (`X-Sqd-Head-Number`).
    pub latest: Option<u64>,
}

// ─── Progress ─────────────────────────────────────────────────────────────────

/// Point-in-time view of a source's throughput.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Last delivered block.
    pub current: Option<u64>,
    /// Block the stream is heading for: `to_block`, else the portal head.
    pub target: Option<u64>,
    pub blocks_processed: u64,
    pub bytes_downloaded: u64,
    pub requests: u64,
    /// Average blocks per second since the source started.
    pub blocks_per_sec: f64,
    /// `0.0..=100.0`, when a target is known.
    pub percent: Option<f64>,
    /// Estimated seconds left at the current speed.
    pub eta_secs: Option<u64>,
}

// ─── Batch ────────────────────────────────────────────────────────────────────

/// Per-request bookkeeping attached to a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMeta {
    /// `fromBlock` of the request that produced the batch.
    pub from_block: u64,
    /// `toBlock` of that request; `None` = open-ended.
    pub to_block: Option<u64>,
    /// Response body size.
    pub bytes: usize,
    /// Retries spent before the successful response.
    pub retries: u32,
}

/// The unit yielded for each successful portal response.
///
/// A batch is built only after its whole response parsed, so it is never partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub blocks: Vec<Block>,
    pub finalized_head: Option<Cursor>,
    pub meta: BatchMeta,
}

impl Batch {
    /// Cursor of the last block, if any.
    pub fn last_cursor(&self) -> Option<Cursor> {
        self.blocks.last().map(Block::cursor)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn block(json: &str) -> Block {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_portal_block_record() {
        let b = block(
            r#"{"header":{"number":101,"hash":"0xb","parentHash":"0xa","timestamp":1200,"miner":"0x1"},
                "logs":[{"logIndex":0},{"logIndex":1}]}"#,
        );
        assert_eq!(b.header.number, 101);
        assert_eq!(b.header.parent_hash, "0xa");
        assert_eq!(b.header.extra["miner"], "0x1");
        assert_eq!(b.items("logs").len(), 2);
        assert!(b.items("transactions").is_empty());
        assert_eq!(b.cursor(), Cursor::new(101, "0xb"));
        assert_eq!(b.cursor().timestamp, Some(1200));
    }

    #[test]
    fn batch_last_cursor() {
        let batch = Batch {
            blocks: vec![
                block(r#"{"header":{"number":1,"hash":"0x1"}}"#),
                block(r#"{"header":{"number":2,"hash":"0x2"}}"#),
            ],
            finalized_head: None,
            meta: BatchMeta::default(),
        };
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.last_cursor(), Some(Cursor::new(2, "0x2")));
    }
}
