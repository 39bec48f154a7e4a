//! Rollback history.
//!
//! A [`RollbackRecord`] is a snapshot of recently processed cursors plus the
//! finalized boundary at the time it was taken. The source keeps a live
//! [`RollbackWindow`]; sinks persist records after each durable commit
//! through a [`RollbackStore`], which hands them back newest first when a
//! fork has to be resolved.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cursor::Cursor;
use crate::error::PortalError;

/// Recently processed cursors and the irreversible boundary below them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRecord {
    /// Most recent first.
    pub rollback_chain: Vec<Cursor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized: Option<Cursor>,
}

// ─── Window ───────────────────────────────────────────────────────────────────

/// Bounded window of the last cursors delivered by a source.
pub struct RollbackWindow {
    /// Oldest first.
    window: VecDeque<Cursor>,
    capacity: usize,
}

impl RollbackWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append a cursor, evicting the oldest when full.
    ///
    /// Cursors at or above `cursor.number` are dropped first so the window
    /// stays strictly increasing.
    pub fn push(&mut self, cursor: Cursor) {
        match cursor.number.checked_sub(1) {
            Some(below) => {
                self.rewind_to(below);
            }
            None => self.window.clear(),
        }
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(cursor);
    }

    /// The most recently delivered cursor.
    pub fn head(&self) -> Option<&Cursor> {
        self.window.back()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Discard everything above `number`, returning it most recent first.
    pub fn rewind_to(&mut self, number: u64) -> Vec<Cursor> {
        let mut dropped = Vec::new();
        while let Some(back) = self.window.back() {
            if back.number > number {
                if let Some(c) = self.window.pop_back() {
                    dropped.push(c);
                }
            } else {
                break;
            }
        }
        dropped
    }

    /// Snapshot as a record with the given finalized boundary.
    pub fn to_record(&self, finalized: Option<Cursor>) -> RollbackRecord {
        RollbackRecord {
            rollback_chain: self.window.iter().rev().cloned().collect(),
            finalized,
        }
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// Durable rollback history, written by sinks and read on fork.
#[async_trait]
pub trait RollbackStore: Send + Sync {
    /// Persist a record taken right after a commit.
    async fn save(&self, record: RollbackRecord) -> Result<(), PortalError>;

    /// Stream records most recent first.
    fn history(&self) -> BoxStream<'_, Result<RollbackRecord, PortalError>>;

    /// Drop everything (e.g. when resetting a pipeline).
    async fn clear(&self) -> Result<(), PortalError>;
}

/// In-memory store for tests and ephemeral pipelines.
pub struct MemoryRollbackStore {
    /// Oldest first.
    records: Mutex<VecDeque<RollbackRecord>>,
    retention: usize,
}

impl MemoryRollbackStore {
    /// Keep at most `retention` records.
    pub fn new(retention: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            retention: retention.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

impl Default for MemoryRollbackStore {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl RollbackStore for MemoryRollbackStore {
    async fn save(&self, record: RollbackRecord) -> Result<(), PortalError> {
        let mut records = self.records.lock().await;
        records.push_back(record);
        while records.len() > self.retention {
            records.pop_front();
        }
        Ok(())
    }

    fn history(&self) -> BoxStream<'_, Result<RollbackRecord, PortalError>> {
        // one record per pull so a resolver that stops early reads nothing more
        Box::pin(stream::unfold(0usize, move |idx| async move {
            let records = self.records.lock().await;
            let pos = records.len().checked_sub(idx + 1)?;
            let record = records.get(pos)?.clone();
            Some((Ok(record), idx + 1))
        }))
    }

    async fn clear(&self) -> Result<(), PortalError> {
        self.records.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn c(n: u64) -> Cursor {
        Cursor::new(n, format!("0x{n}"))
    }

    #[test]
    fn window_capacity_enforced() {
        let mut w = RollbackWindow::new(5);
        for i in 0..10 {
            w.push(c(i));
        }
        assert_eq!(w.len(), 5);
        assert_eq!(w.head(), Some(&c(9)));
        let numbers: Vec<u64> = w.to_record(None).rollback_chain.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![9, 8, 7, 6, 5]);
    }

    #[test]
    fn pushing_genesis_again_replaces_it() {
        let mut w = RollbackWindow::new(5);
        w.push(c(0));
        w.push(c(1));
        w.push(Cursor::new(0, "0x0b"));
        assert_eq!(w.len(), 1);
        assert_eq!(w.head(), Some(&Cursor::new(0, "0x0b")));
    }

    #[test]
    fn window_rewind_returns_dropped_newest_first() {
        let mut w = RollbackWindow::new(10);
        for i in 100..=105 {
            w.push(c(i));
        }
        let dropped = w.rewind_to(102);
        assert_eq!(dropped, vec![c(105), c(104), c(103)]);
        assert_eq!(w.head(), Some(&c(102)));
    }

    #[test]
    fn window_push_replaces_stale_tail() {
        let mut w = RollbackWindow::new(10);
        for i in 1..=5 {
            w.push(c(i));
        }
        w.push(Cursor::new(4, "0x4-new"));
        assert_eq!(w.len(), 4);
        assert_eq!(w.head().unwrap().hash, "0x4-new");
    }

    #[test]
    fn record_is_most_recent_first() {
        let mut w = RollbackWindow::new(10);
        for i in 1..=3 {
            w.push(c(i));
        }
        let rec = w.to_record(Some(c(1)));
        assert_eq!(rec.rollback_chain, vec![c(3), c(2), c(1)]);
        assert_eq!(rec.finalized, Some(c(1)));
    }

    #[tokio::test]
    async fn store_history_newest_first_with_retention() {
        let store = MemoryRollbackStore::new(2);
        for i in 1..=3 {
            store
                .save(RollbackRecord {
                    rollback_chain: vec![c(i)],
                    finalized: None,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 2);

        let history: Vec<_> = store.history().collect().await;
        let firsts: Vec<u64> = history
            .into_iter()
            .map(|r| r.unwrap().rollback_chain[0].number)
            .collect();
        assert_eq!(firsts, vec![3, 2]);

        store.clear().await.unwrap();
        assert_eq!(store.history().count().await, 0);
    }

    #[test]
    fn record_wire_format() {
        let rec = RollbackRecord {
            rollback_chain: vec![c(2)],
            finalized: Some(c(1)),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["rollbackChain"][0]["number"], 2);
        assert_eq!(json["finalized"]["hash"], "0x1");
    }
}
