//! Fork point search.
//!
//! When the portal rejects a request with a conflict it reports the
//! canonical chain it now believes in (`previousBlocks`). The resolver walks
//! our own recent history, newest record first, looking for the highest
//! block both sides agree on. It refuses to go below the finalized boundary
//! of a record: if the only way to reconcile is rewriting finalized history,
//! that record yields nothing.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::error::PortalError;
use crate::rollback::RollbackRecord;

/// A fork that was detected and resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkEvent {
    /// Highest block both sides agree on. Streaming resumes right after it.
    pub cursor: Cursor,
    /// Cursors we had delivered above `cursor`, most recent first.
    pub rolled_back: Vec<Cursor>,
    /// The canonical chain the portal reported.
    pub previous_blocks: Vec<Cursor>,
}

impl ForkEvent {
    /// Number of delivered blocks invalidated by the fork.
    pub fn depth(&self) -> usize {
        self.rolled_back.len()
    }
}

/// Search one record for the fork point.
pub fn resolve_in_record(record: &RollbackRecord, previous_blocks: &[Cursor]) -> Option<Cursor> {
    let mut chain: Vec<&Cursor> = record.rollback_chain.iter().collect();
    chain.sort_by(|a, b| b.number.cmp(&a.number));

    let mut working: Vec<&Cursor> = previous_blocks.iter().collect();

    for (i, local) in chain.iter().enumerate() {
        if working.iter().any(|remote| *remote == *local) {
            return Some((*local).clone());
        }

        // anything at or above this height is on the other branch
        working.retain(|remote| remote.number < local.number);

        if working.is_empty() {
            let above_finalized = record
                .finalized
                .as_ref()
                .map_or(true, |f| local.number > f.number);
            if !above_finalized {
                tracing::debug!(
                    block = local.number,
                    "fork reaches finalized history, record rejected"
                );
                return None;
            }
            return chain.get(i + 1).map(|c| (*c).clone());
        }
    }

    match (&record.finalized, working.as_slice()) {
        (Some(finalized), [only]) if *only == finalized => Some(finalized.clone()),
        _ => None,
    }
}

/// Resolve against records supplied most-recent-first.
///
/// Records are pulled lazily; older ones are never read once a record yields
/// a fork point. `None` means no common ancestor exists in retained history.
pub fn find_fork_point<I>(records: I, previous_blocks: &[Cursor]) -> Option<Cursor>
where
    I: IntoIterator<Item = RollbackRecord>,
{
    records
        .into_iter()
        .find_map(|record| resolve_in_record(&record, previous_blocks))
}

/// [`find_fork_point`] over a paginated/async record source.
pub async fn find_fork_point_in_stream<S>(
    records: S,
    previous_blocks: &[Cursor],
) -> Result<Option<Cursor>, PortalError>
where
    S: Stream<Item = Result<RollbackRecord, PortalError>>,
{
    futures::pin_mut!(records);
    while let Some(record) = records.next().await {
        if let Some(cursor) = resolve_in_record(&record?, previous_blocks) {
            return Ok(Some(cursor));
        }
    }
    Ok(None)
}
