//! The portal source loop.
//!
//! For each merged sub-range, in increasing order:
//! 1. POST the query from `current + 1`, carrying `parentBlockHash` when
//!    the request continues directly from `current`
//! 2. 200 → advance `current`, remember cursors, yield the batch
//! 3. 204 / empty → wait `poll_interval` and ask again
//! 4. 409 → search rollback history for the fork point, rewind, yield a
//!    fork event and continue after it; no common ancestor is fatal
//!
//! 5xx and network failures are retried inside [`PortalClient`]. The loop
//! holds at most one response: nothing is fetched until the consumer pulls.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use chainportal_core::cursor::Cursor;
use chainportal_core::error::PortalError;
use chainportal_core::fork::{find_fork_point_in_stream, ForkEvent};
use chainportal_core::query::{QueryBuilder, RequestMerge};
use chainportal_core::range::{Range, RangedRequest};
use chainportal_core::rollback::{RollbackStore, RollbackWindow};
use chainportal_core::types::{Batch, BatchMeta, Block, HeadInfo, ProgressSnapshot};

use crate::client::{PortalClient, StreamResponse};
use crate::progress::ProgressTracker;

/// Item yielded by a [`PortalSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Batch(Batch),
    /// Everything delivered above `cursor` is void; the next batch starts
    /// right after it.
    Fork(ForkEvent),
}

/// Cursor and head as seen by the loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    /// Last delivered block, or the fork point after a rollback.
    pub current: Option<Cursor>,
    pub head: HeadInfo,
}

/// Stops a source from another task. In-flight requests are dropped.
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Parts assembled by [`PortalSourceBuilder`](crate::builder::PortalSourceBuilder).
pub(crate) struct SourceParts<R> {
    pub client: PortalClient,
    pub query: QueryBuilder<R>,
    pub window: Range,
    pub finalized_only: bool,
    pub poll_interval: Duration,
    pub rollback_window: usize,
    pub progress_interval: Duration,
    pub store: Option<Arc<dyn RollbackStore>>,
    pub resume: Option<Cursor>,
}

/// One logical, strictly ordered stream of portal data.
pub struct PortalSource<R> {
    client: PortalClient,
    query: QueryBuilder<R>,
    window: Range,
    finalized_only: bool,
    poll_interval: Duration,
    rollback: RollbackWindow,
    store: Option<Arc<dyn RollbackStore>>,
    state: StreamState,
    progress: ProgressTracker,
    cancel: CancellationToken,
    /// Merged sub-ranges, computed on the first pull.
    plan: Option<Vec<RangedRequest<R>>>,
    /// Index of the sub-range being streamed.
    idx: usize,
}

impl<R> PortalSource<R>
where
    R: RequestMerge + Clone + Default + Serialize + Send + Sync + 'static,
{
    pub(crate) fn from_parts(parts: SourceParts<R>) -> Self {
        let mut rollback = RollbackWindow::new(parts.rollback_window);
        if let Some(cursor) = &parts.resume {
            rollback.push(cursor.clone());
        }
        let progress = ProgressTracker::new(parts.window.from, parts.window.to, parts.progress_interval);
        Self {
            client: parts.client,
            query: parts.query,
            window: parts.window,
            finalized_only: parts.finalized_only,
            poll_interval: parts.poll_interval,
            rollback,
            store: parts.store,
            state: StreamState {
                current: parts.resume,
                head: HeadInfo::default(),
            },
            progress,
            cancel: CancellationToken::new(),
            plan: None,
            idx: 0,
        }
    }

    pub fn client(&self) -> &PortalClient {
        &self.client
    }

    pub fn query(&self) -> &QueryBuilder<R> {
        &self.query
    }

    /// Mutable query access. Any change discards the current plan.
    pub fn query_mut(&mut self) -> &mut QueryBuilder<R> {
        self.plan = None;
        self.idx = 0;
        &mut self.query
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.cancel.clone())
    }

    /// Halt iteration; the next pull returns `None` without error.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Pull the next event. `Ok(None)` once the range is exhausted or the
    /// source was stopped.
    pub async fn next_event(&mut self) -> Result<Option<SourceEvent>, PortalError> {
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return Ok(None);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("portal source stopped");
                Ok(None)
            }
            event = self.advance() => event,
        }
    }

    /// Consume the source as a stream. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<SourceEvent, PortalError>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut source = state?;
            match source.next_event().await {
                Ok(Some(event)) => Some((Ok(event), Some(source))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    async fn advance(&mut self) -> Result<Option<SourceEvent>, PortalError> {
        if self.plan.is_none() {
            let ranges = self
                .query
                .calculate_ranges(Some(&self.window), &self.client)
                .await?;
            tracing::debug!(
                requests = ranges.bounded.len(),
                window = %self.window,
                "portal query plan ready"
            );
            self.plan = Some(ranges.bounded);
            self.idx = 0;
        }

        loop {
            let Some(ranged) = self.next_request() else {
                tracing::info!(current = ?self.state.current.as_ref().map(|c| c.number), "portal range exhausted");
                return Ok(None);
            };
            let parent = self
                .state
                .current
                .as_ref()
                .filter(|c| c.next_block() == ranged.range.from)
                .map(|c| c.hash.clone());
            let body = self.query.build_query(&ranged, parent.as_deref())?;

            tracing::debug!(
                from = ranged.range.from,
                to = ?ranged.range.to,
                parent = ?parent,
                "requesting portal stream"
            );
            self.progress.record_request();

            match self.client.stream(&body, self.finalized_only).await? {
                StreamResponse::Blocks {
                    blocks,
                    head,
                    bytes,
                    retries,
                } => {
                    return self
                        .on_blocks(&ranged.range, blocks, head, bytes, retries)
                        .map(Some);
                }
                StreamResponse::NoData { head } => {
                    self.update_head(head);
                    tracing::trace!(
                        from = ranged.range.from,
                        wait_ms = self.poll_interval.as_millis() as u64,
                        "no new blocks yet"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
                StreamResponse::Conflict { previous_blocks } => {
                    return self.on_conflict(previous_blocks).await.map(Some);
                }
            }
        }
    }

    /// The next sub-range to request, trimmed to start after `current`.
    fn next_request(&mut self) -> Option<RangedRequest<R>> {
        let plan = self.plan.as_ref()?;
        while let Some(planned) = plan.get(self.idx) {
            let from = match &self.state.current {
                Some(c) => planned.range.from.max(c.next_block()),
                None => planned.range.from,
            };
            if planned.range.to.map_or(true, |to| from <= to) {
                return Some(RangedRequest::new(
                    Range {
                        from,
                        to: planned.range.to,
                    },
                    planned.request.clone(),
                ));
            }
            self.idx += 1;
        }
        None
    }

    fn update_head(&mut self, head: HeadInfo) {
        if head.finalized.is_some() {
            self.state.head.finalized = head.finalized;
        }
        if head.latest.is_some() {
            self.state.head.latest = head.latest;
        }
        self.progress.record_head(head.latest);
    }

    fn on_blocks(
        &mut self,
        requested: &Range,
        blocks: Vec<Block>,
        head: HeadInfo,
        bytes: usize,
        retries: u32,
    ) -> Result<SourceEvent, PortalError> {
        let (Some(first), Some(last)) = (blocks.first(), blocks.last()) else {
            return Err(PortalError::Protocol("empty block batch".into()));
        };
        if first.header.number < requested.from {
            return Err(PortalError::Protocol(format!(
                "portal returned block {} below requested fromBlock {}",
                first.header.number, requested.from
            )));
        }
        if blocks
            .windows(2)
            .any(|w| w[1].header.number <= w[0].header.number)
        {
            return Err(PortalError::Protocol(
                "portal returned blocks out of order".into(),
            ));
        }
        let last = last.cursor();

        self.update_head(head);
        for block in &blocks {
            self.rollback.push(block.cursor());
        }
        self.state.current = Some(last.clone());
        self.progress.record_batch(last.number, blocks.len(), bytes);
        self.progress.maybe_log();

        tracing::debug!(
            from = requested.from,
            to = last.number,
            blocks = blocks.len(),
            bytes,
            retries,
            "portal batch received"
        );

        Ok(SourceEvent::Batch(Batch {
            blocks,
            finalized_head: self.state.head.finalized.clone(),
            meta: BatchMeta {
                from_block: requested.from,
                to_block: requested.to,
                bytes,
                retries,
            },
        }))
    }

    async fn on_conflict(&mut self, previous_blocks: Vec<Cursor>) -> Result<SourceEvent, PortalError> {
        // the live window is the most recent record, stored history follows
        let own = self.rollback.to_record(self.state.head.finalized.clone());
        let own = stream::once(futures::future::ready(Ok(own)));
        let found = match &self.store {
            Some(store) => find_fork_point_in_stream(own.chain(store.history()), &previous_blocks).await?,
            None => find_fork_point_in_stream(own, &previous_blocks).await?,
        };

        let Some(cursor) = found else {
            let (block_number, expected, actual) = self.conflict_details(&previous_blocks);
            tracing::error!(
                block = block_number,
                expected = %expected,
                actual = %actual,
                "no common ancestor within rollback history"
            );
            return Err(PortalError::ForkUnresolved {
                block_number,
                expected,
                actual,
            });
        };

        let rolled_back = self.rollback.rewind_to(cursor.number);
        if self.rollback.head() != Some(&cursor) {
            self.rollback.push(cursor.clone());
        }
        self.state.current = Some(cursor.clone());
        self.progress.rewind(cursor.number);
        if let Some(plan) = &self.plan {
            self.idx = plan
                .iter()
                .position(|r| r.range.to.map_or(true, |to| to > cursor.number))
                .unwrap_or(plan.len());
        }

        tracing::warn!(
            block = cursor.number,
            hash = %cursor.hash,
            depth = rolled_back.len(),
            "fork resolved, resuming after common ancestor"
        );

        Ok(SourceEvent::Fork(ForkEvent {
            cursor,
            rolled_back,
            previous_blocks,
        }))
    }

    /// Block number plus our hash and the portal's hash for the error report.
    fn conflict_details(&self, previous_blocks: &[Cursor]) -> (u64, String, String) {
        let highest_remote = previous_blocks.iter().max_by_key(|c| c.number);
        let block_number = match (&self.state.current, highest_remote) {
            (Some(c), _) => c.number,
            (None, Some(r)) => r.number,
            (None, None) => self.window.from,
        };
        let expected = self
            .state
            .current
            .as_ref()
            .map_or_else(|| "unknown".to_string(), |c| c.hash.clone());
        let actual = previous_blocks
            .iter()
            .find(|c| c.number == block_number)
            .or(highest_remote)
            .map_or_else(|| "unknown".to_string(), |c| c.hash.clone());
        (block_number, expected, actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PortalSourceBuilder;
    use crate::retry::RetryConfig;
    use crate::testing::ScriptedTransport;
    use crate::transport::RawResponse;
    use chainportal_core::rollback::{MemoryRollbackStore, RollbackRecord};
    use futures::TryStreamExt;

    #[derive(Debug, Clone, Default, PartialEq, Serialize)]
    struct Filters {
        #[serde(skip_serializing_if = "Vec::is_empty")]
        logs: Vec<String>,
    }

    impl RequestMerge for Filters {
        fn merge(&self, other: &Self) -> Self {
            let mut logs = self.logs.clone();
            logs.extend(other.logs.iter().cloned());
            Self { logs }
        }
    }

    fn builder(transport: &Arc<ScriptedTransport>) -> PortalSourceBuilder<Filters> {
        PortalSourceBuilder::new("http://portal.test/datasets/eth", QueryBuilder::new("evm"))
            .from_block(1)
            .retry(RetryConfig {
                max_retries: 3,
                backoff_ms: vec![1, 2],
            })
            .poll_interval(Duration::from_millis(5))
            .transport(transport.clone())
    }

    async fn collect(source: PortalSource<Filters>) -> Result<Vec<SourceEvent>, PortalError> {
        source.into_stream().try_collect().await
    }

    /// Apply forks the way a sink would and return the surviving cursors.
    fn applied(events: &[SourceEvent]) -> Vec<Cursor> {
        let mut out: Vec<Cursor> = vec![];
        for event in events {
            match event {
                SourceEvent::Batch(b) => out.extend(b.blocks.iter().map(Block::cursor)),
                SourceEvent::Fork(f) => out.retain(|c| c.number <= f.cursor.number),
            }
        }
        out
    }

    #[tokio::test]
    async fn server_errors_between_successes_are_retried_once() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_blocks(&[(1, "0x1", "0x0"), (2, "0x2", "0x1")]);
        t.push(RawResponse::new(503));
        t.push(RawResponse::new(503));
        t.push_blocks(&[(3, "0x3", "0x2"), (4, "0x4", "0x3")]);

        let events = collect(builder(&t).to_block(4).build().unwrap()).await.unwrap();

        assert_eq!(events.len(), 2);
        let numbers: Vec<u64> = applied(&events).iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        match &events[1] {
            SourceEvent::Batch(b) => {
                assert_eq!(b.meta.retries, 2);
                assert_eq!(b.meta.from_block, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(t.request_count(), 4);

        let bodies = t.stream_bodies();
        assert_eq!(bodies[0]["fromBlock"], 1);
        assert_eq!(bodies[0]["toBlock"], 4);
        assert_eq!(bodies[1]["fromBlock"], 3);
        assert_eq!(bodies[1]["parentBlockHash"], "0x2");
        assert_eq!(bodies[1]["type"], "evm");
    }

    #[tokio::test]
    async fn exhausted_retries_fail_with_status_and_url() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_blocks(&[(1, "0x1", "0x0")]);
        for _ in 0..4 {
            t.push(RawResponse::new(503));
        }

        let mut stream = Box::pin(builder(&t).to_block(4).build().unwrap().into_stream());
        assert!(matches!(stream.next().await, Some(Ok(SourceEvent::Batch(_)))));
        let err = stream.next().await.unwrap().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("HTTP 503"), "{msg}");
        assert!(msg.contains("http://portal.test/datasets/eth/stream"), "{msg}");
        assert!(stream.next().await.is_none(), "stream ends after a fatal error");
    }

    #[tokio::test]
    async fn network_errors_are_retried() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_error(PortalError::Network {
            url: "http://portal.test/datasets/eth/stream".into(),
            reason: "connection reset".into(),
        });
        t.push_blocks(&[(1, "0x1", "0x0")]);

        let events = collect(builder(&t).to_block(1).build().unwrap()).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_is_fatal_without_retry() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(RawResponse::new(429).with_body("slow down"));
        let err = collect(builder(&t).to_block(1).build().unwrap()).await.unwrap_err();
        assert!(matches!(err, PortalError::UnexpectedStatus { status: 429, .. }));
        assert_eq!(t.request_count(), 1);
    }

    #[tokio::test]
    async fn resolvable_fork_continues_without_gaps_or_duplicates() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_blocks(&[(1, "0x1", "0x0"), (2, "0x2", "0x1"), (3, "0x3", "0x2")]);
        t.push_conflict(&[(2, "0x2"), (3, "0x3b")]);
        t.push_blocks(&[(3, "0x3b", "0x2"), (4, "0x4b", "0x3b"), (5, "0x5b", "0x4b")]);

        let events = collect(builder(&t).to_block(5).build().unwrap()).await.unwrap();

        let fork = events
            .iter()
            .find_map(|e| match e {
                SourceEvent::Fork(f) => Some(f.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(fork.cursor, Cursor::new(2, "0x2"));
        assert_eq!(fork.rolled_back, vec![Cursor::new(3, "0x3")]);

        let chain = applied(&events);
        let numbers: Vec<u64> = chain.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(chain[2].hash, "0x3b");

        let bodies = t.stream_bodies();
        assert_eq!(bodies[2]["fromBlock"], 3);
        assert_eq!(bodies[2]["parentBlockHash"], "0x2");
    }

    #[tokio::test]
    async fn unresolvable_fork_names_block_and_hashes() {
        let t = Arc::new(ScriptedTransport::new());
        let mut first = RawResponse::new(200)
            .with_header("X-Sqd-Finalized-Head-Number", "3")
            .with_header("X-Sqd-Finalized-Head-Hash", "0x3");
        first.body = "{\"header\":{\"number\":1,\"hash\":\"0x1\"}}\n\
                      {\"header\":{\"number\":2,\"hash\":\"0x2\"}}\n\
                      {\"header\":{\"number\":3,\"hash\":\"0x3\"}}\n"
            .into();
        t.push(first);
        t.push_conflict(&[(3, "0x3b")]);

        let err = collect(builder(&t).to_block(5).build().unwrap()).await.unwrap_err();
        assert!(err.is_fork());
        let msg = err.to_string();
        assert!(msg.contains("block 3"), "{msg}");
        assert!(msg.contains("0x3b"), "{msg}");
        assert!(msg.contains("expected hash 0x3,"), "{msg}");
    }

    #[tokio::test]
    async fn fork_point_found_in_stored_history() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_blocks(&[
            (1, "0x1", "0x0"),
            (2, "0x2", "0x1"),
            (3, "0x3", "0x2"),
            (4, "0x4", "0x3"),
        ]);
        t.push_conflict(&[(2, "0x2"), (3, "0x3b"), (4, "0x4b")]);
        t.push_blocks(&[(3, "0x3b", "0x2"), (4, "0x4b", "0x3b"), (5, "0x5b", "0x4b")]);

        let store = Arc::new(MemoryRollbackStore::default());
        store
            .save(RollbackRecord {
                rollback_chain: vec![Cursor::new(2, "0x2"), Cursor::new(1, "0x1")],
                finalized: None,
            })
            .await
            .unwrap();

        // the window only holds #3 and #4, so the fork point comes from the store
        let source = builder(&t)
            .to_block(5)
            .rollback_window(2)
            .rollback_store(store)
            .build()
            .unwrap();
        let events = collect(source).await.unwrap();

        assert_eq!(events.len(), 3);
        match &events[1] {
            SourceEvent::Fork(fork) => assert_eq!(fork.cursor, Cursor::new(2, "0x2")),
            other => panic!("expected fork, got {other:?}"),
        }
        let chain = applied(&events);
        let hashes: Vec<&str> = chain.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["0x1", "0x2", "0x3b", "0x4b", "0x5b"]);
        assert_eq!(t.stream_bodies()[2]["parentBlockHash"], "0x2");
    }

    #[tokio::test]
    async fn no_content_waits_and_asks_again() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(RawResponse::new(204).with_header("X-Sqd-Head-Number", "0"));
        t.push_blocks(&[(1, "0x1", "0x0"), (2, "0x2", "0x1")]);

        let source = builder(&t).to_block(2).build().unwrap();
        let events = collect(source).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(t.request_count(), 2);
        assert_eq!(t.stream_bodies()[1]["fromBlock"], 1);
    }

    #[tokio::test]
    async fn sparse_ranges_skip_parent_hash_across_gaps() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_blocks(&[(1, "0x1", "0x0"), (2, "0x2", "0x1")]);
        t.push_blocks(&[(10, "0xa", "0x9"), (11, "0xb", "0xa")]);

        let mut query = QueryBuilder::new("evm");
        query
            .add_request(Range::bounded(1, 2).unwrap(), Filters { logs: vec!["a".into()] })
            .unwrap()
            .add_request(Range::bounded(10, 11).unwrap(), Filters { logs: vec!["b".into()] })
            .unwrap();
        let source = PortalSourceBuilder::new("http://portal.test/datasets/eth", query)
            .from_block(1)
            .to_block(11)
            .transport(t.clone())
            .build()
            .unwrap();
        collect(source).await.unwrap();

        let bodies = t.stream_bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["logs"], serde_json::json!(["a"]));
        assert_eq!(bodies[1]["fromBlock"], 10);
        assert_eq!(bodies[1]["logs"], serde_json::json!(["b"]));
        assert!(bodies[1].get("parentBlockHash").is_none());
    }

    #[tokio::test]
    async fn resume_cursor_is_continued() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_blocks(&[(6, "0x6", "0x5")]);
        let source = builder(&t)
            .to_block(6)
            .resume_from(Cursor::new(5, "0x5"))
            .build()
            .unwrap();
        collect(source).await.unwrap();

        let bodies = t.stream_bodies();
        assert_eq!(bodies[0]["fromBlock"], 6);
        assert_eq!(bodies[0]["parentBlockHash"], "0x5");
    }

    #[tokio::test]
    async fn stop_aborts_in_flight_request() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_blocks(&[(1, "0x1", "0x0")]);
        t.push_hang();

        let source = builder(&t).build().unwrap();
        let handle = source.stop_handle();
        let mut stream = Box::pin(source.into_stream());
        assert!(matches!(stream.next().await, Some(Ok(SourceEvent::Batch(_)))));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        });
        assert!(stream.next().await.is_none());
        assert_eq!(t.request_count(), 2);
    }

    #[tokio::test]
    async fn state_and_progress_follow_batches() {
        let t = Arc::new(ScriptedTransport::new());
        let mut resp = RawResponse::new(200).with_header("X-Sqd-Head-Number", "10");
        resp.body = "{\"header\":{\"number\":1,\"hash\":\"0x1\"}}\n".into();
        t.push(resp);

        let mut source = builder(&t).to_block(10).build().unwrap();
        source.next_event().await.unwrap();

        assert_eq!(source.state().current, Some(Cursor::new(1, "0x1")));
        assert_eq!(source.state().head.latest, Some(10));
        let progress = source.progress();
        assert_eq!(progress.blocks_processed, 1);
        assert_eq!(progress.requests, 1);
        assert_eq!(progress.target, Some(10));
    }

    #[tokio::test]
    async fn latest_requests_resolve_against_portal_head() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(RawResponse::new(200).with_body(r#"{"number":7,"hash":"0x7"}"#));
        t.push_blocks(&[(7, "0x7", "0x6"), (8, "0x8", "0x7")]);

        let mut query = QueryBuilder::new("evm");
        query.add_latest_request(Some(8), Filters::default());
        let source = PortalSourceBuilder::new("http://portal.test/datasets/eth", query)
            .to_block(8)
            .transport(t.clone())
            .build()
            .unwrap();
        collect(source).await.unwrap();

        let requests = t.requests();
        assert!(requests[0].url.ends_with("/head"));
        assert_eq!(requests[1].body.as_ref().unwrap()["fromBlock"], 7);
    }
}
