//! Decoder contract and composition.
//!
//! A decoder both declares what data it needs (through the query builder)
//! and turns raw batches into typed output. [`Composite`] fans one batch out
//! to a named set of decoders while presenting a single merged query to the
//! source, so N independent decoders cost one network pass.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;

use crate::cursor::Cursor;
use crate::error::PortalError;
use crate::profiler::Profiler;
use crate::query::QueryBuilder;
use crate::types::{Batch, HeadInfo, ProgressSnapshot};

/// Passed to [`Decoder::start`] before the first request.
#[derive(Debug, Clone, Default)]
pub struct StartContext {
    /// Where the stream resumes from, if it resumes.
    pub cursor: Option<Cursor>,
    pub head: HeadInfo,
}

/// Passed to [`Decoder::transform`] with every batch.
#[derive(Debug, Clone)]
pub struct BatchContext {
    /// Last block of the batch.
    pub cursor: Cursor,
    pub head: HeadInfo,
    pub progress: ProgressSnapshot,
    pub profiler: Profiler,
}

/// A pipeline stage: declares data requirements and transforms batches.
#[async_trait]
pub trait Decoder<R>: Send + Sync {
    type Output: Send;

    /// Identifier used for metrics and profiling attribution.
    fn id(&self) -> String {
        short_type_name::<Self>()
    }

    /// Add this decoder's requirements to the shared query.
    fn query(&self, _query: &mut QueryBuilder<R>) -> Result<(), PortalError> {
        Ok(())
    }

    async fn start(&self, _ctx: &StartContext) -> Result<(), PortalError> {
        Ok(())
    }

    async fn transform(&self, batch: &Batch, ctx: &BatchContext)
        -> Result<Self::Output, PortalError>;

    /// Called after a fork was resolved; output above `cursor` is void.
    async fn fork(&self, _cursor: &Cursor) -> Result<(), PortalError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), PortalError> {
        Ok(())
    }
}

/// Boxed decoder with a fixed output type.
pub type BoxDecoder<R, O> = Box<dyn Decoder<R, Output = O>>;

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Run every future and report the first failure in input order.
async fn join_first_error<I, F>(futures: I) -> Result<(), PortalError>
where
    I: IntoIterator<Item = F>,
    F: std::future::Future<Output = Result<(), PortalError>>,
{
    join_all(futures).await.into_iter().collect()
}

// ─── Composite ────────────────────────────────────────────────────────────────

struct Child<R, O> {
    id: String,
    decoder: BoxDecoder<R, O>,
}

/// Named set of decoders acting as one.
///
/// Output is keyed by the same names. Lifecycle hooks run concurrently on
/// every child and surface the first failure.
pub struct Composite<R, O> {
    children: BTreeMap<String, Child<R, O>>,
}

impl<R, O> Composite<R, O>
where
    R: 'static,
    O: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }

    /// Add a child under `key`, replacing any child with the same key.
    pub fn with<D>(mut self, key: impl Into<String>, decoder: D) -> Self
    where
        D: Decoder<R, Output = O> + 'static,
    {
        self.insert(key, Box::new(decoder));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, decoder: BoxDecoder<R, O>) {
        let key = key.into();
        let id = decoder.id();
        self.children.insert(key, Child { id, decoder });
        self.disambiguate();
    }

    /// Per-key identifiers after collision handling.
    pub fn child_ids(&self) -> BTreeMap<String, String> {
        self.children
            .iter()
            .map(|(k, c)| (k.clone(), c.id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Prefix colliding child ids with their key.
    fn disambiguate(&mut self) {
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        for child in self.children.values_mut() {
            child.id = child.decoder.id();
            *seen.entry(child.id.clone()).or_default() += 1;
        }
        for (key, child) in self.children.iter_mut() {
            if seen.get(&child.id).copied().unwrap_or(0) > 1 {
                child.id = format!("{key}.{}", child.id);
            }
        }
    }
}

impl<R, O> Default for Composite<R, O>
where
    R: 'static,
    O: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R, O> Decoder<R> for Composite<R, O>
where
    R: Send + Sync + 'static,
    O: Send + 'static,
{
    type Output = BTreeMap<String, O>;

    fn id(&self) -> String {
        let ids: Vec<_> = self.children.values().map(|c| c.id.as_str()).collect();
        format!("composite({})", ids.join(","))
    }

    fn query(&self, query: &mut QueryBuilder<R>) -> Result<(), PortalError> {
        for child in self.children.values() {
            child.decoder.query(query)?;
        }
        Ok(())
    }

    async fn start(&self, ctx: &StartContext) -> Result<(), PortalError> {
        join_first_error(self.children.values().map(|c| c.decoder.start(ctx))).await
    }

    async fn transform(
        &self,
        batch: &Batch,
        ctx: &BatchContext,
    ) -> Result<Self::Output, PortalError> {
        let runs = self.children.iter().map(|(key, child)| async move {
            let span = ctx.profiler.start(&child.id);
            let child_ctx = BatchContext {
                profiler: span.profiler().clone(),
                ..ctx.clone()
            };
            let out = child.decoder.transform(batch, &child_ctx).await;
            span.end();
            out.map(|o| (key.clone(), o))
        });
        join_all(runs).await.into_iter().collect()
    }

    async fn fork(&self, cursor: &Cursor) -> Result<(), PortalError> {
        join_first_error(self.children.values().map(|c| c.decoder.fork(cursor))).await
    }

    async fn stop(&self) -> Result<(), PortalError> {
        join_first_error(self.children.values().map(|c| c.decoder.stop())).await
    }
}

// ─── Adapters ─────────────────────────────────────────────────────────────────

/// Decoder whose output is post-processed by a function.
pub struct MapOutput<D, F> {
    inner: D,
    f: F,
}

#[async_trait]
impl<R, D, F, O> Decoder<R> for MapOutput<D, F>
where
    R: Send + Sync + 'static,
    D: Decoder<R>,
    F: Fn(D::Output) -> O + Send + Sync,
    O: Send,
{
    type Output = O;

    fn id(&self) -> String {
        self.inner.id()
    }

    fn query(&self, query: &mut QueryBuilder<R>) -> Result<(), PortalError> {
        self.inner.query(query)
    }

    async fn start(&self, ctx: &StartContext) -> Result<(), PortalError> {
        self.inner.start(ctx).await
    }

    async fn transform(&self, batch: &Batch, ctx: &BatchContext) -> Result<O, PortalError> {
        self.inner.transform(batch, ctx).await.map(&self.f)
    }

    async fn fork(&self, cursor: &Cursor) -> Result<(), PortalError> {
        self.inner.fork(cursor).await
    }

    async fn stop(&self) -> Result<(), PortalError> {
        self.inner.stop().await
    }
}

/// Stateless decoder built from a closure.
pub struct FnDecoder<F> {
    id: String,
    f: F,
}

impl<F> FnDecoder<F> {
    pub fn new(id: impl Into<String>, f: F) -> Self {
        Self { id: id.into(), f }
    }
}

#[async_trait]
impl<R, F, O> Decoder<R> for FnDecoder<F>
where
    R: Send + Sync + 'static,
    F: Fn(&Batch, &BatchContext) -> Result<O, PortalError> + Send + Sync,
    O: Send,
{
    type Output = O;

    fn id(&self) -> String {
        self.id.clone()
    }

    async fn transform(&self, batch: &Batch, ctx: &BatchContext) -> Result<O, PortalError> {
        (self.f)(batch, ctx)
    }
}

/// Combinators available on every decoder.
pub trait DecoderExt: Sized {
    /// Map the output, e.g. into a shared enum so the decoder can join a [`Composite`].
    fn map_output<F>(self, f: F) -> MapOutput<Self, F> {
        MapOutput { inner: self, f }
    }
}

impl<D> DecoderExt for D {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Range;
    use crate::query::RequestMerge;
    use crate::types::BatchMeta;
    use serde::Serialize;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Default, PartialEq, Serialize)]
    struct Logs {
        logs: Vec<String>,
    }

    impl RequestMerge for Logs {
        fn merge(&self, other: &Self) -> Self {
            let mut logs = self.logs.clone();
            logs.extend(other.logs.iter().cloned());
            Self { logs }
        }
    }

    /// Counts blocks and remembers lifecycle calls.
    struct Counter {
        tag: &'static str,
        calls: Arc<AtomicU32>,
        fail_start: bool,
    }

    impl Counter {
        fn new(tag: &'static str) -> Self {
            Self {
                tag,
                calls: Arc::new(AtomicU32::new(0)),
                fail_start: false,
            }
        }
    }

    #[async_trait]
    impl Decoder<Logs> for Counter {
        type Output = String;

        fn query(&self, query: &mut QueryBuilder<Logs>) -> Result<(), PortalError> {
            query.add_request(
                Range::open(0),
                Logs {
                    logs: vec![self.tag.to_string()],
                },
            )?;
            Ok(())
        }

        async fn start(&self, _ctx: &StartContext) -> Result<(), PortalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(PortalError::decoder(self.tag, "boom"));
            }
            Ok(())
        }

        async fn transform(&self, batch: &Batch, _ctx: &BatchContext) -> Result<String, PortalError> {
            Ok(format!("{}:{}", self.tag, batch.blocks.len()))
        }

        async fn fork(&self, _cursor: &Cursor) -> Result<(), PortalError> {
            self.calls.fetch_add(10, Ordering::SeqCst);
            Ok(())
        }
    }

    fn batch() -> Batch {
        let blocks = (1..=3)
            .map(|n| {
                serde_json::from_value(serde_json::json!({
                    "header": {"number": n, "hash": format!("0x{n}")}
                }))
                .unwrap()
            })
            .collect();
        Batch {
            blocks,
            finalized_head: None,
            meta: BatchMeta::default(),
        }
    }

    fn ctx() -> BatchContext {
        BatchContext {
            cursor: Cursor::new(3, "0x3"),
            head: HeadInfo::default(),
            progress: ProgressSnapshot::default(),
            profiler: Profiler::new(),
        }
    }

    #[tokio::test]
    async fn composite_output_is_keyed_per_child() {
        let composite = Composite::new()
            .with("transfers", Counter::new("t"))
            .with("swaps", Counter::new("s"));

        let out = composite.transform(&batch(), &ctx()).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out["transfers"], "t:3");
        assert_eq!(out["swaps"], "s:3");
    }

    #[tokio::test]
    async fn composite_query_contains_every_child_requirement() {
        let composite = Composite::new()
            .with("transfers", Counter::new("t"))
            .with("swaps", Counter::new("s"));

        let mut qb = QueryBuilder::new("evm");
        composite.query(&mut qb).unwrap();

        struct NoHead;
        #[async_trait]
        impl crate::query::HeadProvider for NoHead {
            async fn head(&self) -> Result<Option<Cursor>, PortalError> {
                Ok(None)
            }
        }

        let ranges = qb.calculate_ranges(None, &NoHead).await.unwrap();
        assert_eq!(ranges.raw.len(), 1, "one merged query for both children");
        let mut logs = ranges.raw[0].request.logs.clone();
        logs.sort();
        assert_eq!(logs, vec!["s", "t"]);
    }

    #[tokio::test]
    async fn composite_lifecycle_reaches_all_children_and_surfaces_failure() {
        let ok = Counter::new("ok");
        let ok_calls = ok.calls.clone();
        let mut bad = Counter::new("bad");
        bad.fail_start = true;
        let bad_calls = bad.calls.clone();

        let composite = Composite::new().with("a", ok).with("b", bad);
        let err = composite.start(&StartContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("bad"));
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bad_calls.load(Ordering::SeqCst), 1);

        composite.fork(&Cursor::new(1, "0x1")).await.unwrap();
        assert_eq!(ok_calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn colliding_ids_are_prefixed_with_key() {
        let composite: Composite<Logs, String> = Composite::new()
            .with("a", Counter::new("x"))
            .with("b", Counter::new("y"))
            .with("c", FnDecoder::new("solo", |_: &Batch, _: &BatchContext| Ok::<_, PortalError>(String::new())));

        let ids = composite.child_ids();
        assert_eq!(ids["a"], "a.Counter");
        assert_eq!(ids["b"], "b.Counter");
        assert_eq!(ids["c"], "solo");
    }

    #[tokio::test]
    async fn transform_spans_are_attributed_to_child_ids() {
        let composite = Composite::new()
            .with("a", Counter::new("x"))
            .with("b", FnDecoder::new("plain", |_: &Batch, _: &BatchContext| Ok::<_, PortalError>(String::new())));
        let ctx = ctx();
        composite.transform(&batch(), &ctx).await.unwrap();

        let mut paths: Vec<_> = ctx.profiler.records().into_iter().map(|r| r.path).collect();
        paths.sort();
        assert_eq!(paths, vec!["Counter", "plain"]);
    }

    #[tokio::test]
    async fn map_output_lets_heterogeneous_decoders_compose() {
        #[derive(Debug, PartialEq)]
        enum Out {
            Text(String),
            Count(usize),
        }

        let composite = Composite::new()
            .with("text", Counter::new("t").map_output(Out::Text))
            .with(
                "count",
                FnDecoder::new("count", |b: &Batch, _: &BatchContext| Ok::<_, PortalError>(b.len()))
                    .map_output(Out::Count),
            );

        let out = composite.transform(&batch(), &ctx()).await.unwrap();
        assert_eq!(out["text"], Out::Text("t:3".into()));
        assert_eq!(out["count"], Out::Count(3));
    }
}
