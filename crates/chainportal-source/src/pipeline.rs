//! Decoder pipeline: a source plus one decoder, yielding `{data, ctx}`.
//!
//! The decoder's requirements are folded into the source query before the
//! first request. Each batch is timed under `fetch` and `transform`
//! profiler spans. Forks are forwarded to the decoder's `fork` hook and
//! then to the consumer.

use futures::stream::{self, Stream};
use serde::Serialize;

use chainportal_core::decoder::{BatchContext, Decoder, StartContext};
use chainportal_core::error::PortalError;
use chainportal_core::fork::ForkEvent;
use chainportal_core::profiler::Profiler;
use chainportal_core::query::RequestMerge;
use chainportal_core::types::Batch;

use crate::source::{PortalSource, SourceEvent, StopHandle};

/// One transformed batch and the context it was produced in.
#[derive(Debug)]
pub struct PipeItem<O> {
    pub data: O,
    pub ctx: BatchContext,
}

/// Item yielded by a [`Pipeline`].
#[derive(Debug)]
pub enum PipeEvent<O> {
    Data(PipeItem<O>),
    /// Roll back everything above `cursor` before consuming more data.
    Fork(ForkEvent),
}

/// What to do when a batch fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Drop the batch and keep streaming.
    Skip,
    /// End the stream with the error.
    Abort,
}

type ErrorHook = Box<dyn Fn(&PortalError, &Batch) -> ErrorAction + Send + Sync>;

pub struct Pipeline<R, D> {
    source: PortalSource<R>,
    decoder: D,
    on_error: Option<ErrorHook>,
    profiling: bool,
    started: bool,
}

impl<R, D> Pipeline<R, D>
where
    R: RequestMerge + Clone + Default + Serialize + Send + Sync + 'static,
    D: Decoder<R> + 'static,
{
    /// Fold the decoder's query into the source.
    pub fn new(mut source: PortalSource<R>, decoder: D) -> Result<Self, PortalError> {
        decoder.query(source.query_mut())?;
        Ok(Self {
            source,
            decoder,
            on_error: None,
            profiling: true,
            started: false,
        })
    }

    /// Called when `transform` fails. Without a hook every failure aborts.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PortalError, &Batch) -> ErrorAction + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.source.stop_handle()
    }

    pub fn source(&self) -> &PortalSource<R> {
        &self.source
    }

    /// Pull the next event. `Ok(None)` once the source is done; the
    /// decoder's `stop` hook has run by then.
    pub async fn next_event(&mut self) -> Result<Option<PipeEvent<D::Output>>, PortalError> {
        if !self.started {
            let ctx = StartContext {
                cursor: self.source.state().current.clone(),
                head: self.source.state().head.clone(),
            };
            self.decoder.start(&ctx).await?;
            self.started = true;
        }

        loop {
            let profiler = if self.profiling {
                Profiler::new()
            } else {
                Profiler::disabled()
            };

            let fetch = profiler.start("fetch");
            let event = self.source.next_event().await?;
            fetch.end();

            let batch = match event {
                None => {
                    self.decoder.stop().await?;
                    return Ok(None);
                }
                Some(SourceEvent::Fork(fork)) => {
                    self.decoder.fork(&fork.cursor).await?;
                    return Ok(Some(PipeEvent::Fork(fork)));
                }
                Some(SourceEvent::Batch(batch)) => batch,
            };

            let cursor = batch
                .last_cursor()
                .ok_or_else(|| PortalError::Protocol("empty block batch".into()))?;
            let span = profiler.start("transform");
            let ctx = BatchContext {
                cursor,
                head: self.source.state().head.clone(),
                progress: self.source.progress(),
                profiler: span.profiler().clone(),
            };
            let result = self.decoder.transform(&batch, &ctx).await;
            span.end();

            match result {
                Ok(data) => {
                    let ctx = BatchContext { profiler, ..ctx };
                    return Ok(Some(PipeEvent::Data(PipeItem { data, ctx })));
                }
                Err(e) => {
                    let action = self
                        .on_error
                        .as_ref()
                        .map_or(ErrorAction::Abort, |hook| hook(&e, &batch));
                    if action == ErrorAction::Abort {
                        return Err(e);
                    }
                    tracing::warn!(
                        error = %e,
                        from = batch.meta.from_block,
                        to = ctx.cursor.number,
                        "decode failed, skipping batch"
                    );
                }
            }
        }
    }

    /// Consume the pipeline as a stream. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<PipeEvent<D::Output>, PortalError>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut pipeline = state?;
            match pipeline.next_event().await {
                Ok(Some(event)) => Some((Ok(event), Some(pipeline))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
