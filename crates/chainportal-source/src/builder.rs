//! Fluent builder API for creating portal sources.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainportal_core::QueryBuilder;
//! use chainportal_source::PortalSourceBuilder;
//! # use chainportal_core::RequestMerge;
//! # #[derive(Clone, Default, serde::Serialize)]
//! # struct Req;
//! # impl RequestMerge for Req { fn merge(&self, _: &Self) -> Self { Req } }
//!
//! let source = PortalSourceBuilder::new(
//!     "https://portal.sqd.dev/datasets/ethereum-mainnet",
//!     QueryBuilder::<Req>::new("evm"),
//! )
//! .from_block(19_000_000)
//! .to_block(19_100_000)
//! .build()?;
//! # Ok::<(), chainportal_core::PortalError>(())
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use chainportal_core::cursor::Cursor;
use chainportal_core::error::PortalError;
use chainportal_core::query::{QueryBuilder, RequestMerge};
use chainportal_core::range::Range;
use chainportal_core::rollback::RollbackStore;

use crate::client::PortalClient;
use crate::config::PortalSourceConfig;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::source::{PortalSource, SourceParts};
use crate::transport::{HttpTransport, Transport};

/// Fluent builder for [`PortalSource`]. Validation happens in [`build`](Self::build).
pub struct PortalSourceBuilder<R> {
    config: PortalSourceConfig,
    query: QueryBuilder<R>,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn RollbackStore>>,
    resume: Option<Cursor>,
}

impl<R> PortalSourceBuilder<R>
where
    R: RequestMerge + Clone + Default + Serialize + Send + Sync + 'static,
{
    pub fn new(url: impl Into<String>, query: QueryBuilder<R>) -> Self {
        Self::from_config(
            PortalSourceConfig {
                url: url.into(),
                ..Default::default()
            },
            query,
        )
    }

    pub fn from_config(config: PortalSourceConfig, query: QueryBuilder<R>) -> Self {
        Self {
            config,
            query,
            transport: None,
            store: None,
            resume: None,
        }
    }

    /// Set the first block to stream.
    pub fn from_block(mut self, block: u64) -> Self {
        self.config.from_block = block;
        self
    }

    /// Set the last block (for bounded streams).
    pub fn to_block(mut self, block: u64) -> Self {
        self.config.to_block = Some(block);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    /// Ordered delays between retries; the last one repeats.
    pub fn backoff(mut self, schedule: &[Duration]) -> Self {
        self.config.retry.backoff_ms = schedule.iter().map(|d| d.as_millis() as u64).collect();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Wait between polls when the portal has nothing new.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Number of recent cursors kept in memory for fork resolution.
    pub fn rollback_window(mut self, size: usize) -> Self {
        self.config.rollback_window = size;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.config.progress_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Stream from the finalized endpoint only.
    pub fn finalized_only(mut self, yes: bool) -> Self {
        self.config.finalized_only = yes;
        self
    }

    /// Replace the HTTP transport (tests, proxies).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Durable rollback history consulted when the in-memory window has no fork point.
    pub fn rollback_store(mut self, store: Arc<dyn RollbackStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Continue after a previously committed cursor.
    pub fn resume_from(mut self, cursor: Cursor) -> Self {
        self.resume = Some(cursor);
        self
    }

    pub fn query_mut(&mut self) -> &mut QueryBuilder<R> {
        &mut self.query
    }

    pub fn config(&self) -> &PortalSourceConfig {
        &self.config
    }

    /// Validate the configuration and assemble the source.
    pub fn build(self) -> Result<PortalSource<R>, PortalError> {
        let url = self.config.validate()?;
        let window = Range::new(self.config.from_block, self.config.to_block)?;
        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(self.config.request_timeout())?),
        };
        let client = PortalClient::new(url, transport, RetryPolicy::new(self.config.retry.clone()));

        tracing::debug!(
            url = %client.url(),
            from = window.from,
            to = ?window.to,
            finalized_only = self.config.finalized_only,
            "portal source configured"
        );

        Ok(PortalSource::from_parts(SourceParts {
            client,
            query: self.query,
            window,
            finalized_only: self.config.finalized_only,
            poll_interval: self.config.poll_interval(),
            rollback_window: self.config.rollback_window,
            progress_interval: self.config.progress_interval(),
            store: self.store,
            resume: self.resume,
        }))
    }
}
