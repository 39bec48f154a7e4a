//! chainportal-source: retrying, fork-aware portal stream source.
//!
//! # Architecture
//!
//! ```text
//! PortalSourceBuilder → PortalSource ──▶ Pipeline<Decoder> ──▶ {data, ctx}
//!                          ├── PortalClient     (retry schedule, head, metadata, NDJSON)
//!                          │     └── Transport  (reqwest / scripted)
//!                          ├── RollbackWindow   (recent cursors for fork resolution)
//!                          ├── RollbackStore    (optional durable history)
//!                          └── ProgressTracker  (blocks/s, percent, ETA)
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod source;
pub mod transport;

#[cfg(test)]
mod testing;

pub use builder::PortalSourceBuilder;
pub use client::{DatasetMetadata, PortalClient, StreamResponse};
pub use config::PortalSourceConfig;
pub use pipeline::{ErrorAction, PipeEvent, PipeItem, Pipeline};
pub use progress::ProgressTracker;
pub use retry::{RetryConfig, RetryPolicy};
pub use source::{PortalSource, SourceEvent, StopHandle, StreamState};
pub use transport::{HttpTransport, RawResponse, Transport};
