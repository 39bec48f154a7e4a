//! chainportal-core: protocol-agnostic building blocks for portal ingestion.
//!
//! # Architecture
//!
//! ```text
//! Decoder(s) ──query()──▶ QueryBuilder ──calculate_ranges()──▶ [RangedRequest]
//!                              │                                     │
//!                        range algebra                        portal source
//!                   (merge / bound / subtract)             (chainportal-source)
//!                                                                    │
//!                          fork resolver ◀── 409 previousBlocks ─────┤
//!                   (RollbackWindow, RollbackStore)                  ▼
//!                                                      Batch ──transform()──▶ Output
//! ```

pub mod cursor;
pub mod decoder;
pub mod error;
pub mod fork;
pub mod profiler;
pub mod query;
pub mod range;
pub mod rollback;
pub mod types;

pub use cursor::Cursor;
pub use decoder::{
    BatchContext, BoxDecoder, Composite, Decoder, DecoderExt, FnDecoder, MapOutput, StartContext,
};
pub use error::PortalError;
pub use fork::{find_fork_point, find_fork_point_in_stream, resolve_in_record, ForkEvent};
pub use profiler::{Profiler, ProfilerSpan, SpanRecord};
pub use query::{merge_fields, CalculatedRanges, FromBlock, HeadProvider, QueryBuilder, RequestMerge};
pub use range::{bound, intersect, merge_ranged, subtract, Range, RangedRequest};
pub use rollback::{MemoryRollbackStore, RollbackRecord, RollbackStore, RollbackWindow};
pub use types::{Batch, BatchMeta, Block, BlockHeader, HeadInfo, ProgressSnapshot};
