//! chainportal-evm: EVM payloads for portal queries.
//!
//! ```text
//! LogDecoder / custom decoders ──▶ evm_query() : QueryBuilder<EvmRequest>
//!                                        ├── EvmRequest  (logs, transactions, traces, state diffs)
//!                                        └── EvmFields   (block / log / transaction selection)
//! ```

pub mod fields;
pub mod log;
pub mod request;

pub use fields::{evm_query, EvmFields, EVM_KIND};
pub use log::{block_logs, EvmLog, LogDecoder};
pub use request::{EvmRequest, LogRequest, StateDiffRequest, TraceRequest, TransactionRequest};
