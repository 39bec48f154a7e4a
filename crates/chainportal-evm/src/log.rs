//! Typed EVM logs and a ready-made log decoder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainportal_core::decoder::{BatchContext, Decoder};
use chainportal_core::error::PortalError;
use chainportal_core::query::QueryBuilder;
use chainportal_core::range::Range;
use chainportal_core::types::{Batch, Block};

use crate::fields::{EvmFields, LOG_FIELDS};
use crate::request::{EvmRequest, LogRequest};

/// One log as returned by the portal, tagged with its block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmLog {
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub block_hash: String,
    pub log_index: u32,
    #[serde(default)]
    pub transaction_index: u32,
    #[serde(default)]
    pub transaction_hash: String,
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

impl EvmLog {
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

/// Parse the `logs` of one block.
pub fn block_logs(block: &Block) -> Result<Vec<EvmLog>, PortalError> {
    block
        .items("logs")
        .iter()
        .map(|raw| {
            let mut log: EvmLog = serde_json::from_value(raw.clone()).map_err(|e| {
                PortalError::Protocol(format!(
                    "invalid log in block {}: {e}",
                    block.header.number
                ))
            })?;
            log.block_number = block.header.number;
            log.block_hash = block.header.hash.clone();
            Ok(log)
        })
        .collect()
}

/// Decoder yielding every matching log of a batch, in block order.
pub struct LogDecoder {
    id: String,
    range: Range,
    filter: LogRequest,
}

impl LogDecoder {
    pub fn new(filter: LogRequest) -> Self {
        Self {
            id: "logs".into(),
            range: Range::open(0),
            filter,
        }
    }

    pub fn named(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Restrict the decoder to a block range.
    pub fn range(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    fn matches(&self, log: &EvmLog) -> bool {
        let any = |wanted: &[String], got: Option<&str>| {
            wanted.is_empty() || got.is_some_and(|g| wanted.iter().any(|w| w.eq_ignore_ascii_case(g)))
        };
        any(&self.filter.address, Some(&log.address))
            && any(&self.filter.topic0, log.topics.first().map(String::as_str))
            && any(&self.filter.topic1, log.topics.get(1).map(String::as_str))
            && any(&self.filter.topic2, log.topics.get(2).map(String::as_str))
            && any(&self.filter.topic3, log.topics.get(3).map(String::as_str))
    }
}

#[async_trait]
impl Decoder<EvmRequest> for LogDecoder {
    type Output = Vec<EvmLog>;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn query(&self, query: &mut QueryBuilder<EvmRequest>) -> Result<(), PortalError> {
        query
            .add_fields(EvmFields::new().log(LOG_FIELDS).into_value())
            .add_request(self.range, EvmRequest::logs([self.filter.clone()]))?;
        Ok(())
    }

    async fn transform(&self, batch: &Batch, _ctx: &BatchContext) -> Result<Vec<EvmLog>, PortalError> {
        let mut out = Vec::new();
        for block in batch.blocks.iter().filter(|b| self.range.contains(b.header.number)) {
            out.extend(block_logs(block)?.into_iter().filter(|l| self.matches(l)));
        }
        Ok(out)
    }
}
