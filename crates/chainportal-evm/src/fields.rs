//! EVM field selection.
//!
//! The portal only returns fields that are explicitly selected. Selections
//! from several decoders are deep-merged by the query builder.

use serde_json::{Map, Value};

use chainportal_core::query::QueryBuilder;

use crate::request::EvmRequest;

/// Query `type` tag for EVM datasets.
pub const EVM_KIND: &str = "evm";

/// Header fields every source relies on for cursors and fork detection.
pub const BLOCK_HEADER_FIELDS: &[&str] = &["number", "hash", "parentHash", "timestamp"];

pub const LOG_FIELDS: &[&str] = &[
    "logIndex",
    "transactionIndex",
    "transactionHash",
    "address",
    "data",
    "topics",
];

pub const TRANSACTION_FIELDS: &[&str] = &[
    "transactionIndex",
    "hash",
    "from",
    "to",
    "input",
    "value",
    "status",
];

/// Builder for the `fields` object of an EVM query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvmFields {
    sections: Map<String, Value>,
}

impl EvmFields {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(mut self, section: &str, names: &[&str]) -> Self {
        let entry = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            for name in names {
                map.insert((*name).to_string(), Value::Bool(true));
            }
        }
        self
    }

    pub fn block(self, names: &[&str]) -> Self {
        self.select("block", names)
    }

    pub fn log(self, names: &[&str]) -> Self {
        self.select("log", names)
    }

    pub fn transaction(self, names: &[&str]) -> Self {
        self.select("transaction", names)
    }

    pub fn trace(self, names: &[&str]) -> Self {
        self.select("trace", names)
    }

    pub fn state_diff(self, names: &[&str]) -> Self {
        self.select("stateDiff", names)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.sections)
    }
}

/// An EVM query builder with the block header fields already selected.
pub fn evm_query() -> QueryBuilder<EvmRequest> {
    let mut query = QueryBuilder::new(EVM_KIND);
    query.add_fields(EvmFields::new().block(BLOCK_HEADER_FIELDS).into_value());
    query
}
