//! EVM data requests: the protocol payload carried by every ranged request.

use serde::{Deserialize, Serialize};

use chainportal_core::query::RequestMerge;

/// Filter lists for one block range. Merging concatenates per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<TransactionRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<TraceRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_diffs: Vec<StateDiffRequest>,
}

impl EvmRequest {
    pub fn logs(logs: impl IntoIterator<Item = LogRequest>) -> Self {
        Self {
            logs: logs.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn transactions(txs: impl IntoIterator<Item = TransactionRequest>) -> Self {
        Self {
            transactions: txs.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
            && self.transactions.is_empty()
            && self.traces.is_empty()
            && self.state_diffs.is_empty()
    }
}

impl RequestMerge for EvmRequest {
    fn merge(&self, other: &Self) -> Self {
        fn concat<T: Clone>(a: &[T], b: &[T]) -> Vec<T> {
            a.iter().chain(b).cloned().collect()
        }
        Self {
            logs: concat(&self.logs, &other.logs),
            transactions: concat(&self.transactions, &other.transactions),
            traces: concat(&self.traces, &other.traces),
            state_diffs: concat(&self.state_diffs, &other.state_diffs),
        }
    }
}

// ─── Logs ─────────────────────────────────────────────────────────────────────

/// Which logs to return. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topic0: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topic1: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topic2: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topic3: Vec<String>,
    /// Also return the transaction that emitted each log.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub transaction: bool,
}

impl LogRequest {
    /// Logs emitted by one contract address.
    pub fn address(addr: impl Into<String>) -> Self {
        Self {
            address: vec![lower(addr)],
            ..Default::default()
        }
    }

    /// Add a topic0 filter (event signature hash).
    pub fn topic0(mut self, topic: impl Into<String>) -> Self {
        self.topic0.push(lower(topic));
        self
    }

    pub fn topic1(mut self, topic: impl Into<String>) -> Self {
        self.topic1.push(lower(topic));
        self
    }

    pub fn topic2(mut self, topic: impl Into<String>) -> Self {
        self.topic2.push(lower(topic));
        self
    }

    pub fn with_transaction(mut self) -> Self {
        self.transaction = true;
        self
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    /// First four bytes of calldata (`0x` + 8 hex chars).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sighash: Vec<String>,
    /// Also return the logs each transaction emitted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub logs: bool,
}

impl TransactionRequest {
    pub fn to(addr: impl Into<String>) -> Self {
        Self {
            to: vec![lower(addr)],
            ..Default::default()
        }
    }

    pub fn sighash(mut self, sighash: impl Into<String>) -> Self {
        self.sighash.push(lower(sighash));
        self
    }

    pub fn with_logs(mut self) -> Self {
        self.logs = true;
        self
    }
}

// ─── Traces / state diffs ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRequest {
    /// `call`, `create`, `suicide`, `reward`.
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub kind: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_sighash: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDiffRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key: Vec<String>,
    /// `=`, `+`, `*`, `-`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kind: Vec<String>,
}

/// Portal filters compare lowercase hex.
fn lower(s: impl Into<String>) -> String {
    s.into().to_ascii_lowercase()
}
