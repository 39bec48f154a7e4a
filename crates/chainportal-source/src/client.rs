//! Portal HTTP client.
//!
//! Features:
//! - Retry with an ordered backoff schedule for 5xx and network failures
//! - Head / finalized head / dataset metadata lookups
//! - Newline-delimited block stream parsing
//! - Conflict (409) bodies surfaced as `previousBlocks` for fork resolution

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use chainportal_core::cursor::Cursor;
use chainportal_core::error::PortalError;
use chainportal_core::query::HeadProvider;
use chainportal_core::types::{Block, HeadInfo};

use crate::retry::RetryPolicy;
use crate::transport::{RawResponse, Transport};

pub const HEADER_FINALIZED_NUMBER: &str = "x-sqd-finalized-head-number";
pub const HEADER_FINALIZED_HASH: &str = "x-sqd-finalized-head-hash";
pub const HEADER_HEAD_NUMBER: &str = "x-sqd-head-number";

const EXCERPT_LEN: usize = 512;

/// Dataset descriptor served at `/metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub dataset: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub real_time: bool,
    #[serde(default)]
    pub start_block: Option<u64>,
}

/// Outcome of one stream request, after retries.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamResponse {
    /// At least one block.
    Blocks {
        blocks: Vec<Block>,
        head: HeadInfo,
        bytes: usize,
        retries: u32,
    },
    /// Nothing past `fromBlock` yet (204 or empty 200).
    NoData { head: HeadInfo },
    /// The portal's chain diverges from the `parentBlockHash` we sent.
    Conflict { previous_blocks: Vec<Cursor> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictBody {
    previous_blocks: Vec<Cursor>,
}

/// Client for one portal dataset URL.
#[derive(Clone)]
pub struct PortalClient {
    base: Url,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl PortalClient {
    pub fn new(base: Url, transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self {
            base,
            transport,
            retry,
        }
    }

    pub fn url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
    }

    /// Issue a request, retrying 5xx and network failures per the schedule.
    /// Returns the first non-retryable response and the retries spent.
    async fn send(&self, path: &str, body: Option<&Value>) -> Result<(RawResponse, u32), PortalError> {
        let url = self.endpoint(path);
        let mut attempt = 0u32;
        loop {
            let outcome = match body {
                Some(b) => self.transport.post(&url, b).await,
                None => self.transport.get(&url).await,
            };
            let failure = match outcome {
                Ok(resp) if resp.status >= 500 => format!("HTTP {}", resp.status),
                Ok(resp) => return Ok((resp, attempt)),
                Err(e) if e.is_retryable() => match e {
                    PortalError::Network { reason, .. } => reason,
                    other => other.to_string(),
                },
                Err(e) => return Err(e),
            };

            attempt += 1;
            match self.retry.next_delay(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        status = %failure,
                        url = %url,
                        "retrying portal request"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(attempt, status = %failure, url = %url, "max retries exceeded");
                    return Err(PortalError::RetriesExhausted {
                        status: failure,
                        url,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    fn unexpected(&self, path: &str, resp: &RawResponse) -> PortalError {
        PortalError::UnexpectedStatus {
            status: resp.status,
            url: self.endpoint(path),
            body: resp.body_excerpt(EXCERPT_LEN),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, PortalError> {
        let (resp, _) = self.send(path, None).await?;
        if resp.status != 200 {
            return Err(self.unexpected(path, &resp));
        }
        serde_json::from_slice(&resp.body)
            .map_err(|e| PortalError::Protocol(format!("invalid /{path} response: {e}")))
    }

    /// Current chain tip, `None` if the dataset is empty.
    pub async fn head(&self) -> Result<Option<Cursor>, PortalError> {
        self.get_json("head").await
    }

    /// Latest finalized block, `None` if the dataset has none.
    pub async fn finalized_head(&self) -> Result<Option<Cursor>, PortalError> {
        self.get_json("finalized-head").await
    }

    pub async fn metadata(&self) -> Result<DatasetMetadata, PortalError> {
        self.get_json("metadata").await
    }

    /// POST one query to `/stream` (or `/finalized-stream`).
    pub async fn stream(&self, query: &Value, finalized_only: bool) -> Result<StreamResponse, PortalError> {
        let path = if finalized_only {
            "finalized-stream"
        } else {
            "stream"
        };
        let (resp, retries) = self.send(path, Some(query)).await?;
        let head = head_from_headers(&resp)?;

        match resp.status {
            200 => {
                let blocks = parse_blocks(&resp.body)?;
                if blocks.is_empty() {
                    return Ok(StreamResponse::NoData { head });
                }
                Ok(StreamResponse::Blocks {
                    blocks,
                    head,
                    bytes: resp.body.len(),
                    retries,
                })
            }
            204 => Ok(StreamResponse::NoData { head }),
            409 => {
                let body: ConflictBody = serde_json::from_slice(&resp.body).map_err(|e| {
                    PortalError::Protocol(format!("invalid conflict response: {e}"))
                })?;
                if body.previous_blocks.is_empty() {
                    return Err(PortalError::Protocol(
                        "conflict response without previousBlocks".into(),
                    ));
                }
                Ok(StreamResponse::Conflict {
                    previous_blocks: body.previous_blocks,
                })
            }
            _ => Err(self.unexpected(path, &resp)),
        }
    }
}

#[async_trait]
impl HeadProvider for PortalClient {
    async fn head(&self) -> Result<Option<Cursor>, PortalError> {
        PortalClient::head(self).await
    }
}

/// Read the `X-Sqd-*` head headers.
pub fn head_from_headers(resp: &RawResponse) -> Result<HeadInfo, PortalError> {
    let number = |name: &str| -> Result<Option<u64>, PortalError> {
        resp.header(name)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|e| PortalError::Protocol(format!("invalid {name} header '{v}': {e}")))
            })
            .transpose()
    };

    let finalized = match (number(HEADER_FINALIZED_NUMBER)?, resp.header(HEADER_FINALIZED_HASH)) {
        (Some(n), Some(hash)) => Some(Cursor::new(n, hash)),
        _ => None,
    };
    Ok(HeadInfo {
        finalized,
        latest: number(HEADER_HEAD_NUMBER)?,
    })
}

/// Parse a newline-delimited body into blocks. Blank lines are skipped.
pub fn parse_blocks(body: &[u8]) -> Result<Vec<Block>, PortalError> {
    body.split(|b| *b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
        .map(|(i, line)| {
            serde_json::from_slice::<Block>(line).map_err(|e| {
                PortalError::Protocol(format!("malformed block record on line {}: {e}", i + 1))
            })
        })
        .collect()
}
