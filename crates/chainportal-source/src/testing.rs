//! Scripted in-memory transport for driving the client and source in tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use chainportal_core::error::PortalError;

use crate::transport::{RawResponse, Transport};

enum Step {
    Respond(RawResponse),
    Fail(PortalError),
    /// Never completes; used to observe cancellation of an in-flight request.
    Hang,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Option<Value>,
}

/// Replays queued responses in order; answers 204 once the script runs out.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn enqueue(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn push(&self, resp: RawResponse) {
        self.enqueue(Step::Respond(resp));
    }

    pub fn push_error(&self, err: PortalError) {
        self.enqueue(Step::Fail(err));
    }

    pub fn push_hang(&self) {
        self.enqueue(Step::Hang);
    }

    /// 200 with one NDJSON line per `(number, hash, parent_hash)`.
    pub fn push_blocks(&self, blocks: &[(u64, &str, &str)]) {
        let body: String = blocks
            .iter()
            .map(|(n, hash, parent)| {
                format!(
                    "{}\n",
                    json!({"header": {"number": n, "hash": hash, "parentHash": parent}})
                )
            })
            .collect();
        self.push(RawResponse::new(200).with_body(body));
    }

    /// 409 carrying `previousBlocks`.
    pub fn push_conflict(&self, previous: &[(u64, &str)]) {
        let blocks: Vec<Value> = previous
            .iter()
            .map(|(n, hash)| json!({"number": n, "hash": hash}))
            .collect();
        self.push(
            RawResponse::new(409).with_body(json!({ "previousBlocks": blocks }).to_string()),
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    /// Bodies of every POST, in order.
    pub fn stream_bodies(&self) -> Vec<Value> {
        self.requests().into_iter().filter_map(|r| r.body).collect()
    }

    async fn respond(&self, method: &'static str, url: &str, body: Option<Value>) -> Result<RawResponse, PortalError> {
        self.log.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(resp)) => Ok(resp),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => futures::future::pending().await,
            None => Ok(RawResponse::new(204)),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, PortalError> {
        self.respond("GET", url, None).await
    }

    async fn post(&self, url: &str, body: &Value) -> Result<RawResponse, PortalError> {
        self.respond("POST", url, Some(body.clone())).await
    }
}
