//! Query builder.
//!
//! Accumulates field selections and ranged requests from any number of
//! decoders and turns them into the minimal set of portal queries.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cursor::Cursor;
use crate::error::PortalError;
use crate::range::{bound, merge_ranged, Range, RangedRequest};

/// Associative combination of two protocol payloads covering the same blocks.
///
/// For most protocols this concatenates the per-kind filter lists.
pub trait RequestMerge {
    fn merge(&self, other: &Self) -> Self;
}

/// Source of the remote chain head, used to resolve [`FromBlock::Latest`].
#[async_trait]
pub trait HeadProvider: Send + Sync {
    async fn head(&self) -> Result<Option<Cursor>, PortalError>;
}

/// Start of a declared range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromBlock {
    Number(u64),
    /// Whatever the portal reports as its head when ranges are calculated.
    Latest,
}

impl From<u64> for FromBlock {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

#[derive(Debug, Clone)]
struct DeclaredRequest<R> {
    from: FromBlock,
    to: Option<u64>,
    request: R,
}

/// Output of [`QueryBuilder::calculate_ranges`].
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatedRanges<R> {
    /// Merged partition of every declared request.
    pub raw: Vec<RangedRequest<R>>,
    /// `raw` clipped to the processing window; requests are driven from this.
    pub bounded: Vec<RangedRequest<R>>,
}

/// Per-protocol accumulator of query requirements.
#[derive(Debug, Clone)]
pub struct QueryBuilder<R> {
    kind: String,
    fields: Value,
    requests: Vec<DeclaredRequest<R>>,
}

impl<R> QueryBuilder<R>
where
    R: RequestMerge + Clone + Default + Serialize,
{
    /// Create a builder for a protocol (`"evm"`, `"solana"`, …).
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Value::Object(Map::new()),
            requests: vec![],
        }
    }

    /// Protocol tag sent as the query `type`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Merged field selection so far.
    pub fn fields(&self) -> &Value {
        &self.fields
    }

    /// Number of declared ranged requests.
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Deep-union `fields` into the selection.
    pub fn add_fields(&mut self, fields: Value) -> &mut Self {
        merge_fields(&mut self.fields, fields);
        self
    }

    /// Declare a request over `range`.
    ///
    /// A range ending below its start is rejected here rather than at
    /// stream time.
    pub fn add_request(&mut self, range: Range, request: R) -> Result<&mut Self, PortalError> {
        let range = Range::new(range.from, range.to)?;
        self.requests.push(DeclaredRequest {
            from: FromBlock::Number(range.from),
            to: range.to,
            request,
        });
        Ok(self)
    }

    /// Declare a request that starts at the portal head, whatever it is
    /// when ranges are next calculated.
    pub fn add_latest_request(&mut self, to: Option<u64>, request: R) -> &mut Self {
        self.requests.push(DeclaredRequest {
            from: FromBlock::Latest,
            to,
            request,
        });
        self
    }

    /// Fold another builder (e.g. a decoder's declarations) into this one.
    pub fn merge(&mut self, other: QueryBuilder<R>) -> Result<&mut Self, PortalError> {
        if other.kind != self.kind {
            return Err(PortalError::Config(format!(
                "cannot merge '{}' query into '{}' query",
                other.kind, self.kind
            )));
        }
        merge_fields(&mut self.fields, other.fields);
        self.requests.extend(other.requests);
        Ok(self)
    }

    /// Resolve `latest`, merge overlapping requests and clip them to `window`.
    ///
    /// The head is fetched at most once, and only when some request uses
    /// [`FromBlock::Latest`]. With no requests at all a default request over
    /// the whole window is synthesised so block headers still stream.
    pub async fn calculate_ranges(
        &self,
        window: Option<&Range>,
        head: &dyn HeadProvider,
    ) -> Result<CalculatedRanges<R>, PortalError> {
        let mut latest: Option<u64> = None;
        let mut resolved = Vec::with_capacity(self.requests.len());

        for declared in &self.requests {
            let from = match declared.from {
                FromBlock::Number(n) => n,
                FromBlock::Latest => match latest {
                    Some(n) => n,
                    None => {
                        let head_number = head.head().await?.map_or(0, |c| c.number);
                        let n = match window {
                            Some(w) => head_number.max(w.from),
                            None => head_number,
                        };
                        tracing::debug!(head = head_number, latest = n, "resolved latest block");
                        latest = Some(n);
                        n
                    }
                },
            };
            match Range::new(from, declared.to) {
                Ok(range) => resolved.push(RangedRequest::new(range, declared.request.clone())),
                Err(_) => {
                    tracing::warn!(
                        from,
                        to = ?declared.to,
                        "dropping request whose end lies below the resolved start"
                    );
                }
            }
        }

        let mut raw = merge_ranged(resolved, R::merge);
        if raw.is_empty() {
            let range = window.copied().unwrap_or(Range::open(0));
            raw.push(RangedRequest::new(range, R::default()));
        }

        let bounded = match window {
            Some(w) => bound(&raw, w),
            None => raw.clone(),
        };
        Ok(CalculatedRanges { raw, bounded })
    }

    /// Render the JSON body for one portal stream request.
    pub fn build_query(
        &self,
        ranged: &RangedRequest<R>,
        parent_block_hash: Option<&str>,
    ) -> Result<Value, PortalError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a, R> {
            #[serde(rename = "type")]
            kind: &'a str,
            from_block: u64,
            #[serde(skip_serializing_if = "Option::is_none")]
            to_block: Option<u64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            parent_block_hash: Option<&'a str>,
            fields: &'a Value,
            #[serde(flatten)]
            request: &'a R,
        }

        let body = Body {
            kind: &self.kind,
            from_block: ranged.range.from,
            to_block: ranged.range.to,
            parent_block_hash,
            fields: &self.fields,
            request: &ranged.request,
        };
        Ok(serde_json::to_value(body)?)
    }
}

/// Deep union of two field selections.
///
/// Objects merge key by key, `true` wins over `false`, and any other value
/// from `incoming` replaces what was there.
pub fn merge_fields(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(t), Value::Object(i)) => {
            for (key, value) in i {
                match t.get_mut(&key) {
                    Some(existing) => merge_fields(existing, value),
                    None => {
                        t.insert(key, value);
                    }
                }
            }
        }
        (Value::Bool(t), Value::Bool(i)) => *t = *t || i,
        (t, i) => *t = i,
    }
}
