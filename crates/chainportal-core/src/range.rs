//! Block range algebra.
//!
//! Pure functions over inclusive block ranges, plus [`merge_ranged`], which
//! turns many overlapping `(range, payload)` requests into a sorted,
//! non-overlapping partition where each point carries the merge of every
//! payload that covered it.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::PortalError;

// ─── Range ────────────────────────────────────────────────────────────────────

/// Inclusive block range. `to = None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub from: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<u64>,
}

impl Range {
    /// Build a range, rejecting `to < from`.
    pub fn new(from: u64, to: Option<u64>) -> Result<Self, PortalError> {
        if let Some(to) = to {
            if to < from {
                return Err(PortalError::Config(format!(
                    "malformed range: to ({to}) is below from ({from})"
                )));
            }
        }
        Ok(Self { from, to })
    }

    /// `[from, to]`, rejecting `to < from`.
    pub fn bounded(from: u64, to: u64) -> Result<Self, PortalError> {
        Self::new(from, Some(to))
    }

    /// `[from, ∞)`.
    pub fn open(from: u64) -> Self {
        Self { from, to: None }
    }

    pub fn contains(&self, number: u64) -> bool {
        number >= self.from && self.to.map_or(true, |to| number <= to)
    }

    pub fn is_unbounded(&self) -> bool {
        self.to.is_none()
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, ∞)", self.from),
        }
    }
}

/// A range paired with an opaque protocol payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangedRequest<R> {
    pub range: Range,
    pub request: R,
}

impl<R> RangedRequest<R> {
    pub fn new(range: Range, request: R) -> Self {
        Self { range, request }
    }
}

// ─── Set operations ──────────────────────────────────────────────────────────

/// The overlapping part of `a` and `b`, if any.
pub fn intersect(a: &Range, b: &Range) -> Option<Range> {
    let from = a.from.max(b.from);
    let to = match (a.to, b.to) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    };
    match to {
        Some(to) if to < from => None,
        _ => Some(Range { from, to }),
    }
}

/// The parts of `a` outside `b`: zero, one or two ranges.
///
/// The trailing remainder keeps `a`'s upper bound, so it stays unbounded
/// when `a` was.
pub fn subtract(a: &Range, b: &Range) -> Vec<Range> {
    let Some(overlap) = intersect(a, b) else {
        return vec![*a];
    };

    let mut out = Vec::with_capacity(2);
    if a.from < overlap.from {
        out.push(Range {
            from: a.from,
            to: Some(overlap.from - 1),
        });
    }
    if let Some(end) = overlap.to {
        let tail_needed = a.to.map_or(true, |a_to| a_to > end);
        if tail_needed {
            if let Some(start) = end.checked_add(1) {
                out.push(Range { from: start, to: a.to });
            }
        }
    }
    out
}

/// Clip every request to `limit`, dropping those wholly outside it.
pub fn bound<R: Clone>(requests: &[RangedRequest<R>], limit: &Range) -> Vec<RangedRequest<R>> {
    requests
        .iter()
        .filter_map(|r| {
            intersect(&r.range, limit).map(|range| RangedRequest {
                range,
                request: r.request.clone(),
            })
        })
        .collect()
}

// ─── Merge sweep ─────────────────────────────────────────────────────────────

/// Heap entry ordered by range start, then insertion order.
struct Pending<R> {
    range: Range,
    seq: u64,
    request: R,
}

impl<R> PartialEq for Pending<R> {
    fn eq(&self, other: &Self) -> bool {
        self.range.from == other.range.from && self.seq == other.seq
    }
}

impl<R> Eq for Pending<R> {}

impl<R> PartialOrd for Pending<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R> Ord for Pending<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.range
            .from
            .cmp(&other.range.from)
            .then(self.seq.cmp(&other.seq))
    }
}

struct Sweep<R> {
    heap: BinaryHeap<Reverse<Pending<R>>>,
    seq: u64,
}

impl<R> Sweep<R> {
    fn push(&mut self, range: Range, request: R) {
        self.seq += 1;
        self.heap.push(Reverse(Pending {
            range,
            seq: self.seq,
            request,
        }));
    }

    fn pop(&mut self) -> Option<Pending<R>> {
        self.heap.pop().map(|Reverse(p)| p)
    }

    fn peek_range(&self) -> Option<Range> {
        self.heap.peek().map(|Reverse(p)| p.range)
    }
}

/// Merge overlapping requests into a sorted, non-overlapping partition.
///
/// Any block covered by `k` input requests appears exactly once in the
/// output, carrying the `k`-fold `merge` of their payloads. Payloads are
/// combined in sweep order, so `merge` should be associative.
pub fn merge_ranged<R, F>(requests: Vec<RangedRequest<R>>, merge: F) -> Vec<RangedRequest<R>>
where
    R: Clone,
    F: Fn(&R, &R) -> R,
{
    let mut sweep = Sweep {
        heap: BinaryHeap::with_capacity(requests.len()),
        seq: 0,
    };
    for r in requests {
        sweep.push(r.range, r.request);
    }

    let mut out: Vec<RangedRequest<R>> = Vec::new();
    while let Some(mut top) = sweep.pop() {
        loop {
            let overlap = sweep
                .peek_range()
                .and_then(|next| intersect(&top.range, &next));
            let Some(overlap) = overlap else {
                out.push(RangedRequest::new(top.range, top.request));
                break;
            };
            let Some(next) = sweep.pop() else {
                out.push(RangedRequest::new(top.range, top.request));
                break;
            };

            for rest in subtract(&top.range, &overlap) {
                sweep.push(rest, top.request.clone());
            }
            for rest in subtract(&next.range, &overlap) {
                sweep.push(rest, next.request.clone());
            }
            sweep.push(overlap, merge(&top.request, &next.request));

            match sweep.pop() {
                Some(p) => top = p,
                None => break,
            }
        }
    }
    out
}
