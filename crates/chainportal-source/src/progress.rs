//! Throughput and completion tracking for one source.

use std::time::{Duration, Instant};

use chainportal_core::types::ProgressSnapshot;

/// Running counters, fed by the source loop after every response.
#[derive(Debug)]
pub struct ProgressTracker {
    start_block: u64,
    to_block: Option<u64>,
    started: Instant,
    last_log: Instant,
    log_interval: Duration,

    current: Option<u64>,
    head: Option<u64>,
    blocks: u64,
    bytes: u64,
    requests: u64,
}

impl ProgressTracker {
    pub fn new(start_block: u64, to_block: Option<u64>, log_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start_block,
            to_block,
            started: now,
            last_log: now,
            log_interval,
            current: None,
            head: None,
            blocks: 0,
            bytes: 0,
            requests: 0,
        }
    }

    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    pub fn record_batch(&mut self, last_block: u64, blocks: usize, bytes: usize) {
        self.current = Some(last_block);
        self.blocks += blocks as u64;
        self.bytes += bytes as u64;
    }

    pub fn record_head(&mut self, latest: Option<u64>) {
        if latest.is_some() {
            self.head = latest;
        }
    }

    /// Move `current` back after a fork.
    pub fn rewind(&mut self, block: u64) {
        self.current = Some(block);
    }

    fn target(&self) -> Option<u64> {
        match (self.to_block, self.head) {
            (Some(to), Some(head)) => Some(to.min(head.max(self.start_block))),
            (Some(to), None) => Some(to),
            (None, head) => head,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(self.started.elapsed())
    }

    fn snapshot_at(&self, elapsed: Duration) -> ProgressSnapshot {
        let target = self.target();
        let secs = elapsed.as_secs_f64();
        let blocks_per_sec = if secs > 0.0 {
            self.blocks as f64 / secs
        } else {
            0.0
        };

        let (percent, eta_secs) = match (self.current, target) {
            (Some(current), Some(target)) if target >= self.start_block => {
                let total = (target - self.start_block + 1) as f64;
                let done = current.saturating_sub(self.start_block) + 1;
                let percent = (done as f64 / total * 100.0).min(100.0);
                let remaining = target.saturating_sub(current);
                let eta = (blocks_per_sec > 0.0)
                    .then(|| (remaining as f64 / blocks_per_sec).ceil() as u64);
                (Some(percent), eta)
            }
            _ => (None, None),
        };

        ProgressSnapshot {
            current: self.current,
            target,
            blocks_processed: self.blocks,
            bytes_downloaded: self.bytes,
            requests: self.requests,
            blocks_per_sec,
            percent,
            eta_secs,
        }
    }

    /// Emit an `info!` progress line at most once per interval.
    pub fn maybe_log(&mut self) {
        if self.last_log.elapsed() < self.log_interval {
            return;
        }
        self.last_log = Instant::now();
        let s = self.snapshot();
        tracing::info!(
            current = ?s.current,
            target = ?s.target,
            blocks = s.blocks_processed,
            bytes = s.bytes_downloaded,
            blocks_per_sec = %format!("{:.1}", s.blocks_per_sec),
            percent = ?s.percent.map(|p| (p * 10.0).round() / 10.0),
            eta_secs = ?s.eta_secs,
            "portal progress"
        );
    }
}
