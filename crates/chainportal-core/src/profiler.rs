//! Lightweight timing spans attached to each batch context.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// One finished span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRecord {
    /// Slash-separated path, e.g. `"transform/erc20"`.
    pub path: String,
    pub elapsed: Duration,
}

/// Collects spans for one batch. Cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    prefix: String,
    records: Option<Arc<Mutex<Vec<SpanRecord>>>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            records: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// A profiler that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.records.is_some()
    }

    /// Open a span; it is recorded when ended or dropped.
    pub fn start(&self, name: &str) -> ProfilerSpan {
        let path = if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        };
        ProfilerSpan {
            profiler: Profiler {
                prefix: path,
                records: self.records.clone(),
            },
            started: Instant::now(),
            done: false,
        }
    }

    /// Finished spans in completion order.
    pub fn records(&self) -> Vec<SpanRecord> {
        match &self.records {
            Some(r) => lock(r).clone(),
            None => vec![],
        }
    }
}

fn lock(records: &Mutex<Vec<SpanRecord>>) -> MutexGuard<'_, Vec<SpanRecord>> {
    records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An open span. Child spans nest under its path.
#[derive(Debug)]
pub struct ProfilerSpan {
    profiler: Profiler,
    started: Instant,
    done: bool,
}

impl ProfilerSpan {
    /// Open a nested span.
    pub fn start(&self, name: &str) -> ProfilerSpan {
        self.profiler.start(name)
    }

    /// Profiler scoped to this span, for handing to callees.
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Close the span and return its duration.
    pub fn end(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.done {
            self.done = true;
            if let Some(records) = &self.profiler.records {
                lock(records).push(SpanRecord {
                    path: self.profiler.prefix.clone(),
                    elapsed,
                });
            }
        }
        elapsed
    }
}

impl Drop for ProfilerSpan {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_spans_record_paths() {
        let p = Profiler::new();
        let outer = p.start("transform");
        let inner = outer.start("erc20");
        inner.end();
        outer.end();

        let paths: Vec<_> = p.records().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["transform/erc20", "transform"]);
    }

    #[test]
    fn dropped_span_is_recorded_once() {
        let p = Profiler::new();
        {
            let _span = p.start("fetch");
        }
        assert_eq!(p.records().len(), 1);
    }

    #[test]
    fn disabled_profiler_records_nothing() {
        let p = Profiler::disabled();
        p.start("fetch").end();
        assert!(!p.is_enabled());
        assert!(p.records().is_empty());
    }
}
