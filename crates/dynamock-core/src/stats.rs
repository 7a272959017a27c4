//! Per-operation call counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use dynamock_model::Operation;

/// Counters shared by every table of a registry.
#[derive(Debug, Default)]
pub struct CallStats {
    calls: [AtomicU64; Operation::ALL.len()],
    batch_key_counts: Mutex<Vec<usize>>,
}

/// Point-in-time copy of [`CallStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Calls per operation name.
    pub calls: BTreeMap<String, u64>,
    /// Number of keys in each batch get call, in call order.
    pub batch_key_counts: Vec<usize>,
}

impl StatsSnapshot {
    /// Calls recorded for `op`.
    #[must_use]
    pub fn count(&self, op: Operation) -> u64 {
        self.calls.get(op.as_str()).copied().unwrap_or(0)
    }
}

impl CallStats {
    /// Zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one call of `op`.
    pub fn record(&self, op: Operation) {
        self.calls[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one batch get call with `keys` keys.
    pub fn record_batch(&self, keys: usize) {
        self.record(Operation::BatchGetItem);
        self.batch_key_counts.lock().push(keys);
    }

    /// Copies the current counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: Operation::ALL
                .iter()
                .map(|op| {
                    (
                        op.as_str().to_owned(),
                        self.calls[op.index()].load(Ordering::Relaxed),
                    )
                })
                .collect(),
            batch_key_counts: self.batch_key_counts.lock().clone(),
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in &self.calls {
            counter.store(0, Ordering::Relaxed);
        }
        self.batch_key_counts.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_count_calls_and_batches() {
        let stats = CallStats::new();
        stats.record(Operation::PutItem);
        stats.record(Operation::PutItem);
        stats.record_batch(7);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count(Operation::PutItem), 2);
        assert_eq!(snapshot.count(Operation::BatchGetItem), 1);
        assert_eq!(snapshot.count(Operation::Scan), 0);
        assert_eq!(snapshot.batch_key_counts, vec![7]);
    }

    #[test]
    fn test_should_reset() {
        let stats = CallStats::new();
        stats.record(Operation::Query);
        stats.record_batch(3);
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot {
            calls: Operation::ALL.iter().map(|op| (op.as_str().to_owned(), 0)).collect(),
            batch_key_counts: Vec::new(),
        });
    }
}
