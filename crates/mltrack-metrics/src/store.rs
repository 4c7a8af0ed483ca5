//! Bounded snapshot store with lifetime best-value tracking

use mltrack_core::{BestValues, MetricSnapshot};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

use crate::table::MetricsTable;

/// State guarded by the store lock. Every field changes together in `append`.
#[derive(Debug)]
struct StoreState {
    history: VecDeque<MetricSnapshot>,
    best: BestValues,
    total_appended: u64, // lifetime count, never capped
    max_epoch: Option<u64>,
}

/// Lifetime aggregates read together under one lock
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreTotals {
    pub best: BestValues,
    pub total_appended: u64,
    pub max_epoch: Option<u64>,
}

/// Thread-safe ring buffer of the most recent snapshots
///
/// Retains at most `capacity` snapshots (oldest evicted first). Best values,
/// the append counter and the max epoch cover every snapshot ever appended,
/// including evicted ones.
///
/// # Example
///
/// ```
/// use mltrack_core::MetricSnapshot;
/// use mltrack_metrics::MetricsStore;
///
/// let store = MetricsStore::new(2);
/// store.append(MetricSnapshot::new(0, 0, 0.1));
/// store.append(MetricSnapshot::new(0, 1, 0.5));
/// store.append(MetricSnapshot::new(0, 2, 0.9));
///
/// assert_eq!(store.len(), 2);
/// assert_eq!(store.best_values().best_loss.unwrap().value, 0.1);
/// ```
#[derive(Debug)]
pub struct MetricsStore {
    capacity: usize,
    state: Mutex<StoreState>,
}

impl MetricsStore {
    /// Create a store retaining `capacity` snapshots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(StoreState {
                history: VecDeque::with_capacity(capacity),
                best: BestValues::default(),
                total_appended: 0,
                max_epoch: None,
            }),
        }
    }

    // Every mutation is applied whole under the lock, so a poisoned guard
    // still holds a consistent state.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a snapshot and fold it into the aggregates atomically
    pub fn append(&self, snapshot: MetricSnapshot) {
        let mut state = self.lock();

        state.best.observe(&snapshot);
        state.total_appended += 1;
        state.max_epoch = Some(state.max_epoch.map_or(snapshot.epoch(), |e| e.max(snapshot.epoch())));

        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        trace!(
            "Appended snapshot epoch={} step={} (retained {})",
            snapshot.epoch(),
            snapshot.step(),
            state.history.len() + 1
        );
        state.history.push_back(snapshot);
    }

    /// The last `min(n, len)` snapshots, oldest first
    pub fn recent(&self, n: usize) -> Vec<MetricSnapshot> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Most recently appended snapshot still retained
    pub fn latest(&self) -> Option<MetricSnapshot> {
        self.lock().history.back().cloned()
    }

    /// All retained snapshots as table rows, in append order
    pub fn as_table(&self) -> MetricsTable {
        let snapshots: Vec<MetricSnapshot> = self.lock().history.iter().cloned().collect();
        MetricsTable::from_snapshots(&snapshots)
    }

    /// Copy of the lifetime best-value aggregate
    pub fn best_values(&self) -> BestValues {
        self.lock().best
    }

    /// Best values, append count and max epoch from one consistent state
    pub fn totals(&self) -> StoreTotals {
        let state = self.lock();
        StoreTotals {
            best: state.best,
            total_appended: state.total_appended,
            max_epoch: state.max_epoch,
        }
    }

    /// Snapshots appended since creation, including evicted ones
    pub fn total_appended(&self) -> u64 {
        self.lock().total_appended
    }

    /// Highest epoch ever appended
    pub fn max_epoch(&self) -> Option<u64> {
        self.lock().max_epoch
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new(1000)
    }
}
