//! Live sequencing counters.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one reset period.
struct Epoch {
    started_at: DateTime<Utc>,
    sequenced: AtomicU64,
    skipped: AtomicU64,
}

impl Epoch {
    fn fresh() -> Arc<Self> {
        Arc::new(Self {
            started_at: Utc::now(),
            sequenced: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        })
    }
}

/// Thread-safe counters of sequenced and skipped change events.
///
/// Counters only grow between resets. [`Statistics::reset`] installs zeroed
/// counters and a new start time in one step, so a snapshot never mixes
/// values from two periods.
pub struct Statistics {
    epoch: RwLock<Arc<Epoch>>,
}

impl Statistics {
    /// Create zeroed counters starting now.
    pub fn new() -> Self {
        Self {
            epoch: RwLock::new(Epoch::fresh()),
        }
    }

    /// Zero the counters and restart the clock.
    pub fn reset(&self) {
        *self.epoch.write() = Epoch::fresh();
    }

    /// When the current period started.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.epoch.read().started_at
    }

    /// Events that ran at least one processor.
    pub fn sequenced(&self) -> u64 {
        self.epoch.read().sequenced.load(Ordering::Relaxed)
    }

    /// Events that matched nothing.
    pub fn skipped(&self) -> u64 {
        self.epoch.read().skipped.load(Ordering::Relaxed)
    }

    /// Consistent view of all counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let epoch = self.epoch.read();
        StatisticsSnapshot {
            start_time: epoch.started_at,
            sequenced: epoch.sequenced.load(Ordering::Relaxed),
            skipped: epoch.skipped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_sequenced(&self) {
        self.epoch.read().sequenced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.epoch.read().skipped.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.snapshot(), f)
    }
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Start of the counting period
    pub start_time: DateTime<Utc>,
    /// Events that ran at least one processor
    pub sequenced: u64,
    /// Events that matched nothing
    pub skipped: u64,
}

impl StatisticsSnapshot {
    /// Total events seen in the period.
    pub fn total(&self) -> u64 {
        self.sequenced + self.skipped
    }
}
