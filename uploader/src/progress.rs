//! Progress accounting for single transfers and whole batches.
//!
//! [`ByteProgress`] turns raw byte counts into per-file fractions for the
//! transport. [`ProgressState`] folds per-file fractions into the batch
//! percentage shown to the user:
//!
//! ```text
//! percent = round(100 * (completed + fraction) / total)
//! ```
//!
//! Both only ever move forward; a stale or out-of-order tick is dropped
//! rather than reported.

use std::sync::Arc;

/// Per-file progress callback, called with a fraction in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Batch progress callback, called with a percentage in `[0, 100]`.
///
/// The coordinator calls it while holding its progress lock, so it must
/// return without waiting on the coordinator.
pub type PercentFn = Arc<dyn Fn(u8) + Send + Sync>;

/// A callback that ignores every tick.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

// =============================================================================
// Byte progress (transport side)
// =============================================================================

/// Byte counter for one transfer.
#[derive(Debug, Clone)]
pub struct ByteProgress {
    total: u64,
    sent: u64,
    last: f64,
    finished: bool,
}

impl ByteProgress {
    /// `total` must be non-zero; the transport rejects empty sources first.
    pub fn new(total: u64) -> Self {
        Self {
            total: total.max(1),
            sent: 0,
            last: 0.0,
            finished: false,
        }
    }

    /// Record `n` more bytes; returns the new fraction if it moved forward.
    ///
    /// Stays below 1.0 so the completion tick is reserved for [`finish`].
    ///
    /// [`finish`]: ByteProgress::finish
    pub fn advance(&mut self, n: u64) -> Option<f64> {
        self.sent = self.sent.saturating_add(n).min(self.total);
        let fraction = (self.sent as f64 / self.total as f64).min(1.0);
        let fraction = if fraction >= 1.0 && !self.finished {
            // body fully written, server has not answered yet
            next_below_one(self.last)
        } else {
            fraction
        };
        if fraction > self.last {
            self.last = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    /// The final 1.0 tick, returned at most once.
    pub fn finish(&mut self) -> Option<f64> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.sent = self.total;
        self.last = 1.0;
        Some(1.0)
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

fn next_below_one(last: f64) -> f64 {
    const ALMOST: f64 = 0.999;
    if last < ALMOST {
        ALMOST
    } else {
        last
    }
}

// =============================================================================
// Batch progress (coordinator side)
// =============================================================================

/// Progress of one batch run.
///
/// Created at batch start and discarded at batch end; only the coordinator
/// mutates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    pub completed_count: usize,
    pub total_count: usize,
    pub current_file_fraction: f64,
    last_percent: Option<u8>,
}

impl ProgressState {
    pub fn new(total_count: usize) -> Self {
        Self {
            completed_count: 0,
            total_count,
            current_file_fraction: 0.0,
            last_percent: None,
        }
    }

    /// Aggregate percentage, `0` for an empty batch.
    pub fn percent(&self) -> u8 {
        if self.total_count == 0 {
            return 0;
        }
        let done = self.completed_count as f64 + self.current_file_fraction;
        let pct = (100.0 * done / self.total_count as f64).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Apply a per-file fraction for the current file.
    ///
    /// Returns the percentage to report, or `None` when it did not change.
    pub fn update_fraction(&mut self, fraction: f64) -> Option<u8> {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        if fraction > self.current_file_fraction {
            self.current_file_fraction = fraction;
        }
        self.report()
    }

    /// Mark the current file done and move to the next one.
    pub fn complete_file(&mut self) -> Option<u8> {
        if self.completed_count < self.total_count {
            self.completed_count += 1;
        }
        self.current_file_fraction = 0.0;
        self.report()
    }

    /// The percentage, if it moved forward since the last report.
    fn report(&mut self) -> Option<u8> {
        let pct = self.percent();
        match self.last_percent {
            Some(last) if pct <= last => None,
            _ => {
                self.last_percent = Some(pct);
                Some(pct)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_count > 0 && self.completed_count == self.total_count
    }
}

/// Aggregate over tasks running side by side: one fraction per task.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelProgress {
    fractions: Vec<f64>,
    last_percent: Option<u8>,
}

impl ParallelProgress {
    pub fn new(total_count: usize) -> Self {
        Self {
            fractions: vec![0.0; total_count],
            last_percent: None,
        }
    }

    pub fn percent(&self) -> u8 {
        if self.fractions.is_empty() {
            return 0;
        }
        let done: f64 = self.fractions.iter().sum();
        (100.0 * done / self.fractions.len() as f64)
            .round()
            .clamp(0.0, 100.0) as u8
    }

    /// Raise the fraction of task `index`; returns the new percent if it moved.
    pub fn update(&mut self, index: usize, fraction: f64) -> Option<u8> {
        let slot = self.fractions.get_mut(index)?;
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        if fraction > *slot {
            *slot = fraction;
        }
        let pct = self.percent();
        match self.last_percent {
            Some(last) if pct <= last => None,
            _ => {
                self.last_percent = Some(pct);
                Some(pct)
            }
        }
    }
}
