//! Lock-free aggregate counters across sync cycles
//!
//! The only state that outlives a cycle. Updated once per cycle from the
//! scheduler and read by the reporter and the Prometheus endpoint.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only, except `consecutive_failed_cycles` which the scheduler reads
//! back right after writing it from the same task.

use crate::domain::types::CycleSummary;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Cycle duration bucket boundaries (milliseconds)
/// Buckets: ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, ≤30000, ≤60000, ≤120000, >120000 ms
const DURATION_BOUNDS_MS: [u64; 10] = [100, 250, 500, 1000, 2500, 5000, 10000, 30000, 60000, 120000];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a duration using binary search
#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    DURATION_BOUNDS_MS.partition_point(|&bound| bound < duration_ms)
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile).ceil() as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 250, 500, 1000, 2500, 5000, 10000, 30000, 60000, 120000, 240000];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

pub struct Metrics {
    cycles_total: AtomicU64,
    cycles_aborted: AtomicU64,
    /// Aborted cycles since the last successful one
    consecutive_failed_cycles: AtomicU64,
    mappings_resolved_total: AtomicU64,
    records_rejected_total: AtomicU64,
    devices_checked_total: AtomicU64,
    unmatched_total: AtomicU64,
    secondary_fetch_failures_total: AtomicU64,
    discrepancies_total: AtomicU64,
    updates_succeeded_total: AtomicU64,
    updates_failed_total: AtomicU64,
    updates_skipped_total: AtomicU64,
    cycle_duration_buckets: [AtomicU64; NUM_BUCKETS],
    cycle_duration_sum_ms: AtomicU64,
    /// Unix time (seconds) the last cycle finished, 0 before the first
    last_cycle_finished_unix: AtomicU64,
    /// Devices checked in the most recent completed cycle (gauge)
    last_cycle_devices_checked: AtomicU64,
    /// Error of the most recent cycle, cleared on success
    last_cycle_error: parking_lot::Mutex<Option<String>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_aborted: AtomicU64::new(0),
            consecutive_failed_cycles: AtomicU64::new(0),
            mappings_resolved_total: AtomicU64::new(0),
            records_rejected_total: AtomicU64::new(0),
            devices_checked_total: AtomicU64::new(0),
            unmatched_total: AtomicU64::new(0),
            secondary_fetch_failures_total: AtomicU64::new(0),
            discrepancies_total: AtomicU64::new(0),
            updates_succeeded_total: AtomicU64::new(0),
            updates_failed_total: AtomicU64::new(0),
            updates_skipped_total: AtomicU64::new(0),
            cycle_duration_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            cycle_duration_sum_ms: AtomicU64::new(0),
            last_cycle_finished_unix: AtomicU64::new(0),
            last_cycle_devices_checked: AtomicU64::new(0),
            last_cycle_error: parking_lot::Mutex::new(None),
        }
    }

    /// Fold one cycle's summary into the aggregate counters.
    /// Returns the number of consecutive aborted cycles after this one.
    pub fn record_cycle(&self, summary: &CycleSummary) -> u64 {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);

        let duration_ms = summary.duration_ms();
        self.cycle_duration_buckets[bucket_index(duration_ms)].fetch_add(1, Ordering::Relaxed);
        self.cycle_duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.last_cycle_finished_unix
            .store(summary.finished_at.timestamp().max(0) as u64, Ordering::Relaxed);

        *self.last_cycle_error.lock() = summary.error.clone();

        if summary.aborted {
            self.cycles_aborted.fetch_add(1, Ordering::Relaxed);
            return self.consecutive_failed_cycles.fetch_add(1, Ordering::Relaxed) + 1;
        }

        self.consecutive_failed_cycles.store(0, Ordering::Relaxed);
        self.last_cycle_devices_checked.store(summary.devices_checked as u64, Ordering::Relaxed);

        let add = |counter: &AtomicU64, value: usize| {
            counter.fetch_add(value as u64, Ordering::Relaxed);
        };
        add(&self.mappings_resolved_total, summary.mappings_resolved);
        add(&self.records_rejected_total, summary.records_rejected);
        add(&self.devices_checked_total, summary.devices_checked);
        add(&self.unmatched_total, summary.unmatched);
        add(&self.secondary_fetch_failures_total, summary.secondary_fetch_failures);
        add(&self.discrepancies_total, summary.discrepancies_found);
        add(&self.updates_succeeded_total, summary.updates_succeeded);
        add(&self.updates_failed_total, summary.updates_failed);
        add(&self.updates_skipped_total, summary.updates_skipped);
        0
    }

    #[inline]
    pub fn consecutive_failed_cycles(&self) -> u64 {
        self.consecutive_failed_cycles.load(Ordering::Relaxed)
    }

    pub fn last_cycle_error(&self) -> Option<String> {
        self.last_cycle_error.lock().clone()
    }

    #[inline]
    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters. Nothing is reset.
    pub fn report(&self) -> MetricsSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        let cycle_duration_buckets = load_buckets(&self.cycle_duration_buckets);
        let cycle_duration_sum_ms = load(&self.cycle_duration_sum_ms);
        let cycle_count: u64 = cycle_duration_buckets.iter().sum();
        let cycle_duration_avg_ms =
            if cycle_count > 0 { cycle_duration_sum_ms / cycle_count } else { 0 };

        MetricsSummary {
            cycles_total: load(&self.cycles_total),
            cycles_aborted: load(&self.cycles_aborted),
            consecutive_failed_cycles: load(&self.consecutive_failed_cycles),
            mappings_resolved_total: load(&self.mappings_resolved_total),
            records_rejected_total: load(&self.records_rejected_total),
            devices_checked_total: load(&self.devices_checked_total),
            unmatched_total: load(&self.unmatched_total),
            secondary_fetch_failures_total: load(&self.secondary_fetch_failures_total),
            discrepancies_total: load(&self.discrepancies_total),
            updates_succeeded_total: load(&self.updates_succeeded_total),
            updates_failed_total: load(&self.updates_failed_total),
            updates_skipped_total: load(&self.updates_skipped_total),
            cycle_duration_p50_ms: percentile_from_buckets(&cycle_duration_buckets, 0.50),
            cycle_duration_p99_ms: percentile_from_buckets(&cycle_duration_buckets, 0.99),
            cycle_duration_buckets,
            cycle_duration_sum_ms,
            cycle_duration_avg_ms,
            last_cycle_finished_unix: load(&self.last_cycle_finished_unix),
            last_cycle_devices_checked: load(&self.last_cycle_devices_checked),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_DURATION_BOUNDS_MS: [u64; 10] = DURATION_BOUNDS_MS;

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cycles_total: u64,
    pub cycles_aborted: u64,
    pub consecutive_failed_cycles: u64,
    pub mappings_resolved_total: u64,
    pub records_rejected_total: u64,
    pub devices_checked_total: u64,
    pub unmatched_total: u64,
    pub secondary_fetch_failures_total: u64,
    pub discrepancies_total: u64,
    pub updates_succeeded_total: u64,
    pub updates_failed_total: u64,
    pub updates_skipped_total: u64,
    /// Cycle duration histogram buckets
    /// Bounds: ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, ≤30000, ≤60000, ≤120000, >120000 ms
    pub cycle_duration_buckets: [u64; NUM_BUCKETS],
    pub cycle_duration_sum_ms: u64,
    pub cycle_duration_avg_ms: u64,
    pub cycle_duration_p50_ms: u64,
    pub cycle_duration_p99_ms: u64,
    pub last_cycle_finished_unix: u64,
    pub last_cycle_devices_checked: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles = %self.cycles_total,
            aborted = %self.cycles_aborted,
            consecutive_failures = %self.consecutive_failed_cycles,
            checked = %self.devices_checked_total,
            discrepancies = %self.discrepancies_total,
            updated = %self.updates_succeeded_total,
            update_failures = %self.updates_failed_total,
            fetch_failures = %self.secondary_fetch_failures_total,
            avg_cycle_ms = %self.cycle_duration_avg_ms,
            p99_cycle_ms = %self.cycle_duration_p99_ms,
            "metrics"
        );
    }
}
