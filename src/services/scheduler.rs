//! Sync scheduler - drives reconciliation cycles on a fixed interval
//!
//! State machine: Idle -> Running -> Sleeping -> Running -> ... -> Stopped.
//! The current state is published on a watch channel. Stopping is
//! cooperative: the flag is checked before each cycle and while sleeping, and
//! an in-flight cycle always runs to completion.
//!
//! One cycle: authenticate -> resolve -> fetch authoritative -> fetch
//! secondary -> detect -> correct. Failures in the first three stages abort
//! the cycle; per-device failures never do.

use crate::domain::error::{CycleError, SchedulerError};
use crate::domain::types::{Coordinates, CycleSummary, DeviceMapping, UpdateStatus};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::platform::{AuthoritativePlatform, SecondaryPlatform};
use crate::services::detector::{detect, DEFAULT_TOLERANCE};
use crate::services::fetcher::{fetch_authoritative_locations, fetch_secondary_locations};
use crate::services::resolver::resolve_mappings;
use crate::services::updater::Updater;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Scheduler's view of the configuration
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Sleep between the end of one cycle and the start of the next
    pub interval: Duration,
    pub tolerance: f64,
    pub max_concurrency: usize,
    pub dry_run: bool,
    /// AddInData type tag of mapping records
    pub mapping_record_type: String,
    /// Consecutive aborted cycles before alerting (0 disables)
    pub alert_after_failed_cycles: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            tolerance: DEFAULT_TOLERANCE,
            max_concurrency: 8,
            dry_run: false,
            mapping_record_type: "ri-device".to_string(),
            alert_after_failed_cycles: 3,
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.sync_interval_secs()),
            tolerance: config.tolerance(),
            max_concurrency: config.max_concurrency(),
            dry_run: config.dry_run(),
            mapping_record_type: config.addin_type().to_string(),
            alert_after_failed_cycles: config.alert_after_failed_cycles(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    Stopped,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escalate repeated aborts (cold path)
#[cold]
fn log_platform_unavailable(consecutive: u64, error: &str) {
    error!(
        consecutive_failed_cycles = %consecutive,
        error = %error,
        "authoritative_platform_unavailable"
    );
}

/// Resolves once the stop flag is set
async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    // The sender lives as long as the scheduler, so this only errors on teardown
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

pub struct SyncScheduler {
    settings: SyncSettings,
    authoritative: Arc<dyn AuthoritativePlatform>,
    secondary: Arc<dyn SecondaryPlatform>,
    updater: Updater,
    metrics: Arc<Metrics>,
    state_tx: watch::Sender<SchedulerState>,
    stop_tx: watch::Sender<bool>,
}

impl SyncScheduler {
    pub fn new(
        settings: SyncSettings,
        authoritative: Arc<dyn AuthoritativePlatform>,
        secondary: Arc<dyn SecondaryPlatform>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let updater = Updater::new(secondary.clone(), settings.dry_run);
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        let (stop_tx, _) = watch::channel(false);
        Self { settings, authoritative, secondary, updater, metrics, state_tx, stop_tx }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Receiver that flips to `true` once `stop()` is called
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Request a cooperative stop. Idempotent.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            info!(state = %self.state(), "scheduler_stop_requested");
        }
    }

    /// Spawn the polling loop. Only valid from `Idle`.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, SchedulerError> {
        let mut previous = SchedulerState::Idle;
        let started = self.state_tx.send_if_modified(|state| {
            previous = *state;
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Running;
                true
            } else {
                false
            }
        });

        if !started {
            return Err(SchedulerError::AlreadyStarted(previous.to_string()));
        }

        let scheduler = Arc::clone(self);
        Ok(tokio::spawn(async move { scheduler.run_loop().await }))
    }

    async fn run_loop(self: Arc<Self>) {
        let mut stop_rx = self.stop_tx.subscribe();
        info!(
            interval_secs = %self.settings.interval.as_secs(),
            tolerance = %self.settings.tolerance,
            dry_run = %self.settings.dry_run,
            "scheduler_started"
        );

        loop {
            if *stop_rx.borrow_and_update() {
                break;
            }

            self.state_tx.send_replace(SchedulerState::Running);
            self.run_cycle().await;

            if *stop_rx.borrow_and_update() {
                break;
            }

            self.state_tx.send_replace(SchedulerState::Sleeping);
            debug!(interval_secs = %self.settings.interval.as_secs(), "scheduler_sleeping");
            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = wait_for_stop(&mut stop_rx) => break,
            }
        }

        self.state_tx.send_replace(SchedulerState::Stopped);
        info!(cycles = %self.metrics.cycles_total(), "scheduler_stopped");
    }

    /// Run one full cycle and record it. Never fails: a fatal error yields an
    /// aborted summary.
    pub async fn run_cycle(&self) -> CycleSummary {
        let cycle_id = Uuid::now_v7();
        let span = info_span!("sync_cycle", cycle_id = %cycle_id);

        async move {
            let started_at = Utc::now();
            let summary = match self.execute_cycle(cycle_id, started_at).await {
                Ok(summary) => summary,
                Err(e) => CycleSummary::aborted(cycle_id, started_at, Utc::now(), e.to_string()),
            };

            summary.log();
            let consecutive = self.metrics.record_cycle(&summary);
            let threshold = self.settings.alert_after_failed_cycles;
            if summary.aborted && threshold > 0 && consecutive >= threshold {
                log_platform_unavailable(consecutive, summary.error.as_deref().unwrap_or("unknown"));
            }
            summary
        }
        .instrument(span)
        .await
    }

    async fn execute_cycle(
        &self,
        cycle_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<CycleSummary, CycleError> {
        let mut summary = CycleSummary::begin(cycle_id, started_at);

        let session =
            self.authoritative.authenticate().await.map_err(CycleError::Authentication)?;
        debug!(database = %session.database, endpoint = %session.endpoint, "authenticated");

        let mappings = resolve_mappings(
            self.authoritative.as_ref(),
            &session,
            &self.settings.mapping_record_type,
        )
        .await?;
        summary.mappings_resolved = mappings.len();
        summary.records_rejected = mappings.rejected;

        if mappings.is_empty() {
            info!(rejected = %mappings.rejected, "no_devices_mapped");
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        let authoritative =
            fetch_authoritative_locations(self.authoritative.as_ref(), &session, &mappings).await?;

        let to_read: Vec<DeviceMapping> = mappings
            .mappings
            .iter()
            .filter(|m| authoritative.contains(&m.authoritative_device_id))
            .cloned()
            .collect();
        let secondary =
            fetch_secondary_locations(self.secondary.clone(), to_read, self.settings.max_concurrency)
                .await;
        summary.secondary_fetch_failures = secondary.failures.len();

        let report = detect(&authoritative, &secondary.locations, self.settings.tolerance);
        summary.devices_checked = report.results.len();
        // Mapped devices absent from the authoritative feed never reach `detect`
        let missing_authoritative = mappings.len().saturating_sub(authoritative.len());
        summary.unmatched = missing_authoritative + report.unmatched.len();
        if !report.unmatched.is_empty() {
            debug!(devices = ?report.unmatched, "devices_unmatched");
        }
        summary.discrepancies_found = report.discrepancy_count();

        let corrections: Vec<(DeviceMapping, Coordinates)> = report
            .discrepant()
            .filter_map(|result| {
                mappings.get(&result.device_id).map(|m| (m.clone(), result.authoritative))
            })
            .collect();

        if !corrections.is_empty() {
            let outcomes =
                self.updater.apply_corrections(corrections, self.settings.max_concurrency).await;
            for outcome in &outcomes {
                match outcome.status {
                    UpdateStatus::Succeeded => summary.updates_succeeded += 1,
                    UpdateStatus::Failed { .. } => summary.updates_failed += 1,
                    UpdateStatus::Skipped => summary.updates_skipped += 1,
                }
            }
        }

        summary.finished_at = Utc::now();
        Ok(summary)
    }
}
