//! Corrective updates to the secondary platform
//!
//! Failures are reported per device and never abort the remaining updates.
//! There is no retry inside a cycle; re-posting the same coordinates next
//! cycle is harmless.

use crate::domain::error::{DeviceError, PlatformError};
use crate::domain::types::{Coordinates, DeviceMapping, UpdateOutcome};
use crate::io::platform::SecondaryPlatform;
use crate::services::fanout::fork_join;
use std::sync::Arc;
use tracing::{error, info};

/// Log a failed correction (cold path)
#[cold]
fn log_update_failed(error: &DeviceError) {
    error!(device_id = %error.device_id(), error = %error, "location_update_failed");
}

#[derive(Clone)]
pub struct Updater {
    platform: Arc<dyn SecondaryPlatform>,
    dry_run: bool,
}

impl Updater {
    pub fn new(platform: Arc<dyn SecondaryPlatform>, dry_run: bool) -> Self {
        Self { platform, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Push the authoritative coordinates for one device
    pub async fn apply_correction(
        &self,
        mapping: &DeviceMapping,
        coordinates: Coordinates,
    ) -> UpdateOutcome {
        let device_id = mapping.authoritative_device_id.as_str();

        if self.dry_run {
            info!(
                device_id = %device_id,
                truck = %mapping.secondary_device_id,
                coordinates = %coordinates,
                "dry_run_update_skipped"
            );
            return UpdateOutcome::skipped(device_id);
        }

        match self.platform.post_location(mapping, coordinates).await {
            Ok(()) => {
                info!(
                    device_id = %device_id,
                    truck = %mapping.secondary_device_id,
                    coordinates = %coordinates,
                    "location_corrected"
                );
                UpdateOutcome::succeeded(device_id)
            }
            Err(source) => {
                let error = DeviceError::Update { device_id: device_id.to_string(), source };
                log_update_failed(&error);
                UpdateOutcome::failed(device_id, error.to_string())
            }
        }
    }

    /// Apply all corrections concurrently; outcomes follow input order
    pub async fn apply_corrections(
        &self,
        corrections: Vec<(DeviceMapping, Coordinates)>,
        max_concurrency: usize,
    ) -> Vec<UpdateOutcome> {
        let device_ids: Vec<String> =
            corrections.iter().map(|(m, _)| m.authoritative_device_id.clone()).collect();

        let updater = self.clone();
        let results = fork_join(corrections, max_concurrency, move |(mapping, coordinates)| {
            let updater = updater.clone();
            async move { updater.apply_correction(&mapping, coordinates).await }
        })
        .await;

        device_ids
            .into_iter()
            .zip(results)
            .map(|(device_id, outcome)| {
                outcome.unwrap_or_else(|| {
                    let error = DeviceError::Update {
                        device_id: device_id.clone(),
                        source: PlatformError::Task("update aborted".to_string()),
                    };
                    log_update_failed(&error);
                    UpdateOutcome::failed(device_id, error.to_string())
                })
            })
            .collect()
    }
}
