//! Location fetching from both platforms
//!
//! The authoritative fetch is one bulk call and is fatal for the cycle if it
//! fails. Secondary fetches are per device, each with its own token; a failed
//! device is recorded and left out of detection.

use crate::domain::error::{CycleError, DeviceError, PlatformError};
use crate::domain::types::{Coordinates, DeviceMapping, LocationRecord, LocationSet};
use crate::io::platform::{AuthoritativePlatform, DeviceStatus, SecondaryPlatform, Session};
use crate::services::fanout::fork_join;
use crate::services::resolver::ResolvedMappings;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Log a per-device secondary fetch failure (cold path)
#[cold]
fn log_secondary_fetch_failed(error: &DeviceError) {
    warn!(device_id = %error.device_id(), error = %error, "secondary_fetch_failed");
}

/// Secondary locations plus the devices that could not be read
#[derive(Debug, Default)]
pub struct SecondaryFetchReport {
    pub locations: LocationSet,
    pub failures: Vec<DeviceError>,
}

fn status_location(status: &DeviceStatus) -> Option<LocationRecord> {
    let (Some(latitude), Some(longitude)) = (status.latitude, status.longitude) else {
        return None;
    };
    let coordinates = Coordinates::new(latitude, longitude);
    if !coordinates.is_finite() {
        return None;
    }
    Some(LocationRecord { device_id: status.device_id.clone(), coordinates, observed_at: status.observed_at })
}

/// Current positions of mapped devices, in mapping order.
///
/// Devices absent from the bulk result, or reported without usable
/// coordinates, are left out.
pub async fn fetch_authoritative_locations(
    platform: &dyn AuthoritativePlatform,
    session: &Session,
    mappings: &ResolvedMappings,
) -> Result<LocationSet, CycleError> {
    let statuses = platform.device_statuses(session).await.map_err(CycleError::Fetch)?;

    let by_id: FxHashMap<&str, &DeviceStatus> =
        statuses.iter().map(|s| (s.device_id.as_str(), s)).collect();

    let mut locations = LocationSet::new();
    for mapping in &mappings.mappings {
        let device_id = mapping.authoritative_device_id.as_str();
        let Some(status) = by_id.get(device_id) else {
            debug!(device_id = %device_id, "device_missing_from_status_feed");
            continue;
        };
        match status_location(status) {
            Some(record) => locations.insert(device_id, record),
            None => warn!(device_id = %device_id, "device_status_without_coordinates"),
        }
    }

    info!(statuses = %statuses.len(), located = %locations.len(), "authoritative_locations_fetched");
    Ok(locations)
}

/// Read every mapped device from the secondary platform, concurrently.
///
/// Locations are keyed by authoritative device id so they join directly with
/// the authoritative set.
pub async fn fetch_secondary_locations(
    platform: Arc<dyn SecondaryPlatform>,
    mappings: Vec<DeviceMapping>,
    max_concurrency: usize,
) -> SecondaryFetchReport {
    let device_ids: Vec<String> =
        mappings.iter().map(|m| m.authoritative_device_id.clone()).collect();

    let results = fork_join(mappings, max_concurrency, move |mapping| {
        let platform = platform.clone();
        async move { platform.latest_location(&mapping).await }
    })
    .await;

    let mut report = SecondaryFetchReport::default();
    for (device_id, result) in device_ids.into_iter().zip(results) {
        let result =
            result.unwrap_or_else(|| Err(PlatformError::Task("secondary fetch aborted".to_string())));
        match result {
            Ok(record) => report.locations.insert(device_id, record),
            Err(source) => {
                let error = DeviceError::SecondaryFetch { device_id, source };
                log_secondary_fetch_failed(&error);
                report.failures.push(error);
            }
        }
    }

    info!(
        fetched = %report.locations.len(),
        failed = %report.failures.len(),
        "secondary_locations_fetched"
    );
    report
}
