//! Discrepancy detection
//!
//! Per-axis comparison against a fixed tolerance in decimal degrees. The
//! threshold is not a distance, so its ground size shrinks in longitude as
//! latitude grows.

use crate::domain::types::{Coordinates, DiscrepancyResult, LocationSet};
use tracing::{debug, info};

/// Default tolerance in decimal degrees
pub const DEFAULT_TOLERANCE: f64 = 0.0001;

/// Either axis differs by strictly more than `tolerance`
pub fn is_discrepant(a: Coordinates, b: Coordinates, tolerance: f64) -> bool {
    (a.latitude - b.latitude).abs() > tolerance || (a.longitude - b.longitude).abs() > tolerance
}

pub fn compare(
    device_id: &str,
    authoritative: Coordinates,
    secondary: Coordinates,
    tolerance: f64,
) -> DiscrepancyResult {
    let lat_delta = (authoritative.latitude - secondary.latitude).abs();
    let lon_delta = (authoritative.longitude - secondary.longitude).abs();
    DiscrepancyResult {
        device_id: device_id.to_string(),
        authoritative,
        secondary,
        delta: lat_delta.max(lon_delta),
        is_discrepant: is_discrepant(authoritative, secondary, tolerance),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    /// One entry per device present in both sets, in authoritative order
    pub results: Vec<DiscrepancyResult>,
    /// Devices present in only one of the sets
    pub unmatched: Vec<String>,
}

impl DetectionReport {
    pub fn discrepant(&self) -> impl Iterator<Item = &DiscrepancyResult> {
        self.results.iter().filter(|r| r.is_discrepant)
    }

    pub fn discrepancy_count(&self) -> usize {
        self.discrepant().count()
    }
}

/// Join both location sets and classify each device
pub fn detect(authoritative: &LocationSet, secondary: &LocationSet, tolerance: f64) -> DetectionReport {
    let mut report = DetectionReport::default();

    for (device_id, auth) in authoritative.iter() {
        let Some(other) = secondary.get(device_id) else {
            report.unmatched.push(device_id.to_string());
            continue;
        };

        let result = compare(device_id, auth.coordinates, other.coordinates, tolerance);
        if result.is_discrepant {
            info!(
                device_id = %device_id,
                authoritative = %result.authoritative,
                secondary = %result.secondary,
                delta = %result.delta,
                "discrepancy_found"
            );
        } else {
            debug!(device_id = %device_id, delta = %result.delta, "coordinates_match");
        }
        report.results.push(result);
    }

    for (device_id, _) in secondary.iter() {
        if !authoritative.contains(device_id) {
            report.unmatched.push(device_id.to_string());
        }
    }

    report
}
