//! Shared types for the location reconciler

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use uuid::Uuid;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Both axes are finite numbers
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Links an authoritative device to its identity and credentials on the
/// secondary platform. Built fresh every cycle by the resolver.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceMapping {
    pub authoritative_device_id: String,
    pub secondary_device_id: String,
    pub secondary_api_token: String,
    pub secondary_driver_id: String,
}

// Tokens must never reach the logs
impl std::fmt::Debug for DeviceMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMapping")
            .field("authoritative_device_id", &self.authoritative_device_id)
            .field("secondary_device_id", &self.secondary_device_id)
            .field("secondary_api_token", &"<redacted>")
            .field("secondary_driver_id", &self.secondary_driver_id)
            .finish()
    }
}

/// A device position as reported by one platform
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub device_id: String,
    pub coordinates: Coordinates,
    pub observed_at: Option<DateTime<Utc>>,
}

impl LocationRecord {
    pub fn new(device_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            device_id: device_id.into(),
            coordinates: Coordinates::new(latitude, longitude),
            observed_at: None,
        }
    }
}

/// Device locations keyed by authoritative device id, iterated in insertion order
#[derive(Debug, Clone, Default)]
pub struct LocationSet {
    records: Vec<(String, LocationRecord)>,
    index: FxHashMap<String, usize>,
}

impl LocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `key`. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, record: LocationRecord) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&idx) => self.records[idx].1 = record,
            None => {
                self.index.insert(key.clone(), self.records.len());
                self.records.push((key, record));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&LocationRecord> {
        self.index.get(key).map(|&idx| &self.records[idx].1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LocationRecord)> {
        self.records.iter().map(|(k, r)| (k.as_str(), r))
    }
}

/// Comparison of one device's positions on both platforms
#[derive(Debug, Clone, PartialEq)]
pub struct DiscrepancyResult {
    pub device_id: String,
    pub authoritative: Coordinates,
    pub secondary: Coordinates,
    /// Larger of the two per-axis absolute differences (degrees)
    pub delta: f64,
    pub is_discrepant: bool,
}

/// Result of one corrective update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Succeeded,
    Failed { reason: String },
    /// Dry-run mode; nothing was sent
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub device_id: String,
    pub status: UpdateStatus,
}

impl UpdateOutcome {
    pub fn succeeded(device_id: impl Into<String>) -> Self {
        Self { device_id: device_id.into(), status: UpdateStatus::Succeeded }
    }

    pub fn failed(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { device_id: device_id.into(), status: UpdateStatus::Failed { reason: reason.into() } }
    }

    pub fn skipped(device_id: impl Into<String>) -> Self {
        Self { device_id: device_id.into(), status: UpdateStatus::Skipped }
    }

    pub fn is_success(&self) -> bool {
        self.status == UpdateStatus::Succeeded
    }
}

/// Statistics for one sync cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub mappings_resolved: usize,
    pub records_rejected: usize,
    pub devices_checked: usize,
    pub unmatched: usize,
    pub secondary_fetch_failures: usize,
    pub discrepancies_found: usize,
    pub updates_succeeded: usize,
    pub updates_failed: usize,
    pub updates_skipped: usize,
    /// The cycle hit a fatal error and was cut short
    pub aborted: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleSummary {
    /// Empty summary for a cycle that has just started
    pub fn begin(cycle_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            mappings_resolved: 0,
            records_rejected: 0,
            devices_checked: 0,
            unmatched: 0,
            secondary_fetch_failures: 0,
            discrepancies_found: 0,
            updates_succeeded: 0,
            updates_failed: 0,
            updates_skipped: 0,
            aborted: false,
            error: None,
            started_at,
            finished_at: started_at,
        }
    }

    /// Summary for a cycle cut short by a fatal error. All counters are zero.
    pub fn aborted(
        cycle_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            aborted: true,
            error: Some(error),
            finished_at,
            ..Self::begin(cycle_id, started_at)
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn log(&self) {
        if self.aborted {
            tracing::warn!(
                cycle_id = %self.cycle_id,
                duration_ms = %self.duration_ms(),
                error = self.error.as_deref().unwrap_or("unknown"),
                "sync_cycle_aborted"
            );
            return;
        }
        tracing::info!(
            cycle_id = %self.cycle_id,
            mappings = %self.mappings_resolved,
            rejected = %self.records_rejected,
            checked = %self.devices_checked,
            unmatched = %self.unmatched,
            fetch_failures = %self.secondary_fetch_failures,
            discrepancies = %self.discrepancies_found,
            updated = %self.updates_succeeded,
            update_failures = %self.updates_failed,
            skipped = %self.updates_skipped,
            duration_ms = %self.duration_ms(),
            "sync_cycle_completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_set_keeps_insertion_order() {
        let mut set = LocationSet::new();
        set.insert("c", LocationRecord::new("c", 1.0, 1.0));
        set.insert("a", LocationRecord::new("a", 2.0, 2.0));
        set.insert("b", LocationRecord::new("b", 3.0, 3.0));

        let keys: Vec<&str> = set.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_location_set_replace_keeps_position() {
        let mut set = LocationSet::new();
        set.insert("a", LocationRecord::new("a", 1.0, 1.0));
        set.insert("b", LocationRecord::new("b", 2.0, 2.0));
        set.insert("a", LocationRecord::new("a", 9.0, 9.0));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a").map(|r| r.coordinates.latitude), Some(9.0));
        assert_eq!(set.iter().next().map(|(k, _)| k), Some("a"));
    }

    #[test]
    fn test_mapping_debug_redacts_token() {
        let mapping = DeviceMapping {
            authoritative_device_id: "b1".to_string(),
            secondary_device_id: "truck-1".to_string(),
            secondary_api_token: "secret-token".to_string(),
            secondary_driver_id: "driver-1".to_string(),
        };
        let debug = format!("{:?}", mapping);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_aborted_summary_has_zero_counters() {
        let now = Utc::now();
        let summary = CycleSummary::aborted(Uuid::now_v7(), now, now, "boom".to_string());
        assert!(summary.aborted);
        assert_eq!(summary.devices_checked, 0);
        assert_eq!(summary.discrepancies_found, 0);
        assert_eq!(summary.error.as_deref(), Some("boom"));
    }
}
