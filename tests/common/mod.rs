//! In-memory platforms for driving the scheduler without HTTP

#![allow(dead_code)]

use async_trait::async_trait;
use location_sync::domain::{Coordinates, DeviceMapping, LocationRecord, PlatformError};
use location_sync::io::{AuthoritativePlatform, DeviceStatus, MappingRecord, SecondaryPlatform, Session};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const RECORD_TYPE: &str = "ri-device";

/// Valid mapping record; ids on the secondary side derive from `device_id`
pub fn record(device_id: &str) -> MappingRecord {
    MappingRecord {
        record_type: RECORD_TYPE.to_string(),
        source_device_id: Some(device_id.to_string()),
        secondary_device_id: Some(format!("truck-{device_id}")),
        secondary_token: Some(format!("token-{device_id}")),
        secondary_driver_id: Some(format!("driver-{device_id}")),
    }
}

pub fn status(device_id: &str, latitude: f64, longitude: f64) -> DeviceStatus {
    DeviceStatus {
        device_id: device_id.to_string(),
        latitude: Some(latitude),
        longitude: Some(longitude),
        observed_at: None,
    }
}

#[derive(Default)]
pub struct FakeGeotab {
    pub records: Mutex<Vec<MappingRecord>>,
    pub statuses: Mutex<Vec<DeviceStatus>>,
    pub fail_auth: AtomicBool,
    pub fail_statuses: AtomicBool,
    pub fail_mapping_records: AtomicBool,
    pub auth_calls: AtomicUsize,
}

impl FakeGeotab {
    pub fn new(records: Vec<MappingRecord>, statuses: Vec<DeviceStatus>) -> Self {
        Self { records: Mutex::new(records), statuses: Mutex::new(statuses), ..Default::default() }
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthoritativePlatform for FakeGeotab {
    async fn authenticate(&self) -> Result<Session, PlatformError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(PlatformError::Auth("InvalidUserException".to_string()));
        }
        Ok(Session {
            database: "fleet_db".to_string(),
            user_name: "ops@example.com".to_string(),
            session_id: "session-1".to_string(),
            endpoint: "https://fake.geotab/apiv1".to_string(),
        })
    }

    async fn mapping_records(
        &self,
        _session: &Session,
        _record_type: &str,
    ) -> Result<Vec<MappingRecord>, PlatformError> {
        if self.fail_mapping_records.load(Ordering::SeqCst) {
            return Err(PlatformError::Remote("AddInData lookup failed".to_string()));
        }
        Ok(self.records.lock().clone())
    }

    async fn device_statuses(&self, _session: &Session) -> Result<Vec<DeviceStatus>, PlatformError> {
        if self.fail_statuses.load(Ordering::SeqCst) {
            return Err(PlatformError::Status { status: 503, body: "unavailable".to_string() });
        }
        Ok(self.statuses.lock().clone())
    }
}

/// Secondary platform keyed by driver id, as the real one is queried
#[derive(Default)]
pub struct FakeRuckit {
    pub locations: Mutex<FxHashMap<String, Coordinates>>,
    pub failing_reads: Mutex<FxHashSet<String>>,
    pub failing_posts: Mutex<FxHashSet<String>>,
    pub posted: Mutex<Vec<(String, Coordinates)>>,
    pub read_calls: AtomicUsize,
}

impl FakeRuckit {
    pub fn with_location(self, device_id: &str, latitude: f64, longitude: f64) -> Self {
        self.locations
            .lock()
            .insert(format!("driver-{device_id}"), Coordinates::new(latitude, longitude));
        self
    }

    pub fn failing_read(self, device_id: &str) -> Self {
        self.failing_reads.lock().insert(format!("driver-{device_id}"));
        self
    }

    pub fn failing_post(self, device_id: &str) -> Self {
        self.failing_posts.lock().insert(format!("driver-{device_id}"));
        self
    }

    /// Trucks that received a correction, in post order
    pub fn posted_trucks(&self) -> Vec<String> {
        self.posted.lock().iter().map(|(truck, _)| truck.clone()).collect()
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecondaryPlatform for FakeRuckit {
    async fn latest_location(&self, mapping: &DeviceMapping) -> Result<LocationRecord, PlatformError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let driver = &mapping.secondary_driver_id;
        if self.failing_reads.lock().contains(driver) {
            return Err(PlatformError::Status { status: 500, body: "boom".to_string() });
        }
        let coordinates = self
            .locations
            .lock()
            .get(driver)
            .copied()
            .ok_or_else(|| PlatformError::NoData(format!("no updates for {driver}")))?;
        Ok(LocationRecord {
            device_id: mapping.secondary_device_id.clone(),
            coordinates,
            observed_at: None,
        })
    }

    async fn post_location(
        &self,
        mapping: &DeviceMapping,
        coordinates: Coordinates,
    ) -> Result<(), PlatformError> {
        if self.failing_posts.lock().contains(&mapping.secondary_driver_id) {
            return Err(PlatformError::Status { status: 500, body: "rejected".to_string() });
        }
        self.posted.lock().push((mapping.secondary_device_id.clone(), coordinates));
        // Later reads see the corrected position
        self.locations.lock().insert(mapping.secondary_driver_id.clone(), coordinates);
        Ok(())
    }
}
