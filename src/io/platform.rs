//! Platform traits - the seam between sync logic and the HTTP adapters

use crate::domain::error::PlatformError;
use crate::domain::types::{Coordinates, DeviceMapping, LocationRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Authenticated session with the authoritative platform.
/// Obtained once per cycle and shared read-only by every call in it.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub database: String,
    pub user_name: String,
    pub session_id: String,
    /// Endpoint the session is bound to (may differ from the login endpoint)
    pub endpoint: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.database)
            .field("user_name", &self.user_name)
            .field("session_id", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Raw auxiliary-data record as stored on the authoritative platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRecord {
    pub record_type: String,
    pub source_device_id: Option<String>,
    pub secondary_device_id: Option<String>,
    pub secondary_token: Option<String>,
    pub secondary_driver_id: Option<String>,
}

/// Raw bulk status entry from the authoritative platform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStatus {
    pub device_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Source of truth for device positions and device mappings
#[async_trait]
pub trait AuthoritativePlatform: Send + Sync {
    async fn authenticate(&self) -> Result<Session, PlatformError>;

    /// Auxiliary-data records tagged `record_type`
    async fn mapping_records(
        &self,
        session: &Session,
        record_type: &str,
    ) -> Result<Vec<MappingRecord>, PlatformError>;

    /// Current status of every known device, in a single call
    async fn device_statuses(&self, session: &Session) -> Result<Vec<DeviceStatus>, PlatformError>;
}

/// Platform that receives corrective location updates.
/// Every call authenticates with the device's own token.
#[async_trait]
pub trait SecondaryPlatform: Send + Sync {
    /// Most recent location the platform holds for this device
    async fn latest_location(&self, mapping: &DeviceMapping) -> Result<LocationRecord, PlatformError>;

    async fn post_location(
        &self,
        mapping: &DeviceMapping,
        coordinates: Coordinates,
    ) -> Result<(), PlatformError>;
}
