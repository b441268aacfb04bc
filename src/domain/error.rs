//! Error taxonomy
//!
//! Per-cycle errors abort the current cycle only. Per-device and per-record
//! errors are counted and logged, never escalated.

use thiserror::Error;

/// Failure talking to either platform
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The remote API answered with an error object
    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no data: {0}")]
    NoData(String),

    /// The per-device task panicked or was cancelled before it reported
    #[error("task failed: {0}")]
    Task(String),
}

/// Fatal for the current cycle; the scheduler retries on the next interval
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("authoritative platform authentication failed: {0}")]
    Authentication(#[source] PlatformError),

    #[error("device mapping resolution failed: {0}")]
    Resolution(#[source] PlatformError),

    #[error("authoritative location fetch failed: {0}")]
    Fetch(#[source] PlatformError),
}

/// Recoverable, scoped to a single device
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("secondary location fetch failed for {device_id}: {source}")]
    SecondaryFetch {
        device_id: String,
        #[source]
        source: PlatformError,
    },

    #[error("location update failed for {device_id}: {source}")]
    Update {
        device_id: String,
        #[source]
        source: PlatformError,
    },
}

impl DeviceError {
    pub fn device_id(&self) -> &str {
        match self {
            DeviceError::SecondaryFetch { device_id, .. } | DeviceError::Update { device_id, .. } => {
                device_id
            }
        }
    }
}

/// Why a mapping record was dropped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidMappingRecord {
    #[error("missing or empty field {0}")]
    MissingField(&'static str),

    #[error("placeholder value in field {0}")]
    Placeholder(&'static str),

    #[error("record tagged {0:?}, not a device mapping")]
    WrongType(String),

    #[error("duplicate mapping for device {0}")]
    Duplicate(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler already started (state: {0})")]
    AlreadyStarted(String),
}
