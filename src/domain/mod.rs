//! Domain models - core value types and error taxonomy
//!
//! - `types` - mappings, location records, discrepancy results, cycle summaries
//! - `error` - per-cycle, per-device and per-record errors

pub mod error;
pub mod types;

// Re-export commonly used types at module level
pub use error::{CycleError, DeviceError, InvalidMappingRecord, PlatformError, SchedulerError};
pub use types::{
    Coordinates, CycleSummary, DeviceMapping, DiscrepancyResult, LocationRecord, LocationSet,
    UpdateOutcome, UpdateStatus,
};
