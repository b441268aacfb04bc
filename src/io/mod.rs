//! IO modules - external system interfaces
//!
//! - `platform` - Traits at the platform seam and the raw records they deliver
//! - `geotab` - JSON-RPC client for the authoritative platform (MyGeotab)
//! - `ruckit` - REST client for the secondary platform (Ruckit)
//! - `prometheus` - Prometheus metrics and health HTTP endpoint

pub mod geotab;
pub mod platform;
pub mod prometheus;
pub mod ruckit;

// Re-export commonly used types
pub use geotab::{GeotabClient, GeotabConfig};
pub use platform::{AuthoritativePlatform, DeviceStatus, MappingRecord, SecondaryPlatform, Session};
pub use ruckit::{RuckitClient, RuckitConfig};
