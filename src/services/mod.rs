//! Services - reconciliation logic
//!
//! - `resolver` - Device mapping resolution and placeholder filtering
//! - `fetcher` - Location retrieval from both platforms
//! - `detector` - Per-axis discrepancy detection
//! - `updater` - Corrective updates to the secondary platform
//! - `fanout` - Bounded fork-join for per-device work
//! - `scheduler` - Cycle orchestration and the polling state machine

pub mod detector;
pub mod fanout;
pub mod fetcher;
pub mod resolver;
pub mod scheduler;
pub mod updater;

// Re-export commonly used types
pub use detector::{detect, is_discrepant, DetectionReport, DEFAULT_TOLERANCE};
pub use resolver::{filter_mappings, resolve_mappings, ResolvedMappings, PLACEHOLDER_VALUES};
pub use scheduler::{SchedulerState, SyncScheduler, SyncSettings};
pub use updater::Updater;
