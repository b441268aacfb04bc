//! Device mapping resolution
//!
//! Turns raw auxiliary-data records into validated `DeviceMapping`s. A record
//! is dropped when any field is missing, blank, or one of the known
//! placeholder values that ship in setup templates.

use crate::domain::error::{CycleError, InvalidMappingRecord};
use crate::domain::types::DeviceMapping;
use crate::io::platform::{AuthoritativePlatform, MappingRecord, Session};
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

/// Template values that must never be treated as real credentials or ids
pub const PLACEHOLDER_VALUES: [&str; 6] = [
    "TOKEN",
    "DriverID",
    "DeviceID",
    "your_token_here",
    "your_driver_id_here",
    "your_device_id_here",
];

/// Exact match against `PLACEHOLDER_VALUES`, ignoring surrounding whitespace
pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER_VALUES.contains(&value.trim())
}

/// Output of one resolution pass, in record order
#[derive(Debug, Clone, Default)]
pub struct ResolvedMappings {
    pub mappings: Vec<DeviceMapping>,
    /// Records of the right type that failed validation
    pub rejected: usize,
}

impl ResolvedMappings {
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn get(&self, authoritative_device_id: &str) -> Option<&DeviceMapping> {
        self.mappings.iter().find(|m| m.authoritative_device_id == authoritative_device_id)
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, InvalidMappingRecord> {
    let value = value.as_deref().map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(InvalidMappingRecord::MissingField(field));
    }
    if is_placeholder(value) {
        return Err(InvalidMappingRecord::Placeholder(field));
    }
    Ok(value.to_string())
}

/// Validate a single record's fields
pub fn validate_record(record: &MappingRecord) -> Result<DeviceMapping, InvalidMappingRecord> {
    Ok(DeviceMapping {
        authoritative_device_id: required(&record.source_device_id, "source_device_id")?,
        secondary_device_id: required(&record.secondary_device_id, "secondary_device_id")?,
        secondary_api_token: required(&record.secondary_token, "secondary_token")?,
        secondary_driver_id: required(&record.secondary_driver_id, "secondary_driver_id")?,
    })
}

/// Untagged records pass; only a different tag is rejected
fn check_type(record: &MappingRecord, record_type: &str) -> Result<(), InvalidMappingRecord> {
    let tag = record.record_type.trim();
    if tag.is_empty() || tag == record_type {
        Ok(())
    } else {
        Err(InvalidMappingRecord::WrongType(tag.to_string()))
    }
}

/// Filter records down to valid, unique mappings.
///
/// Every dropped record is counted in `rejected` and logged, including ones
/// tagged with another type. The first valid record for a device wins.
pub fn filter_mappings(records: &[MappingRecord], record_type: &str) -> ResolvedMappings {
    let mut resolved = ResolvedMappings::default();
    let mut seen = FxHashSet::default();

    for record in records {
        let result = check_type(record, record_type)
            .and_then(|()| validate_record(record))
            .and_then(|mapping| {
                if seen.insert(mapping.authoritative_device_id.clone()) {
                    Ok(mapping)
                } else {
                    Err(InvalidMappingRecord::Duplicate(mapping.authoritative_device_id))
                }
            });

        match result {
            Ok(mapping) => {
                debug!(
                    device_id = %mapping.authoritative_device_id,
                    driver = %mapping.secondary_driver_id,
                    "device_mapped"
                );
                resolved.mappings.push(mapping);
            }
            Err(reason) => {
                warn!(
                    device_id = record.source_device_id.as_deref().unwrap_or("<missing>"),
                    reason = %reason,
                    "mapping_record_rejected"
                );
                resolved.rejected += 1;
            }
        }
    }

    resolved
}

/// Fetch and validate this cycle's device mappings
pub async fn resolve_mappings(
    platform: &dyn AuthoritativePlatform,
    session: &Session,
    record_type: &str,
) -> Result<ResolvedMappings, CycleError> {
    let records =
        platform.mapping_records(session, record_type).await.map_err(CycleError::Resolution)?;

    let resolved = filter_mappings(&records, record_type);
    info!(
        records = %records.len(),
        mapped = %resolved.len(),
        rejected = %resolved.rejected,
        "mappings_resolved"
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPE: &str = "ri-device";

    fn record(device: &str, truck: &str, token: &str, driver: &str) -> MappingRecord {
        MappingRecord {
            record_type: TYPE.to_string(),
            source_device_id: Some(device.to_string()),
            secondary_device_id: Some(truck.to_string()),
            secondary_token: Some(token.to_string()),
            secondary_driver_id: Some(driver.to_string()),
        }
    }

    #[test]
    fn test_valid_record() {
        let mapping = validate_record(&record("b1", "t1", "tok", "d1")).unwrap();
        assert_eq!(mapping.authoritative_device_id, "b1");
        assert_eq!(mapping.secondary_device_id, "t1");
        assert_eq!(mapping.secondary_api_token, "tok");
        assert_eq!(mapping.secondary_driver_id, "d1");
    }

    #[test]
    fn test_placeholder_token_is_excluded() {
        let records = vec![record("b1", "t1", "your_token_here", "d1"), record("b2", "t2", "tok", "d2")];
        let resolved = filter_mappings(&records, TYPE);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.rejected, 1);
        assert!(resolved.get("b1").is_none());
        assert!(resolved.get("b2").is_some());
    }

    #[test]
    fn test_every_placeholder_rejected_in_every_field() {
        for placeholder in PLACEHOLDER_VALUES {
            let cases = [
                record(placeholder, "t", "tok", "d"),
                record("b", placeholder, "tok", "d"),
                record("b", "t", placeholder, "d"),
                record("b", "t", "tok", placeholder),
            ];
            for case in &cases {
                assert!(
                    matches!(validate_record(case), Err(InvalidMappingRecord::Placeholder(_))),
                    "placeholder {placeholder} accepted in {case:?}"
                );
            }
        }
    }

    #[test]
    fn test_near_placeholder_is_not_a_placeholder() {
        assert!(is_placeholder(" TOKEN "));
        assert!(!is_placeholder("token"));
        assert!(!is_placeholder("TOKEN-1"));
    }

    #[test]
    fn test_missing_and_blank_fields_rejected() {
        let mut missing = record("b1", "t1", "tok", "d1");
        missing.secondary_driver_id = None;
        assert_eq!(
            validate_record(&missing),
            Err(InvalidMappingRecord::MissingField("secondary_driver_id"))
        );

        let blank = record("   ", "t1", "tok", "d1");
        assert_eq!(validate_record(&blank), Err(InvalidMappingRecord::MissingField("source_device_id")));
    }

    #[test]
    fn test_other_record_type_counted_as_rejected() {
        let mut other = record("b1", "t1", "tok", "d1");
        other.record_type = "something-else".to_string();
        assert_eq!(
            check_type(&other, TYPE),
            Err(InvalidMappingRecord::WrongType("something-else".to_string()))
        );

        let resolved = filter_mappings(&[other], TYPE);
        assert!(resolved.is_empty());
        assert_eq!(resolved.rejected, 1);
    }

    #[test]
    fn test_untagged_record_is_accepted() {
        let mut untagged = record("b1", "t1", "tok", "d1");
        untagged.record_type = String::new();
        let resolved = filter_mappings(&[untagged], TYPE);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.rejected, 0);
    }

    #[test]
    fn test_duplicate_device_first_wins() {
        let records = vec![record("b1", "t1", "tok1", "d1"), record("b1", "t2", "tok2", "d2")];
        let resolved = filter_mappings(&records, TYPE);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.rejected, 1);
        assert_eq!(resolved.mappings[0].secondary_device_id, "t1");
    }

    #[test]
    fn test_filter_is_idempotent() {
        let records = vec![
            record("b1", "t1", "tok", "d1"),
            record("b2", "t2", "TOKEN", "d2"),
            record("b3", "t3", "tok", "d3"),
            record("b1", "t4", "tok", "d4"),
        ];
        let first = filter_mappings(&records, TYPE);
        let second = filter_mappings(&records, TYPE);

        assert_eq!(first.mappings, second.mappings);
        assert_eq!(first.rejected, second.rejected);
    }
}
