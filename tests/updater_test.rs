//! Corrective updater against the in-memory secondary platform

mod common;

use common::FakeRuckit;
use location_sync::domain::{Coordinates, DeviceMapping, UpdateStatus};
use location_sync::services::Updater;
use std::sync::Arc;

fn mapping(device_id: &str) -> DeviceMapping {
    DeviceMapping {
        authoritative_device_id: device_id.to_string(),
        secondary_device_id: format!("truck-{device_id}"),
        secondary_api_token: format!("token-{device_id}"),
        secondary_driver_id: format!("driver-{device_id}"),
    }
}

#[tokio::test]
async fn test_correction_posts_authoritative_coordinates() {
    let ruckit = Arc::new(FakeRuckit::default());
    let updater = Updater::new(ruckit.clone(), false);
    assert!(!updater.is_dry_run());

    let outcome = updater.apply_correction(&mapping("b1"), Coordinates::new(33.749, -84.3902)).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.device_id, "b1");
    assert_eq!(
        ruckit.posted.lock().clone(),
        vec![("truck-b1".to_string(), Coordinates::new(33.749, -84.3902))]
    );
}

#[tokio::test]
async fn test_failed_correction_carries_reason() {
    let ruckit = Arc::new(FakeRuckit::default().failing_post("b1"));
    let updater = Updater::new(ruckit.clone(), false);

    let outcome = updater.apply_correction(&mapping("b1"), Coordinates::new(1.0, 1.0)).await;

    assert!(!outcome.is_success());
    match outcome.status {
        UpdateStatus::Failed { reason } => assert!(reason.contains("b1")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(ruckit.posted_trucks().is_empty());
}

#[tokio::test]
async fn test_dry_run_skips_post() {
    let ruckit = Arc::new(FakeRuckit::default());
    let updater = Updater::new(ruckit.clone(), true);
    assert!(updater.is_dry_run());

    let outcome = updater.apply_correction(&mapping("b1"), Coordinates::new(1.0, 1.0)).await;

    assert_eq!(outcome.status, UpdateStatus::Skipped);
    assert!(ruckit.posted_trucks().is_empty());
}

#[tokio::test]
async fn test_batch_outcomes_follow_input_order() {
    let ruckit = Arc::new(FakeRuckit::default().failing_post("b2"));
    let updater = Updater::new(ruckit.clone(), false);

    let corrections: Vec<_> = ["b1", "b2", "b3", "b4"]
        .iter()
        .map(|id| (mapping(id), Coordinates::new(1.0, 2.0)))
        .collect();
    let outcomes = updater.apply_corrections(corrections, 2).await;

    let ids: Vec<&str> = outcomes.iter().map(|o| o.device_id.as_str()).collect();
    assert_eq!(ids, vec!["b1", "b2", "b3", "b4"]);
    let successes: Vec<bool> = outcomes.iter().map(|o| o.is_success()).collect();
    assert_eq!(successes, vec![true, false, true, true]);
    assert_eq!(ruckit.posted_trucks().len(), 3);
}
