//! Integration tests for configuration loading

use location_sync::infra::Config;
use location_sync::services::SyncSettings;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "fleet-east"

[geotab]
url = "https://my.geotab.com/apiv1"
username = "ops@example.com"
database = "fleet_db"
password = "secret"
timeout_ms = 5000
addin_type = "ri-device-v2"

[ruckit]
url = "https://ruckit.example.com/api/locationupdates/"
timeout_ms = 4000

[sync]
interval_secs = 60
tolerance = 0.0005
max_concurrency = 4
dry_run = true
alert_after_failed_cycles = 5

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "fleet-east");
    assert_eq!(config.geotab_username(), "ops@example.com");
    assert_eq!(config.geotab_database(), "fleet_db");
    assert_eq!(config.geotab_password(), "secret");
    assert_eq!(config.geotab_timeout_ms(), 5000);
    assert_eq!(config.addin_type(), "ri-device-v2");
    assert_eq!(config.ruckit_url(), "https://ruckit.example.com/api/locationupdates/");
    assert_eq!(config.ruckit_timeout_ms(), 4000);
    assert_eq!(config.sync_interval_secs(), 60);
    assert_eq!(config.tolerance(), 0.0005);
    assert_eq!(config.max_concurrency(), 4);
    assert!(config.dry_run());
    assert_eq!(config.alert_after_failed_cycles(), 5);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);
    assert!(config.missing_credentials().is_empty());

    let settings = SyncSettings::from_config(&config);
    assert_eq!(settings.interval, Duration::from_secs(60));
    assert_eq!(settings.mapping_record_type, "ri-device-v2");
    assert!(settings.dry_run);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[sync\ninterval_secs = ").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.geotab_url(), "https://my.geotab.com/apiv1");
    assert_eq!(
        config.ruckit_url(),
        "https://ruckit-platform.herokuapp.com/api/locationupdates/"
    );
    assert_eq!(config.sync_interval_secs(), 120);
    assert_eq!(config.tolerance(), 0.0001);
}

#[test]
fn test_negative_tolerance_and_zero_interval_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[sync]\ninterval_secs = 0\ntolerance = -0.5\n").unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    let settings = SyncSettings::from_config(&config);

    assert_eq!(settings.tolerance, 0.0001);
    assert_eq!(settings.interval, Duration::from_secs(1));
}
