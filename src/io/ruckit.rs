//! Ruckit location-update REST client (secondary platform)
//!
//! - Read:  `GET {url}?driver={driver_id}` → `{"results": [{"date", "location"}]}`
//! - Write: `POST {url}` with a GeoJSON point
//!
//! Both carry `Authorization: Token {device token}`. GeoJSON coordinates are
//! `[longitude, latitude]`.

use crate::domain::error::PlatformError;
use crate::domain::types::{Coordinates, DeviceMapping, LocationRecord};
use crate::infra::config::Config;
use crate::io::platform::SecondaryPlatform;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RuckitConfig {
    pub url: String,
    pub timeout: Duration,
}

impl RuckitConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.ruckit_url().to_string(),
            timeout: Duration::from_millis(config.ruckit_timeout_ms()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LocationUpdatesPage {
    #[serde(default)]
    results: Vec<LocationUpdate>,
}

#[derive(Debug, Deserialize)]
struct LocationUpdate {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    location: Option<GeoPoint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeoPoint {
    #[serde(rename = "type", default = "point_type")]
    kind: String,
    #[serde(default)]
    coordinates: Vec<f64>,
}

fn point_type() -> String {
    "Point".to_string()
}

impl GeoPoint {
    fn from_coordinates(coordinates: Coordinates) -> Self {
        Self { kind: point_type(), coordinates: vec![coordinates.longitude, coordinates.latitude] }
    }

    fn to_coordinates(&self) -> Option<Coordinates> {
        match self.coordinates.as_slice() {
            [longitude, latitude, ..] => Some(Coordinates::new(*latitude, *longitude)),
            _ => None,
        }
    }
}

/// Body of a location-update POST
#[derive(Debug, Serialize)]
struct LocationUpdatePayload<'a> {
    truck: &'a str,
    driver: &'a str,
    device_id: &'a str,
    date: String,
    location: GeoPoint,
    orientation: f64,
    speed: f64,
    assignment: Option<()>,
    jobevent: Option<()>,
    provider: Option<()>,
    accuracy: Option<()>,
}

impl<'a> LocationUpdatePayload<'a> {
    fn new(mapping: &'a DeviceMapping, coordinates: Coordinates, now: DateTime<Utc>) -> Self {
        Self {
            truck: &mapping.secondary_device_id,
            driver: &mapping.secondary_driver_id,
            device_id: &mapping.authoritative_device_id,
            date: now.to_rfc3339(),
            location: GeoPoint::from_coordinates(coordinates),
            orientation: 0.0,
            speed: 0.0,
            assignment: None,
            jobevent: None,
            provider: None,
            accuracy: None,
        }
    }
}

impl LocationUpdate {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    /// Instants are compared when both dates parse, raw text otherwise
    fn is_newer_than(&self, other: &LocationUpdate) -> bool {
        match (self.timestamp(), other.timestamp()) {
            (Some(a), Some(b)) => a > b,
            _ => self.date > other.date,
        }
    }
}

/// Pick the most recent update. On equal dates the first one listed wins.
fn latest_update(updates: &[LocationUpdate]) -> Option<&LocationUpdate> {
    updates.iter().fold(None, |latest, update| match latest {
        Some(current) if !update.is_newer_than(current) => Some(current),
        _ => Some(update),
    })
}

fn auth_header(token: &str) -> String {
    format!("Token {}", token)
}

async fn error_for_status(response: reqwest::Response) -> PlatformError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::Auth(format!("status {}", status.as_u16()))
        }
        _ => PlatformError::Status { status: status.as_u16(), body },
    }
}

pub struct RuckitClient {
    config: RuckitConfig,
    http: reqwest::Client,
}

impl RuckitClient {
    pub fn new(config: RuckitConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl SecondaryPlatform for RuckitClient {
    async fn latest_location(&self, mapping: &DeviceMapping) -> Result<LocationRecord, PlatformError> {
        debug!(driver = %mapping.secondary_driver_id, "ruckit_fetch_location");

        let response = self
            .http
            .get(&self.config.url)
            .query(&[("driver", mapping.secondary_driver_id.as_str())])
            .header("Authorization", auth_header(&mapping.secondary_api_token))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(error_for_status(response).await);
        }

        let page: LocationUpdatesPage =
            response.json().await.map_err(|e| PlatformError::Malformed(e.to_string()))?;

        let latest = latest_update(&page.results).ok_or_else(|| {
            PlatformError::NoData(format!("no location updates for driver {}", mapping.secondary_driver_id))
        })?;

        let coordinates = latest
            .location
            .as_ref()
            .and_then(GeoPoint::to_coordinates)
            .ok_or_else(|| PlatformError::Malformed("location has no coordinates".to_string()))?;

        Ok(LocationRecord {
            device_id: mapping.secondary_device_id.clone(),
            coordinates,
            observed_at: latest.timestamp(),
        })
    }

    async fn post_location(
        &self,
        mapping: &DeviceMapping,
        coordinates: Coordinates,
    ) -> Result<(), PlatformError> {
        let payload = LocationUpdatePayload::new(mapping, coordinates, Utc::now());

        let response = self
            .http
            .post(&self.config.url)
            .header("Authorization", auth_header(&mapping.secondary_api_token))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                debug!(truck = %mapping.secondary_device_id, "ruckit_location_posted");
                Ok(())
            }
            _ => Err(error_for_status(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping() -> DeviceMapping {
        DeviceMapping {
            authoritative_device_id: "b1".to_string(),
            secondary_device_id: "truck-9".to_string(),
            secondary_api_token: "tok".to_string(),
            secondary_driver_id: "driver-3".to_string(),
        }
    }

    #[test]
    fn test_latest_update_picks_newest_date() {
        let page: LocationUpdatesPage = serde_json::from_value(json!({
            "results": [
                { "date": "2024-05-01T10:00:00Z", "location": { "type": "Point", "coordinates": [-84.0, 33.0] } },
                { "date": "2024-05-01T12:00:00Z", "location": { "type": "Point", "coordinates": [-84.5, 33.5] } },
                { "date": "2024-05-01T11:00:00Z", "location": { "type": "Point", "coordinates": [-84.2, 33.2] } }
            ]
        }))
        .unwrap();

        let latest = latest_update(&page.results).unwrap();
        assert_eq!(latest.date.as_deref(), Some("2024-05-01T12:00:00Z"));
        let coords = latest.location.as_ref().unwrap().to_coordinates().unwrap();
        assert_eq!(coords, Coordinates::new(33.5, -84.5));
    }

    fn update(date: &str, longitude: f64) -> LocationUpdate {
        LocationUpdate {
            date: Some(date.to_string()),
            location: Some(GeoPoint { kind: point_type(), coordinates: vec![longitude, 33.0] }),
        }
    }

    fn longitude(update: &LocationUpdate) -> f64 {
        update.location.as_ref().unwrap().coordinates[0]
    }

    #[test]
    fn test_latest_update_compares_instants() {
        // Text order would put "12:00:00Z" after "12:00:00.500Z"
        let updates = vec![update("2024-05-01T12:00:00.500Z", -84.1), update("2024-05-01T12:00:00Z", -84.2)];
        assert_eq!(longitude(latest_update(&updates).unwrap()), -84.1);

        // Same instant, different offsets: 13:00+01:00 is 12:00Z, so 12:30Z is newer
        let updates = vec![update("2024-05-01T12:30:00Z", -84.3), update("2024-05-01T13:00:00+01:00", -84.4)];
        assert_eq!(longitude(latest_update(&updates).unwrap()), -84.3);
    }

    #[test]
    fn test_latest_update_tie_keeps_first() {
        let updates = vec![
            update("2024-05-01T10:00:00Z", -84.0),
            update("2024-05-01T12:00:00Z", -84.1),
            update("2024-05-01T12:00:00Z", -84.2),
        ];
        assert_eq!(longitude(latest_update(&updates).unwrap()), -84.1);
    }

    #[test]
    fn test_latest_update_unparseable_dates_fall_back_to_text() {
        let updates = vec![update("2024-05-01 10:00", -84.0), update("2024-05-01 11:00", -84.1)];
        assert_eq!(longitude(latest_update(&updates).unwrap()), -84.1);
    }

    #[test]
    fn test_latest_update_empty() {
        assert!(latest_update(&[]).is_none());
    }

    #[test]
    fn test_geo_point_requires_two_values() {
        let point = GeoPoint { kind: point_type(), coordinates: vec![1.0] };
        assert!(point.to_coordinates().is_none());
    }

    #[test]
    fn test_payload_shape() {
        let mapping = mapping();
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let payload = LocationUpdatePayload::new(&mapping, Coordinates::new(33.749, -84.3902), now);
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["truck"], "truck-9");
        assert_eq!(value["driver"], "driver-3");
        assert_eq!(value["device_id"], "b1");
        assert_eq!(value["location"]["type"], "Point");
        assert_eq!(value["location"]["coordinates"], json!([-84.3902, 33.749]));
        assert_eq!(value["speed"], 0.0);
        assert!(value["assignment"].is_null());
        assert!(value["accuracy"].is_null());
    }
}
