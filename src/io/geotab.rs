//! MyGeotab JSON-RPC client (authoritative platform)
//!
//! Protocol:
//! - Every call is `POST {endpoint}` with `{"method": ..., "params": {...}}`
//! - Reply is `{"result": ...}` or `{"error": {"message": ..., "errors": [{"name": ...}]}}`
//! - `Authenticate` returns session credentials and a `path`. Anything other than
//!   `ThisServer` names the host the database lives on; later calls go there.

use crate::domain::error::PlatformError;
use crate::infra::config::Config;
use crate::io::platform::{AuthoritativePlatform, DeviceStatus, MappingRecord, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const THIS_SERVER: &str = "ThisServer";
const INVALID_USER_EXCEPTION: &str = "InvalidUserException";

const TYPE_ADD_IN_DATA: &str = "AddInData";
const TYPE_DEVICE_STATUS_INFO: &str = "DeviceStatusInfo";

// AddInData `details` keys
const DETAIL_TYPE: &str = "type";
const DETAIL_SOURCE_DEVICE: &str = "gt-device";
const DETAIL_SECONDARY_DEVICE: &str = "ri-device";
const DETAIL_SECONDARY_TOKEN: &str = "ri-token";
const DETAIL_SECONDARY_DRIVER: &str = "ri-driver";

#[derive(Debug, Clone)]
pub struct GeotabConfig {
    pub url: String,
    pub username: String,
    pub database: String,
    pub password: String,
    pub timeout: Duration,
}

impl GeotabConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.geotab_url().to_string(),
            username: config.geotab_username().to_string(),
            database: config.geotab_database().to_string(),
            password: config.geotab_password().to_string(),
            timeout: Duration::from_millis(config.geotab_timeout_ms()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<RpcErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorDetail {
    #[serde(default)]
    name: String,
}

impl RpcError {
    fn into_platform_error(self) -> PlatformError {
        if self.errors.iter().any(|e| e.name == INVALID_USER_EXCEPTION) {
            PlatformError::Auth(self.message)
        } else {
            PlatformError::Remote(self.message)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credentials {
    database: String,
    user_name: String,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct AuthenticateResult {
    credentials: Credentials,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct AddInData {
    #[serde(rename = "type", default)]
    record_type: Option<String>,
    #[serde(default)]
    details: Value,
}

#[derive(Debug, Deserialize)]
struct DeviceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceStatusInfo {
    #[serde(default)]
    device: Option<DeviceRef>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    date_time: Option<String>,
}

/// Read a details field, accepting numbers as well as strings
fn detail_str(details: &Value, key: &str) -> Option<String> {
    match details.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<AddInData> for MappingRecord {
    fn from(data: AddInData) -> Self {
        // Some tenants store details as a JSON-encoded string
        let details = match data.details {
            Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::Null),
            other => other,
        };
        // Storage records carry the tag inside `details`; older ones at the top level
        let record_type = data
            .record_type
            .filter(|t| !t.is_empty())
            .or_else(|| detail_str(&details, DETAIL_TYPE))
            .unwrap_or_default();
        MappingRecord {
            record_type,
            source_device_id: detail_str(&details, DETAIL_SOURCE_DEVICE),
            secondary_device_id: detail_str(&details, DETAIL_SECONDARY_DEVICE),
            secondary_token: detail_str(&details, DETAIL_SECONDARY_TOKEN),
            secondary_driver_id: detail_str(&details, DETAIL_SECONDARY_DRIVER),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Endpoint that serves the database after authentication
fn session_endpoint(login_url: &str, path: &str) -> String {
    if path.is_empty() || path == THIS_SERVER {
        login_url.to_string()
    } else {
        format!("https://{}/apiv1", path.trim_end_matches('/'))
    }
}

pub struct GeotabClient {
    config: GeotabConfig,
    http: reqwest::Client,
}

impl GeotabClient {
    pub fn new(config: GeotabConfig) -> Result<Self, PlatformError> {
        // Create HTTP client once for reuse (connection pooling)
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> Result<T, PlatformError> {
        let body = json!({ "method": method, "params": params });
        let response = self.http.post(endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Status { status: status.as_u16(), body });
        }

        let envelope: RpcResponse<T> =
            response.json().await.map_err(|e| PlatformError::Malformed(e.to_string()))?;
        if let Some(error) = envelope.error {
            return Err(error.into_platform_error());
        }
        envelope
            .result
            .ok_or_else(|| PlatformError::Malformed(format!("{method} returned no result")))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        type_name: &str,
        search: Option<Value>,
    ) -> Result<Vec<T>, PlatformError> {
        let credentials = Credentials {
            database: session.database.clone(),
            user_name: session.user_name.clone(),
            session_id: session.session_id.clone(),
        };
        let mut params = json!({ "typeName": type_name, "credentials": credentials });
        if let Some(search) = search {
            params["search"] = search;
        }

        debug!(type_name = %type_name, "geotab_get");
        self.call(&session.endpoint, "Get", params).await
    }
}

#[async_trait]
impl AuthoritativePlatform for GeotabClient {
    async fn authenticate(&self) -> Result<Session, PlatformError> {
        let params = json!({
            "database": self.config.database,
            "userName": self.config.username,
            "password": self.config.password,
        });

        let result: AuthenticateResult =
            self.call(&self.config.url, "Authenticate", params).await?;
        let endpoint = session_endpoint(&self.config.url, &result.path);

        info!(database = %result.credentials.database, endpoint = %endpoint, "geotab_authenticated");

        Ok(Session {
            database: result.credentials.database,
            user_name: result.credentials.user_name,
            session_id: result.credentials.session_id,
            endpoint,
        })
    }

    async fn mapping_records(
        &self,
        session: &Session,
        record_type: &str,
    ) -> Result<Vec<MappingRecord>, PlatformError> {
        let search = json!({ "whereClause": format!("type = \"{}\"", record_type) });
        let records: Vec<AddInData> = self.get(session, TYPE_ADD_IN_DATA, Some(search)).await?;
        Ok(records.into_iter().map(MappingRecord::from).collect())
    }

    async fn device_statuses(&self, session: &Session) -> Result<Vec<DeviceStatus>, PlatformError> {
        let statuses: Vec<DeviceStatusInfo> =
            self.get(session, TYPE_DEVICE_STATUS_INFO, None).await?;

        Ok(statuses
            .into_iter()
            .filter_map(|status| {
                let Some(device) = status.device else {
                    debug!("geotab_status_without_device");
                    return None;
                };
                Some(DeviceStatus {
                    device_id: device.id,
                    latitude: status.latitude,
                    longitude: status.longitude,
                    observed_at: status.date_time.as_deref().and_then(parse_timestamp),
                })
            })
            .collect())
    }
}
