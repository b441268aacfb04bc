//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Geotab credentials can be supplied through GEOTAB_USERNAME, GEOTAB_DATABASE
//! and GEOTAB_PASSWORD, which take precedence over the file.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const ENV_CONFIG_FILE: &str = "CONFIG_FILE";
pub const ENV_GEOTAB_USERNAME: &str = "GEOTAB_USERNAME";
pub const ENV_GEOTAB_DATABASE: &str = "GEOTAB_DATABASE";
pub const ENV_GEOTAB_PASSWORD: &str = "GEOTAB_PASSWORD";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Label attached to exported metrics
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "location-sync".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeotabConfigFile {
    #[serde(default = "default_geotab_url")]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_geotab_timeout_ms")]
    pub timeout_ms: u64,
    /// AddInData type tag carrying device mappings
    #[serde(default = "default_addin_type")]
    pub addin_type: String,
}

impl Default for GeotabConfigFile {
    fn default() -> Self {
        Self {
            url: default_geotab_url(),
            username: String::new(),
            database: String::new(),
            password: String::new(),
            timeout_ms: default_geotab_timeout_ms(),
            addin_type: default_addin_type(),
        }
    }
}

fn default_geotab_url() -> String {
    "https://my.geotab.com/apiv1".to_string()
}

fn default_geotab_timeout_ms() -> u64 {
    15000
}

fn default_addin_type() -> String {
    "ri-device".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuckitConfigFile {
    #[serde(default = "default_ruckit_url")]
    pub url: String,
    #[serde(default = "default_ruckit_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RuckitConfigFile {
    fn default() -> Self {
        Self { url: default_ruckit_url(), timeout_ms: default_ruckit_timeout_ms() }
    }
}

fn default_ruckit_url() -> String {
    "https://ruckit-platform.herokuapp.com/api/locationupdates/".to_string()
}

fn default_ruckit_timeout_ms() -> u64 {
    10000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Per-axis tolerance in decimal degrees
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Upper bound on in-flight per-device requests
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Detect and log, but never post corrections
    #[serde(default)]
    pub dry_run: bool,
    /// Consecutive aborted cycles before escalating to error-level alerts
    #[serde(default = "default_alert_after_failed_cycles")]
    pub alert_after_failed_cycles: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            tolerance: default_tolerance(),
            max_concurrency: default_max_concurrency(),
            dry_run: false,
            alert_after_failed_cycles: default_alert_after_failed_cycles(),
        }
    }
}

impl SyncConfig {
    /// Replace values the scheduler cannot run with
    fn sanitized(mut self) -> Self {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            warn!(
                tolerance = %self.tolerance,
                default = %default_tolerance(),
                "invalid_tolerance_using_default"
            );
            self.tolerance = default_tolerance();
        }
        if self.interval_secs == 0 {
            warn!("zero_interval_clamped");
            self.interval_secs = 1;
        }
        if self.max_concurrency == 0 {
            warn!("zero_concurrency_clamped");
            self.max_concurrency = 1;
        }
        self
    }
}

fn default_interval_secs() -> u64 {
    120
}

fn default_tolerance() -> f64 {
    0.0001
}

fn default_max_concurrency() -> usize {
    8
}

fn default_alert_after_failed_cycles() -> u64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval between metrics log lines
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs(), prometheus_port: 0 }
    }
}

fn default_metrics_interval_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub geotab: GeotabConfigFile,
    #[serde(default)]
    pub ruckit: RuckitConfigFile,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Clone)]
pub struct Config {
    site_id: String,
    geotab_url: String,
    geotab_username: String,
    geotab_database: String,
    geotab_password: String,
    geotab_timeout_ms: u64,
    addin_type: String,
    ruckit_url: String,
    ruckit_timeout_ms: u64,
    sync_interval_secs: u64,
    tolerance: f64,
    max_concurrency: usize,
    dry_run: bool,
    alert_after_failed_cycles: u64,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("site_id", &self.site_id)
            .field("geotab_url", &self.geotab_url)
            .field("geotab_username", &self.geotab_username)
            .field("geotab_database", &self.geotab_database)
            .field("geotab_password", &"<redacted>")
            .field("ruckit_url", &self.ruckit_url)
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("tolerance", &self.tolerance)
            .field("dry_run", &self.dry_run)
            .field("config_file", &self.config_file)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let sync = toml_config.sync.sanitized();
        Self {
            site_id: toml_config.site.id,
            geotab_url: toml_config.geotab.url,
            geotab_username: toml_config.geotab.username,
            geotab_database: toml_config.geotab.database,
            geotab_password: toml_config.geotab.password,
            geotab_timeout_ms: toml_config.geotab.timeout_ms,
            addin_type: toml_config.geotab.addin_type,
            ruckit_url: toml_config.ruckit.url,
            ruckit_timeout_ms: toml_config.ruckit.timeout_ms,
            sync_interval_secs: sync.interval_secs,
            tolerance: sync.tolerance,
            max_concurrency: sync.max_concurrency,
            dry_run: sync.dry_run,
            alert_after_failed_cycles: sync.alert_after_failed_cycles,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Config path from an explicit argument, then CONFIG_FILE, then the default
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }

        if let Ok(path) = env::var(ENV_CONFIG_FILE) {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults,
    /// then applies credential overrides from the environment
    pub fn load_from_path(path: &str) -> Self {
        let mut config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        config
    }

    /// Override credentials from `lookup`; empty values are ignored
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(username) = pick(ENV_GEOTAB_USERNAME) {
            self.geotab_username = username;
        }
        if let Some(database) = pick(ENV_GEOTAB_DATABASE) {
            self.geotab_database = database;
        }
        if let Some(password) = pick(ENV_GEOTAB_PASSWORD) {
            self.geotab_password = password;
        }
    }

    /// Names of required credentials that are still empty
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.geotab_username.is_empty() {
            missing.push(ENV_GEOTAB_USERNAME);
        }
        if self.geotab_database.is_empty() {
            missing.push(ENV_GEOTAB_DATABASE);
        }
        if self.geotab_password.is_empty() {
            missing.push(ENV_GEOTAB_PASSWORD);
        }
        missing
    }

    /// Force dry-run regardless of the file setting
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn geotab_url(&self) -> &str {
        &self.geotab_url
    }

    pub fn geotab_username(&self) -> &str {
        &self.geotab_username
    }

    pub fn geotab_database(&self) -> &str {
        &self.geotab_database
    }

    pub fn geotab_password(&self) -> &str {
        &self.geotab_password
    }

    pub fn geotab_timeout_ms(&self) -> u64 {
        self.geotab_timeout_ms
    }

    pub fn addin_type(&self) -> &str {
        &self.addin_type
    }

    pub fn ruckit_url(&self) -> &str {
        &self.ruckit_url
    }

    pub fn ruckit_timeout_ms(&self) -> u64 {
        self.ruckit_timeout_ms
    }

    pub fn sync_interval_secs(&self) -> u64 {
        self.sync_interval_secs
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn alert_after_failed_cycles(&self) -> u64 {
        self.alert_after_failed_cycles
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
