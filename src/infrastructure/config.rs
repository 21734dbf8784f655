use crate::domain::classifier::DayBoundary;
use crate::infrastructure::credential_store::DEFAULT_CREDENTIAL_SERVICE;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_STORAGE_KEY: &str = "reviewData";
const DEFAULT_SYNC_INTERVAL_SECONDS: u64 = 60;
const MIN_SYNC_INTERVAL_SECONDS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
const MIN_REQUEST_TIMEOUT_SECONDS: u64 = 1;
const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_API_BASE_URL: &[&str] = &["REVIEW_API_BASE_URL"];
const ENV_SYNC_INTERVAL: &[&str] = &["REVIEW_SYNC_INTERVAL_SECONDS"];
const ENV_REQUEST_TIMEOUT: &[&str] = &["REVIEW_REQUEST_TIMEOUT_SECONDS"];
const ENV_TIMEZONE: &[&str] = &["REVIEW_TIMEZONE"];
const ENV_LOG_LEVEL: &[&str] = &["REVIEW_LOG_LEVEL", "RUST_LOG"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u64,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_sync_interval_seconds")]
    pub sync_interval_seconds: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_credential_service")]
    pub credential_service: String,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_sync_interval_seconds() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECONDS
}

fn default_request_timeout_seconds() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_credential_service() -> String {
    DEFAULT_CREDENTIAL_SERVICE.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            api_base_url: default_api_base_url(),
            sync_interval_seconds: DEFAULT_SYNC_INTERVAL_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            storage_key: default_storage_key(),
            timezone: None,
            log_level: default_log_level(),
            credential_service: default_credential_service(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.schema != SUPPORTED_SCHEMA {
            return Err(InfraError::InvalidConfig(format!(
                "unsupported schema {}",
                self.schema
            )));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "apiBaseUrl must not be empty".to_string(),
            ));
        }
        if self.storage_key.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "storageKey must not be empty".to_string(),
            ));
        }
        if self.sync_interval_seconds < MIN_SYNC_INTERVAL_SECONDS {
            return Err(InfraError::InvalidConfig(format!(
                "syncIntervalSeconds must be at least {MIN_SYNC_INTERVAL_SECONDS}"
            )));
        }
        if self.request_timeout_seconds < MIN_REQUEST_TIMEOUT_SECONDS {
            return Err(InfraError::InvalidConfig(format!(
                "requestTimeoutSeconds must be at least {MIN_REQUEST_TIMEOUT_SECONDS}"
            )));
        }
        self.day_boundary()?;
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn day_boundary(&self) -> Result<DayBoundary, InfraError> {
        DayBoundary::from_name(self.timezone.as_deref()).map_err(InfraError::InvalidConfig)
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config_from_lookup<F>(config_dir: &Path, lookup: F) -> Result<AppConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = config_dir.join(APP_JSON);
    let value = read_config(&path)?;
    let mut config: AppConfig = serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;

    if let Some(base_url) = optional_lookup_value(&lookup, ENV_API_BASE_URL) {
        config.api_base_url = base_url;
    }
    if let Some(seconds) = optional_lookup_seconds(&lookup, ENV_SYNC_INTERVAL)? {
        config.sync_interval_seconds = seconds;
    }
    if let Some(seconds) = optional_lookup_seconds(&lookup, ENV_REQUEST_TIMEOUT)? {
        config.request_timeout_seconds = seconds;
    }
    if let Some(timezone) = optional_lookup_value(&lookup, ENV_TIMEZONE) {
        config.timezone = Some(timezone);
    }
    if let Some(level) = optional_lookup_value(&lookup, ENV_LOG_LEVEL) {
        config.log_level = level;
    }

    config.api_base_url = config.api_base_url.trim().to_string();
    config.storage_key = config.storage_key.trim().to_string();
    config.validate()?;
    Ok(config)
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

fn optional_lookup_seconds<F>(lookup: &F, keys: &[&str]) -> Result<Option<u64>, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys)
        .map(|raw| {
            raw.parse::<u64>().map_err(|error| {
                InfraError::InvalidConfig(format!("{} must be whole seconds: {error}", keys.join("/")))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "review-scheduler-config-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp dir");
            Self { path }
        }

        fn write_app(&self, value: serde_json::Value) {
            fs::write(self.path.join(APP_JSON), value.to_string()).expect("write app.json");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_is_written_once_and_loads() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        dir.write_app(serde_json::json!({"schema": 1, "apiBaseUrl": "https://reviews.example/api"}));
        ensure_default_configs(&dir.path).expect("keep existing");

        let config = load_app_config_from_lookup(&dir.path, no_env).expect("load");
        assert_eq!(config.api_base_url, "https://reviews.example/api");
        assert_eq!(config.sync_interval(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.day_boundary().expect("boundary"), DayBoundary::Local);
    }

    #[test]
    fn lookup_overrides_file_values() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        let env = HashMap::from([
            ("REVIEW_API_BASE_URL", " http://10.0.0.2:3000/api "),
            ("REVIEW_SYNC_INTERVAL_SECONDS", "30"),
            ("REVIEW_TIMEZONE", "Asia/Shanghai"),
            ("RUST_LOG", "debug"),
        ]);

        let config = load_app_config_from_lookup(&dir.path, |key| {
            env.get(key).map(|value| value.to_string())
        })
        .expect("load");

        assert_eq!(config.api_base_url, "http://10.0.0.2:3000/api");
        assert_eq!(config.sync_interval_seconds, 30);
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.day_boundary().expect("boundary"),
            DayBoundary::Named(chrono_tz::Asia::Shanghai)
        );
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let dir = TempConfigDir::new();

        dir.write_app(serde_json::json!({"schema": 2}));
        assert!(matches!(
            load_app_config_from_lookup(&dir.path, no_env),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write_app(serde_json::json!({"schema": 1, "syncIntervalSeconds": 1}));
        assert!(matches!(
            load_app_config_from_lookup(&dir.path, no_env),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write_app(serde_json::json!({"schema": 1, "timezone": "Nowhere/Special"}));
        assert!(matches!(
            load_app_config_from_lookup(&dir.path, no_env),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write_app(serde_json::json!({"schema": 1}));
        let bad_env = load_app_config_from_lookup(&dir.path, |key| {
            (key == "REVIEW_REQUEST_TIMEOUT_SECONDS").then(|| "soon".to_string())
        });
        assert!(matches!(bad_env, Err(InfraError::InvalidConfig(_))));
    }
}
