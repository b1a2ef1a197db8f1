//! Pipeline configuration.
//!
//! Values come from a preset, optionally replaced by a JSON file, then
//! overridden by `BEACON_*` environment variables. Durations are stored as
//! milliseconds so the JSON form stays flat.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use spool::{ReadConditions, StorageConditions, WriteConditions};
use uplink::{DataUploadDelay, HttpUploaderConfig, UploadDelayConfig};

use crate::error::{Error, Result};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Header carrying the client token, when one is configured.
pub const CLIENT_TOKEN_HEADER: &str = "x-client-token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding the spooled event files.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Collector URL batches are POSTed to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub client_token: Option<String>,

    /// Value of the `service` field stamped on every event.
    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_max_file_age_for_write_ms")]
    pub max_file_age_for_write_ms: u64,

    #[serde(default = "default_min_file_age_for_read_ms")]
    pub min_file_age_for_read_ms: u64,

    #[serde(default = "default_max_file_age_for_read_ms")]
    pub max_file_age_for_read_ms: u64,

    /// Also the largest batch a single upload carries.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default = "default_max_directory_size")]
    pub max_directory_size: u64,

    #[serde(default = "default_max_writes_per_file")]
    pub max_writes_per_file: usize,

    /// Events serializing to more bytes than this are dropped.
    #[serde(default = "default_max_write_size")]
    pub max_write_size: u64,

    #[serde(default = "default_initial_upload_delay_ms")]
    pub initial_upload_delay_ms: u64,

    #[serde(default = "default_default_upload_delay_ms")]
    pub default_upload_delay_ms: u64,

    #[serde(default = "default_min_upload_delay_ms")]
    pub min_upload_delay_ms: u64,

    #[serde(default = "default_max_upload_delay_ms")]
    pub max_upload_delay_ms: u64,

    #[serde(default = "default_upload_delay_decrease_factor")]
    pub upload_delay_decrease_factor: f64,

    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,

    /// Unplugged devices below this charge level stop uploading.
    #[serde(default = "default_min_battery_level")]
    pub min_battery_level: f32,

    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./data/beacon")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8126/api/v2/logs".to_string()
}

fn default_service() -> String {
    "beacon".to_string()
}

fn default_max_file_age_for_write_ms() -> u64 {
    4_750
}

fn default_min_file_age_for_read_ms() -> u64 {
    5_250
}

fn default_max_file_age_for_read_ms() -> u64 {
    18 * 60 * 60 * 1000 // 18 hours
}

fn default_max_file_size() -> u64 {
    4 * MIB
}

fn default_max_directory_size() -> u64 {
    512 * MIB
}

fn default_max_writes_per_file() -> usize {
    500
}

fn default_max_write_size() -> u64 {
    256 * KIB
}

fn default_initial_upload_delay_ms() -> u64 {
    5_000
}

fn default_default_upload_delay_ms() -> u64 {
    5_000
}

fn default_min_upload_delay_ms() -> u64 {
    1_000
}

fn default_max_upload_delay_ms() -> u64 {
    20_000
}

fn default_upload_delay_decrease_factor() -> f64 {
    0.9
}

fn default_upload_timeout_ms() -> u64 {
    20_000
}

fn default_min_battery_level() -> f32 {
    uplink::conditions::DEFAULT_MIN_BATTERY_LEVEL
}

fn default_mailbox_capacity() -> usize {
    spool::DEFAULT_MAILBOX_CAPACITY
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::app()
    }
}

impl PipelineConfig {
    /// Thresholds for a long-running host process.
    pub fn app() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            log_dir: default_log_dir(),
            endpoint: default_endpoint(),
            client_token: None,
            service: default_service(),
            max_file_age_for_write_ms: default_max_file_age_for_write_ms(),
            min_file_age_for_read_ms: default_min_file_age_for_read_ms(),
            max_file_age_for_read_ms: default_max_file_age_for_read_ms(),
            max_file_size: default_max_file_size(),
            max_directory_size: default_max_directory_size(),
            max_writes_per_file: default_max_writes_per_file(),
            max_write_size: default_max_write_size(),
            initial_upload_delay_ms: default_initial_upload_delay_ms(),
            default_upload_delay_ms: default_default_upload_delay_ms(),
            min_upload_delay_ms: default_min_upload_delay_ms(),
            max_upload_delay_ms: default_max_upload_delay_ms(),
            upload_delay_decrease_factor: default_upload_delay_decrease_factor(),
            upload_timeout_ms: default_upload_timeout_ms(),
            min_battery_level: default_min_battery_level(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }

    /// Thresholds for short-lived processes: files become readable and
    /// uploads start sooner.
    pub fn app_extension() -> Self {
        Self {
            max_file_age_for_write_ms: 1_000,
            min_file_age_for_read_ms: 2_000,
            initial_upload_delay_ms: 1_000,
            default_upload_delay_ms: 3_000,
            min_upload_delay_ms: 1_000,
            max_upload_delay_ms: 5_000,
            ..Self::app()
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Resolve the config the binary runs with.
    ///
    /// Reads `.env`, starts from `BEACON_CONFIG` (a JSON file) or the preset
    /// named by `BEACON_PRESET`, applies the remaining overrides and validates.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var("BEACON_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(path.trim())?,
            _ => match std::env::var("BEACON_PRESET").as_deref() {
                Ok("app_extension") => Self::app_extension(),
                Ok("app") | Err(_) => Self::app(),
                Ok(other) => return Err(Error::config(format!("unknown preset `{other}`"))),
            },
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `BEACON_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `BEACON_*` overrides looked up through `lookup`.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = text("BEACON_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(dir) = text("BEACON_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(endpoint) = text("BEACON_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(token) = text("BEACON_CLIENT_TOKEN") {
            self.client_token = Some(token);
        }
        if let Some(service) = text("BEACON_SERVICE") {
            self.service = service;
        }

        override_parsed(&lookup, "BEACON_MAX_FILE_SIZE", &mut self.max_file_size);
        override_parsed(&lookup, "BEACON_MAX_DIRECTORY_SIZE", &mut self.max_directory_size);
        override_parsed(&lookup, "BEACON_MAX_WRITE_SIZE", &mut self.max_write_size);
        override_parsed(&lookup, "BEACON_UPLOAD_TIMEOUT_MS", &mut self.upload_timeout_ms);
        override_parsed(&lookup, "BEACON_MIN_BATTERY_LEVEL", &mut self.min_battery_level);
        override_parsed(&lookup, "BEACON_MAILBOX_CAPACITY", &mut self.mailbox_capacity);
    }

    /// Check every threshold relation the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        self.storage_conditions()?;
        self.upload_delay_config().validate()?;
        self.http_uploader_config()?;
        self.upload_headers()?;

        if !(0.0..=1.0).contains(&self.min_battery_level) {
            return Err(Error::config(format!(
                "min_battery_level ({}) must be within [0, 1]",
                self.min_battery_level
            )));
        }
        if self.mailbox_capacity == 0 {
            return Err(Error::config("mailbox_capacity must be positive"));
        }
        Ok(())
    }

    pub fn storage_conditions(&self) -> Result<StorageConditions> {
        let write = WriteConditions {
            max_file_age_for_write: Duration::from_millis(self.max_file_age_for_write_ms),
            max_file_size: self.max_file_size,
            max_directory_size: self.max_directory_size,
            max_writes_per_file: self.max_writes_per_file,
        };
        let read = ReadConditions {
            min_file_age_for_read: Duration::from_millis(self.min_file_age_for_read_ms),
            max_file_age_for_read: Duration::from_millis(self.max_file_age_for_read_ms),
        };
        Ok(StorageConditions::new(write, read, self.max_write_size)?)
    }

    pub fn upload_delay_config(&self) -> UploadDelayConfig {
        UploadDelayConfig {
            initial: Duration::from_millis(self.initial_upload_delay_ms),
            default: Duration::from_millis(self.default_upload_delay_ms),
            min: Duration::from_millis(self.min_upload_delay_ms),
            max: Duration::from_millis(self.max_upload_delay_ms),
            decrease_factor: self.upload_delay_decrease_factor,
        }
    }

    pub fn upload_delay(&self) -> Result<DataUploadDelay> {
        Ok(DataUploadDelay::new(&self.upload_delay_config())?)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn http_uploader_config(&self) -> Result<HttpUploaderConfig> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint `{}`: {e}", self.endpoint)))?;
        if self.upload_timeout_ms == 0 {
            return Err(Error::config("upload_timeout_ms must be positive"));
        }
        Ok(HttpUploaderConfig::new(endpoint).with_timeout(self.upload_timeout()))
    }

    /// Headers sent with every batch.
    pub fn upload_headers(&self) -> Result<HeaderMap> {
        let mut headers = uplink::default_headers();
        if let Some(token) = &self.client_token {
            let value = HeaderValue::from_str(token)
                .map_err(|_| Error::config("client_token contains invalid header characters"))?;
            headers.insert(HeaderName::from_static(CLIENT_TOKEN_HEADER), value);
        }
        Ok(headers)
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "Ignoring unparsable override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    #[test]
    fn presets_are_valid() {
        PipelineConfig::app().validate().unwrap();
        PipelineConfig::app_extension().validate().unwrap();
    }

    #[test]
    fn extension_preset_reads_sooner() {
        let app = PipelineConfig::app();
        let ext = PipelineConfig::app_extension();
        assert!(ext.min_file_age_for_read_ms < app.min_file_age_for_read_ms);
        assert!(ext.max_upload_delay_ms < app.max_upload_delay_ms);
        assert_eq!(ext.max_file_size, app.max_file_size);
        assert_eq!(ext.upload_delay_config().default, Duration::from_secs(3));
    }

    #[rstest]
    #[case::file_larger_than_directory(PipelineConfig { max_file_size: 1024 * MIB, ..PipelineConfig::app() })]
    #[case::write_window_reaches_read_window(PipelineConfig { max_file_age_for_write_ms: 6_000, ..PipelineConfig::app() })]
    #[case::event_larger_than_file(PipelineConfig { max_write_size: 8 * MIB, ..PipelineConfig::app() })]
    #[case::max_delay_not_above_min(PipelineConfig { max_upload_delay_ms: 1_000, ..PipelineConfig::app() })]
    #[case::zero_decrease_factor(PipelineConfig { upload_delay_decrease_factor: 0.0, ..PipelineConfig::app() })]
    #[case::bad_endpoint(PipelineConfig { endpoint: "not a url".into(), ..PipelineConfig::app() })]
    #[case::battery_above_one(PipelineConfig { min_battery_level: 1.5, ..PipelineConfig::app() })]
    #[case::zero_mailbox(PipelineConfig { mailbox_capacity: 0, ..PipelineConfig::app() })]
    #[case::zero_timeout(PipelineConfig { upload_timeout_ms: 0, ..PipelineConfig::app() })]
    fn rejects_inconsistent_config(#[case] config: PipelineConfig) {
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_file_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"endpoint": "https://intake.example/v1", "max_writes_per_file": 50}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.endpoint, "https://intake.example/v1");
        assert_eq!(config.max_writes_per_file, 50);
        assert_eq!(config.max_file_size, 4 * MIB);
        config.validate().unwrap();
    }

    #[test]
    fn overrides_replace_values_and_skip_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BEACON_ENDPOINT", "https://collector.example/intake"),
            ("BEACON_CLIENT_TOKEN", "secret"),
            ("BEACON_MAX_WRITE_SIZE", "1024"),
            ("BEACON_MAILBOX_CAPACITY", "many"),
            ("BEACON_SERVICE", "  "),
        ]);
        let mut config = PipelineConfig::app();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.endpoint, "https://collector.example/intake");
        assert_eq!(config.client_token.as_deref(), Some("secret"));
        assert_eq!(config.max_write_size, 1024);
        assert_eq!(config.mailbox_capacity, spool::DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(config.service, "beacon");

        let headers = config.upload_headers().unwrap();
        assert_eq!(headers[CLIENT_TOKEN_HEADER], "secret");
    }
}
