//! HTTP transport built on `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::error::{ConfigError, UploadError};
use crate::uploader::DataUploader;

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(20);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Settings for [`HttpUploader`].
#[derive(Debug, Clone)]
pub struct HttpUploaderConfig {
    pub endpoint: Url,
    pub timeout: Duration,
    pub user_agent: String,
}

impl HttpUploaderConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_UPLOAD_TIMEOUT,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// POSTs batch bodies to a collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpUploader {
    pub fn new(config: HttpUploaderConfig) -> Result<Self, ConfigError> {
        if !matches!(config.endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUploader(format!(
                "unsupported endpoint scheme `{}`",
                config.endpoint.scheme()
            )));
        }
        if config.timeout.is_zero() {
            return Err(ConfigError::InvalidUploader(
                "upload timeout must be positive".into(),
            ));
        }

        install_rustls_provider();

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| ConfigError::InvalidUploader(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            timeout: config.timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Headers every batch is sent with unless the caller overrides them.
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

#[async_trait]
impl DataUploader for HttpUploader {
    async fn upload(&self, payload: Bytes, headers: &HeaderMap) -> Result<(), UploadError> {
        let size = payload.len();
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers.clone())
            .body(payload)
            .send()
            .await
            .map_err(|e| UploadError::from_reqwest(&e))?;

        let status = response.status();
        trace!(%status, size, endpoint = %self.endpoint, "Collector responded");

        if status.is_success() {
            Ok(())
        } else {
            Err(UploadError::from_status(status))
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
