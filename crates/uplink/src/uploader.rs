//! Transport boundary.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::time::Duration;

use crate::error::UploadError;

/// Delivers one batch body to the collector.
#[async_trait]
pub trait DataUploader: Send + Sync {
    /// Send `payload`. `Ok` means the collector acknowledged it.
    async fn upload(&self, payload: Bytes, headers: &HeaderMap) -> Result<(), UploadError>;

    /// Upper bound for one attempt. An attempt that takes longer is retried later.
    fn timeout(&self) -> Duration;
}
