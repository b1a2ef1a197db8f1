//! Wiring of the storage actor and the upload worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use spool::{Clock, FileReader, FileWriter, Storage, StorageHandle, SystemClock};
use uplink::{DataUploadConditions, DataUploadWorker, DataUploader, UploadWorkerHandle};

use crate::config::PipelineConfig;
use crate::error::Result;

/// One log line as it is stored and uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            service: service.into(),
        }
    }
}

/// A running pipeline: events written through [`writer`](Self::writer) are
/// persisted, then uploaded in the background.
pub struct TelemetryPipeline {
    writer: FileWriter,
    reader: FileReader,
    storage: StorageHandle,
    worker: UploadWorkerHandle,
}

impl TelemetryPipeline {
    pub async fn start(
        config: &PipelineConfig,
        uploader: Arc<dyn DataUploader>,
        conditions: DataUploadConditions,
    ) -> Result<Self> {
        Self::start_with_clock(config, uploader, conditions, Arc::new(SystemClock)).await
    }

    /// Like [`start`](Self::start), with file ages measured by `clock`.
    pub async fn start_with_clock(
        config: &PipelineConfig,
        uploader: Arc<dyn DataUploader>,
        conditions: DataUploadConditions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let storage = Storage::open(
            &config.storage_dir,
            config.storage_conditions()?,
            clock,
            config.mailbox_capacity,
        )
        .await?;

        let worker = DataUploadWorker::new(
            storage.reader.clone(),
            uploader,
            conditions.with_min_battery_level(config.min_battery_level),
            config.upload_delay()?,
        )
        .with_headers(config.upload_headers()?)
        .spawn();

        info!(
            storage_dir = %config.storage_dir.display(),
            endpoint = %config.endpoint,
            "Telemetry pipeline started"
        );

        Ok(Self {
            writer: storage.writer,
            reader: storage.reader,
            storage: storage.handle,
            worker,
        })
    }

    pub fn writer(&self) -> &FileWriter {
        &self.writer
    }

    pub fn reader(&self) -> &FileReader {
        &self.reader
    }

    /// Wait until every event written so far is on disk.
    pub async fn flush(&self) -> Result<()> {
        Ok(self.storage.flush().await?)
    }

    /// Stop uploading, then persist the queued events and stop storage.
    ///
    /// Events that were not uploaded stay on disk for the next run.
    pub async fn shutdown(&self) {
        self.worker.stop().await;
        self.storage.stop().await;
        info!("Telemetry pipeline stopped");
    }
}
