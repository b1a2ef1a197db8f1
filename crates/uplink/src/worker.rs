//! The upload loop.

use reqwest::header::HeaderMap;
use spool::{Batch, FileReader};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conditions::DataUploadConditions;
use crate::delay::DataUploadDelay;
use crate::error::UploadError;
use crate::http::default_headers;
use crate::uploader::DataUploader;

/// What one upload cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Battery or network blocked the attempt.
    ConditionsNotMet,
    /// Nothing was old enough to upload.
    NoBatch,
    /// The batch was acknowledged and its file deleted.
    Delivered,
    /// The upload failed transiently; the file stays for the next attempt.
    RetryScheduled,
    /// The collector rejected the batch; its file was deleted.
    Discarded,
}

/// Periodically moves the oldest readable batch from the spool to the collector.
pub struct DataUploadWorker {
    reader: FileReader,
    uploader: Arc<dyn DataUploader>,
    conditions: DataUploadConditions,
    delay: DataUploadDelay,
    headers: HeaderMap,
}

impl DataUploadWorker {
    pub fn new(
        reader: FileReader,
        uploader: Arc<dyn DataUploader>,
        conditions: DataUploadConditions,
        delay: DataUploadDelay,
    ) -> Self {
        Self {
            reader,
            uploader,
            conditions,
            delay,
            headers: default_headers(),
        }
    }

    /// Replace the headers sent with every batch.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn delay(&self) -> &DataUploadDelay {
        &self.delay
    }

    /// One iteration of the loop, without the wait before it.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let blockers = self.conditions.blockers();
        if !blockers.is_empty() {
            debug!(?blockers, "Upload conditions not met, skipping cycle");
            return CycleOutcome::ConditionsNotMet;
        }

        let batch = match self.reader.next_batch().await {
            Ok(Some(batch)) => batch,
            Ok(None) => return CycleOutcome::NoBatch,
            Err(e) => {
                warn!(error = %e, "Failed to read next batch");
                return CycleOutcome::NoBatch;
            }
        };

        match self.upload(&batch).await {
            Ok(()) => {
                if let Err(e) = self.reader.confirm(batch).await {
                    warn!(error = %e, "Failed to delete delivered batch");
                }
                self.delay.decrease();
                CycleOutcome::Delivered
            }
            Err(e) if e.is_retryable() => {
                debug!(file = %batch.file_name(), error = %e, "Upload failed, keeping batch");
                self.delay.increase_once();
                CycleOutcome::RetryScheduled
            }
            Err(e) => {
                warn!(file = %batch.file_name(), error = %e, "Collector rejected batch");
                if let Err(e) = self.reader.discard(batch).await {
                    warn!(error = %e, "Failed to delete rejected batch");
                }
                self.delay.increase_once();
                CycleOutcome::Discarded
            }
        }
    }

    async fn upload(&self, batch: &Batch) -> Result<(), UploadError> {
        let timeout = self.uploader.timeout();
        let payload = batch.to_json_array();
        debug!(
            file = %batch.file_name(),
            records = batch.len(),
            size = payload.len(),
            "Uploading batch"
        );
        tokio::time::timeout(timeout, self.uploader.upload(payload, &self.headers))
            .await
            .unwrap_or_else(|_| Err(UploadError::timeout(timeout)))
    }

    /// Run the loop on the current runtime until the handle is stopped.
    pub fn spawn(mut self) -> UploadWorkerHandle {
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();

        info!(initial_delay = ?self.delay.current(), "Starting upload worker");
        let task = tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    break;
                }

                let wait = self.delay.next_upload_delay();
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                let outcome = self.run_cycle().await;
                debug!(?outcome, next_delay = ?self.delay.current(), "Upload cycle finished");
            }
            info!("Upload worker stopped");
        });

        UploadWorkerHandle {
            cancellation_token,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }
}

/// Controls a spawned [`DataUploadWorker`].
pub struct UploadWorkerHandle {
    cancellation_token: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl UploadWorkerHandle {
    /// Stop after the current cycle and wait for the task to exit.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Upload worker terminated abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}
