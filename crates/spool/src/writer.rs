//! Non-blocking event writer.

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::error::StorageError;
use crate::storage::StorageCommand;

/// Hands events to the storage actor.
///
/// Every method returns immediately. Events that cannot be stored are dropped
/// and reported through `tracing`, never to the caller.
#[derive(Debug, Clone)]
pub struct FileWriter {
    sender: mpsc::Sender<StorageCommand>,
    max_write_size: u64,
}

impl FileWriter {
    pub(crate) fn new(sender: mpsc::Sender<StorageCommand>, max_write_size: u64) -> Self {
        Self {
            sender,
            max_write_size,
        }
    }

    /// Serialize `event` as JSON and enqueue it.
    pub fn write<T: Serialize + ?Sized>(&self, event: &T) {
        match serde_json::to_vec(event) {
            Ok(payload) => self.write_raw(payload),
            Err(e) => {
                let e = StorageError::from(e);
                warn!(error = %e, "Dropping event");
            }
        }
    }

    /// Enqueue an already serialized event.
    pub fn write_raw(&self, payload: impl Into<Bytes>) {
        let payload = payload.into();
        let size = payload.len() as u64;

        if size > self.max_write_size {
            let e = StorageError::OversizedEvent {
                size,
                limit: self.max_write_size,
            };
            warn!(error = %e, "Dropping event");
            return;
        }

        match self.sender.try_send(StorageCommand::Write(payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(size, "Storage mailbox is full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(size, "Storage has stopped, dropping event");
            }
        }
    }

    pub fn max_write_size(&self) -> u64 {
        self.max_write_size
    }
}
