//! Batch reader.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::directory::StoredFile;
use crate::error::Result;
use crate::storage::{StorageCommand, request};

/// All records of one stored file, uploaded as a unit.
#[derive(Debug, Clone)]
pub struct Batch {
    file: StoredFile,
    records: Vec<Bytes>,
}

impl Batch {
    pub(crate) fn new(file: StoredFile, records: Vec<Bytes>) -> Self {
        Self { file, records }
    }

    /// Name of the file the batch was read from.
    pub fn file_name(&self) -> &str {
        self.file.name()
    }

    pub fn records(&self) -> &[Bytes] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records joined into a JSON array body: `[r1,r2,...]`.
    pub fn to_json_array(&self) -> Bytes {
        let size: usize = self.records.iter().map(|r| r.len() + 1).sum();
        let mut body = BytesMut::with_capacity(size + 2);
        body.put_u8(b'[');
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                body.put_u8(b',');
            }
            body.put_slice(record);
        }
        body.put_u8(b']');
        body.freeze()
    }
}

/// Reads batches through the storage actor.
#[derive(Debug, Clone)]
pub struct FileReader {
    sender: mpsc::Sender<StorageCommand>,
}

impl FileReader {
    pub(crate) fn new(sender: mpsc::Sender<StorageCommand>) -> Self {
        Self { sender }
    }

    /// The oldest readable file as a batch, if any.
    pub async fn next_batch(&self) -> Result<Option<Batch>> {
        request(&self.sender, StorageCommand::NextBatch).await?
    }

    /// Delete the batch's file after the collector acknowledged it.
    pub async fn confirm(&self, batch: Batch) -> Result<()> {
        debug!(file = %batch.file_name(), records = batch.len(), "Batch delivered");
        self.delete(batch).await
    }

    /// Delete the batch's file without delivering it.
    pub async fn discard(&self, batch: Batch) -> Result<()> {
        warn!(
            file = %batch.file_name(),
            records = batch.len(),
            "Discarding batch, its events are lost"
        );
        self.delete(batch).await
    }

    async fn delete(&self, batch: Batch) -> Result<()> {
        let file = batch.file;
        request(&self.sender, |reply| StorageCommand::Delete { file, reply }).await?
    }
}
