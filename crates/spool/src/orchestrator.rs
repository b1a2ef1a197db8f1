//! File rotation, read eligibility and deletion policy.
//!
//! The orchestrator is the only component that creates or deletes stored files.
//! It is owned by the storage actor, so every decision it makes is serialized
//! with every append and read.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::conditions::StorageConditions;
use crate::directory::{Directory, StoredFile, file_name_for};
use crate::error::{Result, StorageError};

/// The file currently receiving writes.
#[derive(Debug, Clone)]
struct WritableFile {
    name: String,
    writes: usize,
    /// Size the file has once every reserved record is appended.
    size: u64,
}

pub struct FilesOrchestrator {
    directory: Directory,
    conditions: StorageConditions,
    clock: Arc<dyn Clock>,
    writable: Option<WritableFile>,
}

impl FilesOrchestrator {
    pub fn new(directory: Directory, conditions: StorageConditions, clock: Arc<dyn Clock>) -> Self {
        Self {
            directory,
            conditions,
            clock,
            writable: None,
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn conditions(&self) -> &StorageConditions {
        &self.conditions
    }

    /// Return a file that can take `byte_size` more bytes, rotating if needed.
    ///
    /// Each call reserves one record slot in the returned file. The directory
    /// limit is enforced when a file is created, so appends to the current file
    /// may overshoot it by at most `max_file_size`.
    pub async fn file_for_writing(&mut self, byte_size: u64) -> Result<StoredFile> {
        let now = self.clock.now();

        if let Some(file) = self.reusable_file(byte_size, now).await? {
            if let Some(writable) = self.writable.as_mut() {
                writable.writes += 1;
                writable.size += byte_size;
            }
            return Ok(file);
        }

        self.rotate(byte_size, now).await
    }

    async fn reusable_file(
        &mut self,
        byte_size: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredFile>> {
        let (name, writes, expected_size) = match &self.writable {
            Some(writable) => (writable.name.clone(), writable.writes, writable.size),
            None => return Ok(None),
        };
        let write = self.conditions.write();

        if writes >= write.max_writes_per_file {
            debug!(file = %name, writes, "Rotating file: record limit reached");
            return Ok(None);
        }

        let Some(current) = self.directory.attributes(&name).await? else {
            debug!(file = %name, "Writable file disappeared, rotating");
            self.writable = None;
            return Ok(None);
        };

        // A failed or partial append leaves a torn frame at the tail; nothing may follow it.
        if current.size() != expected_size {
            warn!(
                file = %name,
                size = current.size(),
                expected_size,
                "Writable file has an unexpected size, rotating"
            );
            self.writable = None;
            return Ok(None);
        }

        if current.age(now) >= write.max_file_age_for_write {
            debug!(file = %name, "Rotating file: write window elapsed");
            return Ok(None);
        }

        // A fresh file always takes one record, so only reused files are size-checked.
        if current.size().saturating_add(byte_size) > write.max_file_size {
            debug!(file = %name, size = current.size(), byte_size, "Rotating file: size limit reached");
            return Ok(None);
        }

        Ok(Some(current))
    }

    async fn rotate(&mut self, byte_size: u64, now: DateTime<Utc>) -> Result<StoredFile> {
        self.writable = None;

        let files = self.directory.files().await?;
        let mut files = self.purge_expired(files, now).await?;

        let limit = self.conditions.write().max_directory_size;
        let mut used: u64 = files.iter().map(StoredFile::size).sum();

        if used.saturating_add(byte_size) > limit && !files.is_empty() {
            let oldest = files.remove(0);
            warn!(
                file = %oldest.name(),
                size = oldest.size(),
                directory_size = used,
                limit,
                "Storage directory full, evicting oldest file"
            );
            self.directory.delete(oldest.name()).await?;
            used = used.saturating_sub(oldest.size());
        }

        if used.saturating_add(byte_size) > limit {
            return Err(StorageError::NoSpaceAvailable {
                required: byte_size,
                limit,
            });
        }

        let name = next_file_name(&files, now);
        let file = self.directory.create_file(&name).await?;
        debug!(file = %name, "Created new writable file");

        self.writable = Some(WritableFile {
            name,
            writes: 1,
            size: file.size() + byte_size,
        });
        Ok(file)
    }

    /// The oldest file inside the read window, if any.
    ///
    /// Files past the read window are purged during the scan.
    pub async fn eligible_file_for_reading(&mut self) -> Result<Option<StoredFile>> {
        let now = self.clock.now();
        let files = self.directory.files().await?;
        let files = self.purge_expired(files, now).await?;

        let open_for_writing = self.open_for_writing(&files, now);
        let min_age = self.conditions.read().min_file_age_for_read;

        Ok(files
            .into_iter()
            .filter(|file| Some(file.name()) != open_for_writing.as_deref())
            .find(|file| file.age(now) >= min_age))
    }

    /// Name of the writable file while it is still inside its write window.
    fn open_for_writing(&mut self, files: &[StoredFile], now: DateTime<Utc>) -> Option<String> {
        let name = self.writable.as_ref()?.name.clone();
        let max_age = self.conditions.write().max_file_age_for_write;

        match files.iter().find(|file| file.name() == name) {
            Some(file) if file.age(now) < max_age => Some(name),
            _ => {
                self.writable = None;
                None
            }
        }
    }

    /// Delete files older than the read window and return the rest.
    async fn purge_expired(
        &mut self,
        files: Vec<StoredFile>,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredFile>> {
        let max_age = self.conditions.read().max_file_age_for_read;
        let mut kept = Vec::with_capacity(files.len());
        let mut purged = 0usize;

        for file in files {
            if file.age(now) <= max_age {
                kept.push(file);
                continue;
            }
            warn!(
                file = %file.name(),
                size = file.size(),
                age_secs = file.age(now).as_secs(),
                "Purging file past the read window, its events were never uploaded"
            );
            self.abandon_file(file.name());
            self.directory.delete(file.name()).await?;
            purged += 1;
        }

        if purged > 0 {
            info!(count = purged, "Purged expired files");
        }
        Ok(kept)
    }

    /// Delete a file. Deleting a file that is already gone is a no-op.
    pub async fn delete_file(&mut self, file: &StoredFile) -> Result<()> {
        self.abandon_file(file.name());
        if !self.directory.delete(file.name()).await? {
            debug!(file = %file.name(), "File already deleted");
        }
        Ok(())
    }

    /// Stop appending to `name`, e.g. after an append to it failed.
    pub fn abandon_file(&mut self, name: &str) {
        if self.writable.as_ref().is_some_and(|w| w.name == name) {
            self.writable = None;
        }
    }

    pub async fn files(&self) -> Result<Vec<StoredFile>> {
        self.directory.files().await
    }

    pub async fn directory_size(&self) -> Result<u64> {
        Ok(self.directory.files().await?.iter().map(StoredFile::size).sum())
    }
}

/// A name strictly after every existing file, based on `now`.
fn next_file_name(files: &[StoredFile], now: DateTime<Utc>) -> String {
    let newest = files.iter().map(|f| f.created_at()).max();
    let created_at = match newest {
        Some(newest) if newest >= now => newest + chrono::Duration::milliseconds(1),
        _ => now,
    };
    file_name_for(created_at)
}
