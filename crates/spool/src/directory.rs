//! Filesystem namespace holding the stored files.
//!
//! File names are the creation time in milliseconds since the Unix epoch,
//! zero-padded so that lexical order equals creation order. The creation time
//! is decoded from the name; only the size is read from file metadata.

use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Result, StorageError};

const FILE_NAME_WIDTH: usize = 16;

/// A file in the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    name: String,
    created_at: DateTime<Utc>,
    size: u64,
}

impl StoredFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Age relative to `now`, zero if the clock went backwards.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            name,
            created_at,
            size: 0,
        }
    }
}

/// Encode a creation time as a sortable file name.
pub(crate) fn file_name_for(created_at: DateTime<Utc>) -> String {
    format!(
        "{:0width$}",
        created_at.timestamp_millis().max(0),
        width = FILE_NAME_WIDTH
    )
}

/// Decode a file name produced by [`file_name_for`].
pub(crate) fn parse_file_name(name: &str) -> Option<DateTime<Utc>> {
    if name.len() != FILE_NAME_WIDTH || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis = name.parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis)
}

/// Directory backing the event queue.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Open the directory, creating it if needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::io("creating storage directory", &path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Create an empty file. Fails if a file with that name exists.
    pub async fn create_file(&self, name: &str) -> Result<StoredFile> {
        let created_at = parse_file_name(name).ok_or_else(|| {
            StorageError::invalid_config(format!("`{name}` is not a valid stored file name"))
        })?;
        let path = self.file_path(name);
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io("creating file", &path, e))?;

        Ok(StoredFile {
            name: name.to_string(),
            created_at,
            size: 0,
        })
    }

    /// All stored files, oldest first. Foreign entries are ignored.
    pub async fn files(&self) -> Result<Vec<StoredFile>> {
        let mut entries = tokio::fs::read_dir(&self.path)
            .await
            .map_err(|e| StorageError::io("listing directory", &self.path, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io("listing directory", &self.path, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Some(created_at) = parse_file_name(&name) else {
                debug!(entry = %name, "Ignoring foreign entry in storage directory");
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Deleted between listing and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io("reading attributes", &entry.path(), e)),
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(StoredFile {
                name,
                created_at,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Current attributes of a file, `None` if it no longer exists.
    pub async fn attributes(&self, name: &str) -> Result<Option<StoredFile>> {
        let Some(created_at) = parse_file_name(name) else {
            return Ok(None);
        };
        let path = self.file_path(name);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(StoredFile {
                name: name.to_string(),
                created_at,
                size: metadata.len(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io("reading attributes", &path, e)),
        }
    }

    /// Append bytes and sync them to disk before returning.
    pub async fn append(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.file_path(name);
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io("opening file for append", &path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| StorageError::io("appending to file", &path, e))?;
        file.sync_data()
            .await
            .map_err(|e| StorageError::io("syncing file", &path, e))?;
        Ok(())
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.file_path(name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::io("reading file", &path, e))
    }

    /// Delete a file. Returns `false` if it was already gone.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.file_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io("deleting file", &path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_sort_by_creation_time() {
        let earlier = DateTime::from_timestamp_millis(9_999).unwrap();
        let later = DateTime::from_timestamp_millis(10_000).unwrap();
        let (a, b) = (file_name_for(earlier), file_name_for(later));
        assert!(a < b);
        assert_eq!(a.len(), 16);
        assert_eq!(parse_file_name(&a), Some(earlier));
    }

    #[test]
    fn rejects_foreign_names() {
        assert!(parse_file_name("notes.txt").is_none());
        assert!(parse_file_name("12345").is_none());
        assert!(parse_file_name("00000000000000a1").is_none());
    }

    #[tokio::test]
    async fn lists_only_stored_files_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let directory = Directory::open(temp.path().join("events")).await.unwrap();

        directory.create_file("0000000000002000").await.unwrap();
        directory.create_file("0000000000001000").await.unwrap();
        tokio::fs::write(directory.path().join("README"), b"x")
            .await
            .unwrap();

        let names: Vec<_> = directory
            .files()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["0000000000001000", "0000000000002000"]);
    }

    #[tokio::test]
    async fn append_read_and_delete() {
        let temp = tempfile::tempdir().unwrap();
        let directory = Directory::open(temp.path()).await.unwrap();
        let file = directory.create_file("0000000000001000").await.unwrap();

        directory.append(file.name(), b"abc").await.unwrap();
        directory.append(file.name(), b"def").await.unwrap();

        assert_eq!(directory.read(file.name()).await.unwrap(), b"abcdef");
        let attributes = directory.attributes(file.name()).await.unwrap().unwrap();
        assert_eq!(attributes.size(), 6);

        assert!(directory.delete(file.name()).await.unwrap());
        assert!(!directory.delete(file.name()).await.unwrap());
        assert!(directory.attributes(file.name()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_refuses_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let directory = Directory::open(temp.path()).await.unwrap();
        directory.create_file("0000000000001000").await.unwrap();
        assert!(directory.create_file("0000000000001000").await.is_err());
    }
}
