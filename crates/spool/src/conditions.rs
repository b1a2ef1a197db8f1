//! Rotation and eligibility thresholds.
//!
//! The write and read age windows never overlap: a file stops accepting writes
//! strictly before it becomes readable, so the reader never picks up a file that
//! a write may still land in.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StorageError};
use crate::record::LENGTH_PREFIX_SIZE;

/// When the current file may keep receiving writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConditions {
    /// A file older than this is rotated out on the next write.
    pub max_file_age_for_write: Duration,
    /// Maximum size of a single file, which is also the maximum upload batch.
    pub max_file_size: u64,
    /// Total size budget for the storage directory.
    pub max_directory_size: u64,
    /// Maximum number of records appended to one file.
    pub max_writes_per_file: usize,
}

/// When a file may be handed to the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConditions {
    pub min_file_age_for_read: Duration,
    /// Files older than this are purged without being uploaded.
    pub max_file_age_for_read: Duration,
}

/// Complete, validated storage policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConditions {
    write: WriteConditions,
    read: ReadConditions,
    max_write_size: u64,
}

impl StorageConditions {
    /// Validate and bundle the storage thresholds.
    ///
    /// `max_write_size` caps a single serialized event.
    pub fn new(write: WriteConditions, read: ReadConditions, max_write_size: u64) -> Result<Self> {
        if write.max_file_size == 0 {
            return Err(StorageError::invalid_config("max_file_size must be positive"));
        }
        if write.max_file_size >= write.max_directory_size {
            return Err(StorageError::invalid_config(format!(
                "max_file_size ({}) must be smaller than max_directory_size ({})",
                write.max_file_size, write.max_directory_size
            )));
        }
        if write.max_writes_per_file == 0 {
            return Err(StorageError::invalid_config(
                "max_writes_per_file must be positive",
            ));
        }
        if write.max_file_age_for_write >= read.min_file_age_for_read {
            return Err(StorageError::invalid_config(format!(
                "max_file_age_for_write ({:?}) must be smaller than min_file_age_for_read ({:?})",
                write.max_file_age_for_write, read.min_file_age_for_read
            )));
        }
        if read.min_file_age_for_read >= read.max_file_age_for_read {
            return Err(StorageError::invalid_config(format!(
                "min_file_age_for_read ({:?}) must be smaller than max_file_age_for_read ({:?})",
                read.min_file_age_for_read, read.max_file_age_for_read
            )));
        }
        // A record takes its payload plus the length prefix.
        let max_payload = write.max_file_size.saturating_sub(LENGTH_PREFIX_SIZE as u64);
        if max_write_size == 0
            || max_write_size > max_payload
            || max_write_size > u64::from(u32::MAX)
        {
            return Err(StorageError::invalid_config(format!(
                "max_write_size ({max_write_size}) must be in 1..={max_payload}"
            )));
        }

        Ok(Self {
            write,
            read,
            max_write_size,
        })
    }

    pub fn write(&self) -> &WriteConditions {
        &self.write
    }

    pub fn read(&self) -> &ReadConditions {
        &self.read
    }

    pub fn max_write_size(&self) -> u64 {
        self.max_write_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn write_conditions() -> WriteConditions {
        WriteConditions {
            max_file_age_for_write: Duration::from_secs(5),
            max_file_size: 1024,
            max_directory_size: 4096,
            max_writes_per_file: 100,
        }
    }

    fn read_conditions() -> ReadConditions {
        ReadConditions {
            min_file_age_for_read: Duration::from_secs(6),
            max_file_age_for_read: Duration::from_secs(60),
        }
    }

    #[test]
    fn accepts_consistent_thresholds() {
        let conditions = StorageConditions::new(write_conditions(), read_conditions(), 256).unwrap();
        assert_eq!(conditions.max_write_size(), 256);
        assert_eq!(conditions.write().max_file_size, 1024);

        // The largest event still fits a fresh file with its length prefix.
        assert!(StorageConditions::new(write_conditions(), read_conditions(), 1020).is_ok());
    }

    #[rstest]
    #[case::file_not_smaller_than_directory(4096, 4096, 5, 6, 60, 256)]
    #[case::write_window_overlaps_read(1024, 4096, 6, 6, 60, 256)]
    #[case::read_window_inverted(1024, 4096, 5, 60, 6, 256)]
    #[case::read_window_empty(1024, 4096, 5, 6, 6, 256)]
    #[case::write_size_above_file_size(1024, 4096, 5, 6, 60, 2048)]
    #[case::zero_write_size(1024, 4096, 5, 6, 60, 0)]
    #[case::write_size_leaves_no_room_for_prefix(1024, 4096, 5, 6, 60, 1024)]
    fn rejects_inconsistent_thresholds(
        #[case] file_size: u64,
        #[case] directory_size: u64,
        #[case] write_age: u64,
        #[case] min_read_age: u64,
        #[case] max_read_age: u64,
        #[case] write_size: u64,
    ) {
        let write = WriteConditions {
            max_file_age_for_write: Duration::from_secs(write_age),
            max_file_size: file_size,
            max_directory_size: directory_size,
            max_writes_per_file: 100,
        };
        let read = ReadConditions {
            min_file_age_for_read: Duration::from_secs(min_read_age),
            max_file_age_for_read: Duration::from_secs(max_read_age),
        };

        let err = StorageConditions::new(write, read, write_size).unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_writes_per_file() {
        let write = WriteConditions {
            max_writes_per_file: 0,
            ..write_conditions()
        };
        assert!(StorageConditions::new(write, read_conditions(), 256).is_err());
    }
}
