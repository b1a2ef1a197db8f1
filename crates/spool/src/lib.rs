//! # Spool
//!
//! A durable, bounded event queue backed by a directory of append-only files.
//!
//! Producers hand events to a [`FileWriter`], which never blocks. A single
//! storage actor appends them to the file picked by the [`FilesOrchestrator`],
//! rotating on age, size or record count. The [`FileReader`] returns one file at
//! a time once it has aged into the read window, and deletes it when the caller
//! confirms delivery. Files that outlive the read window, or that must make
//! room when the directory is full, are purged.

pub mod clock;
pub mod conditions;
pub mod directory;
pub mod error;
pub mod orchestrator;
pub mod reader;
mod record;
pub mod storage;
pub mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conditions::{ReadConditions, StorageConditions, WriteConditions};
pub use directory::{Directory, StoredFile};
pub use error::{Result, StorageError};
pub use orchestrator::FilesOrchestrator;
pub use reader::{Batch, FileReader};
pub use storage::{DEFAULT_MAILBOX_CAPACITY, Storage, StorageHandle};
pub use writer::FileWriter;
