//! The storage actor.
//!
//! One task owns the [`FilesOrchestrator`] and handles every write, read and
//! delete in mailbox order, so no two filesystem operations on the queue ever
//! overlap. Writers enqueue without waiting; readers await a reply.

use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::conditions::StorageConditions;
use crate::directory::{Directory, StoredFile};
use crate::error::{Result, StorageError};
use crate::orchestrator::FilesOrchestrator;
use crate::reader::{Batch, FileReader};
use crate::record;
use crate::writer::FileWriter;

/// Default number of commands the storage mailbox buffers.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

#[derive(Debug)]
pub(crate) enum StorageCommand {
    /// Append one serialized event.
    Write(Bytes),
    NextBatch(oneshot::Sender<Result<Option<Batch>>>),
    Delete {
        file: StoredFile,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Acknowledged once every earlier command has been handled.
    Flush(oneshot::Sender<()>),
}

/// Send a request to the actor and wait for its reply.
pub(crate) async fn request<T>(
    sender: &mpsc::Sender<StorageCommand>,
    command: impl FnOnce(oneshot::Sender<T>) -> StorageCommand,
) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    sender
        .send(command(tx))
        .await
        .map_err(|_| StorageError::ActorStopped)?;
    rx.await.map_err(|_| StorageError::ActorStopped)
}

/// The writer, reader and control handle of a running storage actor.
pub struct Storage {
    pub writer: FileWriter,
    pub reader: FileReader,
    pub handle: StorageHandle,
}

impl Storage {
    /// Open `path` and start the storage actor on the current runtime.
    pub async fn open(
        path: impl Into<PathBuf>,
        conditions: StorageConditions,
        clock: Arc<dyn Clock>,
        mailbox_capacity: usize,
    ) -> Result<Self> {
        let directory = Directory::open(path).await?;
        let orchestrator = FilesOrchestrator::new(directory, conditions, clock);
        Ok(Self::spawn(orchestrator, mailbox_capacity))
    }

    /// Start the storage actor around an existing orchestrator.
    pub fn spawn(orchestrator: FilesOrchestrator, mailbox_capacity: usize) -> Self {
        let max_write_size = orchestrator.conditions().max_write_size();
        let (sender, receiver) = mpsc::channel(mailbox_capacity.max(1));
        let cancellation_token = CancellationToken::new();

        info!(
            directory = %orchestrator.directory().path().display(),
            mailbox_capacity,
            "Starting storage actor"
        );
        let task = tokio::spawn(run(orchestrator, receiver, cancellation_token.clone()));

        Self {
            writer: FileWriter::new(sender.clone(), max_write_size),
            reader: FileReader::new(sender.clone()),
            handle: StorageHandle {
                sender,
                cancellation_token,
                task: parking_lot::Mutex::new(Some(task)),
            },
        }
    }
}

/// Controls the lifetime of the storage actor.
pub struct StorageHandle {
    sender: mpsc::Sender<StorageCommand>,
    cancellation_token: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StorageHandle {
    /// Wait until every command enqueued before this call has been handled.
    pub async fn flush(&self) -> Result<()> {
        request(&self.sender, StorageCommand::Flush).await
    }

    /// Stop accepting commands, finish the queued ones and wait for the actor.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Storage actor terminated abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

async fn run(
    mut orchestrator: FilesOrchestrator,
    mut receiver: mpsc::Receiver<StorageCommand>,
    cancellation_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            command = receiver.recv() => match command {
                Some(command) => handle(&mut orchestrator, command).await,
                None => break,
            },
            _ = cancellation_token.cancelled() => {
                receiver.close();
                let mut drained = 0usize;
                while let Some(command) = receiver.recv().await {
                    handle(&mut orchestrator, command).await;
                    drained += 1;
                }
                debug!(drained, "Drained storage mailbox");
                break;
            }
        }
    }
    info!("Storage actor stopped");
}

async fn handle(orchestrator: &mut FilesOrchestrator, command: StorageCommand) {
    match command {
        StorageCommand::Write(payload) => match append(orchestrator, &payload).await {
            Ok(()) => {}
            Err(e) if e.is_dropped_event() => {
                warn!(size = payload.len(), error = %e, "Dropping event");
            }
            Err(e) => {
                error!(size = payload.len(), error = %e, "Failed to store event, dropping it");
            }
        },
        StorageCommand::NextBatch(reply) => {
            let _ = reply.send(next_batch(orchestrator).await);
        }
        StorageCommand::Delete { file, reply } => {
            let _ = reply.send(orchestrator.delete_file(&file).await);
        }
        StorageCommand::Flush(reply) => {
            let _ = reply.send(());
        }
    }
}

async fn append(orchestrator: &mut FilesOrchestrator, payload: &[u8]) -> Result<()> {
    let frame = record::encode(payload);
    let file = orchestrator.file_for_writing(frame.len() as u64).await?;
    let appended = orchestrator.directory().append(file.name(), &frame).await;
    if appended.is_err() {
        orchestrator.abandon_file(file.name());
    }
    appended
}

async fn next_batch(orchestrator: &mut FilesOrchestrator) -> Result<Option<Batch>> {
    while let Some(file) = orchestrator.eligible_file_for_reading().await? {
        let data = orchestrator.directory().read(file.name()).await?;
        let decoded = record::decode(Bytes::from(data));

        if decoded.torn_bytes > 0 {
            warn!(
                file = %file.name(),
                torn_bytes = decoded.torn_bytes,
                "Ignoring incomplete trailing record"
            );
        }

        if decoded.records.is_empty() {
            debug!(file = %file.name(), "Deleting file without complete records");
            orchestrator.delete_file(&file).await?;
            continue;
        }

        return Ok(Some(Batch::new(file, decoded.records)));
    }
    Ok(None)
}
