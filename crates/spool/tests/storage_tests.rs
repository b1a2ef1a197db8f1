//! End-to-end tests for the storage actor with a real directory.

use bytes::Bytes;
use serde::Serialize;
use spool::{
    ManualClock, ReadConditions, Storage, StorageConditions, StoredFile, WriteConditions,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const MIN_READ_AGE: Duration = Duration::from_secs(6);

fn conditions() -> StorageConditions {
    StorageConditions::new(
        WriteConditions {
            max_file_age_for_write: Duration::from_secs(5),
            max_file_size: 4096,
            max_directory_size: 64 * 1024,
            max_writes_per_file: 100,
        },
        ReadConditions {
            min_file_age_for_read: MIN_READ_AGE,
            max_file_age_for_read: Duration::from_secs(3600),
        },
        1024,
    )
    .expect("valid conditions")
}

async fn open(path: &std::path::Path, clock: Arc<ManualClock>) -> Storage {
    Storage::open(path, conditions(), clock, 64)
        .await
        .expect("storage opens")
}

#[derive(Serialize)]
struct LogEvent<'a> {
    status: &'a str,
    message: &'a str,
}

#[tokio::test]
async fn written_events_round_trip_byte_for_byte() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = open(temp.path(), clock.clone()).await;

    storage.writer.write(&LogEvent {
        status: "info",
        message: "hello",
    });
    storage.writer.write_raw(&b"\x00raw\nbytes"[..]);
    storage.handle.flush().await.unwrap();

    clock.advance(MIN_READ_AGE);
    let batch = storage.reader.next_batch().await.unwrap().expect("batch");
    assert_eq!(batch.len(), 2);
    assert_eq!(&batch.records()[0][..], br#"{"status":"info","message":"hello"}"#);
    assert_eq!(&batch.records()[1][..], b"\x00raw\nbytes");

    storage.handle.stop().await;
}

#[tokio::test]
async fn young_files_are_not_read() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = open(temp.path(), clock.clone()).await;

    storage.writer.write_raw(&b"event"[..]);
    storage.handle.flush().await.unwrap();

    clock.advance(MIN_READ_AGE - Duration::from_millis(1));
    assert!(storage.reader.next_batch().await.unwrap().is_none());

    clock.advance(Duration::from_millis(1));
    assert!(storage.reader.next_batch().await.unwrap().is_some());
}

#[tokio::test]
async fn confirmed_batches_are_not_returned_again() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = open(temp.path(), clock.clone()).await;

    storage.writer.write_raw(&b"first"[..]);
    storage.handle.flush().await.unwrap();
    clock.advance(Duration::from_secs(5));
    storage.writer.write_raw(&b"second"[..]);
    storage.handle.flush().await.unwrap();
    clock.advance(MIN_READ_AGE);

    let first = storage.reader.next_batch().await.unwrap().expect("first batch");
    assert_eq!(&first.records()[0][..], b"first");
    let first_name = first.file_name().to_string();
    storage.reader.confirm(first).await.unwrap();

    let second = storage.reader.next_batch().await.unwrap().expect("second batch");
    assert_ne!(second.file_name(), first_name);
    assert_eq!(&second.records()[0][..], b"second");
    storage.reader.discard(second).await.unwrap();

    assert!(storage.reader.next_batch().await.unwrap().is_none());
}

#[tokio::test]
async fn unconfirmed_batch_is_returned_again() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = open(temp.path(), clock.clone()).await;

    storage.writer.write_raw(&b"retry me"[..]);
    storage.handle.flush().await.unwrap();
    clock.advance(MIN_READ_AGE);

    let first = storage.reader.next_batch().await.unwrap().expect("batch");
    let again = storage.reader.next_batch().await.unwrap().expect("same batch");
    assert_eq!(first.file_name(), again.file_name());
}

#[tokio::test]
async fn oversized_events_are_dropped_whole() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = open(temp.path(), clock.clone()).await;

    storage.writer.write_raw(vec![b'x'; 1025]);
    storage.writer.write_raw(vec![b'y'; 1024]);
    storage.handle.flush().await.unwrap();
    clock.advance(MIN_READ_AGE);

    let batch = storage.reader.next_batch().await.unwrap().expect("batch");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.records()[0].len(), 1024);
}

#[tokio::test]
async fn stop_drains_queued_writes() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = open(temp.path(), clock.clone()).await;

    for i in 0..10 {
        storage.writer.write(&i);
    }
    storage.handle.stop().await;
    assert!(!storage.handle.is_running());

    // Writes after stop are dropped without surfacing an error.
    storage.writer.write(&"late");

    let directory = spool::Directory::open(temp.path()).await.unwrap();
    let files = directory.files().await.unwrap();
    let total: u64 = files.iter().map(StoredFile::size).sum();
    // Ten single-digit JSON numbers, each framed with a 4 byte length.
    assert_eq!(total, 10 * 5);
    assert!(storage.reader.next_batch().await.is_err());
}

#[tokio::test]
async fn events_survive_reopening_the_directory() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());

    let storage = open(temp.path(), clock.clone()).await;
    storage.writer.write(&"persisted");
    storage.handle.stop().await;

    let reopened = open(temp.path(), clock.clone()).await;
    clock.advance(MIN_READ_AGE);
    let batch = reopened.reader.next_batch().await.unwrap().expect("batch");
    assert_eq!(&batch.records()[0][..], br#""persisted""#);
}

#[tokio::test]
async fn writes_after_a_torn_append_start_a_new_file() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = open(temp.path(), clock.clone()).await;

    storage.writer.write_raw(&b"first"[..]);
    storage.handle.flush().await.unwrap();

    // Simulate an append that died after part of its frame hit the disk.
    let directory = spool::Directory::open(temp.path()).await.unwrap();
    let files = directory.files().await.unwrap();
    assert_eq!(files.len(), 1);
    directory
        .append(files[0].name(), &[0, 0, 0, 10, b'p', b'a'])
        .await
        .unwrap();

    storage.writer.write_raw(&b"second"[..]);
    storage.writer.write_raw(&b"third"[..]);
    storage.handle.flush().await.unwrap();
    clock.advance(MIN_READ_AGE + Duration::from_secs(1));

    let first = storage.reader.next_batch().await.unwrap().expect("batch");
    assert_eq!(first.records(), &[Bytes::from_static(b"first")]);
    storage.reader.confirm(first).await.unwrap();

    let rest = storage.reader.next_batch().await.unwrap().expect("batch");
    assert_eq!(
        rest.records(),
        &[Bytes::from_static(b"second"), Bytes::from_static(b"third")]
    );
}

#[tokio::test]
async fn full_mailbox_drops_events_without_blocking() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = Storage::open(temp.path(), conditions(), clock.clone(), 1)
        .await
        .unwrap();

    // The actor cannot run until this task yields, so only the first event fits.
    for i in 0..50 {
        storage.writer.write_raw(format!("event-{i}").into_bytes());
    }
    storage.handle.flush().await.unwrap();
    clock.advance(MIN_READ_AGE);

    let batch = storage.reader.next_batch().await.unwrap().expect("batch");
    assert_eq!(batch.records(), &[Bytes::from_static(b"event-0")]);
}

#[tokio::test]
async fn unserializable_events_are_dropped() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let storage = open(temp.path(), clock.clone()).await;

    // JSON object keys must be strings.
    let invalid: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
    storage.writer.write(&invalid);
    storage.writer.write(&"valid");
    storage.handle.flush().await.unwrap();
    clock.advance(MIN_READ_AGE);

    let batch = storage.reader.next_batch().await.unwrap().expect("batch");
    assert_eq!(batch.records(), &[Bytes::from_static(br#""valid""#)]);
}
