//! Scenario: buffer port contract held by the in-memory double.
//!
//! # Invariants under test
//!
//! 1. Buffered events round-trip with every field intact.
//! 2. Reads key on the explicit source id and return oldest-first.
//! 3. Marking already-processed events again is a no-op: no state change,
//!    no error, and the original processed_at survives.
//! 4. Cleanup deletes only processed rows older than the retention window.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_pipeline::BufferPort;
use floe_testkit::{source_event, MemBuffer};

#[tokio::test]
async fn round_trip_preserves_all_event_fields() {
    let buffer = MemBuffer::new();
    let source_id = Uuid::new_v4();
    let event = source_event(source_id, 1, Utc::now());

    buffer
        .write(CancellationToken::new(), std::slice::from_ref(&event))
        .await
        .unwrap();

    let batch = buffer
        .read_batch(CancellationToken::new(), source_id, 10)
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].event, event);
    assert!(batch[0].processed_at.is_none());
}

#[tokio::test]
async fn reads_are_scoped_to_the_source_and_ordered() {
    let buffer = MemBuffer::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let now = Utc::now();

    let events: Vec<_> = (1..=3)
        .map(|n| source_event(a, n, now))
        .chain((1..=2).map(|n| source_event(b, n, now)))
        .collect();
    buffer.write(CancellationToken::new(), &events).await.unwrap();

    let batch = buffer
        .read_batch(CancellationToken::new(), a, 10)
        .await
        .unwrap();
    assert_eq!(batch.len(), 3, "only source a's events");
    let ids: Vec<i64> = batch.iter().map(|r| r.buffer_id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted, "oldest-first by buffer id");
}

#[tokio::test]
async fn mark_processed_twice_is_a_noop() {
    let buffer = MemBuffer::new();
    let source_id = Uuid::new_v4();
    let events: Vec<_> = (1..=2)
        .map(|n| source_event(source_id, n, Utc::now()))
        .collect();
    buffer.write(CancellationToken::new(), &events).await.unwrap();

    let batch = buffer
        .read_batch(CancellationToken::new(), source_id, 10)
        .await
        .unwrap();
    let ids: Vec<i64> = batch.iter().map(|r| r.buffer_id).collect();

    buffer
        .mark_processed(CancellationToken::new(), &ids)
        .await
        .unwrap();
    let first_pass = buffer.all_rows();

    // Second marking: must not error and must not touch timestamps.
    buffer
        .mark_processed(CancellationToken::new(), &ids)
        .await
        .unwrap();
    assert_eq!(buffer.all_rows(), first_pass);

    let stats = buffer
        .stats(CancellationToken::new(), source_id)
        .await
        .unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.unprocessed, 0);
}

#[tokio::test]
async fn cleanup_deletes_only_old_processed_rows() {
    let buffer = MemBuffer::new();
    let source_id = Uuid::new_v4();
    let events: Vec<_> = (1..=3)
        .map(|n| source_event(source_id, n, Utc::now()))
        .collect();
    buffer.write(CancellationToken::new(), &events).await.unwrap();

    // Process the first two; the third stays unprocessed.
    let batch = buffer
        .read_batch(CancellationToken::new(), source_id, 2)
        .await
        .unwrap();
    let ids: Vec<i64> = batch.iter().map(|r| r.buffer_id).collect();
    buffer
        .mark_processed(CancellationToken::new(), &ids)
        .await
        .unwrap();

    // Zero retention: everything processed is already past the window.
    let deleted = buffer
        .cleanup(CancellationToken::new(), Duration::from_secs(0))
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(buffer.row_count(), 1, "unprocessed rows are never deleted");

    // A generous retention deletes nothing further.
    let deleted = buffer
        .cleanup(CancellationToken::new(), Duration::from_secs(86_400))
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}
