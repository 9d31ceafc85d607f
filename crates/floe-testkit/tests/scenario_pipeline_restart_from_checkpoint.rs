//! Scenario: pipeline resume from a persisted checkpoint.
//!
//! A prior run buffered events 1..10 but the last durable checkpoint is at
//! LSN 7. On restart the source must be asked to start from LSN 7, the
//! buffer ends up with every event (duplicates of 8..10 tolerated), and
//! the final checkpoint is >= LSN 10.
//!
//! Also covered: transient buffer failures ride through the retry engine,
//! and a fatal source error drives the pipeline to Failed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_pipeline::{BufferPort, Pipeline, PipelineConfig, PipelineState, SourceError};
use floe_retry::RetryPolicy;
use floe_schemas::Checkpoint;
use floe_testkit::{lsn, source_event, MemBuffer, MemCheckpoints, ScriptedSource};

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        // Long enough that only the shutdown checkpoint runs in-test.
        checkpoint_interval: Duration::from_secs(3600),
        retry: RetryPolicy {
            max_attempts: 5,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
        },
        backpressure: None,
    }
}

#[tokio::test]
async fn restart_resumes_from_checkpoint_and_tolerates_duplicates() {
    let source_id = Uuid::new_v4();
    let now = Utc::now();
    let all_events: Vec<_> = (1..=10).map(|n| source_event(source_id, n, now)).collect();

    let buffer = Arc::new(MemBuffer::new());
    let checkpoints = Arc::new(MemCheckpoints::new());

    // Prior run: events 1..10 already buffered, checkpoint stuck at 7.
    buffer
        .write(CancellationToken::new(), &all_events)
        .await
        .unwrap();
    checkpoints.seed(Checkpoint {
        source_id,
        lsn: lsn(7),
        committed_at: now,
    });

    let source = Arc::new(ScriptedSource::new(source_id, all_events.clone()));
    let pipeline = Pipeline::new(
        source.clone(),
        buffer.clone(),
        checkpoints.clone(),
        fast_config(),
    );

    pipeline.run(CancellationToken::new()).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    // The source was asked to resume from the checkpointed LSN.
    assert_eq!(source.observed_starts(), vec![Some(lsn(7))]);

    // Buffer: the original ten rows plus replayed 8..10.
    assert_eq!(buffer.row_count(), 13);
    let buffered = buffer.events_for(source_id);
    for n in 1..=10 {
        assert!(
            buffered.iter().any(|e| e.lsn == lsn(n)),
            "event {n} missing from buffer"
        );
    }

    // Final checkpoint caught up to the stream head.
    let cp = checkpoints.get(source_id).unwrap();
    assert!(cp.lsn >= lsn(10), "final checkpoint {} < 10", cp.lsn);

    let stats = pipeline.stats();
    assert_eq!(stats.events_processed, 3);
    assert_eq!(stats.last_lsn, Some(lsn(10)));
}

#[tokio::test]
async fn checkpoint_never_moves_backwards() {
    let source_id = Uuid::new_v4();
    let now = Utc::now();

    let checkpoints = MemCheckpoints::new();
    checkpoints.seed(Checkpoint {
        source_id,
        lsn: lsn(9),
        committed_at: now,
    });

    // A stale save (e.g. replayed duplicate position) must not win.
    floe_pipeline::CheckpointPort::save(
        &checkpoints,
        CancellationToken::new(),
        &Checkpoint {
            source_id,
            lsn: lsn(4),
            committed_at: now,
        },
    )
    .await
    .unwrap();

    assert_eq!(checkpoints.get(source_id).unwrap().lsn, lsn(9));
}

#[tokio::test]
async fn transient_buffer_failures_ride_the_retry_engine() {
    let source_id = Uuid::new_v4();
    let now = Utc::now();
    let events: Vec<_> = (1..=5).map(|n| source_event(source_id, n, now)).collect();

    let buffer = Arc::new(MemBuffer::new());
    buffer.fail_next_writes(3);
    let checkpoints = Arc::new(MemCheckpoints::new());
    let source = Arc::new(ScriptedSource::new(source_id, events));

    let pipeline = Pipeline::new(source, buffer.clone(), checkpoints.clone(), fast_config());
    pipeline.run(CancellationToken::new()).await.unwrap();

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(buffer.row_count(), 5, "every event lands despite transient failures");
    assert_eq!(pipeline.stats().events_processed, 5);
    assert_eq!(pipeline.stats().events_failed, 0);
}

#[tokio::test]
async fn fatal_source_error_fails_the_pipeline() {
    let source_id = Uuid::new_v4();
    let now = Utc::now();
    let events: Vec<_> = (1..=3).map(|n| source_event(source_id, n, now)).collect();

    let buffer = Arc::new(MemBuffer::new());
    let checkpoints = Arc::new(MemCheckpoints::new());
    let source = Arc::new(ScriptedSource::new(source_id, events));
    source.fail_after_events(SourceError::Stream("replication slot dropped".to_string()));

    let pipeline = Pipeline::new(source, buffer.clone(), checkpoints, fast_config());
    let err = pipeline.run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(err.to_string().contains("replication slot dropped"));

    let health = pipeline.health();
    assert!(!health.healthy);
    assert!(health.detail.unwrap().contains("replication slot dropped"));
}

#[tokio::test]
async fn failed_pipeline_can_be_rerun_and_recovers() {
    let source_id = Uuid::new_v4();
    let now = Utc::now();
    let events: Vec<_> = (1..=3).map(|n| source_event(source_id, n, now)).collect();

    let buffer = Arc::new(MemBuffer::new());
    let checkpoints = Arc::new(MemCheckpoints::new());
    let source = Arc::new(ScriptedSource::new(source_id, events.clone()));
    source.fail_after_events(SourceError::Stream("blip".to_string()));

    let pipeline = Pipeline::new(
        source.clone(),
        buffer.clone(),
        checkpoints.clone(),
        fast_config(),
    );
    pipeline.run(CancellationToken::new()).await.unwrap_err();
    assert_eq!(pipeline.state(), PipelineState::Failed);

    // Second run: the injected error was consumed; the stream completes.
    pipeline.run(CancellationToken::new()).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(pipeline.stats().restarts, 2);
    assert!(checkpoints.get(source_id).unwrap().lsn >= lsn(3));
}
