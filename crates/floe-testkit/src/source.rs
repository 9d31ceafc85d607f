//! Scripted CDC source.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_pipeline::{SourceError, SourcePort, SourceStream};
use floe_schemas::Event;

/// Emits a pre-programmed event sequence, honouring the resume LSN: only
/// events with `lsn > from_lsn` are replayed, mirroring how a real source
/// restarts from a checkpoint.
pub struct ScriptedSource {
    source_id: Uuid,
    name: String,
    events: Mutex<Vec<Event>>,
    /// Error to push after all events, simulating a mid-stream failure.
    fatal_after: Mutex<Option<SourceError>>,
    /// Resume positions observed across starts, newest last.
    starts: Mutex<Vec<Option<String>>>,
    last_emitted: Mutex<Option<String>>,
}

impl ScriptedSource {
    pub fn new(source_id: Uuid, events: Vec<Event>) -> Self {
        Self {
            source_id,
            name: "scripted".to_string(),
            events: Mutex::new(events),
            fatal_after: Mutex::new(None),
            starts: Mutex::new(Vec::new()),
            last_emitted: Mutex::new(None),
        }
    }

    /// Push `err` on the error channel after the scripted events are sent.
    pub fn fail_after_events(&self, err: SourceError) {
        *self.fatal_after.lock().unwrap() = Some(err);
    }

    /// Replace the script (restart scenarios).
    pub fn set_events(&self, events: Vec<Event>) {
        *self.events.lock().unwrap() = events;
    }

    /// Resume LSNs the pipeline asked for, one per `start` call.
    pub fn observed_starts(&self) -> Vec<Option<String>> {
        self.starts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SourcePort for ScriptedSource {
    async fn start(
        &self,
        cancel: CancellationToken,
        from_lsn: Option<String>,
    ) -> Result<SourceStream, SourceError> {
        self.starts.lock().unwrap().push(from_lsn.clone());

        let to_send: Vec<Event> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| from_lsn.as_ref().map_or(true, |from| e.lsn > *from))
            .cloned()
            .collect();
        let fatal = self.fatal_after.lock().unwrap().take();

        if let Some(last) = to_send.last() {
            *self.last_emitted.lock().unwrap() = Some(last.lsn.clone());
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let (error_tx, error_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            for event in to_send {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = event_tx.send(event) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            if let Some(err) = fatal {
                let _ = error_tx.send(err).await;
            }
            // Dropping the senders closes both channels; the pipeline
            // observes a finished stream.
        });

        Ok(SourceStream {
            events: event_rx,
            errors: error_rx,
        })
    }

    async fn stop(&self, _cancel: CancellationToken) -> Result<(), SourceError> {
        Ok(())
    }

    async fn last_lsn(&self) -> Option<String> {
        self.last_emitted.lock().unwrap().clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_id(&self) -> Uuid {
        self.source_id
    }
}
