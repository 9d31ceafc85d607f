//! Buffer retention janitor.
//!
//! Processed rows older than the retention window are deletable; this loop
//! deletes them on an interval so the buffer tables do not grow without
//! bound. Failures log and the loop continues.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ports::BufferPort;

pub async fn run_buffer_janitor(
    buffer: Arc<dyn BufferPort>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "buffer janitor started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("buffer janitor stopping");
                return;
            }
            _ = ticker.tick() => {
                match buffer.cleanup(cancel.clone(), retention).await {
                    Ok(0) => debug!("buffer cleanup: nothing to delete"),
                    Ok(n) => info!(deleted = n, "buffer cleanup complete"),
                    Err(e) => warn!(error = %e, "buffer cleanup failed"),
                }
            }
        }
    }
}
