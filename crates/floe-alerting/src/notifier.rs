//! Route-driven notification dispatch with repeat-interval suppression.
//!
//! For a firing event, a route only fires again once `repeat_interval` has
//! elapsed since the last successful send to that (fingerprint, channel)
//! pair. Resolved events always send. Every outcome lands in history as
//! `NotificationSent` or `NotificationFailed`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use floe_schemas::{
    AlertHistoryEntry, AlertHistoryKind, AlertInstance, AlertRule, NotificationChannel,
};

use crate::channels::{ChannelFactory, Notification, NotifyError, NotifyEvent};
use crate::store::{AlertStore, StoreError};

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct Notifier {
    store: Arc<dyn AlertStore>,
    factory: ChannelFactory,
    send_timeout: Duration,
    /// (fingerprint, channel_id) -> last successful send.
    last_sent: Mutex<HashMap<(String, Uuid), DateTime<Utc>>>,
}

impl Notifier {
    pub fn new(store: Arc<dyn AlertStore>, factory: ChannelFactory, send_timeout: Duration) -> Self {
        Self {
            store,
            factory,
            send_timeout,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Forget suppression state for a fingerprint. Called on resolve so the
    /// next firing cycle notifies immediately.
    pub fn clear_last_sent(&self, fingerprint: &str) {
        self.last_sent
            .lock()
            .expect("notifier lock poisoned")
            .retain(|(fp, _), _| fp != fingerprint);
    }

    /// Dispatch one event for `instance` across all enabled routes of its
    /// rule. Per-route failures are recorded and do not abort the rest.
    ///
    /// Returns how many sends were attempted (after suppression).
    pub async fn notify(
        &self,
        cancel: CancellationToken,
        rule: &AlertRule,
        instance: &AlertInstance,
        event: NotifyEvent,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let routes = self.store.routes_for_rule(cancel.clone(), rule.id).await?;

        let mut attempted = 0;
        for route in routes.iter().filter(|r| r.enabled) {
            let channel = match self.store.get_channel(cancel.clone(), route.channel_id).await {
                Ok(c) if c.enabled => c,
                Ok(_) => continue,
                Err(StoreError::NotFound) => {
                    warn!(route = %route.id, channel = %route.channel_id, "route points at a missing channel");
                    continue;
                }
                Err(e) => return Err(e),
            };

            // Repeat-interval gate applies to firing events only; resolved
            // events always go out.
            if event == NotifyEvent::Firing {
                let key = (instance.fingerprint.clone(), channel.id);
                let suppressed = {
                    let last = self.last_sent.lock().expect("notifier lock poisoned");
                    last.get(&key).is_some_and(|sent_at| {
                        (now - *sent_at).num_seconds() < route.repeat_interval_seconds
                    })
                };
                if suppressed {
                    continue;
                }
            }

            attempted += 1;
            let outcome = self.send_one(rule, instance, event, &channel).await;
            self.record_outcome(cancel.clone(), instance, &channel, event, outcome, now)
                .await;
        }

        Ok(attempted)
    }

    async fn send_one(
        &self,
        rule: &AlertRule,
        instance: &AlertInstance,
        event: NotifyEvent,
        channel: &NotificationChannel,
    ) -> Result<(), NotifyError> {
        let notification = Notification {
            rule: rule.clone(),
            instance: instance.clone(),
            event,
            channel: channel.clone(),
        };
        let port = (self.factory)(channel);

        match tokio::time::timeout(self.send_timeout, port.send(&notification)).await {
            Ok(res) => res,
            Err(_) => Err(NotifyError::Timeout),
        }
    }

    async fn record_outcome(
        &self,
        cancel: CancellationToken,
        instance: &AlertInstance,
        channel: &NotificationChannel,
        event: NotifyEvent,
        outcome: Result<(), NotifyError>,
        now: DateTime<Utc>,
    ) {
        let (kind, detail) = match &outcome {
            Ok(()) => {
                // Only firing sends feed the repeat-interval gate; a
                // resolved send must not re-suppress the next fire.
                if event == NotifyEvent::Firing {
                    self.last_sent
                        .lock()
                        .expect("notifier lock poisoned")
                        .insert((instance.fingerprint.clone(), channel.id), now);
                }
                (
                    AlertHistoryKind::NotificationSent,
                    Some(format!("channel={}", channel.id)),
                )
            }
            Err(e) => {
                warn!(channel = %channel.id, error = %e, "notification send failed");
                (
                    AlertHistoryKind::NotificationFailed,
                    Some(format!("channel={} error={e}", channel.id)),
                )
            }
        };

        let entry = AlertHistoryEntry {
            id: Uuid::new_v4(),
            instance_id: instance.id,
            rule_id: instance.rule_id,
            kind,
            detail,
            at: now,
        };
        if let Err(e) = self.store.append_history(cancel, &entry).await {
            warn!(error = %e, "failed to append notification history");
        }
    }
}
