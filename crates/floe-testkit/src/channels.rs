//! Recording notification channel.

use std::sync::{Arc, Mutex};

use floe_alerting::{ChannelFactory, ChannelPort, Notification, NotifyError, NotifyEvent};

/// What a [`RecordingChannel`] saw for one delivered notification.
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub event: NotifyEvent,
    pub rule_name: String,
    pub fingerprint: String,
    pub value: f64,
}

/// Records every send; optionally fails them all.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentNotification>>,
    fail: Mutex<Option<NotifyError>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of(&self, event: NotifyEvent) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.event == event)
            .count()
    }

    pub fn fail_with(&self, err: NotifyError) {
        *self.fail.lock().unwrap() = Some(err);
    }
}

#[async_trait::async_trait]
impl ChannelPort for RecordingChannel {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(err) = self.fail.lock().unwrap().clone() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(SentNotification {
            event: notification.event,
            rule_name: notification.rule.name.clone(),
            fingerprint: notification.instance.fingerprint.clone(),
            value: notification.instance.current_value,
        });
        Ok(())
    }

    async fn test(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// A factory that hands the same recording channel to every route.
pub fn recording_factory(channel: Arc<RecordingChannel>) -> ChannelFactory {
    Arc::new(move |_row| channel.clone() as Arc<dyn ChannelPort>)
}
