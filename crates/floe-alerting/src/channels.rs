//! Notification channel boundary.
//!
//! The core never formats provider payloads; it hands a [`Notification`] to
//! a [`ChannelPort`] and records the outcome. The factory maps a stored
//! channel row (kind + opaque config) to an implementation: webhooks get a
//! real HTTP POST, everything else is delivered to the log until a
//! provider adapter is wired in its place.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use floe_schemas::{AlertInstance, AlertRule, ChannelKind, NotificationChannel};

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Firing,
    Resolved,
}

impl NotifyEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyEvent::Firing => "firing",
            NotifyEvent::Resolved => "resolved",
        }
    }
}

/// Everything a channel needs to render and deliver one notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub rule: AlertRule,
    pub instance: AlertInstance,
    pub event: NotifyEvent,
    /// The resolved channel row, config included.
    pub channel: NotificationChannel,
}

// ---------------------------------------------------------------------------
// NotifyError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The channel's stored config is missing a required key.
    Config(String),
    /// Delivery failed at the transport level.
    Transport(String),
    /// The receiver answered with a non-2xx status.
    HttpStatus(u16),
    /// The per-send deadline elapsed.
    Timeout,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Config(msg) => write!(f, "channel config error: {msg}"),
            NotifyError::Transport(msg) => write!(f, "channel transport error: {msg}"),
            NotifyError::HttpStatus(code) => write!(f, "channel http error status={code}"),
            NotifyError::Timeout => write!(f, "channel send timed out"),
        }
    }
}

impl std::error::Error for NotifyError {}

// ---------------------------------------------------------------------------
// ChannelPort
// ---------------------------------------------------------------------------

/// Side-effect boundary for one notification destination.
#[async_trait::async_trait]
pub trait ChannelPort: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Connectivity probe used by operator tooling.
    async fn test(&self) -> Result<(), NotifyError>;
}

/// Maps a stored channel row to an implementation.
pub type ChannelFactory = Arc<dyn Fn(&NotificationChannel) -> Arc<dyn ChannelPort> + Send + Sync>;

/// Default factory: webhook rows get [`WebhookChannel`], all other kinds
/// a [`LogChannel`].
pub fn build_channel(channel: &NotificationChannel) -> Arc<dyn ChannelPort> {
    match channel.kind {
        ChannelKind::Webhook => Arc::new(WebhookChannel::new()),
        ChannelKind::Slack | ChannelKind::Email | ChannelKind::Pagerduty => {
            Arc::new(LogChannel)
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookChannel
// ---------------------------------------------------------------------------

/// POSTs a JSON summary to the `url` in the channel config.
#[derive(Debug, Clone, Default)]
pub struct WebhookChannel {
    http: reqwest::Client,
}

impl WebhookChannel {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    fn url_from(notification: &Notification) -> Result<String, NotifyError> {
        notification
            .channel
            .config
            .get("url")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| NotifyError::Config("webhook channel missing 'url'".to_string()))
    }
}

#[async_trait::async_trait]
impl ChannelPort for WebhookChannel {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = Self::url_from(notification)?;

        let body = json!({
            "event": notification.event.as_str(),
            "rule": notification.rule.name,
            "severity": notification.rule.severity.as_str(),
            "fingerprint": notification.instance.fingerprint,
            "labels": notification.instance.labels,
            "value": notification.instance.current_value,
            "fired_at": notification.instance.fired_at,
            "resolved_at": notification.instance.resolved_at,
            "annotations": notification.rule.annotations,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(NotifyError::HttpStatus(resp.status().as_u16()));
        }
        Ok(())
    }

    async fn test(&self) -> Result<(), NotifyError> {
        // A webhook has no side-effect-free probe; reachability is only
        // provable by a real send.
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogChannel
// ---------------------------------------------------------------------------

/// Delivers notifications to the process log. Stands in for provider
/// adapters whose payload formatting lives outside the core.
#[derive(Debug, Clone, Copy)]
pub struct LogChannel;

#[async_trait::async_trait]
impl ChannelPort for LogChannel {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            kind = notification.channel.kind.as_str(),
            event = notification.event.as_str(),
            rule = %notification.rule.name,
            fingerprint = %notification.instance.fingerprint,
            value = notification.instance.current_value,
            "notification delivered to log channel"
        );
        Ok(())
    }

    async fn test(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
