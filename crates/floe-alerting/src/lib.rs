//! floe-alerting
//!
//! The alert manager: evaluates enabled rules on a fixed interval, tracks
//! firing instances through the duration gate, consults silences, and
//! dispatches notifications through routed channels with repeat-interval
//! suppression.

pub mod channels;
pub mod manager;
pub mod notifier;
pub mod store;

pub use channels::{build_channel, ChannelFactory, ChannelPort, LogChannel, Notification,
    NotifyError, NotifyEvent, WebhookChannel};
pub use manager::{default_channel_factory, AlertCycleOutcome, AlertManager, AlertManagerConfig};
pub use notifier::Notifier;
pub use store::{AlertStore, StoreError};
