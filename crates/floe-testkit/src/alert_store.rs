//! In-memory alert store.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_alerting::{AlertStore, StoreError};
use floe_schemas::{
    AlertHistoryEntry, AlertHistoryKind, AlertInstance, AlertRoute, AlertRule, AlertStatus,
    NotificationChannel, Silence,
};

#[derive(Default)]
struct Inner {
    rules: Vec<AlertRule>,
    silences: Vec<Silence>,
    instances: Vec<AlertInstance>,
    history: Vec<AlertHistoryEntry>,
    routes: Vec<AlertRoute>,
    channels: Vec<NotificationChannel>,
}

/// Mutex-guarded in-memory [`AlertStore`] with seed and inspection helpers.
#[derive(Default)]
pub struct MemAlertStore {
    inner: Mutex<Inner>,
}

impl MemAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- seeding -----------------------------------------------------------

    pub fn seed_rule(&self, rule: AlertRule) {
        self.inner.lock().unwrap().rules.push(rule);
    }

    pub fn seed_silence(&self, silence: Silence) {
        self.inner.lock().unwrap().silences.push(silence);
    }

    pub fn seed_route(&self, route: AlertRoute) {
        self.inner.lock().unwrap().routes.push(route);
    }

    pub fn seed_channel(&self, channel: NotificationChannel) {
        self.inner.lock().unwrap().channels.push(channel);
    }

    // -- inspection --------------------------------------------------------

    pub fn instances(&self) -> Vec<AlertInstance> {
        self.inner.lock().unwrap().instances.clone()
    }

    pub fn history(&self) -> Vec<AlertHistoryEntry> {
        self.inner.lock().unwrap().history.clone()
    }

    pub fn history_of_kind(&self, kind: AlertHistoryKind) -> Vec<AlertHistoryEntry> {
        self.inner
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|h| h.kind == kind)
            .cloned()
            .collect()
    }

    pub fn firing_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .instances
            .iter()
            .filter(|i| i.status == AlertStatus::Firing)
            .count()
    }
}

#[async_trait::async_trait]
impl AlertStore for MemAlertStore {
    async fn list_enabled_rules(
        &self,
        _cancel: CancellationToken,
    ) -> Result<Vec<AlertRule>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rules
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }

    async fn get_rule(&self, _cancel: CancellationToken, id: Uuid) -> Result<AlertRule, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .rules
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_silences(&self, _cancel: CancellationToken) -> Result<Vec<Silence>, StoreError> {
        Ok(self.inner.lock().unwrap().silences.clone())
    }

    async fn find_firing(
        &self,
        _cancel: CancellationToken,
        rule_id: Uuid,
        fingerprint: &str,
    ) -> Result<Option<AlertInstance>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .instances
            .iter()
            .find(|i| {
                i.rule_id == rule_id
                    && i.fingerprint == fingerprint
                    && i.status == AlertStatus::Firing
            })
            .cloned())
    }

    async fn list_firing(
        &self,
        _cancel: CancellationToken,
    ) -> Result<Vec<AlertInstance>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .instances
            .iter()
            .filter(|i| i.status == AlertStatus::Firing)
            .cloned()
            .collect())
    }

    async fn insert_instance(
        &self,
        _cancel: CancellationToken,
        instance: &AlertInstance,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        // Enforce the at-most-one-firing invariant like the unique index does.
        let dup = inner.instances.iter().any(|i| {
            i.rule_id == instance.rule_id
                && i.fingerprint == instance.fingerprint
                && i.status == AlertStatus::Firing
        });
        if dup && instance.status == AlertStatus::Firing {
            return Err(StoreError::Backend(
                "duplicate firing instance for (rule, fingerprint)".to_string(),
            ));
        }
        inner.instances.push(instance.clone());
        Ok(())
    }

    async fn update_instance(
        &self,
        _cancel: CancellationToken,
        instance: &AlertInstance,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .instances
            .iter_mut()
            .find(|i| i.id == instance.id)
            .ok_or(StoreError::NotFound)?;
        *slot = instance.clone();
        Ok(())
    }

    async fn append_history(
        &self,
        _cancel: CancellationToken,
        entry: &AlertHistoryEntry,
    ) -> Result<(), StoreError> {
        self.inner.lock().unwrap().history.push(entry.clone());
        Ok(())
    }

    async fn routes_for_rule(
        &self,
        _cancel: CancellationToken,
        rule_id: Uuid,
    ) -> Result<Vec<AlertRoute>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .routes
            .iter()
            .filter(|r| r.rule_id == rule_id)
            .cloned()
            .collect())
    }

    async fn get_channel(
        &self,
        _cancel: CancellationToken,
        id: Uuid,
    ) -> Result<NotificationChannel, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .channels
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}
