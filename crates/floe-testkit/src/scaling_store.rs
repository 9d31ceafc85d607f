//! In-memory scaling store.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_scaling::{PolicyBundle, ScalingStore, StoreError};
use floe_schemas::{ScaleAction, ScalingHistoryEntry, ScalingState};

#[derive(Default)]
struct Inner {
    bundles: Vec<PolicyBundle>,
    history: Vec<ScalingHistoryEntry>,
    states: HashMap<Uuid, ScalingState>,
}

/// Mutex-guarded in-memory [`ScalingStore`] with seed and inspection
/// helpers.
#[derive(Default)]
pub struct MemScalingStore {
    inner: Mutex<Inner>,
}

impl MemScalingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_bundle(&self, bundle: PolicyBundle) {
        self.inner.lock().unwrap().bundles.push(bundle);
    }

    /// Attach or replace the schedules of an already-seeded policy.
    pub fn set_schedules(&self, policy_id: Uuid, schedules: Vec<floe_schemas::ScalingSchedule>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(bundle) = inner
            .bundles
            .iter_mut()
            .find(|b| b.policy.id == policy_id)
        {
            bundle.schedules = schedules;
        }
    }

    pub fn seed_state(&self, state: ScalingState) {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(state.policy_id, state);
    }

    pub fn history(&self) -> Vec<ScalingHistoryEntry> {
        self.inner.lock().unwrap().history.clone()
    }

    /// Executed (non-no-op) scale actions, oldest first.
    pub fn scale_actions(&self) -> Vec<ScalingHistoryEntry> {
        self.inner
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|h| h.action != ScaleAction::NoOp)
            .cloned()
            .collect()
    }

    pub fn state_of(&self, policy_id: Uuid) -> Option<ScalingState> {
        self.inner.lock().unwrap().states.get(&policy_id).cloned()
    }
}

#[async_trait::async_trait]
impl ScalingStore for MemScalingStore {
    async fn list_enabled_policies(
        &self,
        _cancel: CancellationToken,
    ) -> Result<Vec<PolicyBundle>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .bundles
            .iter()
            .filter(|b| b.policy.enabled)
            .cloned()
            .collect())
    }

    async fn append_history(
        &self,
        _cancel: CancellationToken,
        entry: &ScalingHistoryEntry,
    ) -> Result<(), StoreError> {
        self.inner.lock().unwrap().history.push(entry.clone());
        Ok(())
    }

    async fn save_state(
        &self,
        _cancel: CancellationToken,
        state: &ScalingState,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(state.policy_id, state.clone());
        Ok(())
    }

    async fn load_state(
        &self,
        _cancel: CancellationToken,
        policy_id: Uuid,
    ) -> Result<Option<ScalingState>, StoreError> {
        Ok(self.inner.lock().unwrap().states.get(&policy_id).cloned())
    }
}
