//! The scaling engine cycle.
//!
//! Every tick, per enabled policy: refresh the observed replica count,
//! short-circuit inside cooldown, evaluate scale-up rules then scale-down
//! rules through the duration gate, let a matching cron schedule override
//! the rule decision, clamp to the policy bounds, persist history, and
//! invoke the executor unless dry-run.
//!
//! Policies are processed serially within a cycle so the pending-condition
//! map stays race-free.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use floe_metrics::MetricsBackend;
use floe_rules::PendingGate;
use floe_schemas::{
    ScaleAction, ScaleDirection, ScalingHistoryEntry, ScalingPolicy, ScalingRule, ScalingState,
};

use crate::executor::ExecutorPort;
use crate::schedule;
use crate::store::{PolicyBundle, ScalingStore, StoreError};

// ---------------------------------------------------------------------------
// Config / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ScalingEngineConfig {
    pub evaluation_interval: Duration,
    /// Used when a policy declares no cooldown of its own.
    pub default_cooldown_seconds: i64,
    /// When set, decisions are persisted but the executor is not invoked.
    pub dry_run: bool,
}

impl Default for ScalingEngineConfig {
    fn default() -> Self {
        Self {
            evaluation_interval: Duration::from_secs(30),
            default_cooldown_seconds: 300,
            dry_run: false,
        }
    }
}

/// One decision the engine arrived at for a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    pub policy_id: Uuid,
    pub action: ScaleAction,
    pub previous_replicas: i32,
    pub new_replicas: i32,
    pub reason: String,
    pub dry_run: bool,
    /// `true` when the executor applied the change.
    pub executed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScalingCycleOutcome {
    pub policies_evaluated: usize,
    pub decisions: Vec<PolicyDecision>,
}

// ---------------------------------------------------------------------------
// ScalingEngine
// ---------------------------------------------------------------------------

struct EngineInner {
    states: HashMap<Uuid, ScalingState>,
    /// rule id -> first time its condition held. Rule ids are globally
    /// unique, so one gate serves every policy.
    gate: PendingGate<Uuid>,
    /// schedule id -> minute bucket it last fired for.
    schedule_fired: HashMap<Uuid, DateTime<Utc>>,
}

pub struct ScalingEngine {
    store: Arc<dyn ScalingStore>,
    executor: Arc<dyn ExecutorPort>,
    metrics: Arc<dyn MetricsBackend>,
    cfg: ScalingEngineConfig,
    inner: Mutex<EngineInner>,
}

impl ScalingEngine {
    pub fn new(
        store: Arc<dyn ScalingStore>,
        executor: Arc<dyn ExecutorPort>,
        metrics: Arc<dyn MetricsBackend>,
        cfg: ScalingEngineConfig,
    ) -> Self {
        Self {
            store,
            executor,
            metrics,
            cfg,
            inner: Mutex::new(EngineInner {
                states: HashMap::new(),
                gate: PendingGate::new(),
                schedule_fired: HashMap::new(),
            }),
        }
    }

    /// Tick until cancelled. Cycle failures are logged, never fatal.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cfg.evaluation_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_secs = self.cfg.evaluation_interval.as_secs(),
            dry_run = self.cfg.dry_run,
            "scaling engine started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scaling engine stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.evaluate_cycle(cancel.clone(), Utc::now()).await {
                        Ok(outcome) => debug!(
                            policies = outcome.policies_evaluated,
                            decisions = outcome.decisions.len(),
                            "scaling cycle complete"
                        ),
                        Err(e) => warn!(error = %e, "scaling cycle failed"),
                    }
                }
            }
        }
    }

    /// One full pass over all enabled policies at `now`.
    pub async fn evaluate_cycle(
        &self,
        cancel: CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<ScalingCycleOutcome, StoreError> {
        let bundles = self.store.list_enabled_policies(cancel.clone()).await?;

        let mut outcome = ScalingCycleOutcome::default();
        for bundle in &bundles {
            outcome.policies_evaluated += 1;
            if let Some(decision) = self.evaluate_policy(cancel.clone(), bundle, now).await {
                outcome.decisions.push(decision);
            }
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Per-policy evaluation
    // -----------------------------------------------------------------------

    async fn evaluate_policy(
        &self,
        cancel: CancellationToken,
        bundle: &PolicyBundle,
        now: DateTime<Utc>,
    ) -> Option<PolicyDecision> {
        let policy = &bundle.policy;

        if policy.max_replicas < policy.min_replicas {
            warn!(policy = %policy.name, "max_replicas < min_replicas; skipping policy");
            return None;
        }

        // Current replicas are sourced from the executor, never from
        // persisted state.
        let current = match self
            .executor
            .get_current_replicas(cancel.clone(), &policy.target)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(policy = %policy.name, error = %e, "replica probe failed; skipping policy");
                return None;
            }
        };

        self.ensure_state_loaded(cancel.clone(), policy.id).await;
        {
            let mut inner = self.inner.lock().expect("engine lock poisoned");
            if let Some(st) = inner.states.get_mut(&policy.id) {
                st.current_replicas = current;
            }
        }

        // Cooldown short-circuits everything, schedule matches included.
        let cooldown_secs = if policy.cooldown_seconds > 0 {
            policy.cooldown_seconds
        } else {
            self.cfg.default_cooldown_seconds
        };
        let in_cooldown = {
            let inner = self.inner.lock().expect("engine lock poisoned");
            inner
                .states
                .get(&policy.id)
                .and_then(|st| st.last_scale_time)
                .is_some_and(|t| (now - t).num_seconds() < cooldown_secs)
        };
        if in_cooldown {
            debug!(policy = %policy.name, "inside cooldown; no-op");
            return None;
        }

        // Rule-derived decision: up rules first, then down rules.
        let mut decision: Option<(ScaleAction, i32, String)> = None;

        let ups: Vec<&ScalingRule> = bundle
            .rules
            .iter()
            .filter(|r| r.direction == ScaleDirection::Up)
            .collect();
        if let Some((rule, value)) = self.first_firing_rule(cancel.clone(), &ups, now).await {
            let desired = clamp_replicas(policy, current.saturating_add(rule.scale_by));
            if desired > current {
                decision = Some((
                    ScaleAction::ScaleUp,
                    desired,
                    rule_reason(&rule, value),
                ));
            }
        }

        if decision.is_none() {
            let downs: Vec<&ScalingRule> = bundle
                .rules
                .iter()
                .filter(|r| r.direction == ScaleDirection::Down)
                .collect();
            if let Some((rule, value)) = self.first_firing_rule(cancel.clone(), &downs, now).await {
                let desired = clamp_replicas(policy, current.saturating_add(rule.scale_by));
                if desired < current {
                    decision = Some((
                        ScaleAction::ScaleDown,
                        desired,
                        rule_reason(&rule, value),
                    ));
                }
            }
        }

        // A schedule matching this minute overrides the rule decision,
        // including overriding it into a no-op.
        for sched in bundle.schedules.iter().filter(|s| s.enabled) {
            match schedule::matches_minute(sched, now) {
                Ok(Some(bucket)) => {
                    let already_fired = {
                        let mut inner = self.inner.lock().expect("engine lock poisoned");
                        if inner.schedule_fired.get(&sched.id) == Some(&bucket) {
                            true
                        } else {
                            inner.schedule_fired.insert(sched.id, bucket);
                            false
                        }
                    };
                    if already_fired {
                        continue;
                    }

                    let desired = clamp_replicas(policy, sched.desired_replicas);
                    if desired != current {
                        let action = if desired > current {
                            ScaleAction::ScaleUp
                        } else {
                            ScaleAction::ScaleDown
                        };
                        decision = Some((
                            action,
                            desired,
                            format!("schedule '{}' -> {} replicas", sched.cron, desired),
                        ));
                    } else {
                        decision = None;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(schedule = %sched.id, error = %e, "unusable schedule; skipping");
                }
            }
        }

        let (action, desired, reason) = decision?;
        Some(
            self.apply_decision(cancel, bundle, action, current, desired, reason, now)
                .await,
        )
    }

    /// Persist the decision, invoke the executor unless dry-run, and update
    /// cooldown state on success.
    #[allow(clippy::too_many_arguments)]
    async fn apply_decision(
        &self,
        cancel: CancellationToken,
        bundle: &PolicyBundle,
        action: ScaleAction,
        current: i32,
        desired: i32,
        reason: String,
        now: DateTime<Utc>,
    ) -> PolicyDecision {
        let policy = &bundle.policy;
        let dry_run = self.cfg.dry_run;

        let entry = ScalingHistoryEntry {
            id: Uuid::new_v4(),
            policy_id: policy.id,
            action,
            target: policy.target.clone(),
            previous_replicas: current,
            new_replicas: desired,
            reason: reason.clone(),
            dry_run,
            executed_at: now,
        };
        if let Err(e) = self.store.append_history(cancel.clone(), &entry).await {
            warn!(policy = %policy.name, error = %e, "failed to append scaling history");
        }

        let mut executed = false;
        if dry_run {
            info!(policy = %policy.name, action = action.as_str(), desired, %reason,
                "dry-run: decision recorded, executor not invoked");
        } else {
            match self
                .executor
                .scale(cancel.clone(), &policy.target, desired, false)
                .await
            {
                Ok(()) => {
                    executed = true;
                    info!(policy = %policy.name, action = action.as_str(),
                        previous = current, desired, %reason, "scaled");
                    let mut inner = self.inner.lock().expect("engine lock poisoned");
                    if let Some(st) = inner.states.get_mut(&policy.id) {
                        st.last_scale_time = Some(now);
                        st.last_action = Some(action);
                        st.current_replicas = desired;
                    }
                }
                Err(e) => {
                    warn!(policy = %policy.name, error = %e, "executor scale failed");
                    let err_entry = ScalingHistoryEntry {
                        id: Uuid::new_v4(),
                        policy_id: policy.id,
                        action: ScaleAction::NoOp,
                        target: policy.target.clone(),
                        previous_replicas: current,
                        new_replicas: current,
                        reason: format!("error: {e}"),
                        dry_run: false,
                        executed_at: now,
                    };
                    if let Err(e) = self.store.append_history(cancel.clone(), &err_entry).await {
                        warn!(policy = %policy.name, error = %e,
                            "failed to append scaling error history");
                    }
                }
            }
        }

        self.persist_state(cancel, bundle, now).await;

        PolicyDecision {
            policy_id: policy.id,
            action,
            previous_replicas: current,
            new_replicas: desired,
            reason,
            dry_run,
            executed,
        }
    }

    /// In stored order, the first rule whose duration gate fires. Rules
    /// whose `scale_by` sign contradicts their direction are skipped.
    async fn first_firing_rule(
        &self,
        cancel: CancellationToken,
        rules: &[&ScalingRule],
        now: DateTime<Utc>,
    ) -> Option<(ScalingRule, f64)> {
        for rule in rules {
            let sign_ok = match rule.direction {
                ScaleDirection::Up => rule.scale_by > 0,
                ScaleDirection::Down => rule.scale_by < 0,
            };
            if !sign_ok {
                warn!(rule = %rule.id, scale_by = rule.scale_by,
                    "scale_by sign contradicts direction; skipping rule");
                continue;
            }

            let samples = {
                let query = self
                    .metrics
                    .query_instant(&rule.metric, &rule.label_selectors);
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    res = query => match res {
                        Ok(s) => s,
                        Err(e) => {
                            // Leave the pending entry untouched: an
                            // unreachable backend is not evidence the
                            // condition cleared.
                            warn!(rule = %rule.id, metric = %rule.metric, error = %e,
                                "metric query failed; skipping rule");
                            continue;
                        }
                    },
                }
            };

            let breaching = samples
                .iter()
                .find(|s| rule.op.holds(s.value, rule.threshold));
            let holds = breaching.is_some();

            let fired = self
                .inner
                .lock()
                .expect("engine lock poisoned")
                .gate
                .observe(rule.id, holds, rule.duration_seconds, now)
                .is_fire();

            if fired {
                let value = breaching.map(|s| s.value).unwrap_or_default();
                return Some(((*rule).clone(), value));
            }
        }
        None
    }

    // -----------------------------------------------------------------------
    // State plumbing
    // -----------------------------------------------------------------------

    async fn ensure_state_loaded(&self, cancel: CancellationToken, policy_id: Uuid) {
        let loaded = {
            let inner = self.inner.lock().expect("engine lock poisoned");
            inner.states.contains_key(&policy_id)
        };
        if loaded {
            return;
        }

        let persisted = match self.store.load_state(cancel, policy_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(policy = %policy_id, error = %e, "failed to load scaling state; starting fresh");
                None
            }
        };

        let mut inner = self.inner.lock().expect("engine lock poisoned");
        let state = persisted.unwrap_or_else(|| ScalingState::new(policy_id));
        for (rule_id, first_seen) in &state.pending_conditions {
            inner.gate.seed(*rule_id, *first_seen);
        }
        inner.states.insert(policy_id, state);
    }

    async fn persist_state(
        &self,
        cancel: CancellationToken,
        bundle: &PolicyBundle,
        _now: DateTime<Utc>,
    ) {
        let rule_ids: HashSet<Uuid> = bundle.rules.iter().map(|r| r.id).collect();
        let state = {
            let mut inner = self.inner.lock().expect("engine lock poisoned");
            let pending = inner
                .gate
                .snapshot()
                .into_iter()
                .filter(|(k, _)| rule_ids.contains(k))
                .collect();
            let Some(st) = inner.states.get_mut(&bundle.policy.id) else {
                return;
            };
            st.pending_conditions = pending;
            st.clone()
        };

        if let Err(e) = self.store.save_state(cancel, &state).await {
            warn!(policy = %bundle.policy.id, error = %e, "failed to persist scaling state");
        }
    }

    /// Snapshot of the in-memory state for one policy (status endpoints).
    pub fn state_snapshot(&self, policy_id: Uuid) -> Option<ScalingState> {
        self.inner
            .lock()
            .expect("engine lock poisoned")
            .states
            .get(&policy_id)
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Clamp to `[min, max]`, then floor at one replica unless the policy
/// allows scale-to-zero.
fn clamp_replicas(policy: &ScalingPolicy, desired: i32) -> i32 {
    let clamped = desired.clamp(policy.min_replicas, policy.max_replicas);
    if clamped == 0 && !policy.scale_to_zero {
        1
    } else {
        clamped
    }
}

fn rule_reason(rule: &ScalingRule, value: f64) -> String {
    format!(
        "rule: {} {} {} held {}s (value {})",
        rule.metric,
        rule.op.as_str(),
        rule.threshold,
        rule.duration_seconds,
        value
    )
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use floe_schemas::{TargetKind, TargetRef};

    fn policy(min: i32, max: i32, scale_to_zero: bool) -> ScalingPolicy {
        ScalingPolicy {
            id: Uuid::new_v4(),
            name: "p".to_string(),
            target: TargetRef {
                kind: TargetKind::CdcWorker,
                target_id: None,
            },
            min_replicas: min,
            max_replicas: max,
            cooldown_seconds: 300,
            max_hourly_cost: None,
            scale_to_zero,
            enabled: true,
        }
    }

    #[test]
    fn clamp_respects_bounds() {
        let p = policy(1, 5, false);
        assert_eq!(clamp_replicas(&p, 7), 5);
        assert_eq!(clamp_replicas(&p, 0), 1);
        assert_eq!(clamp_replicas(&p, 3), 3);
        assert_eq!(clamp_replicas(&p, -2), 1);
    }

    #[test]
    fn clamp_floors_at_one_without_scale_to_zero() {
        let p = policy(0, 5, false);
        assert_eq!(clamp_replicas(&p, 0), 1);
        assert_eq!(clamp_replicas(&p, -3), 1);
    }

    #[test]
    fn clamp_allows_zero_with_scale_to_zero() {
        let p = policy(0, 5, true);
        assert_eq!(clamp_replicas(&p, 0), 0);
        assert_eq!(clamp_replicas(&p, -3), 0);
    }
}
