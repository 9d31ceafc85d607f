//! The alert manager cycle.
//!
//! Every tick: load enabled rules, evaluate each against fresh metric
//! samples, push series through the duration gate, create or refresh
//! firing instances, then resolve every firing instance whose fingerprint
//! was not observed breaching this cycle.
//!
//! Per-rule and per-series failures log and continue; only a failure to
//! load the rule set or the firing list aborts a cycle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use floe_metrics::MetricsBackend;
use floe_rules::{fingerprint, Evaluation, Evaluator, PendingGate};
use floe_schemas::{
    AlertHistoryEntry, AlertHistoryKind, AlertInstance, AlertRule, AlertStatus, Silence,
};

use crate::channels::{ChannelFactory, NotifyEvent};
use crate::notifier::Notifier;
use crate::store::{AlertStore, StoreError};

// ---------------------------------------------------------------------------
// Config / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct AlertManagerConfig {
    pub evaluation_interval: Duration,
    /// Per-send deadline handed to the notifier.
    pub notification_timeout: Duration,
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self {
            evaluation_interval: Duration::from_secs(30),
            notification_timeout: Duration::from_secs(10),
        }
    }
}

/// Counters returned by one cycle, used by status output and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertCycleOutcome {
    pub rules_evaluated: usize,
    pub instances_created: usize,
    pub instances_resolved: usize,
    pub notifications_attempted: usize,
}

// ---------------------------------------------------------------------------
// AlertManager
// ---------------------------------------------------------------------------

pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    evaluator: Evaluator,
    notifier: Notifier,
    /// fingerprint -> first breach; guarded here, never held across await.
    gate: Mutex<PendingGate<String>>,
    cfg: AlertManagerConfig,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn AlertStore>,
        metrics: Arc<dyn MetricsBackend>,
        factory: ChannelFactory,
        cfg: AlertManagerConfig,
    ) -> Self {
        let notifier = Notifier::new(Arc::clone(&store), factory, cfg.notification_timeout);
        Self {
            store,
            evaluator: Evaluator::new(metrics),
            notifier,
            gate: Mutex::new(PendingGate::new()),
            cfg,
        }
    }

    /// Tick until cancelled. Cycle failures are logged, never fatal.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cfg.evaluation_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = self.cfg.evaluation_interval.as_secs(), "alert manager started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("alert manager stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.evaluate_cycle(cancel.clone(), Utc::now()).await {
                        Ok(outcome) => debug!(?outcome, "alert cycle complete"),
                        Err(e) => warn!(error = %e, "alert cycle failed"),
                    }
                }
            }
        }
    }

    /// One full evaluation pass at `now`. Deterministic given the store and
    /// metrics backend contents, so scenario tests drive it directly.
    pub async fn evaluate_cycle(
        &self,
        cancel: CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<AlertCycleOutcome, StoreError> {
        let rules = self.store.list_enabled_rules(cancel.clone()).await?;
        let silences = self.store.list_silences(cancel.clone()).await?;

        let mut outcome = AlertCycleOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        for rule in &rules {
            outcome.rules_evaluated += 1;

            let evals = match self.evaluator.evaluate(rule, now).await {
                Ok(evals) => evals,
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "rule evaluation failed; skipping");
                    continue;
                }
            };

            for eval in evals {
                let fp = fingerprint(rule.id, &eval.labels);
                if eval.should_fire {
                    seen.insert(fp.clone());
                }

                let decision = self
                    .gate
                    .lock()
                    .expect("gate lock poisoned")
                    .observe(fp.clone(), eval.should_fire, rule.duration_seconds, now);

                if decision.is_fire() {
                    match self
                        .handle_fire(cancel.clone(), rule, &eval, &fp, &silences, now)
                        .await
                    {
                        Ok((created, attempted)) => {
                            if created {
                                outcome.instances_created += 1;
                            }
                            outcome.notifications_attempted += attempted;
                        }
                        Err(e) => {
                            warn!(rule = %rule.name, fingerprint = %fp, error = %e,
                                "failed to persist firing instance");
                        }
                    }
                }
            }
        }

        // Resolution pass: anything still firing that did not breach this
        // cycle gets resolved and notified once, unconditionally.
        let firing = self.store.list_firing(cancel.clone()).await?;
        for mut instance in firing {
            if seen.contains(&instance.fingerprint) {
                continue;
            }
            match self
                .resolve_instance(cancel.clone(), &mut instance, now)
                .await
            {
                Ok(attempted) => {
                    outcome.instances_resolved += 1;
                    outcome.notifications_attempted += attempted;
                }
                Err(e) => {
                    warn!(instance = %instance.id, error = %e, "failed to resolve instance");
                }
            }
        }

        Ok(outcome)
    }

    /// Gate said fire: persist (or refresh) the instance and notify unless
    /// an active silence covers the merged labels.
    async fn handle_fire(
        &self,
        cancel: CancellationToken,
        rule: &AlertRule,
        eval: &Evaluation,
        fp: &str,
        silences: &[Silence],
        now: DateTime<Utc>,
    ) -> Result<(bool, usize), StoreError> {
        let suppressed = silences
            .iter()
            .any(|s| s.is_active(now) && s.matches(&eval.labels));
        if suppressed {
            debug!(rule = %rule.name, fingerprint = %fp, "active silence suppresses notification");
        }

        match self.store.find_firing(cancel.clone(), rule.id, fp).await? {
            Some(mut instance) => {
                instance.current_value = eval.value;
                self.store
                    .update_instance(cancel.clone(), &instance)
                    .await?;

                let attempted = if suppressed {
                    0
                } else {
                    self.notifier
                        .notify(cancel, rule, &instance, NotifyEvent::Firing, now)
                        .await?
                };
                Ok((false, attempted))
            }
            None => {
                let instance = AlertInstance {
                    id: Uuid::new_v4(),
                    rule_id: rule.id,
                    fingerprint: fp.to_string(),
                    status: AlertStatus::Firing,
                    labels: eval.labels.clone(),
                    current_value: eval.value,
                    fired_at: now,
                    resolved_at: None,
                };
                self.store.insert_instance(cancel.clone(), &instance).await?;
                self.append_history(cancel.clone(), &instance, AlertHistoryKind::Fired, None, now)
                    .await;
                info!(rule = %rule.name, fingerprint = %fp, value = eval.value, "alert fired");

                let attempted = if suppressed {
                    0
                } else {
                    self.notifier
                        .notify(cancel, rule, &instance, NotifyEvent::Firing, now)
                        .await?
                };
                Ok((true, attempted))
            }
        }
    }

    async fn resolve_instance(
        &self,
        cancel: CancellationToken,
        instance: &mut AlertInstance,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        instance.status = AlertStatus::Resolved;
        instance.resolved_at = Some(now);
        self.store.update_instance(cancel.clone(), instance).await?;
        self.append_history(
            cancel.clone(),
            instance,
            AlertHistoryKind::Resolved,
            None,
            now,
        )
        .await;
        self.notifier.clear_last_sent(&instance.fingerprint);
        info!(instance = %instance.id, fingerprint = %instance.fingerprint, "alert resolved");

        // Resolved notifications bypass silences; an operator who muted the
        // noise still wants to hear it cleared.
        match self.store.get_rule(cancel.clone(), instance.rule_id).await {
            Ok(rule) => {
                self.notifier
                    .notify(cancel, &rule, instance, NotifyEvent::Resolved, now)
                    .await
            }
            Err(StoreError::NotFound) => {
                debug!(instance = %instance.id, "rule deleted; resolving without notification");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    async fn append_history(
        &self,
        cancel: CancellationToken,
        instance: &AlertInstance,
        kind: AlertHistoryKind,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) {
        let entry = AlertHistoryEntry {
            id: Uuid::new_v4(),
            instance_id: instance.id,
            rule_id: instance.rule_id,
            kind,
            detail,
            at: now,
        };
        if let Err(e) = self.store.append_history(cancel, &entry).await {
            warn!(instance = %instance.id, error = %e, "failed to append alert history");
        }
    }
}

/// The default channel factory as an owned [`ChannelFactory`].
pub fn default_channel_factory() -> ChannelFactory {
    Arc::new(|channel| crate::channels::build_channel(channel))
}
