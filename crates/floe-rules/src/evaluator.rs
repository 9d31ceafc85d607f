//! Per-series threshold evaluation for alert rules.
//!
//! Evaluation is split in two: `evaluate_samples` is pure and fully
//! deterministic (rule + samples + now in, results out); [`Evaluator`] is
//! the thin async shell that fetches current samples from the metrics
//! backend first. No stateful gating happens here; the duration gate is a
//! separate concern.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use floe_metrics::{InstantSample, MetricsBackend, MetricsError};
use floe_schemas::AlertRule;

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Outcome of evaluating one rule against one labelled series.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub rule_id: Uuid,
    /// Rule labels merged with series labels; series wins on conflict.
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub should_fire: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// Merge rule labels with series labels; the series value wins when both
/// define the same key.
pub fn merge_labels(
    rule_labels: &BTreeMap<String, String>,
    series_labels: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = rule_labels.clone();
    for (k, v) in series_labels {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Evaluate `rule` against already-fetched samples.
pub fn evaluate_samples(
    rule: &AlertRule,
    samples: &[InstantSample],
    now: DateTime<Utc>,
) -> Vec<Evaluation> {
    samples
        .iter()
        .map(|s| Evaluation {
            rule_id: rule.id,
            labels: merge_labels(&rule.labels, &s.labels),
            value: s.value,
            should_fire: rule.op.holds(s.value, rule.threshold),
            evaluated_at: now,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Queries the metrics backend and evaluates one rule per call.
#[derive(Clone)]
pub struct Evaluator {
    metrics: Arc<dyn MetricsBackend>,
}

impl Evaluator {
    pub fn new(metrics: Arc<dyn MetricsBackend>) -> Self {
        Self { metrics }
    }

    /// Fetch current values for the rule's metric and evaluate each series.
    ///
    /// An empty series set yields an empty result list, which callers treat
    /// as "no series to gate" (and which later resolves firing instances).
    pub async fn evaluate(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> Result<Vec<Evaluation>, MetricsError> {
        let samples = self
            .metrics
            .query_instant(&rule.metric_name, &rule.label_selectors)
            .await?;
        Ok(evaluate_samples(rule, &samples, now))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use floe_schemas::{AlertSeverity, CmpOp};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn rule(op: CmpOp, threshold: f64) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            name: "cpu-high".to_string(),
            metric_name: "cpu_usage".to_string(),
            label_selectors: BTreeMap::new(),
            op,
            threshold,
            duration_seconds: 60,
            severity: AlertSeverity::Warning,
            labels: labels(&[("team", "data"), ("host", "rule-default")]),
            annotations: BTreeMap::new(),
            enabled: true,
        }
    }

    fn sample(value: f64, pairs: &[(&str, &str)]) -> InstantSample {
        InstantSample {
            labels: labels(pairs),
            value,
            at: Utc::now(),
        }
    }

    #[test]
    fn one_evaluation_per_series() {
        let r = rule(CmpOp::Gt, 80.0);
        let now = Utc::now();
        let evals = evaluate_samples(
            &r,
            &[sample(90.0, &[("host", "a")]), sample(10.0, &[("host", "b")])],
            now,
        );

        assert_eq!(evals.len(), 2);
        assert!(evals[0].should_fire);
        assert!(!evals[1].should_fire);
        assert_eq!(evals[0].evaluated_at, now);
    }

    #[test]
    fn series_labels_win_over_rule_labels() {
        let r = rule(CmpOp::Gt, 80.0);
        let evals = evaluate_samples(&r, &[sample(90.0, &[("host", "a")])], Utc::now());

        // "host" collides: the series value wins; "team" survives from the rule.
        assert_eq!(evals[0].labels.get("host").unwrap(), "a");
        assert_eq!(evals[0].labels.get("team").unwrap(), "data");
    }

    #[test]
    fn empty_samples_yield_no_evaluations() {
        let r = rule(CmpOp::Gt, 80.0);
        assert!(evaluate_samples(&r, &[], Utc::now()).is_empty());
    }

    struct FixedBackend {
        samples: Vec<InstantSample>,
    }

    #[async_trait::async_trait]
    impl MetricsBackend for FixedBackend {
        async fn query_instant(
            &self,
            _metric: &str,
            _selectors: &BTreeMap<String, String>,
        ) -> Result<Vec<InstantSample>, MetricsError> {
            Ok(self.samples.clone())
        }
    }

    #[tokio::test]
    async fn evaluator_queries_then_evaluates() {
        let backend = Arc::new(FixedBackend {
            samples: vec![sample(95.0, &[("host", "a")])],
        });
        let ev = Evaluator::new(backend);

        let evals = ev.evaluate(&rule(CmpOp::Gt, 80.0), Utc::now()).await.unwrap();
        assert_eq!(evals.len(), 1);
        assert!(evals[0].should_fire);
    }
}
