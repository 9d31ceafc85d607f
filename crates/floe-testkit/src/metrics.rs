//! Scripted metrics backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::Utc;

use floe_metrics::{InstantSample, MetricsBackend, MetricsError};

/// Programmable [`MetricsBackend`]: tests set the samples a metric returns
/// and flip them between evaluation ticks.
#[derive(Default)]
pub struct ScriptedMetrics {
    series: Mutex<HashMap<String, Vec<InstantSample>>>,
    fail: Mutex<Option<MetricsError>>,
}

impl ScriptedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_samples(&self, metric: &str, samples: Vec<InstantSample>) {
        self.series
            .lock()
            .unwrap()
            .insert(metric.to_string(), samples);
    }

    /// Shorthand: one series with the given labels and value.
    pub fn set_value(&self, metric: &str, labels: &[(&str, &str)], value: f64) {
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.set_samples(
            metric,
            vec![InstantSample {
                labels,
                value,
                at: Utc::now(),
            }],
        );
    }

    /// Remove a metric entirely (the series set becomes empty).
    pub fn clear(&self, metric: &str) {
        self.series.lock().unwrap().remove(metric);
    }

    /// Make every query fail until cleared with `set_ok`.
    pub fn fail_with(&self, err: MetricsError) {
        *self.fail.lock().unwrap() = Some(err);
    }

    pub fn set_ok(&self) {
        *self.fail.lock().unwrap() = None;
    }
}

#[async_trait::async_trait]
impl MetricsBackend for ScriptedMetrics {
    async fn query_instant(
        &self,
        metric: &str,
        _selectors: &BTreeMap<String, String>,
    ) -> Result<Vec<InstantSample>, MetricsError> {
        if let Some(err) = self.fail.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self
            .series
            .lock()
            .unwrap()
            .get(metric)
            .cloned()
            .unwrap_or_default())
    }
}
