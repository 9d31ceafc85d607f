//! floe-metrics
//!
//! Instant-query client for a PromQL-compatible HTTP endpoint.
//!
//! This crate owns the query abstraction and the concrete Prometheus
//! client. It does **not** decide what a value means; callers (alerting,
//! scaling) evaluate the returned samples against their own rules.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Request timeout for a single instant query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// InstantSample
// ---------------------------------------------------------------------------

/// One labelled series value from an instant query.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantSample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// MetricsError
// ---------------------------------------------------------------------------

/// Errors a metrics backend query may produce.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// Network or transport failure (connect, timeout).
    Transport(String),
    /// Non-2xx HTTP response; body retained for diagnostics.
    HttpStatus { code: u16, body: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The backend answered `status != "success"`.
    Backend { error_type: String, message: String },
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::Transport(msg) => write!(f, "metrics transport error: {msg}"),
            MetricsError::HttpStatus { code, body } => {
                write!(f, "metrics http error status={code}: {body}")
            }
            MetricsError::Decode(msg) => write!(f, "metrics decode error: {msg}"),
            MetricsError::Backend {
                error_type,
                message,
            } => write!(f, "metrics backend error type={error_type}: {message}"),
        }
    }
}

impl std::error::Error for MetricsError {}

impl MetricsError {
    /// Transport and 5xx failures are worth retrying; everything else is a
    /// caller or backend contract problem.
    pub fn is_transient(&self) -> bool {
        match self {
            MetricsError::Transport(_) => true,
            MetricsError::HttpStatus { code, .. } => *code >= 500,
            MetricsError::Decode(_) | MetricsError::Backend { .. } => false,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsBackend trait
// ---------------------------------------------------------------------------

/// Instant-query contract consumed by the alerting and scaling engines.
///
/// Implementations must be object-safe so callers can hold an
/// `Arc<dyn MetricsBackend>` without knowing the concrete type.
#[async_trait::async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Query the current value of `metric` narrowed by exact-match
    /// `selectors`. An empty series set is `Ok(vec![])`, not an error.
    async fn query_instant(
        &self,
        metric: &str,
        selectors: &BTreeMap<String, String>,
    ) -> Result<Vec<InstantSample>, MetricsError>;
}

// ---------------------------------------------------------------------------
// PromQL rendering
// ---------------------------------------------------------------------------

/// Render `metric{k="v",...}` with label values escaped for PromQL.
pub fn render_selector(metric: &str, selectors: &BTreeMap<String, String>) -> String {
    if selectors.is_empty() {
        return metric.to_string();
    }
    let body = selectors
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{metric}{{{body}}}")
}

fn escape_label_value(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

// ---------------------------------------------------------------------------
// PromClient
// ---------------------------------------------------------------------------

/// HTTP client for `<base>/api/v1/query`.
#[derive(Debug, Clone)]
pub struct PromClient {
    http: reqwest::Client,
    base_url: String,
}

impl PromClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn query_url(&self) -> String {
        format!("{}/api/v1/query", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl MetricsBackend for PromClient {
    async fn query_instant(
        &self,
        metric: &str,
        selectors: &BTreeMap<String, String>,
    ) -> Result<Vec<InstantSample>, MetricsError> {
        let promql = render_selector(metric, selectors);

        let resp = self
            .http
            .get(self.query_url())
            .query(&[("query", promql.as_str())])
            .send()
            .await
            .map_err(|e| MetricsError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| MetricsError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(MetricsError::HttpStatus {
                code: status.as_u16(),
                body,
            });
        }

        let parsed: PromQueryResponse =
            serde_json::from_str(&body).map_err(|e| MetricsError::Decode(e.to_string()))?;

        if parsed.status != "success" {
            return Err(MetricsError::Backend {
                error_type: parsed.error_type.unwrap_or_else(|| "unknown".to_string()),
                message: parsed.error.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let result = parsed.data.map(|d| d.result).unwrap_or_default();
        let mut samples = Vec::with_capacity(result.len());
        for series in result {
            samples.push(series.into_sample()?);
        }
        Ok(samples)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PromQueryResponse {
    status: String,
    #[serde(default)]
    data: Option<PromQueryData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromQueryData {
    #[serde(default)]
    result: Vec<PromSeries>,
}

#[derive(Debug, Deserialize)]
struct PromSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    /// `[unix_ts_float, "stringified_float"]`; Prometheus JSON encodes
    /// sample values as strings.
    value: (f64, String),
}

impl PromSeries {
    fn into_sample(self) -> Result<InstantSample, MetricsError> {
        let (ts, raw) = self.value;
        let value: f64 = raw
            .parse()
            .map_err(|_| MetricsError::Decode(format!("unparseable sample value '{raw}'")))?;

        let secs = ts.trunc() as i64;
        let nanos = ((ts - ts.trunc()) * 1e9) as u32;
        let at = DateTime::<Utc>::from_timestamp(secs, nanos)
            .ok_or_else(|| MetricsError::Decode(format!("timestamp {ts} out of range")))?;

        Ok(InstantSample {
            labels: self.metric,
            value,
            at,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests (rendering + wire parsing; HTTP paths live in tests/)
// ---------------------------------------------------------------------------
