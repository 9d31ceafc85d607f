//! Typed view over the merged configuration document.
//!
//! Every recognized option with its default. Unknown keys are ignored so
//! deployments can carry operator annotations without breaking startup;
//! missing required options fail fast.

use anyhow::Result;
use serde::Deserialize;

use crate::require;

// ---------------------------------------------------------------------------
// FloeSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FloeSettings {
    #[serde(default)]
    pub cdc: CdcSettings,
    #[serde(default)]
    pub alerting: AlertingSettings,
    #[serde(default)]
    pub scaling: ScalingSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub daemon: DaemonSettings,
}

impl FloeSettings {
    /// Startup validation: required options and basic sanity.
    pub fn validate(&self) -> Result<()> {
        require(
            !self.metrics.prometheus_url.is_empty(),
            "metrics.prometheus_url is required",
        )?;
        require(
            self.cdc.backpressure.high_watermark >= self.cdc.backpressure.low_watermark,
            "cdc.backpressure.high_watermark must be >= low_watermark",
        )?;
        require(
            self.cdc.retry.multiplier >= 1.0,
            "cdc.retry.multiplier must be >= 1.0",
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CDC
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CdcSettings {
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_seconds: u64,
    #[serde(default = "default_buffer_retention")]
    pub buffer_retention_seconds: u64,
    #[serde(default)]
    pub backpressure: BackpressureSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for CdcSettings {
    fn default() -> Self {
        Self {
            checkpoint_interval_seconds: default_checkpoint_interval(),
            buffer_retention_seconds: default_buffer_retention(),
            backpressure: BackpressureSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

fn default_checkpoint_interval() -> u64 {
    10
}

fn default_buffer_retention() -> u64 {
    86_400
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackpressureSettings {
    #[serde(default = "default_high_watermark")]
    pub high_watermark: u64,
    #[serde(default = "default_low_watermark")]
    pub low_watermark: u64,
    #[serde(default = "default_bp_check_interval")]
    pub check_interval_seconds: u64,
}

impl Default for BackpressureSettings {
    fn default() -> Self {
        Self {
            high_watermark: default_high_watermark(),
            low_watermark: default_low_watermark(),
            check_interval_seconds: default_bp_check_interval(),
        }
    }
}

fn default_high_watermark() -> u64 {
    10_000
}

fn default_low_watermark() -> u64 {
    1_000
}

fn default_bp_check_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_ms: default_retry_initial_ms(),
            max_ms: default_retry_max_ms(),
            multiplier: default_retry_multiplier(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_initial_ms() -> u64 {
    200
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

// ---------------------------------------------------------------------------
// Alerting / scaling / metrics / daemon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AlertingSettings {
    #[serde(default = "default_alert_interval")]
    pub evaluation_interval_seconds: u64,
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_seconds: u64,
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            evaluation_interval_seconds: default_alert_interval(),
            notification_timeout_seconds: default_notification_timeout(),
        }
    }
}

fn default_alert_interval() -> u64 {
    30
}

fn default_notification_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScalingSettings {
    #[serde(default = "default_scaling_interval")]
    pub evaluation_interval_seconds: u64,
    #[serde(default = "default_cooldown")]
    pub default_cooldown_seconds: i64,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            evaluation_interval_seconds: default_scaling_interval(),
            default_cooldown_seconds: default_cooldown(),
            dry_run: false,
        }
    }
}

fn default_scaling_interval() -> u64 {
    30
}

fn default_cooldown() -> i64 {
    300
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    /// Base URL of the PromQL-compatible backend. Required.
    #[serde(default)]
    pub prometheus_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8700".to_string()
}
