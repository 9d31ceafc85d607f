//! Conversion from loaded settings to subsystem configs.
//!
//! Pipelines are constructed by the deployment that owns a source adapter;
//! this module gives those embedders (and the daemon itself) one place
//! where configuration keys turn into engine parameters.

use std::time::Duration;

use floe_config::FloeSettings;
use floe_pipeline::{BackpressureConfig, PipelineConfig};
use floe_retry::RetryPolicy;

pub fn pipeline_config_from(settings: &FloeSettings) -> PipelineConfig {
    let cdc = &settings.cdc;
    PipelineConfig {
        checkpoint_interval: Duration::from_secs(cdc.checkpoint_interval_seconds),
        retry: RetryPolicy {
            max_attempts: cdc.retry.max_attempts,
            initial_interval: Duration::from_millis(cdc.retry.initial_ms),
            max_interval: Duration::from_millis(cdc.retry.max_ms),
            multiplier: cdc.retry.multiplier,
            jitter: true,
        },
        backpressure: Some(BackpressureConfig {
            high_watermark: cdc.backpressure.high_watermark,
            low_watermark: cdc.backpressure.low_watermark,
            check_interval: Duration::from_secs(cdc.backpressure.check_interval_seconds),
        }),
    }
}
