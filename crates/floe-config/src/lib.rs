//! floe-config
//!
//! Layered YAML configuration for the floe daemon and pipeline embedders.
//! Later layers override earlier ones key by key, the merged document is
//! digested (invariant to key order) so a run can prove which
//! configuration it saw, and a typed view exposes every recognized option
//! with its default.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub mod view;

pub use view::{
    AlertingSettings, BackpressureSettings, CdcSettings, DaemonSettings, FloeSettings,
    MetricsSettings, RetrySettings, ScalingSettings,
};

// ---------------------------------------------------------------------------
// FloeConfig
// ---------------------------------------------------------------------------

/// A fully loaded configuration: the typed settings, the merged document
/// they were parsed from, and the document's stable digest.
#[derive(Debug, Clone)]
pub struct FloeConfig {
    pub settings: FloeSettings,
    /// Merged document, kept for status output and diagnostics.
    pub document: Value,
    /// Hex SHA-256 over the canonical rendering of the merged document.
    /// Identical configuration content yields an identical hash regardless
    /// of key order in the source files.
    pub hash: String,
}

impl FloeConfig {
    /// Read and merge YAML layers in order, digest the result, and parse
    /// the typed settings. Fails on unreadable files, malformed YAML, or a
    /// missing required option.
    pub fn load(paths: &[&str]) -> Result<Self> {
        let mut document = Value::Object(serde_json::Map::new());

        for path in paths {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read config layer: {path}"))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&raw)
                .with_context(|| format!("parse yaml layer: {path}"))?;
            let layer = serde_json::to_value(layer)
                .with_context(|| format!("convert yaml layer: {path}"))?;
            overlay(&mut document, layer);
        }

        let hash = stable_digest(&document);
        let settings: FloeSettings = serde_json::from_value(document.clone())
            .context("config does not match the recognized schema")?;
        settings.validate()?;

        Ok(Self {
            settings,
            document,
            hash,
        })
    }
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// Overlay `layer` onto `base`. Matching object keys recurse; everything
/// else (scalars, arrays, type changes) is taken wholesale from the layer.
fn overlay(base: &mut Value, layer: Value) {
    match layer {
        Value::Object(layer_map) if base.is_object() => {
            let base_map = base.as_object_mut().expect("checked object above");
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        other => *base = other,
    }
}

// ---------------------------------------------------------------------------
// Stable digest
// ---------------------------------------------------------------------------

/// Hash the document via a canonical rendering: object keys are walked in
/// sorted order and written into one compact buffer, so the digest does
/// not depend on how the source files ordered their keys.
fn stable_digest(doc: &Value) -> String {
    let mut rendered = String::new();
    render_canonical(doc, &mut rendered);

    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    hex::encode(hasher.finalize())
}

fn render_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string key serializes"));
                out.push(':');
                render_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).expect("scalar serializes"));
        }
    }
}

// Used by view::FloeSettings::validate.
pub(crate) fn require(cond: bool, msg: &str) -> Result<()> {
    if !cond {
        bail!("config error: {msg}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
