//! Library configuration loading and validation.

use crate::filter::FilterFlags;
use crate::key_filter::KeyFilterPair;
use anyhow::{Context, Result};
use lib_dut::DutType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of a device library.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeembedConfig {
    /// Device types that get corrected.
    #[serde(default = "default_deem_types")]
    pub deem_types: Vec<DutType>,

    /// `(measurement, calibration)` key patterns for AC correction.
    #[serde(default)]
    pub ac_filter_names: Vec<(String, String)>,

    /// `(measurement, calibration)` key patterns for DC correction.
    #[serde(default)]
    pub dc_filter_names: Vec<(String, String)>,

    /// Device names hidden from iteration and lookup.
    #[serde(default)]
    pub ignore_duts: Vec<String>,

    /// Reference temperature in kelvin of the DC resistance record.
    #[serde(default = "default_t_ref")]
    pub t_ref: f64,

    #[serde(default)]
    pub forced_current: bool,

    /// Attribute filters used when several calibration structures exist.
    #[serde(default)]
    pub filters: FilterFlags,
}

fn default_deem_types() -> Vec<DutType> { vec![DutType::NPN] }
fn default_t_ref() -> f64 { 300.0 }

impl Default for DeembedConfig {
    fn default() -> Self {
        Self {
            deem_types: default_deem_types(),
            ac_filter_names: Vec::new(),
            dc_filter_names: Vec::new(),
            ignore_duts: Vec::new(),
            t_ref: default_t_ref(),
            forced_current: false,
            filters: FilterFlags::default(),
        }
    }
}

impl DeembedConfig {
    pub fn with_ac_filter(mut self, measurement: &str, calibration: &str) -> Self {
        self.ac_filter_names
            .push((measurement.to_string(), calibration.to_string()));
        self
    }

    pub fn with_dc_filter(mut self, measurement: &str, calibration: &str) -> Self {
        self.dc_filter_names
            .push((measurement.to_string(), calibration.to_string()));
        self
    }
}

/// Load configuration from a file.
pub fn load_config(path: &Path) -> Result<DeembedConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: DeembedConfig = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config as JSON: {:?}", path))?
    } else {
        // Assume TOML
        toml::from_str(&content).with_context(|| "Failed to parse config as TOML")?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Validate configuration.
pub fn validate_config(config: &DeembedConfig) -> Result<()> {
    KeyFilterPair::compile_all(&config.ac_filter_names).context("Invalid AC key pattern")?;
    KeyFilterPair::compile_all(&config.dc_filter_names).context("Invalid DC key pattern")?;

    if !config.t_ref.is_finite() || config.t_ref <= 0.0 {
        anyhow::bail!("Reference temperature must be positive (got {})", config.t_ref);
    }

    if config.deem_types.is_empty() {
        tracing::warn!("No device types selected for de-embedding");
    }

    Ok(())
}
