//! Measurement-key patterns.
//!
//! A pair `(measurement, calibration)` says: datasets of a device whose key
//! matches `measurement` are corrected with calibration datasets whose key
//! matches `calibration`. Both are case-insensitive regular expressions
//! searched anywhere in the key.

use crate::error::{DeembedError, DeembedResult};
use regex::{Regex, RegexBuilder};

/// Compiled `(measurement, calibration)` key pattern pair.
#[derive(Clone, Debug)]
pub struct KeyFilterPair {
    measurement: Regex,
    calibration: Regex,
}

fn compile(pattern: &str) -> DeembedResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| DeembedError::configuration(format!("invalid key pattern '{}': {}", pattern, e)))
}

impl KeyFilterPair {
    pub fn new(measurement: &str, calibration: &str) -> DeembedResult<Self> {
        Ok(Self {
            measurement: compile(measurement)?,
            calibration: compile(calibration)?,
        })
    }

    /// Compile a list of string pairs, keeping their order.
    pub fn compile_all(pairs: &[(String, String)]) -> DeembedResult<Vec<Self>> {
        pairs.iter().map(|(m, c)| Self::new(m, c)).collect()
    }

    pub fn measurement_pattern(&self) -> &str {
        self.measurement.as_str()
    }

    pub fn calibration_pattern(&self) -> &str {
        self.calibration.as_str()
    }

    /// Device key falls under this pair.
    pub fn matches_measurement(&self, key: &str) -> bool {
        self.measurement.is_match(key)
    }

    /// Calibration keys among `keys` that this pair accepts, in order.
    pub fn calibration_keys<'k, I>(&self, keys: I) -> Vec<&'k str>
    where
        I: IntoIterator<Item = &'k String>,
    {
        keys.into_iter()
            .map(String::as_str)
            .filter(|k| self.calibration.is_match(k))
            .collect()
    }
}

/// True if any pair claims `key` for correction.
pub fn requires_correction(pairs: &[KeyFilterPair], key: &str) -> bool {
    pairs.iter().any(|p| p.matches_measurement(key))
}
