//! Error types for calibration resolution and de-embedding.

use crate::state::Correction;
use lib_dut::{DataError, KeyError};
use std::fmt;
use thiserror::Error;

/// Which side of the open/short pair is meant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationKind {
    Open,
    Short,
}

impl fmt::Display for CalibrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Short => f.write_str("short"),
        }
    }
}

/// Errors that can occur while resolving calibration structures or applying
/// a correction.
#[derive(Debug, Error)]
pub enum DeembedError {
    /// Filters, overrides or key patterns do not allow an unambiguous choice.
    /// Raised before anything is mutated.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// More than one open or short survived filtering.
    #[error("For device '{device}' more than one open/short structure matched: {}", matches.join(", "))]
    AmbiguousCalibration {
        device: String,
        matches: Vec<String>,
    },

    /// No open or no short survived filtering.
    #[error("For device '{device}' no {kind} was found (deemb_name '{deemb_name}'). Available: {}", available.join(", "))]
    MissingCalibration {
        device: String,
        kind: CalibrationKind,
        deemb_name: String,
        available: Vec<String>,
    },

    /// A dataset matched a measurement pattern but no calibration key fits.
    #[error("Dataset '{key}' of device '{device}' requires de-embedding, but no suitable calibration key was found")]
    NoSuitableKey { device: String, key: String },

    /// The correction rejected the combination of datasets.
    #[error("Datasets '{open_key}' of '{open}' and '{short_key}' of '{short}' do not match dataset '{key}' of device '{device}': {source}")]
    DataShapeMismatch {
        device: String,
        key: String,
        open: String,
        open_key: String,
        short: String,
        short_key: String,
        #[source]
        source: DataError,
    },

    /// Metallization-resistance extraction needed a column the short lacks.
    #[error("Column missing in dataset '{key}' of short '{short}'. Available columns: {}", available.join(", "))]
    MissingColumn {
        short: String,
        key: String,
        available: Vec<String>,
        #[source]
        source: DataError,
    },

    /// The correction was already applied to this library.
    #[error("Library has already been {0} de-embedded")]
    AlreadyDeembedded(Correction),

    /// The library is corrected and no longer accepts devices.
    #[error("Library is already de-embedded and does not accept new devices")]
    Locked,

    /// A device of this name already exists.
    #[error("A device named '{0}' already exists. Device names must be unique")]
    DuplicateDevice(String),

    /// No device of this name exists.
    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    /// A key temperature could not be determined.
    #[error("Device '{device}': {source}")]
    KeyTemperature {
        device: String,
        #[source]
        source: KeyError,
    },

    /// Any other failure reported by a dataset.
    #[error(transparent)]
    Data(#[from] DataError),
}

impl DeembedError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a missing calibration error.
    pub fn missing(
        device: impl Into<String>,
        kind: CalibrationKind,
        deemb_name: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Self::MissingCalibration {
            device: device.into(),
            kind,
            deemb_name: deemb_name.into(),
            available,
        }
    }

    /// Create a no-suitable-key error.
    pub fn no_suitable_key(device: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NoSuitableKey {
            device: device.into(),
            key: key.into(),
        }
    }

    /// Create a key temperature error.
    pub fn key_temperature(device: impl Into<String>, source: KeyError) -> Self {
        Self::KeyTemperature {
            device: device.into(),
            source,
        }
    }

    /// True if the failure was detected before any device data changed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::AlreadyDeembedded(_) | Self::Locked
        )
    }
}

/// Result type for de-embedding operations.
pub type DeembedResult<T> = Result<T, DeembedError>;
