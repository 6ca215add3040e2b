//! # lib-deembed
//!
//! Calibration-structure resolution and AC/DC de-embedding for DUT libraries.
//!
//! This crate provides:
//! - Attribute filters pairing devices with open and short structures
//! - A resolver picking exactly one calibration structure per device
//! - Open-short AC correction and metallization-resistance DC correction
//! - `DutLib`, which runs each correction at most once over its devices
//!
//! The numeric corrections belong to the dataset type; see
//! [`lib_dut::MeasurementData`].

pub mod error;
pub mod state;
pub mod filter;
pub mod key_filter;
pub mod resolver;
pub mod ac;
pub mod dc;
pub mod config;
pub mod progress;
pub mod library;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CalibrationKind, DeembedError, DeembedResult};
pub use state::{Correction, LibraryState};
pub use filter::{AttributeComparator, FilterFlags};
pub use key_filter::KeyFilterPair;
pub use resolver::{AcOverride, AcPair, CalibrationResolver};
pub use ac::{deembed_device_ac, plan_ac_keys, KeySelection};
pub use dc::{deembed_device_dc, plan_dc_keys, DatasetOverride, DcKeySelection, DcOptions, ShortOverride};
pub use config::{load_config, DeembedConfig};
pub use progress::{LogProgress, NoProgress, ProgressObserver};
pub use library::{AcPlanEntry, DcPlanEntry, DutLib};
