//! # lib-dut
//!
//! Core type definitions for the DUT library.
//!
//! This crate provides the records every other crate works on:
//! - Physical units with compile-time safety
//! - The device-type flag set and its subtype test
//! - Measurement keys with their encoded temperature
//! - Device records holding keyed datasets
//! - The contract datasets implement for AC/DC correction

pub mod units;
pub mod dut_type;
pub mod key;
pub mod device;
pub mod dataset;
pub mod error;

pub use units::*;
pub use dut_type::{DutType, UnknownDutType};
pub use key::{get_key_temperature, KeyTemperature, MeasurementKey};
pub use device::Device;
pub use dataset::{AcContext, MeasurementData, ResistanceRecord};
pub use error::{DataError, DataResult, KeyError, KeyResult};
