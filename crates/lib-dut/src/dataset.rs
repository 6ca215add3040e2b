//! Contract of the tabular datasets held by a device.
//!
//! The numeric corrections themselves (open-short S-parameter de-embedding,
//! metallization-resistance extraction and subtraction) belong to the dataset
//! implementation. The library only decides which inputs go together and
//! replaces the device data with the returned values.

use crate::error::DataResult;
use crate::units::Ohms;
use serde::{Deserialize, Serialize};

/// Series metallization resistances of emitter, base and collector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResistanceRecord {
    #[serde(rename = "R_EM")]
    pub r_em: Ohms,
    #[serde(rename = "R_BM")]
    pub r_bm: Ohms,
    #[serde(rename = "R_CM")]
    pub r_cm: Ohms,
}

impl ResistanceRecord {
    pub const ZERO: Self = Self {
        r_em: Ohms::ZERO,
        r_bm: Ohms::ZERO,
        r_cm: Ohms::ZERO,
    };

    pub fn new(r_em: f64, r_bm: f64, r_cm: f64) -> Self {
        Self {
            r_em: Ohms(r_em),
            r_bm: Ohms(r_bm),
            r_cm: Ohms(r_cm),
        }
    }

    /// All three resistances are zero, so a DC correction changes nothing.
    pub fn is_zero(&self) -> bool {
        self.r_em.is_zero() && self.r_bm.is_zero() && self.r_cm.is_zero()
    }
}

/// Port and device-count context passed to the AC correction.
#[derive(Clone, Copy, Debug)]
pub struct AcContext<'a> {
    /// Terminal names of the device, in port order.
    pub ports: &'a [String],
    /// Number of parallel devices in the measured structure.
    pub ndevices: u32,
    /// Number of parallel devices in the open structure.
    pub ndevices_open: u32,
    /// Number of parallel devices in the short structure.
    pub ndevices_short: u32,
}

/// A tabular measurement dataset that knows how to correct itself.
///
/// All operations return new data; implementations must not assume the
/// caller discards `self`.
pub trait MeasurementData: Sized {
    /// Open-short de-embedding of S-parameters. Fails with
    /// [`crate::DataError::ShapeMismatch`] if the inputs do not line up.
    fn deembed(&self, open: &Self, short: &Self, ctx: AcContext<'_>) -> DataResult<Self>;

    /// Extract metallization resistances from a short measurement. Fails with
    /// [`crate::DataError::MissingColumn`] if a needed column is absent.
    fn determine_mres(&self, forced_current: bool) -> DataResult<ResistanceRecord>;

    /// Remove series metallization resistances from DC data.
    fn deembed_dc(&self, mres: &ResistanceRecord, forced_current: bool) -> DataResult<Self>;

    /// Names of the available columns, for diagnostics.
    fn columns(&self) -> Vec<String>;
}
