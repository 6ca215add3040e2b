//! Correction state of a library.
//!
//! Each correction runs at most once per library and cannot be undone.
//! Once either has run, the set of devices is frozen.

use crate::error::{DeembedError, DeembedResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two corrections a library can receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correction {
    Ac,
    Dc,
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ac => f.write_str("AC"),
            Self::Dc => f.write_str("DC"),
        }
    }
}

/// Library correction state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryState {
    /// No correction applied, devices may still be added.
    #[default]
    Fresh,
    AcDone,
    DcDone,
    AcAndDcDone,
}

impl LibraryState {
    /// Rebuild the state from the two historical flags.
    pub fn from_flags(ac: bool, dc: bool) -> Self {
        match (ac, dc) {
            (false, false) => Self::Fresh,
            (true, false) => Self::AcDone,
            (false, true) => Self::DcDone,
            (true, true) => Self::AcAndDcDone,
        }
    }

    pub fn is_done(self, correction: Correction) -> bool {
        match correction {
            Correction::Ac => matches!(self, Self::AcDone | Self::AcAndDcDone),
            Correction::Dc => matches!(self, Self::DcDone | Self::AcAndDcDone),
        }
    }

    /// Fails with `AlreadyDeembedded` if `correction` already ran.
    pub fn ensure_pending(self, correction: Correction) -> DeembedResult<()> {
        if self.is_done(correction) {
            return Err(DeembedError::AlreadyDeembedded(correction));
        }
        Ok(())
    }

    /// Guarded transition after `correction` completed.
    pub fn complete(self, correction: Correction) -> DeembedResult<Self> {
        self.ensure_pending(correction)?;
        Ok(match (self, correction) {
            (Self::Fresh, Correction::Ac) => Self::AcDone,
            (Self::Fresh, Correction::Dc) => Self::DcDone,
            _ => Self::AcAndDcDone,
        })
    }

    /// Devices can only be added before any correction.
    pub fn accepts_devices(self) -> bool {
        self == Self::Fresh
    }
}
