//! Attribute comparison between a device and a calibration candidate.

use crate::error::{DeembedError, DeembedResult};
use lib_dut::{Device, Meters};
use serde::{Deserialize, Serialize};

/// Compares one attribute of a device with the same attribute of a
/// calibration structure.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeComparator {
    /// Drawn length, within rtol/atol 1e-8.
    ByLength,
    /// Drawn width, within rtol/atol 1e-8.
    ByWidth,
    /// `deemb_name`, exact string equality.
    ByName,
    /// Every sub-comparator must pass.
    CompositeAnd(Vec<AttributeComparator>),
}

impl AttributeComparator {
    /// Name and length together, the most common pairing in practice.
    pub fn length_and_name() -> Self {
        Self::CompositeAnd(vec![Self::ByName, Self::ByLength])
    }

    /// True if `candidate` matches `device` on the compared attribute(s).
    pub fn filter<D>(&self, device: &Device<D>, candidate: &Device<D>) -> DeembedResult<bool> {
        match self {
            Self::ByLength => geometry_matches("length", device, candidate, |d| d.length),
            Self::ByWidth => geometry_matches("width", device, candidate, |d| d.width),
            Self::ByName => Ok(device.deemb_name() == candidate.deemb_name()),
            Self::CompositeAnd(filters) => {
                for f in filters {
                    if !f.filter(device, candidate)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

fn geometry_matches<D>(
    attribute: &str,
    device: &Device<D>,
    candidate: &Device<D>,
    get: impl Fn(&Device<D>) -> Option<Meters>,
) -> DeembedResult<bool> {
    let missing = |name: &str| {
        DeembedError::configuration(format!(
            "the property '{}' does not exist on device '{}'",
            attribute, name
        ))
    };
    let dev = get(device).ok_or_else(|| missing(&device.name))?;
    let cand = get(candidate).ok_or_else(|| missing(&candidate.name))?;
    Ok(dev.matches(cand))
}

/// Which attribute filters are switched on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterFlags {
    #[serde(default)]
    pub width: bool,
    #[serde(default)]
    pub length: bool,
    #[serde(default)]
    pub name: bool,
}

impl FilterFlags {
    pub fn new(width: bool, length: bool, name: bool) -> Self {
        Self {
            width,
            length,
            name,
        }
    }

    /// At least one filter enabled.
    pub fn any(&self) -> bool {
        self.width || self.length || self.name
    }

    /// Composite comparator of the enabled filters, `None` if none is on.
    pub fn comparator(&self) -> Option<AttributeComparator> {
        let mut filters = Vec::new();
        if self.name {
            filters.push(AttributeComparator::ByName);
        }
        if self.width {
            filters.push(AttributeComparator::ByWidth);
        }
        if self.length {
            filters.push(AttributeComparator::ByLength);
        }
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(AttributeComparator::CompositeAnd(filters)),
        }
    }
}
