//! Calibration-structure resolution.
//!
//! For every device that needs correction the resolver picks the open and
//! short (AC) or the short (DC) structure measured for it. Devices are
//! addressed by their index in the library's device list.

use crate::error::{CalibrationKind, DeembedError, DeembedResult};
use crate::filter::{AttributeComparator, FilterFlags};
use lib_dut::{Device, DutType};

/// User-supplied AC pairing: given a device, return the names of the open
/// and the short structure to use.
pub type AcOverride<'f, D> = dyn Fn(&Device<D>) -> Vec<String> + 'f;

/// Resolved AC calibration pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcPair {
    pub open: usize,
    pub short: usize,
}

/// Resolves calibration structures among a list of devices.
pub struct CalibrationResolver<'a, D> {
    duts: &'a [Device<D>],
    ignore: &'a [String],
}

impl<'a, D> CalibrationResolver<'a, D> {
    pub fn new(duts: &'a [Device<D>], ignore: &'a [String]) -> Self {
        Self { duts, ignore }
    }

    fn device(&self, index: usize) -> DeembedResult<&'a Device<D>> {
        self.duts
            .get(index)
            .ok_or_else(|| DeembedError::UnknownDevice(format!("#{}", index)))
    }

    fn names(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|&i| self.duts.get(i))
            .map(|d| d.name.clone())
            .collect()
    }

    fn is_ignored(&self, device: &Device<D>) -> bool {
        self.ignore.iter().any(|n| *n == device.name)
    }

    /// Devices whose type is a subtype of any of `types`, in insertion order,
    /// skipping ignored devices.
    pub fn find_devices(&self, types: &[DutType]) -> Vec<usize> {
        self.duts
            .iter()
            .enumerate()
            .filter(|(_, d)| !self.is_ignored(d))
            .filter(|(_, d)| types.iter().any(|ty| d.dut_type.is_subtype(*ty)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of a non-ignored device by name.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.duts
            .iter()
            .position(|d| d.name == name && !self.is_ignored(d))
    }

    /// Pick the open and short structure for `device`.
    ///
    /// An override takes precedence; otherwise a library with exactly one
    /// open and one short uses them for everything; otherwise the enabled
    /// filters must narrow the candidates down to one of each.
    pub fn resolve_ac(
        &self,
        device: usize,
        opens: &[usize],
        shorts: &[usize],
        filters: FilterFlags,
        override_fn: Option<&AcOverride<'_, D>>,
    ) -> DeembedResult<AcPair> {
        let dev = self.device(device)?;

        if let Some(user_fn) = override_fn {
            let mut picked_opens = Vec::new();
            let mut picked_shorts = Vec::new();
            for name in user_fn(dev) {
                let index = opens
                    .iter()
                    .chain(shorts)
                    .copied()
                    .find(|&i| self.duts.get(i).is_some_and(|d| d.name == name))
                    .ok_or_else(|| DeembedError::UnknownDevice(name.clone()))?;
                if self.device(index)?.is_open() {
                    picked_opens.push(index);
                } else {
                    picked_shorts.push(index);
                }
            }
            // the override is taken literally: no same-die narrowing
            return self.single_pair(dev, picked_opens, picked_shorts, opens, shorts);
        }

        if opens.len() == 1 && shorts.len() == 1 {
            return Ok(AcPair {
                open: opens[0],
                short: shorts[0],
            });
        }

        let comparator = filters.comparator().ok_or_else(|| {
            DeembedError::configuration(
                "no width, length or name filter selected, and no override given; \
                 calibration structures cannot be assigned",
            )
        })?;
        let mut matched_opens = Vec::new();
        let mut matched_shorts = Vec::new();
        for &candidate in opens.iter().chain(shorts) {
            let cand = self.device(candidate)?;
            if !comparator.filter(dev, cand)? {
                continue;
            }
            if cand.is_open() {
                matched_opens.push(candidate);
            } else {
                matched_shorts.push(candidate);
            }
        }

        let matched_opens = self.prefer_same_die(dev, matched_opens);
        let matched_shorts = self.prefer_same_die(dev, matched_shorts);
        self.single_pair(dev, matched_opens, matched_shorts, opens, shorts)
    }

    /// Exactly one open and one short must remain.
    fn single_pair(
        &self,
        dev: &Device<D>,
        suitable_opens: Vec<usize>,
        suitable_shorts: Vec<usize>,
        opens: &[usize],
        shorts: &[usize],
    ) -> DeembedResult<AcPair> {
        if suitable_opens.len() > 1 || suitable_shorts.len() > 1 {
            let mut all = suitable_opens;
            all.extend(&suitable_shorts);
            return Err(DeembedError::AmbiguousCalibration {
                device: dev.name.clone(),
                matches: self.names(&all),
            });
        }

        match (suitable_opens.first(), suitable_shorts.first()) {
            (None, _) => Err(DeembedError::missing(
                &dev.name,
                CalibrationKind::Open,
                dev.deemb_name(),
                self.names(opens),
            )),
            (_, None) => Err(DeembedError::missing(
                &dev.name,
                CalibrationKind::Short,
                dev.deemb_name(),
                self.names(shorts),
            )),
            (Some(&open), Some(&short)) => {
                tracing::debug!(
                    "{}: open {}, short {}",
                    dev.name,
                    self.duts[open].name,
                    self.duts[short].name
                );
                Ok(AcPair { open, short })
            }
        }
    }

    /// Pick the short structure for `device`.
    ///
    /// Returns `None` only when `global_override` is set and no single short
    /// can be chosen (no shorts at all, or several shorts and no filters):
    /// the override then supplies resistances on its own.
    pub fn resolve_dc(
        &self,
        device: usize,
        shorts: &[usize],
        filters: FilterFlags,
        global_override: bool,
    ) -> DeembedResult<Option<usize>> {
        let dev = self.device(device)?;

        match shorts {
            [] if global_override => return Ok(None),
            [] => {
                return Err(DeembedError::missing(
                    &dev.name,
                    CalibrationKind::Short,
                    dev.deemb_name(),
                    Vec::new(),
                ))
            }
            [only] => return Ok(Some(*only)),
            _ => {}
        }

        let comparator: AttributeComparator = match filters.comparator() {
            Some(c) => c,
            None if global_override => return Ok(None),
            None => {
                return Err(DeembedError::configuration(
                    "no width, length or name filter selected; \
                     short structures cannot be assigned",
                ))
            }
        };

        let mut matched = Vec::new();
        for &candidate in shorts {
            if comparator.filter(dev, self.device(candidate)?)? {
                matched.push(candidate);
            }
        }
        let matched = self.prefer_same_die(dev, matched);

        match matched.as_slice() {
            [] => Err(DeembedError::missing(
                &dev.name,
                CalibrationKind::Short,
                dev.deemb_name(),
                self.names(shorts),
            )),
            [short] => {
                tracing::debug!("{}: short {}", dev.name, self.duts[*short].name);
                Ok(Some(*short))
            }
            _ => Err(DeembedError::AmbiguousCalibration {
                device: dev.name.clone(),
                matches: self.names(&matched),
            }),
        }
    }

    /// With several candidates, the first one on the device's own die wins.
    fn prefer_same_die(&self, dev: &Device<D>, candidates: Vec<usize>) -> Vec<usize> {
        if candidates.len() < 2 {
            return candidates;
        }
        let Some(die) = dev.die.as_deref() else {
            return candidates;
        };
        match candidates
            .iter()
            .find(|&&i| self.duts.get(i).and_then(|d| d.die.as_deref()) == Some(die))
        {
            Some(&same_die) => vec![same_die],
            None => candidates,
        }
    }
}
