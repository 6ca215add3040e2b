//! DC (series metallization resistance) de-embedding of one device.

use crate::config::DeembedConfig;
use crate::error::{DeembedError, DeembedResult};
use crate::filter::FilterFlags;
use crate::key_filter::KeyFilterPair;
use lib_dut::{DataError, DataResult, Device, Kelvin, MeasurementData, ResistanceRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Resistances from the resolved short structure, or from nothing when the
/// library has no usable short. Applied to every dataset of a device.
pub type ShortOverride<'f, D> = dyn Fn(Option<&Device<D>>) -> DataResult<ResistanceRecord> + 'f;

/// Resistances from one selected short dataset, replacing
/// [`MeasurementData::determine_mres`].
pub type DatasetOverride<'f, D> = dyn Fn(&D) -> DataResult<ResistanceRecord> + 'f;

/// Options of one DC correction run.
pub struct DcOptions<'f, D> {
    pub filters: FilterFlags,
    pub override_dut: Option<&'f ShortOverride<'f, D>>,
    pub override_df: Option<&'f DatasetOverride<'f, D>>,

    /// Names of the shorts to choose from instead of every short in the
    /// library.
    pub shorts: Option<Vec<String>>,

    /// Temperature of the returned resistance record.
    pub t_ref: Kelvin,
    pub forced_current: bool,
}

impl<D> Default for DcOptions<'_, D> {
    fn default() -> Self {
        Self {
            filters: FilterFlags::default(),
            override_dut: None,
            override_df: None,
            shorts: None,
            t_ref: Kelvin::ROOM,
            forced_current: false,
        }
    }
}

impl<'f, D> DcOptions<'f, D> {
    /// Filters, reference temperature and current mode from a library
    /// configuration.
    pub fn from_config(config: &DeembedConfig) -> Self {
        Self {
            filters: config.filters,
            t_ref: Kelvin(config.t_ref),
            forced_current: config.forced_current,
            ..Self::default()
        }
    }

    pub fn with_filters(mut self, filters: FilterFlags) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_override_dut(mut self, f: &'f ShortOverride<'f, D>) -> Self {
        self.override_dut = Some(f);
        self
    }

    pub fn with_override_df(mut self, f: &'f DatasetOverride<'f, D>) -> Self {
        self.override_df = Some(f);
        self
    }

    pub fn with_shorts<S: Into<String>>(mut self, shorts: impl IntoIterator<Item = S>) -> Self {
        self.shorts = Some(shorts.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_t_ref(mut self, t_ref: Kelvin) -> Self {
        self.t_ref = t_ref;
        self
    }

    /// Reject option combinations that cannot work.
    pub fn validate(&self) -> DeembedResult<()> {
        if self.override_dut.is_some() && self.override_df.is_some() {
            return Err(DeembedError::configuration(
                "either a structure override or a dataset override may be given, not both",
            ));
        }
        if !self.t_ref.0.is_finite() || self.t_ref.0 <= 0.0 {
            return Err(DeembedError::configuration(format!(
                "reference temperature must be positive, got {}",
                self.t_ref
            )));
        }
        Ok(())
    }
}

/// Short dataset chosen for one device dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DcKeySelection {
    pub key: String,

    /// `None` when a structure override supplies the resistances.
    pub short_key: Option<String>,

    /// The record used for this dataset is the one the correction returns.
    pub at_reference: bool,
}

/// Short datasets for every dataset of `dut` that needs DC correction.
///
/// With a structure override every dataset is corrected. Otherwise each
/// pattern pair is tried in order; a dataset is corrected at most once.
pub fn plan_dc_keys<D>(
    dut: &Device<D>,
    short: Option<&Device<D>>,
    pairs: &[KeyFilterPair],
    structure_override: bool,
    t_ref: Kelvin,
) -> DeembedResult<Vec<DcKeySelection>> {
    if structure_override {
        return Ok(dut
            .data
            .keys()
            .map(|key| DcKeySelection {
                key: key.clone(),
                short_key: None,
                at_reference: true,
            })
            .collect());
    }

    let short = short.ok_or_else(|| {
        DeembedError::configuration(format!("no short structure for device '{}'", dut.name))
    })?;

    let short_temperatures = short.key_temperatures();
    let mut seen = BTreeSet::new();
    let mut selections = Vec::new();
    for pair in pairs {
        let short_keys = pair.calibration_keys(short.data.keys());

        for key in dut.data.keys() {
            if !pair.matches_measurement(key) || seen.contains(key) {
                continue;
            }

            let selection = match short_keys.as_slice() {
                [] => {
                    tracing::warn!(
                        "{}: no dataset of short {} matches '{}'",
                        dut.name,
                        short.name,
                        pair.calibration_pattern()
                    );
                    return Err(DeembedError::no_suitable_key(&dut.name, key));
                }
                // one short measurement serves every temperature
                [only] => DcKeySelection {
                    key: key.clone(),
                    short_key: Some(only.to_string()),
                    at_reference: true,
                },
                _ => {
                    let temperature = dut
                        .get_key_temperature(key)
                        .map_err(|e| DeembedError::key_temperature(&dut.name, e))?;
                    let short_key = short_keys
                        .iter()
                        .find(|k| {
                            short_temperatures
                                .get(*k)
                                .is_some_and(|t| t.is_close(&temperature))
                        })
                        .ok_or_else(|| DeembedError::no_suitable_key(&dut.name, key))?;
                    DcKeySelection {
                        key: key.clone(),
                        short_key: Some(short_key.to_string()),
                        at_reference: temperature.is_close_to(t_ref),
                    }
                }
            };
            seen.insert(key.clone());
            selections.push(selection);
        }
    }
    Ok(selections)
}

fn determine_mres<D: MeasurementData>(
    short: &Device<D>,
    short_key: &str,
    options: &DcOptions<'_, D>,
) -> DeembedResult<ResistanceRecord> {
    let df_short = short
        .data
        .get(short_key)
        .ok_or_else(|| DeembedError::no_suitable_key(&short.name, short_key))?;

    let mres = match options.override_df {
        Some(f) => f(df_short),
        None => df_short.determine_mres(options.forced_current),
    };
    mres.map_err(|source| match source {
        DataError::MissingColumn { .. } => DeembedError::MissingColumn {
            short: short.name.clone(),
            key: short_key.to_string(),
            available: df_short.columns(),
            source,
        },
        other => DeembedError::Data(other),
    })
}

fn apply<D: MeasurementData>(
    dut: &mut Device<D>,
    key: &str,
    mres: &ResistanceRecord,
    forced_current: bool,
) -> DeembedResult<()> {
    let Some(raw) = dut.data.get(key) else {
        return Err(DeembedError::no_suitable_key(&dut.name, key));
    };
    let corrected = raw.deembed_dc(mres, forced_current)?;
    dut.data.insert(key.to_string(), corrected);
    Ok(())
}

/// Subtract the metallization resistances of `short` from the DC datasets
/// of `dut`.
///
/// Returns the resistance record at the reference temperature, or `None`
/// if no corrected dataset was measured there.
pub fn deembed_device_dc<D: MeasurementData>(
    dut: &mut Device<D>,
    short: Option<&Device<D>>,
    pairs: &[KeyFilterPair],
    options: &DcOptions<'_, D>,
) -> DeembedResult<Option<ResistanceRecord>> {
    if let Some(override_dut) = options.override_dut {
        let mres = override_dut(short)?;
        for key in dut.data_keys() {
            apply(dut, &key, &mres, options.forced_current)?;
        }
        tracing::debug!("{}: all datasets corrected with {:?}", dut.name, mres);
        return Ok(Some(mres));
    }

    let selections = plan_dc_keys(dut, short, pairs, false, options.t_ref)?;
    let Some(short) = short else {
        return Ok(None);
    };

    let mut cache: BTreeMap<&str, ResistanceRecord> = BTreeMap::new();
    let mut mres_tref = None;
    for sel in &selections {
        let Some(short_key) = sel.short_key.as_deref() else {
            continue;
        };
        let mres = match cache.get(short_key) {
            Some(mres) => *mres,
            None => {
                let mres = determine_mres(short, short_key, options)?;
                cache.insert(short_key, mres);
                mres
            }
        };

        apply(dut, &sel.key, &mres, options.forced_current)?;
        tracing::debug!("{}: {} corrected with {}/{}", dut.name, sel.key, short.name, short_key);
        if sel.at_reference {
            mres_tref = Some(mres);
        }
    }

    Ok(mres_tref)
}
