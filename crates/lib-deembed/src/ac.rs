//! AC (open-short S-parameter) de-embedding of one device.

use crate::error::{DeembedError, DeembedResult};
use crate::key_filter::{requires_correction, KeyFilterPair};
use lib_dut::{AcContext, DataError, Device, KeyTemperature, MeasurementData};
use serde::Serialize;
use std::collections::BTreeMap;

/// Multiplier written into the provenance string. Scaling by the ratio of
/// parallel devices is not applied, so this stays 1.
pub const PROVENANCE_MULTIPLIER: u32 = 1;

/// Calibration datasets chosen for one device dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeySelection {
    pub key: String,
    pub open_key: String,
    pub short_key: String,
}

/// Provenance string for a calibration structure.
pub fn provenance(structure: &str) -> String {
    format!("{}x{}", PROVENANCE_MULTIPLIER, structure)
}

/// Key temperatures of an open and a short, parsed once per device.
struct CalibrationTemperatures<'a> {
    open: BTreeMap<&'a str, KeyTemperature>,
    short: BTreeMap<&'a str, KeyTemperature>,
}

impl<'a> CalibrationTemperatures<'a> {
    fn new<D>(open: &'a Device<D>, short: &'a Device<D>) -> Self {
        Self {
            open: open.key_temperatures(),
            short: short.key_temperatures(),
        }
    }
}

/// Pick the calibration key on one side. A single candidate is used as is;
/// among several, the one at the device key's temperature.
fn pick_by_temperature<'k>(
    candidates: &[&'k str],
    temperatures: &BTreeMap<&str, KeyTemperature>,
    temperature: &KeyTemperature,
) -> Option<&'k str> {
    match candidates {
        [only] => Some(*only),
        _ => candidates
            .iter()
            .copied()
            .find(|k| temperatures.get(k).is_some_and(|t| t.same_as(temperature))),
    }
}

/// Calibration keys for one device key, `None` if no pattern claims it.
fn select_ac_keys<D>(
    dut: &Device<D>,
    open: &Device<D>,
    short: &Device<D>,
    key: &str,
    pairs: &[KeyFilterPair],
    temperatures: &CalibrationTemperatures<'_>,
) -> DeembedResult<Option<KeySelection>> {
    if !requires_correction(pairs, key) {
        return Ok(None);
    }

    for pair in pairs.iter().filter(|p| p.matches_measurement(key)) {
        let open_keys = pair.calibration_keys(open.data.keys());
        let short_keys = pair.calibration_keys(short.data.keys());
        if open_keys.is_empty() || short_keys.is_empty() {
            // maybe another pair applies
            continue;
        }

        let (open_key, short_key) = if open_keys.len() == 1 && short_keys.len() == 1 {
            (open_keys[0], short_keys[0])
        } else {
            let temperature = dut
                .get_key_temperature(key)
                .map_err(|e| DeembedError::key_temperature(&dut.name, e))?;
            let open_key = pick_by_temperature(&open_keys, &temperatures.open, &temperature);
            let short_key = pick_by_temperature(&short_keys, &temperatures.short, &temperature);
            match (open_key, short_key) {
                (Some(o), Some(s)) => (o, s),
                _ => {
                    tracing::warn!(
                        "{}: no calibration dataset at {} for {}",
                        dut.name,
                        temperature,
                        key
                    );
                    return Err(DeembedError::no_suitable_key(&dut.name, key));
                }
            }
        };

        return Ok(Some(KeySelection {
            key: key.to_string(),
            open_key: open_key.to_string(),
            short_key: short_key.to_string(),
        }));
    }

    Err(DeembedError::no_suitable_key(&dut.name, key))
}

/// Calibration keys for every dataset of `dut` that needs correction.
pub fn plan_ac_keys<D>(
    dut: &Device<D>,
    open: &Device<D>,
    short: &Device<D>,
    pairs: &[KeyFilterPair],
) -> DeembedResult<Vec<KeySelection>> {
    let temperatures = CalibrationTemperatures::new(open, short);
    let mut selections = Vec::new();
    for key in dut.data.keys() {
        if let Some(selection) = select_ac_keys(dut, open, short, key, pairs, &temperatures)? {
            selections.push(selection);
        }
    }
    Ok(selections)
}

/// Replace every AC dataset of `dut` with its open-short corrected version
/// and record which structures were used.
pub fn deembed_device_ac<D: MeasurementData>(
    dut: &mut Device<D>,
    open: &Device<D>,
    short: &Device<D>,
    pairs: &[KeyFilterPair],
) -> DeembedResult<Vec<KeySelection>> {
    let selections = plan_ac_keys(dut, open, short, pairs)?;

    for sel in &selections {
        let (Some(raw), Some(df_open), Some(df_short)) = (
            dut.data.get(&sel.key),
            open.data.get(&sel.open_key),
            short.data.get(&sel.short_key),
        ) else {
            return Err(DeembedError::no_suitable_key(&dut.name, &sel.key));
        };

        let ctx = AcContext {
            ports: &dut.nodes,
            ndevices: dut.ndevices,
            ndevices_open: open.ndevices,
            ndevices_short: short.ndevices,
        };
        let corrected = raw.deembed(df_open, df_short, ctx).map_err(|source| match source {
            DataError::ShapeMismatch(_) => DeembedError::DataShapeMismatch {
                device: dut.name.clone(),
                key: sel.key.clone(),
                open: open.name.clone(),
                open_key: sel.open_key.clone(),
                short: short.name.clone(),
                short_key: sel.short_key.clone(),
                source,
            },
            other => DeembedError::Data(other),
        })?;

        tracing::debug!(
            "{}: {} corrected with {}/{} and {}/{}",
            dut.name,
            sel.key,
            open.name,
            sel.open_key,
            short.name,
            sel.short_key
        );
        dut.data.insert(sel.key.clone(), corrected);
        dut.set_deembedded_with(provenance(&open.name), provenance(&short.name));
    }

    Ok(selections)
}
