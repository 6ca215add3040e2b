//! Device library with one-shot AC and DC correction.
//!
//! Calibration structures are assigned to every device before the first one
//! is touched, so assignment errors leave the library unchanged. Devices are
//! then corrected one after another in insertion order. The first data
//! failure aborts the batch: devices before it stay corrected, devices after
//! it stay raw, and the correction is not marked as done.

use crate::ac::{deembed_device_ac, plan_ac_keys, KeySelection};
use crate::config::DeembedConfig;
use crate::dc::{deembed_device_dc, plan_dc_keys, DcKeySelection, DcOptions};
use crate::error::{CalibrationKind, DeembedError, DeembedResult};
use crate::filter::FilterFlags;
use crate::key_filter::KeyFilterPair;
use crate::progress::{LogProgress, ProgressObserver};
use crate::resolver::{AcOverride, CalibrationResolver};
use crate::state::{Correction, LibraryState};
use lib_dut::{Device, DutType, MeasurementData, ResistanceRecord};
use serde::Serialize;
use std::cmp::Ordering;

/// Devices other than the one being corrected.
struct Others<'a, D> {
    before: &'a [Device<D>],
    after: &'a [Device<D>],
    target: usize,
}

impl<'a, D> Others<'a, D> {
    fn get(&self, index: usize) -> DeembedResult<&'a Device<D>> {
        let found = match index.cmp(&self.target) {
            Ordering::Less => self.before.get(index),
            Ordering::Greater => self.after.get(index - self.target - 1),
            Ordering::Equal => {
                return Err(DeembedError::configuration(format!(
                    "device #{} cannot serve as its own calibration structure",
                    index
                )))
            }
        };
        found.ok_or_else(|| DeembedError::UnknownDevice(format!("#{}", index)))
    }
}

/// Mutable access to device `target` next to shared access to the rest.
fn split_target<D>(duts: &mut [Device<D>], target: usize) -> Option<(&mut Device<D>, Others<'_, D>)> {
    if target >= duts.len() {
        return None;
    }
    let (before, rest) = duts.split_at_mut(target);
    let (dut, after) = rest.split_first_mut()?;
    Some((
        dut,
        Others {
            before: &*before,
            after: &*after,
            target,
        },
    ))
}

/// Calibration assignment of one device for AC correction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AcPlanEntry {
    pub device: String,
    pub open: String,
    pub short: String,
    pub keys: Vec<KeySelection>,
}

/// Calibration assignment of one device for DC correction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DcPlanEntry {
    pub device: String,

    /// `None` when a structure override supplies the resistances on its own.
    pub short: Option<String>,
    pub keys: Vec<DcKeySelection>,
}

/// Collection of devices and calibration structures.
pub struct DutLib<D> {
    duts: Vec<Device<D>>,
    config: DeembedConfig,
    ac_filters: Vec<KeyFilterPair>,
    dc_filters: Vec<KeyFilterPair>,
    state: LibraryState,
    dut_ref: Option<String>,
    progress: Box<dyn ProgressObserver>,

    pub wafer: Option<String>,
    pub date_tapeout: Option<String>,
    pub date_received: Option<String>,
}

impl<D> DutLib<D> {
    /// Create an empty library. Key patterns are compiled here.
    pub fn new(config: DeembedConfig) -> DeembedResult<Self> {
        let ac_filters = KeyFilterPair::compile_all(&config.ac_filter_names)?;
        let dc_filters = KeyFilterPair::compile_all(&config.dc_filter_names)?;
        Ok(Self {
            duts: Vec::new(),
            config,
            ac_filters,
            dc_filters,
            state: LibraryState::default(),
            dut_ref: None,
            progress: Box::new(LogProgress),
            wafer: None,
            date_tapeout: None,
            date_received: None,
        })
    }

    /// Replace the progress observer.
    pub fn with_progress(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.progress = Box::new(observer);
        self
    }

    pub fn config(&self) -> &DeembedConfig {
        &self.config
    }

    pub fn state(&self) -> LibraryState {
        self.state
    }

    pub fn is_deembedded_ac(&self) -> bool {
        self.state.is_done(Correction::Ac)
    }

    pub fn is_deembedded_dc(&self) -> bool {
        self.state.is_done(Correction::Dc)
    }

    /// Add one device. Names must be unique and the library must not be
    /// corrected yet.
    pub fn add_dut(&mut self, dut: Device<D>) -> DeembedResult<()> {
        if !self.state.accepts_devices() {
            return Err(DeembedError::Locked);
        }
        if self.duts.iter().any(|d| d.name == dut.name) {
            return Err(DeembedError::DuplicateDevice(dut.name));
        }
        tracing::debug!("Adding device {} ({})", dut.name, dut.dut_type);
        self.duts.push(dut);
        Ok(())
    }

    /// Add several devices, stopping at the first rejected one.
    pub fn add_duts(&mut self, duts: impl IntoIterator<Item = Device<D>>) -> DeembedResult<()> {
        for dut in duts {
            self.add_dut(dut)?;
        }
        Ok(())
    }

    /// Hide a device from iteration, lookup and correction.
    pub fn ignore(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.config.ignore_duts.contains(&name) {
            self.config.ignore_duts.push(name);
        }
    }

    fn resolver(&self) -> CalibrationResolver<'_, D> {
        CalibrationResolver::new(&self.duts, &self.config.ignore_duts)
    }

    /// Devices whose type is a subtype of any of `types`, in insertion order.
    pub fn find_devices(&self, types: &[DutType]) -> Vec<&Device<D>> {
        self.resolver()
            .find_devices(types)
            .into_iter()
            .map(|i| &self.duts[i])
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Device<D>> {
        self.resolver().find_by_name(name).map(|i| &self.duts[i])
    }

    /// Visible devices in insertion order.
    pub fn iter(&self) -> Iter<'_, D> {
        Iter {
            inner: self.duts.iter(),
            ignore: &self.config.ignore_duts,
        }
    }

    /// Designate the device whose resistance record DC correction returns.
    pub fn set_dut_ref(&mut self, name: &str) -> DeembedResult<()> {
        if self.get(name).is_none() {
            return Err(DeembedError::UnknownDevice(name.to_string()));
        }
        self.dut_ref = Some(name.to_string());
        Ok(())
    }

    pub fn dut_ref(&self) -> DeembedResult<&Device<D>> {
        let name = self
            .dut_ref
            .as_deref()
            .ok_or_else(|| DeembedError::UnknownDevice("<reference device not set>".to_string()))?;
        self.get(name)
            .ok_or_else(|| DeembedError::UnknownDevice(name.to_string()))
    }

    /// Devices to correct plus all opens and shorts, or `None` if no device
    /// needs AC correction.
    fn ac_candidates(&self) -> DeembedResult<Option<(Vec<usize>, Vec<usize>, Vec<usize>)>> {
        self.state.ensure_pending(Correction::Ac)?;
        let resolver = self.resolver();
        let devices = resolver.find_devices(&self.config.deem_types);
        let Some(&first) = devices.first() else {
            tracing::warn!("No devices in library require AC de-embedding");
            return Ok(None);
        };

        let opens = resolver.find_devices(&[DutType::FLAG_OPEN]);
        let shorts = resolver.find_devices(&[DutType::FLAG_SHORT]);
        let dev = &self.duts[first];
        if opens.is_empty() {
            return Err(DeembedError::missing(&dev.name, CalibrationKind::Open, dev.deemb_name(), Vec::new()));
        }
        if shorts.is_empty() {
            return Err(DeembedError::missing(&dev.name, CalibrationKind::Short, dev.deemb_name(), Vec::new()));
        }
        Ok(Some((devices, opens, shorts)))
    }

    /// Devices to correct plus the short candidates, or `None` if no device
    /// needs DC correction.
    fn dc_candidates(&self, options: &DcOptions<'_, D>) -> DeembedResult<Option<(Vec<usize>, Vec<usize>)>> {
        self.state.ensure_pending(Correction::Dc)?;
        options.validate()?;
        let resolver = self.resolver();
        let devices = resolver.find_devices(&self.config.deem_types);
        let Some(&first) = devices.first() else {
            tracing::warn!("No devices in library require DC de-embedding");
            return Ok(None);
        };

        let shorts = match &options.shorts {
            Some(names) => names
                .iter()
                .map(|n| {
                    resolver
                        .find_by_name(n)
                        .ok_or_else(|| DeembedError::UnknownDevice(n.clone()))
                })
                .collect::<DeembedResult<Vec<_>>>()?,
            None => resolver.find_devices(&[DutType::FLAG_SHORT]),
        };
        if shorts.is_empty() && options.override_dut.is_none() {
            let dev = &self.duts[first];
            return Err(DeembedError::missing(&dev.name, CalibrationKind::Short, dev.deemb_name(), Vec::new()));
        }
        Ok(Some((devices, shorts)))
    }

    /// Resolved open and short plus the selected keys of every device that
    /// needs AC correction. Nothing is modified.
    pub fn plan_ac(
        &self,
        filters: FilterFlags,
        override_fn: Option<&AcOverride<'_, D>>,
    ) -> DeembedResult<Vec<AcPlanEntry>> {
        let Some((devices, opens, shorts)) = self.ac_candidates()? else {
            return Ok(Vec::new());
        };
        let resolver = self.resolver();

        let mut plan = Vec::with_capacity(devices.len());
        for index in devices {
            let pair = resolver.resolve_ac(index, &opens, &shorts, filters, override_fn)?;
            let (dut, open, short) = (&self.duts[index], &self.duts[pair.open], &self.duts[pair.short]);
            plan.push(AcPlanEntry {
                device: dut.name.clone(),
                open: open.name.clone(),
                short: short.name.clone(),
                keys: plan_ac_keys(dut, open, short, &self.ac_filters)?,
            });
        }
        Ok(plan)
    }

    /// Resolved short plus the selected keys of every device that needs DC
    /// correction. Nothing is modified.
    pub fn plan_dc(&self, options: &DcOptions<'_, D>) -> DeembedResult<Vec<DcPlanEntry>> {
        let Some((devices, shorts)) = self.dc_candidates(options)? else {
            return Ok(Vec::new());
        };
        let resolver = self.resolver();
        let structure_override = options.override_dut.is_some();

        let mut plan = Vec::with_capacity(devices.len());
        for index in devices {
            let dut = &self.duts[index];
            let short = resolver
                .resolve_dc(index, &shorts, options.filters, structure_override)?
                .map(|i| &self.duts[i]);
            plan.push(DcPlanEntry {
                device: dut.name.clone(),
                short: short.map(|s| s.name.clone()),
                keys: plan_dc_keys(dut, short, &self.dc_filters, structure_override, options.t_ref)?,
            });
        }
        Ok(plan)
    }
}

impl<D: MeasurementData> DutLib<D> {
    /// Open-short correct the AC datasets of every device of a de-embedding
    /// type.
    ///
    /// With exactly one open and one short in the library these are used for
    /// every device. Otherwise `filters` (or `override_fn`, which returns the
    /// names of the open and the short to use) must single out one of each.
    pub fn deembed_ac(
        &mut self,
        filters: FilterFlags,
        override_fn: Option<&AcOverride<'_, D>>,
    ) -> DeembedResult<()> {
        let Some((devices, opens, shorts)) = self.ac_candidates()? else {
            return Ok(());
        };
        // every assignment is settled before the first device is touched
        let resolver = self.resolver();
        let assignments = devices
            .iter()
            .map(|&index| {
                resolver
                    .resolve_ac(index, &opens, &shorts, filters, override_fn)
                    .map(|pair| (index, pair))
            })
            .collect::<DeembedResult<Vec<_>>>()?;

        let total = assignments.len();
        self.progress.started(Correction::Ac, total);

        for (n, (index, pair)) in assignments.into_iter().enumerate() {
            let (dut, others) = split_target(&mut self.duts, index)
                .ok_or_else(|| DeembedError::UnknownDevice(format!("#{}", index)))?;
            let open = others.get(pair.open)?;
            let short = others.get(pair.short)?;
            deembed_device_ac(dut, open, short, &self.ac_filters)?;

            self.progress.device_done(Correction::Ac, n, total, &dut.name);
        }

        self.state = self.state.complete(Correction::Ac)?;
        self.progress.finished(Correction::Ac, total);
        Ok(())
    }

    /// Subtract metallization resistances from the DC datasets of every
    /// device of a de-embedding type.
    ///
    /// Returns the resistance record at `options.t_ref` of the reference
    /// device if one is set and was corrected, otherwise of the last device
    /// that had one. Returns `None` if no device needed correction.
    pub fn deembed_dc(&mut self, options: &DcOptions<'_, D>) -> DeembedResult<Option<ResistanceRecord>> {
        let Some((devices, shorts)) = self.dc_candidates(options)? else {
            return Ok(None);
        };
        let structure_override = options.override_dut.is_some();
        let resolver = self.resolver();
        let assignments = devices
            .iter()
            .map(|&index| {
                resolver
                    .resolve_dc(index, &shorts, options.filters, structure_override)
                    .map(|short| (index, short))
            })
            .collect::<DeembedResult<Vec<_>>>()?;

        let total = assignments.len();
        self.progress.started(Correction::Dc, total);

        let mut ref_record = None;
        let mut last_record = None;
        for (n, (index, short_index)) in assignments.into_iter().enumerate() {
            let (dut, others) = split_target(&mut self.duts, index)
                .ok_or_else(|| DeembedError::UnknownDevice(format!("#{}", index)))?;
            let short = short_index.map(|i| others.get(i)).transpose()?;
            let mres = deembed_device_dc(dut, short, &self.dc_filters, options)?;

            if mres.is_some() {
                if self.dut_ref.as_deref() == Some(dut.name.as_str()) {
                    ref_record = mres;
                }
                last_record = mres;
            }
            self.progress.device_done(Correction::Dc, n, total, &dut.name);
        }

        self.state = self.state.complete(Correction::Dc)?;
        self.progress.finished(Correction::Dc, total);
        Ok(ref_record.or(last_record))
    }
}

/// Iterator over the visible devices of a library.
pub struct Iter<'a, D> {
    inner: std::slice::Iter<'a, Device<D>>,
    ignore: &'a [String],
}

impl<'a, D> Iterator for Iter<'a, D> {
    type Item = &'a Device<D>;

    fn next(&mut self) -> Option<Self::Item> {
        let ignore = self.ignore;
        self.inner.find(|d| !ignore.contains(&d.name))
    }
}

impl<'a, D> IntoIterator for &'a DutLib<D> {
    type Item = &'a Device<D>;
    type IntoIter = Iter<'a, D>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::testing::Frame;
    use lib_dut::Meters;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn config() -> DeembedConfig {
        DeembedConfig::default()
            .with_ac_filter("freq_vbc", "ac")
            .with_dc_filter("gummel", "dc")
    }

    fn single_pair_lib() -> DutLib<Frame> {
        let mut lib = DutLib::new(config()).unwrap();
        lib.add_duts([
            Device::new("D1", DutType::NPN).with_data("freq_vbc", Frame::sparam(&[1.0, 2.0])),
            Device::new("O1", DutType::DEEM_OPEN_BJT).with_data("ac", Frame::sparam(&[0.1, 0.2])),
            Device::new("S1", DutType::DEEM_SHORT_BJT).with_data("ac", Frame::sparam(&[0.01, 0.02])),
        ])
        .unwrap();
        lib
    }

    fn two_pair_lib() -> DutLib<Frame> {
        let mut lib = DutLib::new(config()).unwrap();
        lib.add_duts([
            Device::new("D1", DutType::NPN)
                .with_contact_config("A")
                .with_deemb_name("A")
                .with_width(Meters::from_um(0.5))
                .with_data("T300K/freq_vbc", Frame::sparam(&[1.0]))
                .with_data("T300K/fgummel", Frame::gummel(1.0, 0.001)),
            Device::new("D2", DutType::NPN)
                .with_contact_config("B")
                .with_deemb_name("B")
                .with_width(Meters::from_um(0.5))
                .with_data("T300K/freq_vbc", Frame::sparam(&[1.0]))
                .with_data("T300K/fgummel", Frame::gummel(1.0, 0.001)),
            Device::new("O_A", DutType::DEEM_OPEN_BJT)
                .with_deemb_name("A")
                .with_width(Meters::from_um(0.5))
                .with_data("T300K/ac", Frame::sparam(&[0.1])),
            Device::new("O_B", DutType::DEEM_OPEN_BJT)
                .with_deemb_name("B")
                .with_width(Meters::from_um(0.5))
                .with_data("T300K/ac", Frame::sparam(&[0.2])),
            Device::new("S_A", DutType::DEEM_SHORT_BJT)
                .with_deemb_name("A")
                .with_width(Meters::from_um(0.5))
                .with_data("T300K/ac", Frame::sparam(&[0.01]))
                .with_data("T300K/dc", Frame::short_dc(ResistanceRecord::new(1.0, 5.0, 2.0))),
            Device::new("S_B", DutType::DEEM_SHORT_BJT)
                .with_deemb_name("B")
                .with_width(Meters::from_um(0.5))
                .with_data("T300K/ac", Frame::sparam(&[0.02]))
                .with_data("T300K/dc", Frame::short_dc(ResistanceRecord::new(2.0, 50.0, 4.0))),
        ])
        .unwrap();
        lib
    }

    fn s11(lib: &DutLib<Frame>, device: &str, key: &str) -> Vec<f64> {
        lib.get(device).unwrap().data[key].column("S11").unwrap().to_vec()
    }

    fn v_b(lib: &DutLib<Frame>, device: &str, key: &str) -> f64 {
        lib.get(device).unwrap().data[key].column("V_B").unwrap()[0]
    }

    #[test]
    fn test_single_pair_scenario() {
        let mut lib = single_pair_lib();
        lib.deembed_ac(FilterFlags::default(), None).unwrap();
        assert!(lib.is_deembedded_ac());
        assert_eq!(lib.state(), LibraryState::AcDone);

        let d1 = lib.get("D1").unwrap();
        assert_eq!(d1.open_deembedded_with(), Some("1xO1"));
        assert_eq!(d1.short_deembedded_with(), Some("1xS1"));
        let s = s11(&lib, "D1", "freq_vbc");
        assert!((s[0] - (1.0 - 0.1 - 0.01)).abs() < 1e-12);
        assert!((s[1] - (2.0 - 0.2 - 0.02)).abs() < 1e-12);

        // a repeat call fails and leaves the data alone
        let err = lib.deembed_ac(FilterFlags::default(), None).unwrap_err();
        assert!(matches!(err, DeembedError::AlreadyDeembedded(Correction::Ac)));
        assert_eq!(s11(&lib, "D1", "freq_vbc"), s);
    }

    #[test]
    fn test_add_after_correction_is_locked() {
        let mut lib = single_pair_lib();
        lib.deembed_ac(FilterFlags::default(), None).unwrap();
        let err = lib.add_dut(Device::new("D9", DutType::NPN)).unwrap_err();
        assert!(matches!(err, DeembedError::Locked));
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let mut lib = single_pair_lib();
        let err = lib.add_dut(Device::new("O1", DutType::DEEM_OPEN_BJT)).unwrap_err();
        assert!(matches!(err, DeembedError::DuplicateDevice(name) if name == "O1"));
    }

    #[test]
    fn test_no_filters_with_two_pairs_fails_before_mutation() {
        let mut lib = two_pair_lib();
        let err = lib.deembed_ac(FilterFlags::default(), None).unwrap_err();
        assert!(err.is_configuration());
        assert!(!lib.is_deembedded_ac());
        assert_eq!(s11(&lib, "D1", "T300K/freq_vbc"), vec![1.0]);

        let err = lib.deembed_dc(&DcOptions::default()).unwrap_err();
        assert!(err.is_configuration());
        assert!((v_b(&lib, "D1", "T300K/fgummel") - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_name_filter_pairs_exclusively() {
        let mut lib = two_pair_lib();
        let by_name = FilterFlags::new(false, false, true);

        let plan = lib.plan_ac(by_name, None).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!((plan[0].open.as_str(), plan[0].short.as_str()), ("O_A", "S_A"));
        assert_eq!((plan[1].open.as_str(), plan[1].short.as_str()), ("O_B", "S_B"));

        lib.deembed_ac(by_name, None).unwrap();
        assert_eq!(lib.get("D2").unwrap().open_deembedded_with(), Some("1xO_B"));
        assert!((s11(&lib, "D2", "T300K/freq_vbc")[0] - (1.0 - 0.2 - 0.02)).abs() < 1e-12);

        let options = DcOptions::default().with_filters(by_name);
        let dc_plan = lib.plan_dc(&options).unwrap();
        assert_eq!(dc_plan[0].short.as_deref(), Some("S_A"));
        assert_eq!(dc_plan[1].short.as_deref(), Some("S_B"));

        let mres = lib.deembed_dc(&options).unwrap();
        assert!(lib.is_deembedded_dc());
        assert_eq!(lib.state(), LibraryState::AcAndDcDone);
        // last device wins without a reference device
        assert_eq!(mres, Some(ResistanceRecord::new(2.0, 50.0, 4.0)));
        assert!((v_b(&lib, "D1", "T300K/fgummel") - (1.0 - 0.001 * 5.0)).abs() < 1e-12);
        assert!((v_b(&lib, "D2", "T300K/fgummel") - (1.0 - 0.001 * 50.0)).abs() < 1e-12);
    }

    #[test]
    fn test_reference_device_record_returned() {
        let mut lib = two_pair_lib();
        lib.set_dut_ref("D1").unwrap();
        assert_eq!(lib.dut_ref().unwrap().name, "D1");

        let options = DcOptions::default().with_filters(FilterFlags::new(false, false, true));
        let mres = lib.deembed_dc(&options).unwrap();
        assert_eq!(mres, Some(ResistanceRecord::new(1.0, 5.0, 2.0)));
    }

    #[test]
    fn test_dut_ref_unset_or_unknown() {
        let mut lib = two_pair_lib();
        assert!(matches!(lib.dut_ref(), Err(DeembedError::UnknownDevice(_))));
        assert!(matches!(lib.set_dut_ref("nope"), Err(DeembedError::UnknownDevice(_))));
    }

    #[test]
    fn test_ambiguous_width_filter_names_matches() {
        let lib = two_pair_lib();
        match lib.plan_ac(FilterFlags::new(true, false, false), None) {
            Err(DeembedError::AmbiguousCalibration { device, matches }) => {
                assert_eq!(device, "D1");
                assert_eq!(matches, vec!["O_A", "O_B", "S_A", "S_B"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_no_opens_names_device() {
        let mut lib = DutLib::new(config()).unwrap();
        lib.add_duts([
            Device::new("D1", DutType::NPN).with_data("freq_vbc", Frame::sparam(&[1.0])),
            Device::new("S1", DutType::DEEM_SHORT_BJT).with_data("ac", Frame::sparam(&[0.1])),
        ])
        .unwrap();
        match lib.deembed_ac(FilterFlags::new(false, false, true), None) {
            Err(DeembedError::MissingCalibration { device, kind, .. }) => {
                assert_eq!(device, "D1");
                assert_eq!(kind, CalibrationKind::Open);
            }
            other => panic!("expected missing open, got {:?}", other),
        }
    }

    #[test]
    fn test_ignored_opens_count_as_missing() {
        let mut lib = two_pair_lib();
        lib.ignore("O_A");
        lib.ignore("O_B");
        assert!(lib.get("O_A").is_none());
        assert_eq!(lib.iter().count(), 4);
        let err = lib.deembed_ac(FilterFlags::new(false, false, true), None).unwrap_err();
        assert!(matches!(err, DeembedError::MissingCalibration { kind: CalibrationKind::Open, .. }));
        assert!(err.to_string().contains("D1"));
    }

    #[test]
    fn test_no_devices_warns_and_keeps_state() {
        let mut lib = DutLib::new(config()).unwrap();
        lib.add_duts([
            Device::new("O1", DutType::DEEM_OPEN_BJT).with_data("ac", Frame::sparam(&[0.1])),
            Device::new("S1", DutType::DEEM_SHORT_BJT).with_data("ac", Frame::sparam(&[0.01])),
        ])
        .unwrap();
        lib.deembed_ac(FilterFlags::default(), None).unwrap();
        assert_eq!(lib.deembed_dc(&DcOptions::default()).unwrap(), None);
        assert_eq!(lib.state(), LibraryState::Fresh);
    }

    #[test]
    fn test_override_selects_structures() {
        let mut lib = two_pair_lib();
        let cross = |d: &Device<Frame>| {
            if d.name == "D1" {
                vec!["O_B".to_string(), "S_B".to_string()]
            } else {
                vec!["O_A".to_string(), "S_A".to_string()]
            }
        };
        lib.deembed_ac(FilterFlags::default(), Some(&cross)).unwrap();
        assert_eq!(lib.get("D1").unwrap().open_deembedded_with(), Some("1xO_B"));
        assert_eq!(lib.get("D2").unwrap().short_deembedded_with(), Some("1xS_A"));
    }

    #[test]
    fn test_explicit_short_list() {
        let mut lib = two_pair_lib();
        let options = DcOptions::default().with_shorts(["S_B"]);
        let plan = lib.plan_dc(&options).unwrap();
        assert!(plan.iter().all(|p| p.short.as_deref() == Some("S_B")));

        lib.deembed_dc(&options).unwrap();
        assert!((v_b(&lib, "D1", "T300K/fgummel") - (1.0 - 0.001 * 50.0)).abs() < 1e-12);

        let mut lib = two_pair_lib();
        let err = lib.deembed_dc(&DcOptions::default().with_shorts(["S_X"])).unwrap_err();
        assert!(matches!(err, DeembedError::UnknownDevice(n) if n == "S_X"));
    }

    #[test]
    fn test_global_structure_override_without_filters() {
        let mut lib = two_pair_lib();
        let f = |short: Option<&Device<Frame>>| -> lib_dut::DataResult<ResistanceRecord> {
            assert!(short.is_none());
            Ok(ResistanceRecord::ZERO)
        };
        let options = DcOptions::default().with_override_dut(&f);
        let mres = lib.deembed_dc(&options).unwrap();
        assert_eq!(mres, Some(ResistanceRecord::ZERO));
        assert!(lib.is_deembedded_dc());
    }

    #[test]
    fn test_failure_aborts_batch_without_rollback() {
        let mut lib = two_pair_lib();
        // D2's dataset no longer lines up with its open
        lib.duts[1].add_data("T300K/freq_vbc", Frame::sparam(&[1.0, 1.0]));
        let err = lib.deembed_ac(FilterFlags::new(false, false, true), None).unwrap_err();
        assert!(matches!(err, DeembedError::DataShapeMismatch { ref device, .. } if device == "D2"));
        assert!(!lib.is_deembedded_ac());
        assert_eq!(lib.get("D1").unwrap().open_deembedded_with(), Some("1xO_A"));
        assert!(lib.get("D2").unwrap().open_deembedded_with().is_none());
    }

    #[test]
    fn test_progress_observer_notified() {
        #[derive(Clone, Default)]
        struct Recorder(Rc<RefCell<Vec<String>>>);

        impl ProgressObserver for Recorder {
            fn device_done(&mut self, c: Correction, index: usize, total: usize, device: &str) {
                self.0.borrow_mut().push(format!("{} {} {}/{}", c, device, index + 1, total));
            }
        }

        let recorder = Recorder::default();
        let mut lib = single_pair_lib().with_progress(recorder.clone());
        lib.deembed_ac(FilterFlags::default(), None).unwrap();
        assert_eq!(*recorder.0.borrow(), vec!["AC D1 1/1"]);
    }

    #[test]
    fn test_split_target() {
        let mut duts: Vec<Device<()>> = ["A", "B", "C"]
            .iter()
            .map(|n| Device::new(*n, DutType::NPN))
            .collect();
        let (dut, others) = split_target(&mut duts, 1).unwrap();
        assert_eq!(dut.name, "B");
        assert_eq!(others.get(0).unwrap().name, "A");
        assert_eq!(others.get(2).unwrap().name, "C");
        assert!(others.get(1).unwrap_err().is_configuration());
        assert!(matches!(others.get(3), Err(DeembedError::UnknownDevice(_))));
        assert!(split_target(&mut duts, 3).is_none());
    }

    #[test]
    fn test_assignment_error_precedes_mutation() {
        let by_name_and_width = FilterFlags::new(true, false, true);

        let mut lib = two_pair_lib();
        lib.duts[1].width = None;
        let err = lib.deembed_ac(by_name_and_width, None).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'D2'"));
        assert_eq!(s11(&lib, "D1", "T300K/freq_vbc"), vec![1.0]);
        assert!(lib.get("D1").unwrap().open_deembedded_with().is_none());
        assert_eq!(lib.state(), LibraryState::Fresh);

        let options = DcOptions::default().with_filters(by_name_and_width);
        let err = lib.deembed_dc(&options).unwrap_err();
        assert!(err.is_configuration());
        assert!((v_b(&lib, "D1", "T300K/fgummel") - 1.0).abs() < 1e-15);
        assert!(!lib.is_deembedded_dc());
    }

    #[test]
    fn test_override_with_two_opens_fails_despite_same_die() {
        let mut lib = two_pair_lib();
        lib.duts[0].die = Some("d1".into());
        lib.duts[2].die = Some("d1".into());
        lib.duts[3].die = Some("d2".into());
        let two_opens =
            |_: &Device<Frame>| vec!["O_A".to_string(), "O_B".to_string(), "S_A".to_string()];

        let err = lib.deembed_ac(FilterFlags::default(), Some(&two_opens)).unwrap_err();
        assert!(matches!(err, DeembedError::AmbiguousCalibration { ref device, .. } if device == "D1"));
        assert!(!lib.is_deembedded_ac());
        assert_eq!(s11(&lib, "D1", "T300K/freq_vbc"), vec![1.0]);
    }

    #[test]
    fn test_single_pair_ignores_name_filter() {
        let mut lib = DutLib::new(config()).unwrap();
        lib.add_duts([
            Device::new("D1", DutType::NPN)
                .with_deemb_name("A")
                .with_data("T300K/freq_vbc", Frame::sparam(&[1.0]))
                .with_data("T300K/fgummel", Frame::gummel(1.0, 0.001)),
            Device::new("O1", DutType::DEEM_OPEN_BJT)
                .with_deemb_name("B")
                .with_data("T300K/ac", Frame::sparam(&[0.1])),
            Device::new("S1", DutType::DEEM_SHORT_BJT)
                .with_deemb_name("C")
                .with_data("T300K/ac", Frame::sparam(&[0.01]))
                .with_data("T300K/dc", Frame::short_dc(ResistanceRecord::new(1.0, 5.0, 2.0))),
        ])
        .unwrap();
        let by_name = FilterFlags::new(false, false, true);

        lib.deembed_ac(by_name, None).unwrap();
        assert_eq!(lib.get("D1").unwrap().open_deembedded_with(), Some("1xO1"));
        assert!((s11(&lib, "D1", "T300K/freq_vbc")[0] - (1.0 - 0.1 - 0.01)).abs() < 1e-12);

        let mres = lib.deembed_dc(&DcOptions::default().with_filters(by_name)).unwrap();
        assert_eq!(mres, Some(ResistanceRecord::new(1.0, 5.0, 2.0)));
        assert_eq!(lib.state(), LibraryState::AcAndDcDone);
    }

    #[test]
    fn test_zero_short_leaves_every_device_unchanged() {
        let mut lib = DutLib::new(config()).unwrap().with_progress(NoProgress);
        lib.add_duts([
            Device::new("D1", DutType::NPN).with_data("T300K/fgummel", Frame::gummel(0.8, 0.01)),
            Device::new("D2", DutType::NPN).with_data("T300K/fgummel", Frame::gummel(0.9, 0.02)),
            Device::new("S1", DutType::DEEM_SHORT_BJT)
                .with_data("T300K/dc", Frame::short_dc(ResistanceRecord::ZERO)),
        ])
        .unwrap();

        let mres = lib.deembed_dc(&DcOptions::default()).unwrap();
        assert_eq!(mres, Some(ResistanceRecord::ZERO));
        assert!(lib.is_deembedded_dc());
        assert_eq!(lib.get("D1").unwrap().data["T300K/fgummel"], Frame::gummel(0.8, 0.01));
        assert_eq!(lib.get("D2").unwrap().data["T300K/fgummel"], Frame::gummel(0.9, 0.02));
    }
}
