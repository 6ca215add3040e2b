//! Device-under-test record.

use crate::dut_type::DutType;
use crate::error::KeyResult;
use crate::key::{KeyTemperature, MeasurementKey};
use crate::units::Meters;
use std::collections::BTreeMap;

/// One measured or simulated device together with its keyed datasets.
///
/// `D` is the dataset type. Calibration structures (opens and shorts) are
/// ordinary devices whose type is a subtype of [`DutType::FLAG_OPEN`] or
/// [`DutType::FLAG_SHORT`].
#[derive(Clone, Debug)]
pub struct Device<D> {
    /// Unique name within a library.
    pub name: String,

    /// Type classification.
    pub dut_type: DutType,

    /// Drawn emitter/gate length.
    pub length: Option<Meters>,

    /// Drawn emitter/gate width.
    pub width: Option<Meters>,

    /// Contact configuration, e.g. `CBEBC`.
    pub contact_config: Option<String>,

    /// Name used to pair devices with calibration structures. Defaults to
    /// the device name.
    pub deemb_name: Option<String>,

    pub wafer: Option<String>,
    pub die: Option<String>,

    /// Terminal names in port order.
    pub nodes: Vec<String>,

    /// The two terminals the AC ports are connected to.
    pub ac_ports: Vec<String>,

    /// Number of parallel devices in the structure.
    pub ndevices: u32,

    /// Datasets by measurement key.
    pub data: BTreeMap<String, D>,

    open_deembedded_with: Option<String>,
    short_deembedded_with: Option<String>,
}

impl<D> Device<D> {
    /// Create a device without geometry or data. Nodes default to the
    /// typical terminals of `dut_type`.
    pub fn new(name: impl Into<String>, dut_type: DutType) -> Self {
        let nodes: Vec<String> = dut_type.nodes().iter().map(|n| n.to_string()).collect();
        let ac_ports = nodes.iter().take(2).cloned().collect();
        Self {
            name: name.into(),
            dut_type,
            length: None,
            width: None,
            contact_config: None,
            deemb_name: None,
            wafer: None,
            die: None,
            nodes,
            ac_ports,
            ndevices: 1,
            data: BTreeMap::new(),
            open_deembedded_with: None,
            short_deembedded_with: None,
        }
    }

    pub fn with_length(mut self, length: Meters) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_width(mut self, width: Meters) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_contact_config(mut self, config: impl Into<String>) -> Self {
        self.contact_config = Some(config.into());
        self
    }

    pub fn with_deemb_name(mut self, name: impl Into<String>) -> Self {
        self.deemb_name = Some(name.into());
        self
    }

    pub fn with_die(mut self, die: impl Into<String>) -> Self {
        self.die = Some(die.into());
        self
    }

    pub fn with_wafer(mut self, wafer: impl Into<String>) -> Self {
        self.wafer = Some(wafer.into());
        self
    }

    pub fn with_ndevices(mut self, ndevices: u32) -> Self {
        self.ndevices = ndevices;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, data: D) -> Self {
        self.data.insert(key.into(), data);
        self
    }

    /// Add or replace one dataset.
    pub fn add_data(&mut self, key: impl Into<String>, data: D) {
        self.data.insert(key.into(), data);
    }

    /// Dataset keys in iteration order.
    pub fn data_keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// Name used for calibration pairing.
    pub fn deemb_name(&self) -> &str {
        self.deemb_name.as_deref().unwrap_or(&self.name)
    }

    /// Temperature a dataset key was measured at.
    pub fn get_key_temperature(&self, key: &str) -> KeyResult<KeyTemperature> {
        MeasurementKey::parse(key).temperature().cloned()
    }

    /// Temperature of every dataset key, each key parsed once. Keys without
    /// a temperature are left out.
    pub fn key_temperatures(&self) -> BTreeMap<&str, KeyTemperature> {
        self.data
            .keys()
            .filter_map(|key| {
                let parsed = MeasurementKey::parse(key);
                let temperature = parsed.temperature().ok()?.clone();
                Some((key.as_str(), temperature))
            })
            .collect()
    }

    pub fn is_open(&self) -> bool {
        self.dut_type.is_open()
    }

    pub fn is_short(&self) -> bool {
        self.dut_type.is_short()
    }

    /// Open structure the AC data was corrected with, as `"{n}x{name}"`.
    pub fn open_deembedded_with(&self) -> Option<&str> {
        self.open_deembedded_with.as_deref()
    }

    /// Short structure the AC data was corrected with, as `"{n}x{name}"`.
    pub fn short_deembedded_with(&self) -> Option<&str> {
        self.short_deembedded_with.as_deref()
    }

    /// Record which structures corrected this device.
    pub fn set_deembedded_with(&mut self, open: impl Into<String>, short: impl Into<String>) {
        self.open_deembedded_with = Some(open.into());
        self.short_deembedded_with = Some(short.into());
    }
}
