//! Device manifest loading.
//!
//! A manifest lists the devices of a library with their geometry and the
//! keys of their datasets, but no data. It is enough to plan which
//! calibration structure and which calibration dataset each device gets.

use anyhow::{Context, Result};
use lib_deembed::{DeembedConfig, DutLib};
use lib_dut::{Device, DutType, Meters};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Library description read from a manifest file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Library settings. A separate config file given on the command line
    /// takes precedence.
    #[serde(default)]
    pub library: Option<DeembedConfig>,

    pub wafer: Option<String>,
    pub date_tapeout: Option<String>,
    pub date_received: Option<String>,

    /// Name of the device whose DC resistance record is reported.
    pub dut_ref: Option<String>,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// One device of a manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: String,

    /// Type name such as `npn`, `open_bjt` or `short_bjt`.
    #[serde(rename = "type")]
    pub dut_type: DutType,

    /// Drawn width in um.
    pub width_um: Option<f64>,

    /// Drawn length in um.
    pub length_um: Option<f64>,

    pub contact_config: Option<String>,
    pub deemb_name: Option<String>,
    pub wafer: Option<String>,
    pub die: Option<String>,

    #[serde(default = "default_ndevices")]
    pub ndevices: u32,

    /// Measurement keys of the device's datasets.
    #[serde(default)]
    pub keys: Vec<String>,
}

fn default_ndevices() -> u32 { 1 }

impl DeviceEntry {
    /// Device record without data; every key maps to `()`.
    pub fn to_device(&self) -> Device<()> {
        let mut dev = Device::new(&self.name, self.dut_type).with_ndevices(self.ndevices);
        dev.width = self.width_um.map(Meters::from_um);
        dev.length = self.length_um.map(Meters::from_um);
        dev.contact_config = self.contact_config.clone();
        dev.deemb_name = self.deemb_name.clone();
        dev.wafer = self.wafer.clone();
        dev.die = self.die.clone();
        for key in &self.keys {
            dev.add_data(key.as_str(), ());
        }
        dev
    }
}

/// Load a manifest from a file.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest file: {:?}", path))?;

    let manifest: Manifest = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest as JSON: {:?}", path))?
    } else {
        toml::from_str(&content).with_context(|| "Failed to parse manifest as TOML")?
    };

    if manifest.devices.is_empty() {
        tracing::warn!("Manifest {:?} lists no devices", path);
    }

    Ok(manifest)
}

/// Build a data-free library from a manifest.
pub fn build_library(manifest: &Manifest, config: DeembedConfig) -> Result<DutLib<()>> {
    let mut lib = DutLib::new(config).context("Invalid library configuration")?;
    lib.wafer = manifest.wafer.clone();
    lib.date_tapeout = manifest.date_tapeout.clone();
    lib.date_received = manifest.date_received.clone();

    for entry in &manifest.devices {
        lib.add_dut(entry.to_device())
            .with_context(|| format!("Cannot add device '{}'", entry.name))?;
    }

    if let Some(name) = &manifest.dut_ref {
        lib.set_dut_ref(name)?;
    }

    tracing::info!("Library with {} devices", lib.iter().count());
    Ok(lib)
}
