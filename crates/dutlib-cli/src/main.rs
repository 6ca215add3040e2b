//! dutlib CLI: calibration planning for device libraries.
//!
//! Reads a device manifest and reports which open and short structure, and
//! which of their datasets, each device would be de-embedded with.

mod manifest;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_deembed::{load_config, DcOptions, FilterFlags};
use lib_dut::{Kelvin, MeasurementKey};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dutlib")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum CorrectionSelect {
    Ac,
    Dc,
    #[default]
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan calibration assignment for the devices of a manifest
    Plan {
        /// Path to the device manifest (TOML or JSON)
        manifest: PathBuf,

        /// Library configuration file, overriding the manifest's settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Which correction to plan
        #[arg(long, default_value = "both")]
        correction: CorrectionSelect,

        /// Pair by drawn width
        #[arg(long)]
        width: bool,

        /// Pair by drawn length
        #[arg(long)]
        length: bool,

        /// Pair by de-embedding name
        #[arg(long)]
        name: bool,

        /// Short structures to use for DC (default: all shorts)
        #[arg(long = "short")]
        shorts: Vec<String>,

        /// Reference temperature in K (default: from configuration)
        #[arg(long)]
        t_ref: Option<f64>,
    },

    /// Show how a measurement key is parsed
    ParseKey {
        /// Measurement key, e.g. T300K/freq_vbc
        key: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Plan {
            manifest,
            config,
            correction,
            width,
            length,
            name,
            shorts,
            t_ref,
        } => {
            let flags = FilterFlags::new(width, length, name);
            let request = PlanRequest {
                correction,
                flags: flags.any().then_some(flags),
                shorts,
                t_ref,
            };
            run_plan(&manifest, config.as_deref(), &request, cli.format)?;
        }
        Commands::ParseKey { key } => {
            parse_key(&key, cli.format)?;
        }
    }

    Ok(())
}

struct PlanRequest {
    correction: CorrectionSelect,
    /// Filters from the command line; configuration filters otherwise.
    flags: Option<FilterFlags>,
    shorts: Vec<String>,
    t_ref: Option<f64>,
}

fn plan_report(
    manifest: &manifest::Manifest,
    config_path: Option<&Path>,
    request: &PlanRequest,
) -> Result<output::PlanReport> {
    let config = match config_path {
        Some(path) => {
            tracing::info!("Loading configuration from {:?}", path);
            load_config(path)?
        }
        None => manifest.library.clone().unwrap_or_default(),
    };
    let filters = request.flags.unwrap_or(config.filters);

    let mut options = DcOptions::from_config(&config).with_filters(filters);
    if let Some(t_ref) = request.t_ref {
        options = options.with_t_ref(Kelvin(t_ref));
    }
    if !request.shorts.is_empty() {
        options = options.with_shorts(request.shorts.iter().cloned());
    }

    let lib = manifest::build_library(manifest, config)?;

    let mut report = output::PlanReport::default();
    if request.correction != CorrectionSelect::Dc {
        report.ac = Some(lib.plan_ac(filters, None).context("AC planning failed")?);
    }
    if request.correction != CorrectionSelect::Ac {
        report.dc = Some(lib.plan_dc(&options).context("DC planning failed")?);
    }
    Ok(report)
}

fn run_plan(
    manifest_path: &Path,
    config_path: Option<&Path>,
    request: &PlanRequest,
    format: OutputFormat,
) -> Result<()> {
    tracing::info!("Loading manifest from {:?}", manifest_path);

    let manifest = manifest::load_manifest(manifest_path)?;
    let report = plan_report(&manifest, config_path, request)?;

    let stdout = std::io::stdout();
    output::write_plan(&mut stdout.lock(), &report, format)?;
    Ok(())
}

fn parse_key(key: &str, format: OutputFormat) -> Result<()> {
    let parsed = MeasurementKey::parse(key);
    let stdout = std::io::stdout();
    output::write_key(&mut stdout.lock(), &parsed, format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifest::{DeviceEntry, Manifest};
    use lib_deembed::DeembedConfig;
    use lib_dut::DutType;

    fn entry(name: &str, dut_type: DutType, deemb_name: &str, keys: &[&str]) -> DeviceEntry {
        DeviceEntry {
            name: name.to_string(),
            dut_type,
            width_um: Some(0.5),
            length_um: None,
            contact_config: None,
            deemb_name: Some(deemb_name.to_string()),
            wafer: None,
            die: None,
            ndevices: 1,
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn manifest() -> Manifest {
        Manifest {
            library: Some(
                DeembedConfig::default()
                    .with_ac_filter("freq", "ac")
                    .with_dc_filter("gummel", "dc"),
            ),
            devices: vec![
                entry("Q1", DutType::NPN, "A", &["T300K/freq_vbc", "T300K/fgummel"]),
                entry("O_A", DutType::DEEM_OPEN_BJT, "A", &["T300K/ac"]),
                entry("O_B", DutType::DEEM_OPEN_BJT, "B", &["T300K/ac"]),
                entry("S_A", DutType::DEEM_SHORT_BJT, "A", &["T300K/ac", "T300K/dc", "T400K/dc"]),
                entry("S_B", DutType::DEEM_SHORT_BJT, "B", &["T300K/ac", "T300K/dc"]),
            ],
            ..Manifest::default()
        }
    }

    fn request(flags: Option<FilterFlags>) -> PlanRequest {
        PlanRequest {
            correction: CorrectionSelect::Both,
            flags,
            shorts: Vec::new(),
            t_ref: None,
        }
    }

    #[test]
    fn test_plan_by_name() {
        let report = plan_report(&manifest(), None, &request(Some(FilterFlags::new(false, false, true)))).unwrap();
        let ac = report.ac.unwrap();
        assert_eq!(ac[0].open, "O_A");
        assert_eq!(ac[0].keys[0].short_key, "T300K/ac");

        let dc = report.dc.unwrap();
        assert_eq!(dc[0].short.as_deref(), Some("S_A"));
        assert_eq!(dc[0].keys[0].short_key.as_deref(), Some("T300K/dc"));
        assert!(dc[0].keys[0].at_reference);
    }

    #[test]
    fn test_plan_without_filters_fails() {
        let err = plan_report(&manifest(), None, &request(None)).unwrap_err();
        assert!(format!("{:#}", err).contains("AC planning failed"));
    }

    #[test]
    fn test_plan_dc_with_explicit_short() {
        let mut req = request(None);
        req.correction = CorrectionSelect::Dc;
        req.shorts = vec!["S_B".to_string()];
        let report = plan_report(&manifest(), None, &req).unwrap();
        assert!(report.ac.is_none());
        assert_eq!(report.dc.unwrap()[0].short.as_deref(), Some("S_B"));
    }
}
