//! Plan and key output formatting.

use crate::OutputFormat;
use anyhow::Result;
use lib_deembed::{AcPlanEntry, DcPlanEntry};
use lib_dut::{KeyTemperature, MeasurementKey};
use serde::Serialize;
use std::io::Write;

/// Calibration plan of a library.
#[derive(Debug, Default, Serialize)]
pub struct PlanReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ac: Option<Vec<AcPlanEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc: Option<Vec<DcPlanEntry>>,
}

/// Write a plan in the requested format.
pub fn write_plan(out: &mut impl Write, report: &PlanReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(report)?)?;
        }
        OutputFormat::Text => {
            if let Some(ac) = &report.ac {
                writeln!(out, "AC de-embedding")?;
                writeln!(out, "===============")?;
                if ac.is_empty() {
                    writeln!(out, "  (no devices)")?;
                }
                for entry in ac {
                    writeln!(out, "{}: open {}, short {}", entry.device, entry.open, entry.short)?;
                    for key in &entry.keys {
                        writeln!(out, "  {} <- {} / {}", key.key, key.open_key, key.short_key)?;
                    }
                }
            }

            if let Some(dc) = &report.dc {
                if report.ac.is_some() {
                    writeln!(out)?;
                }
                writeln!(out, "DC de-embedding")?;
                writeln!(out, "===============")?;
                if dc.is_empty() {
                    writeln!(out, "  (no devices)")?;
                }
                for entry in dc {
                    let short = entry.short.as_deref().unwrap_or("<override>");
                    writeln!(out, "{}: short {}", entry.device, short)?;
                    for key in &entry.keys {
                        let marker = if key.at_reference { " (t_ref)" } else { "" };
                        let short_key = key.short_key.as_deref().unwrap_or("<override>");
                        writeln!(out, "  {} <- {}{}", key.key, short_key, marker)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Write the parsed form of a measurement key.
pub fn write_key(out: &mut impl Write, key: &MeasurementKey, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(key)?)?;
        }
        OutputFormat::Text => {
            writeln!(out, "Key:         {}", key)?;
            writeln!(out, "Parts:       {}", key.parts().join(", "))?;
            writeln!(out, "Kind:        {}", key.kind())?;
            match key.temperature() {
                Ok(KeyTemperature::Single(t)) => {
                    writeln!(out, "Temperature: {} ({:.2} °C)", t, t.as_celsius())?
                }
                Ok(t) => writeln!(out, "Temperature: {}", t)?,
                Err(e) => writeln!(out, "Temperature: none ({})", e)?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_deembed::{DcKeySelection, KeySelection};

    fn report() -> PlanReport {
        PlanReport {
            ac: Some(vec![AcPlanEntry {
                device: "Q1".into(),
                open: "O_A".into(),
                short: "S_A".into(),
                keys: vec![KeySelection {
                    key: "T300K/freq_vbc".into(),
                    open_key: "T300K/ac".into(),
                    short_key: "T300K/ac".into(),
                }],
            }]),
            dc: Some(vec![DcPlanEntry {
                device: "Q1".into(),
                short: None,
                keys: vec![DcKeySelection {
                    key: "T300K/fgummel".into(),
                    short_key: None,
                    at_reference: true,
                }],
            }]),
        }
    }

    #[test]
    fn test_text_plan() {
        let mut out = Vec::new();
        write_plan(&mut out, &report(), OutputFormat::Text).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Q1: open O_A, short S_A"));
        assert!(text.contains("  T300K/freq_vbc <- T300K/ac / T300K/ac"));
        assert!(text.contains("Q1: short <override>"));
        assert!(text.contains("(t_ref)"));
    }

    #[test]
    fn test_json_plan() {
        let mut out = Vec::new();
        let report = PlanReport {
            dc: None,
            ..report()
        };
        write_plan(&mut out, &report, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["ac"][0]["open"], "O_A");
        assert!(value.get("dc").is_none());
    }

    #[test]
    fn test_key_text() {
        let mut out = Vec::new();
        let key = MeasurementKey::parse("W12/T300p15K/fgummel");
        write_key(&mut out, &key, OutputFormat::Text).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Temperature: 300.15K (27.00 °C)"));
        assert!(text.contains("Kind:        W12/fgummel"));
    }
}
