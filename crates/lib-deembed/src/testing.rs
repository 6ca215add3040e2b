//! In-memory dataset used by the unit tests.
//!
//! AC correction is element-wise `raw - open - short` over every column;
//! metallization resistances are read from `R_EM`/`R_BM`/`R_CM` columns and
//! DC correction subtracts `I_X * R_XM` from `V_X` for X in B, C, E.

use lib_dut::{AcContext, DataError, DataResult, MeasurementData, ResistanceRecord};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    columns: BTreeMap<String, Vec<f64>>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, values: &[f64]) -> Self {
        self.columns.insert(column.to_string(), values.to_vec());
        self
    }

    pub fn column(&self, column: &str) -> Option<&[f64]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    /// One-column S-parameter table.
    pub fn sparam(values: &[f64]) -> Self {
        Self::new().with("S11", values)
    }

    /// Short measurement carrying its own metallization resistances.
    pub fn short_dc(mres: ResistanceRecord) -> Self {
        Self::new()
            .with("R_EM", &[mres.r_em.0])
            .with("R_BM", &[mres.r_bm.0])
            .with("R_CM", &[mres.r_cm.0])
    }

    /// Gummel-like DC table with currents and voltages per terminal.
    pub fn gummel(v: f64, i: f64) -> Self {
        Self::new()
            .with("V_B", &[v, v])
            .with("V_C", &[v, v])
            .with("V_E", &[0.0, 0.0])
            .with("I_B", &[i, 2.0 * i])
            .with("I_C", &[10.0 * i, 20.0 * i])
            .with("I_E", &[-11.0 * i, -22.0 * i])
    }

    fn scalar(&self, column: &str) -> DataResult<f64> {
        self.column(column)
            .and_then(|v| v.first().copied())
            .ok_or_else(|| DataError::missing_column(column))
    }
}

impl MeasurementData for Frame {
    fn deembed(&self, open: &Self, short: &Self, _ctx: AcContext<'_>) -> DataResult<Self> {
        let mut out = Frame::new();
        for (name, raw) in &self.columns {
            let (Some(o), Some(s)) = (open.column(name), short.column(name)) else {
                return Err(DataError::shape_mismatch(format!("column {} missing", name)));
            };
            if o.len() != raw.len() || s.len() != raw.len() {
                return Err(DataError::shape_mismatch(format!(
                    "column {}: {} vs {}/{} rows",
                    name,
                    raw.len(),
                    o.len(),
                    s.len()
                )));
            }
            let values: Vec<f64> = raw
                .iter()
                .zip(o)
                .zip(s)
                .map(|((r, o), s)| r - o - s)
                .collect();
            out.columns.insert(name.clone(), values);
        }
        Ok(out)
    }

    fn determine_mres(&self, _forced_current: bool) -> DataResult<ResistanceRecord> {
        Ok(ResistanceRecord::new(
            self.scalar("R_EM")?,
            self.scalar("R_BM")?,
            self.scalar("R_CM")?,
        ))
    }

    fn deembed_dc(&self, mres: &ResistanceRecord, _forced_current: bool) -> DataResult<Self> {
        let mut out = self.clone();
        for (terminal, r) in [("B", mres.r_bm), ("C", mres.r_cm), ("E", mres.r_em)] {
            let current = self.column(&format!("I_{}", terminal)).map(<[f64]>::to_vec);
            if let (Some(i), Some(v)) = (current, out.columns.get_mut(&format!("V_{}", terminal))) {
                for (v, i) in v.iter_mut().zip(i) {
                    *v -= i * r.0;
                }
            }
        }
        Ok(out)
    }

    fn columns(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }
}
