//! Measurement keys.
//!
//! A key names one dataset of a device, e.g. `T300.00K/freq_vbc`. Parts are
//! separated by `/`; one part usually encodes the measurement temperature.
//! Recognised temperature forms, tried in this order over all parts:
//!
//! - `T300.15K`, `300p15K` (`p` stands in for the decimal point)
//! - `T(300,400)K` (temperature list)
//! - `T300`, `T300p15` (no unit suffix)
//! - a bare number such as `300`
//!
//! Temperatures are rounded to [`crate::units::TEMPERATURE_DECIMALS`] decimals.

use crate::error::{KeyError, KeyResult};
use crate::units::Kelvin;
use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between key parts.
pub const KEY_SEPARATOR: char = '/';

/// Temperature encoded in a measurement key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyTemperature {
    Single(Kelvin),
    List(Vec<Kelvin>),
}

impl KeyTemperature {
    /// The single temperature, if this is not a list.
    pub fn single(&self) -> Option<Kelvin> {
        match self {
            Self::Single(t) => Some(*t),
            Self::List(_) => None,
        }
    }

    /// Exact comparison of the rounded values. A list never equals a single
    /// temperature.
    pub fn same_as(&self, other: &KeyTemperature) -> bool {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => a.same_as(*b),
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(*y))
            }
            _ => false,
        }
    }

    /// Tolerance-based comparison of two single temperatures.
    pub fn is_close(&self, other: &KeyTemperature) -> bool {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => a.is_close(*b),
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_close(*y))
            }
            _ => false,
        }
    }

    /// Tolerance-based comparison against a reference temperature.
    pub fn is_close_to(&self, reference: Kelvin) -> bool {
        self.single().is_some_and(|t| t.is_close(reference))
    }
}

impl fmt::Display for KeyTemperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(t) => write!(f, "{}", t),
            Self::List(ts) => {
                let values: Vec<String> = ts.iter().map(|t| t.0.to_string()).collect();
                write!(f, "({})K", values.join(","))
            }
        }
    }
}

/// A measurement key parsed once into its parts and temperature.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeasurementKey {
    raw: String,
    parts: Vec<String>,
    temperature: Option<KeyTemperature>,
    #[serde(skip)]
    temperature_part: Option<usize>,
}

impl MeasurementKey {
    /// Parse a key. Keys without a recognisable temperature are still valid;
    /// [`MeasurementKey::temperature`] reports the failure when asked.
    pub fn parse(key: &str) -> Self {
        let parts: Vec<String> = key.split(KEY_SEPARATOR).map(str::to_string).collect();
        let found = find_temperature(&parts);

        Self {
            raw: key.to_string(),
            parts,
            temperature: found.as_ref().map(|(_, t)| t.clone()),
            temperature_part: found.map(|(i, _)| i),
        }
    }

    /// The key as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The `/`-separated parts.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Temperature encoded in the key.
    pub fn temperature(&self) -> KeyResult<&KeyTemperature> {
        self.temperature
            .as_ref()
            .ok_or_else(|| KeyError::no_temperature(&self.raw))
    }

    /// Single temperature encoded in the key.
    pub fn single_temperature(&self) -> KeyResult<Kelvin> {
        match self.temperature()? {
            KeyTemperature::Single(t) => Ok(*t),
            KeyTemperature::List(_) => Err(KeyError::NotScalar {
                key: self.raw.clone(),
            }),
        }
    }

    /// Sweep-kind tag: every part except the one holding the temperature.
    pub fn kind(&self) -> String {
        let rest: Vec<&str> = self
            .parts
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.temperature_part)
            .map(|(_, p)| p.as_str())
            .collect();
        rest.join("/")
    }
}

impl fmt::Display for MeasurementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Temperature of a key, shorthand for `MeasurementKey::parse(key).temperature()`.
pub fn get_key_temperature(key: &str) -> KeyResult<KeyTemperature> {
    MeasurementKey::parse(key).temperature().cloned()
}

// ============================================================================
// Nom Parsers (nom 8 compatible)
// ============================================================================

fn temperature_digits(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit() || c == 'p' || c == '.').parse(input)
}

/// `T300.15K` or `300p15K`.
fn single_temperature(input: &str) -> IResult<&str, &str> {
    preceded(opt(char('T')), terminated(temperature_digits, char('K'))).parse(input)
}

/// `T(300,400)K`.
fn temperature_list(input: &str) -> IResult<&str, Vec<f64>> {
    delimited(
        tag("T("),
        separated_list1(char(','), delimited(space0, double, space0)),
        tag(")K"),
    )
    .parse(input)
}

/// First match of `parser` anywhere in `part`.
fn search<'a, O>(part: &'a str, parser: fn(&'a str) -> IResult<&'a str, O>) -> Option<O> {
    part.char_indices()
        .find_map(|(i, _)| parser(&part[i..]).ok().map(|(_, out)| out))
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.replace('p', ".").parse::<f64>().ok()
}

fn rounded(value: f64) -> Kelvin {
    Kelvin(value).rounded()
}

fn find_temperature(parts: &[String]) -> Option<(usize, KeyTemperature)> {
    for (i, part) in parts.iter().enumerate() {
        if let Some(value) = search(part, single_temperature).and_then(parse_decimal) {
            return Some((i, KeyTemperature::Single(rounded(value))));
        }
    }

    for (i, part) in parts.iter().enumerate() {
        if let Some(values) = search(part, temperature_list) {
            let list = values.into_iter().map(rounded).collect();
            return Some((i, KeyTemperature::List(list)));
        }
    }

    for (i, part) in parts.iter().enumerate() {
        if let Some(value) = part.strip_prefix('T').and_then(parse_decimal) {
            return Some((i, KeyTemperature::Single(rounded(value))));
        }
    }

    for (i, part) in parts.iter().enumerate() {
        if let Some(value) = parse_decimal(part) {
            return Some((i, KeyTemperature::Single(rounded(value))));
        }
    }

    tracing::trace!("no temperature in key parts {:?}", parts);
    None
}
