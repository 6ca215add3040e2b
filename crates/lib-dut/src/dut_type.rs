//! Device-type flag set.
//!
//! A `DutType` is a bit set. Composite types (e.g. `NPN`) carry every flag of
//! their parents, so subtype tests reduce to a shared-bit check. The four
//! low "subtype" bits only distinguish siblings and are ignored by
//! [`DutType::is_subtype`].

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

const SUBTYPE_1: u32 = 1 << 0;
const SUBTYPE_2: u32 = 1 << 1;
const SUBTYPE_3: u32 = 1 << 2;
const SUBTYPE_4: u32 = 1 << 3;
const SUBTYPE_MASK: u32 = SUBTYPE_1 | SUBTYPE_2 | SUBTYPE_3 | SUBTYPE_4;

const DEVICE: u32 = 1 << 4;
const MEAS_STRUCT: u32 = 1 << 5;
const DEEMB_STRUCT: u32 = 1 << 6;
const TRANSISTOR: u32 = 1 << 7;
const BJT: u32 = 1 << 8;
const BJT_DEEMB: u32 = 1 << 9;
const MOS: u32 = 1 << 10;
const MOS_DEEMB: u32 = 1 << 11;
const DIODE: u32 = 1 << 12;
const CAP: u32 = 1 << 13;
const RES: u32 = 1 << 14;
const TLM: u32 = 1 << 15;
const NPN: u32 = 1 << 16;
const PNP: u32 = 1 << 17;
const N_MOS: u32 = 1 << 18;
const P_MOS: u32 = 1 << 19;
const OPEN: u32 = 1 << 20;
const SHORT: u32 = 1 << 21;

/// Device classification as a flag set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DutType(u32);

impl DutType {
    /// Nothing at all.
    pub const DUMMY: Self = Self(0);

    // Bare flags, mostly useful as `find_devices` selectors.
    pub const FLAG_OPEN: Self = Self(OPEN);
    pub const FLAG_SHORT: Self = Self(SHORT);
    pub const FLAG_BJT: Self = Self(BJT);
    pub const FLAG_MOS: Self = Self(MOS);
    pub const FLAG_DEEMB: Self = Self(DEEMB_STRUCT);

    pub const TRANSISTOR: Self = Self(DEVICE | TRANSISTOR);
    pub const BJT: Self = Self(DEVICE | TRANSISTOR | BJT);
    pub const MOS: Self = Self(DEVICE | TRANSISTOR | MOS);
    pub const NPN: Self = Self(DEVICE | TRANSISTOR | BJT | NPN);
    pub const PNP: Self = Self(DEVICE | TRANSISTOR | BJT | PNP);
    pub const N_MOS: Self = Self(DEVICE | TRANSISTOR | MOS | N_MOS);
    pub const P_MOS: Self = Self(DEVICE | TRANSISTOR | MOS | P_MOS);

    pub const DIODE: Self = Self(DEVICE | DIODE);
    pub const PN_DIODE: Self = Self(DEVICE | DIODE | SUBTYPE_1);
    pub const PIN_DIODE: Self = Self(DEVICE | DIODE | SUBTYPE_2);
    pub const CAP: Self = Self(DEVICE | CAP);
    pub const RES: Self = Self(DEVICE | RES);
    pub const TLM: Self = Self(MEAS_STRUCT | TLM);

    pub const DEEM_BJT: Self = Self(DEEMB_STRUCT | BJT_DEEMB);
    pub const DEEM_MOS: Self = Self(DEEMB_STRUCT | MOS_DEEMB);
    pub const DEEM_OPEN_BJT: Self = Self(DEEMB_STRUCT | BJT_DEEMB | OPEN);
    pub const DEEM_SHORT_BJT: Self = Self(DEEMB_STRUCT | BJT_DEEMB | SHORT);
    pub const DEEM_OPEN_MOS: Self = Self(DEEMB_STRUCT | MOS_DEEMB | OPEN);
    pub const DEEM_SHORT_MOS: Self = Self(DEEMB_STRUCT | MOS_DEEMB | SHORT);

    const NAMES: &'static [(&'static str, DutType)] = &[
        ("dummy", Self::DUMMY),
        ("open", Self::FLAG_OPEN),
        ("short", Self::FLAG_SHORT),
        ("flag_bjt", Self::FLAG_BJT),
        ("flag_mos", Self::FLAG_MOS),
        ("deemb_struct", Self::FLAG_DEEMB),
        ("transistor", Self::TRANSISTOR),
        ("bjt", Self::BJT),
        ("mos", Self::MOS),
        ("npn", Self::NPN),
        ("pnp", Self::PNP),
        ("nmos", Self::N_MOS),
        ("pmos", Self::P_MOS),
        ("diode", Self::DIODE),
        ("pn-diode", Self::PN_DIODE),
        ("pin-diode", Self::PIN_DIODE),
        ("capacitance", Self::CAP),
        ("resistor", Self::RES),
        ("tlm", Self::TLM),
        ("bjt_deemb", Self::DEEM_BJT),
        ("mos_deemb", Self::DEEM_MOS),
        ("open_bjt", Self::DEEM_OPEN_BJT),
        ("short_bjt", Self::DEEM_SHORT_BJT),
        ("open_mos", Self::DEEM_OPEN_MOS),
        ("short_mos", Self::DEEM_SHORT_MOS),
    ];

    /// Raw flag bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// True if `self` shares at least one non-subtype flag with `other`.
    pub fn is_subtype(&self, other: DutType) -> bool {
        (self.0 & other.0 & !SUBTYPE_MASK) != 0
    }

    /// Open calibration structure.
    pub fn is_open(&self) -> bool {
        self.is_subtype(Self::FLAG_OPEN)
    }

    /// Short calibration structure.
    pub fn is_short(&self) -> bool {
        self.is_subtype(Self::FLAG_SHORT)
    }

    /// Terminal names typically found on a device of this type.
    pub fn nodes(&self) -> &'static [&'static str] {
        if self.0 & (BJT | BJT_DEEMB) != 0 {
            &["B", "C", "E", "S"]
        } else if self.0 & (MOS | MOS_DEEMB) != 0 {
            &["G", "D", "S", "B"]
        } else if self.0 & (DIODE | CAP | RES) != 0 {
            &["C", "A"]
        } else if self.0 & TLM != 0 {
            &["L", "M", "R"]
        } else {
            &[]
        }
    }

    /// Canonical name, if this exact flag combination has one.
    pub fn name(&self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(_, ty)| ty == self)
            .map(|(name, _)| *name)
    }
}

impl BitOr for DutType {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for DutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "DutType({})", name),
            None => write!(f, "DutType({:#x})", self.0),
        }
    }
}

impl fmt::Display for DutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

/// Unknown device-type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown device type '{0}'")]
pub struct UnknownDutType(pub String);

impl FromStr for DutType {
    type Err = UnknownDutType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if let Some(hex) = wanted.strip_prefix("0x") {
            return u32::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|_| UnknownDutType(s.to_string()));
        }
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, ty)| *ty)
            .ok_or_else(|| UnknownDutType(s.to_string()))
    }
}

impl Serialize for DutType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DutType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtype_relations() {
        assert!(DutType::NPN.is_subtype(DutType::NPN));
        assert!(DutType::NPN.is_subtype(DutType::BJT));
        assert!(DutType::DEEM_OPEN_BJT.is_subtype(DutType::FLAG_OPEN));
        assert!(!DutType::DEEM_OPEN_BJT.is_subtype(DutType::FLAG_SHORT));
        assert!(!DutType::NPN.is_subtype(DutType::FLAG_OPEN));
        assert!(!DutType::DEEM_SHORT_MOS.is_subtype(DutType::NPN));
    }

    #[test]
    fn test_subtype_bits_ignored() {
        // Siblings differing only in a subtype bit still share DIODE.
        assert!(DutType::PN_DIODE.is_subtype(DutType::PIN_DIODE));
        // A bare subtype bit never counts as a match.
        assert!(!DutType(SUBTYPE_1).is_subtype(DutType::PN_DIODE));
    }

    #[test]
    fn test_open_short_helpers() {
        assert!(DutType::DEEM_OPEN_MOS.is_open());
        assert!(DutType::DEEM_SHORT_BJT.is_short());
        assert!(!DutType::PNP.is_open());
        assert_eq!(DutType::DEEM_SHORT_BJT.nodes(), &["B", "C", "E", "S"]);
    }

    #[test]
    fn test_name_round_trip() {
        let ty: DutType = "Short_BJT".parse().unwrap();
        assert_eq!(ty, DutType::DEEM_SHORT_BJT);
        assert_eq!(ty.to_string(), "short_bjt");
        assert!("bipolar".parse::<DutType>().is_err());

        let custom = DutType::NPN | DutType::FLAG_OPEN;
        assert_eq!(custom.to_string().parse::<DutType>().unwrap(), custom);
    }

    #[test]
    fn test_serde_as_name() {
        let json = serde_json::to_string(&vec![DutType::NPN, DutType::FLAG_OPEN]).unwrap();
        assert_eq!(json, r#"["npn","open"]"#);
        let back: Vec<DutType> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![DutType::NPN, DutType::FLAG_OPEN]);
    }
}
