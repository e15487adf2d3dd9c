//! Signal, register, and path attribute records.
//!
//! Attributes are free-form hints consumed by downstream tools. Vendor
//! specific attributes are kept as an open string map keyed first by vendor
//! and then by attribute name, and emitted verbatim by the export backends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed vendor attribute value, e.g. `{ty: "string", value: "TRUE"}`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AttribValue {
    /// The attribute's declared type in the target language.
    pub ty: String,
    /// The attribute value, rendered verbatim.
    pub value: String,
}

/// Vendor-specific attributes: vendor → attribute name → value.
pub type VendorAttributes = BTreeMap<String, BTreeMap<String, AttribValue>>;

/// Attributes attached to a signal.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct SignalAttributes {
    /// Maximum fanout before the driver is duplicated. Zero means don't care.
    pub max_fanout: u32,
    /// Whether optimization passes may fuse this signal away.
    pub allow_fusing: bool,
    /// Marks a signal that intentionally crosses a clock domain.
    pub crossing_clock_domain: bool,
    /// Open vendor attribute map.
    pub vendor: VendorAttributes,
}

impl SignalAttributes {
    /// Creates attributes with defaults (fusing allowed, no fanout limit).
    pub fn new() -> Self {
        Self {
            allow_fusing: true,
            ..Self::default()
        }
    }
}

/// Attributes attached to a start–end path through the circuit.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct PathAttributes {
    /// Marks the path as a timing false path.
    pub false_path: bool,
    /// Multi-cycle budget in destination clock cycles. Zero means none.
    pub multi_cycle: u32,
    /// Open vendor attribute map.
    pub vendor: VendorAttributes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_defaults() {
        let a = SignalAttributes::new();
        assert!(a.allow_fusing);
        assert_eq!(a.max_fanout, 0);
        assert!(!a.crossing_clock_domain);
    }

    #[test]
    fn vendor_map_nesting() {
        let mut a = SignalAttributes::new();
        a.vendor.entry("xilinx".into()).or_default().insert(
            "ASYNC_REG".into(),
            AttribValue {
                ty: "string".into(),
                value: "TRUE".into(),
            },
        );
        assert_eq!(a.vendor["xilinx"]["ASYNC_REG"].value, "TRUE");
    }

    #[test]
    fn serde_roundtrip() {
        let mut p = PathAttributes {
            false_path: true,
            multi_cycle: 2,
            vendor: VendorAttributes::new(),
        };
        p.vendor.entry("intel".into()).or_default().insert(
            "SDC_STATEMENT".into(),
            AttribValue {
                ty: "string".into(),
                value: "set_false_path".into(),
            },
        );
        let json = serde_json::to_string(&p).unwrap();
        let back: PathAttributes = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
