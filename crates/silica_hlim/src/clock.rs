//! Hierarchical clock model.
//!
//! Clocks are owned by the [`Circuit`](crate::circuit::Circuit) and have
//! stable identity through [`ClockId`]. A root clock carries an absolute
//! frequency; a derived clock is defined relative to its parent through a
//! multiplier and a phase shift. Signal-driven clocks exist structurally but
//! have no statically known frequency.

use crate::attributes::VendorAttributes;
use crate::ids::ClockId;
use serde::{Deserialize, Serialize};
use silica_common::Rational;

/// The edge on which a clock triggers its registers.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TriggerEvent {
    /// Low-to-high transitions.
    RisingEdge,
    /// High-to-low transitions.
    FallingEdge,
    /// Both transitions.
    BothEdges,
}

/// How registers of a clock domain are reset.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ResetType {
    /// Reset is sampled on the clock edge.
    Synchronous,
    /// Reset acts independently of the clock.
    Asynchronous,
    /// The domain has no reset.
    None,
}

/// Whether a register pin (reset, enable) should be used by the backend.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UsageType {
    /// The backend decides.
    DontCare,
    /// The pin must be used.
    Use,
    /// The pin must not be used; its function is implemented in logic.
    DontUse,
}

/// Register behaviour carried per clock domain.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RegisterAttributes {
    /// Reset style of registers in this domain.
    pub reset_type: ResetType,
    /// Whether registers take their reset value at power-on.
    pub initialize_regs: bool,
    /// Whether the reset signal is active-high.
    pub reset_active_high: bool,
    /// Reset style of memories in this domain.
    pub memory_reset_type: ResetType,
    /// Whether memories take their initial contents at power-on.
    pub initialize_memory: bool,
    /// Whether register enable pins should be used.
    pub register_enable_usage: UsageType,
    /// Whether register reset pins should be used.
    pub register_reset_usage: UsageType,
    /// Open vendor attribute map.
    pub vendor: VendorAttributes,
}

impl Default for RegisterAttributes {
    fn default() -> Self {
        Self {
            reset_type: ResetType::Synchronous,
            initialize_regs: true,
            reset_active_high: true,
            memory_reset_type: ResetType::Synchronous,
            initialize_memory: true,
            register_enable_usage: UsageType::DontCare,
            register_reset_usage: UsageType::DontCare,
            vendor: VendorAttributes::new(),
        }
    }
}

/// The defining variant of a clock.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum ClockKind {
    /// A free-running clock with an absolute frequency in Hertz.
    Root {
        /// Absolute frequency in Hz.
        frequency: Rational,
    },
    /// A clock defined relative to a parent clock.
    Derived {
        /// The parent clock.
        parent: ClockId,
        /// Frequency multiplier relative to the parent.
        multiplier: Rational,
        /// Phase shift in parent periods.
        phase_shift: Rational,
        /// Whether edges are phase-locked to the parent.
        phase_synchronous: bool,
    },
    /// A clock driven by a circuit signal; no static frequency.
    SignalDriven,
}

/// A clock owned by the circuit.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Clock {
    /// The defining variant.
    pub kind: ClockKind,
    /// Clock name, used for export globals.
    pub name: String,
    /// Name of the associated reset signal.
    pub reset_name: String,
    /// The triggering edge.
    pub trigger: TriggerEvent,
    /// Register behaviour of this domain.
    pub attributes: RegisterAttributes,
}

impl Clock {
    /// Creates a rising-edge root clock with the given frequency in Hz.
    pub fn root(name: impl Into<String>, frequency: Rational) -> Self {
        Self {
            kind: ClockKind::Root { frequency },
            name: name.into(),
            reset_name: String::from("reset"),
            trigger: TriggerEvent::RisingEdge,
            attributes: RegisterAttributes::default(),
        }
    }

    /// Creates a clock derived from `parent` with the given frequency multiplier.
    pub fn derived(name: impl Into<String>, parent: ClockId, multiplier: Rational) -> Self {
        Self {
            kind: ClockKind::Derived {
                parent,
                multiplier,
                phase_shift: Rational::zero(),
                phase_synchronous: true,
            },
            name: name.into(),
            reset_name: String::from("reset"),
            trigger: TriggerEvent::RisingEdge,
            attributes: RegisterAttributes::default(),
        }
    }

    /// Creates a clock driven by a circuit signal.
    pub fn signal_driven(name: impl Into<String>) -> Self {
        Self {
            kind: ClockKind::SignalDriven,
            name: name.into(),
            reset_name: String::from("reset"),
            trigger: TriggerEvent::RisingEdge,
            attributes: RegisterAttributes::default(),
        }
    }

    /// Sets the triggering edge.
    pub fn with_trigger(mut self, trigger: TriggerEvent) -> Self {
        self.trigger = trigger;
        self
    }

    /// Sets the reset signal name.
    pub fn with_reset_name(mut self, name: impl Into<String>) -> Self {
        self.reset_name = name.into();
        self
    }
}

/// The relation of one clock to another, as computed by
/// [`Circuit::clock_relative_to`](crate::circuit::Circuit::clock_relative_to).
#[derive(Clone, PartialEq, Debug)]
pub struct ClockRelation {
    /// Frequency of the queried clock divided by the other clock's frequency.
    pub frequency_ratio: Rational,
    /// Phase difference expressed in periods of the other clock.
    pub phase_shift: Rational,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;

    #[test]
    fn root_defaults() {
        let clk = Clock::root("clk", Rational::integer(100_000_000));
        assert_eq!(clk.trigger, TriggerEvent::RisingEdge);
        assert_eq!(clk.reset_name, "reset");
        assert!(clk.attributes.initialize_regs);
        assert_eq!(clk.attributes.reset_type, ResetType::Synchronous);
    }

    #[test]
    fn builder_setters() {
        let clk = Clock::root("clk", Rational::integer(1))
            .with_trigger(TriggerEvent::FallingEdge)
            .with_reset_name("rst_n");
        assert_eq!(clk.trigger, TriggerEvent::FallingEdge);
        assert_eq!(clk.reset_name, "rst_n");
    }

    #[test]
    fn derived_defaults_phase_locked() {
        let clk = Clock::derived("clk2x", ClockId::from_index(0), Rational::integer(2));
        match clk.kind {
            ClockKind::Derived {
                phase_synchronous,
                phase_shift,
                ..
            } => {
                assert!(phase_synchronous);
                assert!(phase_shift.is_zero());
            }
            _ => panic!("expected derived clock"),
        }
    }

    #[test]
    fn serde_roundtrip() {
        let clk = Clock::derived("clk_div", ClockId::from_index(3), Rational::new(1, 2));
        let json = serde_json::to_string(&clk).unwrap();
        let back: Clock = serde_json::from_str(&json).unwrap();
        assert_eq!(clk, back);
    }
}
