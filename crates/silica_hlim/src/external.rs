//! Black-box external module declarations.
//!
//! An external node stands for a module whose implementation lives outside
//! the circuit (vendor IP, hand-written HDL). It participates in export as a
//! component instantiation; the simulator treats its outputs as undefined
//! unless an evaluator is registered separately.

use crate::ids::ClockId;
use crate::types::ConnectionType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value bound to a generic of an external module.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum GenericValue {
    /// An integer generic.
    Int(i64),
    /// A string generic.
    Str(String),
    /// A boolean generic.
    Bool(bool),
}

/// A declared port of an external module.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ExternalPort {
    /// Port name as declared by the external module.
    pub name: String,
    /// The port's connection type.
    pub ty: ConnectionType,
}

/// The clock domain an external output belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum OutputDomain {
    /// The output is constant.
    Constant,
    /// The output belongs to the domain of the input clock at this index.
    InClock(usize),
    /// The domain is unknown; consumers must treat it as foreign.
    Unknown,
}

/// The declaration of a black-box external module.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ExternalDescriptor {
    /// The module (component) name used at instantiation.
    pub module_name: String,
    /// Declared input ports, in port order.
    pub ins: Vec<ExternalPort>,
    /// Declared output ports, in port order.
    pub outs: Vec<ExternalPort>,
    /// Declared bidirectional ports (rendered, not simulated).
    pub inouts: Vec<ExternalPort>,
    /// Generic bindings.
    pub generics: BTreeMap<String, GenericValue>,
    /// Clock bound to each input, parallel to `ins`.
    pub in_clocks: Vec<Option<ClockId>>,
    /// Clock domain of each output, parallel to `outs`.
    pub out_clock_relations: Vec<OutputDomain>,
}

impl ExternalDescriptor {
    /// Creates a declaration with no ports or generics.
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            ins: Vec::new(),
            outs: Vec::new(),
            inouts: Vec::new(),
            generics: BTreeMap::new(),
            in_clocks: Vec::new(),
            out_clock_relations: Vec::new(),
        }
    }

    /// Adds an input port bound to an optional clock.
    pub fn input(mut self, name: impl Into<String>, ty: ConnectionType, clock: Option<ClockId>) -> Self {
        self.ins.push(ExternalPort {
            name: name.into(),
            ty,
        });
        self.in_clocks.push(clock);
        self
    }

    /// Adds an output port with its clock domain.
    pub fn output(mut self, name: impl Into<String>, ty: ConnectionType, domain: OutputDomain) -> Self {
        self.outs.push(ExternalPort {
            name: name.into(),
            ty,
        });
        self.out_clock_relations.push(domain);
        self
    }

    /// Binds a generic value.
    pub fn generic(mut self, name: impl Into<String>, value: GenericValue) -> Self {
        self.generics.insert(name.into(), value);
        self
    }

    /// Checks the declaration for internal consistency.
    ///
    /// Port and clock lists must be parallel, port names unique, and every
    /// `OutputDomain::InClock` index must refer to an existing input.
    pub fn check(&self) -> Result<(), String> {
        if self.in_clocks.len() != self.ins.len() {
            return Err(format!(
                "external '{}': {} inputs but {} input clock bindings",
                self.module_name,
                self.ins.len(),
                self.in_clocks.len()
            ));
        }
        if self.out_clock_relations.len() != self.outs.len() {
            return Err(format!(
                "external '{}': {} outputs but {} output clock relations",
                self.module_name,
                self.outs.len(),
                self.out_clock_relations.len()
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for port in self.ins.iter().chain(&self.outs).chain(&self.inouts) {
            if !seen.insert(port.name.to_ascii_lowercase()) {
                return Err(format!(
                    "external '{}': duplicate port name '{}'",
                    self.module_name, port.name
                ));
            }
            if port.ty.is_unset() {
                return Err(format!(
                    "external '{}': port '{}' has zero width",
                    self.module_name, port.name
                ));
            }
        }
        for relation in &self.out_clock_relations {
            if let OutputDomain::InClock(idx) = relation {
                if *idx >= self.ins.len() {
                    return Err(format!(
                        "external '{}': output clock relation refers to input {idx} of {}",
                        self.module_name,
                        self.ins.len()
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;

    fn fifo() -> ExternalDescriptor {
        ExternalDescriptor::new("async_fifo")
            .input("wr_data", ConnectionType::raw(8), Some(ClockId::from_index(0)))
            .input("wr_en", ConnectionType::bool(), Some(ClockId::from_index(0)))
            .output("rd_data", ConnectionType::raw(8), OutputDomain::Unknown)
            .generic("DEPTH", GenericValue::Int(64))
    }

    #[test]
    fn builder_keeps_lists_parallel() {
        let d = fifo();
        assert_eq!(d.ins.len(), d.in_clocks.len());
        assert_eq!(d.outs.len(), d.out_clock_relations.len());
        assert!(d.check().is_ok());
    }

    #[test]
    fn duplicate_port_rejected() {
        let d = ExternalDescriptor::new("m")
            .input("a", ConnectionType::bool(), None)
            .output("A", ConnectionType::bool(), OutputDomain::Unknown);
        assert!(d.check().unwrap_err().contains("duplicate port name"));
    }

    #[test]
    fn dangling_clock_relation_rejected() {
        let d = ExternalDescriptor::new("m")
            .output("q", ConnectionType::bool(), OutputDomain::InClock(2));
        assert!(d.check().is_err());
    }

    #[test]
    fn zero_width_port_rejected() {
        let d = ExternalDescriptor::new("m").input("a", ConnectionType::raw(0), None);
        assert!(d.check().unwrap_err().contains("zero width"));
    }

    #[test]
    fn mismatched_clock_list_rejected() {
        let mut d = fifo();
        d.in_clocks.pop();
        assert!(d.check().is_err());
    }
}
