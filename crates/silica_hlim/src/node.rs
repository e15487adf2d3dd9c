//! Circuit nodes: the typed operations of the dataflow graph.
//!
//! Every node has an ordered list of input ports (each with at most one
//! driver) and an ordered list of output ports (each driving any number of
//! sinks). Wiring is mutated exclusively through
//! [`Circuit`](crate::circuit::Circuit), which keeps driver and sink lists
//! symmetric.

use crate::external::ExternalDescriptor;
use crate::ids::{ClockId, GroupId, NodeId};
use crate::types::ConnectionType;
use serde::{Deserialize, Serialize};
use silica_common::{BitVectorState, SourceLoc};

/// A reference to a specific output port of a specific node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodePort {
    /// The producing node.
    pub node: NodeId,
    /// The output port index on that node.
    pub port: u32,
}

/// A back-reference from an output port to one of its consumers.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SinkRef {
    /// The consuming node.
    pub node: NodeId,
    /// The input port index on the consuming node.
    pub input: u32,
}

/// How an output's value comes to be over time.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum OutputKind {
    /// Recomputed combinatorially on every reevaluation.
    Immediate,
    /// Sampled on a clock edge; closes combinational cycles.
    Latched,
    /// Fixed at power-on, never recomputed.
    Constant,
}

/// An output port: its type, kind, and consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputPort {
    /// The type of the value produced here.
    pub ty: ConnectionType,
    /// How the value comes to be.
    pub kind: OutputKind,
    pub(crate) sinks: Vec<SinkRef>,
}

impl OutputPort {
    pub(crate) fn new(ty: ConnectionType, kind: OutputKind) -> Self {
        Self {
            ty,
            kind,
            sinks: Vec::new(),
        }
    }

    /// The consumers of this output, in connection order (disconnects may
    /// reorder via swap-remove).
    pub fn sinks(&self) -> &[SinkRef] {
        &self.sinks
    }
}

/// Arithmetic operations.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ArithOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
}

/// Bitwise logic operations.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum LogicOp {
    /// Bitwise AND.
    And,
    /// Bitwise NAND.
    Nand,
    /// Bitwise OR.
    Or,
    /// Bitwise NOR.
    Nor,
    /// Bitwise XOR.
    Xor,
    /// Bitwise XNOR.
    Xnor,
    /// Bitwise NOT (unary).
    Not,
}

impl LogicOp {
    /// Number of operands the operation takes.
    pub fn arity(self) -> usize {
        match self {
            LogicOp::Not => 1,
            _ => 2,
        }
    }
}

/// Comparison operations. All produce a single boolean bit.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equality.
    Eq,
    /// Inequality.
    Neq,
    /// Less than.
    Lt,
    /// Greater than.
    Gt,
    /// Less than or equal.
    Leq,
    /// Greater than or equal.
    Geq,
}

/// The source of one output range of a rewire node.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RangeSource {
    /// Bits taken from an input, starting at `offset`.
    Input {
        /// The input port index.
        input: u32,
        /// The bit offset within that input.
        offset: u32,
    },
    /// Constant zero bits.
    Zero,
    /// Constant one bits.
    One,
}

/// One contiguous range of a rewire node's output word.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct OutputRange {
    /// Width of this range in bits.
    pub width: u32,
    /// Where the bits come from.
    pub source: RangeSource,
}

/// The bit-shuffling operation of a rewire node.
///
/// Ranges are listed most-significant first; their concatenation forms the
/// output word, and their widths must sum to the declared output width.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RewireOp {
    /// The output ranges, most-significant first.
    pub ranges: Vec<OutputRange>,
}

impl RewireOp {
    /// A single-range extract of `width` bits starting at `offset` of input 0.
    pub fn extract(offset: u32, width: u32) -> Self {
        Self {
            ranges: vec![OutputRange {
                width,
                source: RangeSource::Input { input: 0, offset },
            }],
        }
    }

    /// Concatenation of whole inputs, most-significant first.
    pub fn concat(widths: &[u32]) -> Self {
        Self {
            ranges: widths
                .iter()
                .enumerate()
                .map(|(i, &width)| OutputRange {
                    width,
                    source: RangeSource::Input {
                        input: i as u32,
                        offset: 0,
                    },
                })
                .collect(),
        }
    }

    /// Zero-extension of input 0 from `width` to `width + pad` bits.
    pub fn pad_zero(width: u32, pad: u32) -> Self {
        Self {
            ranges: vec![
                OutputRange {
                    width: pad,
                    source: RangeSource::Zero,
                },
                OutputRange {
                    width,
                    source: RangeSource::Input { input: 0, offset: 0 },
                },
            ],
        }
    }

    /// Total width of the produced output word.
    pub fn total_width(&self) -> u32 {
        self.ranges.iter().map(|r| r.width).sum()
    }

    /// Number of input ports referenced by the ranges.
    pub fn num_inputs(&self) -> usize {
        self.ranges
            .iter()
            .filter_map(|r| match r.source {
                RangeSource::Input { input, .. } => Some(input as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Returns `Some(bit_index)` if the operation is a single-bit extract of
    /// input 0.
    pub fn as_bit_extract(&self) -> Option<u32> {
        match self.ranges.as_slice() {
            [OutputRange {
                width: 1,
                source: RangeSource::Input { input: 0, offset },
            }] => Some(*offset),
            _ => None,
        }
    }
}

/// The severity of a signal tap.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TapLevel {
    /// A simulation assertion; a defined-false condition is an error.
    Assert,
    /// A warning message on a defined-false condition.
    Warn,
    /// A debug message on a defined-false condition.
    Debug,
    /// Retained for debuggers; no simulation or export effect.
    Watch,
}

/// Configuration of a signal tap node.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TapConfig {
    /// The tap severity.
    pub level: TapLevel,
    /// The message reported when the tap fires.
    pub message: String,
}

/// Constraint parameters of a clock-domain-crossing marker.
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct CdcParameter {
    /// Max skew, as a multiple of the smaller of the two clock periods.
    pub max_skew: Option<f64>,
    /// Max net delay, as a multiple of the destination clock period.
    pub net_delay: Option<f64>,
    /// Whether the crossing bus is gray coded.
    pub is_gray_coded: Option<bool>,
}

/// Direction of an I/O pin.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum PinDirection {
    /// Driven from outside the design.
    Input,
    /// Driven by the design.
    Output,
    /// Tri-state, driven from both sides.
    Bidirectional,
}

/// Configuration of an I/O pin node.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PinParameter {
    /// The pin direction.
    pub direction: PinDirection,
    /// Differential pair suffixes `(positive, negative)` if differential.
    pub differential: Option<(String, String)>,
    /// The pin exists only for simulation and is omitted from export.
    pub simulation_only: bool,
    /// For input pins: overrides the clock domain the pin's value belongs to.
    pub clock_override: Option<ClockId>,
}

impl PinParameter {
    /// An ordinary input pin.
    pub fn input() -> Self {
        Self {
            direction: PinDirection::Input,
            differential: None,
            simulation_only: false,
            clock_override: None,
        }
    }

    /// An ordinary output pin.
    pub fn output() -> Self {
        Self {
            direction: PinDirection::Output,
            ..Self::input()
        }
    }

    /// A bidirectional pin.
    pub fn bidirectional() -> Self {
        Self {
            direction: PinDirection::Bidirectional,
            ..Self::input()
        }
    }
}

/// Configuration of a memory node.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Width of one word in bits.
    pub word_width: u32,
    /// Number of words.
    pub depth: u32,
    /// Power-on contents; `None` leaves the memory undefined.
    pub initial: Option<BitVectorState>,
}

/// Configuration of a memory port node.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MemPortConfig {
    /// Whether the port can write. Write ports must be bound to a clock.
    pub has_write: bool,
}

/// Input port indices of a register node.
pub mod register {
    /// The data input sampled on the clock edge.
    pub const DATA: u32 = 0;
    /// The power-on / reset value; must be constant-driven.
    pub const RESET_VALUE: u32 = 1;
    /// Optional clock enable; unconnected means always enabled.
    pub const ENABLE: u32 = 2;
}

/// Clock port indices of a clock-domain-crossing node.
pub mod cdc {
    /// The clock domain the input value belongs to.
    pub const INPUT_CLOCK: u32 = 0;
    /// The clock domain the output value is consumed in.
    pub const OUTPUT_CLOCK: u32 = 1;
}

/// Input port indices of an export-override node.
pub mod export_override {
    /// The value used during simulation.
    pub const SIM: u32 = 0;
    /// The value rendered on export.
    pub const EXPORT: u32 = 1;
}

/// Input port indices of a memory port node.
pub mod mem_port {
    /// Connection to the memory node's handle output.
    pub const MEMORY: u32 = 0;
    /// The word address.
    pub const ADDRESS: u32 = 1;
    /// Data written on the clock edge.
    pub const WR_DATA: u32 = 2;
    /// Write enable.
    pub const WR_ENABLE: u32 = 3;
}

/// Input port helpers of a priority-conditional node.
pub mod prio {
    /// The default-value input.
    pub const DEFAULT: u32 = 0;

    /// The condition input of choice `i`.
    pub fn condition(i: u32) -> u32 {
        1 + 2 * i
    }

    /// The value input of choice `i`.
    pub fn value(i: u32) -> u32 {
        2 + 2 * i
    }

    /// Number of choices given an input-port count.
    pub fn num_choices(num_inputs: usize) -> u32 {
        ((num_inputs.saturating_sub(1)) / 2) as u32
    }
}

/// The closed set of node operations.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    /// A named alias of its single driver.
    Signal,
    /// A constant value.
    Constant {
        /// The constant bits; length equals the type width.
        value: BitVectorState,
        /// The type of the constant.
        ty: ConnectionType,
    },
    /// Bit slicing, concatenation, and padding.
    Rewire {
        /// The range composition.
        op: RewireOp,
        /// The output type; its width equals the op's total width.
        ty: ConnectionType,
    },
    /// Two-operand arithmetic.
    Arithmetic(ArithOp),
    /// Bitwise logic.
    Logic(LogicOp),
    /// Comparison producing a single boolean.
    Compare(CompareOp),
    /// Selector-driven multiplexer with `data_inputs` data ports.
    Multiplexer {
        /// Number of data inputs (ports `1..=data_inputs`).
        data_inputs: u32,
    },
    /// Default value plus prioritized (condition, value) choices.
    PriorityConditional,
    /// A clocked register.
    Register,
    /// A memory array.
    Memory(MemoryConfig),
    /// A read and/or write port into a memory.
    MemPort(MemPortConfig),
    /// An I/O pin.
    Pin {
        /// Pin configuration.
        param: PinParameter,
        /// The pin's value type.
        ty: ConnectionType,
    },
    /// A black-box external module.
    External(ExternalDescriptor),
    /// Assertion / diagnostic tap on a signal.
    SignalTap(TapConfig),
    /// Splits simulation-time value from export-time value.
    ExportOverride,
    /// Attaches signal attributes to its driver.
    Attributes(crate::attributes::SignalAttributes),
    /// Attaches path attributes to a start–end pair of drivers.
    PathAttributes(crate::attributes::PathAttributes),
    /// Marks an intentional clock-domain crossing.
    Cdc(CdcParameter),
    /// Merges multiple drivers onto one wire (tri-state/inout).
    MultiDriver {
        /// Number of driving inputs.
        inputs: u32,
    },
}

impl NodeKind {
    /// A short name for diagnostics and export.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Signal => "signal",
            NodeKind::Constant { .. } => "constant",
            NodeKind::Rewire { .. } => "rewire",
            NodeKind::Arithmetic(ArithOp::Add) => "add",
            NodeKind::Arithmetic(ArithOp::Sub) => "sub",
            NodeKind::Arithmetic(ArithOp::Mul) => "mul",
            NodeKind::Arithmetic(ArithOp::Div) => "div",
            NodeKind::Arithmetic(ArithOp::Rem) => "rem",
            NodeKind::Logic(LogicOp::And) => "and",
            NodeKind::Logic(LogicOp::Nand) => "nand",
            NodeKind::Logic(LogicOp::Or) => "or",
            NodeKind::Logic(LogicOp::Nor) => "nor",
            NodeKind::Logic(LogicOp::Xor) => "xor",
            NodeKind::Logic(LogicOp::Xnor) => "xnor",
            NodeKind::Logic(LogicOp::Not) => "not",
            NodeKind::Compare(_) => "compare",
            NodeKind::Multiplexer { .. } => "mux",
            NodeKind::PriorityConditional => "prio_conditional",
            NodeKind::Register => "register",
            NodeKind::Memory(_) => "memory",
            NodeKind::MemPort(_) => "mem_port",
            NodeKind::Pin { .. } => "pin",
            NodeKind::External(_) => "external",
            NodeKind::SignalTap(_) => "signal_tap",
            NodeKind::ExportOverride => "export_override",
            NodeKind::Attributes(_) => "attributes",
            NodeKind::PathAttributes(_) => "path_attributes",
            NodeKind::Cdc(_) => "cdc",
            NodeKind::MultiDriver { .. } => "multi_driver",
        }
    }

    /// A human-readable name for an input port.
    pub fn input_name(&self, idx: u32) -> String {
        match self {
            NodeKind::Register => match idx {
                register::DATA => "data_in".into(),
                register::RESET_VALUE => "reset_value".into(),
                register::ENABLE => "enable".into(),
                _ => "invalid".into(),
            },
            NodeKind::PriorityConditional => {
                if idx == prio::DEFAULT {
                    "default".into()
                } else if idx % 2 == 1 {
                    format!("condition_{}", (idx - 1) / 2)
                } else {
                    format!("value_{}", (idx - 1) / 2)
                }
            }
            NodeKind::Multiplexer { .. } => {
                if idx == 0 {
                    "selector".into()
                } else {
                    format!("in_{}", idx - 1)
                }
            }
            NodeKind::MemPort(_) => match idx {
                mem_port::MEMORY => "memory".into(),
                mem_port::ADDRESS => "address".into(),
                mem_port::WR_DATA => "wr_data".into(),
                mem_port::WR_ENABLE => "wr_enable".into(),
                _ => "invalid".into(),
            },
            NodeKind::ExportOverride => match idx {
                export_override::SIM => "simulation".into(),
                export_override::EXPORT => "export".into(),
                _ => "invalid".into(),
            },
            NodeKind::External(desc) => desc
                .ins
                .get(idx as usize)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "invalid".into()),
            NodeKind::Logic(_) | NodeKind::Arithmetic(_) | NodeKind::Compare(_) => {
                if idx == 0 {
                    "a".into()
                } else {
                    "b".into()
                }
            }
            NodeKind::PathAttributes(_) => {
                if idx == 0 {
                    "start".into()
                } else {
                    "end".into()
                }
            }
            _ => format!("in_{idx}"),
        }
    }

    /// A human-readable name for an output port.
    pub fn output_name(&self, idx: u32) -> String {
        match self {
            NodeKind::Register => "data_out".into(),
            NodeKind::MemPort(_) => "rd_data".into(),
            NodeKind::External(desc) => desc
                .outs
                .get(idx as usize)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "invalid".into()),
            _ => "output".into(),
        }
    }
}

/// A node of the circuit graph.
///
/// Structure (port counts, output types, sinks) is managed through
/// [`Circuit`](crate::circuit::Circuit); the node itself exposes read-only
/// accessors plus freely settable name and comment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) inputs: Vec<Option<NodePort>>,
    pub(crate) outputs: Vec<OutputPort>,
    pub(crate) group: Option<GroupId>,
    pub(crate) clocks: Vec<Option<ClockId>>,
    /// User-facing name; signals carry the name of the aliased wire.
    pub name: String,
    /// Free-form comment carried into the exported HDL.
    pub comment: String,
    pub(crate) loc: SourceLoc,
}

impl Node {
    /// The node's operation.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Number of input ports.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output ports.
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// The driver of an input port, if connected.
    pub fn driver(&self, input: u32) -> Option<NodePort> {
        self.inputs.get(input as usize).copied().flatten()
    }

    /// The output port at `port`.
    ///
    /// # Panics
    ///
    /// Panics if the port index is out of range.
    pub fn output(&self, port: u32) -> &OutputPort {
        &self.outputs[port as usize]
    }

    /// All output ports in order.
    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    /// The group this node belongs to.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// The bound clocks, by clock port.
    pub fn clocks(&self) -> &[Option<ClockId>] {
        &self.clocks
    }

    /// The clock bound at `clock_port`, if any.
    pub fn clock(&self, clock_port: u32) -> Option<ClockId> {
        self.clocks.get(clock_port as usize).copied().flatten()
    }

    /// Where this node was created.
    pub fn loc(&self) -> &SourceLoc {
        &self.loc
    }

    /// Returns `true` for signal alias nodes.
    pub fn is_signal(&self) -> bool {
        matches!(self.kind, NodeKind::Signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewire_total_width() {
        let op = RewireOp::concat(&[4, 4]);
        assert_eq!(op.total_width(), 8);
        assert_eq!(op.num_inputs(), 2);
    }

    #[test]
    fn rewire_extract_is_bit_extract() {
        let op = RewireOp::extract(3, 1);
        assert_eq!(op.as_bit_extract(), Some(3));
        let wide = RewireOp::extract(0, 4);
        assert_eq!(wide.as_bit_extract(), None);
    }

    #[test]
    fn rewire_pad_zero() {
        let op = RewireOp::pad_zero(4, 4);
        assert_eq!(op.total_width(), 8);
        assert_eq!(op.num_inputs(), 1);
        // Padding occupies the most significant range.
        assert_eq!(op.ranges[0].source, RangeSource::Zero);
    }

    #[test]
    fn rewire_constant_only_has_no_inputs() {
        let op = RewireOp {
            ranges: vec![OutputRange {
                width: 8,
                source: RangeSource::One,
            }],
        };
        assert_eq!(op.num_inputs(), 0);
        assert_eq!(op.total_width(), 8);
    }

    #[test]
    fn logic_arity() {
        assert_eq!(LogicOp::Not.arity(), 1);
        assert_eq!(LogicOp::Xnor.arity(), 2);
    }

    #[test]
    fn prio_port_layout() {
        assert_eq!(prio::condition(0), 1);
        assert_eq!(prio::value(0), 2);
        assert_eq!(prio::condition(1), 3);
        assert_eq!(prio::value(1), 4);
        assert_eq!(prio::num_choices(5), 2);
        assert_eq!(prio::num_choices(1), 0);
    }

    #[test]
    fn register_port_names() {
        let kind = NodeKind::Register;
        assert_eq!(kind.input_name(register::DATA), "data_in");
        assert_eq!(kind.input_name(register::RESET_VALUE), "reset_value");
        assert_eq!(kind.input_name(register::ENABLE), "enable");
        assert_eq!(kind.output_name(0), "data_out");
    }

    #[test]
    fn prio_port_names() {
        let kind = NodeKind::PriorityConditional;
        assert_eq!(kind.input_name(0), "default");
        assert_eq!(kind.input_name(1), "condition_0");
        assert_eq!(kind.input_name(2), "value_0");
        assert_eq!(kind.input_name(3), "condition_1");
    }

    #[test]
    fn type_names() {
        assert_eq!(NodeKind::Logic(LogicOp::Xor).type_name(), "xor");
        assert_eq!(NodeKind::Register.type_name(), "register");
        assert_eq!(
            NodeKind::Multiplexer { data_inputs: 2 }.type_name(),
            "mux"
        );
    }
}
