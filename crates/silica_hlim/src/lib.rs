//! The circuit graph of the Silica hardware description library.
//!
//! Circuits are typed dataflow graphs: nodes carry indexed input ports (one
//! driver each) and output ports (many sinks each), grouped hierarchically
//! and clocked by a registry of hierarchical clocks. The [`Circuit`] owns
//! everything; construction happens through it so that wiring invariants and
//! type propagation hold at every step.

#![warn(missing_docs)]

pub mod attributes;
pub mod circuit;
pub mod clock;
pub mod error;
pub mod external;
pub mod group;
pub mod ids;
pub mod node;
pub mod scope;
pub mod types;

pub use attributes::{AttribValue, PathAttributes, SignalAttributes, VendorAttributes};
pub use circuit::Circuit;
pub use clock::{
    Clock, ClockKind, ClockRelation, RegisterAttributes, ResetType, TriggerEvent, UsageType,
};
pub use error::{DesignError, DesignErrorKind};
pub use external::{ExternalDescriptor, ExternalPort, GenericValue, OutputDomain};
pub use group::{GroupKind, NodeGroup};
pub use ids::{ClockId, EntityId, GroupId, NodeId, Registry};
pub use node::{
    ArithOp, CdcParameter, CompareOp, LogicOp, MemPortConfig, MemoryConfig, Node, NodeKind,
    NodePort, OutputKind, OutputPort, OutputRange, PinDirection, PinParameter, RangeSource,
    RewireOp, SinkRef, TapConfig, TapLevel,
};
pub use scope::{ClockScope, GroupScope};
pub use types::{ConnectionType, Interpretation};
