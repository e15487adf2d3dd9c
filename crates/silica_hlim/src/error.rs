//! Construction-time error reporting.
//!
//! Every design error carries a kind, a one-line description, the source
//! location of the node that triggered it, and the involved ports. Errors
//! are raised eagerly at the offending API call and never recovered from
//! internally.

use crate::node::NodePort;
use silica_common::SourceLoc;
use std::fmt;

/// The category of a design rule violation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DesignErrorKind {
    /// A signal or port was declared with zero width.
    ZeroWidth,
    /// Operands with incompatible interpretations were combined.
    MismatchedInterpretation,
    /// A connection would silently change an already-consumed output type.
    TypeConflict,
    /// A constant's bits do not match its declared type.
    InvalidConstant,
    /// A rewire operation is inconsistent with its declared output.
    InvalidRewire,
    /// A port index is out of range for the node.
    InvalidPort,
    /// A clock was bound where the node admits none, or rebound conflictingly.
    ConflictingClockBinding,
    /// The frequency of a signal-driven clock was queried.
    UnknownFrequency,
    /// A cycle exists through immediate outputs only.
    CombinationalCycle,
    /// A required input is not driven.
    UnboundInput,
    /// An external module declaration is inconsistent.
    InvalidExternal,
}

impl fmt::Display for DesignErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DesignErrorKind::ZeroWidth => "zero width",
            DesignErrorKind::MismatchedInterpretation => "mismatched interpretation",
            DesignErrorKind::TypeConflict => "type conflict",
            DesignErrorKind::InvalidConstant => "invalid constant",
            DesignErrorKind::InvalidRewire => "invalid rewire",
            DesignErrorKind::InvalidPort => "invalid port",
            DesignErrorKind::ConflictingClockBinding => "conflicting clock binding",
            DesignErrorKind::UnknownFrequency => "unknown frequency",
            DesignErrorKind::CombinationalCycle => "combinational cycle",
            DesignErrorKind::UnboundInput => "unbound input",
            DesignErrorKind::InvalidExternal => "invalid external module",
        };
        f.write_str(name)
    }
}

/// A user-facing contract violation during circuit construction.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind}: {message} (at {loc})")]
pub struct DesignError {
    /// The violation category.
    pub kind: DesignErrorKind,
    /// One-line description.
    pub message: String,
    /// Source location of the node that triggered the error.
    pub loc: SourceLoc,
    /// Ports involved in the violation, if any.
    pub ports: Vec<NodePort>,
}

impl DesignError {
    /// Creates an error with no involved ports.
    pub fn new(kind: DesignErrorKind, message: impl Into<String>, loc: SourceLoc) -> Self {
        Self {
            kind,
            message: message.into(),
            loc,
            ports: Vec::new(),
        }
    }

    /// Attaches the involved ports.
    pub fn with_ports(mut self, ports: Vec<NodePort>) -> Self {
        self.ports = ports;
        self
    }
}
