//! Simulation error types.
//!
//! [`SimError`] covers preconditions violated while compiling a circuit into
//! a program; like construction errors it carries a kind, a description, the
//! source location of the triggering node, and the involved ports.
//! [`RuntimeError`] covers failures while the simulation is running.

use silica_common::{Rational, SourceLoc};
use silica_hlim::{NodeId, NodePort};
use std::fmt;

/// The category of a program-compilation failure.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SimErrorKind {
    /// A cycle exists through immediate outputs only.
    CombinationalCycle,
    /// A value crosses clock domains without a crossing marker.
    UnmarkedCdc,
    /// A crossing marker's input does not belong to its declared input clock.
    CdcClockMismatch,
    /// A requested output cannot be resolved to simulation state.
    UnreachableOutput,
    /// A memory write port is not bound to a clock.
    MemoryPortWithoutClock,
    /// A register is not bound to a clock.
    MissingClock,
    /// A required input is unbound.
    UnboundInput,
    /// An external module input belongs to a different clock than declared.
    ExternalClockMismatch,
}

impl fmt::Display for SimErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimErrorKind::CombinationalCycle => "combinational cycle",
            SimErrorKind::UnmarkedCdc => "unmarked clock domain crossing",
            SimErrorKind::CdcClockMismatch => "crossing clock mismatch",
            SimErrorKind::UnreachableOutput => "unreachable output",
            SimErrorKind::MemoryPortWithoutClock => "memory port without clock",
            SimErrorKind::MissingClock => "missing clock",
            SimErrorKind::UnboundInput => "unbound input",
            SimErrorKind::ExternalClockMismatch => "external clock mismatch",
        };
        f.write_str(name)
    }
}

/// A precondition violated while compiling a circuit into a program.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind}: {message} (at {loc})")]
pub struct SimError {
    /// The failure category.
    pub kind: SimErrorKind,
    /// One-line description.
    pub message: String,
    /// Source location of the node that triggered the error.
    pub loc: SourceLoc,
    /// Ports involved in the failure, if any.
    pub ports: Vec<NodePort>,
}

impl SimError {
    /// Creates an error with no involved ports.
    pub fn new(kind: SimErrorKind, message: impl Into<String>, loc: SourceLoc) -> Self {
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

/// A failure raised while the simulation is running.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The per-instant process/reevaluation fixpoint did not converge.
    #[error("runaway reevaluation loop at t = {at} s (limit {limit})")]
    RunawayLoop {
        /// The simulation time at which the loop was cut off.
        at: Rational,
        /// The configured iteration limit.
        limit: u32,
    },

    /// A write was attempted through a handle that does not target an input pin.
    #[error("signal handle on output {port:?} is not writable")]
    NotWritable {
        /// The port the handle resolves to.
        port: NodePort,
    },

    /// A handle write carried a value of the wrong width.
    #[error("write of {got} bits to a {expected}-bit pin")]
    WidthMismatch {
        /// The pin width.
        expected: usize,
        /// The written width.
        got: usize,
    },

    /// A simulation assertion failed and the simulator is configured to halt.
    #[error("assertion failed: {message}")]
    AssertionFailed {
        /// The node that raised the assertion.
        node: NodeId,
        /// The assertion message.
        message: String,
    },

    /// A delayed annotation was scheduled before simulation time zero.
    #[error("annotation scheduled before t = 0")]
    AnnotationBeforeTimeZero,

    /// A delay in clock periods was requested on a clock with no static frequency.
    #[error("clock has no static frequency")]
    NoStaticFrequency,

    /// A queried output is not part of the compiled program.
    #[error("output {port:?} is not part of the compiled program")]
    UnknownOutput {
        /// The unknown port.
        port: NodePort,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_error_display() {
        let err = SimError::new(
            SimErrorKind::UnmarkedCdc,
            "register 'b' samples a value from another domain",
            SourceLoc::unknown(),
        );
        assert_eq!(
            err.to_string(),
            "unmarked clock domain crossing: register 'b' samples a value from another domain (at <unknown>:0:0)"
        );
    }

    #[test]
    fn runtime_error_display() {
        let err = RuntimeError::RunawayLoop {
            at: Rational::new(1, 100),
            limit: 64,
        };
        assert_eq!(
            err.to_string(),
            "runaway reevaluation loop at t = 1/100 s (limit 64)"
        );
    }
}
