//! Signal handles: the read/write surface of simulation processes.
//!
//! A [`SigHandle`] resolves a circuit port once at creation. Handles on
//! input pins are writable; writes queue an override that takes effect at
//! the next reevaluation within the same instant. Everything else is
//! read-only.

use crate::callbacks::{CallbackDispatcher, SimulatorCallbacks};
use crate::error::RuntimeError;
use crate::program::Program;
use silica_common::{BitVectorState, Rational};
use silica_hlim::{Circuit, NodeId, NodePort};

/// A queued input-pin override.
pub(crate) struct PinOverride {
    pub node: NodeId,
    pub value: BitVectorState,
}

/// The execution context handed to a running simulation process.
///
/// Borrowed from the simulator for the duration of one process step; all
/// signal traffic of the process goes through it.
pub struct SimProcessCtx<'a> {
    pub(crate) circuit: &'a Circuit,
    pub(crate) program: &'a Program,
    pub(crate) state: &'a mut BitVectorState,
    pub(crate) overrides: &'a mut Vec<PinOverride>,
    pub(crate) callbacks: &'a mut CallbackDispatcher,
    pub(crate) time: Rational,
    pub(crate) wrote: &'a mut bool,
}

impl SimProcessCtx<'_> {
    /// The current simulation time in seconds.
    pub fn time(&self) -> Rational {
        self.time
    }
}

/// A runtime handle for reading (and, for input pins, writing) a signal.
#[derive(Clone, Debug)]
pub struct SigHandle {
    port: NodePort,
    writable_pin: Option<NodeId>,
}

impl SigHandle {
    /// Resolves a port against the circuit. Signal aliases are traversed;
    /// a handle on an input (or bidirectional) pin is writable.
    pub(crate) fn resolve(circuit: &Circuit, port: NodePort) -> SigHandle {
        let resolved = if circuit.node(port.node).is_signal() {
            circuit.non_signal_driver(port.node, 0).unwrap_or(port)
        } else {
            port
        };
        // Only input pins carry an override buffer.
        let writable_pin = match circuit.node(resolved.node).kind() {
            silica_hlim::NodeKind::Pin { param, .. }
                if param.direction == silica_hlim::PinDirection::Input =>
            {
                Some(resolved.node)
            }
            _ => None,
        };
        SigHandle {
            port: resolved,
            writable_pin,
        }
    }

    /// The resolved port this handle reads.
    pub fn port(&self) -> NodePort {
        self.port
    }

    /// Whether writes through this handle are accepted.
    pub fn is_writable(&self) -> bool {
        self.writable_pin.is_some()
    }

    /// Reads the current simulated value.
    ///
    /// An output the program did not allocate reads as fully undefined.
    pub fn read(&self, ctx: &mut SimProcessCtx<'_>) -> BitVectorState {
        let width = ctx.circuit.node(self.port.node).output(self.port.port).ty.width as usize;
        let value = match ctx.program.offset_of(self.port) {
            Some(offset) => ctx.state.extract(offset, width),
            None => BitVectorState::undefined(width),
        };
        ctx.callbacks.on_handle_read(self.port, &value);
        value
    }

    /// Queues an input-pin override; it takes effect at the next
    /// reevaluation within the same instant.
    pub fn write(&self, ctx: &mut SimProcessCtx<'_>, value: BitVectorState) -> Result<(), RuntimeError> {
        let Some(pin) = self.writable_pin else {
            return Err(RuntimeError::NotWritable { port: self.port });
        };
        let width = ctx.circuit.node(self.port.node).output(self.port.port).ty.width as usize;
        if value.len() != width {
            return Err(RuntimeError::WidthMismatch {
                expected: width,
                got: value.len(),
            });
        }
        ctx.callbacks.on_handle_overridden(self.port, &value);
        ctx.overrides.push(PinOverride { node: pin, value });
        *ctx.wrote = true;
        Ok(())
    }
}
