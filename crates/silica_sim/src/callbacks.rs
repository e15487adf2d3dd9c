//! The simulator's reporting channel.
//!
//! Everything the simulation wants to tell the outside world — time ticks,
//! clock edges, messages from signal taps, annotations, handle traffic —
//! goes through registered [`SimulatorCallbacks`] implementations. The
//! dispatcher fans out to all of them and records assertion failures so the
//! run loop can halt when configured to.

use silica_common::{BitVectorState, Rational};
use silica_hlim::{ClockId, NodeId, NodePort};

/// Observer interface for simulation events. All methods default to no-ops.
pub trait SimulatorCallbacks {
    /// The simulation advanced to a new time.
    fn on_new_tick(&mut self, _time: &Rational) {}

    /// A clock produced an edge.
    fn on_clock(&mut self, _clock: ClockId, _rising: bool) {}

    /// A debug tap fired.
    fn on_debug_message(&mut self, _node: NodeId, _message: &str) {}

    /// A warning tap fired.
    fn on_warning(&mut self, _node: NodeId, _message: &str) {}

    /// An assertion tap fired.
    fn on_assert(&mut self, _node: NodeId, _message: &str) {}

    /// An annotation interval opened.
    fn on_annotation_start(&mut self, _time: &Rational, _id: &str, _desc: &str) {}

    /// An annotation interval closed.
    fn on_annotation_end(&mut self, _time: &Rational, _id: &str) {}

    /// A simulation process overrode an input pin.
    fn on_handle_overridden(&mut self, _port: NodePort, _state: &BitVectorState) {}

    /// A simulation process read a signal.
    fn on_handle_read(&mut self, _port: NodePort, _state: &BitVectorState) {}
}

/// What to do when an assertion tap fires.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopPolicy {
    /// Report through callbacks and keep simulating.
    Continue,
    /// Stop the current step with a runtime error.
    Halt,
}

/// Fans events out to all registered callbacks.
pub struct CallbackDispatcher {
    callbacks: Vec<Box<dyn SimulatorCallbacks>>,
    /// Assertion policy; `Halt` surfaces failures as runtime errors.
    pub assert_policy: StopPolicy,
    pub(crate) failed_assert: Option<(NodeId, String)>,
}

impl Default for CallbackDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackDispatcher {
    /// Creates a dispatcher with no callbacks and `Continue` policy.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            assert_policy: StopPolicy::Continue,
            failed_assert: None,
        }
    }

    /// Registers a callback sink.
    pub fn add(&mut self, callbacks: Box<dyn SimulatorCallbacks>) {
        self.callbacks.push(callbacks);
    }

    pub(crate) fn take_failed_assert(&mut self) -> Option<(NodeId, String)> {
        self.failed_assert.take()
    }
}

impl SimulatorCallbacks for CallbackDispatcher {
    fn on_new_tick(&mut self, time: &Rational) {
        for cb in &mut self.callbacks {
            cb.on_new_tick(time);
        }
    }

    fn on_clock(&mut self, clock: ClockId, rising: bool) {
        for cb in &mut self.callbacks {
            cb.on_clock(clock, rising);
        }
    }

    fn on_debug_message(&mut self, node: NodeId, message: &str) {
        for cb in &mut self.callbacks {
            cb.on_debug_message(node, message);
        }
    }

    fn on_warning(&mut self, node: NodeId, message: &str) {
        for cb in &mut self.callbacks {
            cb.on_warning(node, message);
        }
    }

    fn on_assert(&mut self, node: NodeId, message: &str) {
        for cb in &mut self.callbacks {
            cb.on_assert(node, message);
        }
        if self.assert_policy == StopPolicy::Halt && self.failed_assert.is_none() {
            self.failed_assert = Some((node, message.to_string()));
        }
    }

    fn on_annotation_start(&mut self, time: &Rational, id: &str, desc: &str) {
        for cb in &mut self.callbacks {
            cb.on_annotation_start(time, id, desc);
        }
    }

    fn on_annotation_end(&mut self, time: &Rational, id: &str) {
        for cb in &mut self.callbacks {
            cb.on_annotation_end(time, id);
        }
    }

    fn on_handle_overridden(&mut self, port: NodePort, state: &BitVectorState) {
        for cb in &mut self.callbacks {
            cb.on_handle_overridden(port, state);
        }
    }

    fn on_handle_read(&mut self, port: NodePort, state: &BitVectorState) {
        for cb in &mut self.callbacks {
            cb.on_handle_read(port, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silica_hlim::ids::NodeId;
    use silica_hlim::EntityId;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        asserts: Rc<RefCell<Vec<String>>>,
    }

    impl SimulatorCallbacks for Recorder {
        fn on_assert(&mut self, _node: NodeId, message: &str) {
            self.asserts.borrow_mut().push(message.to_string());
        }
    }

    #[test]
    fn dispatch_fans_out() {
        let log_a = Rc::new(RefCell::new(Vec::new()));
        let log_b = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = CallbackDispatcher::new();
        dispatcher.add(Box::new(Recorder {
            asserts: log_a.clone(),
        }));
        dispatcher.add(Box::new(Recorder {
            asserts: log_b.clone(),
        }));
        dispatcher.on_assert(NodeId::from_index(0), "boom");
        assert_eq!(log_a.borrow().as_slice(), ["boom"]);
        assert_eq!(log_b.borrow().as_slice(), ["boom"]);
    }

    #[test]
    fn halt_policy_records_first_failure() {
        let mut dispatcher = CallbackDispatcher::new();
        dispatcher.assert_policy = StopPolicy::Halt;
        dispatcher.on_assert(NodeId::from_index(1), "first");
        dispatcher.on_assert(NodeId::from_index(2), "second");
        let (node, message) = dispatcher.take_failed_assert().unwrap();
        assert_eq!(node, NodeId::from_index(1));
        assert_eq!(message, "first");
        assert!(dispatcher.take_failed_assert().is_none());
    }

    #[test]
    fn continue_policy_records_nothing() {
        let mut dispatcher = CallbackDispatcher::new();
        dispatcher.on_assert(NodeId::from_index(1), "ignored");
        assert!(dispatcher.take_failed_assert().is_none());
    }
}
