//! Simulation processes as restartable coroutine state machines.
//!
//! A process is a chain of closures: an entry function plus a continuation
//! per suspension point. Each closure runs uninterrupted against a
//! [`SimProcessCtx`](crate::handle::SimProcessCtx) and returns the next
//! suspension. `abort()` drops pending continuations without resuming them.

use crate::handle::SimProcessCtx;
use silica_common::Rational;
use silica_hlim::ClockId;
use std::rc::Rc;

/// The continuation resumed after a suspension point.
pub type Continuation = Box<dyn FnOnce(&mut SimProcessCtx<'_>) -> ProcessStep>;

/// The restartable entry point of a process, invoked at every power-on.
pub type ProcessEntry = Rc<dyn Fn(&mut SimProcessCtx<'_>) -> ProcessStep>;

/// What a process does next.
pub enum ProcessStep {
    /// Resume after the given duration. A zero duration yields once within
    /// the same instant, after pending writes have propagated.
    WaitFor(Rational, Continuation),
    /// Resume at the given absolute time.
    WaitUntil(Rational, Continuation),
    /// Resume one instant after the next triggering edge of the clock, with
    /// advanced register values already observable.
    WaitClock(ClockId, Continuation),
    /// The process is finished.
    Done,
}

impl ProcessStep {
    /// Convenience constructor for [`ProcessStep::WaitFor`].
    pub fn wait_for(
        delta: Rational,
        cont: impl FnOnce(&mut SimProcessCtx<'_>) -> ProcessStep + 'static,
    ) -> Self {
        ProcessStep::WaitFor(delta, Box::new(cont))
    }

    /// Convenience constructor for [`ProcessStep::WaitUntil`].
    pub fn wait_until(
        time: Rational,
        cont: impl FnOnce(&mut SimProcessCtx<'_>) -> ProcessStep + 'static,
    ) -> Self {
        ProcessStep::WaitUntil(time, Box::new(cont))
    }

    /// Convenience constructor for [`ProcessStep::WaitClock`].
    pub fn wait_clock(
        clock: ClockId,
        cont: impl FnOnce(&mut SimProcessCtx<'_>) -> ProcessStep + 'static,
    ) -> Self {
        ProcessStep::WaitClock(clock, Box::new(cont))
    }
}
