//! The event-driven simulation runtime.
//!
//! The simulator owns the compiled circuit, the packed state, an event queue
//! over clock edges, and the registered simulation processes. Each event
//! follows the same order: registers advance, combinatorics reevaluate,
//! processes wake in registration order, and writes re-trigger reevaluation
//! until a fixpoint (bounded by an iteration cap).

use crate::callbacks::{CallbackDispatcher, SimulatorCallbacks, StopPolicy};
use crate::error::{RuntimeError, SimError};
use crate::handle::{PinOverride, SigHandle, SimProcessCtx};
use crate::process::{Continuation, ProcessEntry, ProcessStep};
use crate::program::{DataState, Program};
use silica_common::{BitVectorState, Rational};
use silica_hlim::{Circuit, ClockId, ClockKind, NodePort, TriggerEvent};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

/// Default cap on process-wake/reevaluation rounds within one instant.
const DEFAULT_MAX_FIXPOINT_ITERATIONS: u32 = 64;

#[derive(Debug, Clone)]
enum EventKind {
    ClockEdge(ClockId),
    AnnotationStart { id: String, desc: String },
    AnnotationEnd { id: String },
}

#[derive(Debug, Clone)]
struct Event {
    time: Rational,
    seq: u64,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time).then(self.seq.cmp(&other.seq))
    }
}

enum Wake {
    At(Rational),
    Clock(ClockId),
}

struct Suspended {
    process: usize,
    wake: Wake,
    seq: u64,
    cont: Continuation,
}

/// The reference simulator.
pub struct Simulator {
    circuit: Circuit,
    program: Program,
    state: DataState,
    callbacks: CallbackDispatcher,
    time: Rational,
    events: BinaryHeap<Reverse<Event>>,
    event_seq: u64,
    clock_values: HashMap<ClockId, bool>,
    processes: Vec<ProcessEntry>,
    suspended: Vec<Suspended>,
    registration_seq: u64,
    overrides: Vec<PinOverride>,
    aborted: bool,
    max_fixpoint_iterations: u32,
}

impl Simulator {
    /// Compiles the circuit into a program and wraps it in a simulator.
    ///
    /// The circuit is owned from here on; it is treated as immutable.
    pub fn compile(
        circuit: Circuit,
        required_outputs: Option<&[NodePort]>,
    ) -> Result<Simulator, SimError> {
        let program = Program::compile(&circuit, required_outputs)?;
        Ok(Simulator {
            circuit,
            program,
            state: DataState::default(),
            callbacks: CallbackDispatcher::new(),
            time: Rational::zero(),
            events: BinaryHeap::new(),
            event_seq: 0,
            clock_values: HashMap::new(),
            processes: Vec::new(),
            suspended: Vec::new(),
            registration_seq: 0,
            overrides: Vec::new(),
            aborted: false,
            max_fixpoint_iterations: DEFAULT_MAX_FIXPOINT_ITERATIONS,
        })
    }

    /// The compiled circuit.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// The compiled program.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The current simulation time in seconds.
    pub fn current_time(&self) -> Rational {
        self.time
    }

    /// Registers a callback sink.
    pub fn add_callbacks(&mut self, callbacks: Box<dyn SimulatorCallbacks>) {
        self.callbacks.add(callbacks);
    }

    /// Sets the reaction to failed assertion taps.
    pub fn set_assert_policy(&mut self, policy: StopPolicy) {
        self.callbacks.assert_policy = policy;
    }

    /// Overrides the per-instant fixpoint iteration cap.
    pub fn set_max_fixpoint_iterations(&mut self, limit: u32) {
        self.max_fixpoint_iterations = limit;
    }

    /// Registers a simulation process. Processes start executing at
    /// [`power_on`](Simulator::power_on), in registration order.
    pub fn add_simulation_process(
        &mut self,
        entry: impl Fn(&mut SimProcessCtx<'_>) -> ProcessStep + 'static,
    ) {
        self.processes.push(Rc::new(entry));
    }

    /// Creates a handle for reading (and on input pins, writing) a signal.
    pub fn sig_handle(&self, port: NodePort) -> SigHandle {
        SigHandle::resolve(&self.circuit, port)
    }

    /// Resets the circuit and all simulation processes to the power-on state.
    ///
    /// Applies reset values, runs one reevaluation, schedules the first edge
    /// of every fixed-frequency clock, and starts every process until its
    /// first suspension.
    pub fn power_on(&mut self) -> Result<(), RuntimeError> {
        self.aborted = false;
        self.time = Rational::zero();
        self.events.clear();
        self.suspended.clear();
        self.overrides.clear();
        self.clock_values.clear();

        self.program.power_on(&self.circuit, &mut self.state.signal_state);

        let clocks: Vec<ClockId> = self.circuit.clocks().map(|(id, _)| id).collect();
        for clock in clocks {
            self.clock_values.insert(clock, false);
            if let Some(half) = self.half_period(clock) {
                self.push_event(half, EventKind::ClockEdge(clock));
            }
        }

        self.program
            .reevaluate(&self.circuit, &mut self.state.signal_state, &mut self.callbacks);

        for process in 0..self.processes.len() {
            let entry = self.processes[process].clone();
            self.run_step(process, |ctx| entry(ctx))?;
        }
        self.run_wakes(&[])?;
        self.check_asserts()
    }

    /// Forces one reevaluation of all combinatorics.
    pub fn reevaluate(&mut self) {
        self.apply_overrides();
        self.program
            .reevaluate(&self.circuit, &mut self.state.signal_state, &mut self.callbacks);
    }

    /// The time of the next pending event or wakeup.
    pub fn next_event_time(&self) -> Option<Rational> {
        let event = self.events.peek().map(|Reverse(e)| e.time);
        let wake = self
            .suspended
            .iter()
            .filter_map(|s| match s.wake {
                Wake::At(t) => Some(t),
                Wake::Clock(_) => None,
            })
            .min();
        match (event, wake) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Advances to the next event and processes it fully.
    ///
    /// Returns `false` if there was nothing to do (no events, or aborted).
    pub fn advance_event(&mut self) -> Result<bool, RuntimeError> {
        if self.aborted {
            return Ok(false);
        }
        let Some(next) = self.next_event_time() else {
            return Ok(false);
        };
        // A stale WaitUntil in the past fires now; time never moves backwards.
        let now = next.max(self.time);
        self.time = now;
        self.callbacks.on_new_tick(&now);

        // Pop every event scheduled for this instant.
        let mut triggered: Vec<ClockId> = Vec::new();
        while let Some(Reverse(event)) = self.events.peek() {
            if event.time != now {
                break;
            }
            let Reverse(event) = self.events.pop().expect("peeked");
            match event.kind {
                EventKind::ClockEdge(clock) => {
                    let value = !self.clock_values.get(&clock).copied().unwrap_or(false);
                    self.clock_values.insert(clock, value);
                    self.callbacks.on_clock(clock, value);
                    let trigger = self.circuit.clock(clock).trigger;
                    let fires = match trigger {
                        TriggerEvent::RisingEdge => value,
                        TriggerEvent::FallingEdge => !value,
                        TriggerEvent::BothEdges => true,
                    };
                    if fires {
                        triggered.push(clock);
                    }
                    if let Some(half) = self.half_period(clock) {
                        self.push_event(now + half, EventKind::ClockEdge(clock));
                    }
                }
                EventKind::AnnotationStart { id, desc } => {
                    self.callbacks.on_annotation_start(&now, &id, &desc);
                }
                EventKind::AnnotationEnd { id } => {
                    self.callbacks.on_annotation_end(&now, &id);
                }
            }
        }

        for &clock in &triggered {
            self.program
                .advance_clock(&self.circuit, &mut self.state.signal_state, clock);
        }
        self.program
            .reevaluate(&self.circuit, &mut self.state.signal_state, &mut self.callbacks);

        self.run_wakes(&triggered)?;
        self.check_asserts()?;
        Ok(true)
    }

    /// Advances the simulation by `delta` seconds, processing every event in
    /// that window, or until [`abort`](Simulator::abort) is called.
    pub fn advance(&mut self, delta: Rational) -> Result<(), RuntimeError> {
        let end = self.time + delta;
        while !self.aborted {
            match self.next_event_time() {
                Some(t) if t <= end => {
                    self.advance_event()?;
                }
                _ => break,
            }
        }
        if !self.aborted && self.time < end {
            self.time = end;
        }
        Ok(())
    }

    /// Aborts a running simulation mid-step. Suspended processes are dropped
    /// without being resumed.
    pub fn abort(&mut self) {
        self.aborted = true;
        self.suspended.clear();
    }

    /// Manually advances the latches of a clock (for signal-driven clocks
    /// that schedule no events of their own), then reevaluates.
    pub fn advance_clock(&mut self, clock: ClockId) {
        self.program
            .advance_clock(&self.circuit, &mut self.state.signal_state, clock);
        self.program
            .reevaluate(&self.circuit, &mut self.state.signal_state, &mut self.callbacks);
    }

    /// The current value of an output port, if it has simulation state.
    pub fn value_of_output(&self, port: NodePort) -> Option<BitVectorState> {
        self.program
            .value_of_output(&self.circuit, &self.state.signal_state, port)
    }

    /// The current level of a clock.
    pub fn value_of_clock(&self, clock: ClockId) -> Option<bool> {
        self.clock_values.get(&clock).copied()
    }

    /// Dispatches an annotation start at the current time.
    pub fn annotation_start(&mut self, id: &str, desc: &str) {
        let time = self.time;
        self.callbacks.on_annotation_start(&time, id, desc);
    }

    /// Dispatches an annotation end at the current time.
    pub fn annotation_end(&mut self, id: &str) {
        let time = self.time;
        self.callbacks.on_annotation_end(&time, id);
    }

    /// Schedules an annotation start at `now + cycles` periods of `clock`.
    /// Negative cycle counts may not reach before time zero.
    pub fn annotation_start_delayed(
        &mut self,
        id: &str,
        desc: &str,
        clock: ClockId,
        cycles: i64,
    ) -> Result<(), RuntimeError> {
        let time = self.delayed_time(clock, cycles)?;
        self.push_event(
            time,
            EventKind::AnnotationStart {
                id: id.to_string(),
                desc: desc.to_string(),
            },
        );
        Ok(())
    }

    /// Schedules an annotation end at `now + cycles` periods of `clock`.
    pub fn annotation_end_delayed(
        &mut self,
        id: &str,
        clock: ClockId,
        cycles: i64,
    ) -> Result<(), RuntimeError> {
        let time = self.delayed_time(clock, cycles)?;
        self.push_event(time, EventKind::AnnotationEnd { id: id.to_string() });
        Ok(())
    }

    fn delayed_time(&self, clock: ClockId, cycles: i64) -> Result<Rational, RuntimeError> {
        let period = self
            .circuit
            .clock_frequency(clock)
            .map_err(|_| RuntimeError::NoStaticFrequency)?
            .recip();
        let time = self.time + period * Rational::integer(cycles);
        if time.is_negative() {
            return Err(RuntimeError::AnnotationBeforeTimeZero);
        }
        Ok(time)
    }

    fn half_period(&self, clock: ClockId) -> Option<Rational> {
        match self.circuit.clock(clock).kind {
            ClockKind::SignalDriven => None,
            _ => {
                let freq = self.circuit.clock_frequency(clock).ok()?;
                Some((freq * Rational::integer(2)).recip())
            }
        }
    }

    fn push_event(&mut self, time: Rational, kind: EventKind) {
        let seq = self.event_seq;
        self.event_seq += 1;
        self.events.push(Reverse(Event { time, seq, kind }));
    }

    fn apply_overrides(&mut self) {
        let mapping = self.program.state_mapping();
        for PinOverride { node, value } in self.overrides.drain(..) {
            let Some(offsets) = mapping.internal_offsets.get(&node) else {
                continue;
            };
            self.state
                .signal_state
                .copy_range(offsets[0], &value, 0, value.len());
        }
    }

    /// Runs one process step, then propagates its writes so that the next
    /// process at the same instant observes them.
    fn run_step<F>(&mut self, process: usize, step_fn: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(&mut SimProcessCtx<'_>) -> ProcessStep,
    {
        let mut wrote = false;
        let step = {
            let mut ctx = SimProcessCtx {
                circuit: &self.circuit,
                program: &self.program,
                state: &mut self.state.signal_state,
                overrides: &mut self.overrides,
                callbacks: &mut self.callbacks,
                time: self.time,
                wrote: &mut wrote,
            };
            step_fn(&mut ctx)
        };
        if wrote {
            self.apply_overrides();
            self.program
                .reevaluate(&self.circuit, &mut self.state.signal_state, &mut self.callbacks);
        }
        let wake = match step {
            ProcessStep::WaitFor(delta, cont) => Some((Wake::At(self.time + delta), cont)),
            ProcessStep::WaitUntil(time, cont) => Some((Wake::At(time), cont)),
            ProcessStep::WaitClock(clock, cont) => Some((Wake::Clock(clock), cont)),
            ProcessStep::Done => None,
        };
        if let Some((wake, cont)) = wake {
            let seq = self.registration_seq;
            self.registration_seq += 1;
            self.suspended.push(Suspended {
                process,
                wake,
                seq,
                cont,
            });
        }
        Ok(())
    }

    /// Resumes every due process, re-running until no more processes are due
    /// at this instant. Each round past the cap is a runaway loop.
    fn run_wakes(&mut self, triggered: &[ClockId]) -> Result<(), RuntimeError> {
        let mut iterations = 0u32;
        let mut first_round = true;
        loop {
            let due = self.take_due(if first_round { triggered } else { &[] });
            first_round = false;
            if due.is_empty() {
                return Ok(());
            }
            for suspended in due {
                if self.aborted {
                    return Ok(());
                }
                let Suspended { process, cont, .. } = suspended;
                self.run_step(process, cont)?;
            }
            iterations += 1;
            if iterations > self.max_fixpoint_iterations {
                return Err(RuntimeError::RunawayLoop {
                    at: self.time,
                    limit: self.max_fixpoint_iterations,
                });
            }
        }
    }

    /// Removes and returns the suspended processes due now, in registration
    /// order.
    fn take_due(&mut self, triggered: &[ClockId]) -> Vec<Suspended> {
        let now = self.time;
        let mut due = Vec::new();
        let mut keep = Vec::new();
        for suspended in self.suspended.drain(..) {
            let is_due = match suspended.wake {
                Wake::At(t) => t <= now,
                Wake::Clock(clock) => triggered.contains(&clock),
            };
            if is_due {
                due.push(suspended);
            } else {
                keep.push(suspended);
            }
        }
        self.suspended = keep;
        due.sort_by_key(|s| s.seq);
        due
    }

    fn check_asserts(&mut self) -> Result<(), RuntimeError> {
        match self.callbacks.take_failed_assert() {
            Some((node, message)) => Err(RuntimeError::AssertionFailed { node, message }),
            None => Ok(()),
        }
    }
}
