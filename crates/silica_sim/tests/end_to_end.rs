//! End-to-end simulation scenarios exercising the full pipeline: circuit
//! construction, program compilation, event-driven simulation, and the
//! simulation-process API.

use silica_common::{BitVectorState, Rational};
use silica_hlim::node::{prio, register};
use silica_hlim::{
    ArithOp, CdcParameter, Circuit, Clock, ConnectionType, NodeId, NodeKind, NodePort,
    PinParameter, RewireOp, TapConfig, TapLevel,
};
use silica_sim::{ProcessStep, RuntimeError, SimErrorKind, Simulator, StopPolicy};
use std::cell::RefCell;
use std::rc::Rc;

fn out(node: NodeId) -> NodePort {
    NodePort { node, port: 0 }
}

fn constant(circuit: &mut Circuit, value: u64, ty: ConnectionType) -> NodeId {
    circuit
        .create_node(NodeKind::Constant {
            value: BitVectorState::from_u64(value, ty.width as usize),
            ty,
        })
        .unwrap()
}

fn nanoseconds(ns: i64) -> Rational {
    Rational::new(ns, 1_000_000_000)
}

/// A 4-bit counter: q + 1 -> q, reset value 0, 100 MHz rising-edge clock
/// with synchronous active-high reset and initialized registers.
fn ripple_counter() -> (Simulator, NodePort) {
    let mut circuit = Circuit::new();
    let clk = circuit.create_clock(Clock::root("clk", Rational::integer(100_000_000)));
    let one = constant(&mut circuit, 1, ConnectionType::unsigned(4));
    let zero = constant(&mut circuit, 0, ConnectionType::unsigned(4));
    let reg = circuit.create_node(NodeKind::Register).unwrap();
    circuit.bind_clock(reg, 0, clk).unwrap();
    let add = circuit.create_node(NodeKind::Arithmetic(ArithOp::Add)).unwrap();
    circuit.connect(out(reg), add, 0).unwrap();
    circuit.connect(out(one), add, 1).unwrap();
    circuit.connect(out(add), reg, register::DATA).unwrap();
    circuit.connect(out(zero), reg, register::RESET_VALUE).unwrap();
    circuit.node_mut(reg).name = "q".into();

    let q = out(reg);
    let sim = Simulator::compile(circuit, Some(&[q])).unwrap();
    (sim, q)
}

#[test]
fn ripple_counter_counts_on_rising_edges() {
    let (mut sim, q) = ripple_counter();
    sim.power_on().unwrap();
    assert_eq!(sim.value_of_output(q).unwrap().to_u64(), Some(0));

    // The clock starts low; edges alternate every half period (5 ns).
    let mut observed = Vec::new();
    while observed.len() < 5 {
        sim.advance_event().unwrap();
        let clk = sim.circuit().clocks().next().unwrap().0;
        if sim.value_of_clock(clk) == Some(true) {
            observed.push(sim.value_of_output(q).unwrap().to_u64().unwrap());
        }
    }
    assert_eq!(observed, vec![1, 2, 3, 4, 5]);
}

#[test]
fn ripple_counter_advance_by_duration() {
    let (mut sim, q) = ripple_counter();
    sim.power_on().unwrap();
    // 52 ns cover the rising edges at 5, 15, 25, 35, and 45 ns.
    sim.advance(nanoseconds(52)).unwrap();
    assert_eq!(sim.value_of_output(q).unwrap().to_u64(), Some(5));
    assert_eq!(sim.current_time(), nanoseconds(52));
}

#[test]
fn power_on_is_reproducible() {
    let (mut a, qa) = ripple_counter();
    let (mut b, qb) = ripple_counter();
    a.power_on().unwrap();
    b.power_on().unwrap();
    assert_eq!(a.value_of_output(qa), b.value_of_output(qb));
}

/// Two processes meeting at t = 10 ns: the writer runs first (registration
/// order), so the reader observes the written value plus one.
#[test]
fn rendezvous_preserves_registration_order() {
    let mut circuit = Circuit::new();
    let pin_a = circuit
        .create_node(NodeKind::Pin {
            param: PinParameter::input(),
            ty: ConnectionType::unsigned(4),
        })
        .unwrap();
    circuit.node_mut(pin_a).name = "a".into();
    let one = constant(&mut circuit, 1, ConnectionType::unsigned(4));
    let add = circuit.create_node(NodeKind::Arithmetic(ArithOp::Add)).unwrap();
    circuit.connect(out(pin_a), add, 0).unwrap();
    circuit.connect(out(one), add, 1).unwrap();
    let b = out(add);

    let mut sim = Simulator::compile(circuit, None).unwrap();
    let handle_a = sim.sig_handle(out(pin_a));
    let handle_b = sim.sig_handle(b);
    let t = nanoseconds(10);

    sim.add_simulation_process(move |_ctx| {
        let handle = handle_a.clone();
        ProcessStep::wait_until(t, move |ctx| {
            handle.write(ctx, BitVectorState::from_u64(3, 4)).unwrap();
            ProcessStep::Done
        })
    });
    let seen = Rc::new(RefCell::new(None));
    let seen_in = seen.clone();
    sim.add_simulation_process(move |_ctx| {
        let handle = handle_b.clone();
        let seen = seen_in.clone();
        ProcessStep::wait_until(t, move |ctx| {
            *seen.borrow_mut() = Some(handle.read(ctx));
            ProcessStep::Done
        })
    });

    sim.power_on().unwrap();
    sim.advance(nanoseconds(20)).unwrap();
    assert_eq!(seen.borrow().as_ref().unwrap().to_u64(), Some(4));
}

/// With the reader registered first, the write has not propagated when the
/// reader runs: the value is undefined.
#[test]
fn rendezvous_reversed_order_reads_undefined() {
    let mut circuit = Circuit::new();
    let pin_a = circuit
        .create_node(NodeKind::Pin {
            param: PinParameter::input(),
            ty: ConnectionType::unsigned(4),
        })
        .unwrap();
    let one = constant(&mut circuit, 1, ConnectionType::unsigned(4));
    let add = circuit.create_node(NodeKind::Arithmetic(ArithOp::Add)).unwrap();
    circuit.connect(out(pin_a), add, 0).unwrap();
    circuit.connect(out(one), add, 1).unwrap();
    let b = out(add);

    let mut sim = Simulator::compile(circuit, None).unwrap();
    let handle_a = sim.sig_handle(out(pin_a));
    let handle_b = sim.sig_handle(b);
    let t = nanoseconds(10);

    let seen = Rc::new(RefCell::new(None));
    let seen_in = seen.clone();
    sim.add_simulation_process(move |_ctx| {
        let handle = handle_b.clone();
        let seen = seen_in.clone();
        ProcessStep::wait_until(t, move |ctx| {
            *seen.borrow_mut() = Some(handle.read(ctx));
            ProcessStep::Done
        })
    });
    sim.add_simulation_process(move |_ctx| {
        let handle = handle_a.clone();
        ProcessStep::wait_until(t, move |ctx| {
            handle.write(ctx, BitVectorState::from_u64(3, 4)).unwrap();
            ProcessStep::Done
        })
    });

    sim.power_on().unwrap();
    sim.advance(nanoseconds(20)).unwrap();
    assert_eq!(seen.borrow().as_ref().unwrap().to_u64(), None);
}

fn priority_mux(c0: u64, c1: u64) -> u64 {
    let mut circuit = Circuit::new();
    let default = constant(&mut circuit, 0xAA, ConnectionType::raw(8));
    let v0 = constant(&mut circuit, 0x11, ConnectionType::raw(8));
    let v1 = constant(&mut circuit, 0x22, ConnectionType::raw(8));
    let c0 = constant(&mut circuit, c0, ConnectionType::bool());
    let c1 = constant(&mut circuit, c1, ConnectionType::bool());
    let node = circuit.create_node(NodeKind::PriorityConditional).unwrap();
    circuit.connect(out(default), node, prio::DEFAULT).unwrap();
    circuit.add_choice(node, out(c0), out(v0)).unwrap();
    circuit.add_choice(node, out(c1), out(v1)).unwrap();

    let mut sim = Simulator::compile(circuit, None).unwrap();
    sim.power_on().unwrap();
    sim.value_of_output(out(node)).unwrap().to_u64().unwrap()
}

#[test]
fn priority_conditional_picks_first_true_choice() {
    assert_eq!(priority_mux(0, 1), 0x22);
    assert_eq!(priority_mux(1, 1), 0x11);
    assert_eq!(priority_mux(0, 0), 0xAA);
}

#[test]
fn rewire_concatenates_most_significant_first() {
    let mut circuit = Circuit::new();
    let a = constant(&mut circuit, 0b0011, ConnectionType::raw(4));
    let b = constant(&mut circuit, 0b1100, ConnectionType::raw(4));
    let rewire = circuit
        .create_node(NodeKind::Rewire {
            op: RewireOp::concat(&[4, 4]),
            ty: ConnectionType::raw(8),
        })
        .unwrap();
    // Range 0 (most significant) comes from input 0 = b, range 1 from a.
    circuit.connect(out(b), rewire, 0).unwrap();
    circuit.connect(out(a), rewire, 1).unwrap();

    let mut sim = Simulator::compile(circuit, None).unwrap();
    sim.power_on().unwrap();
    assert_eq!(
        sim.value_of_output(out(rewire)).unwrap().to_u64(),
        Some(0b1100_0011)
    );
}

#[test]
fn unmarked_crossing_fails_marked_succeeds() {
    let build = |with_marker: bool| {
        let mut circuit = Circuit::new();
        let clk_a = circuit.create_clock(Clock::root("clk_a", Rational::integer(100_000_000)));
        let clk_b = circuit.create_clock(Clock::root("clk_b", Rational::integer(33_000_000)));
        let zero = constant(&mut circuit, 0, ConnectionType::raw(4));
        let reg_a = circuit.create_node(NodeKind::Register).unwrap();
        circuit.bind_clock(reg_a, 0, clk_a).unwrap();
        circuit.connect(out(zero), reg_a, register::DATA).unwrap();
        let source = if with_marker {
            let marker = circuit
                .create_node(NodeKind::Cdc(CdcParameter::default()))
                .unwrap();
            circuit
                .bind_clock(marker, silica_hlim::node::cdc::INPUT_CLOCK, clk_a)
                .unwrap();
            circuit
                .bind_clock(marker, silica_hlim::node::cdc::OUTPUT_CLOCK, clk_b)
                .unwrap();
            circuit.connect(out(reg_a), marker, 0).unwrap();
            out(marker)
        } else {
            out(reg_a)
        };
        let reg_b = circuit.create_node(NodeKind::Register).unwrap();
        circuit.bind_clock(reg_b, 0, clk_b).unwrap();
        circuit.connect(source, reg_b, register::DATA).unwrap();
        (Simulator::compile(circuit, None), reg_a, reg_b)
    };

    let (unmarked, reg_a, reg_b) = build(false);
    let err = unmarked.err().unwrap();
    assert_eq!(err.kind, SimErrorKind::UnmarkedCdc);
    assert!(err.ports.contains(&out(reg_a)));
    assert!(err.ports.contains(&out(reg_b)));

    let (marked, _, _) = build(true);
    assert!(marked.is_ok());
}

#[test]
fn wait_for_zero_observes_same_instant_writes() {
    let mut circuit = Circuit::new();
    let pin = circuit
        .create_node(NodeKind::Pin {
            param: PinParameter::input(),
            ty: ConnectionType::raw(8),
        })
        .unwrap();

    let mut sim = Simulator::compile(circuit, None).unwrap();
    let handle = sim.sig_handle(out(pin));
    let seen = Rc::new(RefCell::new(None));
    let seen_in = seen.clone();

    // One process: write, then yield for zero time, then read back.
    sim.add_simulation_process(move |ctx| {
        let handle = handle.clone();
        let seen = seen_in.clone();
        handle.write(ctx, BitVectorState::from_u64(0x5A, 8)).unwrap();
        ProcessStep::wait_for(Rational::zero(), move |ctx| {
            *seen.borrow_mut() = Some(handle.read(ctx));
            ProcessStep::Done
        })
    });
    sim.power_on().unwrap();
    sim.advance(nanoseconds(1)).unwrap();
    assert_eq!(seen.borrow().as_ref().unwrap().to_u64(), Some(0x5A));
}

#[test]
fn wait_clock_observes_advanced_registers() {
    let (mut sim, q) = ripple_counter();
    let clk = sim.circuit().clocks().next().unwrap().0;
    let handle = sim.sig_handle(q);
    let seen = Rc::new(RefCell::new(None));
    let seen_in = seen.clone();
    sim.add_simulation_process(move |_ctx| {
        let handle = handle.clone();
        let seen = seen_in.clone();
        ProcessStep::wait_clock(clk, move |ctx| {
            *seen.borrow_mut() = Some(handle.read(ctx));
            ProcessStep::Done
        })
    });
    sim.power_on().unwrap();
    sim.advance(nanoseconds(7)).unwrap(); // past the first rising edge
    assert_eq!(seen.borrow().as_ref().unwrap().to_u64(), Some(1));
}

#[test]
fn runaway_yield_loop_is_cut_off() {
    let circuit = Circuit::new();
    let mut sim = Simulator::compile(circuit, None).unwrap();
    fn spin(_ctx: &mut silica_sim::SimProcessCtx<'_>) -> ProcessStep {
        ProcessStep::wait_for(Rational::zero(), spin)
    }
    sim.add_simulation_process(spin);
    let err = sim.power_on().unwrap_err();
    assert!(matches!(err, RuntimeError::RunawayLoop { limit: 64, .. }));
}

#[test]
fn writes_to_non_pins_are_rejected() {
    let mut circuit = Circuit::new();
    let k = constant(&mut circuit, 1, ConnectionType::raw(4));
    let mut sim = Simulator::compile(circuit, None).unwrap();
    let handle = sim.sig_handle(out(k));
    assert!(!handle.is_writable());

    let failed = Rc::new(RefCell::new(false));
    let failed_in = failed.clone();
    sim.add_simulation_process(move |ctx| {
        let result = handle.write(ctx, BitVectorState::from_u64(0, 4));
        *failed_in.borrow_mut() = matches!(result, Err(RuntimeError::NotWritable { .. }));
        ProcessStep::Done
    });
    sim.power_on().unwrap();
    assert!(*failed.borrow());
}

#[test]
fn failed_assert_halts_when_configured() {
    let mut circuit = Circuit::new();
    let never = constant(&mut circuit, 0, ConnectionType::bool());
    let tap = circuit
        .create_node(NodeKind::SignalTap(TapConfig {
            level: TapLevel::Assert,
            message: "condition violated".into(),
        }))
        .unwrap();
    circuit.connect(out(never), tap, 0).unwrap();

    let mut sim = Simulator::compile(circuit, None).unwrap();
    sim.set_assert_policy(StopPolicy::Halt);
    let err = sim.power_on().unwrap_err();
    match err {
        RuntimeError::AssertionFailed { message, .. } => {
            assert_eq!(message, "condition violated");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn abort_drops_suspended_processes() {
    let (mut sim, _) = ripple_counter();
    let resumed = Rc::new(RefCell::new(false));
    let resumed_in = resumed.clone();
    sim.add_simulation_process(move |_ctx| {
        let resumed = resumed_in.clone();
        ProcessStep::wait_until(nanoseconds(100), move |_ctx| {
            *resumed.borrow_mut() = true;
            ProcessStep::Done
        })
    });
    sim.power_on().unwrap();
    sim.advance(nanoseconds(3)).unwrap();
    sim.abort();
    sim.advance(nanoseconds(500)).unwrap();
    assert!(!*resumed.borrow());
}

#[test]
fn identical_runs_stay_identical() {
    let (mut a, qa) = ripple_counter();
    let (mut b, qb) = ripple_counter();
    a.power_on().unwrap();
    b.power_on().unwrap();
    a.advance(nanoseconds(42)).unwrap();
    b.advance(nanoseconds(42)).unwrap();
    assert_eq!(a.value_of_output(qa), b.value_of_output(qb));
    assert_eq!(a.current_time(), b.current_time());
}
