//! Export scenarios: rendered entity text, file layout, and the SDC
//! side-file.

use silica_common::{BitVectorState, Rational};
use silica_hlim::node::register;
use silica_hlim::{
    ArithOp, CdcParameter, Circuit, Clock, ConnectionType, GroupKind, NodeId, NodeKind, NodePort,
    PinParameter,
};
use silica_vhdl::VhdlExport;

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

fn input_pin(circuit: &mut Circuit, name: &str, ty: ConnectionType) -> NodeId {
    let pin = circuit
        .create_node(NodeKind::Pin {
            param: PinParameter::input(),
            ty,
        })
        .unwrap();
    circuit.node_mut(pin).name = name.into();
    pin
}

/// An 8-bit register with synchronous reset and enable, clocked by `clk`.
fn register_circuit() -> Circuit {
    let mut circuit = Circuit::new();
    let clk = circuit.create_clock(
        Clock::root("clk", Rational::integer(100_000_000)).with_reset_name("rst"),
    );
    let d = input_pin(&mut circuit, "d", ConnectionType::raw(8));
    let en = input_pin(&mut circuit, "en", ConnectionType::bool());
    let zero = constant(&mut circuit, 0, ConnectionType::raw(8));
    let reg = circuit.create_node(NodeKind::Register).unwrap();
    circuit.bind_clock(reg, 0, clk).unwrap();
    circuit.connect(out(d), reg, register::DATA).unwrap();
    circuit.connect(out(zero), reg, register::RESET_VALUE).unwrap();
    circuit.connect(out(en), reg, register::ENABLE).unwrap();
    circuit.node_mut(reg).name = "q".into();
    // Consume the register so it surfaces as a local signal.
    let tap = circuit.create_node(NodeKind::Signal).unwrap();
    circuit.connect(out(reg), tap, 0).unwrap();
    circuit
}

#[test]
fn register_renders_clocked_process() {
    let circuit = register_circuit();
    let files = VhdlExport::new("unused").render(&circuit).unwrap();
    assert_eq!(files.len(), 1);
    let (name, text) = &files[0];
    assert_eq!(name, "top");

    assert!(text.contains("ENTITY top IS"), "{text}");
    assert!(text.contains("clk : IN STD_LOGIC"), "{text}");
    assert!(text.contains("rst : IN STD_LOGIC"), "{text}");
    assert!(text.contains("d : IN STD_LOGIC_VECTOR(7 downto 0)"), "{text}");
    assert!(text.contains("en : IN STD_LOGIC"), "{text}");
    assert!(text.contains("SIGNAL q : STD_LOGIC_VECTOR(7 downto 0);"), "{text}");
    assert!(text.contains("IF rising_edge(clk) THEN"), "{text}");
    assert!(text.contains("IF rst = '1' THEN"), "{text}");
    assert!(text.contains("q <= \"00000000\";"), "{text}");
    assert!(text.contains("ELSIF en = '1' THEN"), "{text}");
    assert!(text.contains("q <= d;"), "{text}");
}

#[test]
fn file_header_marks_generated_output() {
    let circuit = register_circuit();
    let files = VhdlExport::new("unused").render(&circuit).unwrap();
    assert!(files[0].1.starts_with("-- This file was auto-generated"));
}

#[test]
fn run_writes_one_file_per_entity() {
    let mut circuit = Circuit::new();
    let child = circuit.add_child_group(circuit.root_group(), GroupKind::Entity, "adder");
    let a = input_pin(&mut circuit, "a", ConnectionType::unsigned(4));
    let b = input_pin(&mut circuit, "b", ConnectionType::unsigned(4));
    let add = circuit
        .create_node_in(child, NodeKind::Arithmetic(ArithOp::Add))
        .unwrap();
    circuit.connect(out(a), add, 0).unwrap();
    circuit.connect(out(b), add, 1).unwrap();
    // Consume the sum at the top level.
    let not = circuit
        .create_node(NodeKind::Logic(silica_hlim::LogicOp::Not))
        .unwrap();
    circuit.connect(out(add), not, 0).unwrap();

    let dir = tempfile::tempdir().unwrap();
    VhdlExport::new(dir.path()).run(&circuit).unwrap();

    let top = std::fs::read_to_string(dir.path().join("top.vhd")).unwrap();
    let adder = std::fs::read_to_string(dir.path().join("top/adder.vhd")).unwrap();
    assert!(top.contains("ENTITY top IS"));
    assert!(adder.contains("ENTITY adder IS"));
    // The sum leaves the child entity through a port and the parent
    // instantiates the child.
    assert!(adder.contains(" : OUT UNSIGNED(3 downto 0)"), "{adder}");
    assert!(top.contains("ENTITY work.adder"), "{top}");
    assert!(top.contains("PORT MAP("), "{top}");
}

#[test]
fn crossing_markers_emit_sdc() {
    let mut circuit = Circuit::new();
    let clk_a = circuit.create_clock(Clock::root("clk_a", Rational::integer(100_000_000)));
    let clk_b = circuit.create_clock(Clock::root("clk_b", Rational::integer(25_000_000)));
    let zero = constant(&mut circuit, 0, ConnectionType::raw(4));
    let reg_a = circuit.create_node(NodeKind::Register).unwrap();
    circuit.bind_clock(reg_a, 0, clk_a).unwrap();
    circuit.connect(out(zero), reg_a, register::DATA).unwrap();
    circuit.node_mut(reg_a).name = "src".into();
    let marker = circuit
        .create_node(NodeKind::Cdc(CdcParameter {
            max_skew: Some(1.0),
            net_delay: Some(0.5),
            is_gray_coded: Some(false),
        }))
        .unwrap();
    circuit
        .bind_clock(marker, silica_hlim::node::cdc::INPUT_CLOCK, clk_a)
        .unwrap();
    circuit
        .bind_clock(marker, silica_hlim::node::cdc::OUTPUT_CLOCK, clk_b)
        .unwrap();
    circuit.connect(out(reg_a), marker, 0).unwrap();
    circuit.node_mut(marker).name = "dst".into();
    let reg_b = circuit.create_node(NodeKind::Register).unwrap();
    circuit.bind_clock(reg_b, 0, clk_b).unwrap();
    circuit.connect(out(marker), reg_b, register::DATA).unwrap();

    let dir = tempfile::tempdir().unwrap();
    VhdlExport::new(dir.path()).run(&circuit).unwrap();

    let sdc = std::fs::read_to_string(dir.path().join("top.sdc")).unwrap();
    assert!(sdc.contains("set_max_skew"), "{sdc}");
    assert!(sdc.contains("set_net_delay"), "{sdc}");
    assert!(sdc.contains("src"), "{sdc}");
    assert!(sdc.contains("dst"), "{sdc}");
}

#[test]
fn colliding_names_get_suffixes() {
    let mut circuit = Circuit::new();
    let clk = circuit.create_clock(Clock::root("clk", Rational::integer(1_000_000)));
    let zero = constant(&mut circuit, 0, ConnectionType::raw(4));
    for _ in 0..2 {
        let reg = circuit.create_node(NodeKind::Register).unwrap();
        circuit.bind_clock(reg, 0, clk).unwrap();
        circuit.connect(out(zero), reg, register::DATA).unwrap();
        circuit.node_mut(reg).name = "Q".into();
        let sink = circuit.create_node(NodeKind::Signal).unwrap();
        circuit.connect(out(reg), sink, 0).unwrap();
    }

    let files = VhdlExport::new("unused").render(&circuit).unwrap();
    let text = &files[0].1;
    // Case-insensitive collision resolution: Q then Q_2.
    assert!(text.contains("SIGNAL Q :"), "{text}");
    assert!(text.contains("SIGNAL Q_2 :"), "{text}");
}

#[test]
fn unsupported_interpretation_is_rejected() {
    let mut circuit = Circuit::new();
    let pin = circuit
        .create_node(NodeKind::Pin {
            param: PinParameter::input(),
            ty: ConnectionType {
                interp: silica_hlim::Interpretation::Float,
                width: 32,
            },
        })
        .unwrap();
    let sink = circuit.create_node(NodeKind::Signal).unwrap();
    circuit.connect(out(pin), sink, 0).unwrap();

    let err = VhdlExport::new("unused").render(&circuit).unwrap_err();
    assert!(matches!(
        err,
        silica_vhdl::ExportError::UnsupportedInterpretation { .. }
    ));
}

#[test]
fn multiplexer_renders_when_else() {
    let mut circuit = Circuit::new();
    let sel = input_pin(&mut circuit, "sel", ConnectionType::bool());
    let a = input_pin(&mut circuit, "a", ConnectionType::raw(4));
    let b = input_pin(&mut circuit, "b", ConnectionType::raw(4));
    let mux = circuit
        .create_node(NodeKind::Multiplexer { data_inputs: 2 })
        .unwrap();
    circuit.connect(out(sel), mux, 0).unwrap();
    circuit.connect(out(a), mux, 1).unwrap();
    circuit.connect(out(b), mux, 2).unwrap();
    circuit.node_mut(mux).name = "picked".into();
    let sink = circuit.create_node(NodeKind::Signal).unwrap();
    circuit.connect(out(mux), sink, 0).unwrap();

    let files = VhdlExport::new("unused").render(&circuit).unwrap();
    let text = &files[0].1;
    assert!(text.contains("picked <= a when sel = '0' else b;"), "{text}");
}

#[test]
fn priority_conditional_renders_if_elsif_chain() {
    let mut circuit = Circuit::new();
    let c0 = input_pin(&mut circuit, "c0", ConnectionType::bool());
    let c1 = input_pin(&mut circuit, "c1", ConnectionType::bool());
    let default = constant(&mut circuit, 0xAA, ConnectionType::raw(8));
    let v0 = constant(&mut circuit, 0x11, ConnectionType::raw(8));
    let v1 = constant(&mut circuit, 0x22, ConnectionType::raw(8));
    let node = circuit
        .create_node(NodeKind::PriorityConditional)
        .unwrap();
    circuit
        .connect(out(default), node, silica_hlim::node::prio::DEFAULT)
        .unwrap();
    circuit.add_choice(node, out(c0), out(v0)).unwrap();
    circuit.add_choice(node, out(c1), out(v1)).unwrap();
    circuit.node_mut(node).name = "result".into();
    let sink = circuit.create_node(NodeKind::Signal).unwrap();
    circuit.connect(out(node), sink, 0).unwrap();

    let files = VhdlExport::new("unused").render(&circuit).unwrap();
    let text = &files[0].1;
    assert!(text.contains("combinatorial : PROCESS(c0, c1)"), "{text}");
    assert!(text.contains("IF c0 = '1' THEN"), "{text}");
    assert!(text.contains("result <= \"00010001\";"), "{text}");
    assert!(text.contains("ELSIF c1 = '1' THEN"), "{text}");
    assert!(text.contains("result <= \"00100010\";"), "{text}");
    assert!(text.contains("ELSE"), "{text}");
    assert!(text.contains("result <= \"10101010\";"), "{text}");
}
