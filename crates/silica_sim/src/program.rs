//! Compilation of a circuit into an executable program.
//!
//! A [`Program`] is the runnable form of a circuit: a packed-state layout
//! (signal aliases share their driver's offsets), a reset list, per-clock
//! lists of latched nodes, and topologically ordered execution blocks of
//! combinatorial nodes. Latched and constant outputs are ready from the
//! start, which is what breaks every legal cycle.

use crate::bitalloc::BitAllocator;
use crate::callbacks::CallbackDispatcher;
use crate::error::{SimError, SimErrorKind};
use crate::eval;
use silica_common::BitVectorState;
use silica_hlim::node::{mem_port, register};
use silica_hlim::{
    Circuit, ClockId, NodeId, NodeKind, NodePort, OutputDomain, OutputKind, PinDirection,
};
use std::collections::{HashMap, HashSet};

/// The mutable simulation state.
#[derive(Debug, Clone, Default)]
pub struct DataState {
    /// The packed two-plane signal state.
    pub signal_state: BitVectorState,
}

/// Mapping from circuit entities to offsets in the packed state.
#[derive(Debug, Clone, Default)]
pub struct StateMapping {
    /// Offset of every allocated output port (signal aliases included).
    pub output_offsets: HashMap<NodePort, usize>,
    /// Offsets of per-node internal state (register next-state, memory
    /// arrays, write snapshots, pin override buffers).
    pub internal_offsets: HashMap<NodeId, Vec<usize>>,
    /// Clock-domain index of every clock.
    pub clock_domains: HashMap<ClockId, usize>,
}

/// A node resolved against the state layout.
#[derive(Debug, Clone)]
pub struct MappedNode {
    /// The circuit node.
    pub node: NodeId,
    /// Internal state offsets (meaning is per node kind).
    pub internal: Vec<usize>,
    /// Offset of each input's non-signal driver, `None` if unbound.
    pub inputs: Vec<Option<usize>>,
    /// Width of each input's driver, 0 if unbound.
    pub input_widths: Vec<u32>,
    /// Offset of each output (0 for width-0 outputs).
    pub outputs: Vec<usize>,
    /// Width of each output.
    pub output_widths: Vec<u32>,
}

/// A flat, ordered list of combinatorial evaluations.
#[derive(Debug, Clone, Default)]
pub struct ExecutionBlock {
    steps: Vec<MappedNode>,
}

impl ExecutionBlock {
    /// Appends an evaluation step.
    pub fn add_step(&mut self, mapped: MappedNode) {
        self.steps.push(mapped);
    }

    /// Runs every step in order.
    pub fn evaluate(
        &self,
        circuit: &Circuit,
        state: &mut BitVectorState,
        cb: &mut CallbackDispatcher,
    ) {
        for step in &self.steps {
            eval::evaluate(circuit, step, state, cb);
        }
    }

    /// The scheduled steps.
    pub fn steps(&self) -> &[MappedNode] {
        &self.steps
    }
}

/// A latched node bound to one clock port.
#[derive(Debug, Clone)]
pub struct LatchedNode {
    /// The resolved node.
    pub mapped: MappedNode,
    /// Which of the node's clock ports triggered lists this entry.
    pub clock_port: u32,
}

/// All latched nodes of one clock.
#[derive(Debug, Clone, Default)]
pub struct ClockDomain {
    /// Latches advanced when this clock triggers.
    pub latches: Vec<LatchedNode>,
}

/// The compiled, executable form of a circuit.
#[derive(Debug, Clone)]
pub struct Program {
    mapping: StateMapping,
    full_state_width: usize,
    reset_nodes: Vec<MappedNode>,
    clock_domains: Vec<ClockDomain>,
    execution_blocks: Vec<ExecutionBlock>,
}

impl Program {
    /// Compiles a circuit, optionally checking that the given outputs are
    /// reachable in the produced state layout.
    pub fn compile(
        circuit: &Circuit,
        required_outputs: Option<&[NodePort]>,
    ) -> Result<Program, SimError> {
        check_clock_bindings(circuit)?;

        let (mapping, full_state_width) = allocate_signals(circuit);

        let mut clock_domains: Vec<ClockDomain> = Vec::new();
        let mut mapping = mapping;
        for (clock_id, _) in circuit.clocks() {
            mapping.clock_domains.insert(clock_id, clock_domains.len());
            clock_domains.push(ClockDomain::default());
        }

        // Classify outputs and collect the nodes that take part in
        // combinatorial evaluation.
        let mut ready: HashSet<NodePort> = HashSet::new();
        let mut reset_nodes: Vec<MappedNode> = Vec::new();
        let mut remaining: Vec<NodeId> = Vec::new();
        let mut mapped_nodes: HashMap<NodeId, MappedNode> = HashMap::new();

        for (id, node) in circuit.nodes() {
            if node.is_signal() {
                continue;
            }
            let mapped = build_mapped(circuit, &mapping, id);
            let mut in_reset_list = false;
            for (port, out) in node.outputs().iter().enumerate() {
                let port_ref = NodePort {
                    node: id,
                    port: port as u32,
                };
                match out.kind {
                    OutputKind::Immediate => {}
                    OutputKind::Constant => {
                        ready.insert(port_ref);
                        if !in_reset_list {
                            reset_nodes.push(mapped.clone());
                            in_reset_list = true;
                        }
                    }
                    OutputKind::Latched => {
                        ready.insert(port_ref);
                        if !in_reset_list {
                            reset_nodes.push(mapped.clone());
                            in_reset_list = true;
                        }
                        for (clock_port, clock) in node.clocks().iter().enumerate() {
                            if let Some(clock) = clock {
                                let domain = mapping.clock_domains[clock];
                                clock_domains[domain].latches.push(LatchedNode {
                                    mapped: mapped.clone(),
                                    clock_port: clock_port as u32,
                                });
                            }
                        }
                    }
                }
            }
            // Write ports commit on the clock edge even though their read
            // output is immediate.
            if matches!(node.kind(), NodeKind::MemPort(cfg) if cfg.has_write) {
                if let Some(clock) = node.clock(0) {
                    let domain = mapping.clock_domains[&clock];
                    clock_domains[domain].latches.push(LatchedNode {
                        mapped: mapped.clone(),
                        clock_port: 0,
                    });
                }
            }
            if participates_in_evaluation(node.kind()) {
                remaining.push(id);
            }
            mapped_nodes.insert(id, mapped);
        }

        let block = schedule(circuit, &ready, remaining, &mapped_nodes)?;

        let program = Program {
            mapping,
            full_state_width,
            reset_nodes,
            clock_domains,
            execution_blocks: vec![block],
        };

        check_clock_domains(circuit, &program)?;

        if let Some(required) = required_outputs {
            for port in required {
                if program.offset_of(*port).is_none() {
                    return Err(SimError::new(
                        SimErrorKind::UnreachableOutput,
                        format!(
                            "required output {} of node '{}' has no simulation state",
                            port.port,
                            circuit.node(port.node).kind().type_name()
                        ),
                        circuit.node(port.node).loc().clone(),
                    )
                    .with_ports(vec![*port]));
                }
            }
        }

        Ok(program)
    }

    /// Total number of state bits the program needs.
    pub fn full_state_width(&self) -> usize {
        self.full_state_width
    }

    /// The state layout.
    pub fn state_mapping(&self) -> &StateMapping {
        &self.mapping
    }

    /// The execution blocks in evaluation order.
    pub fn execution_blocks(&self) -> &[ExecutionBlock] {
        &self.execution_blocks
    }

    /// Resolves an output port (signal aliases included) to its state offset.
    pub fn offset_of(&self, port: NodePort) -> Option<usize> {
        self.mapping.output_offsets.get(&port).copied()
    }

    /// Sizes the state and applies every node's power-on value.
    pub fn power_on(&self, circuit: &Circuit, state: &mut BitVectorState) {
        state.clear();
        state.resize(self.full_state_width);
        for mapped in &self.reset_nodes {
            eval::reset(circuit, mapped, state);
        }
    }

    /// Runs every execution block once.
    pub fn reevaluate(
        &self,
        circuit: &Circuit,
        state: &mut BitVectorState,
        cb: &mut CallbackDispatcher,
    ) {
        for block in &self.execution_blocks {
            block.evaluate(circuit, state, cb);
        }
    }

    /// Advances all latched nodes of `clock`: internal next-state becomes
    /// the visible output.
    pub fn advance_clock(&self, circuit: &Circuit, state: &mut BitVectorState, clock: ClockId) {
        let Some(&domain) = self.mapping.clock_domains.get(&clock) else {
            return;
        };
        for latch in &self.clock_domains[domain].latches {
            eval::advance(circuit, &latch.mapped, state, latch.clock_port);
        }
    }

    /// Extracts the current value of an output port.
    pub fn value_of_output(
        &self,
        circuit: &Circuit,
        state: &BitVectorState,
        port: NodePort,
    ) -> Option<BitVectorState> {
        let offset = self.offset_of(port)?;
        let width = circuit.node(port.node).output(port.port).ty.width as usize;
        Some(state.extract(offset, width))
    }
}

/// Nodes that must run during reevaluation. Constants and memories act only
/// at reset; attribute nodes have no runtime behaviour at all.
fn participates_in_evaluation(kind: &NodeKind) -> bool {
    !matches!(
        kind,
        NodeKind::Signal
            | NodeKind::Constant { .. }
            | NodeKind::Memory(_)
            | NodeKind::Attributes(_)
            | NodeKind::PathAttributes(_)
    )
}

fn check_clock_bindings(circuit: &Circuit) -> Result<(), SimError> {
    for (id, node) in circuit.nodes() {
        match node.kind() {
            NodeKind::Register => {
                if node.clock(0).is_none() {
                    return Err(SimError::new(
                        SimErrorKind::MissingClock,
                        "register is not bound to a clock",
                        node.loc().clone(),
                    )
                    .with_ports(vec![NodePort { node: id, port: 0 }]));
                }
                if node.driver(register::DATA).is_none() {
                    return Err(SimError::new(
                        SimErrorKind::UnboundInput,
                        "register data input is not driven",
                        node.loc().clone(),
                    )
                    .with_ports(vec![NodePort { node: id, port: 0 }]));
                }
            }
            NodeKind::MemPort(cfg) => {
                if cfg.has_write && node.clock(0).is_none() {
                    return Err(SimError::new(
                        SimErrorKind::MemoryPortWithoutClock,
                        "memory write port is not bound to a clock",
                        node.loc().clone(),
                    )
                    .with_ports(vec![NodePort { node: id, port: 0 }]));
                }
                if circuit.non_signal_driver(id, mem_port::MEMORY).is_none() {
                    return Err(SimError::new(
                        SimErrorKind::UnboundInput,
                        "memory port is not connected to a memory",
                        node.loc().clone(),
                    )
                    .with_ports(vec![NodePort { node: id, port: 0 }]));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Allocates state offsets. Signal aliases share their non-signal driver's
/// offset; every other output and all internal state gets its own slot.
fn allocate_signals(circuit: &Circuit) -> (StateMapping, usize) {
    let mut alloc = BitAllocator::new();
    let mut mapping = StateMapping::default();

    for (id, node) in circuit.nodes() {
        if node.is_signal() {
            let Some(driver) = circuit.non_signal_driver(id, 0) else {
                continue;
            };
            let width = circuit.node(driver.node).output(driver.port).ty.width;
            if width == 0 {
                continue;
            }
            let offset = *mapping
                .output_offsets
                .entry(driver)
                .or_insert_with(|| alloc.allocate(width));
            mapping
                .output_offsets
                .insert(NodePort { node: id, port: 0 }, offset);
        } else {
            let internal: Vec<usize> = internal_state_sizes(circuit, id)
                .into_iter()
                .map(|size| alloc.allocate(size))
                .collect();
            if !internal.is_empty() {
                mapping.internal_offsets.insert(id, internal);
            }
            for (port, out) in node.outputs().iter().enumerate() {
                if out.ty.width == 0 {
                    continue;
                }
                let port_ref = NodePort {
                    node: id,
                    port: port as u32,
                };
                mapping
                    .output_offsets
                    .entry(port_ref)
                    .or_insert_with(|| alloc.allocate(out.ty.width));
            }
        }
    }

    (mapping, alloc.total())
}

/// Internal state bit counts of a node, in slot order.
fn internal_state_sizes(circuit: &Circuit, id: NodeId) -> Vec<u32> {
    let node = circuit.node(id);
    match node.kind() {
        NodeKind::Register => {
            let width = node.output(0).ty.width;
            if width > 0 {
                vec![width]
            } else {
                vec![]
            }
        }
        NodeKind::Memory(cfg) => vec![cfg.word_width * cfg.depth],
        NodeKind::MemPort(cfg) if cfg.has_write => {
            let word = node.output(0).ty.width;
            let addr = circuit
                .non_signal_driver(id, mem_port::ADDRESS)
                .map(|p| circuit.node(p.node).output(p.port).ty.width)
                .unwrap_or(0);
            vec![addr + word + 1]
        }
        NodeKind::Pin { param, ty } if param.direction == PinDirection::Input => vec![ty.width],
        _ => vec![],
    }
}

/// Resolves a node against the state layout.
fn build_mapped(circuit: &Circuit, mapping: &StateMapping, id: NodeId) -> MappedNode {
    let node = circuit.node(id);
    let mut inputs = Vec::with_capacity(node.num_inputs());
    let mut input_widths = Vec::with_capacity(node.num_inputs());
    for input in 0..node.num_inputs() as u32 {
        let driver = circuit.non_signal_driver(id, input);
        inputs.push(driver.and_then(|p| mapping.output_offsets.get(&p).copied()));
        input_widths
            .push(driver.map_or(0, |p| circuit.node(p.node).output(p.port).ty.width));
    }
    let mut outputs = Vec::with_capacity(node.num_outputs());
    let mut output_widths = Vec::with_capacity(node.num_outputs());
    for (port, out) in node.outputs().iter().enumerate() {
        let port_ref = NodePort {
            node: id,
            port: port as u32,
        };
        outputs.push(mapping.output_offsets.get(&port_ref).copied().unwrap_or(0));
        output_widths.push(out.ty.width);
    }
    let mut internal = mapping.internal_offsets.get(&id).cloned().unwrap_or_default();
    // Memory ports address their memory's array directly.
    if matches!(node.kind(), NodeKind::MemPort(_)) {
        if let Some(mem) = circuit.non_signal_driver(id, mem_port::MEMORY) {
            if let Some(offsets) = mapping.internal_offsets.get(&mem.node) {
                internal.push(offsets[0]);
            }
        }
    }
    MappedNode {
        node: id,
        internal,
        inputs,
        input_widths,
        outputs,
        output_widths,
    }
}

/// Orders the combinatorial nodes so that every immediate input's producer
/// precedes its consumer. Ties break by node insertion order. A leftover set
/// means a cycle through immediate outputs.
fn schedule(
    circuit: &Circuit,
    ready: &HashSet<NodePort>,
    mut remaining: Vec<NodeId>,
    mapped_nodes: &HashMap<NodeId, MappedNode>,
) -> Result<ExecutionBlock, SimError> {
    let mut ready = ready.clone();
    let mut block = ExecutionBlock::default();

    while !remaining.is_empty() {
        let position = remaining.iter().position(|&id| {
            let node = circuit.node(id);
            (0..node.num_inputs() as u32).all(|input| {
                match circuit.non_signal_driver(id, input) {
                    None => true,
                    Some(driver) => {
                        ready.contains(&driver)
                            || circuit.node(driver.node).output(driver.port).kind
                                != OutputKind::Immediate
                    }
                }
            })
        });
        let Some(position) = position else {
            let ports: Vec<NodePort> = remaining
                .iter()
                .map(|&node| NodePort { node, port: 0 })
                .collect();
            let loc = circuit.node(remaining[0]).loc().clone();
            return Err(SimError::new(
                SimErrorKind::CombinationalCycle,
                format!(
                    "{} nodes depend on each other through immediate outputs",
                    remaining.len()
                ),
                loc,
            )
            .with_ports(ports));
        };
        let id = remaining.remove(position);
        for port in 0..circuit.node(id).num_outputs() as u32 {
            ready.insert(NodePort { node: id, port });
        }
        block.add_step(mapped_nodes[&id].clone());
    }

    Ok(block)
}

/// The clock domain a value belongs to, for crossing checks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Domain {
    /// Constant-domain values are compatible with everything.
    Constant,
    /// Values produced in the domain of a clock pin source.
    Clock(ClockId),
    /// Unconstrained (e.g. a pin without a clock override).
    Unknown,
}

fn join_domains(a: Domain, b: Domain) -> Result<Domain, (Domain, Domain)> {
    match (a, b) {
        (Domain::Constant, other) | (other, Domain::Constant) => Ok(other),
        (Domain::Unknown, other) | (other, Domain::Unknown) => Ok(other),
        (Domain::Clock(x), Domain::Clock(y)) if x == y => Ok(a),
        _ => Err((a, b)),
    }
}

fn domain_matches(value: Domain, clock_source: ClockId) -> bool {
    match value {
        Domain::Constant | Domain::Unknown => true,
        Domain::Clock(source) => source == clock_source,
    }
}

/// Validates that every value consumed in a clock domain was produced there,
/// crossed through a marker node, or is constant.
fn check_clock_domains(circuit: &Circuit, program: &Program) -> Result<(), SimError> {
    let mut domains: HashMap<NodePort, Domain> = HashMap::new();

    // Seed outputs whose domain is fixed regardless of dataflow.
    for (id, node) in circuit.nodes() {
        for port in 0..node.num_outputs() as u32 {
            let port_ref = NodePort { node: id, port };
            let seeded = match node.kind() {
                NodeKind::Constant { .. } | NodeKind::Memory(_) => Some(Domain::Constant),
                NodeKind::Register => node
                    .clock(0)
                    .map(|clk| Domain::Clock(circuit.clock_pin_source(clk))),
                NodeKind::Pin { param, .. } if param.direction == PinDirection::Input => {
                    Some(match param.clock_override {
                        Some(clk) => Domain::Clock(circuit.clock_pin_source(clk)),
                        None => Domain::Unknown,
                    })
                }
                NodeKind::External(desc) => {
                    Some(match desc.out_clock_relations.get(port as usize) {
                        Some(OutputDomain::Constant) => Domain::Constant,
                        Some(OutputDomain::InClock(i)) => match desc.in_clocks.get(*i) {
                            Some(Some(clk)) => Domain::Clock(circuit.clock_pin_source(*clk)),
                            _ => Domain::Unknown,
                        },
                        _ => Domain::Unknown,
                    })
                }
                _ => None,
            };
            if let Some(domain) = seeded {
                domains.insert(port_ref, domain);
            }
        }
    }

    let input_domain = |domains: &HashMap<NodePort, Domain>, id: NodeId, input: u32| {
        circuit
            .non_signal_driver(id, input)
            .map(|p| domains.get(&p).copied().unwrap_or(Domain::Unknown))
    };

    // Forward pass over the schedule: combinatorial outputs take the join of
    // their inputs; crossing markers re-domain their value.
    for block in program.execution_blocks() {
        for step in block.steps() {
            let id = step.node;
            let node = circuit.node(id);
            match node.kind() {
                NodeKind::Cdc(_) => {
                    let out_domain = match node.clock(silica_hlim::node::cdc::OUTPUT_CLOCK) {
                        Some(clk) => Domain::Clock(circuit.clock_pin_source(clk)),
                        None => Domain::Unknown,
                    };
                    if let Some(in_clk) = node.clock(silica_hlim::node::cdc::INPUT_CLOCK) {
                        let expected = circuit.clock_pin_source(in_clk);
                        if let Some(actual) = input_domain(&domains, id, 0) {
                            if !domain_matches(actual, expected) {
                                return Err(SimError::new(
                                    SimErrorKind::CdcClockMismatch,
                                    "crossing input belongs to a different clock than declared",
                                    node.loc().clone(),
                                )
                                .with_ports(involved_ports(circuit, id, &[0])));
                            }
                        }
                    }
                    domains.insert(NodePort { node: id, port: 0 }, out_domain);
                }
                NodeKind::Register | NodeKind::Pin { .. } => {
                    // Seeded above (input pins) or checked below (registers);
                    // output pins pass their input's domain through.
                    if !domains.contains_key(&NodePort { node: id, port: 0 }) {
                        let domain = input_domain(&domains, id, 0).unwrap_or(Domain::Unknown);
                        domains.insert(NodePort { node: id, port: 0 }, domain);
                    }
                }
                _ => {
                    let mut joined = Domain::Constant;
                    for input in 0..node.num_inputs() as u32 {
                        if matches!(node.kind(), NodeKind::MemPort(_))
                            && input == mem_port::MEMORY
                        {
                            continue;
                        }
                        let Some(domain) = input_domain(&domains, id, input) else {
                            continue;
                        };
                        joined = join_domains(joined, domain).map_err(|_| {
                            SimError::new(
                                SimErrorKind::UnmarkedCdc,
                                "values from different clock domains meet without a crossing marker",
                                node.loc().clone(),
                            )
                            .with_ports(involved_ports(
                                circuit,
                                id,
                                &(0..node.num_inputs() as u32).collect::<Vec<_>>(),
                            ))
                        })?;
                    }
                    for port in 0..node.num_outputs() as u32 {
                        domains.insert(NodePort { node: id, port }, joined);
                    }
                }
            }
        }
    }

    // Clocked consumers must sample values from their own domain.
    for (id, node) in circuit.nodes() {
        match node.kind() {
            NodeKind::Register => {
                let source = circuit.clock_pin_source(node.clock(0).expect("checked earlier"));
                for input in [register::DATA, register::RESET_VALUE, register::ENABLE] {
                    if let Some(domain) = input_domain(&domains, id, input) {
                        if !domain_matches(domain, source) {
                            let mut ports = involved_ports(circuit, id, &[input]);
                            ports.push(NodePort { node: id, port: 0 });
                            return Err(SimError::new(
                                SimErrorKind::UnmarkedCdc,
                                format!(
                                    "register input '{}' samples a value from another clock domain",
                                    node.kind().input_name(input)
                                ),
                                node.loc().clone(),
                            )
                            .with_ports(ports));
                        }
                    }
                }
            }
            NodeKind::MemPort(cfg) if cfg.has_write => {
                let Some(clock) = node.clock(0) else { continue };
                let source = circuit.clock_pin_source(clock);
                for input in [mem_port::ADDRESS, mem_port::WR_DATA, mem_port::WR_ENABLE] {
                    if let Some(domain) = input_domain(&domains, id, input) {
                        if !domain_matches(domain, source) {
                            let mut ports = involved_ports(circuit, id, &[input]);
                            ports.push(NodePort { node: id, port: 0 });
                            return Err(SimError::new(
                                SimErrorKind::UnmarkedCdc,
                                "memory write port samples a value from another clock domain",
                                node.loc().clone(),
                            )
                            .with_ports(ports));
                        }
                    }
                }
            }
            NodeKind::External(desc) => {
                for (input, clock) in desc.in_clocks.iter().enumerate() {
                    let Some(clock) = clock else { continue };
                    let source = circuit.clock_pin_source(*clock);
                    if let Some(domain) = input_domain(&domains, id, input as u32) {
                        if !domain_matches(domain, source) {
                            return Err(SimError::new(
                                SimErrorKind::ExternalClockMismatch,
                                format!(
                                    "external input '{}' belongs to a different clock than declared",
                                    desc.ins[input].name
                                ),
                                node.loc().clone(),
                            )
                            .with_ports(involved_ports(circuit, id, &[input as u32])));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn involved_ports(circuit: &Circuit, id: NodeId, inputs: &[u32]) -> Vec<NodePort> {
    inputs
        .iter()
        .filter_map(|&input| circuit.non_signal_driver(id, input))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use silica_common::Rational;
    use silica_hlim::{ArithOp, Clock, ConnectionType};

    fn counter_circuit() -> (Circuit, NodeId) {
        let mut c = Circuit::new();
        let clk = c.create_clock(Clock::root("clk", Rational::integer(100_000_000)));
        let one = c
            .create_node(NodeKind::Constant {
                value: BitVectorState::from_u64(1, 4),
                ty: ConnectionType::unsigned(4),
            })
            .unwrap();
        let zero = c
            .create_node(NodeKind::Constant {
                value: BitVectorState::from_u64(0, 4),
                ty: ConnectionType::unsigned(4),
            })
            .unwrap();
        let reg = c.create_node(NodeKind::Register).unwrap();
        c.bind_clock(reg, 0, clk).unwrap();
        let add = c.create_node(NodeKind::Arithmetic(ArithOp::Add)).unwrap();
        c.connect(NodePort { node: reg, port: 0 }, add, 0).unwrap();
        c.connect(NodePort { node: one, port: 0 }, add, 1).unwrap();
        c.connect(NodePort { node: add, port: 0 }, reg, register::DATA)
            .unwrap();
        c.connect(NodePort { node: zero, port: 0 }, reg, register::RESET_VALUE)
            .unwrap();
        (c, reg)
    }

    #[test]
    fn signal_alias_shares_offset() {
        let (mut c, reg) = counter_circuit();
        let sig = c.create_node(NodeKind::Signal).unwrap();
        c.connect(NodePort { node: reg, port: 0 }, sig, 0).unwrap();
        let program = Program::compile(&c, None).unwrap();
        assert_eq!(
            program.offset_of(NodePort { node: sig, port: 0 }),
            program.offset_of(NodePort { node: reg, port: 0 })
        );
    }

    #[test]
    fn schedule_is_topological() {
        let (c, reg) = counter_circuit();
        let program = Program::compile(&c, None).unwrap();
        let block = &program.execution_blocks()[0];
        // The adder consumes the register's latched (pre-ready) output; the
        // register consumes the adder's immediate output, so the adder must
        // be evaluated first.
        let order: Vec<NodeId> = block.steps().iter().map(|s| s.node).collect();
        let add_pos = order
            .iter()
            .position(|&id| {
                matches!(c.node(id).kind(), NodeKind::Arithmetic(_))
            })
            .unwrap();
        let reg_pos = order.iter().position(|&id| id == reg).unwrap();
        assert!(add_pos < reg_pos);
    }

    #[test]
    fn power_on_applies_reset_values() {
        let (c, reg) = counter_circuit();
        let program = Program::compile(&c, None).unwrap();
        let mut state = BitVectorState::new();
        program.power_on(&c, &mut state);
        let q = program
            .value_of_output(&c, &state, NodePort { node: reg, port: 0 })
            .unwrap();
        assert_eq!(q.to_u64(), Some(0));
    }

    #[test]
    fn power_on_is_deterministic() {
        let (c, _) = counter_circuit();
        let program = Program::compile(&c, None).unwrap();
        let mut a = BitVectorState::new();
        let mut b = BitVectorState::new();
        program.power_on(&c, &mut a);
        program.power_on(&c, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn reevaluation_is_idempotent() {
        let (c, _) = counter_circuit();
        let program = Program::compile(&c, None).unwrap();
        let mut state = BitVectorState::new();
        let mut cb = CallbackDispatcher::new();
        program.power_on(&c, &mut state);
        program.reevaluate(&c, &mut state, &mut cb);
        let snapshot = state.clone();
        program.reevaluate(&c, &mut state, &mut cb);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn advancing_counts() {
        let (c, reg) = counter_circuit();
        let clk = c.node(reg).clock(0).unwrap();
        let program = Program::compile(&c, None).unwrap();
        let mut state = BitVectorState::new();
        let mut cb = CallbackDispatcher::new();
        program.power_on(&c, &mut state);
        program.reevaluate(&c, &mut state, &mut cb);
        for expected in 1..=5u64 {
            program.advance_clock(&c, &mut state, clk);
            program.reevaluate(&c, &mut state, &mut cb);
            let q = program
                .value_of_output(&c, &state, NodePort { node: reg, port: 0 })
                .unwrap();
            assert_eq!(q.to_u64(), Some(expected));
        }
    }

    #[test]
    fn unclocked_register_rejected() {
        let mut c = Circuit::new();
        let k = c
            .create_node(NodeKind::Constant {
                value: BitVectorState::from_u64(0, 4),
                ty: ConnectionType::unsigned(4),
            })
            .unwrap();
        let reg = c.create_node(NodeKind::Register).unwrap();
        c.connect(NodePort { node: k, port: 0 }, reg, register::DATA)
            .unwrap();
        let err = Program::compile(&c, None).unwrap_err();
        assert_eq!(err.kind, SimErrorKind::MissingClock);
    }

    #[test]
    fn combinational_cycle_reports_members() {
        let mut c = Circuit::new();
        let a = c
            .create_node(NodeKind::Logic(silica_hlim::LogicOp::Not))
            .unwrap();
        let b = c
            .create_node(NodeKind::Logic(silica_hlim::LogicOp::Not))
            .unwrap();
        c.connect(NodePort { node: a, port: 0 }, b, 0).unwrap();
        c.connect(NodePort { node: b, port: 0 }, a, 0).unwrap();
        let err = Program::compile(&c, None).unwrap_err();
        assert_eq!(err.kind, SimErrorKind::CombinationalCycle);
        assert_eq!(err.ports.len(), 2);
    }

    #[test]
    fn required_output_must_resolve() {
        let (c, reg) = counter_circuit();
        let ok = Program::compile(&c, Some(&[NodePort { node: reg, port: 0 }]));
        assert!(ok.is_ok());

        let mut c2 = Circuit::new();
        let dangling = c2.create_node(NodeKind::Signal).unwrap();
        let err =
            Program::compile(&c2, Some(&[NodePort { node: dangling, port: 0 }])).unwrap_err();
        assert_eq!(err.kind, SimErrorKind::UnreachableOutput);
    }

    #[test]
    fn unmarked_crossing_rejected() {
        let mut c = Circuit::new();
        let clk_a = c.create_clock(Clock::root("clk_a", Rational::integer(100)));
        let clk_b = c.create_clock(Clock::root("clk_b", Rational::integer(33)));
        let zero = c
            .create_node(NodeKind::Constant {
                value: BitVectorState::from_u64(0, 4),
                ty: ConnectionType::unsigned(4),
            })
            .unwrap();
        let reg_a = c.create_node(NodeKind::Register).unwrap();
        c.bind_clock(reg_a, 0, clk_a).unwrap();
        c.connect(NodePort { node: zero, port: 0 }, reg_a, register::DATA)
            .unwrap();
        let reg_b = c.create_node(NodeKind::Register).unwrap();
        c.bind_clock(reg_b, 0, clk_b).unwrap();
        c.connect(NodePort { node: reg_a, port: 0 }, reg_b, register::DATA)
            .unwrap();

        let err = Program::compile(&c, None).unwrap_err();
        assert_eq!(err.kind, SimErrorKind::UnmarkedCdc);
        assert!(err.ports.contains(&NodePort { node: reg_a, port: 0 }));
        assert!(err.ports.contains(&NodePort { node: reg_b, port: 0 }));
    }

    #[test]
    fn marked_crossing_compiles() {
        let mut c = Circuit::new();
        let clk_a = c.create_clock(Clock::root("clk_a", Rational::integer(100)));
        let clk_b = c.create_clock(Clock::root("clk_b", Rational::integer(33)));
        let zero = c
            .create_node(NodeKind::Constant {
                value: BitVectorState::from_u64(0, 4),
                ty: ConnectionType::unsigned(4),
            })
            .unwrap();
        let reg_a = c.create_node(NodeKind::Register).unwrap();
        c.bind_clock(reg_a, 0, clk_a).unwrap();
        c.connect(NodePort { node: zero, port: 0 }, reg_a, register::DATA)
            .unwrap();
        let crossing = c
            .create_node(NodeKind::Cdc(silica_hlim::CdcParameter::default()))
            .unwrap();
        c.bind_clock(crossing, silica_hlim::node::cdc::INPUT_CLOCK, clk_a)
            .unwrap();
        c.bind_clock(crossing, silica_hlim::node::cdc::OUTPUT_CLOCK, clk_b)
            .unwrap();
        c.connect(NodePort { node: reg_a, port: 0 }, crossing, 0)
            .unwrap();
        let reg_b = c.create_node(NodeKind::Register).unwrap();
        c.bind_clock(reg_b, 0, clk_b).unwrap();
        c.connect(NodePort { node: crossing, port: 0 }, reg_b, register::DATA)
            .unwrap();

        assert!(Program::compile(&c, None).is_ok());
    }

    #[test]
    fn crossing_with_wrong_input_clock_rejected() {
        let mut c = Circuit::new();
        let clk_a = c.create_clock(Clock::root("clk_a", Rational::integer(100)));
        let clk_b = c.create_clock(Clock::root("clk_b", Rational::integer(33)));
        let zero = c
            .create_node(NodeKind::Constant {
                value: BitVectorState::from_u64(0, 4),
                ty: ConnectionType::unsigned(4),
            })
            .unwrap();
        let reg_a = c.create_node(NodeKind::Register).unwrap();
        c.bind_clock(reg_a, 0, clk_a).unwrap();
        c.connect(NodePort { node: zero, port: 0 }, reg_a, register::DATA)
            .unwrap();
        let crossing = c
            .create_node(NodeKind::Cdc(silica_hlim::CdcParameter::default()))
            .unwrap();
        // Declared input clock does not match the producing domain.
        c.bind_clock(crossing, silica_hlim::node::cdc::INPUT_CLOCK, clk_b)
            .unwrap();
        c.bind_clock(crossing, silica_hlim::node::cdc::OUTPUT_CLOCK, clk_b)
            .unwrap();
        c.connect(NodePort { node: reg_a, port: 0 }, crossing, 0)
            .unwrap();

        let err = Program::compile(&c, None).unwrap_err();
        assert_eq!(err.kind, SimErrorKind::CdcClockMismatch);
    }
}
