//! The circuit: owner of all nodes, clocks, and groups.
//!
//! All wiring mutations go through the circuit so that driver references and
//! sink back-references stay symmetric, and so that connection types are
//! re-propagated whenever an input changes. Intra-graph references are
//! typed ids and remain valid for the circuit's lifetime.

use crate::clock::{Clock, ClockKind, ClockRelation};
use crate::error::{DesignError, DesignErrorKind};
use crate::group::{GroupKind, NodeGroup};
use crate::ids::{ClockId, GroupId, NodeId, Registry};
use crate::node::{
    export_override, mem_port, prio, register, Node, NodeKind, NodePort, OutputKind, OutputPort,
    PinDirection, RangeSource, SinkRef, TapLevel,
};
use crate::scope::{ClockScope, GroupScope};
use crate::types::ConnectionType;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use silica_common::{Rational, SourceLoc};
use std::collections::HashMap;

/// The circuit graph: nodes, clocks, and the group hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circuit {
    nodes: Registry<NodeId, Node>,
    clocks: Registry<ClockId, Clock>,
    groups: Registry<GroupId, NodeGroup>,
    root: GroupId,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

/// Port counts and initial output ports of a node kind.
struct NodeShape {
    inputs: usize,
    outputs: Vec<(ConnectionType, OutputKind)>,
    clocks: usize,
}

impl Circuit {
    /// Creates an empty circuit with a root entity group named `top`.
    pub fn new() -> Self {
        let mut groups = Registry::new();
        let root = groups.insert(NodeGroup::new(GroupKind::Entity, "top", None));
        Self {
            nodes: Registry::new(),
            clocks: Registry::new(),
            groups,
            root,
        }
    }

    /// The root group.
    pub fn root_group(&self) -> GroupId {
        self.root
    }

    /// Creates a node in the current [`GroupScope`] group (or the root).
    ///
    /// Records the caller's source location for later error reporting.
    /// Registers and memory write ports pick up the active [`ClockScope`].
    #[track_caller]
    pub fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, DesignError> {
        let group = GroupScope::current().unwrap_or(self.root);
        self.create_node_at(kind, group, SourceLoc::caller())
    }

    /// Creates a node in an explicit group.
    #[track_caller]
    pub fn create_node_in(&mut self, group: GroupId, kind: NodeKind) -> Result<NodeId, DesignError> {
        self.create_node_at(kind, group, SourceLoc::caller())
    }

    fn create_node_at(
        &mut self,
        kind: NodeKind,
        group: GroupId,
        loc: SourceLoc,
    ) -> Result<NodeId, DesignError> {
        let shape = shape_of(&kind, &loc)?;
        let mut clocks = vec![None; shape.clocks];
        // Registers and write ports default to the scoped clock.
        if shape.clocks == 1 && matches!(kind, NodeKind::Register | NodeKind::MemPort(_)) {
            clocks[0] = ClockScope::current();
        }
        let node = Node {
            kind,
            inputs: vec![None; shape.inputs],
            outputs: shape
                .outputs
                .into_iter()
                .map(|(ty, kind)| OutputPort::new(ty, kind))
                .collect(),
            group: Some(group),
            clocks,
            name: String::new(),
            comment: String::new(),
            loc,
        };
        let id = self.nodes.insert(node);
        self.groups[group].nodes.push(id);
        Ok(id)
    }

    /// Registers a clock with the circuit.
    pub fn create_clock(&mut self, clock: Clock) -> ClockId {
        self.clocks.insert(clock)
    }

    /// The node with the given id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Mutable access to a node's user-settable fields (name, comment).
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// The clock with the given id.
    pub fn clock(&self, id: ClockId) -> &Clock {
        &self.clocks[id]
    }

    /// Mutable access to a clock.
    pub fn clock_mut(&mut self, id: ClockId) -> &mut Clock {
        &mut self.clocks[id]
    }

    /// The group with the given id.
    pub fn group(&self, id: GroupId) -> &NodeGroup {
        &self.groups[id]
    }

    /// Mutable access to a group.
    pub fn group_mut(&mut self, id: GroupId) -> &mut NodeGroup {
        &mut self.groups[id]
    }

    /// Iterates over all nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Iterates over all clocks in creation order.
    pub fn clocks(&self) -> impl Iterator<Item = (ClockId, &Clock)> {
        self.clocks.iter()
    }

    /// Iterates over all groups in creation order.
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &NodeGroup)> {
        self.groups.iter()
    }

    /// Number of nodes in the circuit.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    // --- wiring -----------------------------------------------------------

    /// The driver of `input` on `node`, if connected.
    pub fn driver(&self, node: NodeId, input: u32) -> Option<NodePort> {
        self.nodes[node].driver(input)
    }

    /// Walks signal aliases from the driver of `input` until a non-signal
    /// producer is reached. Returns `None` if the chain ends unbound.
    pub fn non_signal_driver(&self, node: NodeId, input: u32) -> Option<NodePort> {
        let mut port = self.nodes[node].driver(input)?;
        let mut steps = 0;
        while self.nodes[port.node].is_signal() {
            port = self.nodes[port.node].driver(0)?;
            steps += 1;
            if steps > self.nodes.len() {
                return None;
            }
        }
        Some(port)
    }

    /// Connects `src` to input `input` of `dst`.
    ///
    /// Any existing driver is disconnected first; the sink back-reference is
    /// pushed onto the driver's output, and the consumer's output types are
    /// re-propagated through all transitive consumers. On a propagation
    /// error the new wire and every type the cascade touched are rolled
    /// back, so a failed connect leaves no trace.
    pub fn connect(&mut self, src: NodePort, dst: NodeId, input: u32) -> Result<(), DesignError> {
        if (src.port as usize) >= self.nodes[src.node].num_outputs() {
            return Err(DesignError::new(
                DesignErrorKind::InvalidPort,
                format!(
                    "node '{}' has no output {}",
                    self.nodes[src.node].kind.type_name(),
                    src.port
                ),
                self.nodes[src.node].loc.clone(),
            )
            .with_ports(vec![src]));
        }
        if (input as usize) >= self.nodes[dst].num_inputs() {
            return Err(DesignError::new(
                DesignErrorKind::InvalidPort,
                format!(
                    "node '{}' has no input {}",
                    self.nodes[dst].kind.type_name(),
                    input
                ),
                self.nodes[dst].loc.clone(),
            ));
        }
        if self.nodes[dst].driver(input) == Some(src) {
            return Ok(());
        }
        self.disconnect(dst, input);
        self.nodes[dst].inputs[input as usize] = Some(src);
        self.nodes[src.node].outputs[src.port as usize]
            .sinks
            .push(SinkRef { node: dst, input });
        if let Err(err) = self.propagate_types(dst) {
            self.disconnect(dst, input);
            return Err(err);
        }
        Ok(())
    }

    /// Disconnects input `input` of `node`, removing the sink back-reference
    /// from the old driver (swap-remove, O(fanout)).
    pub fn disconnect(&mut self, node: NodeId, input: u32) {
        let Some(src) = self.nodes[node].inputs[input as usize].take() else {
            return;
        };
        let sinks = &mut self.nodes[src.node].outputs[src.port as usize].sinks;
        let pos = sinks
            .iter()
            .position(|s| s.node == node && s.input == input)
            .expect("sink list out of sync with driver reference");
        sinks.swap_remove(pos);
    }

    /// Resizes the input list of `node`; dropped inputs are disconnected.
    pub fn resize_inputs(&mut self, node: NodeId, num: usize) {
        let old = self.nodes[node].num_inputs();
        for input in num..old {
            self.disconnect(node, input as u32);
        }
        self.nodes[node].inputs.resize(num, None);
    }

    /// Resizes the output list of `node`; dropped outputs lose all sinks.
    pub fn resize_outputs(&mut self, node: NodeId, num: usize) {
        let old = self.nodes[node].num_outputs();
        for port in num..old {
            while let Some(sink) = self.nodes[node].outputs[port].sinks.last().copied() {
                self.disconnect(sink.node, sink.input);
            }
        }
        self.nodes[node]
            .outputs
            .resize_with(num, || OutputPort::new(ConnectionType::unset(), OutputKind::Immediate));
    }

    /// Appends a (condition, value) choice to a priority-conditional node.
    pub fn add_choice(
        &mut self,
        node: NodeId,
        condition: NodePort,
        value: NodePort,
    ) -> Result<(), DesignError> {
        if !matches!(self.nodes[node].kind, NodeKind::PriorityConditional) {
            return Err(DesignError::new(
                DesignErrorKind::InvalidPort,
                "add_choice on a non-priority-conditional node",
                self.nodes[node].loc.clone(),
            ));
        }
        let choice = prio::num_choices(self.nodes[node].num_inputs());
        self.resize_inputs(node, 1 + 2 * (choice as usize + 1));
        self.connect(condition, node, prio::condition(choice))?;
        self.connect(value, node, prio::value(choice))
    }

    /// Binds `clock` to clock port `clock_port` of `node`.
    pub fn bind_clock(
        &mut self,
        node: NodeId,
        clock_port: u32,
        clock: ClockId,
    ) -> Result<(), DesignError> {
        let slots = self.nodes[node].clocks.len();
        if (clock_port as usize) >= slots {
            return Err(DesignError::new(
                DesignErrorKind::ConflictingClockBinding,
                format!(
                    "node '{}' has {} clock ports, cannot bind port {}",
                    self.nodes[node].kind.type_name(),
                    slots,
                    clock_port
                ),
                self.nodes[node].loc.clone(),
            ));
        }
        self.nodes[node].clocks[clock_port as usize] = Some(clock);
        Ok(())
    }

    /// Creates a structurally identical but unwired copy of `node`.
    ///
    /// The clone keeps kind, name, comment, source location, clock bindings,
    /// output types and kinds, and group placement; it has no drivers and no
    /// sinks.
    pub fn clone_unconnected(&mut self, node: NodeId) -> NodeId {
        let src = &self.nodes[node];
        let copy = Node {
            kind: src.kind.clone(),
            inputs: vec![None; src.inputs.len()],
            outputs: src
                .outputs
                .iter()
                .map(|o| OutputPort::new(o.ty, o.kind))
                .collect(),
            group: src.group,
            clocks: src.clocks.clone(),
            name: src.name.clone(),
            comment: src.comment.clone(),
            loc: src.loc.clone(),
        };
        let group = copy.group;
        let id = self.nodes.insert(copy);
        if let Some(group) = group {
            self.groups[group].nodes.push(id);
        }
        id
    }

    // --- groups -----------------------------------------------------------

    /// Creates a child group under `parent`.
    pub fn add_child_group(
        &mut self,
        parent: GroupId,
        kind: GroupKind,
        name: impl Into<String>,
    ) -> GroupId {
        let id = self.groups.insert(NodeGroup::new(kind, name, Some(parent)));
        self.groups[parent].children.push(id);
        id
    }

    /// Returns `true` if `group` is `ancestor` or nested anywhere below it.
    pub fn is_child_of(&self, group: GroupId, ancestor: GroupId) -> bool {
        let mut current = Some(group);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.groups[id].parent;
        }
        false
    }

    /// Moves `node` into `group`, updating both membership lists.
    pub fn move_to_group(&mut self, node: NodeId, group: GroupId) {
        if let Some(old) = self.nodes[node].group {
            let nodes = &mut self.groups[old].nodes;
            if let Some(pos) = nodes.iter().position(|&n| n == node) {
                nodes.swap_remove(pos);
            }
        }
        self.nodes[node].group = Some(group);
        self.groups[group].nodes.push(node);
    }

    // --- clocks -----------------------------------------------------------

    /// The absolute frequency of a clock in Hz.
    ///
    /// Signal-driven clocks have no static frequency.
    pub fn clock_frequency(&self, id: ClockId) -> Result<Rational, DesignError> {
        match &self.clocks[id].kind {
            ClockKind::Root { frequency } => Ok(*frequency),
            ClockKind::Derived {
                parent, multiplier, ..
            } => Ok(self.clock_frequency(*parent)? * *multiplier),
            ClockKind::SignalDriven => Err(DesignError::new(
                DesignErrorKind::UnknownFrequency,
                format!(
                    "clock '{}' is signal-driven and has no static frequency",
                    self.clocks[id].name
                ),
                SourceLoc::unknown(),
            )),
        }
    }

    /// The absolute phase shift of a clock in seconds.
    pub fn clock_phase_shift(&self, id: ClockId) -> Result<Rational, DesignError> {
        match &self.clocks[id].kind {
            ClockKind::Root { .. } => Ok(Rational::zero()),
            ClockKind::Derived {
                parent,
                phase_shift,
                ..
            } => {
                let parent_period = self.clock_frequency(*parent)?.recip();
                Ok(self.clock_phase_shift(*parent)? + *phase_shift * parent_period)
            }
            ClockKind::SignalDriven => Err(DesignError::new(
                DesignErrorKind::UnknownFrequency,
                format!(
                    "clock '{}' is signal-driven and has no static phase",
                    self.clocks[id].name
                ),
                SourceLoc::unknown(),
            )),
        }
    }

    /// The relation of clock `a` to clock `b`: frequency ratio and phase
    /// difference in periods of `b`.
    pub fn clock_relative_to(&self, a: ClockId, b: ClockId) -> Result<ClockRelation, DesignError> {
        let fa = self.clock_frequency(a)?;
        let fb = self.clock_frequency(b)?;
        let pa = self.clock_phase_shift(a)?;
        let pb = self.clock_phase_shift(b)?;
        Ok(ClockRelation {
            frequency_ratio: fa / fb,
            phase_shift: (pa - pb) * fb,
        })
    }

    /// The pin-source equivalence class of a clock: the root of its derived
    /// chain. Two clocks in the same class are driven from the same pin.
    pub fn clock_pin_source(&self, id: ClockId) -> ClockId {
        match &self.clocks[id].kind {
            ClockKind::Derived { parent, .. } => self.clock_pin_source(*parent),
            _ => id,
        }
    }

    // --- type propagation -------------------------------------------------

    fn output_ty(&self, port: NodePort) -> Option<ConnectionType> {
        let ty = self.nodes[port.node].outputs[port.port as usize].ty;
        (!ty.is_unset()).then_some(ty)
    }

    fn input_ty(&self, node: NodeId, input: u32) -> Option<ConnectionType> {
        self.nodes[node]
            .driver(input)
            .and_then(|port| self.output_ty(port))
    }

    /// Recomputes the output types of `node` from its connected inputs and
    /// cascades to consumers whose types change.
    ///
    /// The cascade can fail at a node several hops away, after earlier hops
    /// already took their new types. Every change is recorded in an undo log
    /// and restored on failure, so an error never leaves half-propagated
    /// types behind.
    fn propagate_types(&mut self, id: NodeId) -> Result<(), DesignError> {
        let mut undo: Vec<(NodePort, ConnectionType)> = Vec::new();
        let result = self.propagate_types_inner(id, &mut undo);
        if result.is_err() {
            for (port, ty) in undo.into_iter().rev() {
                self.nodes[port.node].outputs[port.port as usize].ty = ty;
            }
        }
        result
    }

    fn propagate_types_inner(
        &mut self,
        id: NodeId,
        undo: &mut Vec<(NodePort, ConnectionType)>,
    ) -> Result<(), DesignError> {
        let desired = self.desired_output_type(id)?;
        let Some(desired) = desired else {
            return Ok(());
        };
        if !self.set_output_type(id, 0, desired, undo)? {
            return Ok(());
        }
        // Cascade to consumers; stops when types no longer change.
        let sinks: Vec<SinkRef> = self.nodes[id].outputs[0].sinks.clone();
        for sink in sinks {
            self.propagate_types_inner(sink.node, undo)?;
        }
        Ok(())
    }

    /// The type output 0 of `node` should carry given its current inputs,
    /// or `None` if the kind's outputs are fixed at creation or no input is
    /// connected yet. Also validates per-kind input constraints.
    fn desired_output_type(&self, id: NodeId) -> Result<Option<ConnectionType>, DesignError> {
        let node = &self.nodes[id];
        let loc = node.loc.clone();
        match &node.kind {
            NodeKind::Signal => Ok(self.input_ty(id, 0)),

            NodeKind::Arithmetic(_) => self.join_operands(id, &[0, 1], true),

            NodeKind::Logic(op) => {
                let ports: Vec<u32> = (0..op.arity() as u32).collect();
                self.join_operands(id, &ports, true)
            }

            NodeKind::Compare(_) => {
                // Operands must agree; the output stays {Bool, 1}.
                self.join_operands(id, &[0, 1], false)?;
                Ok(None)
            }

            NodeKind::Multiplexer { data_inputs } => {
                let ports: Vec<u32> = (1..=*data_inputs).collect();
                self.require_equal(id, &ports)
            }

            NodeKind::PriorityConditional => {
                let choices = prio::num_choices(node.num_inputs());
                for i in 0..choices {
                    self.require_bool(id, prio::condition(i))?;
                }
                let mut ports = vec![prio::DEFAULT];
                ports.extend((0..choices).map(prio::value));
                self.require_equal(id, &ports)
            }

            NodeKind::Register => {
                self.require_bool(id, register::ENABLE)?;
                self.require_equal(id, &[register::DATA, register::RESET_VALUE])
            }

            NodeKind::MemPort(_) => {
                self.require_bool(id, mem_port::WR_ENABLE)?;
                let Some(mem) = self.non_signal_driver(id, mem_port::MEMORY) else {
                    return Ok(None);
                };
                let NodeKind::Memory(cfg) = &self.nodes[mem.node].kind else {
                    return Err(DesignError::new(
                        DesignErrorKind::InvalidPort,
                        "memory port input 0 must be driven by a memory node",
                        loc,
                    )
                    .with_ports(vec![mem]));
                };
                let word = ConnectionType::raw(cfg.word_width);
                if let Some(data_ty) = self.input_ty(id, mem_port::WR_DATA) {
                    if data_ty.width != cfg.word_width {
                        return Err(DesignError::new(
                            DesignErrorKind::TypeConflict,
                            format!(
                                "write data is {} bits but the memory word is {} bits",
                                data_ty.width, cfg.word_width
                            ),
                            loc,
                        ));
                    }
                }
                Ok(Some(word))
            }

            NodeKind::Cdc(_) => Ok(self.input_ty(id, 0)),

            NodeKind::ExportOverride => {
                self.require_equal(id, &[export_override::SIM, export_override::EXPORT])
            }

            NodeKind::MultiDriver { inputs } => {
                let ports: Vec<u32> = (0..*inputs).collect();
                self.require_equal(id, &ports)
            }

            NodeKind::SignalTap(cfg) => {
                if matches!(cfg.level, TapLevel::Assert | TapLevel::Warn) {
                    self.require_bool(id, 0)?;
                }
                Ok(None)
            }

            NodeKind::Rewire { op, .. } => {
                for range in &op.ranges {
                    if let RangeSource::Input { input, offset } = range.source {
                        if let Some(ty) = self.input_ty(id, input) {
                            if offset + range.width > ty.width {
                                return Err(DesignError::new(
                                    DesignErrorKind::InvalidRewire,
                                    format!(
                                        "range [{}, {}) exceeds the {}-bit input {}",
                                        offset,
                                        offset + range.width,
                                        ty.width,
                                        input
                                    ),
                                    loc,
                                ));
                            }
                        }
                    }
                }
                Ok(None)
            }

            NodeKind::Pin { param, ty } => {
                if !matches!(param.direction, PinDirection::Input) {
                    if let Some(in_ty) = self.input_ty(id, 0) {
                        if in_ty != *ty {
                            return Err(DesignError::new(
                                DesignErrorKind::TypeConflict,
                                format!("pin of type {ty} driven by {in_ty}"),
                                loc,
                            ));
                        }
                    }
                }
                Ok(None)
            }

            // Outputs fixed at creation or no outputs at all.
            NodeKind::Constant { .. }
            | NodeKind::Memory(_)
            | NodeKind::External(_)
            | NodeKind::Attributes(_)
            | NodeKind::PathAttributes(_) => Ok(None),
        }
    }

    /// Joins operand types: equal interpretation required; the result takes
    /// the maximum width (`widen`) or requires equal widths.
    fn join_operands(
        &self,
        id: NodeId,
        ports: &[u32],
        widen: bool,
    ) -> Result<Option<ConnectionType>, DesignError> {
        let node = &self.nodes[id];
        let mut joined: Option<ConnectionType> = None;
        for &port in ports {
            let Some(ty) = self.input_ty(id, port) else {
                continue;
            };
            joined = Some(match joined {
                None => ty,
                Some(prev) => {
                    if prev.interp != ty.interp {
                        return Err(DesignError::new(
                            DesignErrorKind::MismatchedInterpretation,
                            format!("cannot combine {prev} with {ty}"),
                            node.loc.clone(),
                        )
                        .with_ports(self.driver_ports(id, ports)));
                    }
                    if !widen && prev.width != ty.width {
                        return Err(DesignError::new(
                            DesignErrorKind::TypeConflict,
                            format!("operand widths differ: {prev} vs {ty}"),
                            node.loc.clone(),
                        )
                        .with_ports(self.driver_ports(id, ports)));
                    }
                    ConnectionType {
                        interp: prev.interp,
                        width: prev.width.max(ty.width),
                    }
                }
            });
        }
        Ok(joined)
    }

    /// Requires all connected ports to carry exactly the same type.
    fn require_equal(&self, id: NodeId, ports: &[u32]) -> Result<Option<ConnectionType>, DesignError> {
        let node = &self.nodes[id];
        let mut joined: Option<ConnectionType> = None;
        for &port in ports {
            let Some(ty) = self.input_ty(id, port) else {
                continue;
            };
            match joined {
                None => joined = Some(ty),
                Some(prev) if prev != ty => {
                    return Err(DesignError::new(
                        DesignErrorKind::TypeConflict,
                        format!("inputs must carry the same type: {prev} vs {ty}"),
                        node.loc.clone(),
                    )
                    .with_ports(self.driver_ports(id, ports)));
                }
                Some(_) => {}
            }
        }
        Ok(joined)
    }

    fn require_bool(&self, id: NodeId, port: u32) -> Result<(), DesignError> {
        if let Some(ty) = self.input_ty(id, port) {
            if ty != ConnectionType::bool() {
                return Err(DesignError::new(
                    DesignErrorKind::MismatchedInterpretation,
                    format!(
                        "input '{}' must be bool, got {ty}",
                        self.nodes[id].kind.input_name(port)
                    ),
                    self.nodes[id].loc.clone(),
                ));
            }
        }
        Ok(())
    }

    fn driver_ports(&self, id: NodeId, inputs: &[u32]) -> Vec<NodePort> {
        inputs
            .iter()
            .filter_map(|&i| self.nodes[id].driver(i))
            .collect()
    }

    /// Sets an output type, refusing changes to an already-consumed output.
    /// The previous type is pushed onto `undo` so a failing cascade can be
    /// unwound. Returns whether the type changed.
    fn set_output_type(
        &mut self,
        id: NodeId,
        port: u32,
        ty: ConnectionType,
        undo: &mut Vec<(NodePort, ConnectionType)>,
    ) -> Result<bool, DesignError> {
        let out = &self.nodes[id].outputs[port as usize];
        if out.ty == ty {
            return Ok(false);
        }
        if !out.ty.is_unset() && !out.sinks.is_empty() {
            let old = out.ty;
            return Err(DesignError::new(
                DesignErrorKind::TypeConflict,
                format!("output already consumed as {old}, cannot become {ty}"),
                self.nodes[id].loc.clone(),
            )
            .with_ports(vec![NodePort { node: id, port }]));
        }
        undo.push((NodePort { node: id, port }, out.ty));
        self.nodes[id].outputs[port as usize].ty = ty;
        Ok(true)
    }

    // --- verification -----------------------------------------------------

    /// Checks the structural invariants of the graph.
    ///
    /// Verified: symmetric driver/sink back-references, signal and register
    /// shapes, clock bindings of registers, and the absence of cycles
    /// through immediate outputs.
    pub fn verify(&self) -> Result<(), DesignError> {
        self.verify_back_references()?;
        self.verify_node_shapes()?;
        self.verify_acyclic()
    }

    fn verify_back_references(&self) -> Result<(), DesignError> {
        for (id, node) in self.nodes.iter() {
            for (input, driver) in node.inputs.iter().enumerate() {
                let Some(driver) = driver else { continue };
                let sinks = &self.nodes[driver.node].outputs[driver.port as usize].sinks;
                let count = sinks
                    .iter()
                    .filter(|s| s.node == id && s.input == input as u32)
                    .count();
                if count != 1 {
                    return Err(DesignError::new(
                        DesignErrorKind::InvalidPort,
                        format!(
                            "driver of input {input} holds {count} back-references instead of 1"
                        ),
                        node.loc.clone(),
                    )
                    .with_ports(vec![*driver]));
                }
            }
            for (port, out) in node.outputs.iter().enumerate() {
                for sink in &out.sinks {
                    let back = self.nodes[sink.node].driver(sink.input);
                    if back
                        != Some(NodePort {
                            node: id,
                            port: port as u32,
                        })
                    {
                        return Err(DesignError::new(
                            DesignErrorKind::InvalidPort,
                            format!("sink of output {port} does not point back"),
                            node.loc.clone(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn verify_node_shapes(&self) -> Result<(), DesignError> {
        for (id, node) in self.nodes.iter() {
            match &node.kind {
                NodeKind::Signal => {
                    if node.num_inputs() != 1 || node.num_outputs() != 1 {
                        return Err(DesignError::new(
                            DesignErrorKind::InvalidPort,
                            "signal nodes have exactly one input and one output",
                            node.loc.clone(),
                        ));
                    }
                    if node.outputs[0].kind != OutputKind::Immediate {
                        return Err(DesignError::new(
                            DesignErrorKind::InvalidPort,
                            "signal outputs are immediate",
                            node.loc.clone(),
                        ));
                    }
                    if let Some(driver) = node.driver(0) {
                        let driver_ty = self.nodes[driver.node].outputs[driver.port as usize].ty;
                        if !driver_ty.is_unset() && driver_ty != node.outputs[0].ty {
                            return Err(DesignError::new(
                                DesignErrorKind::TypeConflict,
                                "signal type differs from its driver",
                                node.loc.clone(),
                            )
                            .with_ports(vec![driver, NodePort { node: id, port: 0 }]));
                        }
                    }
                }
                NodeKind::Register => {
                    if node.clock(0).is_none() {
                        return Err(DesignError::new(
                            DesignErrorKind::ConflictingClockBinding,
                            "register is not bound to a clock",
                            node.loc.clone(),
                        ));
                    }
                    if node.outputs[0].kind != OutputKind::Latched {
                        return Err(DesignError::new(
                            DesignErrorKind::InvalidPort,
                            "register data output must be latched",
                            node.loc.clone(),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Every cycle must be closed by at least one latched output. Cycles
    /// through immediate outputs only are reported with their members.
    fn verify_acyclic(&self) -> Result<(), DesignError> {
        let mut graph = DiGraph::<NodeId, ()>::new();
        let mut index = HashMap::new();
        for id in self.nodes.ids() {
            index.insert(id, graph.add_node(id));
        }
        for (id, node) in self.nodes.iter() {
            for input in 0..node.num_inputs() as u32 {
                let Some(driver) = self.non_signal_driver(id, input) else {
                    continue;
                };
                if self.nodes[driver.node].outputs[driver.port as usize].kind
                    == OutputKind::Immediate
                {
                    graph.add_edge(index[&driver.node], index[&id], ());
                }
            }
        }
        for scc in petgraph::algo::tarjan_scc(&graph) {
            let cyclic = scc.len() > 1
                || (scc.len() == 1 && graph.find_edge(scc[0], scc[0]).is_some());
            if cyclic {
                let mut nodes: Vec<NodeId> = scc.iter().map(|&ix| graph[ix]).collect();
                nodes.sort();
                let loc = self.nodes[nodes[0]].loc.clone();
                return Err(DesignError::new(
                    DesignErrorKind::CombinationalCycle,
                    format!("{} nodes form a cycle without a register", nodes.len()),
                    loc,
                )
                .with_ports(
                    nodes
                        .into_iter()
                        .map(|node| NodePort { node, port: 0 })
                        .collect(),
                ));
            }
        }
        Ok(())
    }
}

/// Computes the port shape of a node kind, validating its payload.
fn shape_of(kind: &NodeKind, loc: &SourceLoc) -> Result<NodeShape, DesignError> {
    let unset = (ConnectionType::unset(), OutputKind::Immediate);
    let shape = |inputs, outputs, clocks| NodeShape {
        inputs,
        outputs,
        clocks,
    };
    match kind {
        NodeKind::Signal => Ok(shape(1, vec![unset], 0)),

        NodeKind::Constant { value, ty } => {
            check_width(ty, loc)?;
            if value.len() != ty.width as usize {
                return Err(DesignError::new(
                    DesignErrorKind::InvalidConstant,
                    format!("constant has {} bits but type {ty}", value.len()),
                    loc.clone(),
                ));
            }
            Ok(shape(0, vec![(*ty, OutputKind::Constant)], 0))
        }

        NodeKind::Rewire { op, ty } => {
            check_width(ty, loc)?;
            if op.total_width() != ty.width {
                return Err(DesignError::new(
                    DesignErrorKind::InvalidRewire,
                    format!(
                        "ranges sum to {} bits but the output is {} bits",
                        op.total_width(),
                        ty.width
                    ),
                    loc.clone(),
                ));
            }
            if op.ranges.iter().any(|r| r.width == 0) {
                return Err(DesignError::new(
                    DesignErrorKind::InvalidRewire,
                    "zero-width range",
                    loc.clone(),
                ));
            }
            Ok(shape(op.num_inputs(), vec![(*ty, OutputKind::Immediate)], 0))
        }

        NodeKind::Arithmetic(_) => Ok(shape(2, vec![unset], 0)),
        NodeKind::Logic(op) => Ok(shape(op.arity(), vec![unset], 0)),
        NodeKind::Compare(_) => Ok(shape(
            2,
            vec![(ConnectionType::bool(), OutputKind::Immediate)],
            0,
        )),

        NodeKind::Multiplexer { data_inputs } => {
            if *data_inputs == 0 {
                return Err(DesignError::new(
                    DesignErrorKind::InvalidPort,
                    "multiplexer needs at least one data input",
                    loc.clone(),
                ));
            }
            Ok(shape(1 + *data_inputs as usize, vec![unset], 0))
        }

        NodeKind::PriorityConditional => Ok(shape(1, vec![unset], 0)),

        NodeKind::Register => Ok(shape(
            3,
            vec![(ConnectionType::unset(), OutputKind::Latched)],
            1,
        )),

        NodeKind::Memory(cfg) => {
            if cfg.word_width == 0 || cfg.depth == 0 {
                return Err(DesignError::new(
                    DesignErrorKind::ZeroWidth,
                    format!("memory of {} words x {} bits", cfg.depth, cfg.word_width),
                    loc.clone(),
                ));
            }
            if let Some(initial) = &cfg.initial {
                if initial.len() != (cfg.word_width * cfg.depth) as usize {
                    return Err(DesignError::new(
                        DesignErrorKind::InvalidConstant,
                        format!(
                            "initial contents hold {} bits, expected {}",
                            initial.len(),
                            cfg.word_width * cfg.depth
                        ),
                        loc.clone(),
                    ));
                }
            }
            Ok(shape(
                0,
                vec![(
                    ConnectionType::raw(cfg.word_width),
                    OutputKind::Constant,
                )],
                0,
            ))
        }

        NodeKind::MemPort(_) => Ok(shape(4, vec![unset], 1)),

        NodeKind::Pin { param, ty } => {
            check_width(ty, loc)?;
            let inputs = match param.direction {
                PinDirection::Input => 0,
                PinDirection::Output | PinDirection::Bidirectional => 1,
            };
            Ok(shape(inputs, vec![(*ty, OutputKind::Immediate)], 0))
        }

        NodeKind::External(desc) => {
            if let Err(message) = desc.check() {
                return Err(DesignError::new(
                    DesignErrorKind::InvalidExternal,
                    message,
                    loc.clone(),
                ));
            }
            Ok(shape(
                desc.ins.len(),
                desc.outs
                    .iter()
                    .map(|p| (p.ty, OutputKind::Immediate))
                    .collect(),
                0,
            ))
        }

        NodeKind::SignalTap(_) => Ok(shape(1, vec![], 0)),
        NodeKind::ExportOverride => Ok(shape(2, vec![unset], 0)),
        NodeKind::Attributes(_) => Ok(shape(1, vec![], 0)),
        NodeKind::PathAttributes(_) => Ok(shape(2, vec![], 0)),
        NodeKind::Cdc(_) => Ok(shape(1, vec![unset], 2)),

        NodeKind::MultiDriver { inputs } => {
            if *inputs == 0 {
                return Err(DesignError::new(
                    DesignErrorKind::InvalidPort,
                    "multi-driver needs at least one input",
                    loc.clone(),
                ));
            }
            Ok(shape(*inputs as usize, vec![unset], 0))
        }
    }
}

fn check_width(ty: &ConnectionType, loc: &SourceLoc) -> Result<(), DesignError> {
    if ty.width == 0 {
        return Err(DesignError::new(
            DesignErrorKind::ZeroWidth,
            format!("type {ty} has zero width"),
            loc.clone(),
        ));
    }
    Ok(())
}
