//! Entity extraction and VHDL emission.
//!
//! The group tree is walked once: every `Entity` group becomes a VHDL
//! entity whose scope also covers its inlined `Area`/`Procedure` subgroups.
//! Values crossing entity boundaries are routed through ports along the
//! hierarchy (producer side exports, consumer side imports, meeting at the
//! lowest common ancestor); pins and clock/reset globals bubble up to the
//! root entity.

use crate::error::ExportError;
use crate::formatting::{CodeFormatting, SignalRole};
use crate::namespace::Namespace;
use crate::render;
use silica_hlim::node::{export_override, mem_port, prio, register};
use silica_hlim::{
    ArithOp, CdcParameter, Circuit, ClockId, CompareOp, ConnectionType, GenericValue, GroupId,
    GroupKind, Interpretation, LogicOp, NodeId, NodeKind, NodePort, PinDirection, RangeSource,
    ResetType, TapLevel, TriggerEvent,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

/// One SDC path constraint collected from a crossing marker.
pub(crate) struct SdcConstraint {
    pub entity: String,
    pub src: String,
    pub dst: String,
    pub param: CdcParameter,
}

/// A planned entity with routing and naming resolved.
pub(crate) struct EntityPlan {
    pub group: GroupId,
    pub parent: Option<usize>,
    pub name: String,
    /// Names of ancestor entities, outermost first (for file placement).
    pub path: Vec<String>,
    /// Nodes rendered inside this entity, in creation order.
    scope: Vec<NodeId>,
    children: Vec<usize>,
    /// Values entering through ports, sorted for determinism.
    ports_in: Vec<NodePort>,
    /// Values leaving through ports.
    ports_out: Vec<NodePort>,
    /// Pin nodes surfacing here (own or bubbled up from descendants).
    pins: Vec<NodeId>,
    /// Clock ports needed by this entity or its descendants.
    clocks: Vec<ClockId>,
    /// Reset ports needed.
    resets: Vec<ClockId>,
    /// In-scope name of every routed or locally produced value.
    names: HashMap<NodePort, String>,
    /// Port name of every routed out value (the local is copied into it).
    out_port_names: HashMap<NodePort, String>,
    /// Pin base names.
    pin_names: HashMap<NodeId, String>,
    /// Memory array names.
    mem_names: HashMap<NodeId, String>,
    /// Declared local signals `(name, type, example port)`.
    locals: Vec<(String, ConnectionType, NodePort)>,
    /// Child instance labels, parallel to `children`.
    instance_labels: Vec<String>,
}

/// The fully resolved export plan.
pub(crate) struct ExportPlan {
    pub entities: Vec<EntityPlan>,
    pub clock_names: BTreeMap<ClockId, String>,
    pub reset_names: BTreeMap<ClockId, String>,
    pub sdc: Vec<SdcConstraint>,
}

fn ty_of(circuit: &Circuit, port: NodePort) -> ConnectionType {
    circuit.node(port.node).output(port.port).ty
}

fn is_pin_producer(circuit: &Circuit, port: NodePort) -> bool {
    matches!(circuit.node(port.node).kind(), NodeKind::Pin { param, .. }
        if param.direction != PinDirection::Output)
}

fn resolve(circuit: &Circuit, node: NodeId, input: u32) -> Option<NodePort> {
    circuit.non_signal_driver(node, input)
}

/// A name candidate for a produced value: the producer's own name, a named
/// signal alias fed by it, or the producer's port name.
fn desired_name(circuit: &Circuit, port: NodePort) -> String {
    let node = circuit.node(port.node);
    if !node.name.is_empty() {
        return node.name.clone();
    }
    for sink in node.output(port.port).sinks() {
        let sink_node = circuit.node(sink.node);
        if sink_node.is_signal() && !sink_node.name.is_empty() {
            return sink_node.name.clone();
        }
    }
    node.kind().output_name(port.port)
}

impl ExportPlan {
    /// Builds the complete plan: entity discovery, boundary routing, clock
    /// propagation, and name allocation.
    pub(crate) fn build(circuit: &Circuit, fmt: &dyn CodeFormatting) -> Result<Self, ExportError> {
        let mut root_ns = Namespace::new();

        // Globals first: clock and reset names are shared by all entities.
        let mut clock_names = BTreeMap::new();
        let mut reset_names = BTreeMap::new();
        for (clock_id, clock) in circuit.clocks() {
            let name = root_ns.allocate(&[], &clock.name, |attempt| {
                fmt.global_name(&clock.name, attempt)
            })?;
            clock_names.insert(clock_id, name);
            let reset = root_ns.allocate(&[], &clock.reset_name, |attempt| {
                fmt.global_name(&clock.reset_name, attempt)
            })?;
            reset_names.insert(clock_id, reset);
        }

        // Entity discovery.
        let mut entities: Vec<EntityPlan> = Vec::new();
        let mut entity_of_group: HashMap<GroupId, usize> = HashMap::new();
        discover(circuit, circuit.root_group(), None, &mut entities, &mut entity_of_group, fmt, &mut root_ns)?;

        let mut entity_of_node: HashMap<NodeId, usize> = HashMap::new();
        for (idx, plan) in entities.iter().enumerate() {
            for &node in &plan.scope {
                entity_of_node.insert(node, idx);
            }
        }

        // Boundary routing.
        let mut ports_in: Vec<BTreeSet<NodePort>> = vec![BTreeSet::new(); entities.len()];
        let mut ports_out: Vec<BTreeSet<NodePort>> = vec![BTreeSet::new(); entities.len()];
        let mut pins: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); entities.len()];

        let ancestors = |mut idx: usize| -> Vec<usize> {
            let mut chain = vec![idx];
            while let Some(parent) = entities[idx].parent {
                chain.push(parent);
                idx = parent;
            }
            chain
        };

        for (consumer, node) in circuit.nodes() {
            if node.is_signal() {
                continue;
            }
            let Some(&ce) = entity_of_node.get(&consumer) else {
                continue;
            };
            for input in 0..node.num_inputs() as u32 {
                let Some(rp) = resolve(circuit, consumer, input) else {
                    continue;
                };
                // Constants are inlined at their use sites.
                if matches!(circuit.node(rp.node).kind(), NodeKind::Constant { .. }) {
                    continue;
                }
                let Some(&pe) = entity_of_node.get(&rp.node) else {
                    continue;
                };
                if pe == ce {
                    continue;
                }
                let up = ancestors(pe);
                let down = ancestors(ce);
                let lca = *up
                    .iter()
                    .find(|idx| down.contains(idx))
                    .expect("entities share the root");
                // Pin values surface through the pin port chain instead of
                // dedicated out ports.
                if !is_pin_producer(circuit, rp) {
                    for &idx in up.iter().take_while(|&&idx| idx != lca) {
                        ports_out[idx].insert(rp);
                    }
                }
                for &idx in down.iter().take_while(|&&idx| idx != lca) {
                    ports_in[idx].insert(rp);
                }
            }
        }

        // Pins bubble from their entity to the root.
        for (id, node) in circuit.nodes() {
            if let NodeKind::Pin { param, .. } = node.kind() {
                if param.simulation_only {
                    continue;
                }
                let Some(&pe) = entity_of_node.get(&id) else {
                    continue;
                };
                for idx in ancestors(pe) {
                    pins[idx].insert(id);
                }
            }
        }

        // Clock/reset needs, bottom-up (children were discovered after their
        // parents, so a reverse scan sees children first).
        let mut clock_needs: Vec<BTreeSet<ClockId>> = vec![BTreeSet::new(); entities.len()];
        let mut reset_needs: Vec<BTreeSet<ClockId>> = vec![BTreeSet::new(); entities.len()];
        for idx in (0..entities.len()).rev() {
            for &node_id in &entities[idx].scope {
                let node = circuit.node(node_id);
                let clocked = matches!(node.kind(), NodeKind::Register)
                    || matches!(node.kind(), NodeKind::MemPort(cfg) if cfg.has_write);
                if clocked {
                    if let Some(clock) = node.clock(0) {
                        clock_needs[idx].insert(clock);
                        if circuit.clock(clock).attributes.reset_type != ResetType::None
                            && matches!(node.kind(), NodeKind::Register)
                        {
                            reset_needs[idx].insert(clock);
                        }
                    }
                }
            }
            for child in entities[idx].children.clone() {
                let child_clocks: Vec<ClockId> = clock_needs[child].iter().copied().collect();
                let child_resets: Vec<ClockId> = reset_needs[child].iter().copied().collect();
                clock_needs[idx].extend(child_clocks);
                reset_needs[idx].extend(child_resets);
            }
        }

        for idx in 0..entities.len() {
            entities[idx].ports_in = ports_in[idx].iter().copied().collect();
            entities[idx].ports_out = ports_out[idx].iter().copied().collect();
            entities[idx].pins = pins[idx].iter().copied().collect();
            entities[idx].clocks = clock_needs[idx].iter().copied().collect();
            entities[idx].resets = reset_needs[idx].iter().copied().collect();
        }

        // Naming, per entity.
        for idx in 0..entities.len() {
            allocate_names(circuit, &mut entities, idx, fmt, &root_ns)?;
        }

        // CDC constraints, with names now fixed.
        let mut sdc = Vec::new();
        for (id, node) in circuit.nodes() {
            let NodeKind::Cdc(param) = node.kind() else {
                continue;
            };
            let Some(&idx) = entity_of_node.get(&id) else {
                continue;
            };
            let plan = &entities[idx];
            let src = resolve(circuit, id, 0)
                .and_then(|rp| plan.names.get(&rp).cloned())
                .unwrap_or_else(|| "*".to_string());
            let dst = plan
                .names
                .get(&NodePort { node: id, port: 0 })
                .cloned()
                .unwrap_or_else(|| "*".to_string());
            sdc.push(SdcConstraint {
                entity: plan.name.clone(),
                src,
                dst,
                param: *param,
            });
        }

        Ok(ExportPlan {
            entities,
            clock_names,
            reset_names,
            sdc,
        })
    }
}

/// Recursively discovers entity groups and their inlined scopes.
fn discover(
    circuit: &Circuit,
    group: GroupId,
    parent: Option<usize>,
    entities: &mut Vec<EntityPlan>,
    entity_of_group: &mut HashMap<GroupId, usize>,
    fmt: &dyn CodeFormatting,
    root_ns: &mut Namespace,
) -> Result<usize, ExportError> {
    let group_data = circuit.group(group);
    let name = root_ns.allocate(&[], &group_data.name, |attempt| {
        fmt.entity_name(&group_data.name, attempt)
    })?;
    let path = match parent {
        Some(parent_idx) => {
            let mut p = entities[parent_idx].path.clone();
            p.push(entities[parent_idx].name.clone());
            p
        }
        None => Vec::new(),
    };
    let idx = entities.len();
    entities.push(EntityPlan {
        group,
        parent,
        name,
        path,
        scope: Vec::new(),
        children: Vec::new(),
        ports_in: Vec::new(),
        ports_out: Vec::new(),
        pins: Vec::new(),
        clocks: Vec::new(),
        resets: Vec::new(),
        names: HashMap::new(),
        out_port_names: HashMap::new(),
        pin_names: HashMap::new(),
        mem_names: HashMap::new(),
        locals: Vec::new(),
        instance_labels: Vec::new(),
    });
    entity_of_group.insert(group, idx);
    collect_scope(circuit, group, idx, entities, entity_of_group, fmt, root_ns)?;
    Ok(idx)
}

/// Adds a group's nodes to the entity scope and recurses: entity subgroups
/// become child entities, everything else is inlined.
fn collect_scope(
    circuit: &Circuit,
    group: GroupId,
    idx: usize,
    entities: &mut Vec<EntityPlan>,
    entity_of_group: &mut HashMap<GroupId, usize>,
    fmt: &dyn CodeFormatting,
    root_ns: &mut Namespace,
) -> Result<(), ExportError> {
    let nodes = circuit.group(group).nodes.clone();
    entities[idx].scope.extend(nodes);
    for child_group in circuit.group(group).children.clone() {
        if circuit.group(child_group).kind == GroupKind::Entity {
            let child_idx = discover(
                circuit,
                child_group,
                Some(idx),
                entities,
                entity_of_group,
                fmt,
                root_ns,
            )?;
            entities[idx].children.push(child_idx);
        } else {
            collect_scope(circuit, child_group, idx, entities, entity_of_group, fmt, root_ns)?;
        }
    }
    Ok(())
}

/// Allocates every name an entity needs: pin ports, routed ports, locals,
/// memory arrays, and instance labels.
fn allocate_names(
    circuit: &Circuit,
    entities: &mut [EntityPlan],
    idx: usize,
    fmt: &dyn CodeFormatting,
    root_ns: &Namespace,
) -> Result<(), ExportError> {
    let mut ns = Namespace::new();
    let parents = [root_ns];

    // Pin ports keep their base name across the hierarchy where possible.
    for &pin in &entities[idx].pins.clone() {
        let node = circuit.node(pin);
        let NodeKind::Pin { param, .. } = node.kind() else {
            continue;
        };
        let role = match param.direction {
            PinDirection::Input => SignalRole::Input,
            PinDirection::Output => SignalRole::Output,
            PinDirection::Bidirectional => SignalRole::Inout,
        };
        let desired = if node.name.is_empty() {
            "pin"
        } else {
            node.name.as_str()
        };
        let name = ns.allocate(&parents, desired, |attempt| {
            fmt.signal_name(desired, role, attempt)
        })?;
        entities[idx].pin_names.insert(pin, name.clone());
        if param.direction != PinDirection::Output {
            entities[idx]
                .names
                .insert(NodePort { node: pin, port: 0 }, value_name_of_pin(&name, param));
        }
    }

    // Routed in ports: the port name is the in-scope value name.
    for rp in entities[idx].ports_in.clone() {
        let desired = desired_name(circuit, rp);
        let name = ns.allocate(&parents, &desired, |attempt| {
            fmt.signal_name(&desired, SignalRole::Input, attempt)
        })?;
        entities[idx].names.insert(rp, name);
    }

    // Routed out ports: a local carries the value, the port copies it.
    for rp in entities[idx].ports_out.clone() {
        let desired = desired_name(circuit, rp);
        let port_name = ns.allocate(&parents, &desired, |attempt| {
            fmt.signal_name(&desired, SignalRole::Output, attempt)
        })?;
        entities[idx].out_port_names.insert(rp, port_name);
    }

    // Locals for every consumed in-scope value.
    for node_id in entities[idx].scope.clone() {
        let node = circuit.node(node_id);
        match node.kind() {
            NodeKind::Signal | NodeKind::Constant { .. } | NodeKind::Pin { .. } => continue,
            NodeKind::Memory(_) => {
                let desired = if node.name.is_empty() {
                    "mem"
                } else {
                    node.name.as_str()
                };
                let name = ns.allocate(&parents, desired, |attempt| {
                    fmt.signal_name(desired, SignalRole::Memory, attempt)
                })?;
                // Claim the array type name derived from it as well.
                let _ = ns.try_claim(&format!("{name}_t"), &parents);
                entities[idx].mem_names.insert(node_id, name);
                continue;
            }
            _ => {}
        }
        for port in 0..node.num_outputs() as u32 {
            let out = node.output(port);
            if out.ty.width == 0 {
                continue;
            }
            let rp = NodePort { node: node_id, port };
            if entities[idx].names.contains_key(&rp) {
                continue;
            }
            let needed = !out.sinks().is_empty()
                || matches!(node.kind(), NodeKind::Register)
                || entities[idx].out_port_names.contains_key(&rp);
            if !needed {
                continue;
            }
            let desired = desired_name(circuit, rp);
            let role = if matches!(node.kind(), NodeKind::Register) {
                SignalRole::Register
            } else {
                SignalRole::Local
            };
            let name = ns.allocate(&parents, &desired, |attempt| {
                fmt.signal_name(&desired, role, attempt)
            })?;
            entities[idx].locals.push((name.clone(), out.ty, rp));
            entities[idx].names.insert(rp, name);
        }
    }

    // Values surfacing from or sinking into child entities need a parent-side
    // name too (a local wired through the instance port map).
    for child in entities[idx].children.clone() {
        let routed: Vec<NodePort> = entities[child]
            .ports_in
            .iter()
            .chain(&entities[child].ports_out)
            .copied()
            .collect();
        for rp in routed {
            if entities[idx].names.contains_key(&rp) {
                continue;
            }
            let desired = desired_name(circuit, rp);
            let name = ns.allocate(&parents, &desired, |attempt| {
                fmt.signal_name(&desired, SignalRole::Local, attempt)
            })?;
            entities[idx]
                .locals
                .push((name.clone(), ty_of(circuit, rp), rp));
            entities[idx].names.insert(rp, name);
        }
        let desired = entities[child].name.clone();
        let label = ns.allocate(&parents, &desired, |attempt| {
            fmt.signal_name(&desired, SignalRole::Instance, attempt)
        })?;
        entities[idx].instance_labels.push(label);
    }

    Ok(())
}

/// The logic-side name of a pin port (the positive leg for differentials).
fn value_name_of_pin(base: &str, param: &silica_hlim::PinParameter) -> String {
    match &param.differential {
        Some((pos, _)) => format!("{base}{pos}"),
        None => base.to_string(),
    }
}

// --- emission ---------------------------------------------------------------

/// Emits the complete VHDL source of one entity.
pub(crate) fn emit_entity(
    circuit: &Circuit,
    plan: &ExportPlan,
    idx: usize,
    fmt: &dyn CodeFormatting,
) -> Result<String, ExportError> {
    let e = &plan.entities[idx];
    let ind = fmt.indent();
    let mut out = String::new();

    out.push_str(&fmt.file_header());
    out.push_str("LIBRARY ieee;\nUSE ieee.std_logic_1164.ALL;\nUSE ieee.numeric_std.ALL;\n\n");

    // Entity declaration.
    let mut port_lines: Vec<String> = Vec::new();
    for clock in &e.clocks {
        port_lines.push(format!("{} : IN STD_LOGIC", plan.clock_names[clock]));
    }
    for clock in &e.resets {
        port_lines.push(format!("{} : IN STD_LOGIC", plan.reset_names[clock]));
    }
    for &pin in &e.pins {
        let node = circuit.node(pin);
        let NodeKind::Pin { param, ty } = node.kind() else {
            continue;
        };
        let dir = match param.direction {
            PinDirection::Input => "IN",
            PinDirection::Output => "OUT",
            PinDirection::Bidirectional => "INOUT",
        };
        let base = &e.pin_names[&pin];
        let vty = render::vhdl_type(*ty, NodePort { node: pin, port: 0 })?;
        match &param.differential {
            Some((pos, neg)) => {
                port_lines.push(format!("{base}{pos} : {dir} {vty}"));
                port_lines.push(format!("{base}{neg} : {dir} {vty}"));
            }
            None => port_lines.push(format!("{base} : {dir} {vty}")),
        }
    }
    for rp in &e.ports_in {
        let vty = render::vhdl_type(ty_of(circuit, *rp), *rp)?;
        port_lines.push(format!("{} : IN {vty}", e.names[rp]));
    }
    for rp in &e.ports_out {
        let vty = render::vhdl_type(ty_of(circuit, *rp), *rp)?;
        port_lines.push(format!("{} : OUT {vty}", e.out_port_names[rp]));
    }

    let _ = writeln!(out, "ENTITY {} IS", e.name);
    if !port_lines.is_empty() {
        let _ = writeln!(out, "{ind}PORT(");
        for (i, line) in port_lines.iter().enumerate() {
            let sep = if i + 1 == port_lines.len() { "" } else { ";" };
            let _ = writeln!(out, "{ind}{ind}{line}{sep}");
        }
        let _ = writeln!(out, "{ind});");
    }
    let _ = writeln!(out, "END {};\n", e.name);

    // Architecture.
    let _ = writeln!(out, "ARCHITECTURE impl OF {} IS", e.name);

    // Component declarations for external modules, one per module name.
    let mut declared_components: BTreeSet<String> = BTreeSet::new();
    for &node_id in &e.scope {
        if let NodeKind::External(desc) = circuit.node(node_id).kind() {
            if declared_components.insert(desc.module_name.clone()) {
                emit_component_decl(&mut out, circuit, node_id, desc, ind)?;
            }
        }
    }

    // Memory array types.
    for &node_id in &e.scope {
        if let NodeKind::Memory(cfg) = circuit.node(node_id).kind() {
            let name = &e.mem_names[&node_id];
            let _ = writeln!(
                out,
                "{ind}TYPE {name}_t IS ARRAY (0 TO {}) OF STD_LOGIC_VECTOR({} downto 0);",
                cfg.depth - 1,
                cfg.word_width - 1
            );
            let _ = writeln!(out, "{ind}SIGNAL {name} : {name}_t;");
        }
    }

    for (name, ty, rp) in &e.locals {
        let vty = render::vhdl_type(*ty, *rp)?;
        let _ = writeln!(out, "{ind}SIGNAL {name} : {vty};");
    }

    let _ = writeln!(out, "BEGIN");

    let mut prio_nodes: Vec<NodeId> = Vec::new();
    for &node_id in &e.scope {
        let node = circuit.node(node_id);
        match node.kind() {
            NodeKind::PriorityConditional => prio_nodes.push(node_id),
            _ => emit_concurrent(&mut out, circuit, plan, idx, node_id, fmt)?,
        }
    }

    if !prio_nodes.is_empty() {
        emit_priority_process(&mut out, circuit, plan, idx, &prio_nodes, fmt)?;
    }

    for &node_id in &e.scope {
        if matches!(circuit.node(node_id).kind(), NodeKind::Register) {
            emit_register_process(&mut out, circuit, plan, idx, node_id, fmt)?;
        }
    }

    // Out ports copy their local.
    for rp in &e.ports_out {
        let _ = writeln!(out, "{ind}{} <= {};", e.out_port_names[rp], e.names[rp]);
    }

    // Child entity instantiations.
    for (slot, &child) in e.children.iter().enumerate() {
        emit_instance(&mut out, circuit, plan, idx, child, &e.instance_labels[slot], fmt)?;
    }

    let _ = writeln!(out, "END impl;");
    Ok(out)
}

fn input_ref(
    circuit: &Circuit,
    plan: &ExportPlan,
    idx: usize,
    node: NodeId,
    input: u32,
) -> Result<String, ExportError> {
    let Some(rp) = resolve(circuit, node, input) else {
        return Err(ExportError::UnboundInput {
            port: NodePort { node, port: input },
        });
    };
    if let NodeKind::Constant { value, ty } = circuit.node(rp.node).kind() {
        return Ok(render::literal(value, *ty));
    }
    plan.entities[idx]
        .names
        .get(&rp)
        .cloned()
        .ok_or(ExportError::UnboundInput {
            port: NodePort { node, port: input },
        })
}

fn input_ty(circuit: &Circuit, node: NodeId, input: u32) -> Option<ConnectionType> {
    resolve(circuit, node, input).map(|rp| ty_of(circuit, rp))
}

fn out_name<'a>(plan: &'a ExportPlan, idx: usize, node: NodeId) -> Option<&'a String> {
    plan.entities[idx].names.get(&NodePort { node, port: 0 })
}

/// Wraps an operand for numeric_std arithmetic.
fn arith_operand(name: String, ty: ConnectionType) -> String {
    match ty.interp {
        Interpretation::Raw => format!("UNSIGNED({name})"),
        _ => name,
    }
}

fn emit_concurrent(
    out: &mut String,
    circuit: &Circuit,
    plan: &ExportPlan,
    idx: usize,
    node_id: NodeId,
    fmt: &dyn CodeFormatting,
) -> Result<(), ExportError> {
    let e = &plan.entities[idx];
    let node = circuit.node(node_id);
    let ind = fmt.indent();
    let name = match out_name(plan, idx, node_id) {
        Some(name) => name.clone(),
        None => match node.kind() {
            // Output pins and taps have no named output but still render.
            NodeKind::Pin { .. } | NodeKind::SignalTap(_) | NodeKind::External(_)
            | NodeKind::MemPort(_) => String::new(),
            _ => return Ok(()),
        },
    };

    match node.kind() {
        NodeKind::Logic(op) => {
            let a = input_ref(circuit, plan, idx, node_id, 0)?;
            let expr = if *op == LogicOp::Not {
                format!("(not {a})")
            } else {
                let b = input_ref(circuit, plan, idx, node_id, 1)?;
                let word = match op {
                    LogicOp::And => "and",
                    LogicOp::Nand => "nand",
                    LogicOp::Or => "or",
                    LogicOp::Nor => "nor",
                    LogicOp::Xor => "xor",
                    LogicOp::Xnor => "xnor",
                    LogicOp::Not => unreachable!(),
                };
                format!("({a} {word} {b})")
            };
            let _ = writeln!(out, "{ind}{name} <= {expr};");
        }

        NodeKind::Arithmetic(op) => {
            let out_ty = node.output(0).ty;
            let a_ty = input_ty(circuit, node_id, 0).unwrap_or(out_ty);
            let b_ty = input_ty(circuit, node_id, 1).unwrap_or(out_ty);
            let a = arith_operand(input_ref(circuit, plan, idx, node_id, 0)?, a_ty);
            let b = arith_operand(input_ref(circuit, plan, idx, node_id, 1)?, b_ty);
            let core = match op {
                ArithOp::Add => format!("({a} + {b})"),
                ArithOp::Sub => format!("({a} - {b})"),
                ArithOp::Mul => format!("resize(({a} * {b}), {})", out_ty.width),
                ArithOp::Div => format!("resize(({a} / {b}), {})", out_ty.width),
                ArithOp::Rem => format!("resize(({a} rem {b}), {})", out_ty.width),
            };
            let expr = if out_ty.interp == Interpretation::Raw {
                format!("STD_LOGIC_VECTOR{core}")
            } else {
                core
            };
            let _ = writeln!(out, "{ind}{name} <= {expr};");
        }

        NodeKind::Compare(op) => {
            let a = input_ref(circuit, plan, idx, node_id, 0)?;
            let b = input_ref(circuit, plan, idx, node_id, 1)?;
            let sym = match op {
                CompareOp::Eq => "=",
                CompareOp::Neq => "/=",
                CompareOp::Lt => "<",
                CompareOp::Gt => ">",
                CompareOp::Leq => "<=",
                CompareOp::Geq => ">=",
            };
            let _ = writeln!(out, "{ind}{name} <= '1' when ({a} {sym} {b}) else '0';");
        }

        NodeKind::Multiplexer { data_inputs } => {
            let sel = input_ref(circuit, plan, idx, node_id, 0)?;
            let sel_ty = input_ty(circuit, node_id, 0).unwrap_or(ConnectionType::bool());
            let mut expr = String::new();
            for i in 0..*data_inputs - 1 {
                let value = input_ref(circuit, plan, idx, node_id, 1 + i)?;
                let lit = render::selector_literal(i as u64, sel_ty);
                let _ = write!(expr, "{value} when {sel} = {lit} else ");
            }
            expr.push_str(&input_ref(circuit, plan, idx, node_id, *data_inputs)?);
            let _ = writeln!(out, "{ind}{name} <= {expr};");
        }

        NodeKind::Rewire { op, .. } => {
            let expr = rewire_expr(circuit, plan, idx, node_id, op, node.output(0).ty)?;
            let _ = writeln!(out, "{ind}{name} <= {expr};");
        }

        NodeKind::Cdc(_) => {
            let a = input_ref(circuit, plan, idx, node_id, 0)?;
            let _ = writeln!(out, "{ind}{name} <= {a};");
        }

        NodeKind::ExportOverride => {
            let a = input_ref(circuit, plan, idx, node_id, export_override::EXPORT)?;
            let _ = writeln!(out, "{ind}{name} <= {a};");
        }

        NodeKind::MultiDriver { inputs } => {
            for input in 0..*inputs {
                if resolve(circuit, node_id, input).is_some() {
                    let a = input_ref(circuit, plan, idx, node_id, input)?;
                    let _ = writeln!(out, "{ind}{name} <= {a};");
                }
            }
        }

        NodeKind::SignalTap(cfg) => {
            let severity = match cfg.level {
                TapLevel::Assert => "error",
                TapLevel::Warn => "warning",
                TapLevel::Debug => "note",
                TapLevel::Watch => return Ok(()),
            };
            let cond = input_ref(circuit, plan, idx, node_id, 0)?;
            let _ = writeln!(
                out,
                "{ind}assert {cond} = '1' report \"{}\" severity {severity};",
                cfg.message
            );
        }

        NodeKind::Pin { param, .. } => {
            if param.direction != PinDirection::Input && !param.simulation_only {
                if resolve(circuit, node_id, 0).is_some() {
                    let driver = input_ref(circuit, plan, idx, node_id, 0)?;
                    let base = &e.pin_names[&node_id];
                    match &param.differential {
                        Some((pos, neg)) => {
                            let _ = writeln!(out, "{ind}{base}{pos} <= {driver};");
                            let _ = writeln!(out, "{ind}{base}{neg} <= not {driver};");
                        }
                        None => {
                            let _ = writeln!(out, "{ind}{base} <= {driver};");
                        }
                    }
                }
            }
        }

        NodeKind::MemPort(cfg) => {
            emit_mem_port(out, circuit, plan, idx, node_id, cfg.has_write, fmt)?;
        }

        NodeKind::External(desc) => {
            emit_external_instance(out, circuit, plan, idx, node_id, desc, fmt)?;
        }

        // Registers and priority conditionals render as processes; the rest
        // has no concurrent form.
        _ => {}
    }
    Ok(())
}

fn rewire_expr(
    circuit: &Circuit,
    plan: &ExportPlan,
    idx: usize,
    node_id: NodeId,
    op: &silica_hlim::RewireOp,
    out_ty: ConnectionType,
) -> Result<String, ExportError> {
    // Single-bit extract into a boolean wire.
    if let Some(bit) = op.as_bit_extract() {
        let name = input_ref(circuit, plan, idx, node_id, 0)?;
        let in_ty = input_ty(circuit, node_id, 0).unwrap_or(out_ty);
        if out_ty.interp == Interpretation::Bool {
            return Ok(if in_ty.width == 1 && in_ty.interp == Interpretation::Bool {
                name
            } else {
                format!("{name}({bit})")
            });
        }
    }

    let mut pieces = Vec::new();
    for range in &op.ranges {
        let piece = match range.source {
            RangeSource::Input { input, offset } => {
                let name = input_ref(circuit, plan, idx, node_id, input)?;
                let in_ty = input_ty(circuit, node_id, input).unwrap_or(out_ty);
                if in_ty.interp == Interpretation::Bool {
                    name
                } else if offset == 0 && range.width == in_ty.width {
                    render::as_slv(&name, in_ty)
                } else {
                    let sliced =
                        format!("{name}({} downto {})", offset + range.width - 1, offset);
                    render::as_slv(&sliced, in_ty)
                }
            }
            RangeSource::Zero => format!("\"{}\"", "0".repeat(range.width as usize)),
            RangeSource::One => format!("\"{}\"", "1".repeat(range.width as usize)),
        };
        pieces.push(piece);
    }
    let joined = pieces.join(" & ");
    let expr = if pieces.len() > 1 {
        format!("({joined})")
    } else {
        joined
    };
    Ok(render::from_slv(expr, out_ty))
}

fn emit_priority_process(
    out: &mut String,
    circuit: &Circuit,
    plan: &ExportPlan,
    idx: usize,
    nodes: &[NodeId],
    fmt: &dyn CodeFormatting,
) -> Result<(), ExportError> {
    let ind = fmt.indent();

    // Sensitivity: every distinct value the process reads.
    let mut sensitivity: Vec<String> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for &node_id in nodes {
        let node = circuit.node(node_id);
        for input in 0..node.num_inputs() as u32 {
            if let Some(rp) = resolve(circuit, node_id, input) {
                if matches!(circuit.node(rp.node).kind(), NodeKind::Constant { .. }) {
                    continue;
                }
                if let Some(name) = plan.entities[idx].names.get(&rp) {
                    if seen.insert(name.clone()) {
                        sensitivity.push(name.clone());
                    }
                }
            }
        }
    }

    let _ = writeln!(out, "{ind}combinatorial : PROCESS({})", sensitivity.join(", "));
    let _ = writeln!(out, "{ind}BEGIN");
    for &node_id in nodes {
        let Some(name) = out_name(plan, idx, node_id) else {
            continue;
        };
        let name = name.clone();
        let node = circuit.node(node_id);
        let choices = prio::num_choices(node.num_inputs());
        for choice in 0..choices {
            let keyword = if choice == 0 { "IF" } else { "ELSIF" };
            let cond = input_ref(circuit, plan, idx, node_id, prio::condition(choice))?;
            let value = input_ref(circuit, plan, idx, node_id, prio::value(choice))?;
            let _ = writeln!(out, "{ind}{ind}{keyword} {cond} = '1' THEN");
            let _ = writeln!(out, "{ind}{ind}{ind}{name} <= {value};");
        }
        let default = input_ref(circuit, plan, idx, node_id, prio::DEFAULT)?;
        if choices == 0 {
            let _ = writeln!(out, "{ind}{ind}{name} <= {default};");
        } else {
            let _ = writeln!(out, "{ind}{ind}ELSE");
            let _ = writeln!(out, "{ind}{ind}{ind}{name} <= {default};");
            let _ = writeln!(out, "{ind}{ind}END IF;");
        }
    }
    let _ = writeln!(out, "{ind}END PROCESS;\n");
    Ok(())
}

fn emit_register_process(
    out: &mut String,
    circuit: &Circuit,
    plan: &ExportPlan,
    idx: usize,
    node_id: NodeId,
    fmt: &dyn CodeFormatting,
) -> Result<(), ExportError> {
    let ind = fmt.indent();
    let node = circuit.node(node_id);
    let Some(clock_id) = node.clock(0) else {
        return Ok(());
    };
    let clock = circuit.clock(clock_id);
    let clk = &plan.clock_names[&clock_id];
    let rst = &plan.reset_names[&clock_id];
    let q = out_name(plan, idx, node_id)
        .cloned()
        .unwrap_or_else(|| "q".to_string());

    let edge = match clock.trigger {
        TriggerEvent::RisingEdge => format!("rising_edge({clk})"),
        TriggerEvent::FallingEdge => format!("falling_edge({clk})"),
        TriggerEvent::BothEdges => format!("{clk}'event"),
    };
    let rst_level = if clock.attributes.reset_active_high {
        "'1'"
    } else {
        "'0'"
    };
    let data = input_ref(circuit, plan, idx, node_id, register::DATA)?;
    let reset_value = match resolve(circuit, node_id, register::RESET_VALUE) {
        Some(_) if clock.attributes.reset_type != ResetType::None => {
            Some(input_ref(circuit, plan, idx, node_id, register::RESET_VALUE)?)
        }
        _ => None,
    };
    let enable = match resolve(circuit, node_id, register::ENABLE) {
        Some(_) => Some(input_ref(circuit, plan, idx, node_id, register::ENABLE)?),
        None => None,
    };

    let assign = |out: &mut String, depth: usize| {
        let pad = ind.repeat(depth);
        match &enable {
            Some(en) if reset_value.is_some() => {
                let _ = writeln!(out, "{pad}ELSIF {en} = '1' THEN");
                let _ = writeln!(out, "{pad}{ind}{q} <= {data};");
                let _ = writeln!(out, "{pad}END IF;");
            }
            Some(en) => {
                let _ = writeln!(out, "{pad}IF {en} = '1' THEN");
                let _ = writeln!(out, "{pad}{ind}{q} <= {data};");
                let _ = writeln!(out, "{pad}END IF;");
            }
            None if reset_value.is_some() => {
                let _ = writeln!(out, "{pad}ELSE");
                let _ = writeln!(out, "{pad}{ind}{q} <= {data};");
                let _ = writeln!(out, "{pad}END IF;");
            }
            None => {
                let _ = writeln!(out, "{pad}{q} <= {data};");
            }
        }
    };

    match (clock.attributes.reset_type, &reset_value) {
        (ResetType::Asynchronous, Some(rv)) => {
            let _ = writeln!(out, "{ind}{q}_proc : PROCESS({clk}, {rst})");
            let _ = writeln!(out, "{ind}BEGIN");
            let _ = writeln!(out, "{ind}{ind}IF {rst} = {rst_level} THEN");
            let _ = writeln!(out, "{ind}{ind}{ind}{q} <= {rv};");
            let _ = writeln!(out, "{ind}{ind}ELSIF {edge} THEN");
            let pad = ind.repeat(3);
            match &enable {
                Some(en) => {
                    let _ = writeln!(out, "{pad}IF {en} = '1' THEN");
                    let _ = writeln!(out, "{pad}{ind}{q} <= {data};");
                    let _ = writeln!(out, "{pad}END IF;");
                }
                None => {
                    let _ = writeln!(out, "{pad}{q} <= {data};");
                }
            }
            let _ = writeln!(out, "{ind}{ind}END IF;");
            let _ = writeln!(out, "{ind}END PROCESS;\n");
        }
        (ResetType::Synchronous, Some(rv)) => {
            let _ = writeln!(out, "{ind}{q}_proc : PROCESS({clk})");
            let _ = writeln!(out, "{ind}BEGIN");
            let _ = writeln!(out, "{ind}{ind}IF {edge} THEN");
            let _ = writeln!(out, "{ind}{ind}{ind}IF {rst} = {rst_level} THEN");
            let _ = writeln!(out, "{ind}{ind}{ind}{ind}{q} <= {rv};");
            assign(out, 3);
            let _ = writeln!(out, "{ind}{ind}END IF;");
            let _ = writeln!(out, "{ind}END PROCESS;\n");
        }
        _ => {
            let _ = writeln!(out, "{ind}{q}_proc : PROCESS({clk})");
            let _ = writeln!(out, "{ind}BEGIN");
            let _ = writeln!(out, "{ind}{ind}IF {edge} THEN");
            assign(out, 3);
            let _ = writeln!(out, "{ind}{ind}END IF;");
            let _ = writeln!(out, "{ind}END PROCESS;\n");
        }
    }
    Ok(())
}

fn emit_mem_port(
    out: &mut String,
    circuit: &Circuit,
    plan: &ExportPlan,
    idx: usize,
    node_id: NodeId,
    has_write: bool,
    fmt: &dyn CodeFormatting,
) -> Result<(), ExportError> {
    let ind = fmt.indent();
    let Some(mem) = resolve(circuit, node_id, mem_port::MEMORY) else {
        return Ok(());
    };
    let Some(mem_name) = plan.entities[idx].mem_names.get(&mem.node) else {
        return Ok(());
    };
    let addr = input_ref(circuit, plan, idx, node_id, mem_port::ADDRESS)?;
    let addr_ty =
        input_ty(circuit, node_id, mem_port::ADDRESS).unwrap_or(ConnectionType::raw(1));
    let index = render::to_index(&addr, addr_ty);

    if let Some(rd) = out_name(plan, idx, node_id) {
        let out_ty = circuit.node(node_id).output(0).ty;
        let read = render::from_slv(format!("{mem_name}({index})"), out_ty);
        let _ = writeln!(out, "{ind}{rd} <= {read};");
    }

    if has_write {
        let Some(clock_id) = circuit.node(node_id).clock(0) else {
            return Ok(());
        };
        let clk = &plan.clock_names[&clock_id];
        let data = input_ref(circuit, plan, idx, node_id, mem_port::WR_DATA)?;
        let data_ty = input_ty(circuit, node_id, mem_port::WR_DATA)
            .unwrap_or(ConnectionType::raw(1));
        let en = input_ref(circuit, plan, idx, node_id, mem_port::WR_ENABLE)?;
        let _ = writeln!(out, "{ind}{mem_name}_write : PROCESS({clk})");
        let _ = writeln!(out, "{ind}BEGIN");
        let _ = writeln!(out, "{ind}{ind}IF rising_edge({clk}) THEN");
        let _ = writeln!(out, "{ind}{ind}{ind}IF {en} = '1' THEN");
        let _ = writeln!(
            out,
            "{ind}{ind}{ind}{ind}{mem_name}({index}) <= {};",
            render::as_slv(&data, data_ty)
        );
        let _ = writeln!(out, "{ind}{ind}{ind}END IF;");
        let _ = writeln!(out, "{ind}{ind}END IF;");
        let _ = writeln!(out, "{ind}END PROCESS;\n");
    }
    Ok(())
}

fn emit_component_decl(
    out: &mut String,
    _circuit: &Circuit,
    node_id: NodeId,
    desc: &silica_hlim::ExternalDescriptor,
    ind: &str,
) -> Result<(), ExportError> {
    let _ = writeln!(out, "{ind}COMPONENT {}", desc.module_name);
    if !desc.generics.is_empty() {
        let _ = writeln!(out, "{ind}{ind}GENERIC(");
        let count = desc.generics.len();
        for (i, (name, value)) in desc.generics.iter().enumerate() {
            let gty = match value {
                GenericValue::Int(_) => "INTEGER",
                GenericValue::Str(_) => "STRING",
                GenericValue::Bool(_) => "BOOLEAN",
            };
            let sep = if i + 1 == count { "" } else { ";" };
            let _ = writeln!(out, "{ind}{ind}{ind}{name} : {gty}{sep}");
        }
        let _ = writeln!(out, "{ind}{ind});");
    }
    let total = desc.ins.len() + desc.outs.len() + desc.inouts.len();
    if total > 0 {
        let _ = writeln!(out, "{ind}{ind}PORT(");
        let mut i = 0;
        for (ports, dir) in [(&desc.ins, "IN"), (&desc.outs, "OUT"), (&desc.inouts, "INOUT")] {
            for port in ports.iter() {
                let vty = render::vhdl_type(
                    port.ty,
                    NodePort {
                        node: node_id,
                        port: 0,
                    },
                )?;
                let sep = if i + 1 == total { "" } else { ";" };
                let _ = writeln!(out, "{ind}{ind}{ind}{} : {dir} {vty}{sep}", port.name);
                i += 1;
            }
        }
        let _ = writeln!(out, "{ind}{ind});");
    }
    let _ = writeln!(out, "{ind}END COMPONENT;\n");
    Ok(())
}

fn emit_external_instance(
    out: &mut String,
    circuit: &Circuit,
    plan: &ExportPlan,
    idx: usize,
    node_id: NodeId,
    desc: &silica_hlim::ExternalDescriptor,
    fmt: &dyn CodeFormatting,
) -> Result<(), ExportError> {
    let ind = fmt.indent();
    let node = circuit.node(node_id);
    let label = if node.name.is_empty() {
        format!("{}_i", desc.module_name)
    } else {
        node.name.clone()
    };
    let _ = writeln!(out, "{ind}{label} : {}", desc.module_name);
    if !desc.generics.is_empty() {
        let mut bindings = Vec::new();
        for (name, value) in &desc.generics {
            let rendered = match value {
                GenericValue::Int(v) => v.to_string(),
                GenericValue::Str(v) => format!("\"{v}\""),
                GenericValue::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
            };
            bindings.push(format!("{name} => {rendered}"));
        }
        let _ = writeln!(out, "{ind}{ind}GENERIC MAP({})", bindings.join(", "));
    }
    let mut bindings = Vec::new();
    for (input, port) in desc.ins.iter().enumerate() {
        let value = match resolve(circuit, node_id, input as u32) {
            Some(_) => input_ref(circuit, plan, idx, node_id, input as u32)?,
            None => "OPEN".to_string(),
        };
        bindings.push(format!("{} => {value}", port.name));
    }
    for (port_idx, port) in desc.outs.iter().enumerate() {
        let value = plan.entities[idx]
            .names
            .get(&NodePort {
                node: node_id,
                port: port_idx as u32,
            })
            .cloned()
            .unwrap_or_else(|| "OPEN".to_string());
        bindings.push(format!("{} => {value}", port.name));
    }
    for port in &desc.inouts {
        bindings.push(format!("{} => OPEN", port.name));
    }
    let _ = writeln!(out, "{ind}{ind}PORT MAP({});\n", bindings.join(", "));
    Ok(())
}

fn emit_instance(
    out: &mut String,
    circuit: &Circuit,
    plan: &ExportPlan,
    parent: usize,
    child: usize,
    label: &str,
    fmt: &dyn CodeFormatting,
) -> Result<(), ExportError> {
    let ind = fmt.indent();
    let c = &plan.entities[child];
    let p = &plan.entities[parent];
    let mut bindings: Vec<String> = Vec::new();
    for clock in &c.clocks {
        let name = &plan.clock_names[clock];
        bindings.push(format!("{name} => {name}"));
    }
    for clock in &c.resets {
        let name = &plan.reset_names[clock];
        bindings.push(format!("{name} => {name}"));
    }
    for &pin in &c.pins {
        let NodeKind::Pin { param, .. } = circuit.node(pin).kind() else {
            continue;
        };
        let child_base = &c.pin_names[&pin];
        let parent_base = &p.pin_names[&pin];
        match &param.differential {
            Some((pos, neg)) => {
                bindings.push(format!("{child_base}{pos} => {parent_base}{pos}"));
                bindings.push(format!("{child_base}{neg} => {parent_base}{neg}"));
            }
            None => bindings.push(format!("{child_base} => {parent_base}")),
        }
    }
    for rp in &c.ports_in {
        bindings.push(format!("{} => {}", c.names[rp], p.names[rp]));
    }
    for rp in &c.ports_out {
        bindings.push(format!("{} => {}", c.out_port_names[rp], p.names[rp]));
    }
    let _ = writeln!(out, "{ind}{label} : ENTITY work.{}", c.name);
    let _ = writeln!(out, "{ind}{ind}PORT MAP({});\n", bindings.join(", "));
    Ok(())
}
