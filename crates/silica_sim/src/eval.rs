//! Per-kind simulation behaviour of circuit nodes.
//!
//! Each compiled node is evaluated against the packed two-plane state using
//! word-at-a-time chunk loops. The defined plane propagates conservatively:
//! arithmetic and comparisons produce fully undefined outputs when any input
//! bit is undefined, logic ops propagate definedness bitwise.

use crate::callbacks::{CallbackDispatcher, SimulatorCallbacks};
use crate::program::MappedNode;
use silica_common::{BitVectorState, Plane};
use silica_hlim::node::{export_override, mem_port, prio, register};
use silica_hlim::{
    ArithOp, Circuit, CompareOp, Interpretation, LogicOp, NodeKind, PinDirection, TapLevel,
};
use std::cmp::Ordering;

fn mask(size: usize) -> u64 {
    if size >= 64 {
        !0
    } else {
        (1u64 << size) - 1
    }
}

/// Reads up to 64 bits at an arbitrary offset, straddling words if needed.
fn read_bits(state: &BitVectorState, plane: Plane, off: usize, width: usize) -> u64 {
    debug_assert!(width <= 64);
    let mut value = 0u64;
    let mut done = 0;
    while done < width {
        let room = 64 - (off + done) % 64;
        let chunk = (width - done).min(room);
        value |= state.extract_nonstraddling(plane, off + done, chunk) << done;
        done += chunk;
    }
    value
}

/// Writes up to 64 bits at an arbitrary offset, straddling words if needed.
fn write_bits(state: &mut BitVectorState, plane: Plane, off: usize, width: usize, value: u64) {
    debug_assert!(width <= 64);
    let mut done = 0;
    while done < width {
        let room = 64 - (off + done) % 64;
        let chunk = (width - done).min(room);
        state.insert_nonstraddling(plane, off + done, chunk, value >> done);
        done += chunk;
    }
}

/// Loads an operand into little-endian 64-bit limbs, extended to `limbs * 64`
/// bits (sign extension for signed interpretations).
fn load_words(state: &BitVectorState, off: usize, width: usize, limbs: usize, signed: bool) -> Vec<u64> {
    let mut words = vec![0u64; limbs];
    let mut done = 0;
    while done < width && done / 64 < limbs {
        let chunk = (width - done).min(64);
        words[done / 64] = read_bits(state, Plane::Value, off + done, chunk);
        done += chunk;
    }
    if signed && width > 0 && width < limbs * 64 {
        let sign = (words[(width - 1) / 64] >> ((width - 1) % 64)) & 1;
        if sign == 1 {
            if width % 64 != 0 {
                words[(width - 1) / 64] |= !mask(width % 64);
            }
            for word in words.iter_mut().skip(width.div_ceil(64)) {
                *word = !0;
            }
        }
    }
    words
}

/// Stores limbs into the state, marking the range defined or undefined.
fn store_words(state: &mut BitVectorState, off: usize, width: usize, words: &[u64], defined: bool) {
    let mut done = 0;
    while done < width {
        let chunk = (width - done).min(64);
        write_bits(state, Plane::Value, off + done, chunk, words[done / 64] & mask(chunk));
        write_bits(
            state,
            Plane::Defined,
            off + done,
            chunk,
            if defined { mask(chunk) } else { 0 },
        );
        done += chunk;
    }
}

fn set_defined_range(state: &mut BitVectorState, off: usize, width: usize, value_bit: bool) {
    let mut done = 0;
    while done < width {
        let chunk = (width - done).min(64);
        write_bits(
            state,
            Plane::Value,
            off + done,
            chunk,
            if value_bit { mask(chunk) } else { 0 },
        );
        write_bits(state, Plane::Defined, off + done, chunk, mask(chunk));
        done += chunk;
    }
}

/// A chunk of an operand, zero-extended past its width; extension bits count
/// as defined.
fn chunk_extended(
    state: &BitVectorState,
    off: usize,
    width: usize,
    done: usize,
    chunk: usize,
) -> (u64, u64) {
    if done >= width {
        return (0, mask(chunk));
    }
    let avail = (width - done).min(chunk);
    let value = read_bits(state, Plane::Value, off + done, avail);
    let defined = read_bits(state, Plane::Defined, off + done, avail) | (mask(chunk) & !mask(avail));
    (value, defined)
}

/// Two's-complement-aware comparison of equally-extended limb vectors.
fn cmp_words(a: &[u64], b: &[u64], signed: bool) -> Ordering {
    if signed {
        let sa = a.last().map_or(0, |w| w >> 63);
        let sb = b.last().map_or(0, |w| w >> 63);
        if sa != sb {
            return if sa == 1 { Ordering::Less } else { Ordering::Greater };
        }
    }
    for (wa, wb) in a.iter().rev().zip(b.iter().rev()) {
        match wa.cmp(wb) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

fn output_interp(circuit: &Circuit, mapped: &MappedNode) -> Interpretation {
    circuit.node(mapped.node).output(0).ty.interp
}

/// Runs one combinatorial evaluation of a compiled node.
pub(crate) fn evaluate(
    circuit: &Circuit,
    mapped: &MappedNode,
    state: &mut BitVectorState,
    cb: &mut CallbackDispatcher,
) {
    let node = circuit.node(mapped.node);
    match node.kind() {
        NodeKind::Logic(op) => eval_logic(*op, mapped, state),
        NodeKind::Arithmetic(op) => eval_arithmetic(*op, circuit, mapped, state),
        NodeKind::Compare(op) => eval_compare(*op, circuit, mapped, state),
        NodeKind::Multiplexer { data_inputs } => eval_mux(*data_inputs, mapped, state),
        NodeKind::PriorityConditional => eval_prio(mapped, state),
        NodeKind::Rewire { op, .. } => eval_rewire(op, mapped, state),

        NodeKind::Register => {
            // Latch the data input into the internal next-state.
            let width = mapped.output_widths[0] as usize;
            if let Some(data) = mapped.inputs[register::DATA as usize] {
                state.copy_range_within(mapped.internal[0], data, width);
            }
        }

        NodeKind::MemPort(cfg) => eval_mem_port(cfg.has_write, circuit, mapped, state),

        NodeKind::Pin { param, .. } => {
            let width = mapped.output_widths[0] as usize;
            match param.direction {
                // Input pins publish their override buffer.
                PinDirection::Input => {
                    state.copy_range_within(mapped.outputs[0], mapped.internal[0], width);
                }
                PinDirection::Output | PinDirection::Bidirectional => match mapped.inputs[0] {
                    Some(src) => state.copy_range_within(mapped.outputs[0], src, width),
                    None => state.clear_defined(mapped.outputs[0], width),
                },
            }
        }

        NodeKind::SignalTap(cfg) => {
            let Some(off) = mapped.inputs[0] else { return };
            if state.all_defined(off, 1) && read_bits(state, Plane::Value, off, 1) == 0 {
                match cfg.level {
                    TapLevel::Assert => cb.on_assert(mapped.node, &cfg.message),
                    TapLevel::Warn => cb.on_warning(mapped.node, &cfg.message),
                    TapLevel::Debug => cb.on_debug_message(mapped.node, &cfg.message),
                    TapLevel::Watch => {}
                }
            }
        }

        NodeKind::ExportOverride => {
            let width = mapped.output_widths[0] as usize;
            match mapped.inputs[export_override::SIM as usize] {
                Some(src) => state.copy_range_within(mapped.outputs[0], src, width),
                None => state.clear_defined(mapped.outputs[0], width),
            }
        }

        NodeKind::Cdc(_) => {
            let width = mapped.output_widths[0] as usize;
            match mapped.inputs[0] {
                Some(src) => state.copy_range_within(mapped.outputs[0], src, width),
                None => state.clear_defined(mapped.outputs[0], width),
            }
        }

        NodeKind::MultiDriver { inputs } => eval_multi_driver(*inputs, mapped, state),

        NodeKind::External(_) => {
            // No registered evaluator in the core; outputs are unknown.
            for (port, &off) in mapped.outputs.iter().enumerate() {
                state.clear_defined(off, mapped.output_widths[port] as usize);
            }
        }

        // Not scheduled: signals are coalesced away, constants and memories
        // only act at reset, attribute nodes have no runtime behaviour.
        NodeKind::Signal
        | NodeKind::Constant { .. }
        | NodeKind::Memory(_)
        | NodeKind::Attributes(_)
        | NodeKind::PathAttributes(_) => {}
    }
}

/// Applies a node's power-on state.
pub(crate) fn reset(circuit: &Circuit, mapped: &MappedNode, state: &mut BitVectorState) {
    let node = circuit.node(mapped.node);
    match node.kind() {
        NodeKind::Constant { value, .. } => {
            state.copy_range(mapped.outputs[0], value, 0, value.len());
        }

        NodeKind::Register => {
            let Some(clock) = node.clock(0) else { return };
            if !circuit.clock(clock).attributes.initialize_regs {
                return;
            }
            let Some(reset_driver) =
                circuit.non_signal_driver(mapped.node, register::RESET_VALUE)
            else {
                return;
            };
            // The power-on value must be constant-driven through signals only.
            let NodeKind::Constant { value, .. } = circuit.node(reset_driver.node).kind() else {
                return;
            };
            state.copy_range(mapped.internal[0], value, 0, value.len());
            state.copy_range(mapped.outputs[0], value, 0, value.len());
        }

        NodeKind::Memory(cfg) => {
            if let Some(initial) = &cfg.initial {
                state.copy_range(mapped.internal[0], initial, 0, initial.len());
            }
        }

        _ => {}
    }
}

/// Advances a latched node on a clock edge: its internal next-state becomes
/// the visible output.
pub(crate) fn advance(
    circuit: &Circuit,
    mapped: &MappedNode,
    state: &mut BitVectorState,
    clock_port: u32,
) {
    let node = circuit.node(mapped.node);
    match node.kind() {
        NodeKind::Register => {
            debug_assert_eq!(clock_port, 0);
            let width = mapped.output_widths[0] as usize;
            if let Some(enable) = mapped.inputs[register::ENABLE as usize] {
                // An undefined enable keeps the previous output.
                if !state.all_defined(enable, 1) {
                    return;
                }
                if read_bits(state, Plane::Value, enable, 1) == 0 {
                    return;
                }
            }
            state.copy_range_within(mapped.outputs[0], mapped.internal[0], width);
        }

        NodeKind::MemPort(cfg) => {
            debug_assert_eq!(clock_port, 0);
            if cfg.has_write {
                advance_mem_port_write(circuit, mapped, state);
            }
        }

        _ => {}
    }
}

fn eval_logic(op: LogicOp, mapped: &MappedNode, state: &mut BitVectorState) {
    let out = mapped.outputs[0];
    let width = mapped.output_widths[0] as usize;
    let Some(a_off) = mapped.inputs[0] else {
        state.clear_defined(out, width);
        return;
    };
    let a_w = mapped.input_widths[0] as usize;
    let b = if op.arity() == 2 {
        match mapped.inputs[1] {
            Some(off) => Some((off, mapped.input_widths[1] as usize)),
            None => {
                state.clear_defined(out, width);
                return;
            }
        }
    } else {
        None
    };

    let mut done = 0;
    while done < width {
        let chunk = (width - done).min(64);
        let (va, da) = chunk_extended(state, a_off, a_w, done, chunk);
        let (value, defined) = match b {
            Some((b_off, b_w)) => {
                let (vb, db) = chunk_extended(state, b_off, b_w, done, chunk);
                let v = match op {
                    LogicOp::And => va & vb,
                    LogicOp::Nand => !(va & vb),
                    LogicOp::Or => va | vb,
                    LogicOp::Nor => !(va | vb),
                    LogicOp::Xor => va ^ vb,
                    LogicOp::Xnor => !(va ^ vb),
                    LogicOp::Not => unreachable!(),
                };
                (v, da & db)
            }
            None => (!va, da),
        };
        write_bits(state, Plane::Value, out + done, chunk, value & mask(chunk));
        write_bits(state, Plane::Defined, out + done, chunk, defined & mask(chunk));
        done += chunk;
    }
}

fn eval_arithmetic(op: ArithOp, circuit: &Circuit, mapped: &MappedNode, state: &mut BitVectorState) {
    let out = mapped.outputs[0];
    let width = mapped.output_widths[0] as usize;
    let (Some(a_off), Some(b_off)) = (mapped.inputs[0], mapped.inputs[1]) else {
        state.clear_defined(out, width);
        return;
    };
    let a_w = mapped.input_widths[0] as usize;
    let b_w = mapped.input_widths[1] as usize;
    if !state.all_defined(a_off, a_w) || !state.all_defined(b_off, b_w) {
        state.clear_defined(out, width);
        return;
    }
    let signed = output_interp(circuit, mapped) == Interpretation::Signed2s;
    let limbs = width.div_ceil(64);
    let a = load_words(state, a_off, a_w, limbs, signed);
    let b = load_words(state, b_off, b_w, limbs, signed);

    let result = match op {
        ArithOp::Add => Some(add_words(&a, &b)),
        ArithOp::Sub => Some(add_words(&a, &negate_words(&b))),
        ArithOp::Mul | ArithOp::Div | ArithOp::Rem if width <= 64 => {
            word_arith(op, a[0], b[0], width, signed)
        }
        // Wide multiplicative ops are outside the reference simulator.
        ArithOp::Mul | ArithOp::Div | ArithOp::Rem => None,
    };

    match result {
        Some(words) => store_words(state, out, width, &words, true),
        None => state.clear_defined(out, width),
    }
}

fn word_arith(op: ArithOp, a: u64, b: u64, width: usize, signed: bool) -> Option<Vec<u64>> {
    let result = if signed {
        let sa = a as i64;
        let sb = b as i64;
        match op {
            ArithOp::Mul => sa.wrapping_mul(sb) as u64,
            ArithOp::Div => {
                if sb == 0 {
                    return None;
                }
                sa.wrapping_div(sb) as u64
            }
            ArithOp::Rem => {
                if sb == 0 {
                    return None;
                }
                sa.wrapping_rem(sb) as u64
            }
            _ => unreachable!(),
        }
    } else {
        let ua = a & mask(width);
        let ub = b & mask(width);
        match op {
            ArithOp::Mul => ua.wrapping_mul(ub),
            ArithOp::Div => {
                if ub == 0 {
                    return None;
                }
                ua / ub
            }
            ArithOp::Rem => {
                if ub == 0 {
                    return None;
                }
                ua % ub
            }
            _ => unreachable!(),
        }
    };
    Some(vec![result])
}

fn add_words(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut result = vec![0u64; a.len()];
    let mut carry = 0u128;
    for i in 0..a.len() {
        let sum = a[i] as u128 + b[i] as u128 + carry;
        result[i] = sum as u64;
        carry = sum >> 64;
    }
    result
}

fn negate_words(words: &[u64]) -> Vec<u64> {
    let inverted: Vec<u64> = words.iter().map(|w| !w).collect();
    let one = {
        let mut v = vec![0u64; words.len()];
        v[0] = 1;
        v
    };
    add_words(&inverted, &one)
}

fn eval_compare(op: CompareOp, circuit: &Circuit, mapped: &MappedNode, state: &mut BitVectorState) {
    let out = mapped.outputs[0];
    let (Some(a_off), Some(b_off)) = (mapped.inputs[0], mapped.inputs[1]) else {
        state.clear_defined(out, 1);
        return;
    };
    let a_w = mapped.input_widths[0] as usize;
    let b_w = mapped.input_widths[1] as usize;
    if !state.all_defined(a_off, a_w) || !state.all_defined(b_off, b_w) {
        state.clear_defined(out, 1);
        return;
    }
    let interp = circuit
        .node(mapped.node)
        .driver(0)
        .map(|p| circuit.node(p.node).output(p.port).ty.interp)
        .unwrap_or(Interpretation::Raw);
    let signed = interp == Interpretation::Signed2s;
    let limbs = a_w.max(b_w).max(1).div_ceil(64);
    let a = load_words(state, a_off, a_w, limbs, signed);
    let b = load_words(state, b_off, b_w, limbs, signed);
    let ordering = cmp_words(&a, &b, signed);
    let result = match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Neq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Leq => ordering != Ordering::Greater,
        CompareOp::Geq => ordering != Ordering::Less,
    };
    set_defined_range(state, out, 1, result);
}

fn eval_mux(data_inputs: u32, mapped: &MappedNode, state: &mut BitVectorState) {
    let out = mapped.outputs[0];
    let width = mapped.output_widths[0] as usize;
    let Some(sel_off) = mapped.inputs[0] else {
        state.clear_defined(out, width);
        return;
    };
    let sel_w = mapped.input_widths[0] as usize;
    if sel_w > 64 || !state.all_defined(sel_off, sel_w) {
        state.clear_defined(out, width);
        return;
    }
    let selector = read_bits(state, Plane::Value, sel_off, sel_w);
    if selector >= data_inputs as u64 {
        state.clear_defined(out, width);
        return;
    }
    match mapped.inputs[1 + selector as usize] {
        Some(src) => state.copy_range_within(out, src, width),
        None => state.clear_defined(out, width),
    }
}

fn eval_prio(mapped: &MappedNode, state: &mut BitVectorState) {
    let out = mapped.outputs[0];
    let width = mapped.output_widths[0] as usize;
    let choices = prio::num_choices(mapped.inputs.len());
    for choice in 0..choices {
        let Some(cond) = mapped.inputs[prio::condition(choice) as usize] else {
            state.clear_defined(out, width);
            return;
        };
        if !state.all_defined(cond, 1) {
            state.clear_defined(out, width);
            return;
        }
        if read_bits(state, Plane::Value, cond, 1) == 1 {
            match mapped.inputs[prio::value(choice) as usize] {
                Some(src) => state.copy_range_within(out, src, width),
                None => state.clear_defined(out, width),
            }
            return;
        }
    }
    match mapped.inputs[prio::DEFAULT as usize] {
        Some(src) => state.copy_range_within(out, src, width),
        None => state.clear_defined(out, width),
    }
}

fn eval_rewire(op: &silica_hlim::RewireOp, mapped: &MappedNode, state: &mut BitVectorState) {
    let out = mapped.outputs[0];
    let mut pos = mapped.output_widths[0] as usize;
    for range in &op.ranges {
        let width = range.width as usize;
        pos -= width;
        match range.source {
            silica_hlim::RangeSource::Input { input, offset } => {
                match mapped.inputs[input as usize] {
                    Some(src) => {
                        state.copy_range_within(out + pos, src + offset as usize, width);
                    }
                    None => state.clear_defined(out + pos, width),
                }
            }
            silica_hlim::RangeSource::Zero => set_defined_range(state, out + pos, width, false),
            silica_hlim::RangeSource::One => set_defined_range(state, out + pos, width, true),
        }
    }
}

fn eval_multi_driver(inputs: u32, mapped: &MappedNode, state: &mut BitVectorState) {
    let out = mapped.outputs[0];
    let width = mapped.output_widths[0] as usize;
    let mut done = 0;
    while done < width {
        let chunk = (width - done).min(64);
        let mut ones = 0u64;
        let mut zeros = 0u64;
        for i in 0..inputs as usize {
            let Some(off) = mapped.inputs[i] else { continue };
            let v = read_bits(state, Plane::Value, off + done, chunk);
            let d = read_bits(state, Plane::Defined, off + done, chunk);
            ones |= d & v;
            zeros |= d & !v;
        }
        // A bit resolves when it is driven and all drivers agree.
        let defined = (ones | zeros) & !(ones & zeros);
        write_bits(state, Plane::Value, out + done, chunk, ones & mask(chunk));
        write_bits(state, Plane::Defined, out + done, chunk, defined & mask(chunk));
        done += chunk;
    }
}

fn eval_mem_port(has_write: bool, circuit: &Circuit, mapped: &MappedNode, state: &mut BitVectorState) {
    let word = mapped.output_widths[0] as usize;
    let addr_w = mapped.input_widths[mem_port::ADDRESS as usize] as usize;
    let out = mapped.outputs[0];

    if has_write {
        // Snapshot the write inputs; the commit happens on the clock edge.
        let snap = mapped.internal[0];
        let fields = [
            (0, mem_port::ADDRESS as usize, addr_w),
            (addr_w, mem_port::WR_DATA as usize, word),
            (addr_w + word, mem_port::WR_ENABLE as usize, 1),
        ];
        for (field_off, input, field_w) in fields {
            match mapped.inputs[input] {
                Some(src) => state.copy_range_within(snap + field_off, src, field_w),
                None => state.clear_defined(snap + field_off, field_w),
            }
        }
    }

    // Asynchronous read.
    let depth = match circuit
        .non_signal_driver(mapped.node, mem_port::MEMORY)
        .map(|p| circuit.node(p.node).kind().clone())
    {
        Some(NodeKind::Memory(cfg)) => cfg.depth as u64,
        _ => {
            state.clear_defined(out, word);
            return;
        }
    };
    let mem_base = *mapped.internal.last().expect("memory base offset");
    let Some(addr_off) = mapped.inputs[mem_port::ADDRESS as usize] else {
        state.clear_defined(out, word);
        return;
    };
    if addr_w > 64 || !state.all_defined(addr_off, addr_w) {
        state.clear_defined(out, word);
        return;
    }
    let addr = read_bits(state, Plane::Value, addr_off, addr_w);
    if addr >= depth {
        state.clear_defined(out, word);
        return;
    }
    state.copy_range_within(out, mem_base + addr as usize * word, word);
}

fn advance_mem_port_write(circuit: &Circuit, mapped: &MappedNode, state: &mut BitVectorState) {
    let word = mapped.output_widths[0] as usize;
    let addr_w = mapped.input_widths[mem_port::ADDRESS as usize] as usize;
    let snap = mapped.internal[0];
    let mem_base = *mapped.internal.last().expect("memory base offset");

    let (depth, total_bits) = match circuit
        .non_signal_driver(mapped.node, mem_port::MEMORY)
        .map(|p| circuit.node(p.node).kind().clone())
    {
        Some(NodeKind::Memory(cfg)) => (
            cfg.depth as u64,
            cfg.depth as usize * cfg.word_width as usize,
        ),
        _ => return,
    };

    let en_off = snap + addr_w + word;
    if !state.all_defined(en_off, 1) || read_bits(state, Plane::Value, en_off, 1) == 0 {
        return;
    }
    if !state.all_defined(snap, addr_w) {
        // A write to an unknown address makes the whole array unknown.
        state.clear_defined(mem_base, total_bits);
        return;
    }
    let addr = read_bits(state, Plane::Value, snap, addr_w);
    if addr >= depth {
        return;
    }
    state.copy_range_within(mem_base + addr as usize * word, snap + addr_w, word);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_bits_straddling() {
        let mut s = BitVectorState::undefined(192);
        write_bits(&mut s, Plane::Value, 60, 10, 0x3FF);
        assert_eq!(read_bits(&s, Plane::Value, 60, 10), 0x3FF);
        assert_eq!(read_bits(&s, Plane::Value, 59, 1), 0);
        assert_eq!(read_bits(&s, Plane::Value, 70, 1), 0);
    }

    #[test]
    fn load_words_zero_extends() {
        let mut s = BitVectorState::undefined(64);
        write_bits(&mut s, Plane::Value, 0, 4, 0b1010);
        let words = load_words(&s, 0, 4, 2, false);
        assert_eq!(words, vec![0b1010, 0]);
    }

    #[test]
    fn load_words_sign_extends() {
        let mut s = BitVectorState::undefined(64);
        write_bits(&mut s, Plane::Value, 0, 4, 0b1010); // -6 as a 4-bit value
        let words = load_words(&s, 0, 4, 2, true);
        assert_eq!(words[0], !0u64 << 4 | 0b1010);
        assert_eq!(words[1], !0u64);
    }

    #[test]
    fn add_words_carries() {
        let sum = add_words(&[!0u64, 0], &[1, 0]);
        assert_eq!(sum, vec![0, 1]);
    }

    #[test]
    fn negate_words_two_complement() {
        let neg = negate_words(&[5, 0]);
        let sum = add_words(&neg, &[5, 0]);
        assert_eq!(sum, vec![0, 0]);
    }

    #[test]
    fn cmp_words_unsigned_and_signed() {
        assert_eq!(cmp_words(&[3], &[5], false), Ordering::Less);
        assert_eq!(cmp_words(&[!0u64], &[1], false), Ordering::Greater);
        // As signed, all-ones is -1.
        assert_eq!(cmp_words(&[!0u64], &[1], true), Ordering::Less);
    }
}
