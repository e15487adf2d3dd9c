//! Low-level VHDL rendering helpers: types, literals, and casts.

use crate::error::ExportError;
use silica_common::{BitVectorState, Plane};
use silica_hlim::{ConnectionType, Interpretation, NodePort};

/// Renders a connection type as a VHDL subtype indication.
pub(crate) fn vhdl_type(ty: ConnectionType, port: NodePort) -> Result<String, ExportError> {
    match ty.interp {
        Interpretation::Bool if ty.width == 1 => Ok("STD_LOGIC".to_string()),
        Interpretation::Raw => Ok(format!("STD_LOGIC_VECTOR({} downto 0)", ty.width - 1)),
        Interpretation::Unsigned => Ok(format!("UNSIGNED({} downto 0)", ty.width - 1)),
        Interpretation::Signed2s => Ok(format!("SIGNED({} downto 0)", ty.width - 1)),
        _ => Err(ExportError::UnsupportedInterpretation { ty, port }),
    }
}

/// Renders a constant as a typed VHDL literal. Undefined bits render as `-`.
pub(crate) fn literal(value: &BitVectorState, ty: ConnectionType) -> String {
    if ty.interp == Interpretation::Bool && ty.width == 1 {
        let c = bit_char(value, 0);
        return format!("'{c}'");
    }
    let mut bits = String::with_capacity(value.len() + 2);
    bits.push('"');
    for i in (0..value.len()).rev() {
        bits.push(bit_char(value, i));
    }
    bits.push('"');
    bits
}

fn bit_char(value: &BitVectorState, idx: usize) -> char {
    if !value.get(Plane::Defined, idx) {
        '-'
    } else if value.get(Plane::Value, idx) {
        '1'
    } else {
        '0'
    }
}

/// Renders the literal a multiplexer selector is compared against.
pub(crate) fn selector_literal(index: u64, ty: ConnectionType) -> String {
    match ty.interp {
        Interpretation::Bool => {
            if index == 0 {
                "'0'".to_string()
            } else {
                "'1'".to_string()
            }
        }
        Interpretation::Unsigned => format!("to_unsigned({index}, {})", ty.width),
        Interpretation::Signed2s => format!("to_signed({index}, {})", ty.width),
        _ => {
            let mut bits = String::from("\"");
            for i in (0..ty.width).rev() {
                bits.push(if (index >> i) & 1 != 0 { '1' } else { '0' });
            }
            bits.push('"');
            bits
        }
    }
}

/// Coerces a named value to something concatenable with STD_LOGIC_VECTOR.
pub(crate) fn as_slv(name: &str, ty: ConnectionType) -> String {
    match ty.interp {
        Interpretation::Unsigned | Interpretation::Signed2s => {
            format!("STD_LOGIC_VECTOR({name})")
        }
        _ => name.to_string(),
    }
}

/// Wraps an STD_LOGIC_VECTOR expression back into the target type.
pub(crate) fn from_slv(expr: String, ty: ConnectionType) -> String {
    match ty.interp {
        Interpretation::Unsigned => format!("UNSIGNED({expr})"),
        Interpretation::Signed2s => format!("SIGNED({expr})"),
        _ => expr,
    }
}

/// Renders an address expression as an integer index.
pub(crate) fn to_index(name: &str, ty: ConnectionType) -> String {
    match ty.interp {
        Interpretation::Unsigned | Interpretation::Signed2s => format!("to_integer({name})"),
        _ => format!("to_integer(UNSIGNED({name}))"),
    }
}
