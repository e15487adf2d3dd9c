//! Connection types carried on circuit wires.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the bits of a wire are to be interpreted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Interpretation {
    /// A single boolean bit. Distinct from a one-bit raw vector.
    Bool,
    /// An uninterpreted bit vector.
    Raw,
    /// An unsigned integer.
    Unsigned,
    /// A two's-complement signed integer.
    Signed2s,
    /// A one-hot encoded value.
    OneHot,
    /// A floating point value.
    Float,
}

/// The type of a value carried on a wire: interpretation plus bit width.
///
/// Equality is structural; `{Bool, 1}` and `{Raw, 1}` are different types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionType {
    /// The interpretation of the bits.
    pub interp: Interpretation,
    /// The width in bits.
    pub width: u32,
}

impl ConnectionType {
    /// The single-bit boolean type.
    pub fn bool() -> Self {
        Self {
            interp: Interpretation::Bool,
            width: 1,
        }
    }

    /// An uninterpreted vector of `width` bits.
    pub fn raw(width: u32) -> Self {
        Self {
            interp: Interpretation::Raw,
            width,
        }
    }

    /// An unsigned integer of `width` bits.
    pub fn unsigned(width: u32) -> Self {
        Self {
            interp: Interpretation::Unsigned,
            width,
        }
    }

    /// A two's-complement integer of `width` bits.
    pub fn signed(width: u32) -> Self {
        Self {
            interp: Interpretation::Signed2s,
            width,
        }
    }

    /// The placeholder type of an output whose type has not been propagated yet.
    pub(crate) fn unset() -> Self {
        Self::raw(0)
    }

    /// Returns `true` while the type has not been propagated.
    pub fn is_unset(&self) -> bool {
        self.width == 0
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.interp {
            Interpretation::Bool => write!(f, "bool"),
            Interpretation::Raw => write!(f, "raw[{}]", self.width),
            Interpretation::Unsigned => write!(f, "unsigned[{}]", self.width),
            Interpretation::Signed2s => write!(f, "signed[{}]", self.width),
            Interpretation::OneHot => write!(f, "onehot[{}]", self.width),
            Interpretation::Float => write!(f, "float[{}]", self.width),
        }
    }
}

impl fmt::Debug for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionType({self})")
    }
}
