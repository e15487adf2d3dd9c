//! Foundational types shared across the Silica hardware description library.
//!
//! This crate provides the packed two-plane bit state used by the simulator,
//! exact rational numbers for clock arithmetic, construction-site source
//! locations, constant-literal parsing, and the internal-error type.

#![warn(missing_docs)]

pub mod literal;
pub mod loc;
pub mod rational;
pub mod result;
pub mod state;

pub use literal::{format_binary, format_hex, parse_literal, LiteralError};
pub use loc::SourceLoc;
pub use rational::{parse_frequency, ParseFrequencyError, Rational};
pub use result::InternalError;
pub use state::{BitVectorState, Plane, WORD_BITS};
