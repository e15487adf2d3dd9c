//! Construction-site source locations.
//!
//! Every node in a circuit records where in the host program it was created,
//! so that errors raised long after construction (during program compilation
//! or export) can point back at the offending line.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source location captured at a node-creating API call.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    /// Source file of the caller.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl SourceLoc {
    /// Captures the location of the caller.
    ///
    /// Propagates through `#[track_caller]` functions, so a user calling
    /// `Circuit::create_node` records their own call site.
    #[track_caller]
    pub fn caller() -> Self {
        let loc = std::panic::Location::caller();
        Self {
            file: loc.file().to_string(),
            line: loc.line(),
            column: loc.column(),
        }
    }

    /// A placeholder location for entities not created through the public API.
    pub fn unknown() -> Self {
        Self {
            file: String::from("<unknown>"),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl fmt::Debug for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceLoc({self})")
    }
}
