//! Export error reporting.

use silica_hlim::{ConnectionType, NodePort};
use std::io;

/// Errors raised while exporting a circuit to VHDL.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The interpretation of a wire has no VHDL rendering.
    #[error("no VHDL type for {ty} (output {port:?})")]
    UnsupportedInterpretation {
        /// The unsupported connection type.
        ty: ConnectionType,
        /// The output carrying it.
        port: NodePort,
    },

    /// The formatter ran out of name candidates.
    #[error("no free name for '{desired}' after {attempts} attempts")]
    NameExhausted {
        /// The desired base name.
        desired: String,
        /// How many candidates were tried.
        attempts: u32,
    },

    /// An output consumed by the export has no driver.
    #[error("unbound input while rendering (driver of {port:?} missing)")]
    UnboundInput {
        /// The undriven consumer port.
        port: NodePort,
    },

    /// An external module declaration cannot be instantiated.
    #[error("invalid external module: {reason}")]
    InvalidExternalModule {
        /// Why the declaration is unusable.
        reason: String,
    },

    /// Writing an output file failed.
    #[error("export I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use silica_hlim::ids::NodeId;
    use silica_hlim::EntityId;

    #[test]
    fn unsupported_interpretation_display() {
        let err = ExportError::UnsupportedInterpretation {
            ty: ConnectionType {
                interp: silica_hlim::Interpretation::Float,
                width: 32,
            },
            port: NodePort {
                node: NodeId::from_index(3),
                port: 0,
            },
        };
        assert!(err.to_string().contains("float[32]"));
    }

    #[test]
    fn name_exhausted_display() {
        let err = ExportError::NameExhausted {
            desired: "q".into(),
            attempts: 1000,
        };
        assert_eq!(err.to_string(), "no free name for 'q' after 1000 attempts");
    }
}
