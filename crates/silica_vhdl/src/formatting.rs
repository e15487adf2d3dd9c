//! Code formatting strategy.
//!
//! A [`CodeFormatting`] implementation decides indentation, the generated
//! file header, output file names, and the candidate name sequences used by
//! the namespace allocator. Allocation asks for candidates with an
//! increasing attempt index until a free name is found.

use std::path::PathBuf;

/// What a signal name is used for, so formatters can disambiguate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SignalRole {
    /// An entity input port.
    Input,
    /// An entity output port.
    Output,
    /// An entity inout port.
    Inout,
    /// An architecture-local signal.
    Local,
    /// A register output.
    Register,
    /// A memory array.
    Memory,
    /// A component instance label.
    Instance,
}

/// Naming and layout decisions of the exporter.
pub trait CodeFormatting {
    /// One indentation step.
    fn indent(&self) -> &str;

    /// Comment block at the top of every generated file.
    fn file_header(&self) -> String;

    /// File name for an entity, relative to the export destination.
    fn filename(&self, entity_path: &[String], entity_name: &str) -> PathBuf;

    /// Candidate entity name for `attempt`.
    fn entity_name(&self, desired: &str, attempt: u32) -> String;

    /// Candidate signal name for `attempt`, disambiguated by role.
    fn signal_name(&self, desired: &str, role: SignalRole, attempt: u32) -> String;

    /// Candidate name for a global (clock or reset) for `attempt`.
    fn global_name(&self, id: &str, attempt: u32) -> String;
}

/// Default formatting: four-space indent, lower-case identifiers, collision
/// suffixes `_2`, `_3`, ...
pub struct DefaultCodeFormatting {
    indent: String,
}

impl Default for DefaultCodeFormatting {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCodeFormatting {
    /// Creates the default formatting.
    pub fn new() -> Self {
        Self {
            indent: "    ".to_string(),
        }
    }

    /// Overrides the indentation string.
    pub fn with_indent(indent: impl Into<String>) -> Self {
        Self {
            indent: indent.into(),
        }
    }
}

/// Turns an arbitrary user string into a legal VHDL basic identifier.
fn sanitize(name: &str, fallback: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if (c == '_' || c.is_whitespace()) && !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() || !out.chars().next().unwrap().is_ascii_alphabetic() {
        out.insert_str(0, fallback);
    }
    out
}

fn attempt_suffix(base: String, attempt: u32) -> String {
    if attempt == 0 {
        base
    } else {
        format!("{base}_{}", attempt + 1)
    }
}

impl CodeFormatting for DefaultCodeFormatting {
    fn indent(&self) -> &str {
        &self.indent
    }

    fn file_header(&self) -> String {
        "-- This file was auto-generated by the Silica VHDL exporter.\n\
         -- Do not edit; changes will be overwritten.\n\n"
            .to_string()
    }

    fn filename(&self, entity_path: &[String], entity_name: &str) -> PathBuf {
        let mut path: PathBuf = entity_path.iter().collect();
        path.push(format!("{entity_name}.vhd"));
        path
    }

    fn entity_name(&self, desired: &str, attempt: u32) -> String {
        attempt_suffix(sanitize(desired, "entity_"), attempt)
    }

    fn signal_name(&self, desired: &str, role: SignalRole, attempt: u32) -> String {
        let fallback = match role {
            SignalRole::Input => "in_",
            SignalRole::Output => "out_",
            SignalRole::Inout => "io_",
            SignalRole::Local => "s_",
            SignalRole::Register => "r_",
            SignalRole::Memory => "mem_",
            SignalRole::Instance => "inst_",
        };
        attempt_suffix(sanitize(desired, fallback), attempt)
    }

    fn global_name(&self, id: &str, attempt: u32) -> String {
        attempt_suffix(sanitize(id, "g_"), attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_illegal_characters() {
        assert_eq!(sanitize("my signal!", "s_"), "my_signal");
        assert_eq!(sanitize("q", "s_"), "q");
        assert_eq!(sanitize("3state", "s_"), "s_3state");
        assert_eq!(sanitize("", "s_"), "s_");
    }

    #[test]
    fn attempt_sequence() {
        let fmt = DefaultCodeFormatting::new();
        assert_eq!(fmt.signal_name("q", SignalRole::Local, 0), "q");
        assert_eq!(fmt.signal_name("q", SignalRole::Local, 1), "q_2");
        assert_eq!(fmt.signal_name("q", SignalRole::Local, 2), "q_3");
    }

    #[test]
    fn filename_nests_by_path() {
        let fmt = DefaultCodeFormatting::new();
        let path = fmt.filename(&["top".into(), "core".into()], "alu");
        assert_eq!(path, PathBuf::from("top/core/alu.vhd"));
    }

    #[test]
    fn header_mentions_generation() {
        let fmt = DefaultCodeFormatting::new();
        assert!(fmt.file_header().contains("auto-generated"));
    }
}
