//! Case-insensitive name allocation.
//!
//! VHDL identifiers are case-insensitive, so used names are tracked in lower
//! case. Each entity has its own namespace; lookups also consult the parent
//! scopes (the root namespace holds globals shared by all entities).
//! First-use wins: a name once claimed is never reassigned.

use crate::error::ExportError;
use std::collections::HashSet;

/// Cap on candidate attempts before allocation gives up.
const MAX_ATTEMPTS: u32 = 1000;

/// One scope of used names.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    used: HashSet<String>,
}

impl Namespace {
    /// Creates an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is taken in this scope (case-insensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(&name.to_ascii_lowercase())
    }

    /// Claims `name` in this scope if it is free here and in all `parents`.
    pub fn try_claim(&mut self, name: &str, parents: &[&Namespace]) -> bool {
        if self.contains(name) || parents.iter().any(|p| p.contains(name)) {
            return false;
        }
        self.used.insert(name.to_ascii_lowercase());
        true
    }

    /// Allocates the first free candidate produced by `candidates`.
    pub fn allocate(
        &mut self,
        parents: &[&Namespace],
        desired: &str,
        mut candidates: impl FnMut(u32) -> String,
    ) -> Result<String, ExportError> {
        for attempt in 0..MAX_ATTEMPTS {
            let name = candidates(attempt);
            if self.try_claim(&name, parents) {
                return Ok(name);
            }
        }
        Err(ExportError::NameExhausted {
            desired: desired.to_string(),
            attempts: MAX_ATTEMPTS,
        })
    }
}
