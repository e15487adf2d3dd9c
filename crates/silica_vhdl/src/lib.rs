//! VHDL export backend for Silica circuits.
//!
//! [`VhdlExport`] walks a finalized circuit's group hierarchy, turns every
//! entity group into a VHDL entity with allocated names, and writes one
//! `.vhd` file per entity plus an `.sdc` side-file for clock-domain-crossing
//! constraints.
//!
//! ```no_run
//! # use silica_hlim::Circuit;
//! # use silica_vhdl::VhdlExport;
//! # fn demo(circuit: &Circuit) -> Result<(), silica_vhdl::ExportError> {
//! VhdlExport::new("build/vhdl").run(circuit)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod entity;
pub mod error;
pub mod formatting;
pub mod namespace;
mod render;
mod sdc;

pub use error::ExportError;
pub use formatting::{CodeFormatting, DefaultCodeFormatting, SignalRole};
pub use namespace::Namespace;

use entity::ExportPlan;
use silica_hlim::Circuit;
use std::fs;
use std::path::PathBuf;

/// Exports a circuit as a directory tree of VHDL files.
pub struct VhdlExport {
    destination: PathBuf,
    formatting: Box<dyn CodeFormatting>,
}

impl VhdlExport {
    /// Creates an exporter writing below `destination`, with default
    /// formatting.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            formatting: Box::new(DefaultCodeFormatting::new()),
        }
    }

    /// Replaces the formatting strategy.
    pub fn set_formatting(mut self, formatting: Box<dyn CodeFormatting>) -> Self {
        self.formatting = formatting;
        self
    }

    /// Runs the export: one `.vhd` file per entity group, plus an `.sdc`
    /// file when the circuit contains crossing markers.
    pub fn run(&self, circuit: &Circuit) -> Result<(), ExportError> {
        let plan = ExportPlan::build(circuit, &*self.formatting)?;

        for idx in 0..plan.entities.len() {
            let text = entity::emit_entity(circuit, &plan, idx, &*self.formatting)?;
            let relative = self
                .formatting
                .filename(&plan.entities[idx].path, &plan.entities[idx].name);
            let path = self.destination.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, text)?;
        }

        if !plan.sdc.is_empty() {
            let text = sdc::render_sdc(&plan.sdc);
            fs::create_dir_all(&self.destination)?;
            let path = self
                .destination
                .join(format!("{}.sdc", plan.entities[0].name));
            fs::write(&path, text)?;
        }

        Ok(())
    }

    /// Renders every entity to a string without touching the filesystem.
    /// Returned pairs are `(entity_name, vhdl_source)`.
    pub fn render(&self, circuit: &Circuit) -> Result<Vec<(String, String)>, ExportError> {
        let plan = ExportPlan::build(circuit, &*self.formatting)?;
        let mut files = Vec::new();
        for idx in 0..plan.entities.len() {
            let text = entity::emit_entity(circuit, &plan, idx, &*self.formatting)?;
            files.push((plan.entities[idx].name.clone(), text));
        }
        Ok(files)
    }
}
