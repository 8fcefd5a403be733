//! Block sweeps over a whole section.
//!
//! The block builder decodes one block per request; the strategies here decide
//! which addresses to request.

use std::fmt;

use clap::ValueEnum;

use crate::{BasicBlock, BinaryMetadata, CodeRegion, DisassemblyError};

/// Available block sweep strategies.
#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Back-to-back blocks from the start of the section
    Linear,
    /// Follow direct branch targets and fall-through edges
    Recursive,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Linear => write!(f, "Linear sweep"),
            Strategy::Recursive => write!(f, "Recursive descent"),
        }
    }
}

impl Strategy {
    /// Run the selected strategy over `section`.
    ///
    /// Recursive descent starts at the section base, and at the binary's
    /// entry point when it lies inside the section.
    pub fn run(
        &self,
        binary: &BinaryMetadata,
        section: &CodeRegion<'_>,
    ) -> Result<Vec<BasicBlock>, DisassemblyError> {
        match self {
            Strategy::Linear => linear::run(binary, section),
            Strategy::Recursive => {
                let mut entries = vec![section.address];
                if let Some(entry) = binary.entry_point.filter(|e| section.contains(*e)) {
                    entries.push(entry);
                }
                recursive::run_from(binary, section, &entries)
            }
        }
    }

    /// Return all available strategies
    pub fn all() -> &'static [Strategy] {
        &[Strategy::Linear, Strategy::Recursive]
    }

    /// Return the default strategy
    pub fn default() -> Self {
        Strategy::Linear
    }
}

pub mod batch;
pub mod linear;
pub mod recursive;
