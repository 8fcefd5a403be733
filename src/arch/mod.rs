//! Architecture-specific instruction classification.
//!
//! Capstone does not tag every control-flow instruction with a uniform group
//! on every architecture, so each architecture gets a small set of predicates
//! over the decoder's opcode id, condition code and operands. Only ARM is
//! implemented.

pub mod arm;

use crate::InsnFlags;

/// Semantic classification of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    /// Control-flow flags
    pub flags: InsnFlags,
    /// Requires a privileged execution mode
    pub privileged: bool,
    /// Raises a trap
    pub trap: bool,
}

impl Classification {
    /// The instruction ends a basic block
    pub fn is_cflow(&self) -> bool {
        self.flags.contains(InsnFlags::CFLOW)
    }

    pub fn is_nop(&self) -> bool {
        self.flags.contains(InsnFlags::NOP)
    }
}
