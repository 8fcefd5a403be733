//! Basic-block construction.
//!
//! [`disassemble_block`] decodes one block starting at a requested address:
//! it walks a [`DecodeSession`] instruction by instruction, classifies and
//! translates each one, and stops at the first control-flow instruction, at a
//! nop boundary, or at an invalid encoding.

use crate::arch::arm::{self, ArmInsnView};
use crate::arch::Classification;
use crate::decoder::{DecodeSession, DecodeStep, DecodedInsn, DecoderError};
use crate::operand::{self, Operand};
use crate::{
    Address, BasicBlock, BinaryMetadata, CodeRegion, DisassemblyError, InsnFlags, Instruction,
};

/// Progress of a single block build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    /// Bounds not checked yet
    Init,
    /// Accumulating live code; a nop ends the block
    Decoding,
    /// Block started with a nop; the first non-nop ends it
    GroupingNop,
    Terminated,
}

/// Decode the basic block that starts at `start` inside `section`.
///
/// The returned block always satisfies `end > start`, also when decoding
/// fails on the first instruction (the block is then flagged `invalid`).
///
/// # Errors
/// * [`DisassemblyError::OutOfBounds`] if `start` lies outside `section`
/// * [`DisassemblyError::Decoder`] if no decoder session can be opened for the
///   binary's architecture and width, or the decoder runs out of memory
pub fn disassemble_block(
    binary: &BinaryMetadata,
    section: &CodeRegion<'_>,
    start: Address,
) -> Result<BasicBlock, DisassemblyError> {
    let mut builder = BlockBuilder::new(section, start);
    builder.check_bounds()?;

    let session = DecodeSession::open(binary.architecture, binary.bits).map_err(|e| {
        log::error!("{}", e);
        e
    })?;

    while builder.state != BuildState::Terminated {
        builder.state = builder.step(&session).map_err(|e| {
            log::error!("decoding at 0x{:x} in '{}' failed: {}", builder.block.end, section.name, e);
            e
        })?;
    }
    session.close();

    Ok(builder.finish())
}

struct BlockBuilder<'s, 'a> {
    section: &'s CodeRegion<'a>,
    block: BasicBlock,
    /// Offset of the next instruction in `section.bytes`
    cursor: usize,
    state: BuildState,
}

impl<'s, 'a> BlockBuilder<'s, 'a> {
    fn new(section: &'s CodeRegion<'a>, start: Address) -> Self {
        Self {
            section,
            block: BasicBlock::new(start, section.name),
            cursor: 0,
            state: BuildState::Init,
        }
    }

    fn check_bounds(&mut self) -> Result<(), DisassemblyError> {
        debug_assert_eq!(self.state, BuildState::Init);

        let start = self.block.start;
        match self.section.offset_of(start) {
            Some(offset) => {
                self.cursor = offset;
                self.state = BuildState::Decoding;
                Ok(())
            }
            None => {
                log::error!(
                    "basic block address 0x{:x} points outside of section '{}'",
                    start, self.section.name
                );
                Err(DisassemblyError::OutOfBounds {
                    address: start,
                    section: self.section.name.to_string(),
                })
            }
        }
    }

    /// Decode one instruction and return the next state.
    fn step(&mut self, session: &DecodeSession) -> Result<BuildState, DecoderError> {
        let code = &self.section.bytes[self.cursor..];
        let decoded = match session.next(code, self.block.end)? {
            DecodeStep::Insn(insn) if insn.size > 0 => insn,
            // Zero-length output is a decoder fault, not bad input
            DecodeStep::Insn(_) | DecodeStep::Exhausted => return Ok(BuildState::Terminated),
            DecodeStep::Invalid => {
                log::trace!("invalid encoding at 0x{:x}", self.block.end);
                self.block.invalid = true;
                self.block.end += 1;
                return Ok(BuildState::Terminated);
            }
        };

        let operands: Vec<Operand> = decoded.operands.iter().map(operand::translate).collect();
        let class = arm::classify(&ArmInsnView::of(&decoded, &operands));
        let nop = class.is_nop();

        // The first instruction decides whether this is a padding block.
        let mode = if self.block.is_empty() && nop {
            BuildState::GroupingNop
        } else {
            self.state
        };
        match (mode, nop) {
            (BuildState::Decoding, true) | (BuildState::GroupingNop, false) => {
                return Ok(BuildState::Terminated);
            }
            _ => {}
        }

        self.cursor += decoded.size;
        self.block.privileged |= class.privileged;
        self.block.trap |= class.trap;
        self.block.padding |= nop;
        self.block.add_instruction(to_instruction(decoded, operands, class));

        if class.is_cflow() {
            Ok(BuildState::Terminated)
        } else {
            Ok(mode)
        }
    }

    fn finish(mut self) -> BasicBlock {
        if self.block.is_empty() {
            self.block.invalid = true;
            // Forward progress, unless the invalid decode already moved `end`
            if self.block.end == self.block.start {
                self.block.end += 1;
            }
        }

        log::trace!(
            "block 0x{:x}-0x{:x} in '{}': {} instructions{}",
            self.block.start,
            self.block.end,
            self.block.section,
            self.block.len(),
            if self.block.invalid { " (invalid)" } else { "" }
        );
        self.block
    }
}

/// Build the canonical record for one classified instruction.
fn to_instruction(insn: DecodedInsn, operands: Vec<Operand>, class: Classification) -> Instruction {
    let mut flags = class.flags;
    let mut target = None;

    if class.is_cflow() {
        // Any control transfer through memory is indirect, whatever the predicates said.
        if operands.iter().any(Operand::is_mem) {
            flags |= InsnFlags::INDIRECT;
        }
        target = operands.iter().filter_map(Operand::imm).last().map(arm::branch_target);
    }

    Instruction {
        id: insn.id,
        addr: insn.address,
        size: insn.size as u8,
        bytes: insn.bytes,
        mnemonic: insn.mnemonic,
        op_str: insn.op_str,
        flags,
        privileged: class.privileged,
        trap: class.trap,
        target,
        operands,
    }
}
