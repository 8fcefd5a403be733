//! Capstone decoding sessions.
//!
//! A [`DecodeSession`] owns one configured Capstone handle for a single
//! architecture and mode. It decodes one instruction per call and is released
//! when it goes out of scope, so every exit path of a block build tears the
//! handle down.

use std::fmt;

use capstone::arch::arm::{ArchMode as ArmMode, ArmCC, ArmInsn, ArmOperand};
use capstone::prelude::*;
use capstone::InsnIdInt;

use crate::{Address, Architecture, MAX_INSTRUCTION_SIZE};

/// Errors that can occur while setting up or driving a decoder
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// Capstone could not be initialised
    #[error("failed to initialize capstone: {0}")]
    Init(#[from] capstone::Error),

    /// No decoding support for this architecture
    #[error("unsupported architecture {0}")]
    UnsupportedArchitecture(Architecture),

    /// The architecture is supported, but not at this width
    #[error("unsupported bit width {bits} for architecture {arch}")]
    UnsupportedBitWidth { arch: Architecture, bits: u32 },

    /// Capstone ran out of memory for instruction scratch space
    #[error("out of memory")]
    Allocation,
}

/// One instruction as Capstone sees it, before classification.
#[derive(Debug, Clone)]
pub struct DecodedInsn {
    /// Capstone opcode id
    pub id: InsnIdInt,
    pub address: Address,
    /// Encoded length in bytes
    pub size: usize,
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
    pub mnemonic: String,
    pub op_str: String,
    /// Condition code
    pub cc: ArmCC,
    /// Native operands, in decoder order
    pub operands: Vec<ArmOperand>,
}

/// Outcome of one decode request.
#[derive(Debug, Clone)]
pub enum DecodeStep {
    /// An instruction was decoded
    Insn(DecodedInsn),
    /// The bytes do not encode a known instruction
    Invalid,
    /// No bytes left
    Exhausted,
}

/// A stateful decoding session for one architecture and mode.
pub struct DecodeSession {
    cs: Capstone,
    arch: Architecture,
}

impl DecodeSession {
    /// Open a session for `arch` at word size `bits`.
    ///
    /// Only 32-bit ARM (ARM mode, little endian) is supported.
    pub fn open(arch: Architecture, bits: u32) -> Result<Self, DecoderError> {
        let cs = match (arch, bits) {
            (Architecture::Arm, 32) => Capstone::new()
                .arm()
                .mode(ArmMode::Arm)
                .detail(true)
                .build()?,
            (Architecture::Arm, _) => {
                return Err(DecoderError::UnsupportedBitWidth { arch, bits });
            }
            _ => return Err(DecoderError::UnsupportedArchitecture(arch)),
        };

        log::trace!("opened {} decoder session ({} bits)", arch, bits);
        Ok(Self { cs, arch })
    }

    /// Get the architecture of this session
    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    /// Decode the instruction at the start of `code`, located at `address`.
    pub fn next(&self, code: &[u8], address: Address) -> Result<DecodeStep, DecoderError> {
        if code.is_empty() {
            return Ok(DecodeStep::Exhausted);
        }

        // Only look at a small slice (16 bytes max)
        let window = &code[..code.len().min(MAX_INSTRUCTION_SIZE)];

        let insns = match self.cs.disasm_count(window, address, 1) {
            Ok(insns) => insns,
            Err(capstone::Error::OutOfMemory) => return Err(DecoderError::Allocation),
            Err(e) => {
                log::trace!("capstone rejected bytes at 0x{:x}: {}", address, e);
                return Ok(DecodeStep::Invalid);
            }
        };
        let insn = match insns.iter().next() {
            Some(insn) => insn,
            None => return Ok(DecodeStep::Invalid),
        };
        if insn.id().0 == ArmInsn::ARM_INS_INVALID as InsnIdInt {
            return Ok(DecodeStep::Invalid);
        }

        let detail = match self.cs.insn_detail(&insn) {
            Ok(detail) => detail,
            Err(e) => {
                log::trace!("no detail for instruction at 0x{:x}: {}", address, e);
                return Ok(DecodeStep::Invalid);
            }
        };
        let arch_detail = detail.arch_detail();
        let arm = match arch_detail.arm() {
            Some(arm) => arm,
            None => return Ok(DecodeStep::Invalid),
        };

        // Copy up to MAX_INSTRUCTION_SIZE bytes of encoding
        let encoding = insn.bytes();
        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        let n = encoding.len().min(MAX_INSTRUCTION_SIZE);
        bytes[..n].copy_from_slice(&encoding[..n]);

        Ok(DecodeStep::Insn(DecodedInsn {
            id: insn.id().0,
            address: insn.address(),
            size: encoding.len(),
            bytes,
            mnemonic: insn.mnemonic().unwrap_or("").to_string(),
            op_str: insn.op_str().unwrap_or("").to_string(),
            cc: arm.cc(),
            operands: arm.operands().collect(),
        }))
    }

    /// Release the session.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        log::trace!("closing {} decoder session", self.arch);
    }
}

impl fmt::Debug for DecodeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeSession").field("arch", &self.arch).finish()
    }
}
