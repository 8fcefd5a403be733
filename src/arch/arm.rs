//! ARM (32-bit, ARM mode) control-flow predicates.
//!
//! Every predicate looks only at the opcode id, the condition code and the
//! shape of the operand list. Mnemonic text is never consulted, so encoding
//! aliases cannot produce false positives.

use capstone::arch::arm::{ArmCC, ArmInsn, ArmReg};
use capstone::{InsnIdInt, RegIdInt};

use super::Classification;
use crate::decoder::DecodedInsn;
use crate::{Address, InsnFlags, Instruction, Operand};

/// Program counter
pub const PC: RegIdInt = ArmReg::ARM_REG_PC as RegIdInt;
/// Link register
pub const LR: RegIdInt = ArmReg::ARM_REG_LR as RegIdInt;

const INS_NOP: InsnIdInt = ArmInsn::ARM_INS_NOP as InsnIdInt;
const INS_HINT: InsnIdInt = ArmInsn::ARM_INS_HINT as InsnIdInt;
const INS_B: InsnIdInt = ArmInsn::ARM_INS_B as InsnIdInt;
const INS_BL: InsnIdInt = ArmInsn::ARM_INS_BL as InsnIdInt;
const INS_BLX: InsnIdInt = ArmInsn::ARM_INS_BLX as InsnIdInt;
const INS_BX: InsnIdInt = ArmInsn::ARM_INS_BX as InsnIdInt;
const INS_BXJ: InsnIdInt = ArmInsn::ARM_INS_BXJ as InsnIdInt;
const INS_POP: InsnIdInt = ArmInsn::ARM_INS_POP as InsnIdInt;
const INS_MOV: InsnIdInt = ArmInsn::ARM_INS_MOV as InsnIdInt;
const INS_LDR: InsnIdInt = ArmInsn::ARM_INS_LDR as InsnIdInt;

/// The fields of one instruction the predicates look at.
#[derive(Debug, Clone, Copy)]
pub struct ArmInsnView<'a> {
    /// Capstone opcode id
    pub id: InsnIdInt,
    /// Condition code
    pub cc: ArmCC,
    /// Canonical operands
    pub operands: &'a [Operand],
    /// Raw 32-bit instruction word
    pub encoding: u32,
}

impl<'a> ArmInsnView<'a> {
    pub fn new(id: InsnIdInt, cc: ArmCC, operands: &'a [Operand]) -> Self {
        Self { id, cc, operands, encoding: 0 }
    }

    /// Same view, carrying the instruction word `encoding`.
    pub fn encoded(self, encoding: u32) -> Self {
        Self { encoding, ..self }
    }

    /// View of a decoded instruction whose operands were already translated.
    pub fn of(insn: &DecodedInsn, operands: &'a [Operand]) -> Self {
        let [b0, b1, b2, b3, ..] = insn.bytes;
        Self::new(insn.id, insn.cc, operands).encoded(u32::from_le_bytes([b0, b1, b2, b3]))
    }

    /// Hint number of a `HINT` instruction (0 = nop, 1 = yield, 3 = wfi, ...)
    fn hint(&self) -> Option<u32> {
        (self.id == INS_HINT).then_some(self.encoding & 0xff)
    }

    fn op_is_reg(&self, index: usize, reg: RegIdInt) -> bool {
        self.operands.get(index).is_some_and(|op| op.is_reg(reg))
    }

    fn always(&self) -> bool {
        self.cc == ArmCC::ARM_CC_AL
    }

    /// `mov pc, rN` with rN anything but the link register
    fn is_mov_pc_from_reg(&self) -> bool {
        self.id == INS_MOV
            && self.op_is_reg(0, PC)
            && matches!(self.operands.get(1), Some(Operand::Reg(src)) if *src != LR)
    }

    /// `ldr pc, [...]`
    fn is_ldr_pc(&self) -> bool {
        self.id == INS_LDR && self.op_is_reg(0, PC)
    }
}

/// `nop`, whether decoded as its own opcode or as hint #0.
pub fn is_nop(insn: &ArmInsnView<'_>) -> bool {
    insn.id == INS_NOP || insn.hint() == Some(0)
}

// No trap or privileged opcodes are modelled for ARM yet.
pub fn is_trap(_insn: &ArmInsnView<'_>) -> bool {
    false
}

pub fn is_privileged(_insn: &ArmInsnView<'_>) -> bool {
    false
}

pub fn is_call(insn: &ArmInsnView<'_>) -> bool {
    matches!(insn.id, INS_BL | INS_BLX)
}

/// `bx lr`, `pop {..., pc}` or `mov pc, lr`.
pub fn is_return(insn: &ArmInsnView<'_>) -> bool {
    match insn.id {
        INS_BX => insn.operands.len() == 1 && insn.op_is_reg(0, LR),
        INS_POP => insn.operands.iter().any(|op| op.is_reg(PC)),
        INS_MOV => insn.op_is_reg(0, PC) && insn.op_is_reg(1, LR),
        _ => false,
    }
}

/// `b` (always), `mov pc, rN` or `ldr pc, [...]`.
pub fn is_unconditional_jump(insn: &ArmInsnView<'_>) -> bool {
    (insn.id == INS_B && insn.always()) || insn.is_mov_pc_from_reg() || insn.is_ldr_pc()
}

/// Branch or call with a condition other than "always".
pub fn is_conditional_cflow(insn: &ArmInsnView<'_>) -> bool {
    matches!(insn.id, INS_B | INS_BL | INS_BLX) && !insn.always()
}

pub fn is_indirect(insn: &ArmInsnView<'_>) -> bool {
    if insn.is_mov_pc_from_reg() || insn.is_ldr_pc() {
        return true;
    }
    matches!(insn.id, INS_BX | INS_BLX | INS_BXJ) && insn.op_is_reg(0, PC)
}

/// Any instruction that ends a basic block.
pub fn is_cflow(insn: &ArmInsnView<'_>) -> bool {
    is_unconditional_jump(insn) || is_conditional_cflow(insn) || is_call(insn) || is_return(insn)
}

/// Run every predicate and collect the result as flags.
pub fn classify(insn: &ArmInsnView<'_>) -> Classification {
    let cond = is_conditional_cflow(insn);

    let mut flags = InsnFlags::empty();
    flags.set(InsnFlags::NOP, is_nop(insn));
    flags.set(InsnFlags::RET, is_return(insn));
    flags.set(InsnFlags::JMP, is_unconditional_jump(insn) || cond);
    flags.set(InsnFlags::COND, cond);
    flags.set(InsnFlags::CFLOW, is_cflow(insn));
    flags.set(InsnFlags::CALL, is_call(insn));
    flags.set(InsnFlags::INDIRECT, is_indirect(insn));

    Classification {
        flags,
        privileged: is_privileged(insn),
        trap: is_trap(insn),
    }
}

/// Branch immediates are absolute 32-bit addresses.
pub fn branch_target(imm: i64) -> Address {
    imm as u32 as Address
}

/// `blx #imm`: the target is Thumb code, out of reach of an ARM-mode session.
pub fn enters_thumb(insn: &Instruction) -> bool {
    insn.id == INS_BLX && insn.target.is_some()
}
