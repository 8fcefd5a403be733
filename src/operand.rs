//! Canonical operand model and the Capstone-to-canonical translator.

use capstone::arch::arm::{ArmOperand, ArmOperandType};
use capstone::RegIdInt;
use serde::Serialize;

/// Memory reference `[base + index * scale + disp]`, copied verbatim from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MemRef {
    /// Base register id (0 when absent)
    pub base: RegIdInt,
    /// Index register id (0 when absent)
    pub index: RegIdInt,
    pub scale: i32,
    pub disp: i64,
}

/// One instruction operand. Exactly one variant is active; the payload is
/// only meaningful for that variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Operand {
    /// Register, by decoder register id
    Reg(RegIdInt),
    /// Immediate value
    Imm(i64),
    /// Memory reference
    Mem(MemRef),
    /// Floating-point immediate
    Fp(f64),
    /// Absent or not modelled
    None,
}

impl Operand {
    pub fn is_mem(&self) -> bool {
        matches!(self, Operand::Mem(_))
    }

    /// Register id, if this is a register operand
    pub fn reg(&self) -> Option<RegIdInt> {
        match self {
            Operand::Reg(reg) => Some(*reg),
            _ => None,
        }
    }

    /// Immediate value, if this is an immediate operand
    pub fn imm(&self) -> Option<i64> {
        match self {
            Operand::Imm(imm) => Some(*imm),
            _ => None,
        }
    }

    /// True if this is the register operand `reg`
    pub fn is_reg(&self, reg: RegIdInt) -> bool {
        self.reg() == Some(reg)
    }
}

/// Convert a Capstone ARM operand into the canonical model.
///
/// Kinds without a canonical counterpart (coprocessor immediates, `setend`,
/// system registers) become [`Operand::None`]. No address arithmetic is done.
pub fn translate(op: &ArmOperand) -> Operand {
    match &op.op_type {
        ArmOperandType::Reg(reg) => Operand::Reg(reg.0),
        ArmOperandType::Imm(imm) => Operand::Imm(i64::from(*imm)),
        ArmOperandType::Mem(mem) => Operand::Mem(MemRef {
            base: mem.base().0,
            index: mem.index().0,
            scale: mem.scale(),
            disp: i64::from(mem.disp()),
        }),
        ArmOperandType::Fp(fp) => Operand::Fp(*fp),
        _ => Operand::None,
    }
}
