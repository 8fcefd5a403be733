//! Core IR, traits, metadata, and dispatch for the Nuclide basic-block disassembler.
//!
//! This library turns the bytes of an executable section into basic blocks:
//! terminated runs of decoded instructions, each carrying the control-flow
//! classification (call, return, jump, conditional, indirect, nop) that a
//! CFG recovery tool needs. Decoding is delegated to the Capstone engine;
//! classification is done here from Capstone's opcode ids and operands.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::fs;
//! use nuclide_blocks::{
//!     block::disassemble_block,
//!     parser::GoblinParser,
//!     strategy::Strategy,
//!     BinaryParser, // Import the trait to bring parse() method into scope
//! };
//!
//! // Read and parse the binary
//! let binary_data = fs::read("path/to/binary").unwrap();
//! let metadata = GoblinParser::new().parse(&binary_data).unwrap();
//!
//! for region in metadata.code_regions(&binary_data) {
//!     // One block at the start of the section
//!     let block = disassemble_block(&metadata, &region, region.address).unwrap();
//!     println!("{} instructions, ends at 0x{:x}", block.len(), block.end);
//!
//!     // Or every block of the section
//!     let blocks = Strategy::Linear.run(&metadata, &region).unwrap();
//! }
//! ```

pub mod arch;
pub mod block;
pub mod decoder;
pub mod format;
pub mod operand;
pub mod parser;
pub mod strategy;
#[cfg(feature = "extension-module")]
pub mod python;

use std::fmt;

use bitflags::bitflags;

pub use crate::decoder::DecoderError;
pub use crate::operand::{MemRef, Operand};

/// Represents an address in memory
pub type Address = u64;

/// Maximum instruction size in bytes
pub const MAX_INSTRUCTION_SIZE: usize = 16;

bitflags! {
    /// Control-flow classification of one instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InsnFlags: u16 {
        /// No architectural effect (alignment padding)
        const NOP      = 0x0001;
        /// Returns to the caller
        const RET      = 0x0002;
        /// Jump, conditional or not
        const JMP      = 0x0004;
        /// Only taken when the condition code holds
        const COND     = 0x0008;
        /// Transfers control; always ends a basic block
        const CFLOW    = 0x0010;
        /// Sets the link register
        const CALL     = 0x0020;
        /// Destination comes from a register or memory
        const INDIRECT = 0x0040;
    }
}

impl fmt::Display for InsnFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// One decoded and classified instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Decoder-assigned opcode id
    pub id: u32,
    /// Address of the instruction
    pub addr: Address,
    /// Size of the instruction in bytes
    pub size: u8,
    /// Raw bytes of the instruction (up to MAX_INSTRUCTION_SIZE)
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
    /// Instruction mnemonic (e.g., "mov", "pop")
    pub mnemonic: String,
    /// Operands as string representation
    pub op_str: String,
    /// Control-flow classification
    pub flags: InsnFlags,
    /// Requires a privileged execution mode
    pub privileged: bool,
    /// Raises a trap
    pub trap: bool,
    /// Literal branch target encoded in the instruction, if any
    pub target: Option<Address>,
    /// Canonical operands
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Returns the instruction bytes, up to the actual instruction size.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size as usize]
    }

    /// Address of the byte after this instruction.
    pub fn end_address(&self) -> Address {
        self.addr + self.size as Address
    }

    pub fn is_cflow(&self) -> bool {
        self.flags.contains(InsnFlags::CFLOW)
    }

    pub fn is_nop(&self) -> bool {
        self.flags.contains(InsnFlags::NOP)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.mnemonic, self.op_str)
    }
}

/// One basic block: a run of instructions with a single entry whose control
/// leaves only through the last instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Starting address of the basic block
    pub start: Address,
    /// Address one past the last byte covered by the block
    pub end: Address,
    /// Instructions within this basic block
    pub insns: Vec<Instruction>,
    /// Name of the section the block was decoded from
    pub section: String,
    /// Decoding hit an unrecognized encoding; `insns` is best-effort
    pub invalid: bool,
    /// The block only holds no-ops
    pub padding: bool,
    /// Some instruction raises a trap
    pub trap: bool,
    /// Some instruction is privileged
    pub privileged: bool,
}

impl BasicBlock {
    /// Create an empty block at `start`
    pub fn new(start: Address, section: &str) -> Self {
        Self {
            start,
            end: start,
            insns: Vec::new(),
            section: section.to_string(),
            invalid: false,
            padding: false,
            trap: false,
            privileged: false,
        }
    }

    /// Append an instruction and move `end` past it
    pub fn add_instruction(&mut self, insn: Instruction) {
        self.end += insn.size as Address;
        self.insns.push(insn);
    }

    /// Get the last instruction in the block
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.insns.last()
    }

    /// Number of decoded instructions
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Get the size of the block in bytes
    pub fn size(&self) -> usize {
        (self.end - self.start) as usize
    }

    /// True when the last instruction transfers control
    pub fn ends_in_cflow(&self) -> bool {
        self.last_instruction().is_some_and(Instruction::is_cflow)
    }
}

/// Supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Architecture {
    /// 32-bit x86
    X86_32,
    /// 64-bit x86
    X86_64,
    /// ARM (32-bit)
    Arm,
    /// AArch64 (ARM 64-bit)
    AArch64,
    /// MIPS 32-bit
    Mips32,
    /// RISC-V
    RiscV,
    /// Unknown architecture
    Unknown,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_32 => write!(f, "x86-32"),
            Architecture::X86_64 => write!(f, "x86-64"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::AArch64 => write!(f, "AArch64"),
            Architecture::Mips32 => write!(f, "MIPS32"),
            Architecture::RiscV => write!(f, "RISC-V"),
            Architecture::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A section header in the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name
    pub name: String,
    /// Starting virtual address of the section
    pub address: Address,
    /// Size of the section in bytes
    pub size: usize,
    /// Offset of the section contents in the file
    pub offset: usize,
    /// Whether this section contains executable code
    pub executable: bool,
}

impl Section {
    /// Create a new section
    pub fn new(name: String, address: Address, size: usize, offset: usize, executable: bool) -> Self {
        Self {
            name,
            address,
            size,
            offset,
            executable,
        }
    }

    /// Get the end address of this section
    pub fn end_address(&self) -> Address {
        self.address + self.size as Address
    }

    /// Contents of the section inside `image`, if the file range fits.
    pub fn data<'a>(&self, image: &'a [u8]) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(self.size)?;
        image.get(self.offset..end)
    }
}

/// Borrowed view of one section's bytes, as handed to the block builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRegion<'a> {
    /// Section name, used in diagnostics and as the block back-reference
    pub name: &'a str,
    /// Virtual address of the first byte
    pub address: Address,
    /// Section contents
    pub bytes: &'a [u8],
}

impl<'a> CodeRegion<'a> {
    pub fn new(name: &'a str, address: Address, bytes: &'a [u8]) -> Self {
        Self { name, address, bytes }
    }

    /// Size of the region in bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Address one past the last byte
    pub fn end_address(&self) -> Address {
        self.address + self.bytes.len() as Address
    }

    /// Byte offset of `address`, or `None` when it falls outside `[address, address + size)`.
    pub fn offset_of(&self, address: Address) -> Option<usize> {
        let offset = address.checked_sub(self.address)?;
        if offset >= self.bytes.len() as Address {
            return None;
        }
        Some(offset as usize)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.offset_of(address).is_some()
    }
}

/// Metadata describing a parsed binary.
#[derive(Debug, Clone)]
pub struct BinaryMetadata {
    /// Detected architecture
    pub architecture: Architecture,
    /// Word size in bits (32, 64)
    pub bits: u32,
    /// Entry point address, if available
    pub entry_point: Option<Address>,
    /// List of sections found in the binary
    pub sections: Vec<Section>,
    /// Address of the .text section, if found
    pub text_section: Option<Address>,
}

impl BinaryMetadata {
    /// Fallback metadata when no headers could be parsed.
    pub fn default_raw() -> Self {
        Self::raw(Architecture::Unknown, 0)
    }

    /// Metadata for a headerless image of a known architecture.
    pub fn raw(architecture: Architecture, bits: u32) -> Self {
        Self {
            architecture,
            bits,
            entry_point: None,
            sections: Vec::new(),
            text_section: None,
        }
    }

    /// Views of every executable section whose contents lie inside `image`.
    pub fn code_regions<'a>(&'a self, image: &'a [u8]) -> Vec<CodeRegion<'a>> {
        self.sections
            .iter()
            .filter(|s| s.executable && s.size > 0)
            .filter_map(|s| match s.data(image) {
                Some(bytes) => Some(CodeRegion::new(&s.name, s.address, bytes)),
                None => {
                    log::debug!(
                        "section '{}' (0x{:x}+{}) lies outside the file, skipping",
                        s.name, s.offset, s.size
                    );
                    None
                }
            })
            .collect()
    }

    /// Find a section by name
    pub fn find_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Get all executable sections
    pub fn executable_sections(&self) -> Vec<&Section> {
        self.sections.iter().filter(|s| s.executable).collect()
    }
}

/// Parser trait: turn raw bytes into `BinaryMetadata`.
pub trait BinaryParser: Send + Sync {
    /// Parse binary data into metadata
    ///
    /// # Arguments
    /// * `data` - The binary data to parse
    ///
    /// # Returns
    /// Result containing BinaryMetadata if parsing was successful
    fn parse(&self, data: &[u8]) -> Result<BinaryMetadata, DisassemblyError>;
}

/// Error type for disassembly operations
#[derive(Debug, thiserror::Error)]
pub enum DisassemblyError {
    /// Failed to parse binary format
    #[error("Failed to parse binary format: {0}")]
    ParsingError(String),

    /// Decoder setup or allocation failure
    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),

    /// Block start outside of its section
    #[error("Address 0x{address:x} points outside of section '{section}'")]
    OutOfBounds { address: Address, section: String },

    /// Unsupported architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Output formatting failed
    #[error("Format error: {0}")]
    Format(String),
}
