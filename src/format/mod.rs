//! Output format module implementation

mod csv;
mod json;

pub use self::csv::*;
pub use self::json::*;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::{BasicBlock, DisassemblyError, Instruction};

/// Supported output formats for basic blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output (default)
    Text,
    /// JSON format (hierarchical)
    Json,
    /// JSON Lines format (one JSON object per line)
    JsonLines,
    /// CSV format (one row per instruction)
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get the default output format
    pub fn default() -> Self {
        OutputFormat::Text
    }

    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn BlockFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatter trait for basic blocks
pub trait BlockFormatter {
    /// Render a list of blocks
    fn format(&self, blocks: &[BasicBlock]) -> Result<String, DisassemblyError>;
}

/// Format blocks in plain text
pub struct TextFormatter;

/// Format blocks in JSON
pub struct JsonFormatter;

/// Format blocks in JSON Lines
pub struct JsonLinesFormatter;

/// Format blocks in CSV
pub struct CsvFormatter;

/// Instruction bytes as space-separated hex
pub(crate) fn hex_bytes(insn: &Instruction) -> String {
    insn.bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Block attributes that are set, e.g. `invalid,padding`
pub(crate) fn block_attributes(block: &BasicBlock) -> Vec<&'static str> {
    [
        (block.invalid, "invalid"),
        (block.padding, "padding"),
        (block.trap, "trap"),
        (block.privileged, "privileged"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

impl BlockFormatter for TextFormatter {
    fn format(&self, blocks: &[BasicBlock]) -> Result<String, DisassemblyError> {
        let mut output = String::new();

        for block in blocks {
            output.push_str(&format!(
                "Block 0x{:08x}-0x{:08x} [{}]",
                block.start, block.end, block.section
            ));
            let attributes = block_attributes(block);
            if !attributes.is_empty() {
                output.push_str(&format!(" ({})", attributes.join(", ")));
            }
            output.push('\n');

            for insn in &block.insns {
                output.push_str(&format!(
                    "  0x{:08x}: {:<10} {:<30} ; {}",
                    insn.addr,
                    insn.mnemonic,
                    insn.op_str,
                    hex_bytes(insn)
                ));
                if !insn.flags.is_empty() {
                    output.push_str(&format!(" [{}]", insn.flags));
                }
                if let Some(target) = insn.target {
                    output.push_str(&format!(" -> 0x{:08x}", target));
                }
                output.push('\n');
            }

            output.push('\n');
        }

        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{InsnFlags, Operand, MAX_INSTRUCTION_SIZE};

    fn insn(addr: u64, mnemonic: &str, op_str: &str, encoding: [u8; 4], flags: InsnFlags) -> Instruction {
        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        bytes[..4].copy_from_slice(&encoding);
        Instruction {
            id: 0,
            addr,
            size: 4,
            bytes,
            mnemonic: mnemonic.to_string(),
            op_str: op_str.to_string(),
            flags,
            privileged: false,
            trap: false,
            target: None,
            operands: vec![Operand::None],
        }
    }

    pub(crate) fn create_test_blocks() -> Vec<BasicBlock> {
        let mut block1 = BasicBlock::new(0x1000, ".text");
        block1.add_instruction(insn(0x1000, "mov", "r0, #1", [0x01, 0x00, 0xa0, 0xe3], InsnFlags::empty()));
        let mut branch = insn(0x1004, "b", "#0x1010", [0x01, 0x00, 0x00, 0xea], InsnFlags::JMP | InsnFlags::CFLOW);
        branch.target = Some(0x1010);
        block1.add_instruction(branch);

        let mut block2 = BasicBlock::new(0x1008, ".text");
        block2.add_instruction(insn(0x1008, "nop", "", [0x00, 0xf0, 0x20, 0xe3], InsnFlags::NOP));
        block2.padding = true;

        let mut block3 = BasicBlock::new(0x100c, ".text");
        block3.invalid = true;
        block3.end = 0x100d;

        vec![block1, block2, block3]
    }

    #[test]
    fn test_text_formatter() {
        let result = TextFormatter.format(&create_test_blocks()).unwrap();

        assert!(result.contains("Block 0x00001000-0x00001008 [.text]"));
        assert!(result.contains("0x00001000: mov"));
        assert!(result.contains("01 00 a0 e3"));
        assert!(result.contains("[JMP|CFLOW] -> 0x00001010"));
        assert!(result.contains("Block 0x00001008-0x0000100c [.text] (padding)"));
        assert!(result.contains("Block 0x0000100c-0x0000100d [.text] (invalid)"));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("jsonl".parse::<OutputFormat>().unwrap(), OutputFormat::JsonLines);
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::JsonLines.to_string(), "jsonl");
    }

    #[test]
    fn test_format_selection() {
        let blocks = create_test_blocks();

        // Every formatter handles every block kind
        for format in OutputFormat::available_formats() {
            let output = format.get_formatter().format(&blocks).unwrap();
            assert!(!output.is_empty(), "{} produced no output", format);
        }
    }
}
