//! JSON and JSON Lines output formatters

use serde::Serialize;
use serde_json::json;

use super::{block_attributes, hex_bytes, BlockFormatter};
use crate::{BasicBlock, DisassemblyError, Instruction, Operand};

/// Serializable instruction for JSON output
#[derive(Serialize)]
struct InstructionJson<'a> {
    /// Address of the instruction
    address: String,
    /// Size of the instruction in bytes
    size: u8,
    /// Mnemonic (e.g., "mov", "pop")
    mnemonic: &'a str,
    /// Operand text
    op_str: &'a str,
    /// Bytes of the instruction as hex string
    bytes: String,
    /// Control-flow flags by name
    flags: Vec<&'static str>,
    /// Direct branch target
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    operands: &'a [Operand],
}

/// Serializable basic block for JSON output
#[derive(Serialize)]
struct BasicBlockJson<'a> {
    /// Starting address of the block
    start: String,
    /// End address (exclusive)
    end: String,
    section: &'a str,
    invalid: bool,
    padding: bool,
    trap: bool,
    privileged: bool,
    /// Instructions in this block
    instructions: Vec<InstructionJson<'a>>,
}

/// Serializable disassembly result for JSON output
#[derive(Serialize)]
struct BlocksJson<'a> {
    blocks: Vec<BasicBlockJson<'a>>,
}

fn json_error(e: serde_json::Error) -> DisassemblyError {
    DisassemblyError::Format(format!("JSON serialization error: {}", e))
}

impl BlockFormatter for super::JsonFormatter {
    fn format(&self, blocks: &[BasicBlock]) -> Result<String, DisassemblyError> {
        let result = BlocksJson {
            blocks: blocks.iter().map(block_to_json).collect(),
        };

        serde_json::to_string_pretty(&result).map_err(json_error)
    }
}

impl BlockFormatter for super::JsonLinesFormatter {
    fn format(&self, blocks: &[BasicBlock]) -> Result<String, DisassemblyError> {
        let mut output = String::new();

        for block in blocks {
            let block_json = json!({
                "type": "block",
                "start": format!("0x{:x}", block.start),
                "end": format!("0x{:x}", block.end),
                "section": block.section,
                "attributes": block_attributes(block),
            });
            output.push_str(&serde_json::to_string(&block_json).map_err(json_error)?);
            output.push('\n');

            // Then output instructions for this block
            for insn in &block.insns {
                let instruction = json!({
                    "type": "instruction",
                    "block_start": format!("0x{:x}", block.start),
                    "instruction": instruction_to_json(insn),
                });
                output.push_str(&serde_json::to_string(&instruction).map_err(json_error)?);
                output.push('\n');
            }
        }

        Ok(output)
    }
}

/// Convert an instruction to JSON format
fn instruction_to_json(insn: &Instruction) -> InstructionJson<'_> {
    InstructionJson {
        address: format!("0x{:x}", insn.addr),
        size: insn.size,
        mnemonic: &insn.mnemonic,
        op_str: &insn.op_str,
        bytes: hex_bytes(insn),
        flags: insn.flags.iter_names().map(|(name, _)| name).collect(),
        target: insn.target.map(|t| format!("0x{:x}", t)),
        operands: &insn.operands,
    }
}

/// Convert a basic block to JSON format
fn block_to_json(block: &BasicBlock) -> BasicBlockJson<'_> {
    BasicBlockJson {
        start: format!("0x{:x}", block.start),
        end: format!("0x{:x}", block.end),
        section: &block.section,
        invalid: block.invalid,
        padding: block.padding,
        trap: block.trap,
        privileged: block.privileged,
        instructions: block.insns.iter().map(instruction_to_json).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::create_test_blocks;
    use super::super::{JsonFormatter, JsonLinesFormatter};
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_json_formatter() {
        let output = JsonFormatter.format(&create_test_blocks()).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();

        let blocks = value["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["start"], "0x1000");
        assert_eq!(blocks[0]["end"], "0x1008");
        assert_eq!(blocks[0]["instructions"][1]["flags"], json!(["JMP", "CFLOW"]));
        assert_eq!(blocks[0]["instructions"][1]["target"], "0x1010");
        assert!(blocks[0]["instructions"][0].get("target").is_none());
        assert_eq!(blocks[1]["padding"], true);
        assert_eq!(blocks[2]["invalid"], true);
    }

    #[test]
    fn test_json_lines_formatter() {
        let output = JsonLinesFormatter.format(&create_test_blocks()).unwrap();
        let lines: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        // 3 blocks + 3 instructions
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0]["type"], "block");
        assert_eq!(lines[1]["type"], "instruction");
        assert_eq!(lines[1]["instruction"]["mnemonic"], "mov");
        assert_eq!(lines[5]["attributes"], json!(["invalid"]));
    }
}
