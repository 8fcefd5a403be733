//! CSV output formatter

use super::{hex_bytes, BlockFormatter};
use crate::{BasicBlock, DisassemblyError};

impl BlockFormatter for super::CsvFormatter {
    fn format(&self, blocks: &[BasicBlock]) -> Result<String, DisassemblyError> {
        let mut output = String::new();

        // CSV header
        output.push_str("section,block_start,block_end,invalid,padding,address,size,mnemonic,operands,flags,target,bytes\n");

        for block in blocks {
            let section = escape_csv_field(&block.section);
            let block_start = format!("0x{:x}", block.start);
            let block_end = format!("0x{:x}", block.end);

            if block.insns.is_empty() {
                // Keep empty (invalid) blocks visible
                output.push_str(&format!(
                    "{},{},{},{},{},,,,,,,\n",
                    section, block_start, block_end, block.invalid, block.padding
                ));
                continue;
            }

            for insn in &block.insns {
                // Escape fields that might contain commas
                let mnemonic = escape_csv_field(&insn.mnemonic);
                let operands = escape_csv_field(&insn.op_str);
                let target = insn.target.map(|t| format!("0x{:x}", t)).unwrap_or_default();

                output.push_str(&format!(
                    "{},{},{},{},{},0x{:x},{},{},{},{},{},{}\n",
                    section,
                    block_start,
                    block_end,
                    block.invalid,
                    block.padding,
                    insn.addr,
                    insn.size,
                    mnemonic,
                    operands,
                    insn.flags,
                    target,
                    hex_bytes(insn)
                ));
            }
        }

        Ok(output)
    }
}

/// Helper function to escape a field for CSV output
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        // Need to escape
        let escaped = field.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::create_test_blocks;
    use super::super::CsvFormatter;
    use super::*;

    #[test]
    fn test_csv_formatter() {
        let output = CsvFormatter.format(&create_test_blocks()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        // Header, 2 + 1 instructions, 1 empty block
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("section,block_start"));
        assert_eq!(
            lines[1],
            ".text,0x1000,0x1008,false,false,0x1000,4,mov,\"r0, #1\",,,01 00 a0 e3"
        );
        assert!(lines[2].contains(",JMP|CFLOW,0x1010,"));
        assert_eq!(lines[4], ".text,0x100c,0x100d,true,false,,,,,,,");
    }

    #[test]
    fn test_escape_csv_field() {
        assert_eq!(escape_csv_field("r0"), "r0");
        assert_eq!(escape_csv_field("r0, r1"), "\"r0, r1\"");
        assert_eq!(escape_csv_field("a\"b"), "\"a\"\"b\"");
    }
}
