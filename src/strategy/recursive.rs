//! Recursive block discovery

use std::collections::HashSet;

use rayon::prelude::*;

use crate::arch::arm;
use crate::block::disassemble_block;
use crate::{Address, BasicBlock, BinaryMetadata, CodeRegion, DisassemblyError, InsnFlags};

/// Discover the blocks reachable from `entries` inside `section`.
///
/// Block starts are found wave by wave: every wave is decoded in parallel,
/// then the successors of its blocks form the next wave. Only block starts
/// are discovered; no edges are kept.
///
/// # Arguments
/// * `binary` - Architecture and width of the code
/// * `section` - The section to explore
/// * `entries` - Starting addresses; those outside the section are ignored
///
/// # Returns
/// The discovered blocks, sorted by start address
pub fn run_from(
    binary: &BinaryMetadata,
    section: &CodeRegion<'_>,
    entries: &[Address],
) -> Result<Vec<BasicBlock>, DisassemblyError> {
    log::debug!("Starting recursive descent of '{}' from {:x?}", section.name, entries);

    let mut seen = HashSet::new();
    let mut frontier: Vec<Address> = entries
        .iter()
        .copied()
        .filter(|addr| section.contains(*addr) && seen.insert(*addr))
        .collect();
    let mut blocks = Vec::new();

    while !frontier.is_empty() {
        let wave: Vec<BasicBlock> = frontier
            .par_iter()
            .map(|&addr| disassemble_block(binary, section, addr))
            .collect::<Result<_, _>>()?;

        frontier = wave
            .iter()
            .flat_map(successors)
            .filter(|addr| section.contains(*addr) && seen.insert(*addr))
            .collect();
        blocks.extend(wave);
    }

    blocks.sort_by_key(|block| block.start);
    log::debug!("Recursive descent complete: {} basic blocks", blocks.len());

    Ok(blocks)
}

/// Addresses where control may continue after `block`.
///
/// The literal target of a direct branch, plus the fall-through address for
/// conditional branches, calls, and blocks that end without control flow.
/// Targets of `blx #imm` are Thumb code and are not followed.
pub fn successors(block: &BasicBlock) -> Vec<Address> {
    if block.invalid {
        return Vec::new();
    }

    match block.last_instruction() {
        None => Vec::new(),
        Some(last) if last.is_cflow() => {
            let mut succs: Vec<Address> = if arm::enters_thumb(last) {
                Vec::new()
            } else {
                last.target.into_iter().collect()
            };
            if last.flags.intersects(InsnFlags::COND | InsnFlags::CALL) {
                succs.push(block.end);
            }
            succs
        }
        Some(_) => vec![block.end],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Architecture, Instruction, MAX_INSTRUCTION_SIZE};

    fn block_ending_with(flags: InsnFlags, target: Option<Address>) -> BasicBlock {
        let mut block = BasicBlock::new(0x1000, ".text");
        block.add_instruction(Instruction {
            id: 0,
            addr: 0x1000,
            size: 4,
            bytes: [0; MAX_INSTRUCTION_SIZE],
            mnemonic: String::new(),
            op_str: String::new(),
            flags,
            privileged: false,
            trap: false,
            target,
            operands: Vec::new(),
        });
        block
    }

    #[test]
    fn test_successors() {
        let cflow = InsnFlags::CFLOW;

        assert_eq!(successors(&block_ending_with(InsnFlags::empty(), None)), vec![0x1004]);
        assert_eq!(successors(&block_ending_with(cflow | InsnFlags::JMP, Some(0x2000))), vec![0x2000]);
        assert_eq!(
            successors(&block_ending_with(cflow | InsnFlags::JMP | InsnFlags::COND, Some(0x2000))),
            vec![0x2000, 0x1004]
        );
        assert_eq!(successors(&block_ending_with(cflow | InsnFlags::CALL, Some(0x3000))), vec![0x3000, 0x1004]);
        assert!(successors(&block_ending_with(cflow | InsnFlags::RET, None)).is_empty());
        assert!(successors(&block_ending_with(cflow | InsnFlags::JMP | InsnFlags::INDIRECT, None)).is_empty());

        let mut invalid = block_ending_with(InsnFlags::empty(), None);
        invalid.invalid = true;
        assert!(successors(&invalid).is_empty());
    }

    #[test]
    fn test_recursive_skips_unreachable_code() {
        let bytes = [
            [0x01, 0x00, 0x00, 0x0a], // 0x1000: beq #0x100c
            [0x1e, 0xff, 0x2f, 0xe1], // 0x1004: bx lr
            [0x01, 0x00, 0xa0, 0xe3], // 0x1008: mov r0, #1 (unreachable)
            [0x10, 0x80, 0xbd, 0xe8], // 0x100c: pop {r4, pc}
        ]
        .concat();
        let region = CodeRegion::new(".text", 0x1000, &bytes);
        let binary = BinaryMetadata::raw(Architecture::Arm, 32);

        let blocks = run_from(&binary, &region, &[0x1000]).unwrap();
        let starts: Vec<_> = blocks.iter().map(|b| b.start).collect();

        assert_eq!(starts, vec![0x1000, 0x1004, 0x100c]);
        assert_eq!(blocks[0].insns[0].target, Some(0x100c));
    }

    #[test]
    fn test_recursive_does_not_follow_thumb_calls() {
        let bytes = [
            [0x00, 0x00, 0x00, 0xfa], // 0x1000: blx #0x1008
            [0x1e, 0xff, 0x2f, 0xe1], // 0x1004: bx lr
            [0x01, 0x00, 0xa0, 0xe3], // 0x1008: Thumb code in practice
            [0x1e, 0xff, 0x2f, 0xe1], // 0x100c: bx lr
        ]
        .concat();
        let region = CodeRegion::new(".text", 0x1000, &bytes);
        let binary = BinaryMetadata::raw(Architecture::Arm, 32);

        let blocks = run_from(&binary, &region, &[0x1000]).unwrap();
        let starts: Vec<_> = blocks.iter().map(|b| b.start).collect();

        assert_eq!(starts, vec![0x1000, 0x1004]);
        assert_eq!(blocks[0].insns[0].target, Some(0x1008));
        assert_eq!(successors(&blocks[0]), vec![0x1004]);
    }

    #[test]
    fn test_recursive_ignores_foreign_entries() {
        let bytes = [0x1e, 0xff, 0x2f, 0xe1];
        let region = CodeRegion::new(".text", 0x1000, &bytes);
        let binary = BinaryMetadata::raw(Architecture::Arm, 32);

        let blocks = run_from(&binary, &region, &[0x1000, 0x1000, 0x9000]).unwrap();
        assert_eq!(blocks.len(), 1);
    }
}
