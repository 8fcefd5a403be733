//! Linear-sweep block decoding

use std::time::Instant;

use crate::block::disassemble_block;
use crate::{BasicBlock, BinaryMetadata, CodeRegion, DisassemblyError};

/// Decode `section` as back-to-back basic blocks.
///
/// Every block starts where the previous one ended, so invalid bytes and
/// padding runs are covered by blocks of their own.
///
/// # Arguments
/// * `binary` - Architecture and width of the code
/// * `section` - The section to sweep
///
/// # Returns
/// The blocks in address order
pub fn run(binary: &BinaryMetadata, section: &CodeRegion<'_>) -> Result<Vec<BasicBlock>, DisassemblyError> {
    log::debug!("Starting linear sweep of '{}' ({} bytes)", section.name, section.size());
    let start_time = Instant::now();

    let mut blocks = Vec::new();
    let mut at = section.address;
    let end = section.end_address();

    while at < end {
        let block = disassemble_block(binary, section, at)?;
        at = block.end;
        blocks.push(block);
    }

    let invalid = blocks.iter().filter(|b| b.invalid).count();
    log::debug!(
        "Linear sweep of '{}' completed in {:?}: {} blocks, {} invalid",
        section.name,
        start_time.elapsed(),
        blocks.len(),
        invalid
    );

    Ok(blocks)
}
