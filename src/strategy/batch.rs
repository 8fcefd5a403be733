//! Parallel decoding of independent block requests

use rayon::prelude::*;

use crate::block::disassemble_block;
use crate::{Address, BasicBlock, BinaryMetadata, CodeRegion, DisassemblyError};

/// Decode one block per address in `starts`, in parallel.
///
/// Each request gets its own decoder session; the section bytes are only
/// read. Results come back in the order of `starts`, and a failed request
/// does not affect the others.
pub fn run(
    binary: &BinaryMetadata,
    section: &CodeRegion<'_>,
    starts: &[Address],
) -> Vec<Result<BasicBlock, DisassemblyError>> {
    starts
        .par_iter()
        .map(|&start| disassemble_block(binary, section, start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Architecture;

    #[test]
    fn test_batch_keeps_order() {
        let bytes = [
            [0x01, 0x00, 0xa0, 0xe3], // mov r0, #1
            [0x1e, 0xff, 0x2f, 0xe1], // bx lr
        ]
        .concat();
        let region = CodeRegion::new(".text", 0x1000, &bytes);
        let binary = BinaryMetadata::raw(Architecture::Arm, 32);

        let results = run(&binary, &region, &[0x1004, 0x0, 0x1000]);
        assert_eq!(results.len(), 3);

        let first = results[0].as_ref().unwrap();
        assert_eq!((first.start, first.end), (0x1004, 0x1008));
        assert!(matches!(results[1], Err(DisassemblyError::OutOfBounds { address: 0, .. })));
        let third = results[2].as_ref().unwrap();
        assert_eq!((third.start, third.end, third.len()), (0x1000, 0x1008, 2));
    }
}
