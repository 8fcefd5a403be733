//! Goblin-based multi-format binary parser.

use std::fmt;
use std::fs;
use std::path::Path;

use goblin::mach::{constants::cputype, Mach, MachO};
use goblin::{elf, pe, Object};

use crate::{Address, Architecture, BinaryMetadata, BinaryParser, DisassemblyError, Section};

/// Mach-O `VM_PROT_EXECUTE`
const VM_PROT_EXECUTE: u32 = 0x4;

/// A parser that handles ELF, PE, and Mach-O via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    /// Read `path` and parse it, returning the image alongside its metadata.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<(Vec<u8>, BinaryMetadata), DisassemblyError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        log::debug!("read {} bytes from {}", data.len(), path.display());

        let metadata = self.parse(&data)?;
        Ok((data, metadata))
    }

    /// Parse an ELF image.
    fn parse_elf(&self, elf: elf::Elf) -> Result<BinaryMetadata, DisassemblyError> {
        let arch = match elf.header.e_machine {
            elf::header::EM_386 => Architecture::X86_32,
            elf::header::EM_X86_64 => Architecture::X86_64,
            elf::header::EM_ARM => Architecture::Arm,
            elf::header::EM_AARCH64 => Architecture::AArch64,
            elf::header::EM_MIPS => Architecture::Mips32,
            elf::header::EM_RISCV => Architecture::RiscV,
            _ => Architecture::Unknown,
        };

        // Gather all sections
        let mut sections = Vec::new();
        for sh in &elf.section_headers {
            if let Some(name) = elf.shdr_strtab.get_at(sh.sh_name) {
                sections.push(Section::new(
                    name.to_string(),
                    sh.sh_addr,
                    sh.sh_size as usize,
                    sh.sh_offset as usize,
                    sh.is_executable(),
                ));
            }
        }

        // Find the .text section
        let text_section = sections
            .iter()
            .find(|s| s.name == ".text")
            .map(|s| s.address);

        Ok(BinaryMetadata {
            architecture: arch,
            bits: if elf.is_64 { 64 } else { 32 },
            entry_point: Some(elf.entry),
            sections,
            text_section,
        })
    }

    /// Parse a PE image.
    fn parse_pe(&self, pe: pe::PE<'_>) -> Result<BinaryMetadata, DisassemblyError> {
        let arch = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Architecture::X86_32,
            pe::header::COFF_MACHINE_X86_64 => Architecture::X86_64,
            pe::header::COFF_MACHINE_ARM | pe::header::COFF_MACHINE_ARMNT => Architecture::Arm,
            pe::header::COFF_MACHINE_ARM64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };

        // Gather PE sections. Only the raw data is backed by the file.
        let mut sections = Vec::new();
        for sect in &pe.sections {
            let name = sect.name().unwrap_or("").to_string();
            let executable = (sect.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE) != 0;
            let size = sect.virtual_size.min(sect.size_of_raw_data);
            sections.push(Section::new(
                name,
                pe.image_base as Address + sect.virtual_address as Address,
                size as usize,
                sect.pointer_to_raw_data as usize,
                executable,
            ));
        }

        // Find ".text" (case-insensitive)
        let text_section = sections
            .iter()
            .find(|s| s.name.to_lowercase().contains(".text"))
            .map(|s| s.address);

        Ok(BinaryMetadata {
            architecture: arch,
            bits: if pe.is_64 { 64 } else { 32 },
            entry_point: Some(pe.image_base as Address + pe.entry as Address),
            sections,
            text_section,
        })
    }

    /// Parse a Mach-O binary
    fn parse_macho(&self, macho: &MachO) -> Result<BinaryMetadata, DisassemblyError> {
        let arch = match macho.header.cputype {
            cputype::CPU_TYPE_I386 => Architecture::X86_32,
            cputype::CPU_TYPE_X86_64 => Architecture::X86_64,
            cputype::CPU_TYPE_ARM => Architecture::Arm,
            cputype::CPU_TYPE_ARM64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };

        // Segments stand in for sections
        let mut sections = Vec::new();
        let mut text_section = None;

        for segment in &macho.segments {
            let name = segment.name().unwrap_or("").to_string();
            let address = segment.vmaddr as Address;

            if name == "__TEXT" && text_section.is_none() {
                text_section = Some(address);
            }

            sections.push(Section::new(
                name,
                address,
                segment.filesize as usize,
                segment.fileoff as usize,
                (segment.maxprot & VM_PROT_EXECUTE) != 0,
            ));
        }

        Ok(BinaryMetadata {
            architecture: arch,
            bits: if macho.is_64 { 64 } else { 32 },
            entry_point: Some(macho.entry as Address),
            sections,
            text_section,
        })
    }

    /// Parse a Mach-O image.
    fn parse_mach(&self, m: Mach<'_>) -> Result<BinaryMetadata, DisassemblyError> {
        match m {
            Mach::Binary(binary) => self.parse_macho(&binary),
            // Fat binaries need an architecture choice first
            Mach::Fat(_) => Ok(BinaryMetadata::default_raw()),
        }
    }
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}

impl BinaryParser for GoblinParser {
    fn parse(&self, data: &[u8]) -> Result<BinaryMetadata, DisassemblyError> {
        let metadata = match Object::parse(data) {
            Ok(Object::Elf(elf)) => self.parse_elf(elf),
            Ok(Object::PE(pe)) => self.parse_pe(pe),
            Ok(Object::Mach(m)) => self.parse_mach(m),
            Ok(_) => Err(DisassemblyError::ParsingError("Unsupported file format".into())),
            Err(e) => Err(DisassemblyError::ParsingError(e.to_string())),
        }?;

        log::debug!(
            "parsed {}-bit {} binary with {} sections",
            metadata.bits,
            metadata.architecture,
            metadata.sections.len()
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // mov r0, #1 ; bx lr
    const CODE: [u8; 8] = [0x01, 0x00, 0xa0, 0xe3, 0x1e, 0xff, 0x2f, 0xe1];
    const SHSTRTAB: &[u8] = b"\0.text\0.shstrtab\0";

    #[allow(clippy::too_many_arguments)]
    fn section_header(
        out: &mut Vec<u8>,
        name: u32,
        kind: u32,
        flags: u32,
        addr: u32,
        offset: u32,
        size: u32,
        align: u32,
    ) {
        for field in [name, kind, flags, addr, offset, size, 0, 0, align, 0] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }

    /// Minimal little-endian ELF32 ARM executable with `.text` at 0x8000.
    fn arm_elf() -> Vec<u8> {
        let text_offset = 0x34u32;
        let strtab_offset = text_offset + CODE.len() as u32;
        let shoff = 0x50u32;

        let mut out = vec![0x7f, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        out.extend_from_slice(&40u16.to_le_bytes()); // EM_ARM
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0x8000u32.to_le_bytes()); // entry
        out.extend_from_slice(&0u32.to_le_bytes()); // phoff
        out.extend_from_slice(&shoff.to_le_bytes());
        out.extend_from_slice(&0x0500_0000u32.to_le_bytes());
        for field in [52u16, 32, 0, 40, 3, 2] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        assert_eq!(out.len(), text_offset as usize);

        out.extend_from_slice(&CODE);
        out.extend_from_slice(SHSTRTAB);
        out.resize(shoff as usize, 0);

        section_header(&mut out, 0, 0, 0, 0, 0, 0, 0);
        // SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR
        section_header(&mut out, 1, 1, 6, 0x8000, text_offset, CODE.len() as u32, 4);
        // SHT_STRTAB
        section_header(&mut out, 7, 3, 0, 0, strtab_offset, SHSTRTAB.len() as u32, 1);
        out
    }

    #[test]
    fn test_default_raw() {
        let meta = BinaryMetadata::default_raw();
        assert_eq!(meta.architecture, Architecture::Unknown);
        assert_eq!(meta.bits, 0);
        assert!(meta.entry_point.is_none());
        assert!(meta.sections.is_empty());
        assert!(meta.text_section.is_none());
    }

    #[test]
    fn test_parse_arm_elf() {
        let image = arm_elf();
        let meta = GoblinParser::new().parse(&image).unwrap();

        assert_eq!(meta.architecture, Architecture::Arm);
        assert_eq!(meta.bits, 32);
        assert_eq!(meta.entry_point, Some(0x8000));
        assert_eq!(meta.text_section, Some(0x8000));

        let text = meta.find_section(".text").unwrap();
        assert_eq!(text.offset, 0x34);
        assert_eq!(text.size, 8);
        assert!(text.executable);
        assert_eq!(meta.executable_sections().len(), 1);

        let regions = meta.code_regions(&image);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, ".text");
        assert_eq!(regions[0].bytes, &CODE);
    }

    #[test]
    fn test_parse_and_sweep_elf() {
        let image = arm_elf();
        let meta = GoblinParser::new().parse(&image).unwrap();
        let region = meta.code_regions(&image)[0];

        let blocks = Strategy::Recursive.run(&meta, &region).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].start, 0x8000);
        assert_eq!(blocks[0].end, 0x8008);
        assert_eq!(blocks[0].section, ".text");
        assert!(blocks[0].ends_in_cflow());
    }

    #[test]
    fn test_parse_garbage() {
        let err = GoblinParser::new().parse(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert!(matches!(err, DisassemblyError::ParsingError(_)));
    }

    #[test]
    fn test_parse_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&arm_elf()).unwrap();

        let (image, meta) = GoblinParser::new().parse_file(file.path()).unwrap();
        assert_eq!(image, arm_elf());
        assert_eq!(meta.architecture, Architecture::Arm);
    }

    #[test]
    fn test_parse_file_errors() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not a binary at all").unwrap();
        assert!(matches!(
            GoblinParser::new().parse_file(file.path()),
            Err(DisassemblyError::ParsingError(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GoblinParser::new().parse_file(dir.path().join("missing")),
            Err(DisassemblyError::IoError(_))
        ));
    }
}
