//! The closed enumeration of recognized DWARF sections.

use std::fmt;

/// A recognized DWARF section. Sections are keyed by this identity
/// throughout the checker rather than by their string name, so that a
/// typo in a comparison is a compile error rather than a silent mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionId {
    DebugInfo,
    DebugAbbrev,
    DebugAranges,
    DebugLine,
    DebugLoc,
    DebugRanges,
    DebugPubnames,
    DebugPubtypes,
    DebugStr,
    DebugMac,
}

impl SectionId {
    /// All recognized sections.
    pub const ALL: [SectionId; 10] = [
        SectionId::DebugInfo,
        SectionId::DebugAbbrev,
        SectionId::DebugAranges,
        SectionId::DebugPubnames,
        SectionId::DebugPubtypes,
        SectionId::DebugStr,
        SectionId::DebugLine,
        SectionId::DebugLoc,
        SectionId::DebugMac,
        SectionId::DebugRanges,
    ];

    /// The exact ELF section name this identity corresponds to.
    pub fn elf_name(self) -> &'static str {
        match self {
            SectionId::DebugInfo => ".debug_info",
            SectionId::DebugAbbrev => ".debug_abbrev",
            SectionId::DebugAranges => ".debug_aranges",
            SectionId::DebugLine => ".debug_line",
            SectionId::DebugLoc => ".debug_loc",
            SectionId::DebugRanges => ".debug_ranges",
            SectionId::DebugPubnames => ".debug_pubnames",
            SectionId::DebugPubtypes => ".debug_pubtypes",
            SectionId::DebugStr => ".debug_str",
            SectionId::DebugMac => ".debug_mac",
        }
    }

    /// Recognizes a section by its exact ELF name.
    pub fn from_elf_name(name: &str) -> Option<SectionId> {
        SectionId::ALL.into_iter().find(|id| id.elf_name() == name)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.elf_name())
    }
}

/// Byte order of a section's containing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }

    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn read_u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        }
    }
}

/// The address size of the object containing the section, i.e. the ELF
/// class (`ELFCLASS32`/`ELFCLASS64`). Individual compile units carry their
/// own address size, which may legally differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWidth {
    Four,
    Eight,
}

impl AddressWidth {
    pub fn bytes(self) -> u8 {
        match self {
            AddressWidth::Four => 4,
            AddressWidth::Eight => 8,
        }
    }

    pub fn from_byte_count(value: u8) -> Option<AddressWidth> {
        match value {
            4 => Some(AddressWidth::Four),
            8 => Some(AddressWidth::Eight),
            _ => None,
        }
    }
}

/// Whether a compile unit or list entry uses 4-byte or 8-byte section
/// offsets, selected by the DWARF "initial length" escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSize {
    Four,
    Eight,
}

impl OffsetSize {
    pub fn bytes(self) -> u8 {
        match self {
            OffsetSize::Four => 4,
            OffsetSize::Eight => 8,
        }
    }
}
