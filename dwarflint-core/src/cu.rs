//! Compile unit headers: the per-unit prologue at the start of every
//! `.debug_info` entry, read once before the DIE tree underneath it is
//! walked.

use crate::diagnostics::{Category, Diagnostics};
use crate::input::SymbolTable;
use crate::locus::Locus;
use crate::reader::{InitialLength, Reader};
use crate::relocation::{RelocationCursor, TargetKind};
use crate::section::{AddressWidth, OffsetSize, SectionId};

/// The fixed-layout header every compile unit starts with: an initial
/// length, a DWARF version, an offset into `.debug_abbrev`, and an
/// address size. DWARF 2/3 share this exact layout (DWARF 4 reorders
/// `abbrev_offset` and `address_size` relative to version, which is why
/// this reader refuses anything outside 2..=3 rather than guessing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileUnitHeader {
    /// Offset of this unit's first byte (the initial length field)
    /// within `.debug_info`.
    pub offset: u64,
    pub unit_length: u64,
    pub offset_size: OffsetSize,
    pub version: u16,
    pub debug_abbrev_offset: u64,
    pub address_size: AddressWidth,
    /// Offset immediately after this header, where the root DIE begins.
    pub header_end: u64,
    /// Offset immediately after this unit's last byte, derived from
    /// `unit_length`.
    pub unit_end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuHeaderError {
    /// The reader ran out of bytes partway through the header; fatal for
    /// the whole unit (there is no way to know where the next unit, if
    /// any, would start).
    Truncated,
    /// `unit_length` claims a body larger than the bytes actually left
    /// in the section.
    LengthExceedsSection,
}

/// Reads one compile unit header starting at the reader's current
/// position. On success the reader is left positioned at the root DIE.
pub fn read_cu_header(
    reader: &mut Reader<'_>,
    diagnostics: &mut Diagnostics,
    elf_address_size: AddressWidth,
    section_len: u64,
    relocations: &mut RelocationCursor<'_>,
    symbols: &SymbolTable,
) -> Result<CompileUnitHeader, CuHeaderError> {
    let offset = reader.offset();
    let locus = || Locus::section(SectionId::DebugInfo).with_cu(offset);

    let InitialLength {
        length,
        offset_size,
        field_size,
    } = reader.read_initial_length().map_err(|_| CuHeaderError::Truncated)?;

    let version = reader.read_u16().map_err(|_| CuHeaderError::Truncated)?;
    if !(2..=3).contains(&version) {
        diagnostics.error(
            Category::HEADER | Category::IMPACT_4,
            locus(),
            format!("unsupported DWARF version {version}, expected 2 or 3"),
        );
    }
    if version == 2 && offset_size == OffsetSize::Eight {
        diagnostics.error(
            Category::HEADER | Category::IMPACT_3,
            locus(),
            "64-bit DWARF offsets are not a DWARF 2 feature; continuing as a standards violation",
        );
    }

    let abbrev_field_offset = reader.offset();
    let raw_abbrev_offset = reader.read_offset(offset_size).map_err(|_| CuHeaderError::Truncated)?;
    let (debug_abbrev_offset, _) = relocations.resolve_or(
        abbrev_field_offset,
        TargetKind::Section(SectionId::DebugAbbrev),
        symbols,
        raw_abbrev_offset,
        diagnostics,
        || locus().with_label("debug_abbrev_offset"),
    );

    let address_result = reader.read_address_size(elf_address_size).map_err(|_| CuHeaderError::Truncated)?;
    if address_result.coerced {
        diagnostics.emit(
            Category::HEADER | Category::IMPACT_3,
            locus(),
            "compile unit address size is neither 4 nor 8 bytes; continuing with the object's class",
        );
    }

    let header_end = reader.offset();
    let unit_end = offset + u64::from(field_size) + length;

    if unit_end > section_len {
        diagnostics.error(
            Category::HEADER | Category::IMPACT_4,
            locus(),
            format!("unit_length {length} runs past the end of .debug_info"),
        );
        return Err(CuHeaderError::LengthExceedsSection);
    }

    Ok(CompileUnitHeader {
        offset,
        unit_length: length,
        offset_size,
        version,
        debug_abbrev_offset,
        address_size: address_result.width,
        header_end,
        unit_end,
    })
}
