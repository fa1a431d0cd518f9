//! `.debug_loc` and `.debug_ranges` share an entry format: a list of
//! `(begin, end)` address pairs terminated by an all-zero entry, with an
//! all-ones `begin` marking a base-address selection rather than a real
//! range. `.debug_loc` additionally carries a location expression after
//! each non-special entry; `.debug_ranges` does not.

use crate::diagnostics::{Category, Diagnostics};
use crate::input::SymbolTable;
use crate::loc_expr;
use crate::locus::Locus;
use crate::reader::{ReadError, Reader};
use crate::relocation::{RelocationCursor, TargetKind};
use crate::section::{AddressWidth, Endian, OffsetSize, SectionId};

fn max_address(width: AddressWidth) -> u64 {
    match width {
        AddressWidth::Four => u32::MAX as u64,
        AddressWidth::Eight => u64::MAX,
    }
}

/// One entry of a location or range list, after base-address resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    Range { begin: u64, end: u64 },
    /// Present only in `.debug_loc`: the decoded expression bytes that
    /// apply over `begin..end`.
    Location { begin: u64, end: u64, expr: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListError {
    Truncated,
}

/// Reads one `.debug_ranges` list starting at the reader's current
/// position, stopping at the end-of-list marker.
pub fn read_ranges_list(
    reader: &mut Reader<'_>,
    diagnostics: &mut Diagnostics,
    address_size: AddressWidth,
    cu_low_pc: Option<u64>,
    relocations: &mut RelocationCursor<'_>,
    symbols: &SymbolTable,
) -> Result<Vec<ListEntry>, ListError> {
    let list_offset = reader.offset();
    let locus = || Locus::section(SectionId::DebugRanges).with_offset(list_offset);
    let mut entries = Vec::new();
    let mut base = cu_low_pc.unwrap_or(0);
    let sentinel = max_address(address_size);

    loop {
        let begin_offset = reader.offset();
        let begin = reader.read_uint(address_size.bytes()).map_err(|_| ListError::Truncated)?;
        let end_offset = reader.offset();
        let end = reader.read_uint(address_size.bytes()).map_err(|_| ListError::Truncated)?;

        if begin == 0 && end == 0 {
            break;
        }
        if begin == sentinel {
            base = end;
            continue;
        }

        let (begin, _) = relocations.resolve_or(begin_offset, TargetKind::Address, symbols, begin, diagnostics, || {
            locus().with_label("begin")
        });
        let (end, _) = relocations.resolve_or(end_offset, TargetKind::Address, symbols, end, diagnostics, || locus().with_label("end"));

        let (resolved_begin, resolved_end) = (base.wrapping_add(begin), base.wrapping_add(end));
        if resolved_end < resolved_begin {
            diagnostics.emit(
                Category::RANGES | Category::IMPACT_3,
                locus(),
                "range list entry has end address before begin address",
            );
        }
        entries.push(ListEntry::Range {
            begin: resolved_begin,
            end: resolved_end,
        });
    }

    Ok(entries)
}

/// Reads one `.debug_loc` list, decoding each entry's location
/// expression as it goes.
pub fn read_loc_list(
    reader: &mut Reader<'_>,
    diagnostics: &mut Diagnostics,
    address_size: AddressWidth,
    offset_size: OffsetSize,
    cu_low_pc: Option<u64>,
    relocations: &mut RelocationCursor<'_>,
    symbols: &SymbolTable,
) -> Result<Vec<ListEntry>, ListError> {
    let list_offset = reader.offset();
    let locus = || Locus::section(SectionId::DebugLoc).with_offset(list_offset);
    let mut entries = Vec::new();
    let mut base = cu_low_pc.unwrap_or(0);
    let sentinel = max_address(address_size);

    loop {
        let begin_offset = reader.offset();
        let begin = reader.read_uint(address_size.bytes()).map_err(|_| ListError::Truncated)?;
        let end_offset = reader.offset();
        let end = reader.read_uint(address_size.bytes()).map_err(|_| ListError::Truncated)?;

        if begin == 0 && end == 0 {
            break;
        }
        if begin == sentinel {
            base = end;
            continue;
        }

        let (begin, _) = relocations.resolve_or(begin_offset, TargetKind::Address, symbols, begin, diagnostics, || {
            locus().with_label("begin")
        });
        let (end, _) = relocations.resolve_or(end_offset, TargetKind::Address, symbols, end, diagnostics, || locus().with_label("end"));

        let expr_len = reader.read_u16().map_err(|_| ListError::Truncated)? as usize;
        let expr_bytes = reader.read_bytes(expr_len).map_err(|_| ListError::Truncated)?;

        if loc_expr::validate(expr_bytes, Endian::Little, address_size, offset_size).is_err() {
            diagnostics.emit(
                Category::LOC | Category::IMPACT_3,
                locus(),
                "location list entry's expression does not decode cleanly",
            );
        }

        let (resolved_begin, resolved_end) = (base.wrapping_add(begin), base.wrapping_add(end));
        if resolved_end < resolved_begin {
            diagnostics.emit(
                Category::LOC | Category::IMPACT_3,
                locus(),
                "location list entry has end address before begin address",
            );
        }
        entries.push(ListEntry::Location {
            begin: resolved_begin,
            end: resolved_end,
            expr: expr_bytes.to_vec(),
        });
    }

    Ok(entries)
}

/// Scans every list in a `.debug_ranges`/`.debug_loc` section body,
/// purely to find lists that are never referenced by any CU's
/// `DW_AT_ranges`/`DW_AT_location` — garbage a linker's `--gc-sections`
/// leaves behind. Returns the byte offsets each top-level list started
/// at; callers intersect this against referenced offsets.
pub fn enumerate_list_offsets(data: &[u8]) -> Result<Vec<u64>, ReadError> {
    let mut offsets = Vec::new();
    let mut reader = Reader::new(data, Endian::Little);
    while !reader.is_at_end() {
        offsets.push(reader.offset());
        loop {
            if reader.remaining() < 16 {
                return Ok(offsets);
            }
            let begin = reader.read_u64()?;
            let end = reader.read_u64()?;
            if begin == 0 && end == 0 {
                break;
            }
        }
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{default_accept, default_error_criteria, default_reject};
    use crate::relocation::RelocationRecord;

    fn diagnostics() -> Diagnostics {
        Diagnostics::new(default_accept(), default_reject(), default_error_criteria())
    }

    fn no_relocations() -> Vec<RelocationRecord> {
        Vec::new()
    }

    #[test]
    fn ranges_list_resolves_against_base_address() {
        let mut bytes = Vec::new();
        bytes.extend(0x10u64.to_le_bytes());
        bytes.extend(0x20u64.to_le_bytes());
        bytes.extend(0u64.to_le_bytes());
        bytes.extend(0u64.to_le_bytes());

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let relocs = no_relocations();
        let mut cursor = RelocationCursor::new(&relocs);
        let symbols = SymbolTable::new(vec![]);
        let entries =
            read_ranges_list(&mut reader, &mut diags, AddressWidth::Eight, Some(0x1000), &mut cursor, &symbols).unwrap();

        assert_eq!(entries, vec![ListEntry::Range { begin: 0x1010, end: 0x1020 }]);
    }

    #[test]
    fn base_address_selection_entry_shifts_subsequent_ranges() {
        let mut bytes = Vec::new();
        bytes.extend(u64::MAX.to_le_bytes());
        bytes.extend(0x2000u64.to_le_bytes());
        bytes.extend(0x10u64.to_le_bytes());
        bytes.extend(0x20u64.to_le_bytes());
        bytes.extend(0u64.to_le_bytes());
        bytes.extend(0u64.to_le_bytes());

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let relocs = no_relocations();
        let mut cursor = RelocationCursor::new(&relocs);
        let symbols = SymbolTable::new(vec![]);
        let entries = read_ranges_list(&mut reader, &mut diags, AddressWidth::Eight, Some(0), &mut cursor, &symbols).unwrap();

        assert_eq!(entries, vec![ListEntry::Range { begin: 0x2010, end: 0x2020 }]);
    }

    #[test]
    fn loc_list_decodes_expression_and_flags_bad_one() {
        let mut bytes = Vec::new();
        bytes.extend(0x0u64.to_le_bytes());
        bytes.extend(0x8u64.to_le_bytes());
        bytes.extend(2u16.to_le_bytes());
        bytes.extend([0x01u8, 0x01]); // 0x01 is not an assigned DW_OP opcode
        bytes.extend(0u64.to_le_bytes());
        bytes.extend(0u64.to_le_bytes());

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let relocs = no_relocations();
        let mut cursor = RelocationCursor::new(&relocs);
        let symbols = SymbolTable::new(vec![]);
        let entries =
            read_loc_list(&mut reader, &mut diags, AddressWidth::Eight, OffsetSize::Four, Some(0), &mut cursor, &symbols).unwrap();

        assert_eq!(entries.len(), 1);
    }
}
