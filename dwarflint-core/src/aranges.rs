//! `.debug_aranges`: a per-CU table mapping address ranges back to the
//! compile unit that owns them, used by a debugger to find "which CU
//! covers this PC" without scanning every DIE tree.

use std::collections::HashSet;

use crate::coverage::Coverage;
use crate::diagnostics::{Category, Diagnostics};
use crate::locus::Locus;
use crate::reader::{InitialLength, Reader};
use crate::section::{AddressWidth, OffsetSize, SectionId};

/// One arange table's header. The table header is padded so the first
/// tuple starts on a `2 * address_size` boundary — DWARF 2/3's one
/// deliberately odd piece of alignment bookkeeping in an otherwise
/// byte-packed format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArangesHeader {
    pub offset: u64,
    pub unit_length: u64,
    pub offset_size: OffsetSize,
    pub version: u16,
    pub debug_info_offset: u64,
    pub address_size: AddressWidth,
    pub segment_size: u8,
    pub tuples_start: u64,
    pub table_end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArangesError {
    Truncated,
}

pub fn read_aranges_header(
    reader: &mut Reader<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<ArangesHeader, ArangesError> {
    let offset = reader.offset();
    let locus = || Locus::section(SectionId::DebugAranges).with_table(offset);

    let InitialLength {
        length,
        offset_size,
        field_size,
    } = reader.read_initial_length().map_err(|_| ArangesError::Truncated)?;
    let table_end = offset + u64::from(field_size) + length;

    let version = reader.read_u16().map_err(|_| ArangesError::Truncated)?;
    if version != 2 {
        diagnostics.error(
            Category::ARANGES | Category::IMPACT_4,
            locus(),
            format!("unsupported .debug_aranges version {version}, expected 2"),
        );
    }

    let debug_info_offset = reader.read_offset(offset_size).map_err(|_| ArangesError::Truncated)?;
    let address_size_result = reader.read_address_size(AddressWidth::Eight).map_err(|_| ArangesError::Truncated)?;
    let segment_size = reader.read_u8().map_err(|_| ArangesError::Truncated)?;
    if segment_size != 0 {
        diagnostics.emit(
            Category::ARANGES | Category::IMPACT_2,
            locus(),
            "non-zero segment selector size is not interpreted by this checker",
        );
    }

    let tuple_size = 2u64 * address_size_result.width.bytes() as u64 + segment_size as u64;
    let header_len_so_far = reader.offset() - offset;
    let padding = (tuple_size - (header_len_so_far % tuple_size)) % tuple_size;
    reader.skip_bytes(padding as usize).map_err(|_| ArangesError::Truncated)?;

    Ok(ArangesHeader {
        offset,
        unit_length: length,
        offset_size,
        version,
        debug_info_offset,
        address_size: address_size_result.width,
        segment_size,
        tuples_start: reader.offset(),
        table_end,
    })
}

/// One `(address, length)` tuple, already excluding the terminating
/// all-zero tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArangeTuple {
    pub address: u64,
    pub length: u64,
}

/// Reads the tuple list following an aranges header, checking for
/// overlap between entries within the same table as it accumulates
/// coverage (overlapping address ranges attributed to the same CU would
/// mean one of them is simply wrong).
pub fn read_aranges_tuples(
    reader: &mut Reader<'_>,
    header: &ArangesHeader,
    diagnostics: &mut Diagnostics,
    is_relocatable: bool,
) -> Result<Vec<ArangeTuple>, ArangesError> {
    let locus = || Locus::section(SectionId::DebugAranges).with_table(header.offset);
    let mut tuples = Vec::new();
    let mut coverage = Coverage::new();

    while reader.offset() < header.table_end {
        let address = reader
            .read_uint(header.address_size.bytes())
            .map_err(|_| ArangesError::Truncated)?;
        let length = reader
            .read_uint(header.address_size.bytes())
            .map_err(|_| ArangesError::Truncated)?;

        if address == 0 && length == 0 {
            break;
        }

        if address == 0 && is_relocatable {
            diagnostics.emit(
                Category::ARANGES | Category::SUBOPTIMAL,
                locus(),
                "zero-address arange entry in a relocatable object; expected a pending relocation",
            );
        }

        if length == 0 {
            diagnostics.emit(Category::ARANGES | Category::IMPACT_1, locus(), "zero-length arange entry");
        } else {
            if coverage.is_overlap(address, address + length) {
                diagnostics.emit(
                    Category::ARANGES | Category::IMPACT_3,
                    locus(),
                    format!("arange [{address:#x}, {:#x}) overlaps another entry in the same table", address + length),
                );
            }
            coverage.add(address, address + length);
        }

        tuples.push(ArangeTuple { address, length });
    }

    Ok(tuples)
}

/// Cross-checks one arange table against the compile unit it claims to
/// describe: `debug_info_offset` must resolve to a real CU, a CU may own
/// at most one arange table, and (when the CU's own `[low_pc, high_pc)`
/// coverage is available) the table's tuples must neither reach outside
/// that coverage nor leave part of it unlisted.
///
/// `seen_cu_offsets` accumulates across every table in the section so the
/// "at most one table per CU" rule holds section-wide, not just within a
/// single call.
pub fn validate_against_compile_unit(
    header: &ArangesHeader,
    tuples: &[ArangeTuple],
    known_cu_offsets: &HashSet<u64>,
    seen_cu_offsets: &mut HashSet<u64>,
    cu_pc_coverage: Option<&Coverage>,
    diagnostics: &mut Diagnostics,
) {
    let locus = || Locus::section(SectionId::DebugAranges).with_table(header.offset);

    if !known_cu_offsets.contains(&header.debug_info_offset) {
        diagnostics.error(
            Category::ARANGES | Category::IMPACT_4,
            locus(),
            format!("debug_info_offset {:#x} does not resolve to any compile unit", header.debug_info_offset),
        );
        return;
    }

    if !seen_cu_offsets.insert(header.debug_info_offset) {
        diagnostics.error(
            Category::ARANGES | Category::IMPACT_3,
            locus(),
            format!("compile unit at {:#x} already has an arange table", header.debug_info_offset),
        );
    }

    let Some(cu_coverage) = cu_pc_coverage else {
        return;
    };

    let mut arange_coverage = Coverage::new();
    for tuple in tuples {
        if tuple.length == 0 {
            continue;
        }
        let end = tuple.address + tuple.length;
        if !cu_coverage.is_covered(tuple.address, end) {
            diagnostics.emit(
                Category::ARANGES | Category::IMPACT_3,
                locus(),
                format!("arange [{:#x}, {end:#x}) is not covered by any DIE in its compile unit", tuple.address),
            );
        }
        arange_coverage.add(tuple.address, end);
    }

    if !cu_coverage.difference(&arange_coverage).is_empty() {
        diagnostics.emit(
            Category::ARANGES | Category::IMPACT_2,
            locus(),
            "arange table does not cover the full low_pc/high_pc extent of its compile unit",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{default_accept, default_error_criteria, default_reject};
    use crate::section::Endian;

    fn diagnostics() -> Diagnostics {
        Diagnostics::new(default_accept(), default_reject(), default_error_criteria())
    }

    /// Builds a full `.debug_aranges` section body: a header (12 bytes of
    /// content after the initial length, plus 4 bytes of tuple-alignment
    /// padding) followed by `tuples`, with `unit_length` computed to match.
    fn aranges_bytes(tuples: &[u8]) -> Vec<u8> {
        let unit_length = 12u32 + tuples.len() as u32;
        let mut bytes = Vec::new();
        bytes.extend(unit_length.to_le_bytes());
        bytes.extend(2u16.to_le_bytes());
        bytes.extend(0u32.to_le_bytes());
        bytes.push(8); // address_size
        bytes.push(0); // segment_size
        bytes.extend([0u8; 4]); // padding to 16-byte tuple alignment
        bytes.extend_from_slice(tuples);
        bytes
    }

    #[test]
    fn reads_header_with_padding_to_tuple_size() {
        let mut tuples = Vec::new();
        tuples.extend(0u64.to_le_bytes());
        tuples.extend(0u64.to_le_bytes());
        let bytes = aranges_bytes(&tuples);
        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let header = read_aranges_header(&mut reader, &mut diags).unwrap();
        assert_eq!(header.tuples_start, 16);
        assert!(diags.diagnostics().is_empty());
    }

    #[test]
    fn flags_overlapping_tuples() {
        let mut tuples = Vec::new();
        tuples.extend(0x1000u64.to_le_bytes());
        tuples.extend(0x100u64.to_le_bytes());
        tuples.extend(0x1080u64.to_le_bytes());
        tuples.extend(0x100u64.to_le_bytes());
        tuples.extend(0u64.to_le_bytes());
        tuples.extend(0u64.to_le_bytes());
        let bytes = aranges_bytes(&tuples);

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let header = read_aranges_header(&mut reader, &mut diags).unwrap();
        let tuples = read_aranges_tuples(&mut reader, &header, &mut diags, false).unwrap();

        assert_eq!(tuples.len(), 2);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("overlaps")));
    }

    #[test]
    fn zero_address_in_relocatable_object_is_suboptimal_not_rejected() {
        let mut tuples = Vec::new();
        tuples.extend(0u64.to_le_bytes());
        tuples.extend(0x10u64.to_le_bytes());
        tuples.extend(0u64.to_le_bytes());
        tuples.extend(0u64.to_le_bytes());
        let bytes = aranges_bytes(&tuples);

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let header = read_aranges_header(&mut reader, &mut diags).unwrap();
        read_aranges_tuples(&mut reader, &header, &mut diags, true).unwrap();

        assert!(!diags.has_errors());
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("relocatable")));
    }

    #[test]
    fn unresolved_debug_info_offset_is_an_error() {
        let header = ArangesHeader {
            offset: 0,
            unit_length: 0,
            offset_size: OffsetSize::Four,
            version: 2,
            debug_info_offset: 0x40,
            address_size: AddressWidth::Eight,
            segment_size: 0,
            tuples_start: 0,
            table_end: 0,
        };
        let known: HashSet<u64> = [0u64].into_iter().collect();
        let mut seen = HashSet::new();
        let mut diags = diagnostics();
        validate_against_compile_unit(&header, &[], &known, &mut seen, None, &mut diags);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("does not resolve to any compile unit")));
    }

    #[test]
    fn second_table_for_the_same_cu_is_an_error() {
        let header = ArangesHeader {
            offset: 0,
            unit_length: 0,
            offset_size: OffsetSize::Four,
            version: 2,
            debug_info_offset: 0,
            address_size: AddressWidth::Eight,
            segment_size: 0,
            tuples_start: 0,
            table_end: 0,
        };
        let known: HashSet<u64> = [0u64].into_iter().collect();
        let mut seen = HashSet::new();
        let mut diags = diagnostics();
        validate_against_compile_unit(&header, &[], &known, &mut seen, None, &mut diags);
        validate_against_compile_unit(&header, &[], &known, &mut seen, None, &mut diags);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("already has an arange table")));
    }

    #[test]
    fn arange_outside_cu_coverage_is_flagged() {
        let header = ArangesHeader {
            offset: 0,
            unit_length: 0,
            offset_size: OffsetSize::Four,
            version: 2,
            debug_info_offset: 0,
            address_size: AddressWidth::Eight,
            segment_size: 0,
            tuples_start: 0,
            table_end: 0,
        };
        let known: HashSet<u64> = [0u64].into_iter().collect();
        let mut seen = HashSet::new();
        let mut cu_coverage = Coverage::new();
        cu_coverage.add(0x1000, 0x1100);
        let tuples = [ArangeTuple { address: 0x2000, length: 0x10 }];
        let mut diags = diagnostics();
        validate_against_compile_unit(&header, &tuples, &known, &mut seen, Some(&cu_coverage), &mut diags);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("not covered by any DIE")));
    }

    #[test]
    fn arange_covering_less_than_cu_is_flagged() {
        let header = ArangesHeader {
            offset: 0,
            unit_length: 0,
            offset_size: OffsetSize::Four,
            version: 2,
            debug_info_offset: 0,
            address_size: AddressWidth::Eight,
            segment_size: 0,
            tuples_start: 0,
            table_end: 0,
        };
        let known: HashSet<u64> = [0u64].into_iter().collect();
        let mut seen = HashSet::new();
        let mut cu_coverage = Coverage::new();
        cu_coverage.add(0x1000, 0x2000);
        let tuples = [ArangeTuple { address: 0x1000, length: 0x100 }];
        let mut diags = diagnostics();
        validate_against_compile_unit(&header, &tuples, &known, &mut seen, Some(&cu_coverage), &mut diags);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("does not cover the full low_pc/high_pc extent")));
        assert!(!diags.has_errors());
    }

    #[test]
    fn arange_matching_cu_coverage_exactly_is_clean() {
        let header = ArangesHeader {
            offset: 0,
            unit_length: 0,
            offset_size: OffsetSize::Four,
            version: 2,
            debug_info_offset: 0,
            address_size: AddressWidth::Eight,
            segment_size: 0,
            tuples_start: 0,
            table_end: 0,
        };
        let known: HashSet<u64> = [0u64].into_iter().collect();
        let mut seen = HashSet::new();
        let mut cu_coverage = Coverage::new();
        cu_coverage.add(0x1000, 0x2000);
        let tuples = [ArangeTuple { address: 0x1000, length: 0x1000 }];
        let mut diags = diagnostics();
        validate_against_compile_unit(&header, &tuples, &known, &mut seen, Some(&cu_coverage), &mut diags);
        assert!(diags.diagnostics().is_empty());
    }
}
