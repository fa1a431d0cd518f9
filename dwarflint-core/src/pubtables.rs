//! `.debug_pubnames` and `.debug_pubtypes` share a single format: a
//! header naming the compile unit they index, followed by
//! `(die_offset, name)` pairs terminated by a zero offset.

use std::collections::HashSet;

use crate::diagnostics::{Category, Diagnostics};
use crate::locus::Locus;
use crate::reader::{InitialLength, Reader};
use crate::section::{OffsetSize, SectionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubTableHeader {
    pub offset: u64,
    pub unit_length: u64,
    pub offset_size: OffsetSize,
    pub version: u16,
    pub debug_info_offset: u64,
    pub debug_info_length: u64,
    pub table_end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubEntry {
    pub die_offset: u64,
    pub name: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubTableError {
    Truncated,
}

pub fn read_pubtable_header(
    reader: &mut Reader<'_>,
    diagnostics: &mut Diagnostics,
    section: SectionId,
) -> Result<PubTableHeader, PubTableError> {
    let offset = reader.offset();
    let locus = || Locus::section(section).with_table(offset);

    let InitialLength {
        length,
        offset_size,
        field_size,
    } = reader.read_initial_length().map_err(|_| PubTableError::Truncated)?;
    let table_end = offset + u64::from(field_size) + length;

    let version = reader.read_u16().map_err(|_| PubTableError::Truncated)?;
    if version != 2 {
        diagnostics.error(
            Category::PUBTABLES | Category::IMPACT_4,
            locus(),
            format!("unsupported version {version}, expected 2"),
        );
    }

    let debug_info_offset = reader.read_offset(offset_size).map_err(|_| PubTableError::Truncated)?;
    let debug_info_length = reader.read_offset(offset_size).map_err(|_| PubTableError::Truncated)?;

    Ok(PubTableHeader {
        offset,
        unit_length: length,
        offset_size,
        version,
        debug_info_offset,
        debug_info_length,
        table_end,
    })
}

/// Reads the `(die_offset, name)` entries following a pubnames/pubtypes
/// header, checking each `die_offset` falls within the CU the header
/// claims to index (`[debug_info_offset, debug_info_offset +
/// debug_info_length)`).
pub fn read_pubtable_entries(
    reader: &mut Reader<'_>,
    header: &PubTableHeader,
    diagnostics: &mut Diagnostics,
    section: SectionId,
) -> Result<Vec<PubEntry>, PubTableError> {
    let locus = || Locus::section(section).with_table(header.offset);
    let mut entries = Vec::new();

    loop {
        if reader.offset() >= header.table_end {
            break;
        }
        let die_offset = reader.read_offset(header.offset_size).map_err(|_| PubTableError::Truncated)?;
        if die_offset == 0 {
            break;
        }
        let name = reader.read_cstr().map_err(|_| PubTableError::Truncated)?;

        let cu_end = header.debug_info_offset + header.debug_info_length;
        if die_offset < header.debug_info_offset || die_offset >= cu_end {
            diagnostics.emit(
                Category::PUBTABLES | Category::IMPACT_3,
                locus(),
                format!("entry's DIE offset {die_offset:#x} falls outside the indexed compile unit"),
            );
        }

        entries.push(PubEntry {
            die_offset,
            name: name.to_vec(),
        });
    }

    Ok(entries)
}

/// Cross-checks one pubnames/pubtypes table against the compile unit it
/// claims to index, beyond what [`read_pubtable_entries`] can check from
/// the header alone: `debug_info_offset` must resolve to a real CU,
/// `debug_info_length` must equal that CU's real encoded size rather than
/// whatever the table's own header claims, each entry's `die_offset` must
/// be the start of a real DIE in that CU, and a CU may be indexed by at
/// most one table in this section.
///
/// `seen_cu_offsets` accumulates across every table in the section so the
/// "at most one set per CU" rule holds section-wide.
pub fn validate_against_compile_unit(
    header: &PubTableHeader,
    entries: &[PubEntry],
    cu_total_size: Option<u64>,
    cu_die_offsets: Option<&HashSet<u64>>,
    seen_cu_offsets: &mut HashSet<u64>,
    section: SectionId,
    diagnostics: &mut Diagnostics,
) {
    let locus = || Locus::section(section).with_table(header.offset);

    let Some(total_size) = cu_total_size else {
        diagnostics.error(
            Category::PUBTABLES | Category::IMPACT_4,
            locus(),
            format!("debug_info_offset {:#x} does not resolve to any compile unit", header.debug_info_offset),
        );
        return;
    };

    if !seen_cu_offsets.insert(header.debug_info_offset) {
        let kind = if section == SectionId::DebugPubnames { "pubnames" } else { "pubtypes" };
        diagnostics.error(
            Category::PUBTABLES | Category::IMPACT_3,
            locus(),
            format!("compile unit at {:#x} already has a {kind} set", header.debug_info_offset),
        );
    }

    if header.debug_info_length != total_size {
        diagnostics.emit(
            Category::PUBTABLES | Category::IMPACT_2,
            locus(),
            format!(
                "debug_info_length {:#x} does not match the compile unit's actual size {total_size:#x}",
                header.debug_info_length
            ),
        );
    }

    let Some(die_offsets) = cu_die_offsets else { return };
    for entry in entries {
        if !die_offsets.contains(&entry.die_offset) {
            diagnostics.error(
                Category::PUBTABLES | Category::IMPACT_3,
                locus(),
                format!("entry's DIE offset {:#x} is not the start of any DIE in the indexed compile unit", entry.die_offset),
            );
        }
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

    fn pubtable_bytes(entries: &[u8]) -> Vec<u8> {
        let unit_length = 2u32 + 4 + 4 + entries.len() as u32;
        let mut bytes = Vec::new();
        bytes.extend(unit_length.to_le_bytes());
        bytes.extend(2u16.to_le_bytes());
        bytes.extend(0u32.to_le_bytes()); // debug_info_offset
        bytes.extend(0x100u32.to_le_bytes()); // debug_info_length
        bytes.extend_from_slice(entries);
        bytes
    }

    #[test]
    fn reads_entries_within_the_indexed_cu() {
        let mut entries = Vec::new();
        entries.extend(0x20u32.to_le_bytes());
        entries.extend(b"main\0");
        entries.extend(0u32.to_le_bytes());

        let bytes = pubtable_bytes(&entries);
        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let header = read_pubtable_header(&mut reader, &mut diags, SectionId::DebugPubnames).unwrap();
        let table = read_pubtable_entries(&mut reader, &header, &mut diags, SectionId::DebugPubnames).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table[0].name, b"main");
        assert!(diags.diagnostics().is_empty());
    }

    #[test]
    fn flags_die_offset_outside_the_cu() {
        let mut entries = Vec::new();
        entries.extend(0x500u32.to_le_bytes());
        entries.extend(b"oops\0");
        entries.extend(0u32.to_le_bytes());

        let bytes = pubtable_bytes(&entries);
        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let header = read_pubtable_header(&mut reader, &mut diags, SectionId::DebugPubnames).unwrap();
        read_pubtable_entries(&mut reader, &header, &mut diags, SectionId::DebugPubnames).unwrap();

        assert!(diags.diagnostics().iter().any(|d| d.message.contains("outside the indexed")));
    }

    fn header() -> PubTableHeader {
        PubTableHeader {
            offset: 0,
            unit_length: 0,
            offset_size: OffsetSize::Four,
            version: 2,
            debug_info_offset: 0,
            debug_info_length: 0x100,
            table_end: 0,
        }
    }

    #[test]
    fn unresolved_debug_info_offset_is_an_error() {
        let mut seen = HashSet::new();
        let mut diags = diagnostics();
        validate_against_compile_unit(&header(), &[], None, None, &mut seen, SectionId::DebugPubnames, &mut diags);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("does not resolve to any compile unit")));
    }

    #[test]
    fn second_set_for_the_same_cu_is_an_error() {
        let mut seen = HashSet::new();
        let mut diags = diagnostics();
        validate_against_compile_unit(&header(), &[], Some(0x100), None, &mut seen, SectionId::DebugPubnames, &mut diags);
        validate_against_compile_unit(&header(), &[], Some(0x100), None, &mut seen, SectionId::DebugPubnames, &mut diags);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("already has a pubnames set")));
    }

    #[test]
    fn debug_info_length_mismatching_the_real_cu_size_is_flagged() {
        let mut seen = HashSet::new();
        let mut diags = diagnostics();
        validate_against_compile_unit(&header(), &[], Some(0x200), None, &mut seen, SectionId::DebugPubnames, &mut diags);
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("does not match the compile unit's actual size")));
        assert!(!diags.has_errors());
    }

    #[test]
    fn die_offset_not_matching_a_real_die_is_an_error() {
        let entries = vec![PubEntry {
            die_offset: 0x30,
            name: b"main".to_vec(),
        }];
        let known: HashSet<u64> = [0u64, 0x20].into_iter().collect();
        let mut seen = HashSet::new();
        let mut diags = diagnostics();
        validate_against_compile_unit(&header(), &entries, Some(0x100), Some(&known), &mut seen, SectionId::DebugPubnames, &mut diags);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("is not the start of any DIE")));
    }

    #[test]
    fn entries_matching_real_dies_are_clean() {
        let entries = vec![PubEntry {
            die_offset: 0x20,
            name: b"main".to_vec(),
        }];
        let known: HashSet<u64> = [0u64, 0x20].into_iter().collect();
        let mut seen = HashSet::new();
        let mut diags = diagnostics();
        validate_against_compile_unit(&header(), &entries, Some(0x100), Some(&known), &mut seen, SectionId::DebugPubnames, &mut diags);
        assert!(diags.diagnostics().is_empty());
    }
}
