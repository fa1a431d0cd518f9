//! Wires the section-level parsers into one full-object pass: walk
//! every compile unit in `.debug_info`, follow its `DW_AT_stmt_list`/
//! `DW_AT_ranges`/`DW_AT_location` attributes into the sections they
//! point at, and run the section-wide checks (`.debug_aranges`,
//! `.debug_pubnames`, `.debug_pubtypes`) that aren't anchored to a
//! single CU.
//!
//! These phases share mutable state (`diagnostics`, the accumulated
//! [`PassResults`]) rather than being independently schedulable, so
//! they run as a plain sequence of function calls here;
//! [`crate::scheduler`] is for the finer-grained, genuinely
//! independent checks a future per-DIE or per-attribute rule set would
//! register.

use std::collections::{HashMap, HashSet};

use crate::abbrev::{self, AbbrevTable};
use crate::aranges;
use crate::config::Config;
use crate::cu::{self, CompileUnitHeader};
use crate::die::{self, AttributeValue, DieTree};
use crate::diagnostics::{Category, Diagnostics};
use crate::dwarf_version::{DwAttribute, FormClass};
use crate::input::ObjectInput;
use crate::line;
use crate::loc_ranges;
use crate::locus::Locus;
use crate::pubtables;
use crate::reader::Reader;
use crate::relocation::RelocationCursor;
use crate::section::SectionId;

/// One fully parsed compile unit plus the cross-references collected
/// while walking its DIE tree, matching the per-unit record the rest of
/// a pass needs to validate a CU against the sections around it rather
/// than just against itself.
#[derive(Debug)]
pub struct CompileUnit {
    pub header: CompileUnitHeader,
    pub tree: DieTree,
    /// The offset other sections use to point back at this unit
    /// (`debug_info_offset` in both `.debug_aranges` and
    /// `.debug_pubnames`/`.debug_pubtypes`).
    pub cu_die_offset: u64,
    pub stmt_list_reference: Option<u64>,
    pub die_reference_list: Vec<u64>,
    pub loc_reference_list: Vec<u64>,
    pub range_reference_list: Vec<u64>,
    pub decl_file_reference_list: Vec<u64>,
    pub has_arange: bool,
    pub has_pubnames: bool,
    pub has_pubtypes: bool,
}

/// Everything a full pass accumulates, for callers that want the parsed
/// structures themselves rather than just the diagnostics (a future
/// `--dump` mode, or tests).
#[derive(Debug, Default)]
pub struct PassResults {
    pub compile_units: Vec<CompileUnit>,
    pub line_rows: HashMap<u64, Vec<line::LineRow>>,
    /// Number of entries in the file-name table of the line program at
    /// each `.debug_line` offset, kept alongside `line_rows` so the
    /// `DW_AT_decl_file` cross-check doesn't have to re-parse a header
    /// it already read once.
    pub line_file_counts: HashMap<u64, usize>,
    pub arange_tuples: Vec<aranges::ArangeTuple>,
    pub pubnames: Vec<pubtables::PubEntry>,
    pub pubtypes: Vec<pubtables::PubEntry>,
}

/// Runs every applicable check against `input` and returns the
/// accumulated diagnostics. This is the entry point `dwarflint-cli`
/// calls once per object.
pub fn run(input: &ObjectInput<'_>, config: &Config) -> Diagnostics {
    let mut diagnostics = Diagnostics::new(config.accept_mask(), config.reject_mask(), config.error_criteria());

    if input.has_no_debug_sections() {
        if !config.ignore_missing_debug {
            diagnostics.error(
                Category::HEADER | Category::IMPACT_4,
                Locus::section(SectionId::DebugInfo),
                "object has no DWARF debug sections",
            );
        }
        return diagnostics;
    }

    let mut results = PassResults::default();

    run_pass("info", &mut diagnostics, |d| run_info_pass(input, config, d, &mut results));
    run_pass("aranges", &mut diagnostics, |d| run_aranges_pass(input, d, &mut results));
    run_pass("pubnames", &mut diagnostics, |d| {
        run_pubtable_pass(input, SectionId::DebugPubnames, d, &mut results)
    });
    run_pass("pubtypes", &mut diagnostics, |d| {
        run_pubtable_pass(input, SectionId::DebugPubtypes, d, &mut results)
    });

    diagnostics
}

/// Logs entry/exit around one top-level pass the way [`crate::scheduler`]
/// does for its finer-grained checks, without taking on the scheduler's
/// dependency bookkeeping these four passes don't need.
fn run_pass(name: &'static str, diagnostics: &mut Diagnostics, f: impl FnOnce(&mut Diagnostics)) {
    tracing::debug!(pass = name, "entering pass");
    let before = diagnostics.diagnostics().len();
    f(diagnostics);
    let produced = diagnostics.diagnostics().len() - before;
    tracing::debug!(pass = name, produced, "pass complete");
}

fn root_attribute<'t>(tree: &'t DieTree, attribute: DwAttribute) -> Option<&'t AttributeValue> {
    tree.root().and_then(|die| die.attribute(attribute))
}

/// Reduces a freshly parsed DIE tree to the per-unit record the rest of
/// this pass threads around: its `DW_AT_stmt_list` offset, every
/// reference its DIEs make into `.debug_info`/`.debug_loc`/
/// `.debug_ranges`, and the `DW_AT_decl_file` indices it expects its
/// line program's file table to cover.
fn collect_compile_unit(header: CompileUnitHeader, tree: DieTree) -> CompileUnit {
    let stmt_list_reference = root_attribute(&tree, DwAttribute::STMT_LIST).and_then(|v| match v {
        AttributeValue::SecOffset(offset, FormClass::LinePtr) => Some(*offset),
        _ => None,
    });

    let mut die_reference_list = Vec::new();
    let mut loc_reference_list = Vec::new();
    let mut range_reference_list = Vec::new();
    let mut decl_file_reference_list = Vec::new();

    for die in &tree.dies {
        for (attribute, value) in &die.attributes {
            match value {
                AttributeValue::Reference { target, .. } => die_reference_list.push(*target),
                AttributeValue::SecOffset(offset, FormClass::LocListPtr) => loc_reference_list.push(*offset),
                AttributeValue::SecOffset(offset, FormClass::RangeListPtr) => range_reference_list.push(*offset),
                AttributeValue::Constant(value) if *attribute == DwAttribute::DECL_FILE => {
                    decl_file_reference_list.push(*value);
                }
                _ => {}
            }
        }
    }

    let cu_die_offset = tree.root().map(|d| d.offset).unwrap_or(header.offset);

    CompileUnit {
        header,
        tree,
        cu_die_offset,
        stmt_list_reference,
        die_reference_list,
        loc_reference_list,
        range_reference_list,
        decl_file_reference_list,
        has_arange: false,
        has_pubnames: false,
        has_pubtypes: false,
    }
}

/// Walks every compile unit in `.debug_info`: header, abbreviation
/// table, DIE tree, then (per CU) the `.debug_line` program and
/// `.debug_ranges`/`.debug_loc` lists its DIEs reference. Finishes with
/// a post-pass over the abbreviation cache (codes and whole tables no
/// CU ever used) and a cross-CU reference-resolution pass once every
/// unit's DIE offsets are known.
fn run_info_pass(input: &ObjectInput<'_>, config: &Config, diagnostics: &mut Diagnostics, results: &mut PassResults) {
    let Some(info) = input.section(SectionId::DebugInfo) else {
        return;
    };
    let Some(abbrev_section) = input.section(SectionId::DebugAbbrev) else {
        diagnostics.error(
            Category::HEADER | Category::IMPACT_4,
            Locus::section(SectionId::DebugAbbrev),
            "object has .debug_info but no .debug_abbrev",
        );
        return;
    };

    let mut abbrev_cache: HashMap<u64, AbbrevTable> = HashMap::new();
    let mut reader = Reader::new(info.data, info.endian);

    while reader.offset() < info.data.len() as u64 {
        let mut header_relocs = RelocationCursor::new(&info.relocations);
        let cu_header = match cu::read_cu_header(
            &mut reader,
            diagnostics,
            info.address_size,
            info.data.len() as u64,
            &mut header_relocs,
            &input.symbols,
        ) {
            Ok(h) => h,
            Err(_) => break,
        };

        let abbrevs = abbrev_cache.entry(cu_header.debug_abbrev_offset).or_insert_with(|| {
            let mut abbrev_reader = Reader::at(abbrev_section.data, abbrev_section.endian, cu_header.debug_abbrev_offset as usize);
            abbrev::parse_abbrev_table(&mut abbrev_reader, diagnostics, cu_header.debug_abbrev_offset)
        });

        let mut die_relocs = RelocationCursor::new(&info.relocations);
        let tree = match die::parse_die_tree(&mut reader, abbrevs, &cu_header, &mut die_relocs, &input.symbols, diagnostics) {
            Ok(t) => t,
            Err(_) => {
                diagnostics.error(
                    Category::DIE_OTHER | Category::IMPACT_4,
                    Locus::section(SectionId::DebugInfo).with_cu(cu_header.offset),
                    "compile unit's DIE tree could not be fully parsed",
                );
                reader = Reader::at(info.data, info.endian, cu_header.unit_end as usize);
                continue;
            }
        };

        die::validate_local_references(&tree, diagnostics);

        let mut unit = collect_compile_unit(cu_header, tree);
        if !config.no_line_checks {
            run_line_for_cu(input, &unit, diagnostics, results);
        }
        run_lists_for_cu(input, &unit, diagnostics);
        validate_decl_files(&unit, results, diagnostics);

        results.compile_units.push(unit);
        reader = Reader::at(info.data, info.endian, cu_header.unit_end as usize);
    }

    for (&offset, table) in &abbrev_cache {
        if !table.is_table_used() {
            diagnostics.emit(
                Category::ABBREVS | Category::BLOAT,
                Locus::section(SectionId::DebugAbbrev).with_table(offset),
                "abbreviation table is never used by any compile unit",
            );
            continue;
        }
        for abbrev in table.iter() {
            if !table.is_used(abbrev.code) {
                diagnostics.emit(
                    Category::ABBREVS | Category::BLOAT,
                    Locus::section(SectionId::DebugAbbrev).with_offset(abbrev.offset),
                    format!("abbreviation code {} is declared but never used by any DIE", abbrev.code),
                );
            }
        }
    }

    let all_offsets: HashSet<u64> = results.compile_units.iter().flat_map(|cu| cu.tree.offsets()).collect();
    for cu in &results.compile_units {
        die::validate_global_references(&cu.tree, cu.header.offset..cu.header.unit_end, &all_offsets, diagnostics);
    }
}

fn run_line_for_cu(input: &ObjectInput<'_>, cu: &CompileUnit, diagnostics: &mut Diagnostics, results: &mut PassResults) {
    let Some(offset) = cu.stmt_list_reference else {
        return;
    };
    let Some(line_section) = input.section(SectionId::DebugLine) else {
        diagnostics.error(
            Category::LINE | Category::IMPACT_4,
            Locus::section(SectionId::DebugLine),
            "DW_AT_stmt_list present but .debug_line is missing",
        );
        return;
    };
    if offset as usize >= line_section.data.len() {
        diagnostics.error(
            Category::LINE | Category::IMPACT_4,
            Locus::section(SectionId::DebugLine).with_offset(offset),
            "DW_AT_stmt_list points past the end of .debug_line",
        );
        return;
    }

    let mut reader = Reader::at(line_section.data, line_section.endian, offset as usize);
    let header = match line::read_line_program_header(&mut reader, diagnostics) {
        Ok(h) => h,
        Err(_) => return,
    };
    results.line_file_counts.insert(offset, header.file_names.len());
    if let Ok(rows) = line::run_line_program(&mut reader, &header, diagnostics, cu.header.address_size.bytes()) {
        results.line_rows.insert(offset, rows);
    }
}

/// Checks every `DW_AT_decl_file` this compile unit's DIEs referenced
/// against the file table of the line program its own `DW_AT_stmt_list`
/// points at: a unit with decl-file references but no line program at
/// all is an error, and a decl-file index past the end of a line
/// program's file table is the same mistake `run_line_program` already
/// flags for the line number table's own file register.
fn validate_decl_files(cu: &CompileUnit, results: &PassResults, diagnostics: &mut Diagnostics) {
    if cu.decl_file_reference_list.is_empty() {
        return;
    }
    let Some(stmt_list) = cu.stmt_list_reference else {
        diagnostics.error(
            Category::LINE | Category::IMPACT_3,
            Locus::section(SectionId::DebugInfo).with_cu(cu.header.offset),
            "DIEs carry DW_AT_decl_file but this compile unit has no DW_AT_stmt_list",
        );
        return;
    };
    let Some(&file_count) = results.line_file_counts.get(&stmt_list) else {
        return;
    };
    for &file in &cu.decl_file_reference_list {
        if file != 0 && file as usize > file_count {
            diagnostics.error(
                Category::LINE | Category::IMPACT_3,
                Locus::section(SectionId::DebugInfo).with_cu(cu.header.offset).with_attribute("DW_AT_decl_file"),
                format!("DW_AT_decl_file {file} has no matching entry in the compile unit's file table"),
            );
        }
    }
}

fn run_lists_for_cu(input: &ObjectInput<'_>, cu: &CompileUnit, diagnostics: &mut Diagnostics) {
    let low_pc = root_attribute(&cu.tree, DwAttribute::LOW_PC).and_then(|v| match v {
        AttributeValue::Address(a) => Some(*a),
        _ => None,
    });

    if let Some(section) = input.section(SectionId::DebugRanges) {
        for &offset in &cu.range_reference_list {
            if (offset as usize) < section.data.len() {
                let mut relocs = RelocationCursor::new(&section.relocations);
                let mut reader = Reader::at(section.data, section.endian, offset as usize);
                let _ = loc_ranges::read_ranges_list(&mut reader, diagnostics, cu.header.address_size, low_pc, &mut relocs, &input.symbols);
            }
        }
    }
    if let Some(section) = input.section(SectionId::DebugLoc) {
        for &offset in &cu.loc_reference_list {
            if (offset as usize) < section.data.len() {
                let mut relocs = RelocationCursor::new(&section.relocations);
                let mut reader = Reader::at(section.data, section.endian, offset as usize);
                let _ = loc_ranges::read_loc_list(
                    &mut reader,
                    diagnostics,
                    cu.header.address_size,
                    cu.header.offset_size,
                    low_pc,
                    &mut relocs,
                    &input.symbols,
                );
            }
        }
    }
}

fn run_aranges_pass(input: &ObjectInput<'_>, diagnostics: &mut Diagnostics, results: &mut PassResults) {
    let Some(section) = input.section(SectionId::DebugAranges) else {
        return;
    };
    let known_cu_offsets: HashSet<u64> = results.compile_units.iter().map(|cu| cu.cu_die_offset).collect();
    let mut seen_cu_offsets = HashSet::new();
    let mut reader = Reader::new(section.data, section.endian);
    while reader.offset() < section.data.len() as u64 {
        let header = match aranges::read_aranges_header(&mut reader, diagnostics) {
            Ok(h) => h,
            Err(_) => break,
        };
        let tuples = match aranges::read_aranges_tuples(&mut reader, &header, diagnostics, input.is_relocatable) {
            Ok(tuples) => tuples,
            Err(_) => break,
        };

        let cu_pc_coverage = results
            .compile_units
            .iter()
            .find(|cu| cu.cu_die_offset == header.debug_info_offset)
            .map(|cu| &cu.tree.pc_coverage);
        aranges::validate_against_compile_unit(&header, &tuples, &known_cu_offsets, &mut seen_cu_offsets, cu_pc_coverage, diagnostics);

        if let Some(cu) = results.compile_units.iter_mut().find(|cu| cu.cu_die_offset == header.debug_info_offset) {
            cu.has_arange = true;
        }

        results.arange_tuples.extend(tuples);
        reader = Reader::at(section.data, section.endian, header.table_end as usize);
    }
}

fn run_pubtable_pass(input: &ObjectInput<'_>, section_id: SectionId, diagnostics: &mut Diagnostics, results: &mut PassResults) {
    let Some(section) = input.section(section_id) else {
        return;
    };
    let mut seen_cu_offsets = HashSet::new();
    let mut reader = Reader::new(section.data, section.endian);
    while reader.offset() < section.data.len() as u64 {
        let header = match pubtables::read_pubtable_header(&mut reader, diagnostics, section_id) {
            Ok(h) => h,
            Err(_) => break,
        };
        let entries = match pubtables::read_pubtable_entries(&mut reader, &header, diagnostics, section_id) {
            Ok(entries) => entries,
            Err(_) => break,
        };

        let matching_cu = results.compile_units.iter().find(|cu| cu.cu_die_offset == header.debug_info_offset);
        let cu_total_size = matching_cu.map(|cu| cu.header.unit_end - cu.header.offset);
        let cu_die_offsets: Option<HashSet<u64>> = matching_cu.map(|cu| cu.tree.offsets().collect());
        pubtables::validate_against_compile_unit(
            &header,
            &entries,
            cu_total_size,
            cu_die_offsets.as_ref(),
            &mut seen_cu_offsets,
            section_id,
            diagnostics,
        );

        if let Some(cu) = results.compile_units.iter_mut().find(|cu| cu.cu_die_offset == header.debug_info_offset) {
            if section_id == SectionId::DebugPubnames {
                cu.has_pubnames = true;
            } else {
                cu.has_pubtypes = true;
            }
        }

        if section_id == SectionId::DebugPubnames {
            results.pubnames.extend(entries);
        } else {
            results.pubtypes.extend(entries);
        }
        reader = Reader::at(section.data, section.endian, header.table_end as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abbrev::DwTag;
    use crate::section::{AddressWidth, Endian};

    fn leb(value: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut v = value;
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            bytes.push(byte);
            if v == 0 {
                break;
            }
        }
        bytes
    }

    fn cu_bytes(die_bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(3u16.to_le_bytes()); // version
        body.extend(0u32.to_le_bytes()); // debug_abbrev_offset
        body.push(8); // address_size
        body.extend_from_slice(die_bytes);

        let mut bytes = Vec::new();
        bytes.extend((body.len() as u32).to_le_bytes());
        bytes.extend(body);
        bytes
    }

    /// code 1: childless `DW_TAG_compile_unit`, no attributes.
    fn single_entry_abbrev_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(leb(1));
        bytes.extend(leb(DwTag::COMPILE_UNIT.0));
        bytes.push(0);
        bytes.extend(leb(0));
        bytes.extend(leb(0));
        bytes.push(0);
        bytes
    }

    /// code 1: childful `DW_TAG_compile_unit`, no attributes. code 2:
    /// childless `DW_TAG_subprogram` carrying `DW_AT_sibling`.
    fn sibling_abbrev_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(leb(1));
        bytes.extend(leb(DwTag::COMPILE_UNIT.0));
        bytes.push(1);
        bytes.extend(leb(0));
        bytes.extend(leb(0));

        bytes.extend(leb(2));
        bytes.extend(leb(DwTag::SUBPROGRAM.0));
        bytes.push(0);
        bytes.extend(leb(crate::dwarf_version::DwAttribute::SIBLING.0));
        bytes.extend(leb(crate::dwarf_version::DwForm::REF4.0));
        bytes.extend(leb(0));
        bytes.extend(leb(0));
        bytes.push(0);
        bytes
    }

    fn input_with<'d>(info: &'d [u8], abbrev: &'d [u8]) -> ObjectInput<'d> {
        let mut input = ObjectInput::new(false, crate::input::SymbolTable::new(vec![]));
        input.insert_section(crate::input::SectionView::new(SectionId::DebugInfo, info, Endian::Little, AddressWidth::Eight));
        input.insert_section(crate::input::SectionView::new(SectionId::DebugAbbrev, abbrev, Endian::Little, AddressWidth::Eight));
        input
    }

    #[test]
    fn clean_single_cu_produces_no_errors() {
        let abbrev = single_entry_abbrev_bytes();
        let info = cu_bytes(&leb(1));
        let input = input_with(&info, &abbrev);

        let diagnostics = run(&input, &Config::default());

        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn wrong_sibling_value_surfaces_through_the_full_pass() {
        let abbrev = sibling_abbrev_bytes();
        let mut die_bytes = leb(1); // root
        die_bytes.extend(leb(2)); // child
        die_bytes.extend(999u32.to_le_bytes()); // deliberately wrong DW_AT_sibling
        die_bytes.push(0); // close root's children
        let info = cu_bytes(&die_bytes);
        let input = input_with(&info, &abbrev);

        let diagnostics = run(&input, &Config::default());

        assert!(diagnostics
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("next sibling actually starts at")));
    }

    #[test]
    fn missing_abbrev_section_is_an_error() {
        let info = cu_bytes(&leb(1));
        let mut input = ObjectInput::new(false, crate::input::SymbolTable::new(vec![]));
        input.insert_section(crate::input::SectionView::new(SectionId::DebugInfo, &info, Endian::Little, AddressWidth::Eight));

        let diagnostics = run(&input, &Config::default());

        assert!(diagnostics.has_errors());
    }

    #[test]
    fn object_with_no_debug_sections_is_clean_when_ignored() {
        let input = ObjectInput::new(false, crate::input::SymbolTable::new(vec![]));
        let config = Config {
            ignore_missing_debug: true,
            ..Default::default()
        };

        let diagnostics = run(&input, &config);

        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn object_with_no_debug_sections_errors_by_default() {
        let input = ObjectInput::new(false, crate::input::SymbolTable::new(vec![]));

        let diagnostics = run(&input, &Config::default());

        assert!(diagnostics.has_errors());
    }

    #[test]
    fn abbrev_code_never_used_by_any_die_is_flagged() {
        // code 1 is used by the root; code 2 is declared but no DIE ever
        // references it.
        let mut abbrev = single_entry_abbrev_bytes();
        abbrev.pop(); // drop the table terminator
        abbrev.extend(leb(2));
        abbrev.extend(leb(DwTag::SUBPROGRAM.0));
        abbrev.push(0);
        abbrev.extend(leb(0));
        abbrev.extend(leb(0));
        abbrev.push(0);

        let info = cu_bytes(&leb(1));
        let input = input_with(&info, &abbrev);

        let diagnostics = run(&input, &Config::default());

        assert!(diagnostics
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("never used by any DIE")));
    }

    #[test]
    fn decl_file_without_a_stmt_list_is_an_error() {
        let mut abbrev = Vec::new();
        abbrev.extend(leb(1));
        abbrev.extend(leb(DwTag::COMPILE_UNIT.0));
        abbrev.push(0);
        abbrev.extend(leb(crate::dwarf_version::DwAttribute::DECL_FILE.0));
        abbrev.extend(leb(crate::dwarf_version::DwForm::DATA1.0));
        abbrev.extend(leb(0));
        abbrev.extend(leb(0));
        abbrev.push(0);

        let mut die_bytes = leb(1);
        die_bytes.push(1); // DW_AT_decl_file = 1
        let info = cu_bytes(&die_bytes);
        let input = input_with(&info, &abbrev);

        let diagnostics = run(&input, &Config::default());

        assert!(diagnostics
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("no DW_AT_stmt_list")));
    }
}
