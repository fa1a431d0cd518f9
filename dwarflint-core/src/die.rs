//! Building and checking the DIE (Debugging Information Entry) tree that
//! makes up the body of a compile unit.
//!
//! Reading a DIE is mechanical once the attribute/form dispatch from
//! [`crate::dwarf_version`] is in place; what takes checking is
//! everything the byte format lets a producer get subtly wrong without
//! it showing up as a read failure: a `DW_AT_sibling` value that doesn't
//! actually point at the next sibling, two subprograms whose
//! `[low_pc, high_pc)` ranges overlap, and references — within or across
//! compile units — that land on a byte offset that isn't the start of
//! any DIE at all.

use std::collections::HashSet;

use crate::abbrev::{AbbrevTable, DwTag};
use crate::coverage::Coverage;
use crate::cu::CompileUnitHeader;
use crate::diagnostics::{Category, Diagnostics};
use crate::dwarf_version::{base_class, resolve_class, DwAttribute, DwForm, FormClass};
use crate::input::SymbolTable;
use crate::locus::Locus;
use crate::reader::{ReadError, Reader};
use crate::relocation::{RelocationCursor, TargetKind};
use crate::section::SectionId;

/// Whether a [`AttributeValue::Reference`] was encoded relative to its
/// own compile unit (`DW_FORM_ref1/2/4/8/ref_udata`) or as an absolute
/// `.debug_info` offset (`DW_FORM_ref_addr`). The two have different
/// resolution rules: a local reference is only ever valid against its
/// own CU's DIE set, a global one against the whole object's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceScope {
    Local,
    Global,
}

/// The value an attribute decoded to, reduced to the handful of shapes a
/// checker needs to distinguish (as opposed to every individual form —
/// `DW_FORM_data4` and `DW_FORM_udata` both end up `Constant`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Address(u64),
    Block(Vec<u8>),
    Constant(u64),
    SignedConstant(i64),
    Flag(bool),
    /// An absolute `.debug_info` offset, already resolved from whatever
    /// CU-relative or absolute encoding the form used.
    Reference { target: u64, scope: ReferenceScope },
    String(Vec<u8>),
    /// An offset into `.debug_str`.
    StringRef(u64),
    /// A `lineptr`/`loclistptr`/`rangelistptr`/`macptr` offset into the
    /// section the attribute's class names.
    SecOffset(u64, FormClass),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DieError {
    Truncated,
    /// An abbreviation code with no matching entry in the table; fatal,
    /// since there is no way to know the byte length of this DIE's
    /// attribute list without its abbreviation.
    UnknownAbbrevCode(u64),
    /// `DW_FORM_indirect` chained more than a handful of times in a row,
    /// almost certainly a corrupt stream rather than a legitimate form.
    IndirectFormLoop,
}

const MAX_INDIRECT_CHAIN: u32 = 8;

/// An attribute's decoded value, plus the section a relocation applied
/// to its raw bytes resolved into (when the field was itself a
/// relocation target). Threaded back up to [`parse_die_tree`]'s per-DIE
/// loop so `DW_AT_low_pc`/`DW_AT_high_pc` can be cross-checked against
/// the section their own relocations actually landed in.
struct FormRead {
    value: AttributeValue,
    relocated_section: Option<SectionId>,
}

#[allow(clippy::too_many_arguments)]
fn read_form_value(
    reader: &mut Reader<'_>,
    mut form: DwForm,
    attribute: DwAttribute,
    cu: &CompileUnitHeader,
    relocations: &mut RelocationCursor<'_>,
    symbols: &SymbolTable,
    diagnostics: &mut Diagnostics,
) -> Result<FormRead, DieError> {
    let mut chain = 0;
    loop {
        if form == DwForm::INDIRECT {
            chain += 1;
            if chain > MAX_INDIRECT_CHAIN {
                return Err(DieError::IndirectFormLoop);
            }
            let next = reader.read_uleb128().map_err(|_| DieError::Truncated)?.value;
            form = DwForm(next);
            continue;
        }
        return read_concrete_form(reader, form, attribute, cu, relocations, symbols, diagnostics);
    }
}

#[allow(clippy::too_many_arguments)]
fn read_concrete_form(
    reader: &mut Reader<'_>,
    form: DwForm,
    attribute: DwAttribute,
    cu: &CompileUnitHeader,
    relocations: &mut RelocationCursor<'_>,
    symbols: &SymbolTable,
    diagnostics: &mut Diagnostics,
) -> Result<FormRead, DieError> {
    let t = |_: ReadError| -> DieError { DieError::Truncated };
    let field_locus = |offset: u64| Locus::section(SectionId::DebugInfo).with_cu(cu.offset).with_offset(offset).with_attribute(attribute.name().unwrap_or("DW_AT_unknown"));

    if let Some(class) = resolve_class(attribute, form) {
        if matches!(class, FormClass::LinePtr | FormClass::LocListPtr | FormClass::RangeListPtr | FormClass::MacPtr) {
            // Only reachable for DW_FORM_data4/data8 (see offset_class_for_attribute),
            // whose byte width is fixed by the form itself, not by the CU's offset size.
            let width = if form == DwForm::DATA8 { 8 } else { 4 };
            let field_offset = reader.offset();
            let raw = reader.read_uint(width).map_err(t)?;

            if width == 4 && cu.offset_size == crate::section::OffsetSize::Eight {
                diagnostics.emit(
                    Category::DIE_OTHER | Category::IMPACT_3,
                    field_locus(field_offset),
                    "4-byte section-offset form used in a 64-bit DWARF compile unit; offsets beyond 4GiB cannot be represented",
                );
            }

            let target_section = match class {
                FormClass::LinePtr => SectionId::DebugLine,
                FormClass::LocListPtr => SectionId::DebugLoc,
                FormClass::RangeListPtr => SectionId::DebugRanges,
                FormClass::MacPtr => SectionId::DebugMac,
                _ => unreachable!(),
            };
            let (value, section) = relocations.resolve_or(
                field_offset,
                TargetKind::Section(target_section),
                symbols,
                raw,
                diagnostics,
                || field_locus(field_offset),
            );
            return Ok(FormRead {
                value: AttributeValue::SecOffset(value, class),
                relocated_section: section,
            });
        }
    }

    match form {
        DwForm::ADDR => {
            let field_offset = reader.offset();
            let raw = reader.read_uint(cu.address_size.bytes()).map_err(t)?;
            let (value, section) =
                relocations.resolve_or(field_offset, TargetKind::Address, symbols, raw, diagnostics, || field_locus(field_offset));
            Ok(FormRead {
                value: AttributeValue::Address(value),
                relocated_section: section,
            })
        }
        DwForm::BLOCK1 => {
            let len = reader.read_u8().map_err(t)? as usize;
            Ok(simple(AttributeValue::Block(reader.read_bytes(len).map_err(t)?.to_vec())))
        }
        DwForm::BLOCK2 => {
            let len = reader.read_u16().map_err(t)? as usize;
            Ok(simple(AttributeValue::Block(reader.read_bytes(len).map_err(t)?.to_vec())))
        }
        DwForm::BLOCK4 => {
            let len = reader.read_u32().map_err(t)? as usize;
            Ok(simple(AttributeValue::Block(reader.read_bytes(len).map_err(t)?.to_vec())))
        }
        DwForm::BLOCK => {
            let len = reader.read_uleb128().map_err(t)?.value as usize;
            Ok(simple(AttributeValue::Block(reader.read_bytes(len).map_err(t)?.to_vec())))
        }
        DwForm::DATA1 => Ok(simple(AttributeValue::Constant(reader.read_u8().map_err(t)? as u64))),
        DwForm::DATA2 => Ok(simple(AttributeValue::Constant(reader.read_u16().map_err(t)? as u64))),
        DwForm::DATA4 => Ok(simple(AttributeValue::Constant(reader.read_u32().map_err(t)? as u64))),
        DwForm::DATA8 => Ok(simple(AttributeValue::Constant(reader.read_u64().map_err(t)?))),
        DwForm::SDATA => Ok(simple(AttributeValue::SignedConstant(reader.read_sleb128().map_err(t)?.value))),
        DwForm::UDATA => Ok(simple(AttributeValue::Constant(reader.read_uleb128().map_err(t)?.value))),
        DwForm::STRING => Ok(simple(AttributeValue::String(reader.read_cstr().map_err(t)?.to_vec()))),
        DwForm::STRP => Ok(simple(AttributeValue::StringRef(reader.read_offset(cu.offset_size).map_err(t)?))),
        DwForm::FLAG => Ok(simple(AttributeValue::Flag(reader.read_u8().map_err(t)? != 0))),
        DwForm::REF1 | DwForm::REF2 | DwForm::REF4 | DwForm::REF8 => {
            let width = form.fixed_ref_width().expect("matched ref form");
            let rel = reader.read_uint(width).map_err(t)?;
            Ok(simple(AttributeValue::Reference {
                target: cu.offset + rel,
                scope: ReferenceScope::Local,
            }))
        }
        DwForm::REF_UDATA => {
            let rel = reader.read_uleb128().map_err(t)?.value;
            Ok(simple(AttributeValue::Reference {
                target: cu.offset + rel,
                scope: ReferenceScope::Local,
            }))
        }
        DwForm::REF_ADDR => {
            // DWARF 2 defined DW_FORM_ref_addr as address-sized; DWARF 3
            // redefined it to the unit's offset size. Both are honored
            // here since this checker accepts either version.
            let width = if cu.version <= 2 { cu.address_size.bytes() } else { cu.offset_size.bytes() };
            let field_offset = reader.offset();
            let raw = reader.read_uint(width).map_err(t)?;
            let (value, section) = relocations.resolve_or(
                field_offset,
                TargetKind::Section(SectionId::DebugInfo),
                symbols,
                raw,
                diagnostics,
                || field_locus(field_offset),
            );
            Ok(FormRead {
                value: AttributeValue::Reference {
                    target: value,
                    scope: ReferenceScope::Global,
                },
                relocated_section: section,
            })
        }
        _ => Ok(simple(AttributeValue::Constant(reader.read_uleb128().map_err(t)?.value))),
    }
}

fn simple(value: AttributeValue) -> FormRead {
    FormRead {
        value,
        relocated_section: None,
    }
}

/// A single DIE, linked to its parent and children by index into the
/// owning [`DieTree`]'s flat vector rather than by pointer.
#[derive(Debug, Clone)]
pub struct Die {
    pub offset: u64,
    pub tag: DwTag,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub attributes: Vec<(DwAttribute, AttributeValue)>,
    /// Whether this DIE's own abbreviation declared children, independent
    /// of whether any were actually present before the closing zero code.
    pub has_children: bool,
    /// The offset immediately after this DIE's entire subtree — what a
    /// `DW_AT_sibling` on this DIE, if present, should point at.
    pub next_sibling_offset: Option<u64>,
}

impl Die {
    pub fn attribute(&self, name: DwAttribute) -> Option<&AttributeValue> {
        self.attributes.iter().find(|(a, _)| *a == name).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DieTree {
    pub dies: Vec<Die>,
    /// The union of every `[low_pc, high_pc)` range seen across this
    /// tree's DIEs, handed to the `.debug_aranges` cross-check so it can
    /// compare a table's tuples against what the DIE tree itself claims
    /// to cover.
    pub pc_coverage: Coverage,
}

impl DieTree {
    pub fn root(&self) -> Option<&Die> {
        self.dies.first()
    }

    pub fn offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.dies.iter().map(|d| d.offset)
    }
}

/// Parses every DIE belonging to one compile unit, starting at the
/// reader's current position (the root DIE, immediately after the CU
/// header) and continuing until `cu.unit_end`.
pub fn parse_die_tree(
    reader: &mut Reader<'_>,
    abbrevs: &AbbrevTable,
    cu: &CompileUnitHeader,
    relocations: &mut RelocationCursor<'_>,
    symbols: &SymbolTable,
    diagnostics: &mut Diagnostics,
) -> Result<DieTree, DieError> {
    let mut tree = DieTree::default();
    let mut stack: Vec<usize> = Vec::new();
    let mut pc_coverage = Coverage::new();
    abbrevs.mark_table_used();

    while reader.offset() < cu.unit_end {
        let die_offset = reader.offset();
        tracing::trace!(offset = format_args!("{die_offset:#x}"), "visiting DIE");
        let code = reader.read_uleb128().map_err(|_| DieError::Truncated)?.value;

        if code == 0 {
            match stack.pop() {
                Some(closed) => {
                    tree.dies[closed].next_sibling_offset = Some(reader.offset());
                }
                None => break,
            }
            continue;
        }

        let abbrev = abbrevs.get(code).ok_or(DieError::UnknownAbbrevCode(code))?;
        abbrevs.mark_used(code);
        let parent = stack.last().copied();
        let index = tree.dies.len();

        let mut attributes = Vec::with_capacity(abbrev.attributes.len());
        let mut low_pc_section = None;
        let mut high_pc_section = None;
        for spec in &abbrev.attributes {
            let read = read_form_value(reader, spec.form, spec.attribute, cu, relocations, symbols, diagnostics)?;
            if spec.attribute == DwAttribute::LOW_PC {
                low_pc_section = read.relocated_section;
            }
            if spec.attribute == DwAttribute::HIGH_PC {
                high_pc_section = read.relocated_section;
            }
            attributes.push((spec.attribute, read.value));
        }

        if let (Some(low_section), Some(high_section)) = (low_pc_section, high_pc_section) {
            if low_section != high_section {
                diagnostics.error(
                    Category::DIE_REL | Category::IMPACT_3,
                    Locus::section(SectionId::DebugInfo).with_die(die_offset),
                    "DW_AT_low_pc and DW_AT_high_pc relocations target different sections",
                );
            }
        }

        let mut die = Die {
            offset: die_offset,
            tag: abbrev.tag,
            parent,
            children: Vec::new(),
            attributes,
            has_children: abbrev.has_children,
            next_sibling_offset: None,
        };

        if !abbrev.has_children {
            die.next_sibling_offset = Some(reader.offset());
        }

        tree.dies.push(die);
        if let Some(p) = parent {
            tree.dies[p].children.push(index);
        }
        if abbrev.has_children {
            stack.push(index);
        }

        check_low_high_pc_overlap(&tree.dies[index], &mut pc_coverage, diagnostics);
    }

    tree.pc_coverage = pc_coverage;
    check_root_die(&tree, cu, diagnostics);
    check_sibling_consistency(&tree, diagnostics);
    Ok(tree)
}

/// A compile unit's DIE tree must contain exactly one DIE directly under
/// the header, and it must be tagged `DW_TAG_compile_unit` or
/// `DW_TAG_partial_unit`.
fn check_root_die(tree: &DieTree, cu: &CompileUnitHeader, diagnostics: &mut Diagnostics) {
    let top_level = tree.dies.iter().filter(|d| d.parent.is_none()).count();
    if top_level != 1 {
        diagnostics.error(
            Category::DIE_OTHER | Category::IMPACT_4,
            Locus::section(SectionId::DebugInfo).with_cu(cu.offset),
            format!("compile unit must have exactly one root DIE; found {top_level}"),
        );
        return;
    }
    let Some(root) = tree.root() else { return };
    if root.tag != DwTag::COMPILE_UNIT && root.tag != DwTag::PARTIAL_UNIT {
        diagnostics.error(
            Category::DIE_OTHER | Category::IMPACT_4,
            Locus::section(SectionId::DebugInfo).with_die(root.offset),
            "root DIE is neither DW_TAG_compile_unit nor DW_TAG_partial_unit",
        );
    }
}

fn check_low_high_pc_overlap(die: &Die, coverage: &mut Coverage, diagnostics: &mut Diagnostics) {
    let (Some(AttributeValue::Address(low)), Some(AttributeValue::Address(high))) =
        (die.attribute(DwAttribute::LOW_PC), die.attribute(DwAttribute::HIGH_PC))
    else {
        return;
    };
    if high < low {
        diagnostics.error(
            Category::DIE_OTHER | Category::IMPACT_4,
            Locus::section(SectionId::DebugInfo).with_die(die.offset),
            "DW_AT_high_pc is before DW_AT_low_pc",
        );
        return;
    }
    if high == low {
        diagnostics.emit(
            Category::DIE_OTHER | Category::SUBOPTIMAL,
            Locus::section(SectionId::DebugInfo).with_die(die.offset),
            "DW_AT_low_pc equals DW_AT_high_pc, describing an empty address range",
        );
    }
    if coverage.is_overlap(*low, *high) {
        diagnostics.emit(
            Category::DIE_OTHER | Category::IMPACT_3,
            Locus::section(SectionId::DebugInfo).with_die(die.offset),
            format!("address range [{low:#x}, {high:#x}) overlaps another DIE's range"),
        );
    }
    coverage.add(*low, *high);
}

fn check_sibling_consistency(tree: &DieTree, diagnostics: &mut Diagnostics) {
    for die in &tree.dies {
        if !die.has_children && !die.children.is_empty() {
            // unreachable given the tree builder, but keeps this check
            // honest if that invariant ever changes.
            continue;
        }
        if die.has_children && die.children.is_empty() {
            diagnostics.emit(
                Category::DIE_OTHER | Category::BLOAT,
                Locus::section(SectionId::DebugInfo).with_die(die.offset),
                "abbreviation declares children but this DIE's chain is empty",
            );
        }
        if die.has_children && die.attribute(DwAttribute::SIBLING).is_none() && !die.children.is_empty() {
            diagnostics.emit(
                Category::DIE_OTHER | Category::BLOAT,
                Locus::section(SectionId::DebugInfo).with_die(die.offset),
                "DIE has children but no DW_AT_sibling; consumers skipping its subtree must walk all of it",
            );
        }

        let Some(AttributeValue::Reference { target, .. }) = die.attribute(DwAttribute::SIBLING) else {
            continue;
        };
        if *target == 0 {
            diagnostics.error(
                Category::DIE_REL | Category::IMPACT_3,
                Locus::section(SectionId::DebugInfo).with_die(die.offset).with_attribute("DW_AT_sibling"),
                "DW_AT_sibling value of 0 is never a valid DIE offset",
            );
            continue;
        }
        match die.next_sibling_offset {
            Some(actual) if actual == *target => {}
            Some(actual) => {
                diagnostics.emit(
                    Category::DIE_REL | Category::IMPACT_3,
                    Locus::section(SectionId::DebugInfo).with_die(die.offset).with_attribute("DW_AT_sibling"),
                    format!("sibling points at {target:#x}, but the next sibling actually starts at {actual:#x}"),
                );
            }
            None => {
                diagnostics.error(
                    Category::DIE_REL | Category::IMPACT_3,
                    Locus::section(SectionId::DebugInfo).with_die(die.offset).with_attribute("DW_AT_sibling"),
                    "DW_AT_sibling advertised a target but the sibling chain ended before reaching it",
                );
            }
        }
    }
}

/// Resolves every CU-local ([`ReferenceScope::Local`]) reference in
/// `tree` against that same CU's own DIE offsets. Run immediately after
/// a compile unit's tree is built, before any other CU has necessarily
/// been parsed.
pub fn validate_local_references(tree: &DieTree, diagnostics: &mut Diagnostics) {
    let offsets: HashSet<u64> = tree.offsets().collect();
    for die in &tree.dies {
        for (attribute, value) in &die.attributes {
            if let AttributeValue::Reference {
                target,
                scope: ReferenceScope::Local,
            } = value
            {
                if !offsets.contains(target) {
                    diagnostics.error(
                        Category::DIE_REL | Category::IMPACT_4,
                        Locus::section(SectionId::DebugInfo)
                            .with_die(die.offset)
                            .with_attribute(attribute.name().unwrap_or("DW_AT_unknown")),
                        format!("CU-local reference targets offset {target:#x}, which is not the start of any DIE in this compile unit"),
                    );
                }
            }
        }
    }
}

/// Resolves every global ([`ReferenceScope::Global`], i.e.
/// `DW_FORM_ref_addr`) reference in `tree` against `all_die_offsets` —
/// the union across every compile unit in the object. Also flags a
/// `DW_FORM_ref_addr` whose target happens to land inside `cu_range`,
/// the referencing DIE's own compile unit: that reference should have
/// been encoded with a CU-relative form instead.
pub fn validate_global_references(
    tree: &DieTree,
    cu_range: std::ops::Range<u64>,
    all_die_offsets: &HashSet<u64>,
    diagnostics: &mut Diagnostics,
) {
    for die in &tree.dies {
        for (attribute, value) in &die.attributes {
            if let AttributeValue::Reference {
                target,
                scope: ReferenceScope::Global,
            } = value
            {
                let locus = || {
                    Locus::section(SectionId::DebugInfo)
                        .with_die(die.offset)
                        .with_attribute(attribute.name().unwrap_or("DW_AT_unknown"))
                };
                if !all_die_offsets.contains(target) {
                    diagnostics.error(
                        Category::DIE_REL | Category::IMPACT_4,
                        locus(),
                        format!("reference targets offset {target:#x}, which is not the start of any DIE"),
                    );
                } else if cu_range.contains(target) {
                    diagnostics.emit(
                        Category::DIE_REL | Category::BLOAT,
                        locus(),
                        "CU-local reference emitted as DW_FORM_ref_addr instead of a CU-relative form",
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{default_accept, default_error_criteria, default_reject};
    use crate::relocation::RelocationRecord;
    use crate::section::{AddressWidth, Endian, OffsetSize};

    fn diagnostics() -> Diagnostics {
        Diagnostics::new(default_accept(), default_reject(), default_error_criteria())
    }

    fn no_relocations() -> Vec<RelocationRecord> {
        Vec::new()
    }

    fn header() -> CompileUnitHeader {
        CompileUnitHeader {
            offset: 0,
            unit_length: 0,
            offset_size: OffsetSize::Four,
            version: 3,
            debug_abbrev_offset: 0,
            address_size: AddressWidth::Eight,
            header_end: 11,
            unit_end: 64,
        }
    }

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

    /// Builds a two-entry abbreviation table via the real parser: code 1
    /// is a childful `DW_TAG_compile_unit` with no attributes, code 2 is
    /// a childless `DW_TAG_subprogram` carrying `DW_AT_sibling`.
    fn abbrev_table_with_children_and_sibling() -> AbbrevTable {
        let mut bytes = Vec::new();
        bytes.extend(leb(1));
        bytes.extend(leb(DwTag::COMPILE_UNIT.0));
        bytes.push(1);
        bytes.extend(leb(0));
        bytes.extend(leb(0));

        bytes.extend(leb(2));
        bytes.extend(leb(DwTag::SUBPROGRAM.0));
        bytes.push(0);
        bytes.extend(leb(DwAttribute::SIBLING.0));
        bytes.extend(leb(DwForm::REF4.0));
        bytes.extend(leb(0));
        bytes.extend(leb(0));
        bytes.push(0);

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        crate::abbrev::parse_abbrev_table(&mut reader, &mut diags, 0)
    }

    #[test]
    fn builds_flat_tree_with_parent_child_links() {
        let abbrevs = abbrev_table_with_children_and_sibling();
        let mut bytes = Vec::new();
        bytes.extend(leb(1)); // root: DW_TAG_compile_unit
        bytes.extend(leb(2)); // child: DW_TAG_subprogram
        bytes.extend(10u32.to_le_bytes()); // DW_AT_sibling value (wrong on purpose below)
        bytes.push(0); // end of children

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut h = header();
        h.unit_end = bytes.len() as u64;
        let mut diags = diagnostics();
        let relocs = no_relocations();
        let mut cursor = RelocationCursor::new(&relocs);
        let symbols = SymbolTable::new(vec![]);
        let tree = parse_die_tree(&mut reader, &abbrevs, &h, &mut cursor, &symbols, &mut diags).unwrap();

        assert_eq!(tree.dies.len(), 2);
        assert_eq!(tree.dies[0].children, vec![1]);
        assert_eq!(tree.dies[1].parent, Some(0));
        assert!(abbrevs.is_table_used());
        assert!(abbrevs.is_used(1));
        assert!(abbrevs.is_used(2));
    }

    #[test]
    fn flags_incorrect_sibling_value() {
        let abbrevs = abbrev_table_with_children_and_sibling();
        let mut bytes = Vec::new();
        bytes.extend(leb(1));
        bytes.extend(leb(2));
        bytes.extend(999u32.to_le_bytes()); // deliberately wrong sibling offset
        bytes.push(0);

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut h = header();
        h.unit_end = bytes.len() as u64;
        let mut diags = diagnostics();
        let relocs = no_relocations();
        let mut cursor = RelocationCursor::new(&relocs);
        let symbols = SymbolTable::new(vec![]);
        parse_die_tree(&mut reader, &abbrevs, &h, &mut cursor, &symbols, &mut diags).unwrap();

        assert!(diags.diagnostics().iter().any(|d| d.message.contains("next sibling actually starts at")));
    }

    #[test]
    fn sibling_chain_ending_without_reaching_target_is_an_error() {
        let abbrevs = abbrev_table_with_children_and_sibling();
        let mut bytes = Vec::new();
        bytes.extend(leb(1)); // root
        bytes.extend(leb(2)); // childless sibling-bearing DIE
        bytes.extend(50u32.to_le_bytes());
        // deliberately no closing zero for the root's children: the
        // reader runs out at unit_end with the chain still open.

        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut h = header();
        h.unit_end = bytes.len() as u64;
        let mut diags = diagnostics();
        let relocs = no_relocations();
        let mut cursor = RelocationCursor::new(&relocs);
        let symbols = SymbolTable::new(vec![]);
        parse_die_tree(&mut reader, &abbrevs, &h, &mut cursor, &symbols, &mut diags).unwrap();

        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("sibling chain ended before reaching it")));
    }

    #[test]
    fn unknown_abbrev_code_is_fatal() {
        let abbrevs = abbrev_table_with_children_and_sibling();
        let mut bytes = Vec::new();
        bytes.extend(leb(99));
        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut h = header();
        h.unit_end = bytes.len() as u64;
        let mut diags = diagnostics();
        let relocs = no_relocations();
        let mut cursor = RelocationCursor::new(&relocs);
        let symbols = SymbolTable::new(vec![]);
        let result = parse_die_tree(&mut reader, &abbrevs, &h, &mut cursor, &symbols, &mut diags);
        assert_eq!(result.unwrap_err(), DieError::UnknownAbbrevCode(99));
    }

    #[test]
    fn root_tag_other_than_compile_or_partial_unit_is_flagged() {
        let mut bytes = Vec::new();
        bytes.extend(leb(1));
        bytes.extend(leb(DwTag::SUBPROGRAM.0));
        bytes.push(0);
        bytes.extend(leb(0));
        bytes.extend(leb(0));
        bytes.push(0);
        let mut reader = Reader::new(&bytes, Endian::Little);
        let mut diags = diagnostics();
        let abbrevs = crate::abbrev::parse_abbrev_table(&mut reader, &mut diags, 0);

        let mut die_bytes = leb(1);
        let mut reader = Reader::new(&die_bytes, Endian::Little);
        let mut h = header();
        h.unit_end = die_bytes.len() as u64;
        let mut diags = diagnostics();
        let relocs = no_relocations();
        let mut cursor = RelocationCursor::new(&relocs);
        let symbols = SymbolTable::new(vec![]);
        parse_die_tree(&mut reader, &abbrevs, &h, &mut cursor, &symbols, &mut diags).unwrap();

        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("neither DW_TAG_compile_unit nor DW_TAG_partial_unit")));
    }

    #[test]
    fn dangling_local_reference_is_flagged() {
        let mut dies = Vec::new();
        dies.push(Die {
            offset: 0,
            tag: DwTag::COMPILE_UNIT,
            parent: None,
            children: vec![],
            attributes: vec![(
                DwAttribute::TYPE,
                AttributeValue::Reference {
                    target: 0x999,
                    scope: ReferenceScope::Local,
                },
            )],
            has_children: false,
            next_sibling_offset: None,
        });
        let tree = DieTree { dies, pc_coverage: Coverage::new() };
        let mut diags = diagnostics();
        validate_local_references(&tree, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn global_reference_into_own_cu_is_flagged_as_formed_global() {
        let mut dies = Vec::new();
        dies.push(Die {
            offset: 0,
            tag: DwTag::COMPILE_UNIT,
            parent: None,
            children: vec![],
            attributes: vec![(
                DwAttribute::TYPE,
                AttributeValue::Reference {
                    target: 0x10,
                    scope: ReferenceScope::Global,
                },
            )],
            has_children: false,
            next_sibling_offset: None,
        });
        let tree = DieTree { dies, pc_coverage: Coverage::new() };
        let known: HashSet<u64> = [0u64, 0x10].into_iter().collect();
        let mut diags = diagnostics();
        validate_global_references(&tree, 0..0x40, &known, &mut diags);
        assert!(diags.diagnostics().iter().any(|d| d.message.contains("emitted as DW_FORM_ref_addr")));
    }
}
