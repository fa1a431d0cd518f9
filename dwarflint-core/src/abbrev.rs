//! Parsing and validating `.debug_abbrev` tables.
//!
//! An abbreviation table is a sequence of `(code, tag, has_children,
//! attribute/form pairs...)` entries terminated by a zero code. Reading
//! it is mechanical; the interesting part is the handful of structural
//! rules a well-formed table is expected to satisfy that nothing in the
//! byte format itself enforces — a duplicate code silently shadows the
//! first definition, a `DW_AT_sibling` on a childless abbreviation can
//! never be followed, and `DW_AT_low_pc` without `DW_AT_high_pc` (or vice
//! versa) can never be range-checked.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use indexmap::IndexMap;

use crate::diagnostics::{Category, Diagnostics};
use crate::dwarf_version::{base_class, DwAttribute, DwForm, FormClass};
use crate::locus::Locus;
use crate::reader::Reader;
use crate::section::SectionId;

/// A `DW_TAG_*` tag code, kept open the same way [`DwAttribute`] is:
/// `DW_TAG_lo_user..=DW_TAG_hi_user` is a reserved vendor range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DwTag(pub u64);

impl DwTag {
    pub const ARRAY_TYPE: DwTag = DwTag(0x01);
    pub const CLASS_TYPE: DwTag = DwTag(0x02);
    pub const ENTRY_POINT: DwTag = DwTag(0x03);
    pub const ENUMERATION_TYPE: DwTag = DwTag(0x04);
    pub const FORMAL_PARAMETER: DwTag = DwTag(0x05);
    pub const IMPORTED_DECLARATION: DwTag = DwTag(0x08);
    pub const LABEL: DwTag = DwTag(0x0a);
    pub const LEXICAL_BLOCK: DwTag = DwTag(0x0b);
    pub const MEMBER: DwTag = DwTag(0x0d);
    pub const POINTER_TYPE: DwTag = DwTag(0x0f);
    pub const REFERENCE_TYPE: DwTag = DwTag(0x10);
    pub const COMPILE_UNIT: DwTag = DwTag(0x11);
    pub const STRUCTURE_TYPE: DwTag = DwTag(0x13);
    pub const SUBROUTINE_TYPE: DwTag = DwTag(0x15);
    pub const TYPEDEF: DwTag = DwTag(0x16);
    pub const UNION_TYPE: DwTag = DwTag(0x17);
    pub const UNSPECIFIED_PARAMETERS: DwTag = DwTag(0x18);
    pub const VARIANT: DwTag = DwTag(0x19);
    pub const INHERITANCE: DwTag = DwTag(0x1c);
    pub const SUBRANGE_TYPE: DwTag = DwTag(0x21);
    pub const BASE_TYPE: DwTag = DwTag(0x24);
    pub const CONST_TYPE: DwTag = DwTag(0x26);
    pub const ENUMERATOR: DwTag = DwTag(0x28);
    pub const SUBPROGRAM: DwTag = DwTag(0x2e);
    pub const PARTIAL_UNIT: DwTag = DwTag(0x3c);
    pub const VARIABLE: DwTag = DwTag(0x34);
    pub const VOLATILE_TYPE: DwTag = DwTag(0x35);
    pub const NAMESPACE: DwTag = DwTag(0x39);

    pub const LO_USER: u64 = 0x4080;
    pub const HI_USER: u64 = 0xffff;

    pub fn is_vendor_extension(self) -> bool {
        (Self::LO_USER..=Self::HI_USER).contains(&self.0)
    }
}

/// One `(attribute, form)` pair in an abbreviation's attribute list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbbrevAttribute {
    pub attribute: DwAttribute,
    pub form: DwForm,
}

/// One abbreviation entry: the tag it stands for, whether DIEs using it
/// have children, and the ordered attribute/form list every DIE
/// referencing this code carries.
#[derive(Debug, Clone)]
pub struct Abbreviation {
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<AbbrevAttribute>,
    pub offset: u64,
}

impl Abbreviation {
    pub fn form_of(&self, attribute: DwAttribute) -> Option<DwForm> {
        self.attributes
            .iter()
            .find(|a| a.attribute == attribute)
            .map(|a| a.form)
    }

    pub fn has_attribute(&self, attribute: DwAttribute) -> bool {
        self.form_of(attribute).is_some()
    }
}

/// A fully parsed `.debug_abbrev` table, keyed by abbreviation code.
/// Preserves encounter order (via [`IndexMap`]) so diagnostics that walk
/// "every abbreviation in this table" report in file order.
///
/// `used`/`table_used` are touched while a DIE tree is walked against
/// this table, not while the table itself is parsed — they start out
/// empty and are filled in by whichever CU walk consults the table via
/// [`AbbrevTable::mark_used`]/[`AbbrevTable::mark_table_used`]. Interior
/// mutability lets a table shared read-only across several CUs (via the
/// `debug_abbrev_offset` cache) still record who touched it.
#[derive(Debug, Clone, Default)]
pub struct AbbrevTable {
    pub offset: u64,
    entries: IndexMap<u64, Abbreviation>,
    used: RefCell<HashSet<u64>>,
    table_used: Cell<bool>,
}

impl AbbrevTable {
    pub fn get(&self, code: u64) -> Option<&Abbreviation> {
        self.entries.get(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Abbreviation> {
        self.entries.values()
    }

    pub fn mark_used(&self, code: u64) {
        self.used.borrow_mut().insert(code);
    }

    pub fn is_used(&self, code: u64) -> bool {
        self.used.borrow().contains(&code)
    }

    pub fn mark_table_used(&self) {
        self.table_used.set(true);
    }

    pub fn is_table_used(&self) -> bool {
        self.table_used.get()
    }
}

/// Parses the abbreviation table starting at the reader's current
/// position, which must already be positioned at `table_offset` within
/// `.debug_abbrev`. Consumes entries until a zero code or end of section,
/// checking each entry's structural well-formedness along the way.
pub fn parse_abbrev_table(reader: &mut Reader<'_>, diagnostics: &mut Diagnostics, table_offset: u64) -> AbbrevTable {
    let mut table = AbbrevTable {
        offset: table_offset,
        entries: IndexMap::new(),
        used: RefCell::new(HashSet::new()),
        table_used: Cell::new(false),
    };

    let mut first_code = true;

    loop {
        let entry_offset = reader.offset();
        let code = match reader.read_uleb128() {
            Ok(v) => v.value,
            Err(_) => {
                diagnostics.error(
                    Category::ABBREVS | Category::IMPACT_4,
                    Locus::section(SectionId::DebugAbbrev).with_table(table_offset).with_offset(entry_offset),
                    "truncated abbreviation table",
                );
                break;
            }
        };
        if code == 0 {
            if first_code {
                diagnostics.emit(
                    Category::ABBREVS | Category::SUBOPTIMAL,
                    Locus::section(SectionId::DebugAbbrev).with_table(table_offset).with_offset(entry_offset),
                    "abbreviation table starts with a zero code; an entirely empty table is padding no compile unit should reference",
                );
            }
            break;
        }
        first_code = false;

        let locus = || {
            Locus::section(SectionId::DebugAbbrev)
                .with_table(table_offset)
                .with_offset(entry_offset)
        };

        let tag_value = match reader.read_uleb128() {
            Ok(v) => v.value,
            Err(_) => {
                diagnostics.error(Category::ABBREVS | Category::IMPACT_4, locus(), "truncated abbreviation tag");
                break;
            }
        };
        let tag = DwTag(tag_value);
        if tag_value == 0 {
            diagnostics.error(Category::ABBREVS | Category::IMPACT_3, locus(), "abbreviation uses reserved tag 0");
        }
        if tag_value > DwTag::HI_USER {
            diagnostics.error(
                Category::ABBREVS | Category::IMPACT_3,
                locus(),
                format!("tag {tag_value:#x} exceeds DW_TAG_hi_user ({:#x})", DwTag::HI_USER),
            );
        }

        let has_children = match reader.read_u8() {
            Ok(b) => {
                if b > 1 {
                    diagnostics.emit(
                        Category::ABBREVS | Category::IMPACT_2,
                        locus(),
                        format!("children flag byte {b:#x} is neither DW_CHILDREN_no (0) nor DW_CHILDREN_yes (1)"),
                    );
                }
                b != 0
            }
            Err(_) => {
                diagnostics.error(Category::ABBREVS | Category::IMPACT_4, locus(), "truncated has_children byte");
                break;
            }
        };

        let mut attributes = Vec::new();
        let mut saw_low_pc = false;
        let mut saw_high_pc = false;
        let mut saw_ranges = false;
        let mut sibling_form = None;
        let mut sibling_seen = false;
        loop {
            let attr_value = match reader.read_uleb128() {
                Ok(v) => v.value,
                Err(_) => {
                    diagnostics.error(Category::ABBREVS | Category::IMPACT_4, locus(), "truncated attribute spec");
                    break;
                }
            };
            let form_value = match reader.read_uleb128() {
                Ok(v) => v.value,
                Err(_) => {
                    diagnostics.error(Category::ABBREVS | Category::IMPACT_4, locus(), "truncated form spec");
                    break;
                }
            };
            if attr_value == 0 && form_value == 0 {
                break;
            }
            if attr_value == 0 {
                // form_value != 0 here: a zero attribute name paired with a
                // non-zero form can't be the terminator, but it also names
                // no real attribute. Keep scanning the rest of the list
                // rather than treating it as truncation.
                diagnostics.error(
                    Category::ABBREVS | Category::IMPACT_3,
                    locus(),
                    format!("attribute spec has name 0 paired with non-zero form {form_value:#x}"),
                );
                continue;
            }

            let attribute = DwAttribute(attr_value);
            let form = DwForm(form_value);

            if form.name().is_none() {
                diagnostics.error(
                    Category::ABBREVS | Category::IMPACT_4,
                    locus(),
                    format!("attribute {attribute} uses unrecognized form {form_value:#x}"),
                );
                return table;
            }

            if attribute == DwAttribute::SIBLING {
                if sibling_seen {
                    diagnostics.error(
                        Category::ABBREVS | Category::IMPACT_3,
                        locus(),
                        "DW_AT_sibling repeated in the same abbreviation",
                    );
                }
                sibling_seen = true;
                sibling_form = Some(form);
                if form == DwForm::REF_ADDR || base_class(form) != Some(FormClass::Reference) {
                    diagnostics.error(
                        Category::ABBREVS | Category::IMPACT_3,
                        locus(),
                        format!("DW_AT_sibling uses unsuitable form {form}; a sibling must use a CU-relative reference form"),
                    );
                }
            } else if attributes.iter().any(|a: &AbbrevAttribute| a.attribute == attribute) {
                diagnostics.emit(
                    Category::ABBREVS | Category::IMPACT_2,
                    locus(),
                    format!("attribute {attribute} repeated in the same abbreviation"),
                );
            }

            if attribute == DwAttribute::LOW_PC {
                saw_low_pc = true;
            }
            if attribute == DwAttribute::HIGH_PC {
                saw_high_pc = true;
            }
            if attribute == DwAttribute::RANGES {
                saw_ranges = true;
            }

            attributes.push(AbbrevAttribute { attribute, form });
        }

        if saw_low_pc != saw_high_pc {
            diagnostics.emit(
                Category::ABBREVS | Category::IMPACT_2,
                locus(),
                "DW_AT_low_pc and DW_AT_high_pc must appear together",
            );
        }

        if saw_low_pc && saw_high_pc && saw_ranges {
            diagnostics.error(
                Category::ABBREVS | Category::IMPACT_3,
                locus(),
                "DW_AT_low_pc/DW_AT_high_pc and DW_AT_ranges both present; a DIE's extent must be described one way",
            );
        }

        if sibling_form.is_some() && !has_children {
            diagnostics.emit(
                Category::ABBREVS | Category::BLOAT,
                locus(),
                "DW_AT_sibling on a childless abbreviation can never be followed",
            );
        }

        if table.entries.contains_key(&code) {
            diagnostics.emit(
                Category::ABBREVS | Category::IMPACT_3,
                locus(),
                format!("abbreviation code {code} redefined, shadowing the earlier definition"),
            );
        }

        table.entries.insert(
            code,
            Abbreviation {
                code,
                tag,
                has_children,
                attributes,
                offset: entry_offset,
            },
        );
    }

    table
}
