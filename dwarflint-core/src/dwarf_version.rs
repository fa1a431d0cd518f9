//! Attribute and form identities, and the value-class dispatch table that
//! tells a checker how to interpret an attribute's encoded bytes.
//!
//! Attributes are kept as an open newtype rather than a closed enum:
//! `DW_AT_lo_user..=DW_AT_hi_user` is a reserved vendor-extension range a
//! producer is free to populate, so a `match` over every known attribute
//! can never be exhaustive in the way it could be for, say, a section
//! identity. Forms are a closed set in DWARF 2/3 (`DW_FORM_indirect`
//! aside, which forwards to another form read at parse time rather than
//! adding a new value space) so [`DwForm`] stays a newtype purely for
//! symmetry with [`DwAttribute`] and to share the `TryFrom<u64>` pattern.

use std::fmt;

/// A `DW_AT_*` attribute code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DwAttribute(pub u64);

impl DwAttribute {
    pub const SIBLING: DwAttribute = DwAttribute(0x01);
    pub const LOCATION: DwAttribute = DwAttribute(0x02);
    pub const NAME: DwAttribute = DwAttribute(0x03);
    pub const BYTE_SIZE: DwAttribute = DwAttribute(0x0b);
    pub const BIT_OFFSET: DwAttribute = DwAttribute(0x0c);
    pub const BIT_SIZE: DwAttribute = DwAttribute(0x0d);
    pub const STMT_LIST: DwAttribute = DwAttribute(0x10);
    pub const LOW_PC: DwAttribute = DwAttribute(0x11);
    pub const HIGH_PC: DwAttribute = DwAttribute(0x12);
    pub const LANGUAGE: DwAttribute = DwAttribute(0x13);
    pub const DISCR: DwAttribute = DwAttribute(0x15);
    pub const DISCR_VALUE: DwAttribute = DwAttribute(0x16);
    pub const VISIBILITY: DwAttribute = DwAttribute(0x17);
    pub const IMPORT: DwAttribute = DwAttribute(0x18);
    pub const STRING_LENGTH: DwAttribute = DwAttribute(0x19);
    pub const COMMON_REFERENCE: DwAttribute = DwAttribute(0x1a);
    pub const COMP_DIR: DwAttribute = DwAttribute(0x1b);
    pub const CONST_VALUE: DwAttribute = DwAttribute(0x1c);
    pub const CONTAINING_TYPE: DwAttribute = DwAttribute(0x1d);
    pub const DEFAULT_VALUE: DwAttribute = DwAttribute(0x1e);
    pub const INLINE: DwAttribute = DwAttribute(0x20);
    pub const IS_OPTIONAL: DwAttribute = DwAttribute(0x21);
    pub const LOWER_BOUND: DwAttribute = DwAttribute(0x22);
    pub const PRODUCER: DwAttribute = DwAttribute(0x25);
    pub const PROTOTYPED: DwAttribute = DwAttribute(0x27);
    pub const RETURN_ADDR: DwAttribute = DwAttribute(0x2a);
    pub const START_SCOPE: DwAttribute = DwAttribute(0x2c);
    pub const BIT_STRIDE: DwAttribute = DwAttribute(0x2e);
    pub const UPPER_BOUND: DwAttribute = DwAttribute(0x2f);
    pub const ABSTRACT_ORIGIN: DwAttribute = DwAttribute(0x31);
    pub const ACCESSIBILITY: DwAttribute = DwAttribute(0x32);
    pub const ADDRESS_CLASS: DwAttribute = DwAttribute(0x33);
    pub const ARTIFICIAL: DwAttribute = DwAttribute(0x34);
    pub const BASE_TYPES: DwAttribute = DwAttribute(0x35);
    pub const CALLING_CONVENTION: DwAttribute = DwAttribute(0x36);
    pub const COUNT: DwAttribute = DwAttribute(0x37);
    pub const DATA_MEMBER_LOCATION: DwAttribute = DwAttribute(0x38);
    pub const DECL_COLUMN: DwAttribute = DwAttribute(0x39);
    pub const DECL_FILE: DwAttribute = DwAttribute(0x3a);
    pub const DECL_LINE: DwAttribute = DwAttribute(0x3b);
    pub const DECLARATION: DwAttribute = DwAttribute(0x3c);
    pub const DISCR_LIST: DwAttribute = DwAttribute(0x3d);
    pub const ENCODING: DwAttribute = DwAttribute(0x3e);
    pub const EXTERNAL: DwAttribute = DwAttribute(0x3f);
    pub const FRAME_BASE: DwAttribute = DwAttribute(0x40);
    pub const FRIEND: DwAttribute = DwAttribute(0x41);
    pub const IDENTIFIER_CASE: DwAttribute = DwAttribute(0x42);
    pub const MACRO_INFO: DwAttribute = DwAttribute(0x43);
    pub const NAMELIST_ITEM: DwAttribute = DwAttribute(0x44);
    pub const PRIORITY: DwAttribute = DwAttribute(0x45);
    pub const SEGMENT: DwAttribute = DwAttribute(0x46);
    pub const SPECIFICATION: DwAttribute = DwAttribute(0x47);
    pub const STATIC_LINK: DwAttribute = DwAttribute(0x48);
    pub const TYPE: DwAttribute = DwAttribute(0x49);
    pub const USE_LOCATION: DwAttribute = DwAttribute(0x4a);
    pub const VARIABLE_PARAMETER: DwAttribute = DwAttribute(0x4b);
    pub const VIRTUALITY: DwAttribute = DwAttribute(0x4c);
    pub const VTABLE_ELEM_LOCATION: DwAttribute = DwAttribute(0x4d);
    pub const ALLOCATED: DwAttribute = DwAttribute(0x4e);
    pub const ASSOCIATED: DwAttribute = DwAttribute(0x4f);
    pub const DATA_LOCATION: DwAttribute = DwAttribute(0x50);
    pub const BYTE_STRIDE: DwAttribute = DwAttribute(0x51);
    pub const ENTRY_PC: DwAttribute = DwAttribute(0x52);
    pub const USE_UTF8: DwAttribute = DwAttribute(0x53);
    pub const EXTENSION: DwAttribute = DwAttribute(0x54);
    pub const RANGES: DwAttribute = DwAttribute(0x55);
    pub const TRAMPOLINE: DwAttribute = DwAttribute(0x56);
    pub const CALL_COLUMN: DwAttribute = DwAttribute(0x57);
    pub const CALL_FILE: DwAttribute = DwAttribute(0x58);
    pub const CALL_LINE: DwAttribute = DwAttribute(0x59);

    pub const LO_USER: u64 = 0x2000;
    pub const HI_USER: u64 = 0x3fff;

    pub fn is_vendor_extension(self) -> bool {
        (Self::LO_USER..=Self::HI_USER).contains(&self.0)
    }

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::SIBLING => "DW_AT_sibling",
            Self::LOCATION => "DW_AT_location",
            Self::NAME => "DW_AT_name",
            Self::BYTE_SIZE => "DW_AT_byte_size",
            Self::BIT_OFFSET => "DW_AT_bit_offset",
            Self::BIT_SIZE => "DW_AT_bit_size",
            Self::STMT_LIST => "DW_AT_stmt_list",
            Self::LOW_PC => "DW_AT_low_pc",
            Self::HIGH_PC => "DW_AT_high_pc",
            Self::LANGUAGE => "DW_AT_language",
            Self::DISCR => "DW_AT_discr",
            Self::DISCR_VALUE => "DW_AT_discr_value",
            Self::VISIBILITY => "DW_AT_visibility",
            Self::IMPORT => "DW_AT_import",
            Self::STRING_LENGTH => "DW_AT_string_length",
            Self::COMMON_REFERENCE => "DW_AT_common_reference",
            Self::COMP_DIR => "DW_AT_comp_dir",
            Self::CONST_VALUE => "DW_AT_const_value",
            Self::CONTAINING_TYPE => "DW_AT_containing_type",
            Self::DEFAULT_VALUE => "DW_AT_default_value",
            Self::INLINE => "DW_AT_inline",
            Self::IS_OPTIONAL => "DW_AT_is_optional",
            Self::LOWER_BOUND => "DW_AT_lower_bound",
            Self::PRODUCER => "DW_AT_producer",
            Self::PROTOTYPED => "DW_AT_prototyped",
            Self::RETURN_ADDR => "DW_AT_return_addr",
            Self::START_SCOPE => "DW_AT_start_scope",
            Self::BIT_STRIDE => "DW_AT_bit_stride",
            Self::UPPER_BOUND => "DW_AT_upper_bound",
            Self::ABSTRACT_ORIGIN => "DW_AT_abstract_origin",
            Self::ACCESSIBILITY => "DW_AT_accessibility",
            Self::ADDRESS_CLASS => "DW_AT_address_class",
            Self::ARTIFICIAL => "DW_AT_artificial",
            Self::BASE_TYPES => "DW_AT_base_types",
            Self::CALLING_CONVENTION => "DW_AT_calling_convention",
            Self::COUNT => "DW_AT_count",
            Self::DATA_MEMBER_LOCATION => "DW_AT_data_member_location",
            Self::DECL_COLUMN => "DW_AT_decl_column",
            Self::DECL_FILE => "DW_AT_decl_file",
            Self::DECL_LINE => "DW_AT_decl_line",
            Self::DECLARATION => "DW_AT_declaration",
            Self::DISCR_LIST => "DW_AT_discr_list",
            Self::ENCODING => "DW_AT_encoding",
            Self::EXTERNAL => "DW_AT_external",
            Self::FRAME_BASE => "DW_AT_frame_base",
            Self::FRIEND => "DW_AT_friend",
            Self::IDENTIFIER_CASE => "DW_AT_identifier_case",
            Self::MACRO_INFO => "DW_AT_macro_info",
            Self::NAMELIST_ITEM => "DW_AT_namelist_item",
            Self::PRIORITY => "DW_AT_priority",
            Self::SEGMENT => "DW_AT_segment",
            Self::SPECIFICATION => "DW_AT_specification",
            Self::STATIC_LINK => "DW_AT_static_link",
            Self::TYPE => "DW_AT_type",
            Self::USE_LOCATION => "DW_AT_use_location",
            Self::VARIABLE_PARAMETER => "DW_AT_variable_parameter",
            Self::VIRTUALITY => "DW_AT_virtuality",
            Self::VTABLE_ELEM_LOCATION => "DW_AT_vtable_elem_location",
            Self::ALLOCATED => "DW_AT_allocated",
            Self::ASSOCIATED => "DW_AT_associated",
            Self::DATA_LOCATION => "DW_AT_data_location",
            Self::BYTE_STRIDE => "DW_AT_byte_stride",
            Self::ENTRY_PC => "DW_AT_entry_pc",
            Self::USE_UTF8 => "DW_AT_use_UTF8",
            Self::EXTENSION => "DW_AT_extension",
            Self::RANGES => "DW_AT_ranges",
            Self::TRAMPOLINE => "DW_AT_trampoline",
            Self::CALL_COLUMN => "DW_AT_call_column",
            Self::CALL_FILE => "DW_AT_call_file",
            Self::CALL_LINE => "DW_AT_call_line",
            _ => return None,
        })
    }
}

impl fmt::Display for DwAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None if self.is_vendor_extension() => write!(f, "DW_AT_user_{:#x}", self.0),
            None => write!(f, "DW_AT_unknown_{:#x}", self.0),
        }
    }
}

/// A `DW_FORM_*` form code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DwForm(pub u64);

impl DwForm {
    pub const ADDR: DwForm = DwForm(0x01);
    pub const BLOCK2: DwForm = DwForm(0x03);
    pub const BLOCK4: DwForm = DwForm(0x04);
    pub const DATA2: DwForm = DwForm(0x05);
    pub const DATA4: DwForm = DwForm(0x06);
    pub const DATA8: DwForm = DwForm(0x07);
    pub const STRING: DwForm = DwForm(0x08);
    pub const BLOCK: DwForm = DwForm(0x09);
    pub const BLOCK1: DwForm = DwForm(0x0a);
    pub const DATA1: DwForm = DwForm(0x0b);
    pub const FLAG: DwForm = DwForm(0x0c);
    pub const SDATA: DwForm = DwForm(0x0d);
    pub const STRP: DwForm = DwForm(0x0e);
    pub const UDATA: DwForm = DwForm(0x0f);
    pub const REF_ADDR: DwForm = DwForm(0x10);
    pub const REF1: DwForm = DwForm(0x11);
    pub const REF2: DwForm = DwForm(0x12);
    pub const REF4: DwForm = DwForm(0x13);
    pub const REF8: DwForm = DwForm(0x14);
    pub const REF_UDATA: DwForm = DwForm(0x15);
    pub const INDIRECT: DwForm = DwForm(0x16);

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::ADDR => "DW_FORM_addr",
            Self::BLOCK2 => "DW_FORM_block2",
            Self::BLOCK4 => "DW_FORM_block4",
            Self::DATA2 => "DW_FORM_data2",
            Self::DATA4 => "DW_FORM_data4",
            Self::DATA8 => "DW_FORM_data8",
            Self::STRING => "DW_FORM_string",
            Self::BLOCK => "DW_FORM_block",
            Self::BLOCK1 => "DW_FORM_block1",
            Self::DATA1 => "DW_FORM_data1",
            Self::FLAG => "DW_FORM_flag",
            Self::SDATA => "DW_FORM_sdata",
            Self::STRP => "DW_FORM_strp",
            Self::UDATA => "DW_FORM_udata",
            Self::REF_ADDR => "DW_FORM_ref_addr",
            Self::REF1 => "DW_FORM_ref1",
            Self::REF2 => "DW_FORM_ref2",
            Self::REF4 => "DW_FORM_ref4",
            Self::REF8 => "DW_FORM_ref8",
            Self::REF_UDATA => "DW_FORM_ref_udata",
            Self::INDIRECT => "DW_FORM_indirect",
            _ => return None,
        })
    }

    /// True for the fixed-width reference forms whose byte width is
    /// implied by the form itself rather than needing a LEB128 read.
    pub fn fixed_ref_width(self) -> Option<u8> {
        match self {
            Self::REF1 => Some(1),
            Self::REF2 => Some(2),
            Self::REF4 => Some(4),
            Self::REF8 => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for DwForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "DW_FORM_unknown_{:#x}", self.0),
        }
    }
}

/// How an attribute's encoded value should be interpreted once read,
/// independent of which form happened to carry it. A handful of forms
/// (`data4`/`data8`) are ambiguous on their own and resolve to a class
/// only once the attribute they appear on is also known — see
/// [`offset_class_for_attribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormClass {
    Address,
    Block,
    Constant,
    Flag,
    LinePtr,
    LocListPtr,
    MacPtr,
    RangeListPtr,
    Reference,
    String,
}

/// The base class implied by a form alone, for every form that isn't
/// ambiguous. `DW_FORM_data4`/`DW_FORM_data8` return `Constant` here;
/// callers that need the section-offset reading for those two forms
/// must additionally consult [`offset_class_for_attribute`].
pub fn base_class(form: DwForm) -> Option<FormClass> {
    Some(match form {
        DwForm::ADDR => FormClass::Address,
        DwForm::BLOCK1 | DwForm::BLOCK2 | DwForm::BLOCK4 | DwForm::BLOCK => FormClass::Block,
        DwForm::DATA1 | DwForm::DATA2 | DwForm::DATA4 | DwForm::DATA8 | DwForm::SDATA | DwForm::UDATA => {
            FormClass::Constant
        }
        DwForm::STRING | DwForm::STRP => FormClass::String,
        DwForm::FLAG => FormClass::Flag,
        DwForm::REF1
        | DwForm::REF2
        | DwForm::REF4
        | DwForm::REF8
        | DwForm::REF_UDATA
        | DwForm::REF_ADDR => FormClass::Reference,
        _ => return None,
    })
}

/// Reclassifies a `DW_FORM_data4`/`DW_FORM_data8` value as a section
/// offset pointer when it sits on one of the attributes DWARF 2/3
/// defines as using that encoding. Every other attribute keeps the
/// form's base `Constant` class — this rewrite does not generalize the
/// special case to attributes the format does not define it for.
pub fn offset_class_for_attribute(attribute: DwAttribute, form: DwForm) -> Option<FormClass> {
    if form != DwForm::DATA4 && form != DwForm::DATA8 {
        return None;
    }
    Some(match attribute {
        DwAttribute::STMT_LIST => FormClass::LinePtr,
        DwAttribute::LOCATION => FormClass::LocListPtr,
        DwAttribute::RANGES => FormClass::RangeListPtr,
        DwAttribute::START_SCOPE => FormClass::RangeListPtr,
        DwAttribute::MACRO_INFO => FormClass::MacPtr,
        _ => return None,
    })
}

/// Full class resolution for an attribute/form pair: tries the
/// attribute-specific offset reclassification first, falls back to the
/// form's own base class.
pub fn resolve_class(attribute: DwAttribute, form: DwForm) -> Option<FormClass> {
    offset_class_for_attribute(attribute, form).or_else(|| base_class(form))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_attribute_displays_its_dwarf_name() {
        assert_eq!(DwAttribute::NAME.to_string(), "DW_AT_name");
    }

    #[test]
    fn vendor_extension_attribute_displays_as_user() {
        let attr = DwAttribute(0x2010);
        assert!(attr.is_vendor_extension());
        assert_eq!(attr.to_string(), "DW_AT_user_0x2010");
    }

    #[test]
    fn data4_on_stmt_list_resolves_to_lineptr() {
        let class = resolve_class(DwAttribute::STMT_LIST, DwForm::DATA4);
        assert_eq!(class, Some(FormClass::LinePtr));
    }

    #[test]
    fn data4_on_unrelated_attribute_stays_constant() {
        let class = resolve_class(DwAttribute::COUNT, DwForm::DATA4);
        assert_eq!(class, Some(FormClass::Constant));
    }

    #[test]
    fn location_as_block_form_is_not_a_loclistptr() {
        // DW_AT_location can also be an inline DW_FORM_block exprloc;
        // only the data4/data8 encoding means "pointer into .debug_loc".
        let class = resolve_class(DwAttribute::LOCATION, DwForm::BLOCK1);
        assert_eq!(class, Some(FormClass::Block));
    }

    #[test]
    fn fixed_ref_width_is_known_for_ref_forms() {
        assert_eq!(DwForm::REF4.fixed_ref_width(), Some(4));
        assert_eq!(DwForm::REF_UDATA.fixed_ref_width(), None);
    }
}
