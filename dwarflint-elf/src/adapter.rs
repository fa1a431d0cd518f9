//! Turns a parsed ELF object into the plain `(bytes, endianness, address
//! width, relocations, symbols)` shape `dwarflint-core` consumes,
//! pairing each `SHT_REL`/`SHT_RELA` section with the section it patches
//! via `sh_info`, and reducing the symbol table down to what resolving a
//! relocation target needs.

use goblin::elf::section_header::{SHF_COMPRESSED, SHN_ABS, SHN_COMMON, SHN_UNDEF, SHN_XINDEX, SHT_NOBITS, SHT_REL, SHT_RELA};
use goblin::elf::{Elf, SectionHeader};

use dwarflint_core::input::{ObjectInput, SectionView, SymbolEntry, SymbolTable};
use dwarflint_core::relocation::{RelocationRecord, TargetKind};
use dwarflint_core::section::{AddressWidth, Endian, SectionId};

use crate::error::{ElfError, ElfErrorKind};

/// A parsed ELF object, still borrowing the bytes it was built from.
/// Building the checker's [`ObjectInput`] is split out as its own method
/// rather than folded into `parse` so a caller that only wants to report
/// on the container itself (is this relocatable? what address size?)
/// doesn't have to pay for section/symbol extraction it won't use.
pub struct ElfObject<'d> {
    elf: Elf<'d>,
    data: &'d [u8],
}

impl<'d> ElfObject<'d> {
    pub fn parse(data: &'d [u8]) -> Result<Self, ElfError> {
        let elf = Elf::parse(data)?;
        Ok(ElfObject { elf, data })
    }

    pub fn is_relocatable(&self) -> bool {
        self.elf.header.e_type == goblin::elf::header::ET_REL
    }

    pub fn address_size(&self) -> AddressWidth {
        if self.elf.is_64 {
            AddressWidth::Eight
        } else {
            AddressWidth::Four
        }
    }

    pub fn endian(&self) -> Endian {
        if self.elf.little_endian {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    /// Builds the checker's view of this object: every recognized debug
    /// section present, with its relocations resolved and its symbol
    /// table reduced to what applying them needs.
    pub fn build_input(&self) -> Result<ObjectInput<'d>, ElfError> {
        let address_size = self.address_size();
        let endian = self.endian();
        let symbols = self.build_symbol_table();

        let mut input = ObjectInput::new(self.is_relocatable(), symbols);
        for id in SectionId::ALL {
            if let Some(view) = self.section_view(id, address_size, endian)? {
                input.insert_section(view);
            }
        }
        Ok(input)
    }

    fn section_name(&self, header: &SectionHeader) -> Option<&'d str> {
        self.elf.shdr_strtab.get_at(header.sh_name)
    }

    fn section_index(&self, id: SectionId) -> Option<usize> {
        self.elf
            .section_headers
            .iter()
            .position(|header| self.section_name(header) == Some(id.elf_name()))
    }

    fn section_view(&self, id: SectionId, address_size: AddressWidth, endian: Endian) -> Result<Option<SectionView<'d>>, ElfError> {
        let Some(index) = self.section_index(id) else {
            return Ok(None);
        };
        let header = &self.elf.section_headers[index];

        // dsymutil and some strip implementations leave phantom section
        // headers with their offset zeroed out after dropping the data;
        // no real section ever starts at file offset zero.
        if header.sh_type == SHT_NOBITS || header.sh_offset == 0 || header.sh_size == 0 {
            return Ok(None);
        }

        if header.sh_flags & u64::from(SHF_COMPRESSED) != 0 {
            // No decompressor is wired into this crate; surface the
            // section as absent rather than feeding the checker
            // compressed bytes it would misread as DWARF.
            tracing::warn!(section = %id, "section is compressed; skipping (no decompressor available)");
            return Ok(None);
        }

        let start = header.sh_offset as usize;
        let end = start + header.sh_size as usize;
        let Some(data) = self.data.get(start..end) else {
            return Err(ElfError::new(ElfErrorKind::MalformedHeader, InvalidSectionBounds));
        };

        let relocations = self.relocations_for(index);
        let view = SectionView::new(id, data, endian, address_size).with_relocations(relocations);
        Ok(Some(view))
    }

    fn relocations_for(&self, target_section_index: usize) -> Vec<RelocationRecord> {
        // `shdr_relocs` is keyed by each SHT_REL/SHT_RELA section's own
        // index, not the section it patches; that pairing lives in the
        // relocation section's own `sh_info`.
        let Some(reloc_section_index) = self.elf.section_headers.iter().position(|header| {
            (header.sh_type == SHT_REL || header.sh_type == SHT_RELA) && header.sh_info as usize == target_section_index
        }) else {
            return Vec::new();
        };
        let Some((_, relocs)) = self.elf.shdr_relocs.iter().find(|(idx, _)| *idx == reloc_section_index) else {
            return Vec::new();
        };

        let mut records: Vec<RelocationRecord> = relocs
            .iter()
            .map(|reloc| {
                let symbol_index = reloc.r_sym as u32;
                let addend = reloc.r_addend.unwrap_or_else(|| {
                    let width = self.address_size().bytes();
                    self.implicit_addend(reloc.r_offset, width)
                });
                RelocationRecord {
                    offset: reloc.r_offset,
                    symbol_index,
                    addend,
                    target: self.classify_target(symbol_index),
                }
            })
            .collect();
        records.sort_by_key(|r| r.offset);
        records
    }

    /// `SHT_REL` (as opposed to `SHT_RELA`) carries no explicit addend;
    /// the linker is expected to read it out of the bytes the relocation
    /// itself patches.
    fn implicit_addend(&self, offset: u64, width: u8) -> i64 {
        let start = offset as usize;
        let Some(bytes) = self.data.get(start..start + width as usize) else {
            return 0;
        };
        let value = match (width, self.elf.little_endian) {
            (4, true) => u32::from_le_bytes(bytes.try_into().unwrap()) as u64,
            (4, false) => u32::from_be_bytes(bytes.try_into().unwrap()) as u64,
            (8, true) => u64::from_le_bytes(bytes.try_into().unwrap()),
            (8, false) => u64::from_be_bytes(bytes.try_into().unwrap()),
            _ => 0,
        };
        value as i64
    }

    fn classify_target(&self, symbol_index: u32) -> TargetKind {
        let Some(sym) = self.elf.syms.iter().nth(symbol_index as usize) else {
            return TargetKind::Value;
        };
        if sym.st_shndx == SHN_ABS as usize || sym.st_shndx == SHN_UNDEF as usize {
            return TargetKind::Value;
        }
        match self.resolve_section_id(sym.st_shndx) {
            Some(id) => TargetKind::Section(id),
            None => TargetKind::Address,
        }
    }

    fn resolve_section_id(&self, shndx: usize) -> Option<SectionId> {
        let header = self.elf.section_headers.get(shndx)?;
        SectionId::from_elf_name(self.section_name(header)?)
    }

    fn build_symbol_table(&self) -> SymbolTable {
        if self.elf.syms.iter().any(|sym| sym.st_shndx == SHN_XINDEX as usize) {
            tracing::warn!("object uses SHN_XINDEX extended section indices, which this checker does not resolve");
        }

        let entries = self
            .elf
            .syms
            .iter()
            .map(|sym| SymbolEntry {
                name_index: sym.st_name as u32,
                section: self.resolve_section_id(sym.st_shndx),
                value: sym.st_value,
                is_undefined: sym.st_shndx == SHN_UNDEF as usize,
                is_absolute: sym.st_shndx == SHN_ABS as usize,
                is_common: sym.st_shndx == SHN_COMMON as usize,
            })
            .collect();
        SymbolTable::new(entries)
    }
}

#[derive(Debug)]
struct InvalidSectionBounds;

impl std::fmt::Display for InvalidSectionBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "section header names a byte range past the end of the file")
    }
}

impl std::error::Error for InvalidSectionBounds {}
