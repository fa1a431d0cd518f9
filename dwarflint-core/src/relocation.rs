//! Relocation records and the cursor that walks them in lock-step with a
//! section scan.
//!
//! A relocatable object (`ET_REL`) leaves many DWARF fields as zero and
//! expects the linker to patch them in later; this checker runs before
//! that ever happens, so it has to apply relocations itself to see the
//! values a linked object would actually contain. [`RelocationCursor`]
//! is built once per section and advanced monotonically alongside the
//! section reader, exactly mirroring the order the reader visits offsets
//! in.

use crate::diagnostics::{Category, Diagnostics};
use crate::input::{ObjectInput, SymbolTable};
use crate::locus::Locus;
use crate::section::SectionId;

/// What kind of value a relocation is expected to produce once applied,
/// which in turn decides which checks are even meaningful for the field
/// it patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Targets a specific recognized section (e.g. a `DW_FORM_ref_addr`
    /// resolving into `.debug_info`, or a `DW_AT_stmt_list` resolving
    /// into `.debug_line`).
    Section(SectionId),
    /// An opaque value with no section semantics (a `DW_AT_const_value`
    /// spelled as a relocated constant, for instance).
    Value,
    /// A runtime address (`DW_AT_low_pc`/`DW_AT_high_pc` and friends).
    Address,
    /// Targets the executable/object's entry point machinery rather than
    /// a debug section — rare, but distinguishable so a checker can flag
    /// it as suspicious wherever it shows up in DWARF data.
    Executable,
}

/// A single relocation entry, reduced from whatever `SHT_REL`/`SHT_RELA`
/// encoding the object format used down to the three things applying it
/// needs: where it patches, which symbol it resolves against, and any
/// addend carried in the relocation itself (for `SHT_RELA`; zero for
/// `SHT_REL`, where the addend lives in the bytes being patched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationRecord {
    pub offset: u64,
    pub symbol_index: u32,
    pub addend: i64,
    pub target: TargetKind,
}

/// Whether a relocation found at a given offset matched what the reader
/// expected there, was present but not expected (unreferenced), or was
/// expected but of the wrong kind (mismatched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipMode {
    Ok,
    Unreferenced,
    Mismatched,
}

/// The resolved value of a relocation once applied against a symbol
/// table: the patched value plus which section (if any) it now points
/// into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedRelocation {
    pub value: u64,
    pub section: Option<SectionId>,
    pub symbol_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyError {
    /// The relocation's symbol index has no entry in the symbol table.
    UnresolvedSymbol(u32),
    /// The symbol resolves, but not to any recognized section, and the
    /// target kind required one.
    UnresolvedSection(u32),
}

impl RelocationRecord {
    /// Applies this relocation against a symbol table, producing the
    /// value a linker would have written at `offset`.
    pub fn apply(&self, symbols: &SymbolTable) -> Result<AppliedRelocation, ApplyError> {
        let symbol = symbols
            .get(self.symbol_index)
            .ok_or(ApplyError::UnresolvedSymbol(self.symbol_index))?;

        if symbol.is_absolute {
            return Ok(AppliedRelocation {
                value: (symbol.value as i64 + self.addend) as u64,
                section: None,
                symbol_index: self.symbol_index,
            });
        }

        match self.target {
            TargetKind::Section(_) => {
                let section = symbol
                    .section
                    .ok_or(ApplyError::UnresolvedSection(self.symbol_index))?;
                Ok(AppliedRelocation {
                    value: (symbol.value as i64 + self.addend) as u64,
                    section: Some(section),
                    symbol_index: self.symbol_index,
                })
            }
            TargetKind::Value | TargetKind::Address | TargetKind::Executable => Ok(AppliedRelocation {
                value: (symbol.value as i64 + self.addend) as u64,
                section: symbol.section,
                symbol_index: self.symbol_index,
            }),
        }
    }
}

/// A cursor over a section's relocations, sorted by offset, advanced in
/// lock-step with a [`crate::reader::Reader`] walking the same section.
/// Every method only ever moves forward — callers that jump the
/// underlying reader backward (which none of the checkers do) would
/// desynchronize it, by design: relocations are visited in exactly the
/// order the byte layout visits them.
pub struct RelocationCursor<'r> {
    relocations: &'r [RelocationRecord],
    next_index: usize,
}

impl<'r> RelocationCursor<'r> {
    /// Builds a cursor over `relocations`, which must already be sorted
    /// by `offset` (the adapter that produces [`crate::input::SectionView`]
    /// guarantees this).
    pub fn new(relocations: &'r [RelocationRecord]) -> Self {
        RelocationCursor {
            relocations,
            next_index: 0,
        }
    }

    /// Looks for a relocation exactly at `offset` without consuming
    /// anything past it. Returns `(mode, record)`: `Ok` with the record
    /// when one sits exactly at `offset`; `Unreferenced` with the next
    /// upcoming record when the cursor has relocations left but none at
    /// this offset; `Mismatched` is reserved for callers that know a
    /// relocation is expected but find the wrong `TargetKind` at the
    /// matched offset, and is only ever produced by [`Self::next_expecting`].
    pub fn next(&mut self, offset: u64) -> (SkipMode, Option<&'r RelocationRecord>) {
        while self.next_index < self.relocations.len() && self.relocations[self.next_index].offset < offset {
            self.next_index += 1;
        }
        match self.relocations.get(self.next_index) {
            Some(record) if record.offset == offset => (SkipMode::Ok, Some(record)),
            Some(record) => (SkipMode::Unreferenced, Some(record)),
            None => (SkipMode::Unreferenced, None),
        }
    }

    /// Like [`Self::next`], but checks the found relocation's
    /// `TargetKind` against `expected` and reports a mismatch rather
    /// than silently accepting the wrong kind.
    pub fn next_expecting(&mut self, offset: u64, expected: TargetKind) -> (SkipMode, Option<&'r RelocationRecord>) {
        match self.next(offset) {
            (SkipMode::Ok, Some(record)) if record.target != expected => (SkipMode::Mismatched, Some(record)),
            other => other,
        }
    }

    /// Advances past any relocation landing strictly before `offset`,
    /// without reporting on what it skipped. Equivalent to probing
    /// `offset - 1` and discarding the result, since `offset` itself may
    /// still hold a relocation a later `next` call should see.
    pub fn skip(&mut self, offset: u64) {
        if offset == 0 {
            return;
        }
        let _ = self.next(offset - 1);
    }

    /// Advances the cursor past every remaining relocation in the
    /// section, used once a check gives up scanning partway through
    /// (e.g. after a fatal reader error) and wants to report on whatever
    /// relocations were never reached.
    pub fn skip_rest(&mut self) -> &'r [RelocationRecord] {
        let rest = &self.relocations[self.next_index..];
        self.next_index = self.relocations.len();
        rest
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.relocations.len()
    }

    /// Looks up the relocation expected at `offset`, applies it against
    /// `symbols`, and returns its patched value and the section (if any)
    /// it resolved into. Falls back to `raw` — the bytes already read
    /// off the wire — when no relocation sits at `offset`; a relocation
    /// of the wrong kind or one that fails to resolve also falls back to
    /// `raw`, but emits a diagnostic first rather than silently reading
    /// the unlinked zero.
    pub fn resolve_or(
        &mut self,
        offset: u64,
        expected: TargetKind,
        symbols: &SymbolTable,
        raw: u64,
        diagnostics: &mut Diagnostics,
        locus: impl Fn() -> Locus,
    ) -> (u64, Option<SectionId>) {
        let (mode, record) = self.next_expecting(offset, expected);
        let record = match (mode, record) {
            (SkipMode::Ok, Some(record)) => record,
            (SkipMode::Mismatched, Some(record)) => {
                diagnostics.emit(
                    Category::RELOC | Category::IMPACT_2,
                    locus(),
                    format!("relocation here targets {:?}, but {expected:?} was expected", record.target),
                );
                record
            }
            _ => return (raw, None),
        };
        match record.apply(symbols) {
            Ok(applied) => (applied.value, applied.section),
            Err(_) => {
                diagnostics.emit(
                    Category::RELOC | Category::IMPACT_2,
                    locus(),
                    "relocation could not be resolved against the symbol table; using the unrelocated value",
                );
                (raw, None)
            }
        }
    }
}

/// Looks up a section's symbol table via the owning object, used by
/// checks that need to resolve a relocation without holding their own
/// reference to the symbol table.
pub fn resolve(input: &ObjectInput<'_>, record: &RelocationRecord) -> Result<AppliedRelocation, ApplyError> {
    record.apply(&input.symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SymbolEntry;

    fn symbols() -> SymbolTable {
        SymbolTable::new(vec![
            SymbolEntry {
                name_index: 0,
                section: Some(SectionId::DebugInfo),
                value: 0x100,
                is_undefined: false,
                is_absolute: false,
                is_common: false,
            },
            SymbolEntry {
                name_index: 1,
                section: None,
                value: 0,
                is_undefined: true,
                is_absolute: false,
                is_common: false,
            },
        ])
    }

    #[test]
    fn apply_adds_addend_to_symbol_value() {
        let record = RelocationRecord {
            offset: 4,
            symbol_index: 0,
            addend: 8,
            target: TargetKind::Section(SectionId::DebugInfo),
        };
        let applied = record.apply(&symbols()).unwrap();
        assert_eq!(applied.value, 0x108);
        assert_eq!(applied.section, Some(SectionId::DebugInfo));
    }

    #[test]
    fn apply_against_undefined_symbol_fails() {
        let record = RelocationRecord {
            offset: 0,
            symbol_index: 1,
            addend: 0,
            target: TargetKind::Section(SectionId::DebugInfo),
        };
        assert_eq!(
            record.apply(&symbols()),
            Err(ApplyError::UnresolvedSection(1))
        );
    }

    #[test]
    fn apply_against_missing_symbol_index_fails() {
        let record = RelocationRecord {
            offset: 0,
            symbol_index: 99,
            addend: 0,
            target: TargetKind::Value,
        };
        assert_eq!(record.apply(&symbols()), Err(ApplyError::UnresolvedSymbol(99)));
    }

    #[test]
    fn cursor_walks_offsets_in_order() {
        let records = [
            RelocationRecord { offset: 4, symbol_index: 0, addend: 0, target: TargetKind::Value },
            RelocationRecord { offset: 12, symbol_index: 0, addend: 0, target: TargetKind::Value },
        ];
        let mut cursor = RelocationCursor::new(&records);
        let (mode, found) = cursor.next(4);
        assert_eq!(mode, SkipMode::Ok);
        assert_eq!(found.unwrap().offset, 4);

        let (mode, found) = cursor.next(8);
        assert_eq!(mode, SkipMode::Unreferenced);
        assert_eq!(found.unwrap().offset, 12);

        let (mode, found) = cursor.next(12);
        assert_eq!(mode, SkipMode::Ok);
        assert_eq!(found.unwrap().offset, 12);
    }

    #[test]
    fn cursor_reports_mismatched_target_kind() {
        let records = [RelocationRecord {
            offset: 0,
            symbol_index: 0,
            addend: 0,
            target: TargetKind::Address,
        }];
        let mut cursor = RelocationCursor::new(&records);
        let (mode, _) = cursor.next_expecting(0, TargetKind::Value);
        assert_eq!(mode, SkipMode::Mismatched);
    }

    #[test]
    fn skip_rest_drains_cursor() {
        let records = [
            RelocationRecord { offset: 0, symbol_index: 0, addend: 0, target: TargetKind::Value },
            RelocationRecord { offset: 4, symbol_index: 0, addend: 0, target: TargetKind::Value },
        ];
        let mut cursor = RelocationCursor::new(&records);
        let rest = cursor.skip_rest();
        assert_eq!(rest.len(), 2);
        assert!(cursor.is_exhausted());
    }
}
