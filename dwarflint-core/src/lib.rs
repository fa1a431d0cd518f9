//! Structural validation of DWARF 2/3 debugging information: decoding
//! every recognized section well enough to walk it, and flagging the
//! producer mistakes and linker-induced damage that decode cleanly but
//! violate an invariant the format depends on — bad `DW_AT_sibling`
//! values, dangling references, overlapping address ranges,
//! unreferenced garbage left by `--gc-sections`, and the like.
//!
//! This crate has no opinion on where its bytes come from; that's
//! [`input::ObjectInput`]'s job, populated by whichever adapter knows
//! how to read a particular container format (see the sibling
//! `dwarflint-elf` crate). Everything here works purely in terms of
//! section bytes, offsets, and the category/diagnostic vocabulary in
//! [`diagnostics`].

pub mod abbrev;
pub mod aranges;
pub mod checks;
pub mod config;
pub mod coverage;
pub mod cu;
pub mod die;
pub mod diagnostics;
pub mod dwarf_version;
pub mod input;
pub mod line;
pub mod loc_expr;
pub mod loc_ranges;
pub mod locus;
pub mod pubtables;
pub mod reader;
pub mod relocation;
pub mod scheduler;
pub mod section;

pub use checks::{run, PassResults};
pub use config::Config;
pub use diagnostics::{Category, Diagnostic, Diagnostics};
pub use input::{ObjectInput, SectionFlags, SectionView, SymbolEntry, SymbolTable};
pub use locus::Locus;
pub use section::{AddressWidth, Endian, OffsetSize, SectionId};
