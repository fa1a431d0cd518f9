//! ELF container support: reads an object file's bytes, its debug
//! sections, their relocations, and its symbol table into the plain
//! shape `dwarflint-core`'s checks are built against.

pub mod adapter;
pub mod byteview;
pub mod error;

pub use adapter::ElfObject;
pub use byteview::ByteView;
pub use error::{ElfError, ElfErrorKind};
