//! The error type for everything in this crate that can fail outside the
//! checker's own diagnostic channel: opening/mapping a file and parsing
//! the ELF container itself. Once a [`crate::adapter::ElfObject`] exists,
//! every further problem is a `dwarflint-core` diagnostic, not a Rust
//! error.

use std::error::Error;
use std::fmt;

/// What went wrong, without the underlying cause attached. `Copy` so
/// callers can match on it without borrowing the error.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElfErrorKind {
    /// Opening or memory-mapping the input file failed.
    Io,
    /// `goblin` rejected the file outright (bad magic, truncated header).
    MalformedHeader,
    /// A `SHT_REL`/`SHT_RELA` section's `sh_info` does not name a section
    /// header index that exists in this object.
    RelocationTargetMissing,
}

impl fmt::Display for ElfErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "failed to read the input file"),
            Self::MalformedHeader => write!(f, "not a valid ELF object"),
            Self::RelocationTargetMissing => {
                write!(f, "relocation section's sh_info does not name an existing section")
            }
        }
    }
}

/// An error loading or parsing an ELF object.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct ElfError {
    kind: ElfErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ElfError {
    pub(crate) fn new<E>(kind: ElfErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        ElfError {
            kind,
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ElfErrorKind {
        self.kind
    }
}

impl From<ElfErrorKind> for ElfError {
    fn from(kind: ElfErrorKind) -> Self {
        ElfError { kind, source: None }
    }
}

impl From<std::io::Error> for ElfError {
    fn from(e: std::io::Error) -> Self {
        ElfError::new(ElfErrorKind::Io, e)
    }
}

impl From<goblin::error::Error> for ElfError {
    fn from(e: goblin::error::Error) -> Self {
        ElfError::new(ElfErrorKind::MalformedHeader, e)
    }
}
