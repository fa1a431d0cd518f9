//! A small owned-bytes wrapper so the CLI can hold either a memory-mapped
//! file or an in-memory buffer behind one type.

use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

enum Backing {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Owned(buf) => buf,
            Backing::Mmap(mmap) => mmap,
        }
    }
}

/// Bytes behind an object file, either mapped in from disk or held in an
/// owned buffer (for input that didn't come from a seekable file, or in
/// tests).
pub struct ByteView {
    backing: Backing,
}

impl ByteView {
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        ByteView {
            backing: Backing::Owned(buffer),
        }
    }

    /// Memory-maps `path` for reading. An empty file maps to an empty
    /// buffer instead of failing, since a zero-length mapping is rejected
    /// by the OS on some platforms even though it's a perfectly legal
    /// (if uninteresting) input.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let backing = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => Backing::Mmap(mmap),
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Backing::Owned(Vec::new()),
            Err(err) => return Err(err),
        };
        Ok(ByteView { backing })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.backing
    }
}

impl Deref for ByteView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}
