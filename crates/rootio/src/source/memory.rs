//! Memory-mapped or owned data backing for ROOT file reads.

use std::borrow::Cow;
use std::fs;
use std::ops::Deref;
use std::path::Path;

use super::{check_range, ByteSource};
use crate::error::Result;

/// Whole-file resident source.
///
/// `Mmap` avoids copying multi-GB ntuple files into RAM;
/// `Owned` is used for `from_bytes()` and testing.
pub enum MemorySource {
    /// File bytes owned in a `Vec<u8>`.
    Owned(Vec<u8>),
    /// Memory-mapped file.
    Mmap(memmap2::Mmap),
}

impl MemorySource {
    /// Memory-map a local file.
    pub fn map(path: impl AsRef<Path>) -> Result<Self> {
        let file = fs::File::open(path.as_ref())?;
        // SAFETY: the mapping is read-only; concurrent modification of the
        // file by another process is outside what this reader supports.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(MemorySource::Mmap(mmap))
    }
}

impl Deref for MemorySource {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            MemorySource::Owned(v) => v,
            MemorySource::Mmap(m) => m,
        }
    }
}

impl AsRef<[u8]> for MemorySource {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        MemorySource::Owned(data)
    }
}

impl ByteSource for MemorySource {
    fn read(&self, start: u64, stop: u64) -> Result<Cow<'_, [u8]>> {
        check_range(start, stop, self.len() as u64)?;
        Ok(Cow::Borrowed(&self[start as usize..stop as usize]))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}
