//! Read position over ROOT's big-endian serialization format.
//!
//! A [`Cursor`] walks a byte slice, decoding fixed-width fields, ROOT strings
//! and version headers. Cursors derived while decoding one top-level object
//! (via [`Cursor::copied`], [`Cursor::skipped`] or `clone`) share the same
//! cross-reference table, which maps stream offsets to the classes and objects
//! already decoded.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Result, RootError};
use crate::registry::RefEntry;

/// `fVersion`/byte-count word carries a byte count.
pub const K_BYTE_COUNT_MASK: u32 = 0x4000_0000;
/// Version short carries a byte count (TObject streamer).
pub const K_BYTE_COUNT_VMASK: u16 = 0x4000;
/// `fBits` flag: the object was referenced and a PID index follows.
pub const K_IS_REFERENCED: u32 = 1 << 4;
const K_IS_ON_HEAP: u32 = 0x0100_0000;

/// Cross-reference arena for one top-level object decode.
pub type Refs = Rc<RefCell<HashMap<i64, RefEntry>>>;

/// A value decodable from its fixed-width big-endian representation.
pub trait FromBigEndian: Copy {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes.
    fn from_be_slice(b: &[u8]) -> Self;
}

macro_rules! impl_from_big_endian {
    ($($t:ty),*) => {$(
        impl FromBigEndian for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            #[inline]
            fn from_be_slice(b: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(b);
                <$t>::from_be_bytes(raw)
            }
        }
    )*};
}

impl_from_big_endian!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Version header of a streamed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Class version.
    pub version: u16,
    /// Cursor position of the header.
    pub start: usize,
    /// Bytes announced by the header, counted from `start` (header included).
    pub byte_count: Option<usize>,
}

impl Version {
    /// Position right after the record, if it carries a byte count.
    pub fn end(&self) -> Option<usize> {
        self.byte_count.map(|n| self.start + n)
    }

    /// Verify that `cursor` stopped exactly at the end of the record.
    pub fn check(&self, cursor: &Cursor<'_>, class: &str) -> Result<()> {
        match self.byte_count {
            Some(expected) if cursor.pos() != self.start + expected => {
                Err(RootError::ByteCountMismatch {
                    class: class.to_string(),
                    expected,
                    actual: cursor.pos().saturating_sub(self.start),
                })
            }
            _ => Ok(()),
        }
    }

    /// Move `cursor` to the end of the record (no-op without a byte count).
    pub fn skip_to_end(&self, cursor: &mut Cursor<'_>) -> Result<()> {
        if let Some(end) = self.end() {
            cursor.set_pos(end)?;
        }
        Ok(())
    }
}

/// Cursor over a byte slice using ROOT's big-endian conventions.
#[derive(Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    index: usize,
    origin: i64,
    refs: Refs,
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("len", &self.data.len())
            .field("index", &self.index)
            .field("origin", &self.origin)
            .field("refs", &self.refs.borrow().len())
            .finish()
    }
}

impl<'a> Cursor<'a> {
    /// New cursor at position 0 with a fresh reference table.
    ///
    /// `origin` is subtracted from positions when forming reference keys;
    /// key payloads use `-fKeylen`.
    pub fn new(data: &'a [u8], origin: i64) -> Self {
        Self { data, index: 0, origin, refs: Rc::new(RefCell::new(HashMap::new())) }
    }

    /// New cursor sharing an existing reference table.
    pub fn with_refs(data: &'a [u8], origin: i64, refs: Refs) -> Self {
        Self { data, index: 0, origin, refs }
    }

    /// Current read position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.index
    }

    /// Move to an absolute position (may equal the buffer length).
    pub fn set_pos(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(self.out_of_range(pos.saturating_sub(self.index)));
        }
        self.index = pos;
        Ok(())
    }

    /// Reference-key origin.
    #[inline]
    pub fn origin(&self) -> i64 {
        self.origin
    }

    /// Shared cross-reference table.
    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Underlying bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes left after the current position.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }

    /// Position expressed in reference-key space.
    #[inline]
    pub fn ref_position(&self) -> i64 {
        self.index as i64 - self.origin
    }

    /// Convert a reference-key position back to a buffer position.
    pub fn from_ref_position(&self, refpos: i64) -> Result<usize> {
        let pos = refpos + self.origin;
        usize::try_from(pos).map_err(|_| RootError::format(format!("negative stream position {pos}")))
    }

    /// Same position, same refs.
    pub fn copied(&self) -> Cursor<'a> {
        self.clone()
    }

    /// A cursor `n` bytes further on, sharing refs.
    pub fn skipped(&self, n: usize) -> Result<Cursor<'a>> {
        let mut out = self.clone();
        out.skip(n)?;
        Ok(out)
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.index += n;
        Ok(())
    }

    /// Read `n` raw bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.index..self.index + n];
        self.index += n;
        Ok(slice)
    }

    /// Decode one big-endian field.
    #[inline]
    pub fn field<T: FromBigEndian>(&mut self) -> Result<T> {
        let b = self.bytes(T::SIZE)?;
        Ok(T::from_be_slice(b))
    }

    /// Decode `n` consecutive big-endian values.
    pub fn array<T: FromBigEndian>(&mut self, n: usize) -> Result<Vec<T>> {
        let width = T::SIZE;
        let len = n.checked_mul(width).ok_or_else(|| self.out_of_range(usize::MAX))?;
        let raw = self.bytes(len)?;
        Ok(raw.chunks_exact(width).map(T::from_be_slice).collect())
    }

    /// Read a single byte.
    pub fn u8(&mut self) -> Result<u8> {
        self.field()
    }

    /// Read a signed byte.
    pub fn i8(&mut self) -> Result<i8> {
        self.field()
    }

    /// Read a big-endian `u16`.
    pub fn u16(&mut self) -> Result<u16> {
        self.field()
    }

    /// Read a big-endian `i16`.
    pub fn i16(&mut self) -> Result<i16> {
        self.field()
    }

    /// Read a big-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        self.field()
    }

    /// Read a big-endian `i32`.
    pub fn i32(&mut self) -> Result<i32> {
        self.field()
    }

    /// Read a big-endian `u64`.
    pub fn u64(&mut self) -> Result<u64> {
        self.field()
    }

    /// Read a big-endian `i64`.
    pub fn i64(&mut self) -> Result<i64> {
        self.field()
    }

    /// Read a big-endian `f32`.
    pub fn f32(&mut self) -> Result<f32> {
        self.field()
    }

    /// Read a big-endian `f64`.
    pub fn f64(&mut self) -> Result<f64> {
        self.field()
    }

    /// Read a ROOT string: 1-byte length, or `255` then a 4-byte length.
    pub fn string(&mut self) -> Result<String> {
        let bytes = self.string_bytes()?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Raw bytes of a ROOT string.
    pub fn string_bytes(&mut self) -> Result<&'a [u8]> {
        let first = self.u8()?;
        let len = if first == 255 { self.u32()? as usize } else { first as usize };
        self.bytes(len)
    }

    /// Read a NUL-terminated string; the terminator is consumed.
    pub fn cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.index.min(self.data.len())..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| RootError::format(format!("unterminated C string at {}", self.index)))?;
        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.index += len + 1;
        Ok(s)
    }

    /// Read a version header.
    ///
    /// With the byte-count mask set the header is a 4-byte count followed by
    /// a 2-byte version; otherwise only the 2-byte version is present.
    pub fn read_version(&mut self) -> Result<Version> {
        let start = self.index;
        let raw = self.u32()?;
        if raw & K_BYTE_COUNT_MASK != 0 {
            let count = (raw & !K_BYTE_COUNT_MASK) as usize;
            if count == 0 {
                return Err(RootError::format(format!("zero byte count at {start}")));
            }
            let version = self.u16()?;
            Ok(Version { version, start, byte_count: Some(count + 4) })
        } else if raw == 0 {
            Err(RootError::format(format!("zero byte count at {start}")))
        } else {
            self.index = start;
            let version = self.u16()?;
            Ok(Version { version, start, byte_count: None })
        }
    }

    /// Skip a version-only header: the short version, plus the 4-byte
    /// checksum word when it carries [`K_BYTE_COUNT_VMASK`].
    pub fn skip_version(&mut self) -> Result<u16> {
        let version = self.u16()?;
        if version & K_BYTE_COUNT_VMASK != 0 {
            self.skip(4)?;
        }
        Ok(version)
    }

    /// Skip a TObject header, returning `fBits`.
    pub fn skip_tobject(&mut self) -> Result<u32> {
        self.skip_version()?;
        let _unique_id = self.u32()?;
        let bits = self.u32()? | K_IS_ON_HEAP;
        if bits & K_IS_REFERENCED != 0 {
            self.skip(2)?;
        }
        Ok(bits)
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.index.checked_add(n).map_or(true, |end| end > self.data.len()) {
            return Err(self.out_of_range(n));
        }
        Ok(())
    }

    fn out_of_range(&self, n: usize) -> RootError {
        RootError::OutOfRange {
            start: self.index as u64,
            stop: (self.index as u64).saturating_add(n as u64),
            size: self.data.len() as u64,
        }
    }
}
