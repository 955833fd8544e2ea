//! TKey parsing: the record header used by ROOT to locate objects.

use std::borrow::Cow;

use crate::compression::decompress;
use crate::cursor::Cursor;
use crate::error::{Result, RootError};
use crate::objects::Object;
use crate::registry::ClassRegistry;
use crate::source::ByteSource;

/// Bytes needed to reach `fKeylen`.
const KEYLEN_PREFIX: u64 = 16;

/// A parsed TKey record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Total number of bytes in compressed object + key header.
    pub n_bytes: i32,
    /// Version of key class; `> 1000` means 64-bit seeks.
    pub version: u16,
    /// Uncompressed object length.
    pub obj_len: i32,
    /// Key creation time (ROOT datime).
    pub datime: u32,
    /// Length of the key header itself.
    pub key_len: u16,
    /// Cycle number (ROOT versioning within a directory).
    pub cycle: u16,
    /// Absolute position of this key in the file.
    pub seek_key: u64,
    /// Parent directory seek position.
    pub seek_pdir: u64,
    /// Class name of the stored object.
    pub class_name: String,
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
}

/// Public info about a key (for `list_keys()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Path from the root directory, `/`-separated.
    pub path: String,
    /// Object name.
    pub name: String,
    /// Object class name (e.g. "TTree", "TDirectoryFile").
    pub class_name: String,
    /// Object title.
    pub title: String,
    /// Cycle number.
    pub cycle: u16,
}

impl KeyInfo {
    /// Create from a key located in the directory at `dir_path`.
    pub fn from_key(key: &Key, dir_path: &str) -> Self {
        let path = if dir_path.is_empty() {
            key.name.clone()
        } else {
            format!("{dir_path}/{}", key.name)
        };
        Self {
            path,
            name: key.name.clone(),
            class_name: key.class_name.clone(),
            title: key.title.clone(),
            cycle: key.cycle,
        }
    }
}

impl Key {
    /// Read a TKey from the cursor at its current position.
    pub fn read(c: &mut Cursor<'_>) -> Result<Self> {
        let n_bytes = c.i32()?;
        let version = c.u16()?;
        let obj_len = c.i32()?;
        let datime = c.u32()?;
        let key_len = c.u16()?;
        let cycle = c.u16()?;

        let (seek_key, seek_pdir) = if version > 1000 {
            (c.i64()?.max(0) as u64, c.i64()?.max(0) as u64)
        } else {
            (c.i32()?.max(0) as u64, c.i32()?.max(0) as u64)
        };

        let class_name = c.string()?;
        let name = c.string()?;
        let title = c.string()?;

        if n_bytes < i32::from(key_len) || obj_len < 0 {
            return Err(RootError::format(format!(
                "key '{name}': fNbytes={n_bytes}, fKeylen={key_len}, fObjlen={obj_len}"
            )));
        }

        Ok(Key {
            n_bytes,
            version,
            obj_len,
            datime,
            key_len,
            cycle,
            seek_key,
            seek_pdir,
            class_name,
            name,
            title,
        })
    }

    /// Read the key header stored at `seek`.
    pub fn read_at(source: &dyn ByteSource, seek: u64) -> Result<Self> {
        let prefix = source.read(seek, seek + KEYLEN_PREFIX)?;
        let key_len = u16::from_be_bytes([prefix[14], prefix[15]]) as u64;
        if key_len < KEYLEN_PREFIX {
            return Err(RootError::format(format!("key at {seek}: fKeylen={key_len}")));
        }
        let header = source.read(seek, seek + key_len)?;
        Key::read(&mut Cursor::new(&header, 0))
    }

    /// Whether the payload is framed compressed blocks.
    pub fn is_compressed(&self) -> bool {
        self.obj_len != self.n_bytes - i32::from(self.key_len)
    }

    /// File byte range of the stored payload.
    pub fn payload_range(&self) -> (u64, u64) {
        let start = self.seek_key + u64::from(self.key_len);
        (start, self.seek_key + self.n_bytes as u64)
    }

    /// Bytes stored after the header, before decompression.
    pub fn raw_payload<'s>(&self, source: &'s dyn ByteSource) -> Result<Cow<'s, [u8]>> {
        let (start, stop) = self.payload_range();
        source.read(start, stop)
    }

    /// The object bytes: decompressed when the key says so, passed through otherwise.
    pub fn payload<'s>(&self, source: &'s dyn ByteSource) -> Result<Cow<'s, [u8]>> {
        let raw = self.raw_payload(source)?;
        if self.is_compressed() {
            Ok(Cow::Owned(decompress(&raw, self.obj_len as usize)?))
        } else {
            Ok(raw)
        }
    }

    /// Reference-key origin for cursors over this key's payload.
    pub fn origin(&self) -> i64 {
        -i64::from(self.key_len)
    }

    /// Decode the payload with the reader registered for `class_name`.
    pub fn read_object(&self, source: &dyn ByteSource, registry: &ClassRegistry) -> Result<Object> {
        let payload = self.payload(source)?;
        let mut c = Cursor::new(&payload, self.origin());
        registry.read(&self.class_name, &mut c)
    }

    /// Whether the key holds a subdirectory.
    pub fn is_directory(&self) -> bool {
        matches!(self.class_name.as_str(), "TDirectory" | "TDirectoryFile")
    }
}
