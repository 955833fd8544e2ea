//! TDirectory parsing and key-list navigation.

use crate::cursor::Cursor;
use crate::error::{Result, RootError};
use crate::key::Key;
use crate::source::ByteSource;

/// The fixed part of a streamed `TDirectory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectoryHeader {
    /// Class version; `> 1000` means 64-bit seeks.
    pub version: u16,
    /// Creation time.
    pub datime_c: u32,
    /// Modification time.
    pub datime_m: u32,
    /// Bytes of the key list.
    pub nbytes_keys: i32,
    /// Bytes of the directory's key + name record.
    pub nbytes_name: i32,
    /// Offset of the directory record.
    pub seek_dir: u64,
    /// Offset of the parent directory.
    pub seek_parent: u64,
    /// Offset of the key list.
    pub seek_keys: u64,
}

impl DirectoryHeader {
    /// Read the header at the cursor.
    pub fn read(c: &mut Cursor<'_>) -> Result<Self> {
        let version = c.u16()?;
        let datime_c = c.u32()?;
        let datime_m = c.u32()?;
        let nbytes_keys = c.i32()?;
        let nbytes_name = c.i32()?;
        let (seek_dir, seek_parent, seek_keys) = if version > 1000 {
            (c.i64()?, c.i64()?, c.i64()?)
        } else {
            (i64::from(c.i32()?), i64::from(c.i32()?), i64::from(c.i32()?))
        };
        Ok(Self {
            version,
            datime_c,
            datime_m,
            nbytes_keys,
            nbytes_name,
            seek_dir: seek_dir.max(0) as u64,
            seek_parent: seek_parent.max(0) as u64,
            seek_keys: seek_keys.max(0) as u64,
        })
    }
}

/// A parsed TDirectory: an ordered list of TKeys.
#[derive(Debug, Clone)]
pub struct Directory {
    /// Path from the root directory (empty for the root).
    pub path: String,
    /// Streamed header.
    pub header: DirectoryHeader,
    keys: Vec<Key>,
}

impl Directory {
    /// Read the key list from the file at `seek_keys`.
    ///
    /// The key list starts with a TKey header for the list itself, then
    /// an i32 `nkeys`, followed by `nkeys` TKey records.
    pub fn read_key_list(source: &dyn ByteSource, seek_keys: u64) -> Result<Vec<Key>> {
        if seek_keys == 0 {
            return Ok(Vec::new());
        }
        let list_key = Key::read_at(source, seek_keys)?;
        let stop = seek_keys + list_key.n_bytes.max(0) as u64;
        let data = source.read(seek_keys, stop)?;
        let mut c = Cursor::new(&data, 0);
        c.skip(usize::from(list_key.key_len))?;

        let nkeys = c.i32()?;
        if nkeys < 0 {
            return Err(RootError::format(format!("negative key count {nkeys} at {seek_keys}")));
        }
        let mut keys = Vec::with_capacity((nkeys as usize).min(c.remaining()));
        for _ in 0..nkeys {
            keys.push(Key::read(&mut c)?);
        }
        Ok(keys)
    }

    /// Read a directory whose header starts at the cursor.
    pub fn read(c: &mut Cursor<'_>, source: &dyn ByteSource, path: String) -> Result<Self> {
        let header = DirectoryHeader::read(c)?;
        let keys = Self::read_key_list(source, header.seek_keys)?;
        log::debug!("directory '{path}': {} keys", keys.len());
        Ok(Directory { path, header, keys })
    }

    /// Read the subdirectory stored under `key`.
    pub fn read_from_key(key: &Key, source: &dyn ByteSource, path: String) -> Result<Self> {
        let payload = key.payload(source)?;
        Self::read(&mut Cursor::new(&payload, key.origin()), source, path)
    }

    /// Access the list of keys.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Find a key by name; without a cycle the highest one wins.
    pub fn find_key(&self, name: &str, cycle: Option<u16>) -> Option<&Key> {
        let matching = self.keys.iter().filter(|k| k.name == name);
        match cycle {
            Some(cycle) => matching.into_iter().find(|k| k.cycle == cycle),
            None => matching.max_by_key(|k| k.cycle),
        }
    }

    /// [`Directory::find_key`] or [`RootError::KeyNotFound`].
    pub fn key(&self, name: &str, cycle: Option<u16>) -> Result<&Key> {
        self.find_key(name, cycle).ok_or_else(|| {
            let what = match cycle {
                Some(c) => format!("{name};{c}"),
                None => name.to_string(),
            };
            let full = if self.path.is_empty() { what } else { format!("{}/{what}", self.path) };
            RootError::KeyNotFound(full)
        })
    }

    /// Resolve a `/`-separated path with an optional `;cycle` suffix on its last part.
    pub fn resolve(&self, source: &dyn ByteSource, path: &str) -> Result<Key> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, dirs)) = parts.split_last() else {
            return Err(RootError::KeyNotFound(path.to_string()));
        };
        let mut owned: Option<Directory> = None;
        for part in dirs {
            let (name, cycle) = split_cycle(part)?;
            let dir = owned.as_ref().unwrap_or(self);
            let key = dir.key(name, cycle)?;
            if !key.is_directory() {
                return Err(RootError::KeyNotFound(format!("{path} ('{name}' is a {})", key.class_name)));
            }
            let sub_path = join(&dir.path, name);
            owned = Some(Directory::read_from_key(key, source, sub_path)?);
        }
        let (name, cycle) = split_cycle(last)?;
        owned.as_ref().unwrap_or(self).key(name, cycle).cloned()
    }
}

pub(crate) fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Split `name;cycle`.
pub fn split_cycle(part: &str) -> Result<(&str, Option<u16>)> {
    match part.rsplit_once(';') {
        Some((name, cycle)) => {
            let cycle = cycle
                .parse::<u16>()
                .map_err(|_| RootError::KeyNotFound(format!("{part} (bad cycle)")))?;
            Ok((name, Some(cycle)))
        }
        None => Ok((part, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::testutil::key_bytes;
    use crate::source::MemorySource;

    fn dir_with_keys(keys: &[(&str, &str, u16)]) -> (MemorySource, Directory) {
        // [key list key][nkeys][keys...]
        let mut body = (keys.len() as i32).to_be_bytes().to_vec();
        for (class, name, cycle) in keys {
            body.extend(key_bytes(class, name, 10, 10, 500, *cycle));
        }
        let mut file = vec![0u8; 64];
        file.extend(key_bytes("TFile", "f.root", body.len(), body.len(), 64, 1));
        file.extend(body);
        let source = MemorySource::from(file);
        let keys = Directory::read_key_list(&source, 64).unwrap();
        let header = DirectoryHeader { version: 5, seek_keys: 64, ..Default::default() };
        (source, Directory { path: String::new(), header, keys })
    }

    #[test]
    fn highest_cycle_wins() {
        let (_, dir) = dir_with_keys(&[("TTree", "t", 1), ("TTree", "t", 3), ("TTree", "t", 2)]);
        assert_eq!(dir.keys().len(), 3);
        assert_eq!(dir.find_key("t", None).unwrap().cycle, 3);
        assert_eq!(dir.find_key("t", Some(2)).unwrap().cycle, 2);
        assert!(matches!(dir.key("t", Some(9)), Err(RootError::KeyNotFound(ref s)) if s == "t;9"));
    }

    #[test]
    fn resolve_with_cycle_suffix() {
        let (source, dir) = dir_with_keys(&[("TTree", "t", 1), ("TTree", "t", 2)]);
        assert_eq!(dir.resolve(&source, "t;1").unwrap().cycle, 1);
        assert_eq!(dir.resolve(&source, "/t").unwrap().cycle, 2);
        assert!(matches!(dir.resolve(&source, "u"), Err(RootError::KeyNotFound(_))));
        assert!(matches!(dir.resolve(&source, "t/x"), Err(RootError::KeyNotFound(_))));
    }

    #[test]
    fn cycle_parsing() {
        assert_eq!(split_cycle("a;12").unwrap(), ("a", Some(12)));
        assert_eq!(split_cycle("a").unwrap(), ("a", None));
        assert!(split_cycle("a;x").is_err());
    }
}
