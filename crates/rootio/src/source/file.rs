//! Local-file fetcher with one file handle per thread.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};

use super::chunked::ChunkFetcher;
use crate::error::{Result, RootError};

/// Fetches byte ranges from a local file.
///
/// Plain file handles carry a seek position, so each thread gets its own
/// handle, opened on first use and dropped by [`ChunkFetcher::dismiss`].
pub struct FileFetcher {
    path: PathBuf,
    size: u64,
    handles: Mutex<HashMap<ThreadId, File>>,
}

impl FileFetcher {
    /// Open `path` to learn its size; handles are opened lazily per thread.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)?.len();
        Ok(Self { path, size, handles: Mutex::new(HashMap::new()) })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of per-thread handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn take_handle(&self) -> Result<File> {
        let id = thread::current().id();
        let existing = self.handles.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
        match existing {
            Some(f) => Ok(f),
            None => Ok(File::open(&self.path)?),
        }
    }

    fn return_handle(&self, file: File) {
        let id = thread::current().id();
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).insert(id, file);
    }
}

impl ChunkFetcher for FileFetcher {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn fetch(&self, start: u64, stop: u64) -> Result<Vec<u8>> {
        if stop > self.size || start > stop {
            return Err(RootError::OutOfRange { start, stop, size: self.size });
        }
        let mut file = self.take_handle()?;
        let mut buf = vec![0u8; (stop - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf)?;
        self.return_handle(file);
        Ok(buf)
    }

    fn dismiss(&self) {
        let id = thread::current().id();
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ByteSource, ChunkedSource, SourceOptions};

    fn temp_file(name: &str, data: &[u8]) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("rootio-{}-{}-{name}", std::process::id(), line!()));
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn fetch_and_dismiss_handles() {
        let data: Vec<u8> = (0..200u8).collect();
        let path = temp_file("fetch", &data);
        let fetcher = FileFetcher::new(&path).unwrap();
        assert_eq!(fetcher.fetch(10, 20).unwrap(), (10..20u8).collect::<Vec<_>>());
        assert_eq!(fetcher.open_handles(), 1);
        fetcher.dismiss();
        assert_eq!(fetcher.open_handles(), 0);
        assert!(fetcher.fetch(150, 201).is_err());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn chunked_file_source_reads_across_chunks() {
        let data: Vec<u8> = (0..255u8).cycle().take(3000).collect();
        let path = temp_file("chunked", &data);
        let options = SourceOptions { chunk_bytes: 512, ..SourceOptions::default() };
        let src = ChunkedSource::new(FileFetcher::new(&path).unwrap(), &options);
        assert_eq!(&*src.read(500, 1600).unwrap(), &data[500..1600]);
        src.dismiss();
        assert_eq!(src.fetcher().open_handles(), 0);
        std::fs::remove_file(path).ok();
    }
}
