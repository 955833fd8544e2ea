//! Chunked, LRU-cached byte source over a slow backing store.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use rayon::prelude::*;

use super::{check_range, ByteSource, SourceOptions};
use crate::cache::{CacheConfig, LruCache};
use crate::error::Result;

/// Backing store for a [`ChunkedSource`]: something that can fetch an exact
/// byte range, e.g. a local file, an HTTP server or a remote-file protocol.
pub trait ChunkFetcher: Send + Sync {
    /// Total size of the backing store.
    fn size(&self) -> Result<u64>;

    /// Fetch exactly the bytes `[start, stop)`.
    fn fetch(&self, start: u64, stop: u64) -> Result<Vec<u8>>;

    /// Drop the calling thread's handle, if the fetcher keeps one.
    fn dismiss(&self) {}
}

/// Byte source that reads fixed-size chunks and keeps them in an LRU cache.
///
/// A read spanning several chunks fetches each missing chunk independently;
/// with a worker pool configured, the missing chunks of one read are fetched
/// in parallel.
pub struct ChunkedSource<F> {
    fetcher: F,
    chunk_bytes: u64,
    chunks: LruCache<u64, Arc<[u8]>>,
    size: OnceLock<u64>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl<F: ChunkFetcher> ChunkedSource<F> {
    /// Wrap `fetcher` using the chunking and caching policy from `options`.
    pub fn new(fetcher: F, options: &SourceOptions) -> Self {
        Self {
            fetcher,
            chunk_bytes: options.chunk_bytes.max(1),
            chunks: LruCache::new(CacheConfig { max_bytes: options.cache_bytes, enabled: true }),
            size: OnceLock::new(),
            pool: options.pool.clone(),
        }
    }

    /// The wrapped fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Chunk size in bytes.
    pub fn chunk_bytes(&self) -> u64 {
        self.chunk_bytes
    }

    /// Number of chunks currently cached.
    pub fn cached_chunks(&self) -> usize {
        self.chunks.stats().entries
    }

    fn total_size(&self) -> Result<u64> {
        if let Some(&size) = self.size.get() {
            return Ok(size);
        }
        let size = self.fetcher.size()?;
        Ok(*self.size.get_or_init(|| size))
    }

    fn fetch_chunk(&self, index: u64, size: u64) -> Result<Arc<[u8]>> {
        let start = index * self.chunk_bytes;
        let stop = (start + self.chunk_bytes).min(size);
        let data = self.fetcher.fetch(start, stop)?;
        if data.len() as u64 != stop - start {
            return Err(crate::error::RootError::OutOfRange {
                start,
                stop,
                size: start + data.len() as u64,
            });
        }
        log::debug!("fetched chunk {index} [{start}, {stop})");
        let chunk: Arc<[u8]> = Arc::from(data);
        self.chunks.insert(index, Arc::clone(&chunk));
        Ok(chunk)
    }

    /// Make sure the given chunks are resident, fetching missing ones
    /// (in parallel when a pool is configured).
    pub fn prefetch(&self, indices: &[u64]) -> Result<()> {
        let size = self.total_size()?;
        let missing: Vec<u64> =
            indices.iter().copied().filter(|i| !self.chunks.contains(i)).collect();
        match (&self.pool, missing.len()) {
            (_, 0) => Ok(()),
            (Some(pool), n) if n > 1 => pool.install(|| {
                missing.par_iter().try_for_each(|&i| self.fetch_chunk(i, size).map(|_| ()))
            }),
            _ => missing.iter().try_for_each(|&i| self.fetch_chunk(i, size).map(|_| ())),
        }
    }

    fn chunk(&self, index: u64, size: u64) -> Result<Arc<[u8]>> {
        match self.chunks.get(&index) {
            Some(c) => Ok(c),
            None => self.fetch_chunk(index, size),
        }
    }
}

impl<F: ChunkFetcher> ByteSource for ChunkedSource<F> {
    fn read(&self, start: u64, stop: u64) -> Result<Cow<'_, [u8]>> {
        let size = self.total_size()?;
        check_range(start, stop, size)?;
        if start == stop {
            return Ok(Cow::Owned(Vec::new()));
        }

        let first = start / self.chunk_bytes;
        let last = (stop - 1) / self.chunk_bytes;
        let indices: Vec<u64> = (first..=last).collect();
        if indices.len() > 1 {
            self.prefetch(&indices)?;
        }

        let mut out = Vec::with_capacity((stop - start) as usize);
        for index in indices {
            // An evicted chunk is simply fetched again.
            let chunk = self.chunk(index, size)?;
            let chunk_start = index * self.chunk_bytes;
            let lo = start.max(chunk_start) - chunk_start;
            let hi = stop.min(chunk_start + chunk.len() as u64) - chunk_start;
            out.extend_from_slice(&chunk[lo as usize..hi as usize]);
        }
        Ok(Cow::Owned(out))
    }

    fn size(&self) -> Result<u64> {
        self.total_size()
    }

    fn dismiss(&self) {
        self.fetcher.dismiss()
    }
}
