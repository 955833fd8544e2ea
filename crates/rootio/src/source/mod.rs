//! Random-access byte providers backing a ROOT file.
//!
//! Every variant implements [`ByteSource`]. Memory-backed sources hand out
//! zero-copy slices; chunked sources assemble owned buffers from an LRU cache
//! of fixed-size chunks fetched from a [`ChunkFetcher`].

mod chunked;
mod file;
mod http;
mod memory;
mod remote;

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, RootError};

pub use chunked::{ChunkFetcher, ChunkedSource};
pub use file::FileFetcher;
pub use http::HttpFetcher;
pub use memory::MemorySource;
pub use remote::{RemoteFetcher, RemoteProtocol};

/// Uniform random-access byte provider.
///
/// `read` never returns fewer bytes than requested: a range past the end is
/// [`RootError::OutOfRange`].
pub trait ByteSource: Send + Sync {
    /// Read bytes `[start, stop)`.
    fn read(&self, start: u64, stop: u64) -> Result<Cow<'_, [u8]>>;

    /// Total size in bytes.
    fn size(&self) -> Result<u64>;

    /// Release any per-thread handle held for the calling thread.
    ///
    /// Cached data stays valid.
    fn dismiss(&self) {}
}

impl<S: ByteSource + ?Sized> ByteSource for Arc<S> {
    fn read(&self, start: u64, stop: u64) -> Result<Cow<'_, [u8]>> {
        (**self).read(start, stop)
    }

    fn size(&self) -> Result<u64> {
        (**self).size()
    }

    fn dismiss(&self) {
        (**self).dismiss()
    }
}

/// Configuration shared by the chunked and network-backed sources.
#[derive(Clone)]
pub struct SourceOptions {
    /// Size of one cached chunk in bytes. Default: 1 MiB.
    pub chunk_bytes: u64,
    /// Byte budget of the chunk cache. Default: 100 MiB.
    pub cache_bytes: usize,
    /// Per-request timeout for network sources. Default: 30 s.
    pub timeout: Duration,
    /// Retry once on `504` or transport errors. Default: `true`.
    pub retry: bool,
    /// Worker pool used to fetch the chunks of one read in parallel.
    pub pool: Option<Arc<rayon::ThreadPool>>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            chunk_bytes: 1024 * 1024,
            cache_bytes: 100 * 1024 * 1024,
            timeout: Duration::from_secs(30),
            retry: true,
            pool: None,
        }
    }
}

impl std::fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceOptions")
            .field("chunk_bytes", &self.chunk_bytes)
            .field("cache_bytes", &self.cache_bytes)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("pool", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

/// Validate `[start, stop)` against `size`.
pub(crate) fn check_range(start: u64, stop: u64, size: u64) -> Result<()> {
    if start > stop || stop > size {
        return Err(RootError::OutOfRange { start, stop, size });
    }
    Ok(())
}

/// Run `op`, retrying once when `retryable` accepts the first error.
pub(crate) fn with_retry<T>(
    retry: bool,
    what: &str,
    retryable: impl Fn(&RootError) -> bool,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    match op() {
        Ok(v) => Ok(v),
        Err(e) if retry && retryable(&e) => {
            log::warn!("{what}: {e}; retrying once");
            op()
        }
        Err(e) => Err(e),
    }
}
