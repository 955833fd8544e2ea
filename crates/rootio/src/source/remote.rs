//! Fetcher for domain-specific remote-file protocols.
//!
//! The protocol client itself is an external collaborator: it implements
//! [`RemoteProtocol`], and [`RemoteFetcher`] adds the per-thread handle
//! management and the retry policy shared with the HTTP source.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use super::chunked::ChunkFetcher;
use super::{with_retry, SourceOptions};
use crate::error::{Result, RootError};

/// A remote-file protocol client.
///
/// Handles are assumed not to be thread-safe; each thread gets its own.
pub trait RemoteProtocol: Send + Sync {
    /// An open connection to the remote file.
    type Handle: Send;

    /// Open a new handle.
    fn connect(&self) -> Result<Self::Handle>;

    /// Size of the remote file.
    fn size(&self, handle: &mut Self::Handle) -> Result<u64>;

    /// Read exactly `[start, stop)`.
    fn read(&self, handle: &mut Self::Handle, start: u64, stop: u64) -> Result<Vec<u8>>;

    /// Whether an error is transient and worth one retry.
    fn is_transient(&self, error: &RootError) -> bool {
        matches!(error, RootError::Http { status: None | Some(504), .. } | RootError::Io(_))
    }
}

/// [`ChunkFetcher`] over a [`RemoteProtocol`] with one handle per thread.
pub struct RemoteFetcher<P: RemoteProtocol> {
    protocol: P,
    retry: bool,
    handles: Mutex<HashMap<ThreadId, P::Handle>>,
    size: OnceLock<u64>,
}

impl<P: RemoteProtocol> RemoteFetcher<P> {
    /// Wrap a protocol client.
    pub fn new(protocol: P, options: &SourceOptions) -> Self {
        Self { protocol, retry: options.retry, handles: Mutex::new(HashMap::new()), size: OnceLock::new() }
    }

    /// The wrapped protocol client.
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    fn with_handle<T>(&self, op: impl Fn(&mut P::Handle) -> Result<T>) -> Result<T> {
        let id = thread::current().id();
        let existing = self.handles.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
        let mut handle = match existing {
            Some(h) => h,
            None => self.protocol.connect()?,
        };
        let out = op(&mut handle);
        // A handle that failed is dropped instead of being reused.
        if out.is_ok() {
            self.handles.lock().unwrap_or_else(PoisonError::into_inner).insert(id, handle);
        }
        out
    }
}

impl<P: RemoteProtocol> ChunkFetcher for RemoteFetcher<P> {
    fn size(&self) -> Result<u64> {
        if let Some(&size) = self.size.get() {
            return Ok(size);
        }
        let size = with_retry(
            self.retry,
            "remote size",
            |e| self.protocol.is_transient(e),
            || self.with_handle(|h| self.protocol.size(h)),
        )?;
        Ok(*self.size.get_or_init(|| size))
    }

    fn fetch(&self, start: u64, stop: u64) -> Result<Vec<u8>> {
        with_retry(
            self.retry,
            "remote read",
            |e| self.protocol.is_transient(e),
            || self.with_handle(|h| self.protocol.read(h, start, stop)),
        )
    }

    fn dismiss(&self) {
        let id = thread::current().id();
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }
}
