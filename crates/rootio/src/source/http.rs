//! HTTP range-request fetcher.

use std::io::Read;
use std::sync::OnceLock;

use super::chunked::ChunkFetcher;
use super::{with_retry, SourceOptions};
use crate::error::{Result, RootError};

/// Fetches byte ranges with `Range: bytes=a-b` GET requests.
///
/// `ureq` agents are thread-safe, so one agent is shared by all threads.
/// Each request has the configured timeout; a `504` or transport failure is
/// retried once.
pub struct HttpFetcher {
    url: String,
    agent: ureq::Agent,
    retry: bool,
    size: OnceLock<u64>,
}

/// Value of the `Range` header for `[start, stop)`.
pub(crate) fn range_header(start: u64, stop: u64) -> String {
    format!("bytes={}-{}", start, stop.saturating_sub(1))
}

/// Total size from a `Content-Range: bytes a-b/total` header.
pub(crate) fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// A gateway timeout, or a failure before any response arrived.
fn is_transient(e: &RootError) -> bool {
    matches!(e, RootError::Http { status: None | Some(504), .. })
}

fn map_err(url: &str, e: ureq::Error) -> RootError {
    match e {
        ureq::Error::Status(code, _) => RootError::http(Some(code), format!("{code} from {url}")),
        ureq::Error::Transport(t) => RootError::http(None, format!("transport: {t}")),
    }
}

impl HttpFetcher {
    /// Create a fetcher for `url` using the timeout and retry policy of `options`.
    pub fn new(url: impl Into<String>, options: &SourceOptions) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(options.timeout).build();
        Self { url: url.into(), agent, retry: options.retry, size: OnceLock::new() }
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_size(&self) -> Result<u64> {
        let resp = with_retry(self.retry, &self.url, is_transient, || {
            self.agent
                .get(&self.url)
                .set("Range", &range_header(0, 1))
                .call()
                .map_err(|e| map_err(&self.url, e))
        })?;
        if let Some(total) = resp.header("Content-Range").and_then(parse_content_range_total) {
            return Ok(total);
        }
        resp.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| RootError::http(Some(resp.status()), format!("{}: server reports no size", self.url)))
    }
}

impl ChunkFetcher for HttpFetcher {
    fn size(&self) -> Result<u64> {
        if let Some(&size) = self.size.get() {
            return Ok(size);
        }
        let size = self.request_size()?;
        Ok(*self.size.get_or_init(|| size))
    }

    fn fetch(&self, start: u64, stop: u64) -> Result<Vec<u8>> {
        let want = (stop - start) as usize;
        with_retry(self.retry, &self.url, is_transient, || {
            let resp = self
                .agent
                .get(&self.url)
                .set("Range", &range_header(start, stop))
                .call()
                .map_err(|e| map_err(&self.url, e))?;
            // A server ignoring the Range header answers 200 with the whole body.
            let skip = if resp.status() == 200 { start } else { 0 };
            let mut buf = Vec::with_capacity(want);
            resp.into_reader()
                .take(skip + want as u64)
                .read_to_end(&mut buf)
                .map_err(|e| RootError::http(None, format!("transport: {e}")))?;
            let body = buf.split_off((skip as usize).min(buf.len()));
            if body.len() != want {
                return Err(RootError::OutOfRange {
                    start,
                    stop,
                    size: start + body.len() as u64,
                });
            }
            Ok(body)
        })
    }
}
