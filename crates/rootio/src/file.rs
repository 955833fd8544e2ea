//! TFile header parsing and top-level ROOT file interface.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use crate::array::Array;
use crate::branch_reader::{self, BranchReader, BranchRequest, LazyArray, ReadOptions};
use crate::compression::Compression;
use crate::cursor::Cursor;
use crate::directory::{join, Directory};
use crate::error::{Result, RootError};
use crate::key::{Key, KeyInfo};
use crate::lazy::Lazy;
use crate::objects::{Object, StreamerInfos};
use crate::registry::ClassRegistry;
use crate::source::{
    ByteSource, ChunkedSource, FileFetcher, HttpFetcher, MemorySource, RemoteFetcher, RemoteProtocol,
    SourceOptions,
};
use crate::tree::Tree;

/// Magic bytes at the start of every ROOT file.
const ROOT_MAGIC: &[u8; 4] = b"root";

/// Bytes covering the largest (64-bit) header layout.
const HEADER_BYTES: u64 = 75;

/// Upper bound on a streamed TDirectory header (64-bit seeks).
const DIRECTORY_HEADER_BYTES: u64 = 42;

/// Parsed ROOT file header.
///
/// Layout for small files (`fVersion < 1000000`); in big files `fEND`,
/// `fSeekFree` and `fSeekInfo` are 8 bytes wide and later fields shift:
/// ```text
/// offset  size  field
///    0      4   magic "root"
///    4      4   fVersion
///    8      4   fBEGIN
///   12      4   fEND
///   16      4   fSeekFree
///   20      4   fNbytesFree
///   24      4   nfree
///   28      4   fNbytesName
///   32      1   fUnits
///   33      4   fCompress
///   37      4   fSeekInfo
///   41      4   fNbytesInfo
///   45     18   fUUID (2-byte version + 16 bytes)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// `fVersion`; `>= 1000000` selects 64-bit seeks.
    pub version: i32,
    /// `fBEGIN`: offset of the first record, the TFile key.
    pub begin: u64,
    /// `fEND`.
    pub end: u64,
    /// `fSeekFree`.
    pub seek_free: u64,
    /// `fNbytesFree`.
    pub nbytes_free: i32,
    /// Number of free segments.
    pub nfree: i32,
    /// `fNbytesName`: TFile key plus name and title.
    pub nbytes_name: i32,
    /// `fUnits`: width of seek fields (4 or 8).
    pub units: u8,
    /// `fCompress`.
    pub fcompress: i32,
    /// `fSeekInfo`: key of the streamer-info list.
    pub seek_info: u64,
    /// `fNbytesInfo`.
    pub nbytes_info: i32,
    /// `fUUID`: version followed by 16 bytes.
    pub uuid_version: u16,
    /// The 16 UUID bytes.
    pub uuid: [u8; 16],
}

impl FileHeader {
    /// Parse the header from the first bytes of a file.
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < 4 || &data[..4] != ROOT_MAGIC {
            return Err(RootError::BadMagic);
        }
        let mut c = Cursor::new(data, 0);
        c.skip(4)?;
        let version = c.i32()?;
        let large = version >= 1_000_000;
        let seek = |c: &mut Cursor<'_>| -> Result<u64> {
            let v = if large { c.i64()? } else { i64::from(c.i32()?) };
            Ok(v.max(0) as u64)
        };

        let begin = c.i32()?.max(0) as u64;
        let end = seek(&mut c)?;
        let seek_free = seek(&mut c)?;
        let nbytes_free = c.i32()?;
        let nfree = c.i32()?;
        let nbytes_name = c.i32()?;
        let units = c.u8()?;
        let fcompress = c.i32()?;
        let seek_info = seek(&mut c)?;
        let nbytes_info = c.i32()?;
        let uuid_version = c.u16()?;
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(c.bytes(16)?);

        if nbytes_name < 0 {
            return Err(RootError::format(format!("fNbytesName={nbytes_name}")));
        }
        Ok(Self {
            version,
            begin,
            end,
            seek_free,
            nbytes_free,
            nfree,
            nbytes_name,
            units,
            fcompress,
            seek_info,
            nbytes_info,
            uuid_version,
            uuid,
        })
    }

    /// Whether seeks are 64-bit.
    pub fn is_large(&self) -> bool {
        self.version >= 1_000_000
    }

    /// UUID as lowercase hex.
    pub fn uuid_hex(&self) -> String {
        self.uuid.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Shared state of an open file, handed to every reader derived from it.
pub struct FileContext {
    source: Arc<dyn ByteSource>,
    header: FileHeader,
    registry: Arc<ClassRegistry>,
    uuid: String,
    streamer_infos: Lazy<StreamerInfos>,
}

impl FileContext {
    pub(crate) fn new(source: Arc<dyn ByteSource>, header: FileHeader, registry: Arc<ClassRegistry>) -> Self {
        let uuid = header.uuid_hex();
        let streamer_infos = {
            let source = Arc::clone(&source);
            let registry = Arc::clone(&registry);
            let seek_info = header.seek_info;
            Lazy::new(move || read_streamer_infos(&*source, &registry, seek_info))
        };
        Self { source, header, registry, uuid, streamer_infos }
    }

    /// The byte source.
    pub fn source(&self) -> &dyn ByteSource {
        &*self.source
    }

    /// The parsed file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Class readers used for objects in this file.
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// File UUID as hex; prefix of every cache key.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Class layouts from the file's `StreamerInfo` record, read on first use.
    pub fn streamer_infos(&self) -> Result<Arc<StreamerInfos>> {
        self.streamer_infos.get()
    }
}

impl std::fmt::Debug for FileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContext")
            .field("uuid", &self.uuid)
            .field("header", &self.header)
            .field("streamer_infos", &self.streamer_infos)
            .finish()
    }
}

fn read_streamer_infos(source: &dyn ByteSource, registry: &ClassRegistry, seek_info: u64) -> Result<StreamerInfos> {
    if seek_info == 0 {
        return Ok(StreamerInfos::default());
    }
    let key = Key::read_at(source, seek_info)?;
    match key.read_object(source, registry)? {
        Object::List(list) => {
            let infos = StreamerInfos::from_list(&list);
            log::debug!("read {} streamer infos", infos.len());
            Ok(infos)
        }
        other => Err(RootError::format(format!("StreamerInfo record holds a {}", other.kind()))),
    }
}

/// How to open a file.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Memory-map local files instead of reading them in cached chunks. Default: `true`.
    pub memory_map: bool,
    /// Chunking, caching, timeout and retry settings for non-mapped sources.
    pub source: SourceOptions,
    /// Class readers; [`ClassRegistry::builtin`] when `None`.
    pub registry: Option<Arc<ClassRegistry>>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { memory_map: true, source: SourceOptions::default(), registry: None }
    }
}

/// A ROOT file opened for reading.
pub struct RootFile {
    ctx: Arc<FileContext>,
    root: Directory,
    name: String,
    title: String,
}

impl RootFile {
    /// Open a local file through a memory map.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    /// Open a local file.
    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let source: Arc<dyn ByteSource> = if options.memory_map {
            Arc::new(MemorySource::map(path)?)
        } else {
            Arc::new(ChunkedSource::new(FileFetcher::new(path)?, &options.source))
        };
        log::debug!("opening {}", path.display());
        Self::from_source(source, options.registry)
    }

    /// Open a file served over HTTP with range requests.
    pub fn open_http(url: &str, options: OpenOptions) -> Result<Self> {
        let fetcher = HttpFetcher::new(url, &options.source);
        Self::from_source(Arc::new(ChunkedSource::new(fetcher, &options.source)), options.registry)
    }

    /// Open a file through a remote-file protocol client.
    pub fn open_remote<P: RemoteProtocol + 'static>(protocol: P, options: OpenOptions) -> Result<Self> {
        let fetcher = RemoteFetcher::new(protocol, &options.source);
        Self::from_source(Arc::new(ChunkedSource::new(fetcher, &options.source)), options.registry)
    }

    /// Parse a ROOT file held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(Arc::new(MemorySource::from(data)), None)
    }

    /// Parse a ROOT file from any byte source.
    pub fn from_source(source: Arc<dyn ByteSource>, registry: Option<Arc<ClassRegistry>>) -> Result<Self> {
        let size = source.size()?;
        if size < 4 {
            return Err(RootError::BadMagic);
        }
        let head = source.read(0, size.min(HEADER_BYTES))?;
        let header = FileHeader::read(&head)?;
        drop(head);

        let name_stop = header.begin + header.nbytes_name as u64;
        let record = source.read(header.begin, name_stop)?;
        let file_key = Key::read(&mut Cursor::new(&record, 0))?;
        let (name, title) = match record.get(usize::from(file_key.key_len)..) {
            Some(names) => read_root_names(names).unwrap_or_else(|e| {
                log::debug!("root directory name record unreadable ({e}); using the key's");
                (file_key.name.clone(), file_key.title.clone())
            }),
            None => (file_key.name.clone(), file_key.title.clone()),
        };
        drop(record);

        let dir_stop = (name_stop + DIRECTORY_HEADER_BYTES).min(size);
        let dir_bytes = source.read(name_stop, dir_stop)?;
        let root = Directory::read(&mut Cursor::new(&dir_bytes, 0), &*source, String::new())?;
        drop(dir_bytes);

        let registry = registry.unwrap_or_else(|| Arc::new(ClassRegistry::builtin()));
        let ctx = Arc::new(FileContext::new(source, header, registry));
        log::debug!(
            "ROOT file '{name}': version {}, {}, {} top-level keys",
            ctx.header.version,
            Compression::from_fcompress(ctx.header.fcompress),
            root.keys().len()
        );
        Ok(Self { ctx, root, name, title })
    }

    /// Shared state for readers derived from this file.
    pub fn context(&self) -> &Arc<FileContext> {
        &self.ctx
    }

    /// The parsed file header.
    pub fn header(&self) -> &FileHeader {
        &self.ctx.header
    }

    /// File-level compression setting.
    pub fn compression(&self) -> Compression {
        Compression::from_fcompress(self.ctx.header.fcompress)
    }

    /// Name stored in the TFile record.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Title stored in the TFile record.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// File UUID as hex.
    pub fn uuid(&self) -> &str {
        self.ctx.uuid()
    }

    /// The top-level directory.
    pub fn root_directory(&self) -> &Directory {
        &self.root
    }

    /// Class layouts described by the file.
    pub fn streamer_infos(&self) -> Result<Arc<StreamerInfos>> {
        self.ctx.streamer_infos()
    }

    /// List all keys in the top-level directory.
    pub fn list_keys(&self) -> Vec<KeyInfo> {
        self.root.keys().iter().map(|k| KeyInfo::from_key(k, "")).collect()
    }

    /// List keys of every directory, depth-first.
    ///
    /// A subdirectory that cannot be read is logged and skipped when the
    /// failure only concerns that directory.
    pub fn list_keys_recursive(&self) -> Result<Vec<KeyInfo>> {
        let mut out = Vec::new();
        self.walk(&self.root, &mut out)?;
        Ok(out)
    }

    fn walk(&self, dir: &Directory, out: &mut Vec<KeyInfo>) -> Result<()> {
        for key in dir.keys() {
            out.push(KeyInfo::from_key(key, &dir.path));
            if !key.is_directory() {
                continue;
            }
            match Directory::read_from_key(key, self.ctx.source(), join(&dir.path, &key.name)) {
                Ok(sub) => self.walk(&sub, out)?,
                Err(e) if e.is_recoverable() => {
                    log::warn!("skipping directory '{}': {e}", join(&dir.path, &key.name));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Look up a key by `/`-separated path with an optional `;cycle`.
    pub fn get_key(&self, path: &str) -> Result<Key> {
        self.root.resolve(self.ctx.source(), path)
    }

    /// Read a subdirectory.
    pub fn get_directory(&self, path: &str) -> Result<Directory> {
        let key = self.get_key(path)?;
        if !key.is_directory() {
            return Err(RootError::KeyNotFound(format!("{path} (a {}, not a directory)", key.class_name)));
        }
        let dir_path = path.split('/').filter(|s| !s.is_empty()).map(|p| p.split(';').next().unwrap_or(p));
        Directory::read_from_key(&key, self.ctx.source(), dir_path.collect::<Vec<_>>().join("/"))
    }

    /// Read and decode the object stored at `path`.
    pub fn get_object(&self, path: &str) -> Result<Object> {
        let key = self.get_key(path)?;
        if key.is_directory() {
            return Err(RootError::format(format!("'{path}' is a directory")));
        }
        key.read_object(self.ctx.source(), self.ctx.registry())
    }

    /// Read the TTree stored at `path`.
    pub fn get_tree(&self, path: &str) -> Result<Arc<Tree>> {
        match self.get_object(path)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(RootError::KeyNotFound(format!("{path} (a {}, not a TTree)", other.kind()))),
        }
    }

    /// Reader for one branch of `tree`, interpreted automatically.
    pub fn branch_reader(&self, tree: &Arc<Tree>, branch: &str) -> Result<BranchReader> {
        BranchReader::new(Arc::clone(&self.ctx), Arc::clone(tree), branch, None)
    }

    /// Materialize `branches` over `entries`.
    ///
    /// All branches are resolved before any basket is read; the first
    /// failure aborts the whole read.
    pub fn arrays(
        &self,
        tree: &Arc<Tree>,
        branches: &[BranchRequest],
        entries: Range<u64>,
        options: &ReadOptions,
    ) -> Result<Vec<(String, Arc<Array>)>> {
        branch_reader::read_arrays(&self.ctx, tree, branches, entries, options)
    }

    /// Like [`RootFile::arrays`], but every branch succeeds or fails on its own.
    pub fn try_arrays(
        &self,
        tree: &Arc<Tree>,
        branches: &[BranchRequest],
        entries: Range<u64>,
        options: &ReadOptions,
    ) -> Vec<(String, Result<Arc<Array>>)> {
        branch_reader::try_read_arrays(&self.ctx, tree, branches, entries, options)
    }

    /// A branch whose baskets are decoded on first access.
    pub fn lazy_array(&self, tree: &Arc<Tree>, branch: &str, options: &ReadOptions) -> Result<LazyArray> {
        Ok(self.branch_reader(tree, branch)?.lazy(options))
    }
}

impl std::fmt::Debug for RootFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootFile")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("uuid", &self.ctx.uuid)
            .field("keys", &self.root.keys().len())
            .finish()
    }
}

/// Name and title of the root directory.
///
/// Unlike every other string in the format, each is followed by a NUL. An
/// empty title leaves a single zero byte, so the NUL after the name is only
/// consumed when a title still follows it.
fn read_root_names(bytes: &[u8]) -> Result<(String, String)> {
    let mut c = Cursor::new(bytes, 0);
    let name = c.string()?;
    if c.remaining() >= 2 && bytes[c.pos()] == 0 {
        c.skip(1)?;
    }
    let title = c.string()?;
    Ok((name, title))
}
