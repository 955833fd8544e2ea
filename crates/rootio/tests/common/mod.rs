//! In-memory ROOT file writer for the integration tests.
//!
//! Produces small-seek files (version 6.22) with a root directory,
//! optional subdirectories, TTrees whose baskets are written ahead of the
//! tree record, arbitrary tagged objects and a streamer-info record.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

/// `fBEGIN` of every generated file.
pub const BEGIN: usize = 100;

const K_BYTE_COUNT_MASK: u32 = 0x4000_0000;
const K_CLASS_MASK: u32 = 0x8000_0000;
const K_NEW_CLASS_TAG: u32 = 0xFFFF_FFFF;
const K_MAP_OFFSET: u32 = 2;

static NEXT_UUID: AtomicU8 = AtomicU8::new(1);

/// Record compression used by a generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Zlib,
    Lzma,
    Lz4,
    Zstd,
}

impl Codec {
    pub const ALL: [Codec; 5] = [Codec::None, Codec::Zlib, Codec::Lzma, Codec::Lz4, Codec::Zstd];

    pub fn fcompress(self) -> i32 {
        match self {
            Codec::None => 0,
            Codec::Zlib => 101,
            Codec::Lzma => 207,
            Codec::Lz4 => 404,
            Codec::Zstd => 505,
        }
    }

    /// One compressed block with its 9-byte header, or `data` unchanged.
    pub fn frame(self, data: &[u8]) -> Vec<u8> {
        let (tag, method, body): (&[u8; 2], u8, Vec<u8>) = match self {
            Codec::None => return data.to_vec(),
            Codec::Zlib => {
                let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(data).unwrap();
                (b"ZL", 8, enc.finish().unwrap())
            }
            Codec::Lzma => {
                let mut out = Vec::new();
                lzma_rs::xz_compress(&mut std::io::BufReader::new(data), &mut out).unwrap();
                (b"XZ", 0, out)
            }
            Codec::Lz4 => {
                // The 8-byte checksum is not verified on read.
                let mut out = vec![0u8; 8];
                out.extend(lz4_flex::compress(data));
                (b"L4", 1, out)
            }
            Codec::Zstd => (
                b"ZS",
                1,
                ruzstd::encoding::compress_to_vec(data, ruzstd::encoding::CompressionLevel::Fastest),
            ),
        };
        if body.len() + 9 == data.len() {
            // Would read back as an uncompressed record.
            return data.to_vec();
        }
        let mut out = tag.to_vec();
        out.push(method);
        out.extend_from_slice(&le24(body.len()));
        out.extend_from_slice(&le24(data.len()));
        out.extend(body);
        out
    }
}

fn le24(n: usize) -> [u8; 3] {
    assert!(n < 1 << 24);
    [(n & 0xFF) as u8, ((n >> 8) & 0xFF) as u8, ((n >> 16) & 0xFF) as u8]
}

/// Bytes of a length-prefixed ROOT string.
pub fn string_len(s: &str) -> usize {
    if s.len() < 255 {
        1 + s.len()
    } else {
        5 + s.len()
    }
}

/// `fKeylen` of a version-4 key.
pub fn key_len(class: &str, name: &str, title: &str) -> usize {
    26 + string_len(class) + string_len(name) + string_len(title)
}

/// Big-endian record writer that assigns class and object reference tags the
/// way the reader's reference map expects them.
#[derive(Debug, Default)]
pub struct Streamer {
    pub buf: Vec<u8>,
    key_len: usize,
    classes: HashMap<String, u32>,
    objects: HashMap<String, u32>,
}

impl Streamer {
    /// Writer for a payload that follows a key of `key_len` bytes.
    pub fn new(key_len: usize) -> Self {
        Self { key_len, ..Default::default() }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn string(&mut self, s: &str) {
        if s.len() < 255 {
            self.u8(s.len() as u8);
        } else {
            self.u8(255);
            self.u32(s.len() as u32);
        }
        self.bytes(s.as_bytes());
    }

    fn ref_pos(&self) -> u32 {
        (self.buf.len() + self.key_len) as u32
    }

    fn patch_count(&mut self, at: usize) {
        let n = (self.buf.len() - at - 4) as u32 | K_BYTE_COUNT_MASK;
        self.buf[at..at + 4].copy_from_slice(&n.to_be_bytes());
    }

    /// Byte count, version, then `body`.
    pub fn versioned(&mut self, version: u16, body: impl FnOnce(&mut Self)) {
        let at = self.buf.len();
        self.u32(0);
        self.u16(version);
        body(self);
        self.patch_count(at);
    }

    pub fn tobject(&mut self) {
        self.u16(1);
        self.u32(0);
        self.u32(0x0300_0000);
    }

    pub fn tnamed(&mut self, name: &str, title: &str) {
        self.versioned(1, |s| {
            s.tobject();
            s.string(name);
            s.string(title);
        });
    }

    /// A tagged object of `class`; returns its reference tag.
    pub fn object(&mut self, class: &str, body: impl FnOnce(&mut Self)) -> u32 {
        let beg = self.ref_pos();
        let at = self.buf.len();
        self.u32(0);
        match self.classes.get(class).copied() {
            Some(tag) => self.u32(tag | K_CLASS_MASK),
            None => {
                let start = self.ref_pos();
                self.u32(K_NEW_CLASS_TAG);
                self.bytes(class.as_bytes());
                self.u8(0);
                self.classes.insert(class.to_string(), start + K_MAP_OFFSET);
            }
        }
        body(self);
        self.patch_count(at);
        beg + K_MAP_OFFSET
    }

    /// Like [`Streamer::object`], remembering the tag under `label`.
    pub fn named_object(&mut self, label: &str, class: &str, body: impl FnOnce(&mut Self)) -> u32 {
        let tag = self.object(class, body);
        self.objects.insert(label.to_string(), tag);
        tag
    }

    /// Back-reference to an object written under `label`, or null.
    pub fn reference(&mut self, label: Option<&str>) {
        let tag = label.map_or(0, |l| self.objects[l]);
        self.u32(tag);
    }

    pub fn null(&mut self) {
        self.u32(0);
    }

    /// Untagged `TObjArray` of `n` items.
    pub fn objarray(&mut self, n: usize, mut item: impl FnMut(&mut Self, usize)) {
        self.versioned(3, |s| {
            s.tobject();
            s.string("");
            s.i32(n as i32);
            s.i32(0);
            for i in 0..n {
                item(s, i);
            }
        });
    }

    /// Untagged `TList` of `n` items, each with an empty option.
    pub fn list(&mut self, n: usize, mut item: impl FnMut(&mut Self, usize)) {
        self.versioned(5, |s| {
            s.tobject();
            s.string("");
            s.i32(n as i32);
            for i in 0..n {
                item(s, i);
                s.u8(0);
            }
        });
    }

    pub fn objstring(&mut self, text: &str) -> u32 {
        self.object("TObjString", |s| {
            s.versioned(1, |s| {
                s.tobject();
                s.string(text);
            })
        })
    }
}

/// Type of a leaf as written by `TTree::Branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
    /// `TLeafElement` with a streamer type code.
    Element(i32),
}

impl LeafType {
    fn class(self) -> &'static str {
        match self {
            LeafType::Bool => "TLeafO",
            LeafType::I8 => "TLeafB",
            LeafType::I16 => "TLeafS",
            LeafType::I32 => "TLeafI",
            LeafType::I64 => "TLeafL",
            LeafType::F32 => "TLeafF",
            LeafType::F64 => "TLeafD",
            LeafType::Char => "TLeafC",
            LeafType::Element(_) => "TLeafElement",
        }
    }

    fn len_type(self) -> i32 {
        match self {
            LeafType::Bool | LeafType::I8 | LeafType::Char => 1,
            LeafType::I16 => 2,
            LeafType::I32 | LeafType::F32 => 4,
            LeafType::I64 | LeafType::F64 => 8,
            LeafType::Element(_) => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeafSpec {
    pub name: String,
    pub title: String,
    pub ty: LeafType,
    pub len: i32,
    pub unsigned: bool,
    /// Name of the counter leaf, written before this one.
    pub counter: Option<String>,
}

impl LeafSpec {
    pub fn new(name: &str, title: &str, ty: LeafType) -> Self {
        Self { name: name.into(), title: title.into(), ty, len: 1, unsigned: false, counter: None }
    }

    pub fn counted_by(mut self, counter: &str) -> Self {
        self.counter = Some(counter.into());
        self
    }

    pub fn with_len(mut self, len: i32) -> Self {
        self.len = len;
        self
    }
}

/// `TBranchElement` members.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub class_name: String,
    pub id: i32,
    pub type_code: i32,
    pub streamer_type: i32,
    pub count_branch: Option<String>,
}

impl ElementSpec {
    /// A top-level STL container such as `vector<float>`.
    pub fn stl(class_name: &str) -> Self {
        Self { class_name: class_name.into(), id: -1, type_code: 0, streamer_type: -1, count_branch: None }
    }

    /// Member `id` of a class described by the streamer infos.
    pub fn member(class_name: &str, id: i32, type_code: i32) -> Self {
        Self { class_name: class_name.into(), id, type_code, streamer_type: type_code, count_branch: None }
    }
}

/// Location of a basket written by [`FileBuilder::basket`].
#[derive(Debug, Clone, Copy)]
pub struct BasketLoc {
    pub first_entry: i64,
    pub seek: u64,
    pub nbytes: i32,
}

#[derive(Debug, Clone)]
pub struct BranchSpec {
    pub name: String,
    pub title: String,
    pub entries: u64,
    pub leaves: Vec<LeafSpec>,
    pub baskets: Vec<BasketLoc>,
    pub element: Option<ElementSpec>,
    /// First entry of a basket left in memory when the file was closed.
    pub unwritten_from: Option<u64>,
}

impl BranchSpec {
    pub fn new(name: &str, entries: u64, leaf: LeafSpec, baskets: Vec<BasketLoc>) -> Self {
        Self {
            name: name.into(),
            title: leaf.title.clone(),
            entries,
            leaves: vec![leaf],
            baskets,
            element: None,
            unwritten_from: None,
        }
    }

    pub fn unwritten_from(mut self, entry: u64) -> Self {
        self.unwritten_from = Some(entry);
        self
    }

    pub fn element(mut self, element: ElementSpec) -> Self {
        self.element = Some(element);
        self
    }
}

struct DirFrame {
    name: String,
    seek_dir: usize,
    keys: Vec<Vec<u8>>,
}

/// Builds a ROOT file in memory.
pub struct FileBuilder {
    buf: Vec<u8>,
    codec: Codec,
    dirs: Vec<DirFrame>,
    nbytes_name: usize,
    seek_info: usize,
    nbytes_info: usize,
    uuid: [u8; 16],
}

fn key_header(
    n_bytes: usize,
    obj_len: usize,
    key_len: usize,
    cycle: u16,
    seek_key: usize,
    seek_pdir: usize,
    names: [&str; 3],
) -> Vec<u8> {
    let mut s = Streamer::new(0);
    s.i32(n_bytes as i32);
    s.u16(4);
    s.i32(obj_len as i32);
    s.u32(0x6A52_1000);
    s.u16(key_len as u16);
    s.u16(cycle);
    s.i32(seek_key as i32);
    s.i32(seek_pdir as i32);
    for n in names {
        s.string(n);
    }
    s.buf
}

impl FileBuilder {
    pub fn new(codec: Codec) -> Self {
        let mut uuid = [0u8; 16];
        uuid[0] = NEXT_UUID.fetch_add(1, Ordering::Relaxed);
        uuid[15] = codec.fcompress() as u8;

        let (name, title) = ("test.root", "synthetic");
        let mut names = Streamer::new(0);
        names.string(name);
        names.u8(0);
        names.string(title);
        names.u8(0);
        let klen = key_len("TFile", name, title);
        let nbytes_name = klen + names.buf.len();

        let mut dir = Streamer::new(0);
        dir.u16(5);
        dir.u32(0x6A52_1000);
        dir.u32(0x6A52_1000);
        dir.i32(0);
        dir.i32(nbytes_name as i32);
        dir.i32(BEGIN as i32);
        dir.i32(0);
        dir.i32(0);

        let obj_len = names.buf.len() + dir.buf.len();
        let mut buf = vec![0u8; BEGIN];
        buf.extend(key_header(klen + obj_len, obj_len, klen, 1, BEGIN, 0, ["TFile", name, title]));
        buf.extend(names.buf);
        buf.extend(dir.buf);

        Self {
            buf,
            codec,
            dirs: vec![DirFrame { name: name.into(), seek_dir: BEGIN, keys: Vec::new() }],
            nbytes_name,
            seek_info: 0,
            nbytes_info: 0,
            uuid,
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    fn current_seek_dir(&self) -> usize {
        self.dirs.last().map_or(BEGIN, |d| d.seek_dir)
    }

    /// Append a keyed record; returns `(seek, header)`.
    fn record(&mut self, names: [&str; 3], cycle: u16, payload: &[u8], compress: bool) -> (usize, Vec<u8>) {
        let klen = key_len(names[0], names[1], names[2]);
        let stored = if compress { self.codec.frame(payload) } else { payload.to_vec() };
        let seek = self.buf.len();
        let header =
            key_header(klen + stored.len(), payload.len(), klen, cycle, seek, self.current_seek_dir(), names);
        self.buf.extend_from_slice(&header);
        self.buf.extend(stored);
        (seek, header)
    }

    /// Write an object under a key in the current directory; `body` streams the payload.
    pub fn object_key(
        &mut self,
        class: &str,
        name: &str,
        title: &str,
        cycle: u16,
        body: impl FnOnce(&mut Streamer),
    ) -> u64 {
        let mut s = Streamer::new(key_len(class, name, title));
        body(&mut s);
        let (seek, header) = self.record([class, name, title], cycle, &s.buf, true);
        if let Some(dir) = self.dirs.last_mut() {
            dir.keys.push(header);
        }
        seek as u64
    }

    /// A key whose payload is stored as given.
    pub fn raw_key(&mut self, class: &str, name: &str, payload: &[u8], compress: bool) -> u64 {
        let (seek, header) = self.record([class, name, ""], 1, payload, compress);
        if let Some(dir) = self.dirs.last_mut() {
            dir.keys.push(header);
        }
        seek as u64
    }

    pub fn objstring(&mut self, name: &str, text: &str, cycle: u16) -> u64 {
        self.object_key("TObjString", name, "", cycle, |s| {
            s.versioned(1, |s| {
                s.tobject();
                s.string(text);
            })
        })
    }

    /// Streamer-info record describing `Event` with float members `names`.
    pub fn streamer_info(&mut self, class: &str, members: &[&str]) {
        let klen = key_len("TList", "StreamerInfo", "Doubly linked list");
        let mut s = Streamer::new(klen);
        s.list(1, |s, _| {
            s.object("TStreamerInfo", |s| {
                s.versioned(9, |s| {
                    s.tnamed(class, "");
                    s.u32(0x1234_5678);
                    s.i32(1);
                    s.object("TObjArray", |s| {
                        s.objarray(members.len(), |s, i| {
                            s.object("TStreamerBasicType", |s| {
                                s.versioned(2, |s| {
                                    s.versioned(4, |s| {
                                        s.tnamed(members[i], "");
                                        s.i32(5);
                                        s.i32(4);
                                        s.i32(0);
                                        s.i32(0);
                                        for _ in 0..5 {
                                            s.i32(0);
                                        }
                                        s.string("float");
                                    })
                                })
                            });
                        })
                    });
                })
            });
        });
        let (seek, header) = self.record(["TList", "StreamerInfo", "Doubly linked list"], 1, &s.buf, true);
        debug_assert_eq!(header.len(), klen);
        self.seek_info = seek;
        self.nbytes_info = self.buf.len() - seek;
    }

    /// Write one basket of `nev` entries; `offsets` are payload-relative entry starts.
    pub fn basket(&mut self, first_entry: i64, data: &[u8], nev: usize, offsets: Option<&[usize]>) -> BasketLoc {
        let names = ["TBasket", "b", "t"];
        let klen = key_len(names[0], names[1], names[2]) + 19;
        let mut payload = data.to_vec();
        if let Some(offsets) = offsets {
            assert_eq!(offsets.len(), nev);
            payload.extend_from_slice(&(nev as i32 + 1).to_be_bytes());
            for o in offsets {
                payload.extend_from_slice(&((o + klen) as i32).to_be_bytes());
            }
            payload.extend_from_slice(&0i32.to_be_bytes());
        }
        let stored = self.codec.frame(&payload);
        let seek = self.buf.len();
        let n_bytes = klen + stored.len();
        let mut header = key_header(n_bytes, payload.len(), klen, 1, seek, BEGIN, names);
        header.extend_from_slice(&3u16.to_be_bytes());
        header.extend_from_slice(&32000i32.to_be_bytes());
        header.extend_from_slice(&(if offsets.is_some() { nev as i32 + 1 } else { 1 }).to_be_bytes());
        header.extend_from_slice(&(nev as i32).to_be_bytes());
        header.extend_from_slice(&((klen + data.len()) as i32).to_be_bytes());
        header.push(0);
        self.buf.extend(header);
        self.buf.extend(stored);
        BasketLoc { first_entry, seek: seek as u64, nbytes: n_bytes as i32 }
    }

    /// Split `entries` (one byte string per entry) into baskets starting at `starts`.
    pub fn baskets(&mut self, entries: &[Vec<u8>], starts: &[usize], with_offsets: bool) -> Vec<BasketLoc> {
        let mut out = Vec::new();
        for (i, &start) in starts.iter().enumerate() {
            let stop = starts.get(i + 1).copied().unwrap_or(entries.len());
            let mut data = Vec::new();
            let mut offsets = Vec::new();
            for e in &entries[start..stop] {
                offsets.push(data.len());
                data.extend_from_slice(e);
            }
            let offsets = with_offsets.then_some(&offsets[..]);
            out.push(self.basket(start as i64, &data, stop - start, offsets));
        }
        out
    }

    /// Write a `TTree` key holding `branches` in the current directory.
    pub fn tree(&mut self, name: &str, entries: u64, branches: &[BranchSpec]) -> u64 {
        let fcompress = self.codec.fcompress();
        self.object_key("TTree", name, name, 1, |s| {
            s.versioned(20, |s| {
                s.tnamed(name, name);
                s.versioned(2, |s| s.bytes(&[0, 1, 0, 1, 0, 1]));
                s.versioned(2, |s| s.bytes(&[0, 0, 3, 233]));
                s.versioned(2, |s| s.bytes(&[0, 1, 0, 1, 0x3F, 0x80, 0, 0]));
                s.i64(entries as i64);
                s.i64(0);
                s.i64(0);
                s.i64(0);
                s.i64(0);
                s.f64(1.0);
                s.i32(0);
                s.i32(25);
                s.i32(0);
                s.i32(1000);
                s.i32(0);
                s.i64(i64::MAX);
                s.i64(i64::MAX);
                s.i64(0);
                s.i64(-300_000_000);
                s.i64(-30_000_000);
                s.i64(1_000_000);
                s.u8(0);
                s.u8(0);
                s.versioned(1, |s| s.u8(0));
                s.objarray(branches.len(), |s, i| write_branch(s, &branches[i], fcompress));
                let leaves: Vec<&str> =
                    branches.iter().flat_map(|b| b.leaves.iter().map(|l| l.name.as_str())).collect();
                s.objarray(leaves.len(), |s, i| s.reference(Some(&*format!("leaf:{}", leaves[i]))));
                s.null();
                s.i32(0);
                s.i32(0);
                s.null();
                s.null();
                s.null();
                s.null();
            })
        })
    }

    /// Open a subdirectory; keys go into it until [`FileBuilder::end_dir`].
    pub fn mkdir(&mut self, name: &str) {
        self.dirs.push(DirFrame { name: name.into(), seek_dir: 0, keys: Vec::new() });
    }

    fn write_key_list(&mut self, frame: &DirFrame) -> (usize, usize) {
        let mut payload = (frame.keys.len() as i32).to_be_bytes().to_vec();
        for k in &frame.keys {
            payload.extend_from_slice(k);
        }
        let klen = key_len("TDirectory", &frame.name, "");
        let seek = self.buf.len();
        let header =
            key_header(klen + payload.len(), payload.len(), klen, 1, seek, frame.seek_dir, ["TDirectory", &frame.name, ""]);
        self.buf.extend(header);
        self.buf.extend(payload);
        (seek, self.buf.len() - seek)
    }

    /// Close the innermost subdirectory: its key list, then its directory record.
    pub fn end_dir(&mut self) {
        assert!(self.dirs.len() > 1, "no open subdirectory");
        let Some(frame) = self.dirs.pop() else { return };
        let (seek_keys, nbytes_keys) = self.write_key_list(&frame);
        let parent = self.current_seek_dir();
        let seek_dir = self.buf.len();
        let mut dir = Streamer::new(0);
        dir.u16(5);
        dir.u32(0x6A52_1000);
        dir.u32(0x6A52_1000);
        dir.i32(nbytes_keys as i32);
        dir.i32(0);
        dir.i32(seek_dir as i32);
        dir.i32(parent as i32);
        dir.i32(seek_keys as i32);
        let (_, header) = self.record(["TDirectoryFile", &frame.name, ""], 1, &dir.buf, false);
        if let Some(parent) = self.dirs.last_mut() {
            parent.keys.push(header);
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        while self.dirs.len() > 1 {
            self.end_dir();
        }
        let Some(root) = self.dirs.pop() else { unreachable!() };
        let (seek_keys, nbytes_keys) = self.write_key_list(&root);

        let dir_at = BEGIN + self.nbytes_name;
        self.buf[dir_at + 10..dir_at + 14].copy_from_slice(&(nbytes_keys as i32).to_be_bytes());
        self.buf[dir_at + 26..dir_at + 30].copy_from_slice(&(seek_keys as i32).to_be_bytes());

        let mut h = Streamer::new(0);
        h.bytes(b"root");
        h.i32(62206);
        h.i32(BEGIN as i32);
        h.i32(self.buf.len() as i32);
        h.i32(0);
        h.i32(0);
        h.i32(0);
        h.i32(self.nbytes_name as i32);
        h.u8(4);
        h.i32(self.codec.fcompress());
        h.i32(self.seek_info as i32);
        h.i32(self.nbytes_info as i32);
        h.u16(1);
        h.bytes(&self.uuid);
        self.buf[..h.buf.len()].copy_from_slice(&h.buf);
        self.buf
    }
}

fn write_leaf(s: &mut Streamer, leaf: &LeafSpec) {
    let label = format!("leaf:{}", leaf.name);
    let counter = leaf.counter.as_ref().map(|c| format!("leaf:{c}"));
    s.named_object(&label, leaf.ty.class(), |s| {
        s.versioned(1, |s| {
            s.versioned(2, |s| {
                s.tnamed(&leaf.name, &leaf.title);
                s.i32(leaf.len);
                s.i32(leaf.ty.len_type());
                s.i32(0);
                s.u8(0);
                s.u8(u8::from(leaf.unsigned));
                s.reference(counter.as_deref());
            });
            match leaf.ty {
                LeafType::Bool | LeafType::I8 => s.bytes(&[0, 0]),
                LeafType::I16 => s.bytes(&[0; 4]),
                LeafType::I32 | LeafType::Char | LeafType::F32 => s.bytes(&[0; 8]),
                LeafType::I64 | LeafType::F64 => s.bytes(&[0; 16]),
                LeafType::Element(type_code) => {
                    s.i32(-1);
                    s.i32(type_code);
                }
            }
        })
    });
}

fn write_tbranch(s: &mut Streamer, b: &BranchSpec, fcompress: i32) {
    s.versioned(13, |s| {
        s.tnamed(&b.name, &b.title);
        s.versioned(2, |s| s.bytes(&[0, 0, 3, 233]));
        s.i32(fcompress);
        s.i32(32000);
        s.i32(if b.leaves.iter().any(|l| l.ty == LeafType::Char) { 1000 } else { 0 });
        s.i32(b.baskets.len() as i32);
        s.i64(b.entries as i64);
        s.versioned(1, |s| s.u8(0));
        s.i32(0);
        let max_baskets = b.baskets.len() as i32 + 1;
        s.i32(max_baskets);
        s.i32(99);
        s.i64(b.entries as i64);
        s.i64(0);
        s.i64(0);
        s.i64(0);
        s.objarray(0, |_, _| {});
        s.objarray(b.leaves.len(), |s, i| write_leaf(s, &b.leaves[i]));
        s.objarray(0, |_, _| {});
        s.u8(1);
        for loc in &b.baskets {
            s.i32(loc.nbytes);
        }
        s.i32(0);
        s.u8(1);
        for loc in &b.baskets {
            s.i64(loc.first_entry);
        }
        s.i64(b.unwritten_from.unwrap_or(b.entries) as i64);
        s.u8(1);
        for loc in &b.baskets {
            s.i64(loc.seek as i64);
        }
        s.i64(0);
        s.string("");
    });
}

fn write_branch(s: &mut Streamer, b: &BranchSpec, fcompress: i32) {
    let label = format!("branch:{}", b.name);
    match &b.element {
        None => {
            s.named_object(&label, "TBranch", |s| write_tbranch(s, b, fcompress));
        }
        Some(e) => {
            let count = e.count_branch.as_ref().map(|c| format!("branch:{c}"));
            s.named_object(&label, "TBranchElement", |s| {
                s.versioned(10, |s| {
                    write_tbranch(s, b, fcompress);
                    s.string(&e.class_name);
                    s.string("");
                    s.string("");
                    s.u32(0);
                    s.i16(1);
                    s.i32(e.id);
                    s.i32(e.type_code);
                    s.i32(e.streamer_type);
                    s.i32(0);
                    s.reference(count.as_deref());
                    s.null();
                })
            });
        }
    }
}

/// One `std::vector<T>` entry as written by a split `TBranchElement`.
pub fn vector_entry<T: Copy>(values: &[T], to_be: impl Fn(T) -> Vec<u8>) -> Vec<u8> {
    let mut body = 9u16.to_be_bytes().to_vec();
    body.extend_from_slice(&(values.len() as i32).to_be_bytes());
    for &v in values {
        body.extend(to_be(v));
    }
    let mut out = ((body.len() as u32) | K_BYTE_COUNT_MASK).to_be_bytes().to_vec();
    out.extend(body);
    out
}

/// One `std::vector<std::vector<float>>` entry.
pub fn nested_vector_entry(rows: &[Vec<f32>]) -> Vec<u8> {
    let mut body = 9u16.to_be_bytes().to_vec();
    body.extend_from_slice(&(rows.len() as i32).to_be_bytes());
    for row in rows {
        body.extend_from_slice(&(row.len() as i32).to_be_bytes());
        for x in row {
            body.extend_from_slice(&x.to_be_bytes());
        }
    }
    let mut out = ((body.len() as u32) | K_BYTE_COUNT_MASK).to_be_bytes().to_vec();
    out.extend(body);
    out
}

/// A `TLeafC` entry: one-byte length and the characters.
pub fn leafc_entry(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    if s.len() < 255 {
        out.push(s.len() as u8);
    } else {
        out.push(255);
        out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(s.as_bytes());
    out
}
